use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info};
use tokio::fs;

/// Asynchronously ensures that a directory exists, creating it if it does not.
/// This function is idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        if let Err(e) = fs::create_dir_all(path).await {
            error!("Failed to create directory at {:?}: {}", path, e);
            return Err(e.into());
        }
        info!("Created directory at: {:?}", path);
    }
    Ok(())
}

/// Directory holding the configuration file.
///
/// `FALCONS_DECK_CONFIG_DIR` wins; otherwise `$XDG_CONFIG_HOME/falcons-deck`,
/// then `$HOME/.config/falcons-deck`, then the working directory.
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = env::var_os("FALCONS_DECK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("falcons-deck");
    }
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".config").join("falcons-deck"),
        None => PathBuf::from("."),
    }
}
