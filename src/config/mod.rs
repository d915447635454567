pub mod link_config;
pub mod scanner_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub use crate::config::link_config::LinkConfig;
pub use crate::config::scanner_config::ScannerConfig;
use crate::utils::ensure_directory_exists;

const CONFIG_FILE_NAME: &str = "falcons_deck_config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub scanner: ScannerConfig,
}

impl AppConfig {
    /// Loads the config from `config_dir`, falling back to defaults when absent.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the config to `config_dir`, creating the directory if needed.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;

        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(&file_path, config_json).await?;

        info!("Config saved to {:?}.", file_path_str);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("falcons-deck-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = AppConfig::load_config(&scratch_dir("missing")).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.link.poll_interval_ms, 2000);
        assert_eq!(config.link.stream_chunk_size, 20);
    }

    #[tokio::test]
    async fn saved_config_loads_back() {
        let dir = scratch_dir("roundtrip");
        let mut config = AppConfig::default();
        config.link.poll_interval_ms = 500;
        config.scanner.filter_enabled = false;

        config.save_config(&dir).await.unwrap();
        let loaded = AppConfig::load_config(&dir).await.unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config: AppConfig = serde_json::from_str(r#"{"link": {"telemetry_epsilon": 0.05}}"#).unwrap();
        assert_eq!(config.link.telemetry_epsilon, 0.05);
        assert_eq!(config.link.poll_interval_ms, 2000);
        assert_eq!(config.scanner, ScannerConfig::default());
    }
}
