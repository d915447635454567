//! Logger setup for the binary

use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Installs an env_logger writing timestamped lines to stderr.
///
/// `RUST_LOG` overrides `default_level`. Calling it twice is harmless.
pub fn init(default_level: LevelFilter) {
    let result = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if let Err(e) = result {
        eprintln!("Logger already initialised: {}", e);
    }
}
