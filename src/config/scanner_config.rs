use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{DEFAULT_SCAN_DURATION_SECS, MIN_RSSI_THRESHOLD};

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Only report battery monitors and robots
    pub filter_enabled: bool,
    /// Weaker advertisements are ignored
    pub min_rssi: i16,
    pub scan_duration_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            filter_enabled: true,
            min_rssi: MIN_RSSI_THRESHOLD,
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
        }
    }
}

impl ScannerConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }
}
