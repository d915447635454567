use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    BLUETOOTH_OPERATION_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TELEMETRY_EPSILON,
    STREAM_CHUNK_SIZE,
};

/// Protocol tuning shared by every device link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Battery monitor poll period while the link is ready
    pub poll_interval_ms: u64,
    /// Largest single write to a stream device
    pub stream_chunk_size: usize,
    /// Float telemetry closer than this to the cached value is not reported
    pub telemetry_epsilon: f32,
    /// Upper bound for connect, discovery and GATT requests
    pub operation_timeout_secs: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stream_chunk_size: STREAM_CHUNK_SIZE,
            telemetry_epsilon: DEFAULT_TELEMETRY_EPSILON,
            operation_timeout_secs: BLUETOOTH_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl LinkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Configured chunk size, kept within what a stream device accepts.
    pub fn chunk_size(&self) -> usize {
        self.stream_chunk_size.clamp(1, STREAM_CHUNK_SIZE)
    }
}
