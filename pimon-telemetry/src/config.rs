//! Collector settings
//!
//! Embedded in the kernel's YAML file under `telemetry:`; every field has a
//! default so a partial (or absent) section still yields a working collector.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Command printing the CPU temperature (Raspberry Pi firmware tool by default)
    pub temperature_command: String,
    /// Command printing root filesystem usage in 1K blocks
    pub disk_command: String,
    /// Upper bound for each collector command
    pub command_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            temperature_command: "vcgencmd measure_temp".to_string(),
            disk_command: "df -k /".to_string(),
            command_timeout_secs: 5,
        }
    }
}

impl TelemetryConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}
