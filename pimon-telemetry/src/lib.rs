//! pimon telemetry - host readings for the pimon kernel
//!
//! - `metrics`: collectors and the snapshot aggregator
//! - `execution`: async external command runner with timeout
//! - `config`: collector commands and limits

pub mod config;
pub mod execution;
pub mod metrics;

pub use config::TelemetryConfig;
pub use execution::{CommandError, CommandExecutor, CommandOutput};
pub use metrics::{bytes_to_gb, StorageUsage, TelemetryCollector, TelemetrySnapshot};
