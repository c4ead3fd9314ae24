//! System metrics collection for pimon
//!
//! Provides the per-request telemetry snapshot served by `/api/system`:
//! - CPU usage per core (cumulative counters since boot)
//! - CPU temperature (optional, via an external command)
//! - Memory usage
//! - Root filesystem usage (via an external command)
//! - Host identity (platform, architecture, hostname)
//!
//! Collectors never fail the snapshot. Optional readings degrade to a
//! fallback value (`None` temperature, zeroed disk).

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use sysinfo::System;
use tracing::{debug, warn};

use crate::config::TelemetryConfig;
use crate::execution::CommandExecutor;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const PROC_STAT: &str = "/proc/stat";

/// Point-in-time reading of the host
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub cpu_temperature: Option<f64>,
    pub cpu_usage_per_core: Vec<f64>,
    pub memory: StorageUsage,
    pub disk: StorageUsage,
    pub platform: String,
    pub architecture: String,
    pub hostname: String,
}

/// Used/total pair in gigabytes (2 decimals)
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct StorageUsage {
    #[serde(rename = "usedGB")]
    pub used_gb: f64,
    #[serde(rename = "totalGB")]
    pub total_gb: f64,
}

impl StorageUsage {
    pub fn from_bytes(used: u64, total: u64) -> Self {
        Self {
            used_gb: bytes_to_gb(used),
            total_gb: bytes_to_gb(total),
        }
    }
}

/// Cumulative per-core counters, as listed by `/proc/stat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// `100 - 100 * idle / total`, one decimal, within [0, 100]
    pub fn usage_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let usage = 100.0 - (100.0 * self.idle as f64) / total as f64;
        round_to(usage.clamp(0.0, 100.0), 1)
    }
}

/// Usage of every core, in core order
pub fn cpu_usage_per_core(times: &[CpuTimes]) -> Vec<f64> {
    times.iter().map(CpuTimes::usage_percent).collect()
}

/// Shared by memory and disk so both figures stay comparable
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round_to(bytes as f64 / BYTES_PER_GB, 2)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Per-core `cpuN` lines of `/proc/stat` (the aggregate `cpu` line is skipped)
pub fn parse_proc_stat(text: &str) -> Vec<CpuTimes> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let label = fields.next()?;
            let index = label.strip_prefix("cpu")?;
            if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let values: Vec<u64> = fields.map(|f| f.parse().unwrap_or(0)).collect();
            let at = |i: usize| values.get(i).copied().unwrap_or(0);
            Some(CpuTimes {
                user: at(0),
                nice: at(1),
                system: at(2),
                idle: at(3),
                iowait: at(4),
                irq: at(5),
                softirq: at(6),
                steal: at(7),
            })
        })
        .collect()
}

/// Extract degrees from output such as `temp=48.3'C`
pub fn parse_temperature(output: &str) -> Option<f64> {
    let cleaned = output
        .trim()
        .trim_start_matches("temp=")
        .trim_end_matches("'C")
        .trim();
    if let Ok(value) = cleaned.parse::<f64>() {
        return value.is_finite().then_some(value);
    }

    // other tools: first numeric token wins
    output
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .filter(|token| !token.is_empty())
        .find_map(|token| token.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Parse `df -k` output: first data row, column 1 = total KB, column 2 = used KB.
///
/// Long device names make df wrap the row, so the columns are counted across
/// every line after the header.
pub fn parse_df_output(output: &str) -> Option<StorageUsage> {
    let columns: Vec<&str> = output
        .trim()
        .lines()
        .skip(1)
        .flat_map(str::split_whitespace)
        .collect();
    let total_kb: u64 = columns.get(1)?.parse().ok()?;
    let used_kb: u64 = columns.get(2)?.parse().ok()?;
    Some(StorageUsage::from_bytes(used_kb * 1024, total_kb * 1024))
}

/// Composes the collectors into a snapshot
pub struct TelemetryCollector {
    config: TelemetryConfig,
    executor: CommandExecutor,
    sys: Arc<Mutex<System>>,
}

impl TelemetryCollector {
    pub fn new(config: TelemetryConfig) -> Self {
        let executor = CommandExecutor::new(config.command_timeout());
        Self {
            config,
            executor,
            sys: Arc::new(Mutex::new(System::new())),
        }
    }

    /// Collect a complete snapshot; temperature and disk run concurrently
    pub async fn snapshot(&self) -> TelemetrySnapshot {
        debug!("Collecting telemetry snapshot...");

        let cpu_usage_per_core = self.cpu_usage_per_core();
        let memory = self.memory();
        let (cpu_temperature, disk) = tokio::join!(self.temperature(), self.disk());

        TelemetrySnapshot {
            cpu_temperature,
            cpu_usage_per_core,
            memory,
            disk,
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn cpu_usage_per_core(&self) -> Vec<f64> {
        match std::fs::read_to_string(PROC_STAT) {
            Ok(text) => {
                let times = parse_proc_stat(&text);
                if !times.is_empty() {
                    return cpu_usage_per_core(&times);
                }
                debug!("{} has no per-core lines, using sysinfo", PROC_STAT);
            }
            Err(e) => debug!("{} unavailable ({}), using sysinfo", PROC_STAT, e),
        }

        // sysinfo reports usage since its previous refresh
        let mut sys = self.sys.lock();
        sys.refresh_cpu_usage();
        sys.cpus()
            .iter()
            .map(|cpu| round_to((cpu.cpu_usage() as f64).clamp(0.0, 100.0), 1))
            .collect()
    }

    /// `used` is total minus *available* memory (MemAvailable), not MemFree
    pub fn memory(&self) -> StorageUsage {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        let total = sys.total_memory();
        let used = total.saturating_sub(sys.available_memory());
        StorageUsage::from_bytes(used, total)
    }

    pub async fn temperature(&self) -> Option<f64> {
        match self.executor.run_line(&self.config.temperature_command).await {
            Ok(output) => {
                let value = parse_temperature(&output.stdout);
                if value.is_none() {
                    debug!("Unparseable temperature output: {:?}", output.stdout);
                }
                value
            }
            Err(e) => {
                debug!("Temperature unavailable: {}", e);
                None
            }
        }
    }

    pub async fn disk(&self) -> StorageUsage {
        match self.executor.run_line(&self.config.disk_command).await {
            Ok(output) => parse_df_output(&output.stdout).unwrap_or_else(|| {
                warn!("Unparseable disk usage output: {:?}", output.stdout);
                StorageUsage::default()
            }),
            Err(e) => {
                warn!("Disk usage unavailable: {}", e);
                StorageUsage::default()
            }
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}
