use pimon_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::{path::{Path, PathBuf}, time::Duration};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub server: ServerConf,
    pub chat: ChatConf,
    pub store: StoreConf,
    pub telemetry: TelemetryConfig,
    pub caption: CaptionConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConf {
    pub host: String,
    pub port: u16,
    // index.html, logs.html, assets ; séparé du répertoire de travail (.env, logs.db)
    pub static_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChatConf {
    pub endpoint: String, // ex: "http://localhost:11434/api/chat"
    pub default_model: String,
    pub timeout_secs: u64,
    pub persona_marker: String, // sous-chaîne du modèle qui bascule vers le persona technique
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConf {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CaptionConf {
    pub command: String, // ex: "python3 caption.py {image}"
    pub upload_dir: PathBuf,
    pub timeout_secs: u64,
    pub max_upload_mb: usize,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 3000, static_dir: "public".into() }
    }
}

impl Default for ChatConf {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/chat".into(),
            default_model: "gemma:2b".into(),
            timeout_secs: 120,
            persona_marker: "mistral".into(),
        }
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self { path: "logs.db".into() }
    }
}

impl Default for CaptionConf {
    fn default() -> Self {
        Self {
            command: "python3 caption.py {image}".into(),
            upload_dir: "uploads".into(),
            timeout_secs: 300,
            max_upload_mb: 20,
        }
    }
}

impl ChatConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl CaptionConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.max(1) * 1024 * 1024
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() { return Ok(KernelConfig::default()); }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("PIMON_CONFIG").unwrap_or_else(|_| "pimon.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from<P: AsRef<Path>>(path: P) -> KernelConfig {
    let path = path.as_ref();
    if path.exists() {
        let txt = fs::read_to_string(path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            warn!("invalid config {}: {e}", path.display());
            KernelConfig::default()
        })
    } else {
        warn!("no {}, using default config", path.display());
        KernelConfig::default()
    }
}
