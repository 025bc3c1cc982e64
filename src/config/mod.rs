use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::supervisor::log_buffer::DEFAULT_LOG_BUFFER;

pub const DEFAULT_CONFIG_PATH: &str = "config/global.toml";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:57480";

/// Daemon settings, read from `config/global.toml` (or the file named by
/// `FRPC_SUPERVISOR_CONFIG`). Every key is optional.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// IPC HTTP 서버 주소
    pub listen_addr: String,
    /// Bundled frpc executable.
    pub binary_path: PathBuf,
    /// Private writable directory holding the generated config.
    pub data_dir: PathBuf,
    pub config_file_name: String,
    /// First positional argument, selects "config file" mode.
    pub mode_flag: String,
    pub stop_timeout_ms: u64,
    pub collector_join_timeout_ms: u64,
    pub log_buffer_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            binary_path: PathBuf::from("./bin/frpc"),
            data_dir: PathBuf::from("./data"),
            config_file_name: "frpc.toml".to_string(),
            mode_flag: "-c".to_string(),
            stop_timeout_ms: 5_000,
            collector_join_timeout_ms: 2_000,
            log_buffer_size: DEFAULT_LOG_BUFFER,
        }
    }
}

impl Settings {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("FRPC_SUPERVISOR_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut settings = Self::load_from(Path::new(&path))?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// A missing file yields defaults; a malformed one is an error.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        toml::from_str(&s)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bin) = lookup("FRPC_BINARY") {
            self.binary_path = PathBuf::from(bin);
        }
        if let Some(dir) = lookup("FRPC_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("FRPC_SUPERVISOR_LISTEN") {
            self.listen_addr = addr;
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(&self.config_file_name)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn collector_join_timeout(&self) -> Duration {
        Duration::from_millis(self.collector_join_timeout_ms)
    }
}
