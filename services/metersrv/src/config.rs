//! Service configuration
//!
//! Values are layered with figment: built-in defaults, then
//! `<app_dir>/config.yaml`, then `METERSRV_*` environment variables.
//! Command line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MeterSrvError, Result};

pub const APP_NAME: &str = "hp90epc";
pub const CONFIG_FILE: &str = "config.yaml";
pub const ENV_PREFIX: &str = "METERSRV_";

pub const DEFAULT_BAUD: u32 = 2400;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Typical device path of the meter's USB serial adapter on this OS
pub fn default_device_port() -> &'static str {
    if cfg!(target_os = "windows") {
        "COM3"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbserial-0001"
    } else {
        "/dev/ttyUSB0"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device_port: String,
    pub baud: u32,
    /// CSV directory; relative paths are resolved by [`resolve_log_dir`]
    pub log_dir: String,
    pub log_interval_ms: u64,
    pub http_addr: String,
    pub stale_after_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_port: default_device_port().to_string(),
            baud: DEFAULT_BAUD,
            log_dir: DEFAULT_LOG_DIR.to_string(),
            log_interval_ms: 1000,
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            stale_after_ms: 3000,
        }
    }
}

impl AppConfig {
    /// Load from `<app_dir>/config.yaml` (optional) and the environment
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = config_path(app_dir);
        debug!("Loading configuration from {}", path.display());

        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;

        Ok(config.normalized())
    }

    /// Write to `<app_dir>/config.yaml` through a temp file and rename
    pub async fn save(&self, app_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(app_dir).await.map_err(|e| {
            MeterSrvError::config(format!(
                "Failed to create app directory {}: {}",
                app_dir.display(),
                e
            ))
        })?;

        let path = config_path(app_dir);
        let tmp = path.with_extension("yaml.tmp");
        let yaml = serde_yaml::to_string(self)?;
        tokio::fs::write(&tmp, yaml).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Replace empty or zero fields with their defaults
    pub fn normalized(mut self) -> Self {
        let defaults = AppConfig::default();
        if self.device_port.trim().is_empty() {
            self.device_port = defaults.device_port;
        }
        if self.baud == 0 {
            self.baud = defaults.baud;
        }
        if self.log_dir.trim().is_empty() {
            self.log_dir = defaults.log_dir;
        }
        if self.log_interval_ms == 0 {
            self.log_interval_ms = defaults.log_interval_ms;
        }
        if self.http_addr.trim().is_empty() {
            self.http_addr = defaults.http_addr;
        }
        if self.stale_after_ms == 0 {
            self.stale_after_ms = defaults.stale_after_ms;
        }
        self
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

pub fn config_path(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE)
}

/// Directory holding the config file and, by default, the CSV logs
///
/// An explicit directory wins; `portable` uses the executable's directory;
/// otherwise the per-user config directory of the OS.
pub fn resolve_app_dir(explicit: Option<&Path>, portable: bool) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    if portable {
        let exe = std::env::current_exe()?;
        return exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| MeterSrvError::config("Executable has no parent directory"));
    }

    dirs::config_dir()
        .map(|base| base.join(APP_NAME))
        .ok_or_else(|| MeterSrvError::config("Cannot determine the user config directory"))
}

/// Absolute log directory for a possibly relative `log_dir`
///
/// A relative directory that already exists under `cwd` is used as is;
/// otherwise it lives under the app directory.
pub fn resolve_log_dir(log_dir: &str, app_dir: &Path, cwd: &Path) -> PathBuf {
    let log_dir = Path::new(log_dir);
    if log_dir.is_absolute() {
        return log_dir.to_path_buf();
    }

    let cwd_logs = cwd.join(log_dir);
    if cwd_logs.is_dir() {
        cwd_logs
    } else {
        app_dir.join(log_dir)
    }
}
