//! JSON file configuration store.
//!
//! Implements [`ConfigPort`] on a single JSON document.  Saves go to a
//! sibling temp file first and are renamed into place, so a crash never
//! leaves a half-written config behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LEVELWATCH_CONFIG";
/// Used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "levelwatch.json";

pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$LEVELWATCH_CONFIG`, or `levelwatch.json`.
    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for FileConfigStore {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound,
            _ => {
                warn!("config: read {} failed: {}", self.path.display(), e);
                ConfigError::IoError
            }
        })?;
        let cfg: SystemConfig = serde_json::from_str(&text).map_err(|e| {
            warn!("config: {} is not valid: {}", self.path.display(), e);
            ConfigError::Corrupted
        })?;
        cfg.validate().map_err(ConfigError::ValidationFailed)?;
        info!("config: loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;
        let text = serde_json::to_string_pretty(config).map_err(|_| ConfigError::IoError)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                warn!("config: write {} failed: {}", self.path.display(), e);
                ConfigError::IoError
            })?;
        info!("config: saved {}", self.path.display());
        Ok(())
    }
}
