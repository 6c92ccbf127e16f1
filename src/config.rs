use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "VIRTUAL_DRIVE_CONFIG";
pub const DATA_DIR_ENV: &str = "VIRTUAL_DRIVE_DATA_DIR";

/// Process bootstrap settings. User-facing settings live in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BootConfig {
    pub data_dir: PathBuf,
    pub log_filter: String,
    pub log_to_file: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".virtual-drive"),
            log_filter: "info".to_string(),
            log_to_file: true,
        }
    }
}

impl BootConfig {
    /// Reads the YAML file named by `VIRTUAL_DRIVE_CONFIG` when set, then
    /// applies `VIRTUAL_DRIVE_DATA_DIR`.
    pub fn load() -> AppResult<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        if let Ok(data_dir) = std::env::var(DATA_DIR_ENV) {
            if !data_dir.trim().is_empty() {
                config.data_dir = PathBuf::from(data_dir);
            }
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|error| AppError::Io(format!("{}: {}", path.display(), error)))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        if config.log_filter.trim().is_empty() {
            return Err(AppError::Validation("logFilter must not be empty".to_string()));
        }
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("drive.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
