//! Migrator configuration, loaded from TOML.

mod queue_config;
mod storage_config;
mod validation_config;

pub use queue_config::{FixerConfig, QueueConfig};
pub use storage_config::{LogConfig, RouterConfig, StorageConfig};
pub use validation_config::ValidationConfig;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{MigratorError, MigratorResult};

/// Top-level configuration. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    pub router: RouterConfig,
    pub validation: ValidationConfig,
    pub queue: QueueConfig,
    pub fixer: FixerConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

impl MigratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> MigratorResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| MigratorError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> MigratorResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MigratorError::config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> MigratorResult<String> {
        toml::to_string(self).map_err(|e| MigratorError::config(e.to_string()))
    }

    pub fn validate(&self) -> MigratorResult<()> {
        if self.validation.batch_size == 0 {
            return Err(MigratorError::config("validation.batch_size must be > 0"));
        }
        if self.queue.partitions == 0 {
            return Err(MigratorError::config("queue.partitions must be > 0"));
        }
        if self.queue.capacity == 0 {
            return Err(MigratorError::config("queue.capacity must be > 0"));
        }
        if self.queue.topic.trim().is_empty() {
            return Err(MigratorError::config("queue.topic must not be empty"));
        }
        if self.fixer.timeout_ms == 0 {
            return Err(MigratorError::config("fixer.timeout_ms must be > 0"));
        }
        Ok(())
    }
}
