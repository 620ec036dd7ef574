//! Run configuration (TOML).
//!
//! ```toml
//! [run]
//! bar_identity = "SPY.1D"
//! flush_threshold = 10000
//! near_miss_threshold = 0.75
//! output_dir = "audit_output"
//!
//! [entry]
//! name = "trend_entry"
//! logic = "and"
//! [[entry.components]]
//! type = "trend_filter"
//! params = { period = 50 }
//!
//! [exit]            # optional
//! name = "time_exit"
//! logic = "or"
//! [[exit.components]]
//! type = "time_stop"
//! params = { max_bars = 20 }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use siglab_core::config::{CompositeSignalConfig, ConfigError};
use siglab_core::domain::DEFAULT_NEAR_MISS_THRESHOLD;

use crate::collector::DEFAULT_FLUSH_THRESHOLD;

/// Errors loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("signal config: {0}")]
    Signal(#[from] ConfigError),
    #[error("flush_threshold must be at least 1")]
    ZeroFlushThreshold,
    #[error("near_miss_threshold {0} is outside [0, 1]")]
    NearMissOutOfRange(f64),
    #[error("bar_identity must not be empty")]
    EmptyBarIdentity,
    #[error("entry and exit signals share the name '{0}'")]
    DuplicateSignalName(String),
}

/// The `[run]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub bar_identity: String,
    pub flush_threshold: usize,
    pub near_miss_threshold: f64,
    pub output_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            bar_identity: "BARS".to_string(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            near_miss_threshold: DEFAULT_NEAR_MISS_THRESHOLD,
            output_dir: PathBuf::from("audit_output"),
        }
    }
}

/// Complete run configuration: settings plus the composites to audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub run: RunSettings,
    pub entry: CompositeSignalConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<CompositeSignalConfig>,
}

impl RunConfig {
    pub fn new(entry: CompositeSignalConfig) -> Self {
        Self {
            run: RunSettings::default(),
            entry,
            exit: None,
        }
    }

    pub fn with_exit(mut self, exit: CompositeSignalConfig) -> Self {
        self.exit = Some(exit);
        self
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, RunConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, RunConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Eager validation of settings and every composite.
    pub fn validate(&self) -> Result<(), RunConfigError> {
        if self.run.flush_threshold == 0 {
            return Err(RunConfigError::ZeroFlushThreshold);
        }
        if !(0.0..=1.0).contains(&self.run.near_miss_threshold) {
            return Err(RunConfigError::NearMissOutOfRange(
                self.run.near_miss_threshold,
            ));
        }
        if self.run.bar_identity.trim().is_empty() {
            return Err(RunConfigError::EmptyBarIdentity);
        }
        self.entry.validate()?;
        if let Some(exit) = &self.exit {
            exit.validate()?;
            // Both collectors write into output_dir, keyed by signal name.
            if exit.name == self.entry.name {
                return Err(RunConfigError::DuplicateSignalName(exit.name.clone()));
            }
        }
        Ok(())
    }

    /// Composites in evaluation order: entry, then exit.
    pub fn signals(&self) -> Vec<&CompositeSignalConfig> {
        std::iter::once(&self.entry).chain(self.exit.as_ref()).collect()
    }

    /// Deterministic hash of the whole run configuration.
    pub fn config_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
