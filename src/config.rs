//! Configuration System using Figment
//!
//! Configuration is layered from:
//! 1. built-in defaults (every field has one)
//! 2. a TOML file (`config/daq_batch.toml` unless another path is given)
//! 3. environment variables prefixed with `DAQ_BATCH_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use daq_batch::config::BatchConfig;
//!
//! let config = BatchConfig::load()?;
//! println!("Labels on sheet row {}", config.table.labels_row + 1);
//! # Ok::<(), daq_batch::error::BatchError>(())
//! ```
//!
//! `DAQ_BATCH_TABLE__LABELS_ROW=0` overrides `[table] labels_row`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::dispatcher::FailurePolicy;
use crate::error::{BatchError, BatchResult};
use crate::journal::default_journal_path;
use crate::table::TableOptions;
use crate::tracing_setup::parse_log_level;

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/daq_batch.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DAQ_BATCH_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Table location and interpretation
    pub table: TableOptions,
    /// Dispatch behavior
    pub dispatch: DispatchConfig,
    /// Execution journal
    pub journal: JournalConfig,
    /// Simulated executor
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "daq-batch".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// What a handler failure does to the rest of the batch
    pub failure_policy: FailurePolicy,
    /// Metadata added to every row (command-line metadata wins)
    pub metadata: BTreeMap<String, String>,
}

/// Journal configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JournalConfig {
    /// Record executed rows
    pub enabled: bool,
    /// Journal file; the platform data directory when unset
    pub path: Option<PathBuf>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl JournalConfig {
    /// Path the journal is written to
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_journal_path)
    }
}

/// Simulated executor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Known device names; empty accepts any device
    pub devices: Vec<String>,
    /// Sleep for plan waits instead of skipping them
    pub honor_waits: bool,
}

impl BatchConfig {
    /// Load from the default file and environment variables
    pub fn load() -> BatchResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and environment variables
    ///
    /// A missing file leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> BatchResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate().map_err(BatchError::Configuration)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        parse_log_level(&self.application.log_level)?;

        self.table.validate()?;

        let mut devices = HashSet::new();
        for device in &self.simulation.devices {
            if device.trim().is_empty() {
                return Err("Simulated device names cannot be empty".to_string());
            }
            if !devices.insert(device) {
                return Err(format!("Duplicate simulated device: {}", device));
            }
        }

        if let Some(path) = &self.journal.path {
            if path.as_os_str().is_empty() {
                return Err("journal.path cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> BatchResult<String> {
        toml::to_string_pretty(self).map_err(|e| BatchError::Configuration(e.to_string()))
    }
}
