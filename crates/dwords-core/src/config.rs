//! Configuration for dwords-core
//!
//! Loaded from a TOML file (by default `<config dir>/dwords/config.toml`).
//! Every field has a default, so a missing file or an empty table is valid:
//!
//! ```toml
//! database_path = "/home/me/.local/share/dwords/user.db"
//! dictionary_path = "/home/me/.local/share/dwords/dict.db"
//! busy_timeout_ms = 5000
//!
//! [defaults]
//! dictionary = "ecdict"
//! max_current = 20
//!
//! [dictionaries.ecdict]
//! table = "ecdict"
//! field = "translation"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dictionary::{is_sql_identifier, DictionarySpec};
use crate::error::{Result, StoreError};

const APP_DIR: &str = "dwords";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DWordsConfig {
    /// User database (plans, words, settings). Defaults under the data dir.
    pub database_path: Option<PathBuf>,
    /// Read-only reference dictionary database.
    pub dictionary_path: Option<PathBuf>,
    /// Device identifier stamped on local writes. Generated and persisted
    /// in the store when unset.
    pub device_id: Option<String>,
    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
    /// Fallbacks for settings the user has not set
    pub defaults: SettingsDefaults,
    /// Dictionary id → table/field mapping
    pub dictionaries: BTreeMap<String, DictionarySpec>,
}

impl Default for DWordsConfig {
    fn default() -> Self {
        let mut dictionaries = BTreeMap::new();
        dictionaries.insert(
            "ecdict".to_string(),
            DictionarySpec {
                table: "ecdict".to_string(),
                field: "translation".to_string(),
            },
        );
        Self {
            database_path: None,
            dictionary_path: None,
            device_id: None,
            busy_timeout_ms: 5000,
            defaults: SettingsDefaults::default(),
            dictionaries,
        }
    }
}

/// Default values for user settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDefaults {
    /// Active dictionary id
    pub dictionary: String,
    /// Size of the "Current" word window
    pub max_current: u32,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            dictionary: "ecdict".to_string(),
            max_current: 20,
        }
    }
}

impl DWordsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Load from the default location, or defaults when there is none.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Resolved user database path
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("user.db"))
    }

    /// Resolved dictionary database path
    pub fn dictionary_path(&self) -> PathBuf {
        self.dictionary_path
            .clone()
            .unwrap_or_else(|| data_dir().join("dict.db"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.defaults.max_current == 0 {
            return Err(StoreError::Config(
                "defaults.max_current must be positive".to_string(),
            ));
        }

        if let Some(device) = &self.device_id {
            if device.trim().is_empty() {
                return Err(StoreError::Config("device_id must not be empty".to_string()));
            }
        }

        for (id, spec) in &self.dictionaries {
            if !is_sql_identifier(&spec.table) || !is_sql_identifier(&spec.field) {
                return Err(StoreError::Config(format!(
                    "dictionary {}: table and field must be plain identifiers",
                    id
                )));
            }
        }

        if !self.dictionaries.contains_key(&self.defaults.dictionary) {
            return Err(StoreError::Config(format!(
                "default dictionary {} is not configured",
                self.defaults.dictionary
            )));
        }

        Ok(())
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
