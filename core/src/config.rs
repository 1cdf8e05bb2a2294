//! Configuration types for the memory bank

use crate::error::MemoryBankError;
use crate::traits::MemoryBankResult;
use crate::types::{SCHEMA_VERSION, STORAGE_KEY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory; relative backend paths resolve against it
    pub data_dir: PathBuf,

    /// Logical key of the persisted document
    pub storage_key: String,

    /// Schema version written into envelopes
    pub schema_version: String,

    /// Key-value backend configuration
    pub key_value: KeyValueConfig,

    /// Structured backend configuration
    pub structured: StructuredConfig,

    /// Poll interval of the change notifier in milliseconds
    pub watch_interval_ms: u64,

    /// Logging level
    pub log_level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage_key: STORAGE_KEY.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            key_value: KeyValueConfig::default(),
            structured: StructuredConfig::default(),
            watch_interval_ms: 500,
            log_level: "info".to_string(),
        }
    }
}

impl StorageConfig {
    /// Default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load a JSON configuration file; absent fields take their defaults
    pub fn from_json_file(path: &Path) -> MemoryBankResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MemoryBankError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| MemoryBankError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Directory of the key-value backend
    pub fn key_value_dir(&self) -> PathBuf {
        self.data_dir.join(&self.key_value.dir)
    }

    /// Database path of the structured backend
    pub fn structured_path(&self) -> PathBuf {
        self.data_dir.join(&self.structured.path)
    }
}

/// Key-value backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValueConfig {
    /// Use this backend at all
    pub enabled: bool,

    /// Directory holding one file per key
    pub dir: PathBuf,

    /// Capacity ceiling over all entries, in bytes
    pub capacity_bytes: u64,
}

impl Default for KeyValueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("kv"),
            capacity_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Structured backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredConfig {
    /// Use this backend at all
    pub enabled: bool,

    /// Database directory
    pub path: PathBuf,

    /// Largest envelope accepted, in bytes
    pub capacity_bytes: u64,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("db"),
            capacity_bytes: 50 * 1024 * 1024,
        }
    }
}
