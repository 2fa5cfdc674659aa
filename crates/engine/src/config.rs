//! Engine configuration
//!
//! `EngineConfig` is plain data with serde defaults, so a TOML file only
//! needs the settings it changes. Values are checked by
//! [`EngineConfig::validate`] when the engine opens.

use std::path::Path;

use cairn_concurrency::TxnLimits;
use cairn_durability::{ValueLogConfig, SEGMENT_HEADER_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Engine settings
///
/// # Example
///
/// ```toml
/// sync_writes = true
/// segment_size = 67108864
/// max_txn_ops = 100000
/// max_txn_bytes = 16777216
/// truncate = false
/// maintenance_interval_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// fsync the value log on every commit
    pub sync_writes: bool,
    /// Value log segment rotation threshold in bytes
    pub segment_size: u64,
    /// Maximum pending operations per transaction
    pub max_txn_ops: usize,
    /// Maximum pending bytes per transaction
    pub max_txn_bytes: usize,
    /// Cut a torn value log tail on open instead of failing
    pub truncate: bool,
    /// Interval of TTL and version pruning; 0 disables it
    pub maintenance_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = TxnLimits::default();
        EngineConfig {
            sync_writes: true,
            segment_size: 64 * 1024 * 1024,
            max_txn_ops: limits.max_ops,
            max_txn_bytes: limits.max_bytes,
            truncate: false,
            maintenance_interval_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Default configuration file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Cairn engine configuration
#
# fsync the value log on every commit (default: true)
sync_writes = true

# Rotate value log segments at this size in bytes (default: 64 MiB)
segment_size = 67108864

# Per-transaction limits; a write past either one fails with "transaction too big"
max_txn_ops = 100000
max_txn_bytes = 16777216

# Cut a torn value log tail on open instead of refusing to open (default: false)
truncate = false

# Milliseconds between TTL and old-version pruning passes; 0 disables them
maintenance_interval_ms = 1000
"#
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            EngineError::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML and write to `path`
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.segment_size <= SEGMENT_HEADER_SIZE as u64 {
            return Err(EngineError::Config(format!(
                "segment_size must exceed the {} byte segment header",
                SEGMENT_HEADER_SIZE
            )));
        }
        if self.max_txn_ops == 0 || self.max_txn_bytes == 0 {
            return Err(EngineError::Config(
                "transaction limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Value log settings
    pub fn value_log(&self) -> ValueLogConfig {
        ValueLogConfig {
            segment_size: self.segment_size,
            sync_writes: self.sync_writes,
            truncate: self.truncate,
        }
    }

    /// Transaction size limits
    pub fn txn_limits(&self) -> TxnLimits {
        TxnLimits {
            max_ops: self.max_txn_ops,
            max_bytes: self.max_txn_bytes,
        }
    }
}
