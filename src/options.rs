//! Datastore options
//!
//! Everything the datastore needs is passed in one [`Options`] value; there
//! is no process-wide state. Options round-trip through TOML, with durations
//! written as milliseconds and engine settings under an `[engine]` table.

use std::path::Path;
use std::time::Duration;

use cairn_core::{Error, Result};
use cairn_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Datastore settings
///
/// # Example
///
/// ```toml
/// gc_discard_ratio = 0.1
/// gc_interval = 900000     # 0 disables periodic GC
/// gc_sleep = 10000
/// native_batch = true
/// query_buffer = 16
///
/// [engine]
/// sync_writes = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Minimum share of dead bytes before a value log segment is rewritten
    pub gc_discard_ratio: f64,
    /// Period of the background GC worker; `None` disables it
    #[serde(with = "optional_millis")]
    pub gc_interval: Option<Duration>,
    /// Pause between rewritten segments within one periodic GC pass
    #[serde(with = "millis")]
    pub gc_sleep: Duration,
    /// Commit batches through the engine's native write batch instead of a transaction
    pub native_batch: bool,
    /// Results buffered between a query worker and its consumer
    pub query_buffer: usize,
    /// Engine settings
    pub engine: EngineConfig,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            gc_discard_ratio: 0.1,
            gc_interval: Some(Duration::from_secs(15 * 60)),
            gc_sleep: Duration::from_secs(10),
            native_batch: true,
            query_buffer: 16,
            engine: EngineConfig::default(),
        }
    }
}

impl Options {
    /// Read options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options: Options = toml::from_str(&content).map_err(|e| {
            Error::InvalidArgument(format!(
                "failed to parse options file '{}': {}",
                path.display(),
                e
            ))
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Write options to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidArgument(format!("failed to serialize options: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the datastore cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.gc_discard_ratio > 0.0 && self.gc_discard_ratio < 1.0) {
            return Err(Error::InvalidArgument(format!(
                "gc_discard_ratio must be in (0, 1), got {}",
                self.gc_discard_ratio
            )));
        }
        if self.gc_interval == Some(Duration::ZERO) {
            return Err(Error::InvalidArgument(
                "gc_interval must be positive; use None to disable periodic GC".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine settings after platform adjustments
    ///
    /// Where open files cannot be locked the way the value log expects, a
    /// crash can leave a torn tail behind; with synchronous writes the tail
    /// is cut instead of refusing to open.
    pub(crate) fn engine_config(&self) -> EngineConfig {
        let mut config = self.engine.clone();
        if cfg!(windows) && config.sync_writes {
            config.truncate = true;
        }
        config
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// `None` is written as 0
mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.map_or(0, |d| d.as_millis() as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok((ms > 0).then(|| Duration::from_millis(ms)))
    }
}
