//! Commit records.
//!
//! Every committed write set is stored as one self-delimiting record.
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! Length covers format version + payload + CRC32. The CRC32 covers format
//! version + payload. The payload is a bincode-encoded [`CommitRecord`].

use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

/// Current record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Length prefix + format version + CRC32
const FRAME_OVERHEAD: usize = 4 + 1 + 4;

/// One mutation inside a commit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// Value write
    Put {
        /// Raw key
        key: Vec<u8>,
        /// Value bytes
        value: Vec<u8>,
        /// Absolute expiration (unix seconds)
        expires_at: Option<u64>,
    },
    /// Tombstone
    Delete {
        /// Raw key
        key: Vec<u8>,
    },
}

impl LogOp {
    /// Raw key touched by the operation
    pub fn key(&self) -> &[u8] {
        match self {
            LogOp::Put { key, .. } | LogOp::Delete { key } => key,
        }
    }
}

/// A committed write set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit version shared by every op
    pub version: u64,
    /// Commit time, microseconds since the unix epoch
    pub timestamp: u64,
    /// Operations in application order
    pub ops: Vec<LogOp>,
}

impl CommitRecord {
    /// Record stamped with the current time
    pub fn new(version: u64, ops: Vec<LogOp>) -> Self {
        CommitRecord {
            version,
            timestamp: Utc::now().timestamp_micros().max(0) as u64,
            ops,
        }
    }

    /// Frame the record for the log
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        let payload =
            bincode::serialize(self).map_err(|e| RecordError::Encode(e.to_string()))?;

        let total_len = 1 + payload.len() + 4;
        let length = u32::try_from(total_len).map_err(|_| RecordError::TooLarge(total_len))?;

        let mut record = vec![0u8; 4 + total_len];
        LittleEndian::write_u32(&mut record[0..4], length);
        record[4] = RECORD_FORMAT_VERSION;
        record[5..5 + payload.len()].copy_from_slice(&payload);
        let crc = compute_crc(&record[4..5 + payload.len()]);
        LittleEndian::write_u32(&mut record[5 + payload.len()..], crc);
        Ok(record)
    }

    /// Parse one framed record from the front of `bytes`
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), RecordError> {
        if bytes.len() < 4 {
            return Err(RecordError::InsufficientData);
        }
        let length = LittleEndian::read_u32(&bytes[0..4]) as usize;
        if length < FRAME_OVERHEAD - 4 {
            return Err(RecordError::InvalidFormat);
        }
        if bytes.len() < 4 + length {
            return Err(RecordError::InsufficientData);
        }

        let body = &bytes[4..4 + length];
        let (checked, crc_bytes) = body.split_at(length - 4);
        let stored_crc = LittleEndian::read_u32(crc_bytes);
        let computed_crc = compute_crc(checked);
        if stored_crc != computed_crc {
            return Err(RecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let format_version = checked[0];
        if format_version != RECORD_FORMAT_VERSION {
            return Err(RecordError::UnsupportedVersion(format_version));
        }

        let record = bincode::deserialize(&checked[1..])
            .map_err(|e| RecordError::Decode(e.to_string()))?;
        Ok((record, 4 + length))
    }

    /// Sum of key and value lengths
    pub fn payload_bytes(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                LogOp::Put { key, value, .. } => key.len() + value.len(),
                LogOp::Delete { key } => key.len(),
            })
            .sum()
    }
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Errors decoding or encoding a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Not enough bytes for a complete record (torn write)
    #[error("insufficient data for record")]
    InsufficientData,

    /// Length field is impossible
    #[error("invalid record format")]
    InvalidFormat,

    /// Unknown record format version
    #[error("unsupported record format version {0}")]
    UnsupportedVersion(u8),

    /// Checksum mismatch
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// CRC32 stored in the record
        expected: u32,
        /// CRC32 of the bytes read
        computed: u32,
    },

    /// Record does not fit a 32-bit length
    #[error("record of {0} bytes is too large")]
    TooLarge(usize),

    /// Payload could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),

    /// Payload passed the checksum but could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),
}
