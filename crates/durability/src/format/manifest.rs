//! MANIFEST file format
//!
//! The MANIFEST identifies a database directory and the on-disk format it
//! was written with. It is intentionally minimal.
//!
//! # Format
//!
//! ```text
//! +--------------------+
//! | Magic: "CRNM"      | 4 bytes
//! | Format Version     | 4 bytes (u32 LE)
//! | Database UUID      | 16 bytes
//! | Created At         | 8 bytes (u64 LE, micros since epoch)
//! | CRC32              | 4 bytes
//! +--------------------+
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;

/// MANIFEST file name inside the database directory
pub const MANIFEST_FILE_NAME: &str = "MANIFEST";

/// MANIFEST magic bytes: "CRNM"
pub const MANIFEST_MAGIC: [u8; 4] = *b"CRNM";

/// Current MANIFEST format version
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

const MANIFEST_SIZE: usize = 4 + 4 + 16 + 8 + 4;

/// MANIFEST contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Format version the directory was written with
    pub format_version: u32,
    /// Unique database identifier (generated on creation)
    pub database_uuid: [u8; 16],
    /// Creation time, microseconds since the unix epoch
    pub created_at: u64,
}

impl Manifest {
    /// MANIFEST for a fresh database
    pub fn new(database_uuid: [u8; 16]) -> Self {
        Manifest {
            format_version: MANIFEST_FORMAT_VERSION,
            database_uuid,
            created_at: Utc::now().timestamp_micros().max(0) as u64,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; MANIFEST_SIZE];
        bytes[0..4].copy_from_slice(&MANIFEST_MAGIC);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        bytes[8..24].copy_from_slice(&self.database_uuid);
        LittleEndian::write_u64(&mut bytes[24..32], self.created_at);
        let crc = crc32fast::hash(&bytes[..32]);
        LittleEndian::write_u32(&mut bytes[32..36], crc);
        bytes
    }

    /// Deserialize from bytes
    ///
    /// A newer format version is reported before anything else is checked,
    /// since its layout may differ.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        if bytes.len() < 8 {
            return Err(ManifestError::TooShort);
        }
        if bytes[0..4] != MANIFEST_MAGIC {
            return Err(ManifestError::InvalidMagic);
        }

        let format_version = LittleEndian::read_u32(&bytes[4..8]);
        if format_version > MANIFEST_FORMAT_VERSION {
            return Err(ManifestError::UnsupportedVersion {
                found: format_version,
                supported: MANIFEST_FORMAT_VERSION,
            });
        }
        if bytes.len() < MANIFEST_SIZE {
            return Err(ManifestError::TooShort);
        }

        let stored_crc = LittleEndian::read_u32(&bytes[32..36]);
        let computed_crc = crc32fast::hash(&bytes[..32]);
        if stored_crc != computed_crc {
            return Err(ManifestError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let mut database_uuid = [0u8; 16];
        database_uuid.copy_from_slice(&bytes[8..24]);
        Ok(Manifest {
            format_version,
            database_uuid,
            created_at: LittleEndian::read_u64(&bytes[24..32]),
        })
    }
}

/// MANIFEST persistence manager
///
/// Persists atomically with write-fsync-rename.
#[derive(Debug)]
pub struct ManifestManager {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestManager {
    /// Create and persist a MANIFEST for a new database
    pub fn create(path: PathBuf, database_uuid: [u8; 16]) -> Result<Self, ManifestError> {
        let manager = ManifestManager {
            path,
            manifest: Manifest::new(database_uuid),
        };
        manager.persist()?;
        Ok(manager)
    }

    /// Load an existing MANIFEST
    pub fn load(path: PathBuf) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(&path)?;
        let manifest = Manifest::from_bytes(&bytes)?;
        Ok(ManifestManager { path, manifest })
    }

    /// Whether a MANIFEST exists at `path`
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Persist atomically (write-fsync-rename)
    pub fn persist(&self) -> Result<(), ManifestError> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&self.manifest.to_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;

        sync_parent(&self.path)?;
        Ok(())
    }

    /// MANIFEST path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Size of the persisted file
    pub fn file_size(&self) -> u64 {
        MANIFEST_SIZE as u64
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

// directories cannot be opened for fsync here
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Errors that can occur with MANIFEST operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// MANIFEST file too short
    #[error("MANIFEST too short")]
    TooShort,

    /// Invalid magic bytes
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Written by a newer format
    #[error("MANIFEST format version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found on disk
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },

    /// Checksum mismatch
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected CRC32 value (from file)
        expected: u32,
        /// Computed CRC32 value
        computed: u32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
