//! Segmented value log
//!
//! Every committed write set is appended as one [`CommitRecord`] to the
//! active segment. When the active segment grows past the configured size it
//! is sealed and a new one is started. Sealed segments are immutable until
//! reclamation rewrites their live records and removes them.
//!
//! # Recovery
//!
//! [`ValueLog::open`] replays every segment in order through a callback. A
//! torn or corrupt tail of the last segment fails the open unless
//! `truncate` is set, in which case the tail is cut off. Damage anywhere
//! else always fails the open.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{DurabilityError, Result};
use crate::format::{
    list_segments, segment_path, CommitRecord, Segment, SegmentHeader, SEGMENT_FORMAT_VERSION,
    SEGMENT_HEADER_SIZE,
};

/// Value log tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLogConfig {
    /// Rotate the active segment once it exceeds this many bytes
    pub segment_size: u64,
    /// fsync after every append
    pub sync_writes: bool,
    /// Cut a damaged tail of the last segment instead of failing
    pub truncate: bool,
}

impl Default for ValueLogConfig {
    fn default() -> Self {
        ValueLogConfig {
            segment_size: 64 * 1024 * 1024,
            sync_writes: true,
            truncate: false,
        }
    }
}

/// What recovery found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Segments read
    pub segments: usize,
    /// Records replayed
    pub records: usize,
    /// Highest commit version seen
    pub max_version: u64,
    /// Bytes cut from a damaged tail
    pub truncated_bytes: u64,
}

/// A record read back from a sealed segment
#[derive(Debug, Clone)]
pub struct LoggedRecord {
    /// Framed size on disk
    pub size: u64,
    /// Decoded record
    pub record: CommitRecord,
}

/// Append-only, segmented commit log
#[derive(Debug)]
pub struct ValueLog {
    dir: PathBuf,
    database_uuid: [u8; 16],
    config: ValueLogConfig,
    active: Segment,
    /// Sealed segment number -> size in bytes
    sealed: BTreeMap<u64, u64>,
}

impl ValueLog {
    /// Open the log in `dir`, replaying every record through `replay`
    pub fn open<F>(
        dir: &Path,
        database_uuid: [u8; 16],
        config: ValueLogConfig,
        mut replay: F,
    ) -> Result<(Self, RecoveryStats)>
    where
        F: FnMut(CommitRecord),
    {
        fs::create_dir_all(dir)?;
        let numbers = list_segments(dir)?;
        let mut stats = RecoveryStats::default();
        let mut sealed = BTreeMap::new();
        let mut active = None;

        for (idx, &number) in numbers.iter().enumerate() {
            let is_last = idx + 1 == numbers.len();
            let path = segment_path(dir, number);
            let bytes = fs::read(&path)?;

            let valid_len = if bytes.len() < SEGMENT_HEADER_SIZE && is_last && config.truncate {
                warn!(target: "cairn::log", segment = number, "Discarding torn segment header");
                stats.truncated_bytes = bytes.len() as u64;
                0
            } else {
                check_header(&bytes, number, database_uuid)?;
                match replay_segment(&bytes, number, &mut replay, &mut stats) {
                    Ok(len) => len,
                    Err(DurabilityError::Corrupt { offset, reason, .. })
                        if is_last && config.truncate =>
                    {
                        let dropped = bytes.len() as u64 - offset;
                        warn!(
                            target: "cairn::log",
                            segment = number,
                            offset,
                            dropped,
                            reason = %reason,
                            "Truncating damaged value log tail"
                        );
                        stats.truncated_bytes = dropped;
                        offset
                    }
                    Err(e) => return Err(e),
                }
            };
            stats.segments += 1;

            if !is_last {
                sealed.insert(number, valid_len);
            } else if valid_len < SEGMENT_HEADER_SIZE as u64 {
                // the header itself was torn; start the segment over
                fs::remove_file(&path)?;
                active = Some(Segment::create(dir, number, database_uuid)?);
            } else {
                active = Some(Segment::open_append(dir, number, valid_len)?);
            }
        }

        let active = match active {
            Some(segment) => segment,
            None => Segment::create(dir, 1, database_uuid)?,
        };

        let log = ValueLog {
            dir: dir.to_path_buf(),
            database_uuid,
            config,
            active,
            sealed,
        };
        info!(
            target: "cairn::log",
            segments = stats.segments,
            records = stats.records,
            max_version = stats.max_version,
            bytes = log.disk_usage(),
            "Value log opened"
        );
        Ok((log, stats))
    }

    /// Append one record, rotating first if the active segment is full
    ///
    /// Returns the framed size written.
    pub fn append(&mut self, record: &CommitRecord) -> Result<u64> {
        let frame = record.to_bytes()?;
        if !self.active.is_empty()
            && self.active.size() + frame.len() as u64 > self.config.segment_size
        {
            self.rotate()?;
        }
        self.active.append(&frame, self.config.sync_writes)?;
        Ok(frame.len() as u64)
    }

    /// Seal the active segment and start the next one
    pub fn rotate(&mut self) -> Result<()> {
        self.active.sync()?;
        let sealed_number = self.active.segment_number();
        let sealed_size = self.active.size();
        let next = Segment::create(&self.dir, sealed_number + 1, self.database_uuid)?;
        self.sealed.insert(sealed_number, sealed_size);
        self.active = next;
        debug!(target: "cairn::log", segment = sealed_number, bytes = sealed_size, "Segment sealed");
        Ok(())
    }

    /// fsync the active segment
    pub fn sync(&mut self) -> Result<()> {
        self.active.sync()?;
        Ok(())
    }

    /// Total bytes of every segment
    pub fn disk_usage(&self) -> u64 {
        self.sealed.values().sum::<u64>() + self.active.size()
    }

    /// Sealed segments and their sizes, oldest first
    pub fn sealed_segments(&self) -> Vec<(u64, u64)> {
        self.sealed.iter().map(|(n, s)| (*n, *s)).collect()
    }

    /// Number of the segment receiving appends
    pub fn active_segment(&self) -> u64 {
        self.active.segment_number()
    }

    /// Read every record of a sealed segment
    pub fn read_segment(&self, number: u64) -> Result<Vec<LoggedRecord>> {
        if !self.sealed.contains_key(&number) {
            return Err(DurabilityError::SegmentBusy(number));
        }
        let bytes = fs::read(segment_path(&self.dir, number))?;
        check_header(&bytes, number, self.database_uuid)?;

        let mut records = Vec::new();
        let mut pos = SEGMENT_HEADER_SIZE;
        while pos < bytes.len() {
            let (record, consumed) =
                CommitRecord::from_bytes(&bytes[pos..]).map_err(|e| DurabilityError::Corrupt {
                    segment: number,
                    offset: pos as u64,
                    reason: e.to_string(),
                })?;
            records.push(LoggedRecord {
                size: consumed as u64,
                record,
            });
            pos += consumed;
        }
        Ok(records)
    }

    /// Delete a sealed segment
    pub fn remove_segment(&mut self, number: u64) -> Result<()> {
        if self.sealed.remove(&number).is_none() {
            return Err(DurabilityError::SegmentBusy(number));
        }
        fs::remove_file(segment_path(&self.dir, number))?;
        Ok(())
    }

    /// Directory holding the segments
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn check_header(bytes: &[u8], number: u64, database_uuid: [u8; 16]) -> Result<()> {
    let corrupt = |reason: &str| DurabilityError::Corrupt {
        segment: number,
        offset: 0,
        reason: reason.to_string(),
    };

    let header = SegmentHeader::from_bytes(bytes).ok_or_else(|| corrupt("short segment header"))?;
    if !header.is_valid() {
        return Err(corrupt("invalid segment magic"));
    }
    if header.format_version > SEGMENT_FORMAT_VERSION {
        return Err(DurabilityError::UnsupportedVersion {
            found: header.format_version,
            supported: SEGMENT_FORMAT_VERSION,
        });
    }
    if header.segment_number != number {
        return Err(corrupt("segment number does not match file name"));
    }
    if header.database_uuid != database_uuid {
        return Err(corrupt("segment belongs to another database"));
    }
    Ok(())
}

/// Replay the records of one segment; returns the length of its valid prefix
fn replay_segment<F>(
    bytes: &[u8],
    number: u64,
    replay: &mut F,
    stats: &mut RecoveryStats,
) -> Result<u64>
where
    F: FnMut(CommitRecord),
{
    let mut pos = SEGMENT_HEADER_SIZE;
    while pos < bytes.len() {
        match CommitRecord::from_bytes(&bytes[pos..]) {
            Ok((record, consumed)) => {
                stats.records += 1;
                stats.max_version = stats.max_version.max(record.version);
                replay(record);
                pos += consumed;
            }
            Err(e) => {
                return Err(DurabilityError::Corrupt {
                    segment: number,
                    offset: pos as u64,
                    reason: e.to_string(),
                })
            }
        }
    }
    Ok(pos as u64)
}
