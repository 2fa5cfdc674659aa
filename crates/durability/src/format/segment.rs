//! Value-log segment files.
//!
//! Segments are named `vlog-NNNNNN.seg` where `NNNNNN` is a zero-padded
//! segment number.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Segment Header (32 bytes)          │
//! ├────────────────────────────────────┤
//! │ Commit record 1                    │
//! ├────────────────────────────────────┤
//! │ Commit record 2                    │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! Header: magic (4) | format version (u32 LE) | segment number (u64 LE) |
//! database UUID (16).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use tracing::error;

/// Magic bytes identifying a value-log segment: "CRNV"
pub const SEGMENT_MAGIC: [u8; 4] = *b"CRNV";

/// Current segment format version
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of the segment header in bytes
pub const SEGMENT_HEADER_SIZE: usize = 32;

const SEGMENT_PREFIX: &str = "vlog-";
const SEGMENT_SUFFIX: &str = ".seg";

/// Segment header (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic bytes: "CRNV"
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
    /// Segment number (monotonically increasing)
    pub segment_number: u64,
    /// Database UUID, shared by every segment of one directory
    pub database_uuid: [u8; 16],
}

impl SegmentHeader {
    /// Header for a new segment
    pub fn new(segment_number: u64, database_uuid: [u8; 16]) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            format_version: SEGMENT_FORMAT_VERSION,
            segment_number,
            database_uuid,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        LittleEndian::write_u64(&mut bytes[8..16], self.segment_number);
        bytes[16..32].copy_from_slice(&self.database_uuid);
        bytes
    }

    /// Parse the first 32 bytes of a segment; `None` if there are fewer
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SEGMENT_HEADER_SIZE {
            return None;
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut database_uuid = [0u8; 16];
        database_uuid.copy_from_slice(&bytes[16..32]);
        Some(SegmentHeader {
            magic,
            format_version: LittleEndian::read_u32(&bytes[4..8]),
            segment_number: LittleEndian::read_u64(&bytes[8..16]),
            database_uuid,
        })
    }

    /// Whether the magic bytes match
    pub fn is_valid(&self) -> bool {
        self.magic == SEGMENT_MAGIC
    }
}

/// Path of segment `segment_number` inside `dir`
pub fn segment_path(dir: &Path, segment_number: u64) -> PathBuf {
    dir.join(format!("{}{:06}{}", SEGMENT_PREFIX, segment_number, SEGMENT_SUFFIX))
}

fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Segment numbers present in `dir`, ascending
pub fn list_segments(dir: &Path) -> io::Result<Vec<u64>> {
    let mut numbers = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(number) = entry.file_name().to_str().and_then(parse_segment_name) {
            numbers.push(number);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

/// Failure injected into the next append
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Write only this many bytes, then fail
    TornWrite(usize),
    /// Write everything, then fail the fsync
    Sync,
}

/// Writable handle on the active segment
#[derive(Debug)]
pub struct Segment {
    file: File,
    segment_number: u64,
    /// Current write position (bytes from start)
    size: u64,
    path: PathBuf,
    /// Set when a failed append could not be cut back off the file
    poisoned: bool,
    #[cfg(test)]
    fault: Option<Fault>,
}

impl Segment {
    /// Create a new segment and write its header
    pub fn create(dir: &Path, segment_number: u64, database_uuid: [u8; 16]) -> io::Result<Self> {
        let path = segment_path(dir, segment_number);
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;
        file.write_all(&SegmentHeader::new(segment_number, database_uuid).to_bytes())?;

        Ok(Segment {
            file,
            segment_number,
            size: SEGMENT_HEADER_SIZE as u64,
            path,
            poisoned: false,
            #[cfg(test)]
            fault: None,
        })
    }

    /// Reopen an already validated segment for appending at `size`
    ///
    /// Anything past `size` (a torn tail) is cut off.
    pub fn open_append(dir: &Path, segment_number: u64, size: u64) -> io::Result<Self> {
        let path = segment_path(dir, segment_number);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        if file.metadata()?.len() != size {
            file.set_len(size)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(size))?;

        Ok(Segment {
            file,
            segment_number,
            size,
            path,
            poisoned: false,
            #[cfg(test)]
            fault: None,
        })
    }

    /// Append bytes, fsyncing them when `sync` is set
    ///
    /// A failed append is cut back off the file, so the segment ends where it
    /// did before the call. If that cut fails too the segment is poisoned and
    /// refuses every later append.
    pub fn append(&mut self, data: &[u8], sync: bool) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("segment {} is poisoned by a failed append", self.segment_number),
            ));
        }
        let start = self.size;
        if let Err(e) = self.write_frame(data, sync) {
            if let Err(cut) = self.cut_back(start) {
                self.poisoned = true;
                error!(
                    target: "cairn::log",
                    segment = self.segment_number,
                    error = %cut,
                    "Could not roll back failed append"
                );
            }
            return Err(e);
        }
        self.size += data.len() as u64;
        Ok(())
    }

    #[cfg(not(test))]
    fn write_frame(&mut self, data: &[u8], sync: bool) -> io::Result<()> {
        self.file.write_all(data)?;
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn write_frame(&mut self, data: &[u8], sync: bool) -> io::Result<()> {
        let injected = || io::Error::new(io::ErrorKind::Other, "injected fault");
        match self.fault.take() {
            Some(Fault::TornWrite(n)) => {
                self.file.write_all(&data[..n.min(data.len())])?;
                Err(injected())
            }
            Some(Fault::Sync) => {
                self.file.write_all(data)?;
                Err(injected())
            }
            None => {
                self.file.write_all(data)?;
                if sync {
                    self.file.sync_data()?;
                }
                Ok(())
            }
        }
    }

    fn cut_back(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        self.file.sync_data()
    }

    /// Make the next append fail
    #[cfg(test)]
    pub(crate) fn inject_fault(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    /// fsync the segment
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Segment number
    pub fn segment_number(&self) -> u64 {
        self.segment_number
    }

    /// Bytes written, header included
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the segment holds no records yet
    pub fn is_empty(&self) -> bool {
        self.size <= SEGMENT_HEADER_SIZE as u64
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
