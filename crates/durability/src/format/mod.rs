//! On-disk formats
//!
//! - `segment`: value-log segment files and their 32-byte header
//! - `record`: one framed, checksummed commit record
//! - `manifest`: the MANIFEST file identifying a database directory

pub mod manifest;
pub mod record;
pub mod segment;

pub use manifest::{
    Manifest, ManifestError, ManifestManager, MANIFEST_FILE_NAME, MANIFEST_FORMAT_VERSION,
    MANIFEST_MAGIC,
};
pub use record::{CommitRecord, LogOp, RecordError, RECORD_FORMAT_VERSION};
pub use segment::{
    list_segments, segment_path, Segment, SegmentHeader, SEGMENT_FORMAT_VERSION,
    SEGMENT_HEADER_SIZE, SEGMENT_MAGIC,
};
