//! Recovery behavior of the value log under damaged segments

use std::fs;
use std::path::Path;

use cairn_durability::format::segment_path;
use cairn_durability::{CommitRecord, LogOp, ValueLog, ValueLogConfig, SEGMENT_HEADER_SIZE};
use proptest::prelude::*;
use tempfile::TempDir;

const UUID: [u8; 16] = *b"recovery-tests!!";

fn put(version: u64, key: &str, len: usize) -> CommitRecord {
    CommitRecord::new(
        version,
        vec![LogOp::Put {
            key: key.as_bytes().to_vec(),
            value: vec![version as u8; len],
            expires_at: None,
        }],
    )
}

fn write_records(dir: &Path, count: u64) -> Vec<u64> {
    let (mut log, _) = ValueLog::open(dir, UUID, ValueLogConfig::default(), |_| {}).unwrap();
    let mut ends = Vec::new();
    let mut end = SEGMENT_HEADER_SIZE as u64;
    for v in 1..=count {
        end += log.append(&put(v, &format!("/k{}", v), 20)).unwrap();
        ends.push(end);
    }
    ends
}

fn replayed_versions(dir: &Path, config: ValueLogConfig) -> Vec<u64> {
    let mut versions = Vec::new();
    ValueLog::open(dir, UUID, config, |r| versions.push(r.version)).unwrap();
    versions
}

#[test]
fn test_reopen_after_clean_close_replays_everything() {
    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 10);
    assert_eq!(
        replayed_versions(dir.path(), ValueLogConfig::default()),
        (1..=10).collect::<Vec<_>>()
    );
}

#[test]
fn test_corrupt_sealed_segment_fails_even_with_truncate() {
    let dir = TempDir::new().unwrap();
    let config = ValueLogConfig {
        segment_size: 128,
        truncate: true,
        ..Default::default()
    };
    let (mut log, _) = ValueLog::open(dir.path(), UUID, config, |_| {}).unwrap();
    for v in 1..=4 {
        log.append(&put(v, "/k", 40)).unwrap();
    }
    assert!(log.sealed_segments().len() >= 2);
    drop(log);

    let path = segment_path(dir.path(), 1);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let err = ValueLog::open(dir.path(), UUID, config, |_| {}).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_torn_header_is_discarded_with_truncate() {
    let dir = TempDir::new().unwrap();
    write_records(dir.path(), 2);
    // a crash right after creating the next segment
    fs::write(segment_path(dir.path(), 2), b"CRNV\x01").unwrap();

    assert!(ValueLog::open(dir.path(), UUID, ValueLogConfig::default(), |_| {}).is_err());

    let config = ValueLogConfig {
        truncate: true,
        ..Default::default()
    };
    assert_eq!(replayed_versions(dir.path(), config), vec![1, 2]);
    assert_eq!(
        fs::metadata(segment_path(dir.path(), 2)).unwrap().len(),
        SEGMENT_HEADER_SIZE as u64
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Cutting the log anywhere leaves a recoverable prefix of whole records
    #[test]
    fn prop_truncated_log_recovers_a_prefix(count in 1u64..8, cut_fraction in 0.0f64..1.0) {
        let dir = TempDir::new().unwrap();
        let ends = write_records(dir.path(), count);
        let total = *ends.last().unwrap();
        let cut = SEGMENT_HEADER_SIZE as u64
            + ((total - SEGMENT_HEADER_SIZE as u64) as f64 * cut_fraction) as u64;

        let path = segment_path(dir.path(), 1);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..cut as usize]).unwrap();

        let config = ValueLogConfig { truncate: true, ..Default::default() };
        let versions = replayed_versions(dir.path(), config);
        let whole = ends.iter().filter(|end| **end <= cut).count() as u64;
        prop_assert_eq!(versions, (1..=whole).collect::<Vec<_>>());
    }
}
