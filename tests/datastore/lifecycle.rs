//! Open, close, garbage collection and disk usage

use std::time::{Duration, Instant};

use cairn::traits::{GcDatastore, PersistentDatastore};
use cairn::{Datastore, EngineConfig, Error, ErrorKind, Key, Options};
use tempfile::TempDir;

use crate::common::*;

fn small_segments() -> Options {
    Options {
        engine: EngineConfig {
            segment_size: 64 * 1024,
            ..test_options().engine
        },
        ..test_options()
    }
}

fn fill_and_delete(ds: &Datastore, count: usize) {
    let mut b = ds.batch().unwrap();
    for i in 0..count {
        b.put(&Key::new(format!("/key{}", i)), &random_bytes(6400))
            .unwrap();
    }
    b.commit().unwrap();

    let mut b = ds.batch().unwrap();
    for i in 0..count {
        b.delete(&Key::new(format!("/key{}", i))).unwrap();
    }
    b.commit().unwrap();
}

#[test]
fn collect_garbage_reclaims_deleted_values() {
    let ds = TestDs::with_options(small_segments());
    fill_and_delete(&ds, 1000);
    let before = ds.disk_usage().unwrap();

    ds.collect_garbage().unwrap();
    let after = ds.disk_usage().unwrap();
    assert!(after < before / 2, "before {} after {}", before, after);

    // nothing left to rewrite is not an error
    GcDatastore::collect_garbage(&ds.ds).unwrap();

    let ds = ds.reopen();
    assert!(!ds.has(&Key::new("/key7")).unwrap());
}

#[test]
fn periodic_gc_runs_in_the_background() {
    let ds = TestDs::with_options(Options {
        gc_interval: Some(Duration::from_millis(50)),
        gc_sleep: Duration::from_millis(1),
        ..small_segments()
    });
    fill_and_delete(&ds, 200);
    let before = ds.disk_usage().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while ds.disk_usage().unwrap() >= before && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(ds.disk_usage().unwrap() < before);

    let started = Instant::now();
    ds.close().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn disk_usage_after_reopen() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let ds = ds.reopen();
    assert!(PersistentDatastore::disk_usage(&ds.ds).unwrap() > 0);
}

#[test]
fn close_is_idempotent_and_final() {
    let ds = TestDs::new();
    ds.put(&Key::new("/a"), b"1").unwrap();
    ds.close().unwrap();
    ds.close().unwrap();

    let err = ds.put(&Key::new("/b"), b"2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineFailure);
    assert!(ds.get(&Key::new("/a")).is_err());
    assert!(ds.new_transaction(true).is_err());
    assert!(ds.batch().is_err());
    assert!(ds.collect_garbage().is_err());
    assert_eq!(
        ds.disk_usage().unwrap_err().kind(),
        ErrorKind::EngineFailure
    );
}

#[test]
fn directory_is_exclusive() {
    let ds = TestDs::new();
    let err = Datastore::open(ds.dir.path(), test_options()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineFailure);
    assert!(err.to_string().contains("in use"), "{}", err);
}

#[test]
fn newer_format_is_unsupported_version() {
    let dir = TempDir::new().unwrap();
    Datastore::open(dir.path(), test_options())
        .unwrap()
        .close()
        .unwrap();

    let manifest = dir.path().join("MANIFEST");
    let mut bytes = std::fs::read(&manifest).unwrap();
    bytes[4..8].copy_from_slice(&9u32.to_le_bytes());
    std::fs::write(&manifest, bytes).unwrap();

    match Datastore::open(dir.path(), test_options()) {
        Err(Error::UnsupportedVersion { found, .. }) => assert_eq!(found, 9),
        Err(e) => panic!("expected UnsupportedVersion, got {}", e),
        Ok(_) => panic!("opened a directory from a newer format"),
    }
}

#[test]
fn invalid_options_are_rejected() {
    let dir = TempDir::new().unwrap();
    let err = Datastore::open(
        dir.path(),
        Options {
            gc_discard_ratio: 0.0,
            ..test_options()
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn options_file_drives_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cairn.toml");
    std::fs::write(
        &path,
        r#"
        gc_interval = 0
        native_batch = false

        [engine]
        sync_writes = false
        maintenance_interval_ms = 0
        "#,
    )
    .unwrap();

    let options = Options::from_file(&path).unwrap();
    assert!(!options.native_batch);
    let ds = Datastore::open(dir.path().join("db"), options).unwrap();
    let mut b = ds.batch().unwrap();
    b.put(&Key::new("/x"), b"y").unwrap();
    b.commit().unwrap();
    assert_eq!(ds.get(&Key::new("/x")).unwrap(), b"y");
}

#[test]
fn sync_flushes() {
    let ds = TestDs::with_options(Options {
        engine: EngineConfig {
            sync_writes: false,
            ..test_options().engine
        },
        ..test_options()
    });
    ds.put(&Key::new("/a"), b"1").unwrap();
    ds.sync(&Key::new("/")).unwrap();
    let ds = ds.reopen();
    assert_eq!(ds.get(&Key::new("/a")).unwrap(), b"1");
}
