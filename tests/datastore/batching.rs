//! Batches on both commit paths

use cairn::{EngineConfig, Error, Key, Options, Query};

use crate::common::*;

fn fallback_options() -> Options {
    Options {
        native_batch: false,
        ..test_options()
    }
}

fn batching(ds: &TestDs) {
    let mut b = ds.batch().unwrap();
    for (k, v) in TESTCASES {
        b.put(&Key::new(k), v.as_bytes()).unwrap();
    }
    b.commit().unwrap();
    for (k, v) in TESTCASES {
        assert_eq!(ds.get(&Key::new(k)).unwrap(), v.as_bytes());
    }

    let mut b = ds.batch().unwrap();
    b.delete(&Key::new("/a/b")).unwrap();
    b.delete(&Key::new("/a/b/c")).unwrap();
    b.commit().unwrap();
    expect_matches(
        &["/a", "/a/b/d", "/a/c", "/a/d", "/e", "/f", "/g"],
        ds.query(Query::new().with_prefix("/")).unwrap(),
    );

    let mut b = ds.batch().unwrap();
    b.put(&Key::new("/xyz"), b"/x/y/z").unwrap();
    b.cancel().unwrap();
    assert!(ds.get(&Key::new("/xyz")).is_err());
}

#[test]
fn native_batching() {
    batching(&TestDs::new());
}

#[test]
fn transaction_batching() {
    batching(&TestDs::with_options(fallback_options()));
}

#[test]
fn batch_handles_what_a_transaction_cannot() {
    let ds = TestDs::with_options(Options {
        engine: EngineConfig {
            max_txn_bytes: 256 * 1024,
            ..test_options().engine
        },
        ..test_options()
    });
    const VALUE_SIZE: usize = 1000;

    let mut txn = ds.new_transaction(false).unwrap();
    let mut puts = 0;
    let err = loop {
        match txn.put(&Key::new(format!("/key{}", puts)), &random_bytes(VALUE_SIZE)) {
            Ok(()) => puts += 1,
            Err(e) => break e,
        }
        assert!(puts < 1_000_000, "transaction never overflowed");
    };
    assert!(matches!(err, Error::Engine { .. }), "{:?}", err);
    txn.discard();

    let mut b = ds.batch().unwrap();
    for i in 0..=puts {
        b.put(&Key::new(format!("/key{}", i)), &random_bytes(VALUE_SIZE))
            .unwrap();
    }
    b.commit().unwrap();
    assert_eq!(ds.get_size(&Key::new(format!("/key{}", puts))).unwrap(), VALUE_SIZE);
}

#[test]
fn cancelled_batch_leaves_store_unchanged() {
    for options in [test_options(), fallback_options()] {
        let ds = TestDs::with_options(options);
        ds.put(&Key::new("/keep"), b"old").unwrap();

        let mut b = ds.batch().unwrap();
        b.put(&Key::new("/keep"), b"new").unwrap();
        b.put(&Key::new("/other"), b"x").unwrap();
        b.delete(&Key::new("/keep")).unwrap();
        b.cancel().unwrap();

        assert_eq!(ds.get(&Key::new("/keep")).unwrap(), b"old");
        assert!(!ds.has(&Key::new("/other")).unwrap());
    }
}

#[test]
fn batch_is_closed_after_commit() {
    let ds = TestDs::new();
    let mut b = ds.batch().unwrap();
    b.put(&Key::new("/a"), b"1").unwrap();
    b.commit().unwrap();
    assert!(matches!(b.put(&Key::new("/b"), b"2"), Err(Error::TransactionClosed)));
    assert!(matches!(b.commit(), Err(Error::TransactionClosed)));
    b.cancel().unwrap();
    assert_eq!(ds.get(&Key::new("/a")).unwrap(), b"1");
}

#[test]
fn fallback_commit_replays_in_order() {
    let ds = TestDs::with_options(fallback_options());
    let mut b = ds.batch().unwrap();
    b.put(&Key::new("/k"), b"1").unwrap();
    b.delete(&Key::new("/k")).unwrap();
    b.put(&Key::new("/k"), b"3").unwrap();
    b.put(&Key::new("/gone"), b"x").unwrap();
    b.delete(&Key::new("/gone")).unwrap();
    b.commit().unwrap();
    assert_eq!(ds.get(&Key::new("/k")).unwrap(), b"3");
    assert!(!ds.has(&Key::new("/gone")).unwrap());
}
