//! Shared helpers for the integration suites
//!
//! Import with `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use cairn::{Datastore, EngineConfig, Key, Options, Results};
use rand::RngCore;
use tempfile::TempDir;

/// Keys and values shared by the query tests
pub const TESTCASES: &[(&str, &str)] = &[
    ("/a", "a"),
    ("/a/b", "ab"),
    ("/a/b/c", "abc"),
    ("/a/b/d", "a/b/d"),
    ("/a/c", "ac"),
    ("/a/d", "ad"),
    ("/e", "e"),
    ("/f", "f"),
    ("/g", ""),
];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Options for tests: no fsync, no background threads
pub fn test_options() -> Options {
    Options {
        gc_interval: None,
        engine: EngineConfig {
            sync_writes: false,
            maintenance_interval_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Datastore in a fresh temp directory; keep the `TempDir` alive with it
pub struct TestDs {
    pub ds: Datastore,
    pub dir: TempDir,
}

impl TestDs {
    pub fn new() -> Self {
        Self::with_options(test_options())
    }

    pub fn with_options(options: Options) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("temp dir");
        let ds = Datastore::open(dir.path(), options).expect("open datastore");
        TestDs { ds, dir }
    }

    /// Close and reopen on the same directory
    pub fn reopen(self) -> Self {
        let TestDs { ds, dir } = self;
        let options = ds.options().clone();
        ds.close().expect("close");
        drop(ds);
        let ds = Datastore::open(dir.path(), options).expect("reopen datastore");
        TestDs { ds, dir }
    }
}

impl std::ops::Deref for TestDs {
    type Target = Datastore;

    fn deref(&self) -> &Datastore {
        &self.ds
    }
}

/// Write [`TESTCASES`] and check each one reads back
pub fn add_test_cases(ds: &Datastore) {
    for (k, v) in TESTCASES {
        ds.put(&Key::new(k), v.as_bytes()).unwrap();
    }
    for (k, v) in TESTCASES {
        assert_eq!(ds.get(&Key::new(k)).unwrap(), v.as_bytes(), "{}", k);
    }
}

/// Keys of a stream in the order they arrived
pub fn keys(results: Results) -> Vec<String> {
    results.rest().unwrap().into_iter().map(|e| e.key).collect()
}

/// Assert that `results` holds exactly `expected`, in any order
pub fn expect_matches(expected: &[&str], results: Results) {
    let got: BTreeSet<String> = keys(results).into_iter().collect();
    let want: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
    assert_eq!(got, want);
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
