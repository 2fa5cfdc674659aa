//! Expiring keys

use std::thread;
use std::time::Duration;

use cairn::{Error, Key, Query};
use chrono::Utc;

use crate::common::*;

#[test]
fn keys_expire() {
    let ds = TestDs::new();
    let keys: Vec<Key> = (0..10).map(|i| Key::new(format!("/test/{}", i))).collect();

    let mut txn = ds.new_transaction(false).unwrap();
    for key in &keys {
        txn.put_with_ttl(key, &random_bytes(16), secs(1)).unwrap();
    }
    txn.commit().unwrap();

    let mut txn = ds.new_transaction(true).unwrap();
    for key in &keys {
        txn.get(key).unwrap();
    }
    txn.discard();

    thread::sleep(Duration::from_millis(2100));
    for key in &keys {
        assert!(!ds.has(key).unwrap(), "record with ttl did not expire");
    }
    assert!(keys_of(&ds).is_empty());
}

#[test]
fn ttl_written_late_in_a_second_lasts_the_full_ttl() {
    use chrono::Timelike;

    let ds = TestDs::new();
    let key = Key::new("/late");
    while Utc::now().nanosecond() % 1_000_000_000 < 950_000_000 {
        thread::sleep(Duration::from_millis(5));
    }
    ds.put_with_ttl(&key, b"v", secs(1)).unwrap();
    assert!(ds.has(&key).unwrap());

    thread::sleep(Duration::from_millis(900));
    assert!(ds.has(&key).unwrap(), "key expired before its ttl");

    let expiration = ds.get_expiration(&key).unwrap();
    assert!(expiration > Utc::now());
}

fn keys_of(ds: &TestDs) -> Vec<String> {
    crate::common::keys(ds.query(Query::new().with_prefix("/test/")).unwrap())
}

#[test]
fn expirations_agree() {
    let ds = TestDs::new();
    let key = Key::new("/abc/def");
    let ttl = Duration::from_secs(3600);
    let target = Utc::now() + chrono::Duration::seconds(3600);

    let mut txn = ds.new_transaction(false).unwrap();
    txn.put_with_ttl(&key, &random_bytes(32), ttl).unwrap();
    txn.commit().unwrap();

    let mut txn = ds.new_transaction(true).unwrap();
    let from_txn = txn.get_expiration(&key).unwrap();
    assert!(
        (target - from_txn).num_seconds().abs() < 5,
        "expiration {} not within 5s of {}",
        from_txn,
        target
    );

    let mut results = txn
        .query(Query::new().keys_only().return_expirations())
        .unwrap();
    let entry = results.next_result().unwrap().unwrap();
    assert_eq!(entry.key, "/abc/def");
    assert_eq!(entry.expiration, Some(from_txn));
    assert!(results.next_result().is_none());
    results.close().unwrap();

    assert_eq!(ds.get_expiration(&key).unwrap(), from_txn);
    assert!(matches!(
        ds.get_expiration(&Key::new("/foo/bar")),
        Err(Error::NotFound)
    ));
}

#[test]
fn key_without_ttl_has_no_expiration() {
    let ds = TestDs::new();
    let key = Key::new("/plain");
    ds.put(&key, b"v").unwrap();
    assert!(matches!(ds.get_expiration(&key), Err(Error::NotFound)));

    let entries = ds
        .query(Query::new().return_expirations())
        .unwrap()
        .rest()
        .unwrap();
    assert_eq!(entries[0].expiration, None);
}

#[test]
fn set_ttl_rewrites_expiration_and_keeps_value() {
    let ds = TestDs::new();
    let key = Key::new("/k");
    ds.put(&key, b"value").unwrap();
    ds.set_ttl(&key, Duration::from_secs(600)).unwrap();

    assert_eq!(ds.get(&key).unwrap(), b"value");
    let remaining = ds.get_expiration(&key).unwrap() - Utc::now();
    assert!(remaining.num_seconds() > 590 && remaining.num_seconds() <= 601);

    ds.set_ttl(&key, Duration::from_secs(1)).unwrap();
    thread::sleep(Duration::from_millis(2100));
    assert!(!ds.has(&key).unwrap());
    assert!(matches!(
        ds.set_ttl(&key, Duration::from_secs(10)),
        Err(Error::NotFound)
    ));
}

#[test]
fn plain_put_clears_expiration() {
    let ds = TestDs::new();
    let key = Key::new("/k");
    ds.put_with_ttl(&key, b"v", Duration::from_secs(600)).unwrap();
    assert!(ds.get_expiration(&key).is_ok());
    ds.put(&key, b"v2").unwrap();
    assert!(matches!(ds.get_expiration(&key), Err(Error::NotFound)));
}

#[test]
fn expiration_survives_reopen() {
    let ds = TestDs::new();
    let key = Key::new("/persist");
    ds.put_with_ttl(&key, b"v", Duration::from_secs(600)).unwrap();
    let before = ds.get_expiration(&key).unwrap();

    let ds = ds.reopen();
    assert_eq!(ds.get_expiration(&key).unwrap(), before);
}
