//! Explicit transactions

use std::sync::Arc;
use std::thread;

use cairn::{Error, ErrorKind, Key, Query};

use crate::common::*;

#[test]
fn discard_drops_writes() {
    let ds = TestDs::new();
    let key = Key::new("/test/thing");
    let mut txn = ds.new_transaction(false).unwrap();
    txn.put(&key, &[1, 2, 3]).unwrap();
    txn.discard();
    assert!(!ds.has(&key).unwrap());

    assert!(matches!(txn.put(&key, &[4]), Err(Error::TransactionClosed)));
    assert!(matches!(txn.get(&key), Err(Error::TransactionClosed)));
    assert!(matches!(txn.commit(), Err(Error::TransactionClosed)));
    txn.discard();
}

#[test]
fn commit_makes_writes_visible() {
    let ds = TestDs::new();
    let mut txn = ds.new_transaction(false).unwrap();
    let keys: Vec<Key> = (0..10).map(|i| Key::new(format!("/test/{}", i))).collect();
    for key in &keys {
        txn.put(key, &random_bytes(16)).unwrap();
        assert!(txn.has(key).unwrap(), "own write visible inside the transaction");
        assert!(!ds.has(key).unwrap(), "uncommitted write leaked");
    }
    txn.commit().unwrap();
    for key in &keys {
        assert!(ds.has(key).unwrap());
    }
}

#[test]
fn dropped_transaction_is_discarded() {
    let ds = TestDs::new();
    {
        let mut txn = ds.new_transaction(false).unwrap();
        txn.put(&Key::new("/dropped"), b"x").unwrap();
    }
    assert!(!ds.has(&Key::new("/dropped")).unwrap());
}

#[test]
fn snapshot_isolation() {
    let ds = TestDs::new();
    ds.put(&Key::new("/x"), b"before").unwrap();

    let mut reader = ds.new_transaction(true).unwrap();
    ds.put(&Key::new("/x"), b"after").unwrap();
    ds.put(&Key::new("/y"), b"new").unwrap();

    assert_eq!(reader.get(&Key::new("/x")).unwrap(), b"before");
    assert!(!reader.has(&Key::new("/y")).unwrap());
    assert_eq!(keys(reader.query(Query::new()).unwrap()), vec!["/x"]);
    reader.discard();

    assert_eq!(ds.get(&Key::new("/x")).unwrap(), b"after");
}

#[test]
fn read_only_rejects_writes() {
    let ds = TestDs::new();
    let mut txn = ds.new_transaction(true).unwrap();
    assert!(txn.is_read_only());
    let err = txn.put(&Key::new("/a"), b"1").unwrap_err();
    assert!(matches!(err, Error::ReadOnlyTransaction));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(matches!(
        txn.delete(&Key::new("/a")),
        Err(Error::ReadOnlyTransaction)
    ));
    txn.commit().unwrap();
}

#[test]
fn conflicting_commit_is_retryable() {
    let ds = TestDs::new();
    let key = Key::new("/counter");
    ds.put(&key, b"0").unwrap();

    let mut t1 = ds.new_transaction(false).unwrap();
    let mut t2 = ds.new_transaction(false).unwrap();
    let v1 = t1.get(&key).unwrap();
    let v2 = t2.get(&key).unwrap();
    t1.put(&key, &[v1, b"1".to_vec()].concat()).unwrap();
    t2.put(&key, &[v2, b"2".to_vec()].concat()).unwrap();
    t1.commit().unwrap();

    let err = t2.commit().unwrap_err();
    assert!(err.is_retryable(), "{:?}", err);
    assert_eq!(ds.get(&key).unwrap(), b"01");
}

#[test]
fn concurrent_increments_with_retry() {
    let ds = Arc::new(TestDs::new());
    let key = Key::new("/counter");
    ds.put(&key, &0u64.to_le_bytes()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ds = Arc::clone(&ds);
            let key = key.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    loop {
                        let mut txn = ds.new_transaction(false).unwrap();
                        let bytes = txn.get(&key).unwrap();
                        let n = u64::from_le_bytes(bytes.as_slice().try_into().unwrap());
                        txn.put(&key, &(n + 1).to_le_bytes()).unwrap();
                        match txn.commit() {
                            Ok(()) => break,
                            Err(e) if e.is_retryable() => continue,
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let bytes = ds.get(&key).unwrap();
    assert_eq!(u64::from_le_bytes(bytes.as_slice().try_into().unwrap()), 100);
}

#[test]
fn transaction_traits_are_usable_generically() {
    use cairn::traits::{Txn, TxnDatastore};

    fn write_through<D: TxnDatastore>(ds: &D) {
        let mut txn = ds.new_transaction(false).unwrap();
        txn.put(&Key::new("/generic"), b"yes").unwrap();
        txn.commit().unwrap();
    }

    let ds = TestDs::new();
    write_through(&ds.ds);
    assert_eq!(ds.get(&Key::new("/generic")).unwrap(), b"yes");
}
