//! Single-call operations

use cairn::{Error, Key};

use crate::common::*;

#[test]
fn has() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    assert!(ds.has(&Key::new("/a/b/c")).unwrap());
    assert!(!ds.has(&Key::new("/a/b/c/d")).unwrap());
}

#[test]
fn get_size() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    assert_eq!(ds.get_size(&Key::new("/a/b/c")).unwrap(), 3);
    assert!(matches!(
        ds.get_size(&Key::new("/a/b/c/d")),
        Err(Error::NotFound)
    ));
}

#[test]
fn not_exist_get() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let key = Key::new("/a/b/c/d");
    assert!(!ds.has(&key).unwrap());
    assert!(matches!(ds.get(&key), Err(Error::NotFound)));
}

#[test]
fn delete() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let key = Key::new("/a/b/c");
    assert!(ds.has(&key).unwrap());
    ds.delete(&key).unwrap();
    assert!(!ds.has(&key).unwrap());
    // deleting again is fine
    ds.delete(&key).unwrap();
}

#[test]
fn get_empty_value() {
    let ds = TestDs::new();
    let key = Key::new("/empty");
    ds.put(&key, &[]).unwrap();
    assert!(ds.has(&key).unwrap());
    assert_eq!(ds.get(&key).unwrap(), Vec::<u8>::new());
    assert_eq!(ds.get_size(&key).unwrap(), 0);
}

#[test]
fn basic_put_get() {
    let ds = TestDs::new();
    let key = Key::new("foo");
    let value = b"Hello Datastore!";
    ds.put(&key, value).unwrap();
    assert!(ds.has(&key).unwrap());
    assert_eq!(ds.get(&key).unwrap(), value);

    ds.delete(&key).unwrap();
    assert!(!ds.has(&key).unwrap());
    assert!(ds.get(&key).unwrap_err().is_not_found());
}

#[test]
fn random_values_round_trip_across_reopen() {
    let ds = TestDs::new();
    let values: Vec<(Key, Vec<u8>)> = (0..50)
        .map(|i| (Key::new(format!("/rand/{}", i)), random_bytes(i * 7)))
        .collect();
    for (k, v) in &values {
        ds.put(k, v).unwrap();
    }

    let ds = ds.reopen();
    for (k, v) in &values {
        assert_eq!(&ds.get(k).unwrap(), v);
    }
}

#[test]
fn overwrite_returns_latest() {
    let ds = TestDs::new();
    let key = Key::new("/k");
    ds.put(&key, b"one").unwrap();
    ds.put(&key, b"two").unwrap();
    assert_eq!(ds.get(&key).unwrap(), b"two");
    assert_eq!(ds.get_size(&key).unwrap(), 3);
}
