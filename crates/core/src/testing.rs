//! Conformance suite for [`Datastore`] implementations
//!
//! Every function panics on the first violated expectation, so they can be
//! called straight from a `#[test]`. Each subtest assumes an empty store and
//! removes what it wrote before returning.

use std::collections::BTreeSet;

use crate::datastore::{Batch, Batching, Datastore};
use crate::error::Error;
use crate::key::Key;
use crate::query::{Entry, Filter, Op, Order, Query, Results};

/// Fixture keys and values shared by the query subtests
pub const FIXTURE: &[(&str, &str)] = &[
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

/// Write [`FIXTURE`] and check every key reads back
pub fn add_fixture<D: Datastore>(ds: &D) {
    for (k, v) in FIXTURE {
        ds.put(&Key::new(k), v.as_bytes()).expect("put fixture");
    }
    for (k, v) in FIXTURE {
        let got = ds.get(&Key::new(k)).expect("get fixture");
        assert_eq!(got, v.as_bytes(), "fixture value for {}", k);
    }
}

/// Delete [`FIXTURE`]
pub fn remove_fixture<D: Datastore>(ds: &D) {
    for (k, _) in FIXTURE {
        ds.delete(&Key::new(k)).expect("delete fixture");
    }
}

/// Collect the keys of a stream, failing on any error item
pub fn collect_keys(results: Results) -> Vec<String> {
    results
        .rest()
        .expect("query results")
        .into_iter()
        .map(|e| e.key)
        .collect()
}

/// Assert that `results` holds exactly `expected`, in any order
pub fn expect_matches(expected: &[&str], results: Results) {
    let got: BTreeSet<String> = collect_keys(results).into_iter().collect();
    let want: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
    assert_eq!(got, want);
}

/// Put, has, get and delete of a single key
pub fn subtest_basic_put_get<D: Datastore>(ds: &D) {
    let key = Key::new("foo");
    let value = b"Hello Datastore!";

    ds.put(&key, value).expect("put");
    assert!(ds.has(&key).expect("has"), "key just written is missing");
    assert_eq!(ds.get_size(&key).expect("get_size"), value.len());
    assert_eq!(ds.get(&key).expect("get"), value.to_vec());

    ds.delete(&key).expect("delete");
    assert!(!ds.has(&key).expect("has after delete"));
    assert!(ds.get(&key).unwrap_err().is_not_found());
}

/// Absent keys report `NotFound` from get and get_size, `false` from has
pub fn subtest_not_founds<D: Datastore>(ds: &D) {
    let key = Key::new("notreal");

    assert!(matches!(ds.get(&key), Err(Error::NotFound)));
    assert!(!ds.has(&key).expect("has"));
    assert!(matches!(ds.get_size(&key), Err(Error::NotFound)));
    ds.delete(&key).expect("deleting an absent key succeeds");
}

/// Empty values round-trip and are distinct from absence
pub fn subtest_empty_value<D: Datastore>(ds: &D) {
    let key = Key::new("/empty");
    ds.put(&key, &[]).expect("put empty");
    assert!(ds.has(&key).expect("has"));
    assert_eq!(ds.get(&key).expect("get"), Vec::<u8>::new());
    assert_eq!(ds.get_size(&key).expect("get_size"), 0);
    ds.delete(&key).expect("delete");
}

/// Prefix, offset and limit over [`FIXTURE`]
pub fn subtest_prefix_query<D: Datastore>(ds: &D) {
    add_fixture(ds);

    let results = ds.query(Query::new().with_prefix("/a/")).expect("query");
    expect_matches(&["/a/b", "/a/b/c", "/a/b/d", "/a/c", "/a/d"], results);

    let results = ds
        .query(Query::new().with_prefix("/a/").with_offset(2).with_limit(2))
        .expect("query with offset and limit");
    expect_matches(&["/a/b/d", "/a/c"], results);

    let results = ds.query(Query::new().with_prefix("/")).expect("query all");
    let all = collect_keys(results);
    assert_eq!(all.len(), FIXTURE.len());
    let mut sorted = all.clone();
    sorted.sort();
    assert_eq!(all, sorted, "results are not in key order");

    remove_fixture(ds);
}

/// Filters and non-key orders over [`FIXTURE`]
pub fn subtest_filters_and_orders<D: Datastore>(ds: &D) {
    add_fixture(ds);

    let results = ds
        .query(Query::new().with_prefix("/a/").with_filter(Filter::ValueCompare {
            op: Op::Equal,
            value: b"ac".to_vec(),
        }))
        .expect("filtered query");
    expect_matches(&["/a/c"], results);

    let results = ds
        .query(Query::new().with_prefix("/a/").with_order(Order::ByKeyDescending))
        .expect("descending query");
    assert_eq!(
        collect_keys(results),
        vec!["/a/d", "/a/c", "/a/b/d", "/a/b/c", "/a/b"]
    );

    let results = ds
        .query(Query::new().with_order(Order::ByValue).with_limit(3))
        .expect("value-ordered query");
    let entries: Vec<Entry> = results.rest().expect("rest");
    let values: Vec<&[u8]> = entries.iter().map(|e| e.value.as_slice()).collect();
    assert_eq!(values, vec![&b""[..], &b"a"[..], &b"a/b/d"[..]]);

    remove_fixture(ds);
}

/// One hundred keys written one at a time and read back by a keys-only query
pub fn subtest_many_keys_and_query<D: Datastore>(ds: &D) {
    let mut keys = Vec::new();
    for i in 0..100 {
        let key = Key::new(format!("{}key{}", i, i));
        let value = format!("value-{}", i).into_bytes();
        ds.put(&key, &value).expect("put");
        keys.push((key, value));
    }
    for (key, value) in &keys {
        assert_eq!(&ds.get(key).expect("get"), value);
    }

    let results = ds.query(Query::new().keys_only()).expect("keys-only query");
    let entries = results.rest().expect("rest");
    let got: BTreeSet<String> = entries.iter().map(|e| e.key.clone()).collect();
    let want: BTreeSet<String> = keys.iter().map(|(k, _)| k.as_str().to_string()).collect();
    assert_eq!(got, want);
    assert!(entries.iter().all(|e| e.value.is_empty()));

    for (key, _) in &keys {
        ds.delete(key).expect("delete");
    }
}

/// Batched puts and deletes, plus a cancelled batch
pub fn subtest_batching<D: Batching>(ds: &D) {
    let mut batch = ds.batch().expect("batch");
    for (k, v) in FIXTURE {
        batch.put(&Key::new(k), v.as_bytes()).expect("batch put");
    }
    batch.commit().expect("batch commit");
    for (k, v) in FIXTURE {
        assert_eq!(ds.get(&Key::new(k)).expect("get"), v.as_bytes());
    }

    let mut batch = ds.batch().expect("batch");
    batch.delete(&Key::new("/a/b")).expect("batch delete");
    batch.delete(&Key::new("/a/b/c")).expect("batch delete");
    batch.commit().expect("batch commit");
    expect_matches(
        &["/a", "/a/b/d", "/a/c", "/a/d", "/e", "/f", "/g"],
        ds.query(Query::new().with_prefix("/")).expect("query"),
    );

    let mut batch = ds.batch().expect("batch");
    batch.put(&Key::new("/xyz"), b"/x/y/z").expect("batch put");
    batch.cancel().expect("cancel");
    assert!(ds.get(&Key::new("/xyz")).unwrap_err().is_not_found());

    remove_fixture(ds);
}

/// Run every datastore subtest
pub fn subtest_all<D: Datastore>(ds: &D) {
    subtest_basic_put_get(ds);
    subtest_not_founds(ds);
    subtest_empty_value(ds);
    subtest_prefix_query(ds);
    subtest_filters_and_orders(ds);
    subtest_many_keys_and_query(ds);
}
