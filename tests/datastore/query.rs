//! Query execution and result streams

use std::sync::Arc;
use std::time::{Duration, Instant};

use cairn::naive::naive_filter;
use cairn::{Entry, Filter, Key, Op, Options, Order, Query};
use proptest::prelude::*;

use crate::common::*;

#[test]
fn prefix_query() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    expect_matches(
        &["/a/b", "/a/b/c", "/a/b/d", "/a/c", "/a/d"],
        ds.query(Query::new().with_prefix("/a/")).unwrap(),
    );
}

#[test]
fn offset_and_limit() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let results = ds
        .query(Query::new().with_prefix("/a/").with_offset(2).with_limit(2))
        .unwrap();
    assert_eq!(keys(results), vec!["/a/b/d", "/a/c"]);
}

#[test]
fn results_arrive_in_key_order() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let mut expected: Vec<&str> = TESTCASES.iter().map(|(k, _)| *k).collect();
    expected.sort();
    assert_eq!(keys(ds.query(Query::new()).unwrap()), expected);

    expected.reverse();
    let results = ds
        .query(Query::new().with_order(Order::ByKeyDescending))
        .unwrap();
    assert_eq!(keys(results), expected);
}

#[test]
fn value_orders_sort_the_whole_stream() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let results = ds
        .query(
            Query::new()
                .with_order(Order::ByValue)
                .with_order(Order::ByKeyDescending)
                .with_limit(3),
        )
        .unwrap();
    // "" < "a" < "a/b/d"
    assert_eq!(keys(results), vec!["/g", "/a", "/a/b/d"]);

    let by_len = Order::ByFunction(Arc::new(|a: &Entry, b: &Entry| {
        b.value.len().cmp(&a.value.len())
    }));
    let results = ds
        .query(Query::new().with_prefix("/a").with_order(by_len).with_offset(1).with_limit(1))
        .unwrap();
    assert_eq!(keys(results), vec!["/a/b/c"]);
}

#[test]
fn filters() {
    let ds = TestDs::new();
    add_test_cases(&ds);

    let results = ds
        .query(Query::new().with_filter(Filter::KeyCompare {
            op: Op::GreaterThanOrEqual,
            key: "/e".into(),
        }))
        .unwrap();
    assert_eq!(keys(results), vec!["/e", "/f", "/g"]);

    let results = ds
        .query(Query::new().with_filter(Filter::ValueCompare {
            op: Op::Equal,
            value: b"ac".to_vec(),
        }))
        .unwrap();
    assert_eq!(keys(results), vec!["/a/c"]);

    let non_empty = Filter::Function(Arc::new(|e: &Entry| !e.value.is_empty()));
    let results = ds
        .query(Query::new().with_filter(non_empty).with_offset(7))
        .unwrap();
    assert_eq!(keys(results), vec!["/f"]);
}

#[test]
fn keys_only_and_sizes() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let entries = ds
        .query(Query::new().with_prefix("/a/b").keys_only())
        .unwrap()
        .rest()
        .unwrap();
    assert_eq!(entries.len(), 3);
    for e in &entries {
        assert!(e.value.is_empty());
        let expected = TESTCASES.iter().find(|(k, _)| *k == e.key).unwrap().1.len();
        assert_eq!(e.size, Some(expected));
    }

    let entries = ds
        .query(Query::new().with_prefix("/a/c").return_sizes())
        .unwrap()
        .rest()
        .unwrap();
    assert_eq!(entries[0].value, b"ac");
    assert_eq!(entries[0].size, Some(2));
}

#[test]
fn many_keys_and_query() {
    let ds = TestDs::new();
    let mut expected = Vec::new();
    for i in 0..200 {
        let key = format!("/many/{:04}", i);
        ds.put(&Key::new(&key), key.as_bytes()).unwrap();
        expected.push(key);
    }

    let results = ds.query(Query::new().with_prefix("/many/").keys_only()).unwrap();
    assert_eq!(keys(results), expected);

    let results = ds
        .query(Query::new().with_prefix("/many/").with_offset(50).with_limit(25))
        .unwrap();
    assert_eq!(keys(results), expected[50..75].to_vec());
}

#[test]
fn stream_cancellation_does_not_block_the_worker() {
    let ds = TestDs::with_options(Options {
        query_buffer: 1,
        ..test_options()
    });
    for i in 0..500 {
        ds.put(&Key::new(format!("/c/{:04}", i)), b"v").unwrap();
    }

    let started = Instant::now();
    for _ in 0..20 {
        let mut results = ds.query(Query::new().with_prefix("/c/")).unwrap();
        for _ in 0..3 {
            assert!(results.next_result().unwrap().is_ok());
        }
        results.close().unwrap();
        assert!(results.next_result().is_none());
    }
    // abandoned without an explicit close
    let results = ds.query(Query::new()).unwrap();
    drop(results);
    assert!(started.elapsed() < Duration::from_secs(10));

    ds.close().unwrap();
}

#[test]
fn closing_a_stream_twice_is_fine() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let mut results = ds.query(Query::new()).unwrap();
    results.close().unwrap();
    results.close().unwrap();
    assert!(results.is_closed());
}

#[test]
fn explicit_transaction_query_sees_pending_writes() {
    let ds = TestDs::new();
    add_test_cases(&ds);

    let mut txn = ds.new_transaction(false).unwrap();
    txn.put(&Key::new("/a/e"), b"pending").unwrap();
    txn.delete(&Key::new("/a/c")).unwrap();
    let results = txn.query(Query::new().with_prefix("/a/")).unwrap();

    // the stream keeps its view after the transaction ends
    txn.commit().unwrap();
    assert_eq!(
        keys(results),
        vec!["/a/b", "/a/b/c", "/a/b/d", "/a/d", "/a/e"]
    );

    // and the transaction itself was not touched by the query
    assert!(ds.has(&Key::new("/a/e")).unwrap());
}

#[test]
fn explicit_transaction_is_not_discarded_by_a_query() {
    let ds = TestDs::new();
    let mut txn = ds.new_transaction(false).unwrap();
    txn.put(&Key::new("/q"), b"1").unwrap();
    let results = txn.query(Query::new()).unwrap();
    drop(results);
    assert!(txn.is_active());
    txn.put(&Key::new("/r"), b"2").unwrap();
    txn.commit().unwrap();
    assert!(ds.has(&Key::new("/q")).unwrap());
    assert!(ds.has(&Key::new("/r")).unwrap());
}

#[test]
fn naive_stages_compose_with_streams() {
    let ds = TestDs::new();
    add_test_cases(&ds);
    let results = naive_filter(
        ds.query(Query::new().with_prefix("/a/")).unwrap(),
        Filter::KeyPrefix("/a/b".into()),
    );
    assert_eq!(keys(results), vec!["/a/b", "/a/b/c", "/a/b/d"]);
}

#[test]
fn query_after_close_fails() {
    let ds = TestDs::new();
    ds.close().unwrap();
    assert!(ds.query(Query::new()).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prefix_queries_match_a_model(
        names in proptest::collection::btree_set("[a-c]{1,3}(/[a-c]{1,2})?", 1..30),
        prefix in "/[a-c]{0,2}",
        offset in 0usize..5,
        limit in 0usize..5,
    ) {
        let ds = TestDs::new();
        let keys_written: Vec<String> = names.iter().map(|n| format!("/{}", n)).collect();
        for k in &keys_written {
            ds.put(&Key::raw(k.clone()), k.as_bytes()).unwrap();
        }

        let mut model: Vec<String> = keys_written
            .iter()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        model.sort();
        let model: Vec<String> = model
            .into_iter()
            .skip(offset)
            .take(if limit == 0 { usize::MAX } else { limit })
            .collect();

        let got = keys(
            ds.query(Query::new().with_prefix(prefix.clone()).with_offset(offset).with_limit(limit))
                .unwrap(),
        );
        prop_assert_eq!(got, model);
    }
}
