//! Generic datastore conformance suite

use cairn::Options;
use cairn_core::testing;

use crate::common::*;

#[test]
fn suite() {
    let ds = TestDs::new();
    testing::subtest_all(&ds.ds);
}

#[test]
fn suite_batching_native() {
    let ds = TestDs::new();
    testing::subtest_batching(&ds.ds);
}

#[test]
fn suite_batching_fallback() {
    let ds = TestDs::with_options(Options {
        native_batch: false,
        ..test_options()
    });
    testing::subtest_batching(&ds.ds);
}

#[test]
fn suite_after_reopen() {
    let ds = TestDs::new();
    testing::add_fixture(&ds.ds);
    let ds = ds.reopen();
    testing::remove_fixture(&ds.ds);
    testing::subtest_all(&ds.ds);
}
