//! Datastore integration tests

#[path = "../common/mod.rs"]
mod common;

mod basic;
mod batching;
mod conformance;
mod lifecycle;
mod query;
mod transactions;
mod ttl;
