//! Worker-backed result streams
//!
//! [`ResultBuilder`] runs a producer on its own thread and connects it to the
//! consumer through a bounded channel. The producer blocks when the channel is
//! full, which is the backpressure; the consumer cancels by closing the
//! stream, which the producer observes on its next send.
//!
//! # Design Notes
//!
//! - Exactly one worker thread per stream.
//! - `close()` flags the stream, drops the receiving end (unblocking a
//!   producer stuck in `send`) and joins the worker. When `close()` returns
//!   the producer has released everything it held.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::{Query, QueryResult, ResultSource, Results};
use crate::error::{Error, Result};

/// Producer side of a worker-backed stream
pub struct ResultSender {
    tx: SyncSender<QueryResult>,
    closing: Arc<AtomicBool>,
}

impl ResultSender {
    /// Hand one result to the consumer, blocking while the channel is full
    ///
    /// Returns `false` once the consumer has closed the stream; the producer
    /// should stop and release its resources.
    pub fn send(&self, result: QueryResult) -> bool {
        if self.is_closing() {
            return false;
        }
        self.tx.send(result).is_ok()
    }

    /// Whether the consumer has asked the producer to stop
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Builds a [`Results`] stream fed by a worker thread
#[derive(Debug)]
pub struct ResultBuilder {
    query: Query,
    capacity: usize,
}

impl ResultBuilder {
    /// Builder for `query` with a channel holding up to `capacity` results
    ///
    /// A capacity of zero makes every send a rendezvous with the consumer.
    pub fn new(query: Query, capacity: usize) -> Self {
        ResultBuilder { query, capacity }
    }

    /// The query the stream will report
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Start the worker and return the consumer side
    ///
    /// The worker is a named thread running `producer`; the stream ends when
    /// `producer` returns.
    pub fn spawn<F>(self, name: &str, producer: F) -> Result<Results>
    where
        F: FnOnce(ResultSender) + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        let closing = Arc::new(AtomicBool::new(false));
        let sender = ResultSender {
            tx,
            closing: Arc::clone(&closing),
        };

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || producer(sender))
            .map_err(|e| Error::engine_with_source("failed to spawn query worker", e))?;

        debug!(target: "cairn::query", worker = name, capacity = self.capacity, "Query worker started");

        Ok(Results::new(
            self.query,
            Box::new(ChannelSource {
                rx: Some(rx),
                closing,
                worker: Some(worker),
            }),
        ))
    }
}

struct ChannelSource {
    rx: Option<Receiver<QueryResult>>,
    closing: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ResultSource for ChannelSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        // recv fails once the worker has returned and dropped its sender
        self.rx.as_ref()?.recv().ok()
    }

    fn close(&mut self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        drop(self.rx.take());
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::engine("query worker panicked"))?;
            debug!(target: "cairn::query", "Query worker joined");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Entry;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_worker_streams_in_order() {
        let results = ResultBuilder::new(Query::new(), 2)
            .spawn("test-worker", |sender| {
                for i in 0..10 {
                    if !sender.send(Ok(Entry::new(format!("/k{:02}", i), vec![]))) {
                        return;
                    }
                }
            })
            .unwrap();
        let keys: Vec<String> = results.rest().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys.len(), 10);
        assert_eq!(keys[0], "/k00");
        assert_eq!(keys[9], "/k09");
    }

    #[test]
    fn test_close_unblocks_producer() {
        let sent = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));
        let (sent_w, released_w) = (Arc::clone(&sent), Arc::clone(&released));

        let mut results = ResultBuilder::new(Query::new(), 1)
            .spawn("test-infinite", move |sender| {
                let mut i = 0u64;
                while sender.send(Ok(Entry::new(format!("/k{}", i), vec![]))) {
                    sent_w.fetch_add(1, Ordering::SeqCst);
                    i += 1;
                }
                released_w.store(true, Ordering::SeqCst);
            })
            .unwrap();

        assert!(results.next_result().is_some());
        // let the producer fill the channel and block
        thread::sleep(Duration::from_millis(20));
        results.close().unwrap();
        assert!(released.load(Ordering::SeqCst));
        // channel capacity bounds how far the producer ran ahead
        assert!(sent.load(Ordering::SeqCst) <= 3);
        results.close().unwrap();
    }

    #[test]
    fn test_errors_are_delivered_in_stream() {
        let mut results = ResultBuilder::new(Query::new(), 4)
            .spawn("test-error", |sender| {
                sender.send(Ok(Entry::new("/a", vec![])));
                sender.send(Err(Error::engine("read failed")));
            })
            .unwrap();
        assert!(results.next_result().unwrap().is_ok());
        assert!(results.next_result().unwrap().is_err());
        assert!(results.next_result().is_none());
    }

    #[test]
    fn test_panicking_worker_reports_on_close() {
        let mut results = ResultBuilder::new(Query::new(), 0)
            .spawn("test-panic", |_sender| panic!("boom"))
            .unwrap();
        assert!(results.next_result().is_none());
        assert!(results.close().is_err());
    }
}
