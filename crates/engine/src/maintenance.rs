//! Background pruning task
//!
//! `Maintenance` runs a named thread that periodically prunes the store:
//! expired values become tombstones and versions older than every live
//! snapshot are dropped.
//!
//! # Design Notes
//!
//! - Sleeps in short slices so shutdown is observed quickly
//! - Graceful shutdown via atomic flag, then join

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cairn_storage::{now_secs, OrderedStore};
use tracing::debug;

const SLICE: Duration = Duration::from_millis(50);

/// Handle on the running pruning thread
#[derive(Debug)]
pub(crate) struct Maintenance {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Maintenance {
    /// Start pruning `store` every `interval`
    pub(crate) fn start(store: Arc<OrderedStore>, interval: Duration) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("cairn-maintenance".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    let mut elapsed = Duration::ZERO;
                    while elapsed < interval {
                        if flag.load(Ordering::Relaxed) {
                            return;
                        }
                        let step = SLICE.min(interval - elapsed);
                        thread::sleep(step);
                        elapsed += step;
                    }
                    if store.is_closed() {
                        return;
                    }
                    let stats = store.prune(now_secs());
                    if stats.expired + stats.versions_removed + stats.keys_removed > 0 {
                        debug!(
                            target: "cairn::store",
                            expired = stats.expired,
                            versions_removed = stats.versions_removed,
                            keys_removed = stats.keys_removed,
                            "Store pruned"
                        );
                    }
                }
            })?;

        Ok(Maintenance {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit
    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.stop();
    }
}
