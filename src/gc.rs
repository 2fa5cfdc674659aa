//! Value log garbage collection
//!
//! [`collect`] rewrites segments until the engine reports there is nothing
//! left worth rewriting. [`GcWorker`] does the same on a named thread every
//! `gc_interval`, pausing `gc_sleep` between segments so a long pass does not
//! monopolise the log.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cairn_engine::{Engine, EngineError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Reclaim segments until none reaches `discard_ratio`
///
/// Returns the number of segments rewritten.
pub(crate) fn collect(engine: &Engine, discard_ratio: f64) -> Result<usize, EngineError> {
    let mut rewritten = 0;
    loop {
        match engine.reclaim_space(discard_ratio) {
            Ok(_) => rewritten += 1,
            Err(EngineError::NoRewrite) => return Ok(rewritten),
            Err(e) => return Err(e),
        }
    }
}

struct Shared {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    /// Sleep for `duration` or until stopped; returns false once stopped
    fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        !*stopped
    }
}

/// Periodic garbage collection thread
pub(crate) struct GcWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl GcWorker {
    pub(crate) fn start(
        engine: Arc<Engine>,
        interval: Duration,
        pause: Duration,
        discard_ratio: f64,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let worker = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("cairn-gc".to_string())
            .spawn(move || {
                while worker.pause(interval) {
                    let mut rewritten = 0;
                    loop {
                        match engine.reclaim_space(discard_ratio) {
                            Ok(_) => rewritten += 1,
                            Err(EngineError::NoRewrite) | Err(EngineError::Closed) => break,
                            Err(e) => {
                                warn!(target: "cairn::gc", error = %e, "Periodic value log GC failed");
                                break;
                            }
                        }
                        if !worker.pause(pause) {
                            return;
                        }
                    }
                    debug!(target: "cairn::gc", rewritten, "Periodic value log GC pass done");
                }
            })?;

        Ok(GcWorker {
            shared,
            handle: Some(handle),
        })
    }

    /// Wake the thread, tell it to exit and wait for it
    pub(crate) fn stop(&mut self) {
        *self.shared.stopped.lock() = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GcWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for GcWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcWorker")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_engine::EngineConfig;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Arc<Engine> {
        let config = EngineConfig {
            sync_writes: false,
            maintenance_interval_ms: 0,
            ..Default::default()
        };
        Engine::open(dir.path(), config).unwrap()
    }

    fn overwrite_sealed_segment(engine: &Arc<Engine>) {
        let big = vec![7u8; 4096];
        for i in 0..8 {
            let mut txn = engine.begin(false).unwrap();
            txn.set(format!("/k{}", i).as_bytes(), big.as_slice()).unwrap();
            txn.commit().unwrap();
        }
        engine.rotate_log().unwrap();
        for i in 0..8 {
            let mut txn = engine.begin(false).unwrap();
            txn.delete(format!("/k{}", i).as_bytes()).unwrap();
            txn.commit().unwrap();
        }
    }

    #[test]
    fn collect_runs_until_nothing_qualifies() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        assert_eq!(collect(&engine, 0.5).unwrap(), 0);

        overwrite_sealed_segment(&engine);
        assert_eq!(collect(&engine, 0.5).unwrap(), 1);
        assert_eq!(collect(&engine, 0.5).unwrap(), 0);
    }

    #[test]
    fn worker_reclaims_in_the_background() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        overwrite_sealed_segment(&engine);
        let before = engine.disk_usage();

        let mut worker = GcWorker::start(
            Arc::clone(&engine),
            Duration::from_millis(20),
            Duration::from_millis(1),
            0.5,
        )
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.disk_usage() >= before && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        worker.stop();
        assert!(engine.disk_usage() < before);
    }

    #[test]
    fn stop_interrupts_a_long_interval() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut worker =
            GcWorker::start(engine, Duration::from_secs(3600), Duration::from_secs(3600), 0.5)
                .unwrap();
        let started = Instant::now();
        worker.stop();
        worker.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
