//! Value log reclamation
//!
//! Sealed segments accumulate records that no longer describe the newest
//! state of their keys. Reclamation measures each sealed segment, rewrites
//! the live part of the best candidate into the active segment and deletes
//! the old file.
//!
//! Liveness of one logged operation at version `v`, judged against the
//! newest in-memory entry for its key:
//!
//! | logged op | newest entry            | outcome                  |
//! |-----------|-------------------------|--------------------------|
//! | put       | live value at `v`       | rewritten as is          |
//! | put       | tombstone or expired at `v` | rewritten as a delete |
//! | put       | absent (pruned)         | rewritten as a delete    |
//! | any       | newer than `v`          | dropped                  |
//! | delete    | absent or at `v`        | rewritten as is          |
//!
//! The newest record of every key is always kept in some form, so replaying
//! the log after a rewrite never resurrects an older value.

use cairn_durability::{CommitRecord, LogOp, ValueLog};
use cairn_storage::OrderedStore;
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Counted against every logged operation when weighing a segment
const OP_OVERHEAD: u64 = 16;

/// Outcome of one successful reclamation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Segment that was rewritten and removed
    pub segment: u64,
    /// Bytes the segment occupied
    pub segment_bytes: u64,
    /// Operations carried over to the active segment
    pub rewritten_ops: usize,
    /// Operations dropped
    pub dropped_ops: usize,
}

enum Fate {
    Keep,
    /// Carry over as a delete at the same version
    Bury,
    Drop,
}

fn fate(op: &LogOp, version: u64, store: &OrderedStore, now: u64) -> Result<Fate> {
    let latest = store.get_latest(op.key())?;
    Ok(match (op, latest) {
        (_, Some(sv)) if sv.version() > version => Fate::Drop,
        (LogOp::Put { .. }, Some(sv)) if sv.version() == version && sv.is_live_at(now) => {
            Fate::Keep
        }
        (LogOp::Put { .. }, Some(sv)) if sv.version() == version => Fate::Bury,
        (LogOp::Put { .. }, None) => Fate::Bury,
        (LogOp::Delete { .. }, None) => Fate::Keep,
        (LogOp::Delete { .. }, Some(sv)) if sv.version() == version => Fate::Keep,
        // the store can only be behind the log if apply failed after append
        (_, Some(_)) => Fate::Keep,
    })
}

fn weight(op: &LogOp) -> u64 {
    let bytes = match op {
        LogOp::Put { key, value, .. } => key.len() + value.len(),
        LogOp::Delete { key } => key.len(),
    };
    bytes as u64 + OP_OVERHEAD
}

struct Plan {
    segment: u64,
    segment_bytes: u64,
    discard_ratio: f64,
    records: Vec<CommitRecord>,
    rewritten_ops: usize,
    dropped_ops: usize,
}

fn plan_segment(
    log: &ValueLog,
    store: &OrderedStore,
    segment: u64,
    segment_bytes: u64,
    now: u64,
) -> Result<Plan> {
    let mut total = 0u64;
    let mut discarded = 0u64;
    let mut records = Vec::new();
    let mut rewritten_ops = 0;
    let mut dropped_ops = 0;

    for logged in log.read_segment(segment)? {
        let version = logged.record.version;
        let mut carried = Vec::new();
        for op in logged.record.ops {
            let w = weight(&op);
            total += w;
            match fate(&op, version, store, now)? {
                Fate::Keep => carried.push(op),
                Fate::Bury => {
                    discarded += w;
                    carried.push(LogOp::Delete {
                        key: op.key().to_vec(),
                    });
                }
                Fate::Drop => {
                    discarded += w;
                    dropped_ops += 1;
                }
            }
        }
        if !carried.is_empty() {
            rewritten_ops += carried.len();
            records.push(CommitRecord {
                version,
                timestamp: logged.record.timestamp,
                ops: carried,
            });
        }
    }

    let discard_ratio = if total == 0 {
        1.0
    } else {
        discarded as f64 / total as f64
    };
    Ok(Plan {
        segment,
        segment_bytes,
        discard_ratio,
        records,
        rewritten_ops,
        dropped_ops,
    })
}

/// Rewrite at most one sealed segment whose discard ratio reaches `discard_ratio`
///
/// The caller holds the commit lock for the whole call. Returns
/// [`EngineError::NoRewrite`] when no segment qualifies.
pub(crate) fn reclaim(
    log: &mut ValueLog,
    store: &OrderedStore,
    discard_ratio: f64,
    now: u64,
) -> Result<ReclaimStats> {
    if !(discard_ratio > 0.0 && discard_ratio < 1.0) {
        return Err(EngineError::InvalidArgument(format!(
            "discard ratio must be in (0, 1), got {}",
            discard_ratio
        )));
    }

    let mut best: Option<Plan> = None;
    for (segment, bytes) in log.sealed_segments() {
        let plan = plan_segment(log, store, segment, bytes, now)?;
        debug!(
            target: "cairn::gc",
            segment,
            bytes,
            ratio = plan.discard_ratio,
            "Segment measured"
        );
        if plan.discard_ratio < discard_ratio {
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |b| plan.discard_ratio > b.discard_ratio)
        {
            best = Some(plan);
        }
    }

    let plan = best.ok_or(EngineError::NoRewrite)?;
    for record in &plan.records {
        log.append(record)?;
    }
    log.sync()?;
    log.remove_segment(plan.segment)?;

    info!(
        target: "cairn::gc",
        segment = plan.segment,
        bytes = plan.segment_bytes,
        ratio = plan.discard_ratio,
        rewritten = plan.rewritten_ops,
        dropped = plan.dropped_ops,
        "Value log segment reclaimed"
    );
    Ok(ReclaimStats {
        segment: plan.segment,
        segment_bytes: plan.segment_bytes,
        rewritten_ops: plan.rewritten_ops,
        dropped_ops: plan.dropped_ops,
    })
}
