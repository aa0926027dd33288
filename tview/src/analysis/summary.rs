//! Contention and state-time summary of a reconstructed trace.
//!
//! Answers the two questions a first look at a trace usually asks: where did
//! each thread spend its time, and which sync objects made threads wait.
//!
//! # Architecture
//!
//! - **`ContentionStats`** - aggregates blocked intervals per sync object
//! - **`summarize()`** - batch summary of a whole [`Reconstruction`]
//!
//! ```text
//! SYNC OBJECT        WAITS     TOTAL        MAX   THREADS
//! ───────────────────────────────────────────────────────
//! queue lock           412   38.12ms     1.20ms         4
//! obj#7                 12    0.40ms     0.09ms         2
//! ```

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeSet, HashMap};

use crate::domain::{Duration, ObjectId, ThreadId};
use crate::reconstruct::{Reconstruction, ThreadState, ThreadTimeline};

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// Time one thread spent in each state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub thread_id: ThreadId,
    pub lifetime: Duration,
    pub executing: Duration,
    pub blocked_sync: Duration,
    pub blocked_io: Duration,
    pub sleeping: Duration,
    pub annotations: usize,
}

impl ThreadSummary {
    fn from_timeline(timeline: &ThreadTimeline) -> Self {
        Self {
            thread_id: timeline.thread_id,
            lifetime: Duration(timeline.end_ns - timeline.start_ns),
            executing: Duration(timeline.time_in(ThreadState::Executing)),
            blocked_sync: Duration(timeline.time_in(ThreadState::BlockedSync)),
            blocked_io: Duration(timeline.time_in(ThreadState::BlockedIo)),
            sleeping: Duration(timeline.time_in(ThreadState::Sleeping)),
            annotations: timeline.annotations.len(),
        }
    }

    #[must_use]
    pub fn time_in(&self, state: ThreadState) -> Duration {
        match state {
            ThreadState::Executing => self.executing,
            ThreadState::BlockedSync => self.blocked_sync,
            ThreadState::BlockedIo => self.blocked_io,
            ThreadState::Sleeping => self.sleeping,
        }
    }

    /// Share of the thread's lifetime spent in `state` (0.0 - 100.0)
    #[must_use]
    pub fn percentage(&self, state: ThreadState) -> f64 {
        if self.lifetime.0 == 0 {
            return 0.0;
        }
        self.time_in(state).0 as f64 / self.lifetime.0 as f64 * 100.0
    }
}

/// Blocking caused by one sync object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectContention {
    pub object: ObjectId,
    /// Number of blocked intervals waiting on this object
    pub waits: usize,
    pub total_blocked: Duration,
    pub max_blocked: Duration,
    /// Distinct threads that waited on it
    pub threads: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSummary {
    /// Ordered by thread id
    pub threads: Vec<ThreadSummary>,
    /// Ordered by total blocked time, most contended first
    pub contention: Vec<ObjectContention>,
    pub anomalies: usize,
}

// =============================================================================
// CONTENTION STATS (AGGREGATOR)
// =============================================================================

/// Running per-object contention totals
#[derive(Debug, Default)]
pub struct ContentionStats {
    objects: HashMap<ObjectId, ObjectStats>,
}

#[derive(Debug, Default)]
struct ObjectStats {
    waits: usize,
    total_ns: u64,
    max_ns: u64,
    threads: BTreeSet<ThreadId>,
}

impl ContentionStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every blocked-on-sync interval of `timeline`
    pub fn record_timeline(&mut self, timeline: &ThreadTimeline) {
        for interval in &timeline.intervals {
            if interval.state != ThreadState::BlockedSync {
                continue;
            }
            let Some(object) = interval.wait.and_then(|w| w.sync_object()) else {
                continue;
            };

            let stats = self.objects.entry(object).or_default();
            let blocked = interval.duration_ns();
            stats.waits += 1;
            stats.total_ns += blocked;
            stats.max_ns = stats.max_ns.max(blocked);
            stats.threads.insert(timeline.thread_id);
        }
    }

    /// Most contended first; ties broken by object id
    #[must_use]
    pub fn to_contention(&self) -> Vec<ObjectContention> {
        let mut contention: Vec<ObjectContention> = self
            .objects
            .iter()
            .map(|(&object, stats)| ObjectContention {
                object,
                waits: stats.waits,
                total_blocked: Duration(stats.total_ns),
                max_blocked: Duration(stats.max_ns),
                threads: stats.threads.len(),
            })
            .collect();

        contention.sort_unstable_by(|a, b| b.total_blocked.cmp(&a.total_blocked).then(a.object.cmp(&b.object)));
        contention
    }
}

/// Summarize a reconstruction (batch analysis).
#[must_use]
pub fn summarize(reconstruction: &Reconstruction) -> TraceSummary {
    let mut stats = ContentionStats::new();
    let threads = reconstruction
        .threads
        .iter()
        .map(|timeline| {
            stats.record_timeline(timeline);
            ThreadSummary::from_timeline(timeline)
        })
        .collect();

    TraceSummary {
        threads,
        contention: stats.to_contention(),
        anomalies: reconstruction.anomalies.len(),
    }
}
