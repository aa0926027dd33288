//! # Thread State Reconstruction
//!
//! Replays the decoded event stream through a per-thread state machine and
//! produces, for every thread, a gap-free sequence of state intervals.
//!
//! ```text
//!   (none)    ── THREAD_START ─────────────────────▶ EXECUTING
//!   EXECUTING ── MUTEX_LOCK_ATTEMPT, CONDITION_WAIT ─▶ BLOCKED_SYNC ── MUTEX_LOCK_ACQUIRED ─▶ EXECUTING
//!   EXECUTING ── IO_START ─────────────────────────▶ BLOCKED_IO   ── IO_END ──────────────▶ EXECUTING
//!   EXECUTING ── SLEEP_START ──────────────────────▶ SLEEPING     ── SLEEP_END ───────────▶ EXECUTING
//!   any       ── THREAD_END ───────────────────────▶ (closed)
//! ```
//!
//! Anything the table does not allow is reported as an [`Anomaly`] and
//! leaves the state unchanged; reconstruction never fails on bad input.

mod state_machine;

pub use state_machine::StateReconstructor;
pub use tview_common::ThreadState;

use std::fmt;

use crate::domain::{Duration, FormatError, ObjectId, StrOffset, ThreadId};
use crate::format::EventKind;
use crate::reader::TraceReader;

/// What a non-executing thread is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitTarget {
    Mutex(ObjectId),
    Condition { condition: ObjectId, mutex: ObjectId },
    Io { operation: StrOffset, target: StrOffset },
    Sleep { requested_ns: u64 },
}

impl WaitTarget {
    /// Sync object blocked on, if any
    #[must_use]
    pub fn sync_object(&self) -> Option<ObjectId> {
        match *self {
            WaitTarget::Mutex(mutex) => Some(mutex),
            WaitTarget::Condition { condition, .. } => Some(condition),
            WaitTarget::Io { .. } | WaitTarget::Sleep { .. } => None,
        }
    }

    /// Human-readable target, with names resolved through `reader`
    #[must_use]
    pub fn describe(&self, reader: &TraceReader<'_>) -> String {
        let object = |id: ObjectId| reader.object_name(id).map_or_else(|| id.to_string(), str::to_string);
        let text = |offset: StrOffset| reader.resolve(offset).unwrap_or("?");

        match *self {
            WaitTarget::Mutex(mutex) => format!("mutex {}", object(mutex)),
            WaitTarget::Condition { condition, mutex } => {
                format!("condition {} (mutex {})", object(condition), object(mutex))
            }
            WaitTarget::Io { operation, target } => format!("{} {}", text(operation), text(target)),
            WaitTarget::Sleep { requested_ns: 0 } => "sleep".to_string(),
            WaitTarget::Sleep { requested_ns } => format!("sleep {}", Duration(requested_ns)),
        }
    }
}

/// Half-open span `[start_ns, end_ns)` spent in one state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub state: ThreadState,
    pub start_ns: u64,
    pub end_ns: u64,
    pub wait: Option<WaitTarget>,
}

impl Interval {
    #[must_use]
    pub fn duration_ns(&self) -> u64 {
        self.end_ns - self.start_ns
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    pub timestamp_ns: u64,
    pub message: StrOffset,
}

/// Reconstructed history of one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTimeline {
    pub thread_id: ThreadId,
    pub start_ns: u64,
    pub end_ns: u64,
    /// Ordered, non-overlapping and contiguous
    pub intervals: Vec<Interval>,
    pub annotations: Vec<Annotation>,
}

impl ThreadTimeline {
    /// Total time spent in `state`
    #[must_use]
    pub fn time_in(&self, state: ThreadState) -> u64 {
        self.intervals
            .iter()
            .filter(|i| i.state == state)
            .map(Interval::duration_ns)
            .sum()
    }

    /// State at `timestamp_ns`, if inside the timeline
    #[must_use]
    pub fn state_at(&self, timestamp_ns: u64) -> Option<ThreadState> {
        self.intervals
            .iter()
            .find(|i| i.start_ns <= timestamp_ns && timestamp_ns < i.end_ns)
            .map(|i| i.state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnomalyKind {
    /// First event of the thread was not `THREAD_START`
    MissingThreadStart,
    /// Thread never emitted `THREAD_END`; left open to the trace end
    MissingThreadEnd,
    /// Event not allowed in the thread's current state
    UnexpectedEvent { event: EventKind, state: ThreadState },
    /// Unlock of a mutex the thread did not acquire
    UnmatchedUnlock { mutex: ObjectId },
    /// `MUTEX_LOCK_ACQUIRED` without a preceding attempt (zero-length block)
    UncontendedAcquire { mutex: ObjectId },
    /// Block ended by acquiring a different mutex than the one waited for
    MismatchedAcquire { expected: ObjectId, acquired: ObjectId },
    /// Event after `THREAD_END`; the timeline was reopened
    EventAfterThreadEnd { event: EventKind },
    /// Span between `THREAD_END` and a later event, filled with the prior state
    TimelineGap { from_ns: u64, to_ns: u64 },
    /// Timestamp went backwards in the stored order; events were re-sorted
    OutOfOrderTimestamp { previous_ns: u64 },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::MissingThreadStart => write!(f, "no THREAD_START, started implicitly"),
            AnomalyKind::MissingThreadEnd => write!(f, "no THREAD_END, open until trace end"),
            AnomalyKind::UnexpectedEvent { event, state } => {
                write!(f, "{event} is not valid while {}", state.name())
            }
            AnomalyKind::UnmatchedUnlock { mutex } => write!(f, "unlock of {mutex} without a matching acquire"),
            AnomalyKind::UncontendedAcquire { mutex } => write!(f, "{mutex} acquired without a lock attempt"),
            AnomalyKind::MismatchedAcquire { expected, acquired } => {
                write!(f, "{acquired} acquired while waiting for {expected}")
            }
            AnomalyKind::EventAfterThreadEnd { event } => write!(f, "{event} after THREAD_END"),
            AnomalyKind::TimelineGap { from_ns, to_ns } => {
                write!(f, "gap {from_ns}..{to_ns} ns filled with the previous state")
            }
            AnomalyKind::OutOfOrderTimestamp { previous_ns } => {
                write!(f, "timestamp earlier than preceding event at {previous_ns} ns")
            }
        }
    }
}

/// Non-fatal diagnostic produced while reconstructing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub thread_id: ThreadId,
    pub timestamp_ns: u64,
    pub kind: AnomalyKind,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ns: {}", self.thread_id, self.timestamp_ns, self.kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction {
    /// One timeline per thread, ordered by thread id
    pub threads: Vec<ThreadTimeline>,
    pub anomalies: Vec<Anomaly>,
}

impl Reconstruction {
    #[must_use]
    pub fn thread(&self, thread_id: ThreadId) -> Option<&ThreadTimeline> {
        self.threads.iter().find(|t| t.thread_id == thread_id)
    }

    pub fn anomalies_for(&self, thread_id: ThreadId) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter().filter(move |a| a.thread_id == thread_id)
    }
}

/// Reconstruct every decodable event of `reader`.
///
/// A corrupt stream still yields the timelines of the decoded prefix; the
/// error that stopped decoding is returned next to them.
#[must_use]
pub fn reconstruct_trace(reader: &TraceReader<'_>) -> (Reconstruction, Option<FormatError>) {
    let decoded = reader.decode_all();
    let mut reconstructor = StateReconstructor::new(reader.header().duration_ns());
    reconstructor.ingest_all(&decoded.events);
    (reconstructor.finish(), decoded.error)
}
