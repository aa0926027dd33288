//! # Event Capture
//!
//! The hot path application threads run through. Every traced thread owns a
//! [`CaptureBuffer`]; recording appends to it without touching any shared
//! lock. Full (or stale) buffers are swapped for a recycled spare and the
//! full segment goes to the writer through a bounded queue.
//!
//! ```text
//!  app thread A ──record──▶ CaptureBuffer A ─┐
//!  app thread B ──record──▶ CaptureBuffer B ─┼─ try_send(Segment) ─▶ bounded queue
//!  app thread C ──record──▶ CaptureBuffer C ─┘                          │
//!                 ▲                                                     ▼
//!                 └──────── spare Vec (recycled) ◀──────────── TraceWriter::pump
//! ```
//!
//! - Timestamps come from one [`TraceClock`] shared by all buffers, so
//!   ordering across threads by timestamp is meaningful.
//! - Sending never blocks: when the queue is full the segment is dropped and
//!   counted in [`CaptureStats`].
//! - [`Tracer`] ties a writer, a clock and a background collector together
//!   and offers a thread-local recording API.

pub mod buffer;
pub mod clock;
pub mod session;
pub mod sink;

pub use buffer::CaptureBuffer;
pub use clock::TraceClock;
pub use session::Tracer;
pub use sink::{segment_channel, CaptureStats, SegmentSink, SegmentSource};

use std::borrow::Cow;
use std::sync::Arc;

use crate::domain::{SyncHandle, ThreadId};

/// Event as produced by instrumentation, before interning
///
/// Sync objects are still raw [`SyncHandle`]s and strings are owned or
/// static text; the writer turns them into object ids and string offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    ThreadStart,
    ThreadEnd,
    MutexLockAttempt(SyncHandle),
    MutexLockAcquired(SyncHandle),
    MutexUnlock(SyncHandle),
    ConditionWait { condition: SyncHandle, mutex: SyncHandle },
    ConditionSignal(SyncHandle),
    Annotation(Cow<'static, str>),
    SleepStart { duration_ns: u64 },
    SleepEnd,
    IoStart { operation: Cow<'static, str>, target: Cow<'static, str> },
    IoEnd,
}

/// A [`CaptureEvent`] stamped with the shared clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Absolute reading of the session clock
    pub timestamp_ns: u64,
    pub event: CaptureEvent,
}

/// Drained contents of one thread's buffer
#[derive(Debug)]
pub struct Segment {
    pub thread_id: ThreadId,
    pub thread_name: Arc<str>,
    pub events: Vec<CapturedEvent>,
}
