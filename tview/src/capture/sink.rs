//! Bounded hand-off between capture buffers and the writer
//!
//! Two channels run in opposite directions: full segments flow to the writer
//! and emptied `Vec`s flow back so buffers can swap without allocating.
//!
//! A shared gate closes the queue for good. Sends hold it shared and never
//! wait for it, so once [`SegmentSource::close`] returns no segment can be
//! left behind in the queue: it was either drained or counted as dropped.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, TryLockError};

use super::{CapturedEvent, Segment};

/// Counters shared by every sink of a session
#[derive(Debug, Default)]
pub struct CaptureStats {
    submitted_segments: AtomicU64,
    submitted_events: AtomicU64,
    dropped_segments: AtomicU64,
    dropped_events: AtomicU64,
}

impl CaptureStats {
    #[must_use]
    pub fn submitted_segments(&self) -> u64 {
        self.submitted_segments.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn submitted_events(&self) -> u64 {
        self.submitted_events.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped_segments(&self) -> u64 {
        self.dropped_segments.load(Ordering::Relaxed)
    }

    /// Events lost because the writer queue was full or already closed
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn count_dropped(&self, events: usize) {
        let previous = self.dropped_segments.fetch_add(1, Ordering::Relaxed);
        self.dropped_events.fetch_add(events as u64, Ordering::Relaxed);
        if previous == 0 {
            warn!("trace writer queue is full or closed, dropping segments (further drops are counted silently)");
        }
    }
}

/// Producer side, cloned into every [`CaptureBuffer`](super::CaptureBuffer)
#[derive(Debug, Clone)]
pub struct SegmentSink {
    segments: Sender<Segment>,
    spares: Receiver<Vec<CapturedEvent>>,
    stats: Arc<CaptureStats>,
    closed: Arc<RwLock<bool>>,
}

/// Consumer side, owned by the writer
#[derive(Debug)]
pub struct SegmentSource {
    segments: Receiver<Segment>,
    spares: Sender<Vec<CapturedEvent>>,
    stats: Arc<CaptureStats>,
    closed: Arc<RwLock<bool>>,
}

/// Create a connected sink/source pair holding at most `max_pending` segments
#[must_use]
pub fn segment_channel(max_pending: usize) -> (SegmentSink, SegmentSource) {
    let max_pending = max_pending.max(1);
    let (segment_tx, segment_rx) = bounded(max_pending);
    let (spare_tx, spare_rx) = bounded(max_pending);
    let stats = Arc::new(CaptureStats::default());
    let closed = Arc::new(RwLock::new(false));
    (
        SegmentSink {
            segments: segment_tx,
            spares: spare_rx,
            stats: Arc::clone(&stats),
            closed: Arc::clone(&closed),
        },
        SegmentSource {
            segments: segment_rx,
            spares: spare_tx,
            stats,
            closed,
        },
    )
}

impl SegmentSink {
    /// Queue a segment without blocking.
    ///
    /// Returns `false` if the segment was dropped: the queue is full, the
    /// writer is closing or closed, or the writer is gone.
    pub fn submit(&self, segment: Segment) -> bool {
        let events = segment.events.len();
        let closed = match self.closed.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("trace writer is closing, dropping segment of {events} events");
                self.stats.count_dropped(events);
                return false;
            }
        };
        if *closed {
            debug!("trace writer is closed, dropping segment of {events} events");
            self.stats.count_dropped(events);
            return false;
        }

        match self.segments.try_send(segment) {
            Ok(()) => {
                self.stats.submitted_segments.fetch_add(1, Ordering::Relaxed);
                self.stats.submitted_events.fetch_add(events as u64, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.count_dropped(events);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("trace writer is gone, dropping segment of {events} events");
                self.stats.count_dropped(events);
                false
            }
        }
    }

    /// An empty buffer to swap in, recycled when one is available
    #[must_use]
    pub fn spare(&self, capacity: usize) -> Vec<CapturedEvent> {
        self.spares
            .try_recv()
            .unwrap_or_else(|_| Vec::with_capacity(capacity))
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }
}

impl SegmentSource {
    /// Drain every segment queued so far
    pub fn drain(&self) -> impl Iterator<Item = Segment> + '_ {
        self.segments.try_iter()
    }

    /// Close the queue and hand back everything still in it.
    ///
    /// Every later [`SegmentSink::submit`] fails and counts its events as
    /// dropped.
    pub fn close(&self) -> Vec<Segment> {
        let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
        *closed = true;
        self.segments.try_iter().collect()
    }

    /// Recount a drained segment the writer refused as dropped
    pub fn discard(&self, events: usize) {
        self.stats.submitted_segments.fetch_sub(1, Ordering::Relaxed);
        self.stats.submitted_events.fetch_sub(events as u64, Ordering::Relaxed);
        self.stats.count_dropped(events);
    }

    /// Return an emptied buffer to the producers; discarded if none are waiting
    pub fn recycle(&self, mut buffer: Vec<CapturedEvent>) {
        buffer.clear();
        let _ = self.spares.try_send(buffer);
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureEvent;
    use crate::domain::ThreadId;

    fn segment(events: usize) -> Segment {
        Segment {
            thread_id: ThreadId(1),
            thread_name: Arc::from("t"),
            events: (0..events)
                .map(|i| CapturedEvent {
                    timestamp_ns: i as u64,
                    event: CaptureEvent::ThreadStart,
                })
                .collect(),
        }
    }

    #[test]
    fn test_submit_and_drain() {
        let (sink, source) = segment_channel(4);
        assert!(sink.submit(segment(3)));
        assert!(sink.submit(segment(2)));

        let drained: Vec<_> = source.drain().collect();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].events.len(), 3);
        assert_eq!(sink.stats().submitted_events(), 5);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (sink, _source) = segment_channel(1);
        assert!(sink.submit(segment(4)));
        assert!(!sink.submit(segment(6)));
        assert_eq!(sink.stats().dropped_segments(), 1);
        assert_eq!(sink.stats().dropped_events(), 6);
    }

    #[test]
    fn test_disconnected_writer_counts_drop() {
        let (sink, source) = segment_channel(1);
        drop(source);
        assert!(!sink.submit(segment(2)));
        assert_eq!(sink.stats().dropped_events(), 2);
    }

    #[test]
    fn test_close_hands_back_queued_segments() {
        let (sink, source) = segment_channel(4);
        assert!(sink.submit(segment(3)));
        assert!(sink.submit(segment(1)));

        let remaining = source.close();
        assert_eq!(remaining.len(), 2);
        assert_eq!(source.drain().count(), 0);
    }

    #[test]
    fn test_submit_after_close_is_dropped_not_queued() {
        let (sink, source) = segment_channel(4);
        assert!(sink.submit(segment(2)));
        source.close();

        assert!(!sink.submit(segment(5)));
        assert_eq!(source.drain().count(), 0);
        assert_eq!(sink.stats().submitted_events(), 2);
        assert_eq!(sink.stats().dropped_segments(), 1);
        assert_eq!(sink.stats().dropped_events(), 5);
    }

    #[test]
    fn test_discard_moves_segment_from_submitted_to_dropped() {
        let (sink, source) = segment_channel(2);
        assert!(sink.submit(segment(3)));
        let drained: Vec<_> = source.drain().collect();
        source.discard(drained[0].events.len());

        assert_eq!(sink.stats().submitted_segments(), 0);
        assert_eq!(sink.stats().submitted_events(), 0);
        assert_eq!(sink.stats().dropped_events(), 3);
    }

    #[test]
    fn test_recycled_buffers_come_back_empty() {
        let (sink, source) = segment_channel(2);
        let mut buffer = Vec::with_capacity(64);
        buffer.push(CapturedEvent {
            timestamp_ns: 1,
            event: CaptureEvent::ThreadEnd,
        });
        source.recycle(buffer);

        let spare = sink.spare(8);
        assert!(spare.is_empty());
        assert!(spare.capacity() >= 64);
    }
}
