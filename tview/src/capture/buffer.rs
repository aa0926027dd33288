use log::trace;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use super::{CaptureEvent, CapturedEvent, Segment, SegmentSink, TraceClock};
use crate::config::CaptureConfig;
use crate::domain::ThreadId;

/// Events recorded by one thread, waiting to be handed to the writer
///
/// Owned by exactly one thread; recording is a `Vec::push` plus two
/// comparisons. A flush swaps in a spare `Vec` and queues the full one, so
/// the recording thread never waits for the writer.
///
/// Flush triggers:
/// - size: the buffer reached its capacity
/// - time: the last flush is older than the flush interval (checked on record)
/// - exit: the buffer is dropped
#[derive(Debug)]
pub struct CaptureBuffer {
    thread_id: ThreadId,
    thread_name: Arc<str>,
    events: Vec<CapturedEvent>,
    capacity: usize,
    flush_interval_ns: u64,
    last_flush_ns: u64,
    clock: TraceClock,
    sink: SegmentSink,
}

impl CaptureBuffer {
    #[must_use]
    pub fn new(
        thread_id: ThreadId,
        thread_name: impl Into<Arc<str>>,
        clock: TraceClock,
        sink: SegmentSink,
        config: &CaptureConfig,
    ) -> Self {
        let capacity = config.buffer_capacity.max(1);
        Self {
            thread_id,
            thread_name: thread_name.into(),
            events: Vec::with_capacity(capacity),
            capacity,
            flush_interval_ns: duration_ns(config.flush_interval),
            last_flush_ns: clock.now_ns(),
            clock,
            sink,
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Events recorded since the last flush
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Record `event` stamped with the shared clock
    pub fn record(&mut self, event: CaptureEvent) {
        let now = self.clock.now_ns();
        self.record_at(now, event);
    }

    /// Record `event` with a caller-supplied timestamp from the same clock
    pub fn record_at(&mut self, timestamp_ns: u64, event: CaptureEvent) {
        self.events.push(CapturedEvent { timestamp_ns, event });
        if self.events.len() >= self.capacity
            || timestamp_ns.saturating_sub(self.last_flush_ns) >= self.flush_interval_ns
        {
            self.flush_at(timestamp_ns);
        }
    }

    /// Hand buffered events to the writer queue.
    ///
    /// Returns `false` if the queue rejected the segment; the events are then
    /// counted as dropped.
    pub fn flush(&mut self) -> bool {
        let now = self.clock.now_ns();
        self.flush_at(now)
    }

    /// Record `THREAD_END` and flush
    pub fn finish(mut self) {
        self.record(CaptureEvent::ThreadEnd);
        // Drop flushes whatever the record above left behind
    }

    fn flush_at(&mut self, now_ns: u64) -> bool {
        self.last_flush_ns = now_ns;
        if self.events.is_empty() {
            return true;
        }

        let spare = self.sink.spare(self.capacity);
        let events = mem::replace(&mut self.events, spare);
        trace!("{} flushing {} events", self.thread_id, events.len());
        self.sink.submit(Segment {
            thread_id: self.thread_id,
            thread_name: Arc::clone(&self.thread_name),
            events,
        })
    }
}

impl Drop for CaptureBuffer {
    fn drop(&mut self) {
        self.flush();
    }
}

fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{segment_channel, SegmentSource};
    use crate::domain::SyncHandle;

    fn buffer_with(capacity: usize, flush_ms: u64) -> (CaptureBuffer, SegmentSource) {
        let (sink, source) = segment_channel(16);
        let config = CaptureConfig {
            buffer_capacity: capacity,
            flush_interval: Duration::from_millis(flush_ms),
            ..CaptureConfig::default()
        };
        let buffer = CaptureBuffer::new(ThreadId(1), "worker", TraceClock::new(), sink, &config);
        (buffer, source)
    }

    #[test]
    fn test_record_stays_local_until_full() {
        let (mut buffer, source) = buffer_with(4, 60_000);
        buffer.record(CaptureEvent::ThreadStart);
        buffer.record(CaptureEvent::MutexLockAttempt(SyncHandle(0xaa)));
        assert_eq!(buffer.len(), 2);
        assert_eq!(source.drain().count(), 0);
    }

    #[test]
    fn test_size_trigger_flushes() {
        let (mut buffer, source) = buffer_with(3, 60_000);
        for _ in 0..3 {
            buffer.record(CaptureEvent::SleepEnd);
        }
        assert!(buffer.is_empty());

        let segments: Vec<_> = source.drain().collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].thread_id, ThreadId(1));
        assert_eq!(&*segments[0].thread_name, "worker");
        assert_eq!(segments[0].events.len(), 3);
    }

    #[test]
    fn test_time_trigger_flushes() {
        let (mut buffer, source) = buffer_with(1024, 1);
        let start = buffer.last_flush_ns;
        buffer.record_at(start, CaptureEvent::ThreadStart);
        assert_eq!(buffer.len(), 1);
        buffer.record_at(start + 2_000_000, CaptureEvent::SleepEnd);
        assert!(buffer.is_empty());
        assert_eq!(source.drain().next().unwrap().events.len(), 2);
    }

    #[test]
    fn test_drop_flushes_remaining_events() {
        let (mut buffer, source) = buffer_with(1024, 60_000);
        buffer.record(CaptureEvent::ThreadStart);
        drop(buffer);
        assert_eq!(source.drain().next().unwrap().events.len(), 1);
    }

    #[test]
    fn test_finish_appends_thread_end() {
        let (mut buffer, source) = buffer_with(1024, 60_000);
        buffer.record(CaptureEvent::ThreadStart);
        buffer.finish();
        let events = source.drain().next().unwrap().events;
        assert_eq!(events.last().unwrap().event, CaptureEvent::ThreadEnd);
    }

    #[test]
    fn test_recording_order_and_timestamps_preserved() {
        let (mut buffer, source) = buffer_with(1024, 60_000);
        buffer.record_at(10, CaptureEvent::ThreadStart);
        buffer.record_at(10, CaptureEvent::MutexLockAttempt(SyncHandle(1)));
        buffer.record_at(5, CaptureEvent::MutexLockAcquired(SyncHandle(1)));
        buffer.flush();

        let events = source.drain().next().unwrap().events;
        let stamps: Vec<u64> = events.iter().map(|e| e.timestamp_ns).collect();
        assert_eq!(stamps, vec![10, 10, 5]);
    }

    #[test]
    fn test_full_queue_drops_segment() {
        let (sink, _source) = segment_channel(1);
        let config = CaptureConfig {
            buffer_capacity: 1,
            ..CaptureConfig::default()
        };
        let mut buffer = CaptureBuffer::new(ThreadId(2), "t", TraceClock::new(), sink.clone(), &config);
        buffer.record(CaptureEvent::ThreadStart);
        buffer.record(CaptureEvent::ThreadEnd);
        assert_eq!(sink.stats().dropped_events(), 1);
        assert!(buffer.is_empty());
    }
}
