//! # Trace Writer
//!
//! Single consumer of the capture queue and sole owner of everything that
//! ends up in the trace file.
//!
//! ```text
//!   Segment (thread A) ─┐                          ┌─ header
//!   Segment (thread B) ─┼─▶ accept ─▶ pending ─▶ finalize ─┼─ thread table
//!   record(...)       ──┘   (lock per segment)  sort + intern ├─ sync table
//!                                                          ├─ string table
//!                                                          └─ event stream
//! ```
//!
//! Accepting only appends. The ordering by `(timestamp, thread id)`, string
//! interning and sync object numbering all happen in [`TraceWriter::finalize`]
//! over the merged stream, so the bytes produced depend only on the recorded
//! events and not on how thread scheduling interleaved the segments.

pub mod registry;

pub use registry::{SyncObjectRecord, SyncRegistry};

use log::{debug, info};
use std::collections::BTreeMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tview_common::{HEADER_SIZE, SYNC_OBJECT_INFO_SIZE, THREAD_INFO_SIZE, TRACE_FORMAT_VERSION, TRACE_MAGIC};

use crate::capture::{segment_channel, CaptureEvent, CaptureStats, CapturedEvent, Segment, SegmentSink, SegmentSource};
use crate::config::{CaptureConfig, DEFAULT_MAX_PENDING_SEGMENTS};
use crate::domain::{SyncHandle, SyncKind, ThreadId, WriterError};
use crate::format::{wire_event_size, write_event, Event, EventRecord, StringTable, SyncObjectInfo, ThreadInfo, TraceHeader};

/// Collects drained segments and encodes them into a `.tview` byte sequence
#[derive(Debug)]
pub struct TraceWriter {
    state: Mutex<WriterState>,
    source: SegmentSource,
    sink: SegmentSink,
}

#[derive(Debug, Default)]
struct WriterState {
    closed: bool,
    threads: BTreeMap<ThreadId, ThreadEntry>,
    events: Vec<PendingEvent>,
    object_names: Vec<(SyncHandle, SyncKind, String)>,
    accepted_segments: u64,
}

#[derive(Debug, Default)]
struct ThreadEntry {
    name: Option<Arc<str>>,
    first_ns: Option<u64>,
    end_ns: Option<u64>,
}

#[derive(Debug)]
struct PendingEvent {
    timestamp_ns: u64,
    thread_id: ThreadId,
    event: CaptureEvent,
}

impl WriterState {
    fn ensure_open(&self) -> Result<(), WriterError> {
        if self.closed {
            Err(WriterError::WriterClosed)
        } else {
            Ok(())
        }
    }

    fn push(&mut self, thread_id: ThreadId, timestamp_ns: u64, event: CaptureEvent) {
        let entry = self.threads.entry(thread_id).or_default();
        entry.first_ns = Some(entry.first_ns.map_or(timestamp_ns, |first| first.min(timestamp_ns)));
        if event == CaptureEvent::ThreadEnd {
            entry.end_ns = Some(entry.end_ns.map_or(timestamp_ns, |end| end.max(timestamp_ns)));
        }
        self.events.push(PendingEvent {
            timestamp_ns,
            thread_id,
            event,
        });
    }

    /// Append one segment; hands back its emptied buffer
    fn merge(&mut self, segment: Segment) -> Vec<CapturedEvent> {
        let Segment {
            thread_id,
            thread_name,
            mut events,
        } = segment;

        let entry = self.threads.entry(thread_id).or_default();
        if entry.name.is_none() {
            entry.name = Some(thread_name);
        }
        for captured in events.drain(..) {
            self.push(thread_id, captured.timestamp_ns, captured.event);
        }
        self.accepted_segments += 1;
        events
    }
}

impl Default for TraceWriter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_SEGMENTS)
    }
}

impl TraceWriter {
    /// Writer whose capture queue holds at most `max_pending_segments`
    #[must_use]
    pub fn new(max_pending_segments: usize) -> Self {
        let (sink, source) = segment_channel(max_pending_segments);
        Self {
            state: Mutex::new(WriterState::default()),
            source,
            sink,
        }
    }

    #[must_use]
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.max_pending_segments)
    }

    /// Producer handle for [`CaptureBuffer`](crate::capture::CaptureBuffer)s
    #[must_use]
    pub fn sink(&self) -> SegmentSink {
        self.sink.clone()
    }

    #[must_use]
    pub fn capture_stats(&self) -> &Arc<CaptureStats> {
        self.source.stats()
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        // State stays consistent across a panicking holder: every update is a push
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a single event outside of any buffer.
    ///
    /// # Errors
    /// [`WriterError::WriterClosed`] after [`TraceWriter::finalize`].
    pub fn record(&self, thread_id: ThreadId, timestamp_ns: u64, event: CaptureEvent) -> Result<(), WriterError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.push(thread_id, timestamp_ns, event);
        Ok(())
    }

    /// Merge one drained segment; the lock is held only while appending it.
    ///
    /// # Errors
    /// [`WriterError::WriterClosed`] after [`TraceWriter::finalize`].
    pub fn accept_segment(&self, segment: Segment) -> Result<(), WriterError> {
        let emptied = {
            let mut state = self.lock();
            state.ensure_open()?;
            state.merge(segment)
        };

        self.source.recycle(emptied);
        Ok(())
    }

    /// Accept every segment currently queued; returns how many were merged.
    ///
    /// # Errors
    /// [`WriterError::WriterClosed`] if finalization won the race for a
    /// drained segment; that segment is counted as dropped.
    pub fn pump(&self) -> Result<usize, WriterError> {
        let mut accepted = 0;
        for segment in self.source.drain() {
            let events = segment.events.len();
            if let Err(err) = self.accept_segment(segment) {
                self.source.discard(events);
                return Err(err);
            }
            accepted += 1;
        }
        Ok(accepted)
    }

    /// Set the display name of a thread, overriding the buffer's name
    ///
    /// # Errors
    /// [`WriterError::WriterClosed`] after [`TraceWriter::finalize`].
    pub fn name_thread(&self, thread_id: ThreadId, name: &str) -> Result<(), WriterError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.threads.entry(thread_id).or_default().name = Some(Arc::from(name));
        Ok(())
    }

    /// Set the display name of a sync object; unnamed objects show their handle.
    ///
    /// # Errors
    /// [`WriterError::WriterClosed`] after [`TraceWriter::finalize`].
    pub fn name_sync_object(&self, handle: SyncHandle, kind: SyncKind, name: &str) -> Result<(), WriterError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.object_names.push((handle, kind, name.to_string()));
        Ok(())
    }

    /// Events accepted so far
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the queue and the writer, then encode the trace.
    ///
    /// Segments still queued are merged under the same lock that closes the
    /// writer. Anything submitted afterwards is counted as dropped.
    ///
    /// # Errors
    /// - [`WriterError::WriterClosed`] if already finalized
    /// - [`WriterError::TooLarge`] if a table or count exceeds the format's
    ///   u32 fields
    pub fn finalize(&self) -> Result<Vec<u8>, WriterError> {
        let (threads, events, object_names, segments) = {
            let mut state = self.lock();
            state.ensure_open()?;
            for segment in self.source.close() {
                state.merge(segment);
            }
            state.closed = true;
            (
                mem::take(&mut state.threads),
                mem::take(&mut state.events),
                mem::take(&mut state.object_names),
                state.accepted_segments,
            )
        };

        let event_count = events.len();
        let bytes = encode(&threads, events, object_names)?;
        info!(
            "Finalized trace: {} events from {} segments, {} bytes ({} events dropped)",
            event_count,
            segments,
            bytes.len(),
            self.capture_stats().dropped_events()
        );
        Ok(bytes)
    }
}

fn too_large(what: &'static str) -> impl Fn(std::num::TryFromIntError) -> WriterError {
    move |_| WriterError::TooLarge { what }
}

/// Two-pass encode: resolve and size everything, then write in file order
fn encode(
    threads: &BTreeMap<ThreadId, ThreadEntry>,
    mut events: Vec<PendingEvent>,
    object_names: Vec<(SyncHandle, SyncKind, String)>,
) -> Result<Vec<u8>, WriterError> {
    // Stable: equal (timestamp, thread) pairs keep recording order
    events.sort_by_key(|e| (e.timestamp_ns, e.thread_id));
    let start_ns = events.first().map_or(0, |e| e.timestamp_ns);
    let end_ns = events.last().map_or(0, |e| e.timestamp_ns);

    let mut strings = StringTable::new();
    let mut registry = SyncRegistry::new();

    // ==========================================================================
    // Pass 1: intern strings and objects in stream order, compute sizes
    // ==========================================================================

    let mut records = Vec::with_capacity(events.len());
    let mut events_size = 0usize;
    for pending in &events {
        let event = resolve_event(&pending.event, &mut strings, &mut registry)?;
        events_size += wire_event_size(&event);
        records.push(EventRecord {
            timestamp_ns: pending.timestamp_ns - start_ns,
            thread_id: pending.thread_id,
            event,
        });
    }

    for (handle, kind, name) in object_names {
        registry.set_name(handle, kind, name);
    }

    let mut thread_infos = Vec::with_capacity(threads.len());
    for (&thread_id, entry) in threads {
        // Threads without events do not appear in the trace
        let Some(first_ns) = entry.first_ns else {
            continue;
        };
        let name_offset = match &entry.name {
            Some(name) => strings.intern(name)?,
            None => strings.intern(&format!("thread-{}", thread_id.0))?,
        };
        thread_infos.push(ThreadInfo {
            thread_id,
            name_offset,
            start_time_ns: first_ns - start_ns,
            end_time_ns: entry.end_ns.unwrap_or(end_ns) - start_ns,
        });
    }

    let mut sync_infos = Vec::with_capacity(registry.len());
    for record in registry.records() {
        sync_infos.push(SyncObjectInfo {
            object_id: record.id,
            name_offset: strings.intern(&record.display_name())?,
            kind: record.kind,
        });
    }

    let tables_size =
        HEADER_SIZE + thread_infos.len() * THREAD_INFO_SIZE + sync_infos.len() * SYNC_OBJECT_INFO_SIZE;
    let header = TraceHeader {
        magic: TRACE_MAGIC,
        version: TRACE_FORMAT_VERSION,
        start_time_ns: start_ns,
        end_time_ns: end_ns,
        num_threads: u32::try_from(thread_infos.len()).map_err(too_large("thread table"))?,
        num_events: u32::try_from(records.len()).map_err(too_large("event count"))?,
        string_table_offset: u32::try_from(tables_size).map_err(too_large("metadata tables"))?,
        string_table_size: u32::try_from(strings.as_bytes().len()).map_err(too_large("string table"))?,
    };
    let total_size = tables_size + strings.as_bytes().len() + events_size;

    debug!(
        "Encoding trace: {} threads, {} sync objects, {} strings, {} events, {} bytes",
        thread_infos.len(),
        sync_infos.len(),
        strings.len(),
        records.len(),
        total_size
    );

    // ==========================================================================
    // Pass 2: write
    // ==========================================================================

    let mut out = Vec::with_capacity(total_size);
    header.write(&mut out)?;
    for info in &thread_infos {
        info.write(&mut out)?;
    }
    for info in &sync_infos {
        info.write(&mut out)?;
    }
    out.extend_from_slice(strings.as_bytes());
    for record in &records {
        write_event(&mut out, record)?;
    }

    debug_assert_eq!(out.len(), total_size);
    Ok(out)
}

fn resolve_event(
    event: &CaptureEvent,
    strings: &mut StringTable,
    registry: &mut SyncRegistry,
) -> Result<Event, WriterError> {
    let mutex = |handle: SyncHandle, registry: &mut SyncRegistry| registry.identify(handle, SyncKind::Mutex);

    Ok(match event {
        CaptureEvent::ThreadStart => Event::ThreadStart,
        CaptureEvent::ThreadEnd => Event::ThreadEnd,
        CaptureEvent::MutexLockAttempt(handle) => Event::MutexLockAttempt {
            mutex: mutex(*handle, registry),
        },
        CaptureEvent::MutexLockAcquired(handle) => Event::MutexLockAcquired {
            mutex: mutex(*handle, registry),
        },
        CaptureEvent::MutexUnlock(handle) => Event::MutexUnlock {
            mutex: mutex(*handle, registry),
        },
        CaptureEvent::ConditionWait { condition, mutex: held } => Event::ConditionWait {
            condition: registry.identify(*condition, SyncKind::Condition),
            mutex: mutex(*held, registry),
        },
        CaptureEvent::ConditionSignal(handle) => Event::ConditionSignal {
            condition: registry.identify(*handle, SyncKind::Condition),
        },
        CaptureEvent::Annotation(message) => Event::Annotation {
            message: strings.intern(message)?,
        },
        CaptureEvent::SleepStart { duration_ns } => Event::SleepStart {
            duration_ns: *duration_ns,
        },
        CaptureEvent::SleepEnd => Event::SleepEnd,
        CaptureEvent::IoStart { operation, target } => Event::IoStart {
            operation: strings.intern(operation)?,
            target: strings.intern(target)?,
        },
        CaptureEvent::IoEnd => Event::IoEnd,
    })
}
