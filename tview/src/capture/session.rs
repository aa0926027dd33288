//! Capture session: one writer, one clock, one collector thread
//!
//! [`Tracer`] is the entry point instrumentation talks to. Threads either
//! take an explicit [`CaptureBuffer`] with [`Tracer::register_thread`] or just
//! call [`Tracer::record`], which registers the calling thread on first use
//! and keeps its buffer in a thread-local. The thread-local buffer records
//! `THREAD_END` and flushes when the thread exits.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::borrow::Cow;
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{CaptureBuffer, CaptureEvent, TraceClock};
use crate::config::CaptureConfig;
use crate::domain::{SyncHandle, SyncKind, ThreadId, WriterError};
use crate::writer::TraceWriter;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<LocalBuffer>> = const { RefCell::new(None) };
}

/// Buffer owned by the thread-local slot, tagged with its session
struct LocalBuffer {
    session: u64,
    buffer: CaptureBuffer,
}

impl Drop for LocalBuffer {
    fn drop(&mut self) {
        self.buffer.record(CaptureEvent::ThreadEnd);
    }
}

#[derive(Debug)]
struct Collector {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct TracerInner {
    session: u64,
    config: CaptureConfig,
    clock: TraceClock,
    writer: Arc<TraceWriter>,
    next_thread_id: AtomicU32,
    active: AtomicBool,
    collector: Mutex<Option<Collector>>,
}

/// Handle to a running capture session; clones share the session
#[derive(Debug, Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Tracer {
    /// Start a session and its background collector.
    ///
    /// # Errors
    /// [`WriterError::Io`] if the collector thread cannot be spawned.
    pub fn start(config: CaptureConfig) -> Result<Self, WriterError> {
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let writer = Arc::new(TraceWriter::from_config(&config));
        let collector = spawn_collector(Arc::clone(&writer), config.flush_interval, config.debug)?;

        info!(
            "Trace session {} started (buffer={}, flush={:?}, queue={}, output={})",
            session,
            config.buffer_capacity,
            config.flush_interval,
            config.max_pending_segments,
            config.output_path.display()
        );

        Ok(Self {
            inner: Arc::new(TracerInner {
                session,
                config,
                clock: TraceClock::new(),
                writer,
                next_thread_id: AtomicU32::new(1),
                active: AtomicBool::new(true),
                collector: Mutex::new(Some(collector)),
            }),
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn clock(&self) -> TraceClock {
        self.inner.clock
    }

    /// Allocate a thread id and a buffer for it; `THREAD_START` is recorded
    /// immediately.
    #[must_use]
    pub fn register_thread(&self, name: &str) -> CaptureBuffer {
        let thread_id = ThreadId(self.inner.next_thread_id.fetch_add(1, Ordering::Relaxed));
        debug!("Registered {thread_id} as {name:?}");
        let mut buffer = CaptureBuffer::new(
            thread_id,
            name,
            self.inner.clock,
            self.inner.writer.sink(),
            &self.inner.config,
        );
        buffer.record(CaptureEvent::ThreadStart);
        buffer
    }

    /// Record on the calling thread; a no-op once the session finished
    pub fn record(&self, event: CaptureEvent) {
        if !self.is_active() {
            return;
        }
        self.with_current(|buffer| buffer.record(event));
    }

    pub fn annotate(&self, message: impl Into<Cow<'static, str>>) {
        self.record(CaptureEvent::Annotation(message.into()));
    }

    /// # Errors
    /// [`WriterError::WriterClosed`] once the session finished.
    pub fn name_sync_object(&self, handle: SyncHandle, kind: SyncKind, name: &str) -> Result<(), WriterError> {
        self.inner.writer.name_sync_object(handle, kind, name)
    }

    /// Segments handed to the writer queue so far
    #[must_use]
    pub fn recorded_segments(&self) -> u64 {
        self.inner.writer.capture_stats().submitted_segments()
    }

    /// Events lost to a full writer queue
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.inner.writer.capture_stats().dropped_events()
    }

    /// Stop capturing and encode the trace.
    ///
    /// The calling thread's buffer is closed and flushed. Buffers still held
    /// by other threads contribute only what they flushed before this call.
    ///
    /// # Errors
    /// [`WriterError::WriterClosed`] on a second call, or any encode error.
    pub fn finish(&self) -> Result<Vec<u8>, WriterError> {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return Err(WriterError::WriterClosed);
        }

        self.release_current_thread();
        self.stop_collector();

        let bytes = self.inner.writer.finalize()?;
        info!(
            "Trace session {} finished: {} bytes, {} segments, {} events dropped",
            self.inner.session,
            bytes.len(),
            self.recorded_segments(),
            self.dropped_events()
        );
        Ok(bytes)
    }

    /// [`Tracer::finish`] and write the trace to the configured output path.
    ///
    /// # Errors
    /// As [`Tracer::finish`], plus [`WriterError::Io`] if the file cannot be written.
    pub fn finish_to_file(&self) -> Result<PathBuf, WriterError> {
        let bytes = self.finish()?;
        let path = self.inner.config.output_path.clone();
        std::fs::write(&path, bytes)?;
        info!("Trace written to {}", path.display());
        Ok(path)
    }

    fn with_current(&self, f: impl FnOnce(&mut CaptureBuffer)) {
        // Fails only during thread-local teardown; the event is lost
        let _ = CURRENT.try_with(|cell| {
            let Ok(mut slot) = cell.try_borrow_mut() else {
                return;
            };
            if slot.as_ref().map(|local| local.session) != Some(self.inner.session) {
                let name = thread::current()
                    .name()
                    .map_or_else(|| format!("{:?}", thread::current().id()), str::to_string);
                *slot = Some(LocalBuffer {
                    session: self.inner.session,
                    buffer: self.register_thread(&name),
                });
            }
            if let Some(local) = slot.as_mut() {
                f(&mut local.buffer);
            }
        });
    }

    fn release_current_thread(&self) {
        let released = CURRENT
            .try_with(|cell| {
                let mut slot = cell.try_borrow_mut().ok()?;
                if slot.as_ref()?.session == self.inner.session {
                    slot.take()
                } else {
                    None
                }
            })
            .ok()
            .flatten();
        // Dropping records THREAD_END and flushes
        drop(released);
    }

    fn stop_collector(&self) {
        let collector = self
            .inner
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Collector { stop, handle }) = collector {
            let _ = stop.send(());
            if handle.join().is_err() {
                warn!("Trace collector thread panicked");
            }
        }
    }
}

fn spawn_collector(writer: Arc<TraceWriter>, interval: Duration, verbose: bool) -> std::io::Result<Collector> {
    let (stop, stop_rx) = bounded::<()>(1);
    let handle = thread::Builder::new()
        .name("tview-collector".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => match writer.pump() {
                    Ok(merged) if verbose && merged > 0 => info!("Collector merged {merged} segments"),
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Collector stopping: {e}");
                        break;
                    }
                },
                // Stop requested, or the session handle is gone
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;
    Ok(Collector { stop, handle })
}
