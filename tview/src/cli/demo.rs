//! `record-demo`: a small lock-contention workload recorded through the
//! capture path, for trying the other subcommands without an instrumented
//! application at hand.
//!
//! Workers hammer one shared counter behind a `std::sync::Mutex`, sleep and
//! write to a sink now and then, and report completion through a `Condvar`
//! the main thread waits on.

use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::capture::{CaptureBuffer, CaptureEvent, Tracer};
use crate::config::CaptureConfig;
use crate::domain::{SyncHandle, SyncKind};

const SLEEP_EVERY: usize = 100;
const IO_EVERY: usize = 250;
const SLEEP_FOR: Duration = Duration::from_micros(50);

struct Shared {
    counter: Mutex<u64>,
    finished: Mutex<usize>,
    all_done: Condvar,
}

/// Lock `mutex` with attempt/acquired events around the real acquisition
fn traced_lock<'m, T>(buffer: &mut CaptureBuffer, mutex: &'m Mutex<T>) -> MutexGuard<'m, T> {
    let handle = SyncHandle::of(mutex);
    buffer.record(CaptureEvent::MutexLockAttempt(handle));
    let guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
    buffer.record(CaptureEvent::MutexLockAcquired(handle));
    guard
}

fn traced_unlock<T>(buffer: &mut CaptureBuffer, guard: MutexGuard<'_, T>, mutex: &Mutex<T>) {
    drop(guard);
    buffer.record(CaptureEvent::MutexUnlock(SyncHandle::of(mutex)));
}

fn worker(tracer: &Tracer, shared: &Shared, index: usize, iterations: usize) {
    let mut buffer = tracer.register_thread(&format!("worker-{index}"));
    let mut sink = std::io::sink();

    for i in 0..iterations {
        let mut count = traced_lock(&mut buffer, &shared.counter);
        *count += 1;
        // Hold the lock long enough to make others wait
        std::hint::black_box((0..200u64).sum::<u64>());
        traced_unlock(&mut buffer, count, &shared.counter);

        if i % SLEEP_EVERY == SLEEP_EVERY - 1 {
            buffer.record(CaptureEvent::SleepStart {
                duration_ns: u64::try_from(SLEEP_FOR.as_nanos()).unwrap_or(u64::MAX),
            });
            thread::sleep(SLEEP_FOR);
            buffer.record(CaptureEvent::SleepEnd);
        }

        if i % IO_EVERY == IO_EVERY - 1 {
            buffer.record(CaptureEvent::IoStart {
                operation: "write".into(),
                target: "/dev/null".into(),
            });
            let _ = writeln!(sink, "worker {index} at {i}");
            buffer.record(CaptureEvent::IoEnd);
        }
    }

    let mut finished = traced_lock(&mut buffer, &shared.finished);
    *finished += 1;
    buffer.record(CaptureEvent::ConditionSignal(SyncHandle::of(&shared.all_done)));
    shared.all_done.notify_all();
    traced_unlock(&mut buffer, finished, &shared.finished);

    buffer.finish();
}

/// Run the workload and write the trace to `output`
pub(super) fn record(output: &Path, threads: usize, iterations: usize, options: Option<&str>) -> Result<()> {
    let mut config = CaptureConfig::from_env().context("Invalid TVIEW_OPTIONS")?;
    if let Some(options) = options {
        config.apply(options).context("Invalid --options")?;
    }
    config.output_path = output.to_path_buf();

    let tracer = Tracer::start(config).context("Failed to start trace session")?;
    let shared = Arc::new(Shared {
        counter: Mutex::new(0),
        finished: Mutex::new(0),
        all_done: Condvar::new(),
    });
    let counter = SyncHandle::of(&shared.counter);
    let finished = SyncHandle::of(&shared.finished);
    let all_done = SyncHandle::of(&shared.all_done);
    tracer.name_sync_object(counter, SyncKind::Mutex, "counter")?;
    tracer.name_sync_object(finished, SyncKind::Mutex, "finished")?;
    tracer.name_sync_object(all_done, SyncKind::Condition, "all done")?;

    info!("Recording demo: {threads} workers x {iterations} iterations");
    tracer.annotate("workers starting");

    let handles = (0..threads)
        .map(|index| {
            let tracer = tracer.clone();
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("worker-{index}"))
                .spawn(move || worker(&tracer, &shared, index, iterations))
                .context("Failed to spawn worker thread")
        })
        .collect::<Result<Vec<_>>>()?;

    // Main thread records through the thread-local buffer
    tracer.record(CaptureEvent::MutexLockAttempt(finished));
    let mut done = shared.finished.lock().unwrap_or_else(PoisonError::into_inner);
    tracer.record(CaptureEvent::MutexLockAcquired(finished));
    while *done < threads {
        tracer.record(CaptureEvent::ConditionWait {
            condition: all_done,
            mutex: finished,
        });
        done = shared.all_done.wait(done).unwrap_or_else(PoisonError::into_inner);
        tracer.record(CaptureEvent::MutexLockAcquired(finished));
    }
    drop(done);
    tracer.record(CaptureEvent::MutexUnlock(finished));

    for handle in handles {
        if handle.join().is_err() {
            anyhow::bail!("A demo worker panicked");
        }
    }
    tracer.annotate("workers finished");

    let counted = *shared.counter.lock().unwrap_or_else(PoisonError::into_inner);
    let path = tracer.finish_to_file().context("Failed to write trace")?;
    println!(
        "Recorded {} lock round-trips from {threads} workers to {} ({} segments, {} events dropped)",
        counted,
        path.display(),
        tracer.recorded_segments(),
        tracer.dropped_events()
    );
    Ok(())
}
