use tview::analysis::summarize;
use tview::capture::CaptureEvent;
use tview::domain::{Duration, ObjectId, SyncHandle, SyncKind, ThreadId};
use tview::reader::TraceReader;
use tview::reconstruct::{reconstruct_trace, AnomalyKind, Reconstruction, ThreadState, WaitTarget};
use tview::writer::TraceWriter;

const LOCK: SyncHandle = SyncHandle(0x7f00_1000);

fn encode(events: &[(u32, u64, CaptureEvent)]) -> Vec<u8> {
    let writer = TraceWriter::default();
    for (thread, ts, event) in events {
        writer.record(ThreadId(*thread), *ts, event.clone()).unwrap();
    }
    writer.name_sync_object(LOCK, SyncKind::Mutex, "queue lock").unwrap();
    writer.finalize().unwrap()
}

fn spans(reconstruction: &Reconstruction, thread: u32) -> Vec<(ThreadState, u64, u64)> {
    reconstruction
        .thread(ThreadId(thread))
        .unwrap()
        .intervals
        .iter()
        .map(|i| (i.state, i.start_ns, i.end_ns))
        .collect()
}

fn assert_contiguous(reconstruction: &Reconstruction) {
    for timeline in &reconstruction.threads {
        let mut cursor = timeline.start_ns;
        for interval in &timeline.intervals {
            assert_eq!(interval.start_ns, cursor, "{} has a hole or overlap", timeline.thread_id);
            assert!(interval.end_ns > interval.start_ns, "zero-length interval kept");
            cursor = interval.end_ns;
        }
        assert_eq!(cursor, timeline.end_ns, "{} does not reach its end", timeline.thread_id);
    }
}

/// T1 takes the lock uncontended, T2 waits for it until T1 releases
fn contended_pair() -> Vec<(u32, u64, CaptureEvent)> {
    vec![
        (1, 0, CaptureEvent::ThreadStart),
        (2, 0, CaptureEvent::ThreadStart),
        (1, 10, CaptureEvent::MutexLockAttempt(LOCK)),
        (1, 10, CaptureEvent::MutexLockAcquired(LOCK)),
        (2, 20, CaptureEvent::MutexLockAttempt(LOCK)),
        (1, 100, CaptureEvent::MutexUnlock(LOCK)),
        (2, 100, CaptureEvent::MutexLockAcquired(LOCK)),
        (2, 150, CaptureEvent::MutexUnlock(LOCK)),
        (1, 200, CaptureEvent::ThreadEnd),
        (2, 200, CaptureEvent::ThreadEnd),
    ]
}

#[test]
fn test_two_threads_contending_for_one_lock() {
    let bytes = encode(&contended_pair());
    let reader = TraceReader::open(&bytes).unwrap();
    let (reconstruction, error) = reconstruct_trace(&reader);
    assert!(error.is_none());
    assert!(reconstruction.anomalies.is_empty(), "{:?}", reconstruction.anomalies);

    assert_eq!(spans(&reconstruction, 1), vec![(ThreadState::Executing, 0, 200)]);
    assert_eq!(
        spans(&reconstruction, 2),
        vec![
            (ThreadState::Executing, 0, 20),
            (ThreadState::BlockedSync, 20, 100),
            (ThreadState::Executing, 100, 200),
        ]
    );

    let blocked = &reconstruction.thread(ThreadId(2)).unwrap().intervals[1];
    let wait = blocked.wait.expect("blocked interval names its target");
    assert_eq!(wait, WaitTarget::Mutex(ObjectId(1)));
    assert_eq!(wait.describe(&reader), "mutex queue lock");
    assert_contiguous(&reconstruction);
}

#[test]
fn test_contention_summary() {
    let bytes = encode(&contended_pair());
    let reader = TraceReader::open(&bytes).unwrap();
    let (reconstruction, _) = reconstruct_trace(&reader);
    let summary = summarize(&reconstruction);

    assert_eq!(summary.contention.len(), 1);
    let lock = &summary.contention[0];
    assert_eq!(lock.object, ObjectId(1));
    assert_eq!(lock.waits, 1);
    assert_eq!(lock.total_blocked, Duration(80));
    assert_eq!(lock.max_blocked, Duration(80));
    assert_eq!(lock.threads, 1);

    let t2 = summary.threads.iter().find(|t| t.thread_id == ThreadId(2)).unwrap();
    assert_eq!(t2.lifetime, Duration(200));
    assert_eq!(t2.blocked_sync, Duration(80));
    assert_eq!(t2.executing, Duration(120));
    assert!((t2.percentage(ThreadState::BlockedSync) - 40.0).abs() < 1e-9);
}

#[test]
fn test_sleep_and_io_without_lifecycle_events() {
    let bytes = encode(&[
        (3, 0, CaptureEvent::SleepStart { duration_ns: 40 }),
        (3, 50, CaptureEvent::SleepEnd),
        (3, 60, CaptureEvent::IoStart { operation: "fsync".into(), target: "wal.log".into() }),
        (3, 90, CaptureEvent::IoEnd),
        (4, 120, CaptureEvent::ThreadStart),
    ]);
    let reader = TraceReader::open(&bytes).unwrap();
    let (reconstruction, _) = reconstruct_trace(&reader);

    assert_eq!(
        spans(&reconstruction, 3),
        vec![
            (ThreadState::Sleeping, 0, 50),
            (ThreadState::Executing, 50, 60),
            (ThreadState::BlockedIo, 60, 90),
            (ThreadState::Executing, 90, 120),
        ]
    );
    let io = reconstruction.thread(ThreadId(3)).unwrap().intervals[2].wait.unwrap();
    assert_eq!(io.describe(&reader), "fsync wal.log");

    let kinds: Vec<_> = reconstruction.anomalies_for(ThreadId(3)).map(|a| a.kind.clone()).collect();
    assert_eq!(kinds, vec![AnomalyKind::MissingThreadStart, AnomalyKind::MissingThreadEnd]);
    assert_contiguous(&reconstruction);
}

#[test]
fn test_event_after_thread_end_fills_gap() {
    let bytes = encode(&[
        (1, 0, CaptureEvent::ThreadStart),
        (1, 50, CaptureEvent::ThreadEnd),
        (1, 80, CaptureEvent::SleepStart { duration_ns: 0 }),
        (1, 90, CaptureEvent::SleepEnd),
        (1, 100, CaptureEvent::ThreadEnd),
    ]);
    let reader = TraceReader::open(&bytes).unwrap();
    let (reconstruction, _) = reconstruct_trace(&reader);

    let kinds: Vec<_> = reconstruction.anomalies.iter().map(|a| a.kind.clone()).collect();
    assert!(kinds.contains(&AnomalyKind::TimelineGap { from_ns: 50, to_ns: 80 }));
    assert!(kinds.iter().any(|k| matches!(k, AnomalyKind::EventAfterThreadEnd { .. })));

    assert_eq!(
        spans(&reconstruction, 1),
        vec![
            (ThreadState::Executing, 0, 80),
            (ThreadState::Sleeping, 80, 90),
            (ThreadState::Executing, 90, 100),
        ]
    );
    assert_eq!(reconstruction.thread(ThreadId(1)).unwrap().end_ns, 100);
    assert_contiguous(&reconstruction);
}

#[test]
fn test_unmatched_unlock_and_uncontended_acquire() {
    let bytes = encode(&[
        (1, 0, CaptureEvent::ThreadStart),
        (1, 10, CaptureEvent::MutexUnlock(LOCK)),
        (1, 20, CaptureEvent::MutexLockAcquired(LOCK)),
        (1, 30, CaptureEvent::MutexUnlock(LOCK)),
        (1, 40, CaptureEvent::ThreadEnd),
    ]);
    let reader = TraceReader::open(&bytes).unwrap();
    let (reconstruction, _) = reconstruct_trace(&reader);

    let kinds: Vec<_> = reconstruction.anomalies.iter().map(|a| a.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            AnomalyKind::UnmatchedUnlock { mutex: ObjectId(1) },
            AnomalyKind::UncontendedAcquire { mutex: ObjectId(1) },
        ]
    );
    assert_eq!(spans(&reconstruction, 1), vec![(ThreadState::Executing, 0, 40)]);
}

#[test]
fn test_annotations_are_kept_per_thread() {
    let bytes = encode(&[
        (1, 0, CaptureEvent::ThreadStart),
        (1, 5, CaptureEvent::Annotation("phase one".into())),
        (2, 7, CaptureEvent::Annotation("elsewhere".into())),
        (1, 9, CaptureEvent::Annotation("phase two".into())),
        (1, 10, CaptureEvent::ThreadEnd),
    ]);
    let reader = TraceReader::open(&bytes).unwrap();
    let (reconstruction, _) = reconstruct_trace(&reader);

    let messages: Vec<_> = reconstruction
        .thread(ThreadId(1))
        .unwrap()
        .annotations
        .iter()
        .map(|a| (a.timestamp_ns, reader.resolve(a.message).unwrap()))
        .collect();
    assert_eq!(messages, vec![(5, "phase one"), (9, "phase two")]);
}

#[test]
fn test_timelines_tile_every_thread() {
    let mut events = contended_pair();
    events.push((5, 30, CaptureEvent::IoStart { operation: "read".into(), target: "sock".into() }));
    events.push((5, 60, CaptureEvent::IoEnd));
    events.push((5, 70, CaptureEvent::SleepStart { duration_ns: 10 }));

    let bytes = encode(&events);
    let reader = TraceReader::open(&bytes).unwrap();
    let (reconstruction, _) = reconstruct_trace(&reader);

    assert_eq!(reconstruction.threads.len(), 3);
    assert_contiguous(&reconstruction);
    let t5 = reconstruction.thread(ThreadId(5)).unwrap();
    assert_eq!(t5.end_ns, 200);
    assert_eq!(t5.time_in(ThreadState::Sleeping), 130);
}
