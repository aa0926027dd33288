use std::io::Write;

use tview::capture::CaptureEvent;
use tview::domain::{ObjectId, SyncHandle, SyncKind, ThreadId};
use tview::format::{Event, EventKind};
use tview::reader::TraceReader;
use tview::writer::TraceWriter;

const BASE: u64 = 5_000_000;

/// One thread emitting every event kind, with absolute clock readings
/// starting at `BASE`
fn every_kind_trace() -> Vec<u8> {
    let writer = TraceWriter::default();
    let t = ThreadId(7);
    let lock = SyncHandle(0x1000);
    let cond = SyncHandle(0x2000);

    let events = [
        CaptureEvent::ThreadStart,
        CaptureEvent::MutexLockAttempt(lock),
        CaptureEvent::MutexLockAcquired(lock),
        CaptureEvent::ConditionWait { condition: cond, mutex: lock },
        CaptureEvent::MutexLockAcquired(lock),
        CaptureEvent::ConditionSignal(cond),
        CaptureEvent::MutexUnlock(lock),
        CaptureEvent::Annotation("checkpoint".into()),
        CaptureEvent::SleepStart { duration_ns: 2_500 },
        CaptureEvent::SleepEnd,
        CaptureEvent::IoStart { operation: "read".into(), target: "/etc/hosts".into() },
        CaptureEvent::IoEnd,
        CaptureEvent::ThreadEnd,
    ];
    for (i, event) in events.into_iter().enumerate() {
        writer.record(t, BASE + i as u64 * 100, event).unwrap();
    }
    writer.name_thread(t, "round-trip").unwrap();
    writer.name_sync_object(lock, SyncKind::Mutex, "state lock").unwrap();
    writer.finalize().unwrap()
}

#[test]
fn test_every_event_kind_survives_encoding() {
    let bytes = every_kind_trace();
    let reader = TraceReader::open(&bytes).expect("writer output must open");
    let decoded = reader.decode_all();
    assert!(decoded.error.is_none(), "unexpected error: {:?}", decoded.error);

    let kinds: Vec<EventKind> = decoded.events.iter().map(|r| r.event.kind()).collect();
    for kind in EventKind::ALL {
        assert!(kinds.contains(&kind), "{kind} missing from decoded stream");
    }
    assert_eq!(decoded.events.len(), 13);
    assert_eq!(reader.header().num_events, 13);

    // Relative timestamps, original spacing preserved
    for (i, record) in decoded.events.iter().enumerate() {
        assert_eq!(record.timestamp_ns, i as u64 * 100);
        assert_eq!(record.thread_id, ThreadId(7));
    }
}

#[test]
fn test_header_keeps_absolute_bounds() {
    let bytes = every_kind_trace();
    let reader = TraceReader::open(&bytes).unwrap();
    let header = reader.header();
    assert_eq!(header.start_time_ns, BASE);
    assert_eq!(header.end_time_ns, BASE + 1_200);
    assert_eq!(header.duration_ns(), 1_200);
    assert_eq!(header.num_threads, 1);
}

#[test]
fn test_strings_and_objects_resolve() {
    let bytes = every_kind_trace();
    let reader = TraceReader::open(&bytes).unwrap();
    let decoded = reader.decode_all();

    assert_eq!(reader.thread_name(ThreadId(7)), Some("round-trip"));
    let thread = reader.thread(ThreadId(7)).unwrap();
    assert_eq!(thread.start_time_ns, 0);
    assert_eq!(thread.end_time_ns, 1_200);

    assert_eq!(reader.sync_objects().len(), 2);
    let mut mutex = None;
    let mut condition = None;
    for record in &decoded.events {
        match record.event {
            Event::MutexLockAttempt { mutex: m } => mutex = Some(m),
            Event::ConditionWait { condition: c, mutex: m } => {
                condition = Some(c);
                assert_eq!(Some(m), mutex, "wait must reference the same mutex id");
            }
            Event::Annotation { message } => {
                assert_eq!(reader.resolve(message).unwrap(), "checkpoint");
            }
            Event::SleepStart { duration_ns } => assert_eq!(duration_ns, 2_500),
            Event::IoStart { operation, target } => {
                assert_eq!(reader.resolve(operation).unwrap(), "read");
                assert_eq!(reader.resolve(target).unwrap(), "/etc/hosts");
            }
            _ => {}
        }
    }

    let mutex = mutex.expect("lock attempt decoded");
    let condition = condition.expect("condition wait decoded");
    assert_eq!(mutex, ObjectId(1));
    assert_eq!(condition, ObjectId(2));
    assert_eq!(reader.object_kind(mutex), Some(SyncKind::Mutex));
    assert_eq!(reader.object_kind(condition), Some(SyncKind::Condition));
    assert_eq!(reader.object_name(mutex), Some("state lock"));
    assert_eq!(reader.object_name(condition), Some("0x2000"));
}

#[test]
fn test_encoding_is_reproducible() {
    assert_eq!(every_kind_trace(), every_kind_trace());
}

#[test]
fn test_round_trip_through_file() {
    let bytes = every_kind_trace();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let from_disk = std::fs::read(file.path()).unwrap();
    assert_eq!(from_disk, bytes);

    let reader = TraceReader::open(&from_disk).unwrap();
    let decoded = reader.decode_all();
    assert!(decoded.error.is_none());
    assert_eq!(decoded.events.len(), 13);
}

#[test]
fn test_empty_trace_is_header_only() {
    let bytes = TraceWriter::default().finalize().unwrap();
    assert_eq!(bytes.len(), tview_common::HEADER_SIZE);

    let reader = TraceReader::open(&bytes).unwrap();
    assert_eq!(reader.header().num_events, 0);
    assert_eq!(reader.header().duration_ns(), 0);
    assert!(reader.threads().is_empty());
    assert!(reader.sync_objects().is_empty());
    assert_eq!(reader.events().count(), 0);
}

#[test]
fn test_tables_start_right_after_the_header() {
    let bytes = every_kind_trace();
    let header_size = tview_common::HEADER_SIZE;

    // First ThreadInfo: thread_id 7 immediately after the 64-byte header
    assert_eq!(&bytes[header_size..header_size + 4], &7u32.to_le_bytes());
    assert!(bytes[40..header_size].iter().all(|&b| b == 0), "header padding must be zero");

    let reader = TraceReader::open(&bytes).unwrap();
    let header = reader.header();
    let tables = header_size + tview_common::THREAD_INFO_SIZE + 2 * tview_common::SYNC_OBJECT_INFO_SIZE;
    assert_eq!(header.string_table_offset as usize, tables);
    assert_eq!(
        header.events_offset() as usize + reader.events_size(),
        bytes.len(),
        "event stream must run to the end of the file"
    );
}
