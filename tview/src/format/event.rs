//! Event records: 16-byte header plus a typed payload.
//!
//! ```text
//! timestamp_ns:u64 | thread_id:u32 | event_type:u8 | data_size:u8 | padding:u16 | payload
//! ```
//!
//! | Tag | Kind                | Payload                                      |
//! |-----|---------------------|----------------------------------------------|
//! | 1   | THREAD_START        | none                                         |
//! | 2   | THREAD_END          | none                                         |
//! | 3   | MUTEX_LOCK_ATTEMPT  | `mutex_id:u64`                               |
//! | 4   | MUTEX_LOCK_ACQUIRED | `mutex_id:u64`                               |
//! | 5   | MUTEX_UNLOCK        | `mutex_id:u64`                               |
//! | 6   | CONDITION_WAIT      | `condition_id:u64, mutex_id:u64`             |
//! | 7   | CONDITION_SIGNAL    | `condition_id:u64`                           |
//! | 8   | ANNOTATION          | `message_offset:u32`                         |
//! | 9   | SLEEP_START         | `duration_ns:u64`                            |
//! | 10  | SLEEP_END           | none                                         |
//! | 11  | IO_START            | `operation_offset:u32, target_offset:u32`    |
//! | 12  | IO_END              | none                                         |
//!
//! `data_size` must equal the payload size of the tag exactly; anything else
//! is a [`FormatError::PayloadSizeMismatch`].

use std::fmt;
use std::io::{Result, Write};
use tview_common::{
    payload_size, EVENT_ANNOTATION, EVENT_CONDITION_SIGNAL, EVENT_CONDITION_WAIT,
    EVENT_HEADER_SIZE, EVENT_IO_END, EVENT_IO_START, EVENT_MUTEX_LOCK_ACQUIRED,
    EVENT_MUTEX_LOCK_ATTEMPT, EVENT_MUTEX_UNLOCK, EVENT_SLEEP_END, EVENT_SLEEP_START,
    EVENT_THREAD_END, EVENT_THREAD_START,
};

use super::{read_u32, read_u64};
use crate::domain::{FormatError, ObjectId, StrOffset, ThreadId};

/// The twelve event kinds, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ThreadStart,
    ThreadEnd,
    MutexLockAttempt,
    MutexLockAcquired,
    MutexUnlock,
    ConditionWait,
    ConditionSignal,
    Annotation,
    SleepStart,
    SleepEnd,
    IoStart,
    IoEnd,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::ThreadStart,
        EventKind::ThreadEnd,
        EventKind::MutexLockAttempt,
        EventKind::MutexLockAcquired,
        EventKind::MutexUnlock,
        EventKind::ConditionWait,
        EventKind::ConditionSignal,
        EventKind::Annotation,
        EventKind::SleepStart,
        EventKind::SleepEnd,
        EventKind::IoStart,
        EventKind::IoEnd,
    ];

    /// Wire tag
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            EventKind::ThreadStart => EVENT_THREAD_START,
            EventKind::ThreadEnd => EVENT_THREAD_END,
            EventKind::MutexLockAttempt => EVENT_MUTEX_LOCK_ATTEMPT,
            EventKind::MutexLockAcquired => EVENT_MUTEX_LOCK_ACQUIRED,
            EventKind::MutexUnlock => EVENT_MUTEX_UNLOCK,
            EventKind::ConditionWait => EVENT_CONDITION_WAIT,
            EventKind::ConditionSignal => EVENT_CONDITION_SIGNAL,
            EventKind::Annotation => EVENT_ANNOTATION,
            EventKind::SleepStart => EVENT_SLEEP_START,
            EventKind::SleepEnd => EVENT_SLEEP_END,
            EventKind::IoStart => EVENT_IO_START,
            EventKind::IoEnd => EVENT_IO_END,
        }
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        EventKind::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Exact `data_size` this kind is encoded with
    #[must_use]
    pub fn payload_size(self) -> u8 {
        payload_size(self.tag()).unwrap_or(0)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EventKind::ThreadStart => "THREAD_START",
            EventKind::ThreadEnd => "THREAD_END",
            EventKind::MutexLockAttempt => "MUTEX_LOCK_ATTEMPT",
            EventKind::MutexLockAcquired => "MUTEX_LOCK_ACQUIRED",
            EventKind::MutexUnlock => "MUTEX_UNLOCK",
            EventKind::ConditionWait => "CONDITION_WAIT",
            EventKind::ConditionSignal => "CONDITION_SIGNAL",
            EventKind::Annotation => "ANNOTATION",
            EventKind::SleepStart => "SLEEP_START",
            EventKind::SleepEnd => "SLEEP_END",
            EventKind::IoStart => "IO_START",
            EventKind::IoEnd => "IO_END",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded event payload, one variant per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ThreadStart,
    ThreadEnd,
    MutexLockAttempt { mutex: ObjectId },
    MutexLockAcquired { mutex: ObjectId },
    MutexUnlock { mutex: ObjectId },
    ConditionWait { condition: ObjectId, mutex: ObjectId },
    ConditionSignal { condition: ObjectId },
    Annotation { message: StrOffset },
    /// `duration_ns` is the requested sleep, 0 when unknown
    SleepStart { duration_ns: u64 },
    SleepEnd,
    IoStart { operation: StrOffset, target: StrOffset },
    IoEnd,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ThreadStart => EventKind::ThreadStart,
            Event::ThreadEnd => EventKind::ThreadEnd,
            Event::MutexLockAttempt { .. } => EventKind::MutexLockAttempt,
            Event::MutexLockAcquired { .. } => EventKind::MutexLockAcquired,
            Event::MutexUnlock { .. } => EventKind::MutexUnlock,
            Event::ConditionWait { .. } => EventKind::ConditionWait,
            Event::ConditionSignal { .. } => EventKind::ConditionSignal,
            Event::Annotation { .. } => EventKind::Annotation,
            Event::SleepStart { .. } => EventKind::SleepStart,
            Event::SleepEnd => EventKind::SleepEnd,
            Event::IoStart { .. } => EventKind::IoStart,
            Event::IoEnd => EventKind::IoEnd,
        }
    }
}

/// One event as stored in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    /// Nanoseconds since the trace start
    pub timestamp_ns: u64,
    pub thread_id: ThreadId,
    pub event: Event,
}

/// Encoded size of an event, header included
#[must_use]
pub fn wire_event_size(event: &Event) -> usize {
    EVENT_HEADER_SIZE + usize::from(event.kind().payload_size())
}

pub fn write_event(w: &mut impl Write, record: &EventRecord) -> Result<()> {
    let kind = record.event.kind();
    w.write_all(&record.timestamp_ns.to_le_bytes())?;
    w.write_all(&record.thread_id.0.to_le_bytes())?;
    w.write_all(&[kind.tag(), kind.payload_size()])?;
    w.write_all(&[0u8; 2])?;

    match record.event {
        Event::ThreadStart | Event::ThreadEnd | Event::SleepEnd | Event::IoEnd => {}
        Event::MutexLockAttempt { mutex }
        | Event::MutexLockAcquired { mutex }
        | Event::MutexUnlock { mutex } => {
            w.write_all(&mutex.0.to_le_bytes())?;
        }
        Event::ConditionWait { condition, mutex } => {
            w.write_all(&condition.0.to_le_bytes())?;
            w.write_all(&mutex.0.to_le_bytes())?;
        }
        Event::ConditionSignal { condition } => {
            w.write_all(&condition.0.to_le_bytes())?;
        }
        Event::Annotation { message } => {
            w.write_all(&message.0.to_le_bytes())?;
        }
        Event::SleepStart { duration_ns } => {
            w.write_all(&duration_ns.to_le_bytes())?;
        }
        Event::IoStart { operation, target } => {
            w.write_all(&operation.0.to_le_bytes())?;
            w.write_all(&target.0.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Decode the record starting at `at`, where `bytes` ends at the end of the
/// event stream. Returns the record and the offset of the next one.
///
/// # Errors
/// - [`FormatError::CorruptFormat`] if the header or payload would read past
///   the end of `bytes`, or the tag is unknown
/// - [`FormatError::PayloadSizeMismatch`] if `data_size` disagrees with the tag
pub fn decode_event(bytes: &[u8], at: usize) -> std::result::Result<(EventRecord, usize), FormatError> {
    let corrupt = |reason: String| FormatError::CorruptFormat { offset: at, reason };

    let payload_at = at
        .checked_add(EVENT_HEADER_SIZE)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            corrupt(format!(
                "record header needs {EVENT_HEADER_SIZE} bytes, {} left in event stream",
                bytes.len().saturating_sub(at)
            ))
        })?;

    let header_field = || corrupt("unreadable record header".to_string());
    let timestamp_ns = read_u64(bytes, at).ok_or_else(header_field)?;
    let thread_id = ThreadId(read_u32(bytes, at + 8).ok_or_else(header_field)?);
    let tag = bytes[at + 12];
    let data_size = bytes[at + 13];

    let kind = EventKind::from_tag(tag).ok_or_else(|| corrupt(format!("unknown event type {tag}")))?;
    let expected = kind.payload_size();
    if data_size != expected {
        return Err(FormatError::PayloadSizeMismatch {
            offset: at,
            event_type: tag,
            expected,
            found: data_size,
        });
    }

    let next = payload_at + usize::from(data_size);
    if next > bytes.len() {
        return Err(corrupt(format!(
            "{kind} payload of {data_size} bytes runs past the end of the event stream"
        )));
    }

    let payload = &bytes[payload_at..next];
    let field = || corrupt(format!("unreadable {kind} payload"));
    let object = |pos: usize| read_u64(payload, pos).map(ObjectId).ok_or_else(field);
    let offset = |pos: usize| read_u32(payload, pos).map(StrOffset).ok_or_else(field);

    let event = match kind {
        EventKind::ThreadStart => Event::ThreadStart,
        EventKind::ThreadEnd => Event::ThreadEnd,
        EventKind::MutexLockAttempt => Event::MutexLockAttempt { mutex: object(0)? },
        EventKind::MutexLockAcquired => Event::MutexLockAcquired { mutex: object(0)? },
        EventKind::MutexUnlock => Event::MutexUnlock { mutex: object(0)? },
        EventKind::ConditionWait => {
            Event::ConditionWait { condition: object(0)?, mutex: object(8)? }
        }
        EventKind::ConditionSignal => Event::ConditionSignal { condition: object(0)? },
        EventKind::Annotation => Event::Annotation { message: offset(0)? },
        EventKind::SleepStart => {
            Event::SleepStart { duration_ns: read_u64(payload, 0).ok_or_else(field)? }
        }
        EventKind::SleepEnd => Event::SleepEnd,
        EventKind::IoStart => Event::IoStart { operation: offset(0)?, target: offset(4)? },
        EventKind::IoEnd => Event::IoEnd,
    };

    Ok((EventRecord { timestamp_ns, thread_id, event }, next))
}
