//! # Trace Reader
//!
//! Zero-copy access to a finalized trace. [`TraceReader::open`] validates
//! everything the header declares up front; events are decoded lazily and
//! each record is bounds-checked on its own, so a corrupt record stops the
//! stream without losing the records before it.
//!
//! ```text
//! 0        64              64+24·T          string_table_offset    +size        EOF
//! ├─header─┼─thread table──┼─sync table─────┼─string table─────────┼─events──────┤
//! ```
//!
//! The sync table has no count of its own; it fills the gap between the
//! thread table and the string table, which must be a whole number of
//! records.

use std::iter::FusedIterator;
use tview_common::{EVENT_HEADER_SIZE, HEADER_SIZE, SYNC_OBJECT_INFO_SIZE, THREAD_INFO_SIZE};

use crate::domain::{FormatError, ObjectId, StrOffset, SyncKind, ThreadId};
use crate::format::{decode_event, EventRecord, StringTableView, SyncObjectInfo, ThreadInfo, TraceHeader};

/// Header field offsets, reported in errors
const NUM_THREADS_FIELD: usize = 24;
const STRING_TABLE_OFFSET_FIELD: usize = 32;

#[derive(Debug, Clone)]
pub struct TraceReader<'a> {
    bytes: &'a [u8],
    header: TraceHeader,
    threads: Vec<ThreadInfo>,
    sync_objects: Vec<SyncObjectInfo>,
    strings: StringTableView<'a>,
    events_offset: usize,
}

/// Outcome of decoding the whole stream: the good prefix and what stopped it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvents {
    pub events: Vec<EventRecord>,
    pub error: Option<FormatError>,
}

impl<'a> TraceReader<'a> {
    /// Validate the header and load the metadata tables.
    ///
    /// # Errors
    /// - [`FormatError::BadMagic`] / [`FormatError::UnsupportedVersion`]
    /// - [`FormatError::TruncatedFile`] if a declared table runs past the buffer
    /// - [`FormatError::CorruptFormat`] if the tables overlap or the sync
    ///   table is not a whole number of records
    pub fn open(bytes: &'a [u8]) -> Result<Self, FormatError> {
        let header = TraceHeader::parse(bytes)?;
        let available = bytes.len() as u64;

        let events_offset = header.events_offset();
        if events_offset > available {
            return Err(FormatError::TruncatedFile {
                what: "string table",
                needed: events_offset,
                available,
            });
        }

        let string_table_offset = u64::from(header.string_table_offset);
        let threads_end = HEADER_SIZE as u64 + u64::from(header.num_threads) * THREAD_INFO_SIZE as u64;
        if threads_end > available {
            return Err(FormatError::TruncatedFile {
                what: "thread table",
                needed: threads_end,
                available,
            });
        }
        if threads_end > string_table_offset {
            return Err(FormatError::CorruptFormat {
                offset: NUM_THREADS_FIELD,
                reason: format!(
                    "thread table ends at {threads_end} but the string table starts at {string_table_offset}"
                ),
            });
        }

        let sync_bytes = string_table_offset - threads_end;
        if sync_bytes % SYNC_OBJECT_INFO_SIZE as u64 != 0 {
            return Err(FormatError::CorruptFormat {
                offset: STRING_TABLE_OFFSET_FIELD,
                reason: format!("sync object table of {sync_bytes} bytes is not a whole number of records"),
            });
        }

        // All bounds below are within `bytes` after the checks above
        let threads_end = threads_end as usize;
        let string_table_offset = string_table_offset as usize;
        let events_offset = events_offset as usize;

        let threads = bytes[HEADER_SIZE..threads_end]
            .chunks_exact(THREAD_INFO_SIZE)
            .filter_map(ThreadInfo::parse)
            .collect();
        let sync_objects = bytes[threads_end..string_table_offset]
            .chunks_exact(SYNC_OBJECT_INFO_SIZE)
            .filter_map(SyncObjectInfo::parse)
            .collect();

        Ok(Self {
            bytes,
            header,
            threads,
            sync_objects,
            strings: StringTableView::new(&bytes[string_table_offset..events_offset]),
            events_offset,
        })
    }

    #[must_use]
    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    #[must_use]
    pub fn threads(&self) -> &[ThreadInfo] {
        &self.threads
    }

    #[must_use]
    pub fn thread(&self, thread_id: ThreadId) -> Option<&ThreadInfo> {
        self.threads.iter().find(|t| t.thread_id == thread_id)
    }

    #[must_use]
    pub fn sync_objects(&self) -> &[SyncObjectInfo] {
        &self.sync_objects
    }

    #[must_use]
    pub fn sync_object(&self, object_id: ObjectId) -> Option<&SyncObjectInfo> {
        self.sync_objects.iter().find(|o| o.object_id == object_id)
    }

    #[must_use]
    pub fn strings(&self) -> StringTableView<'a> {
        self.strings
    }

    /// # Errors
    /// See [`StringTableView::resolve`].
    pub fn resolve(&self, offset: StrOffset) -> Result<&'a str, FormatError> {
        self.strings.resolve(offset)
    }

    /// Name of a thread, `None` if unknown or its name entry is malformed
    #[must_use]
    pub fn thread_name(&self, thread_id: ThreadId) -> Option<&'a str> {
        let thread = self.thread(thread_id)?;
        self.strings.resolve(thread.name_offset).ok()
    }

    #[must_use]
    pub fn object_name(&self, object_id: ObjectId) -> Option<&'a str> {
        let object = self.sync_object(object_id)?;
        self.strings.resolve(object.name_offset).ok()
    }

    #[must_use]
    pub fn object_kind(&self, object_id: ObjectId) -> Option<SyncKind> {
        self.sync_object(object_id).map(|o| o.kind)
    }

    /// Size of the event stream in bytes
    #[must_use]
    pub fn events_size(&self) -> usize {
        self.bytes.len() - self.events_offset
    }

    /// Lazy pass over the event stream; call again to restart
    #[must_use]
    pub fn events(&self) -> EventIter<'a> {
        EventIter {
            bytes: self.bytes,
            at: self.events_offset,
            decoded: 0,
            declared: self.header.num_events,
            done: false,
        }
    }

    /// Decode everything, keeping the valid prefix if the stream is corrupt
    #[must_use]
    pub fn decode_all(&self) -> DecodedEvents {
        // The declared count is untrusted; every record takes at least a header
        let capacity = (self.header.num_events as usize).min(self.events_size() / EVENT_HEADER_SIZE);
        let mut events = Vec::with_capacity(capacity);
        let mut error = None;
        for item in self.events() {
            match item {
                Ok(record) => events.push(record),
                Err(e) => error = Some(e),
            }
        }
        DecodedEvents { events, error }
    }
}

/// Iterator over encoded events; yields at most one error, then stops
#[derive(Debug, Clone)]
pub struct EventIter<'a> {
    bytes: &'a [u8],
    at: usize,
    decoded: u32,
    declared: u32,
    done: bool,
}

impl Iterator for EventIter<'_> {
    type Item = Result<EventRecord, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.at >= self.bytes.len() {
            self.done = true;
            if self.decoded != self.declared {
                return Some(Err(FormatError::CorruptFormat {
                    offset: self.at,
                    reason: format!(
                        "header declares {} events but the stream holds {}",
                        self.declared, self.decoded
                    ),
                }));
            }
            return None;
        }

        match decode_event(self.bytes, self.at) {
            Ok((record, next)) => {
                self.at = next;
                self.decoded = self.decoded.saturating_add(1);
                Some(Ok(record))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for EventIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureEvent;
    use crate::domain::SyncHandle;
    use crate::writer::TraceWriter;

    fn sample_trace() -> Vec<u8> {
        let writer = TraceWriter::default();
        let t = ThreadId(1);
        writer.record(t, 1_000, CaptureEvent::ThreadStart).unwrap();
        writer.record(t, 1_010, CaptureEvent::MutexLockAttempt(SyncHandle(0xaa))).unwrap();
        writer.record(t, 1_050, CaptureEvent::MutexLockAcquired(SyncHandle(0xaa))).unwrap();
        writer.record(t, 1_100, CaptureEvent::ThreadEnd).unwrap();
        writer.name_thread(t, "main").unwrap();
        writer.finalize().unwrap()
    }

    #[test]
    fn test_open_exposes_tables() {
        let bytes = sample_trace();
        let reader = TraceReader::open(&bytes).unwrap();
        assert_eq!(reader.threads().len(), 1);
        assert_eq!(reader.thread_name(ThreadId(1)), Some("main"));
        assert_eq!(reader.sync_objects().len(), 1);
        assert_eq!(reader.object_name(ObjectId(1)), Some("0xaa"));
        assert_eq!(reader.object_kind(ObjectId(1)), Some(SyncKind::Mutex));
        assert_eq!(reader.thread_name(ThreadId(9)), None);
    }

    #[test]
    fn test_events_are_restartable() {
        let bytes = sample_trace();
        let reader = TraceReader::open(&bytes).unwrap();
        let first: Vec<_> = reader.events().collect::<Result<_, _>>().unwrap();
        let second: Vec<_> = reader.events().collect::<Result<_, _>>().unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
        assert_eq!(first[0].timestamp_ns, 0);
        assert_eq!(first[3].timestamp_ns, 100);
    }

    #[test]
    fn test_sync_gap_must_be_whole_records() {
        let mut bytes = sample_trace();
        let header = TraceHeader::parse(&bytes).unwrap();
        let shifted = header.string_table_offset - 1;
        bytes[32..36].copy_from_slice(&shifted.to_le_bytes());
        assert!(matches!(
            TraceReader::open(&bytes),
            Err(FormatError::CorruptFormat { offset: STRING_TABLE_OFFSET_FIELD, .. })
        ));
    }

    #[test]
    fn test_thread_count_overrunning_tables() {
        let mut bytes = sample_trace();
        bytes[24..28].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            TraceReader::open(&bytes),
            Err(FormatError::CorruptFormat { offset: NUM_THREADS_FIELD, .. })
        ));

        bytes[24..28].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            TraceReader::open(&bytes),
            Err(FormatError::TruncatedFile { what: "thread table", .. })
        ));
    }

    #[test]
    fn test_event_count_mismatch_reported_at_end() {
        let mut bytes = sample_trace();
        bytes[28..32].copy_from_slice(&5u32.to_le_bytes());
        let reader = TraceReader::open(&bytes).unwrap();
        let decoded = reader.decode_all();
        assert_eq!(decoded.events.len(), 4);
        assert!(matches!(decoded.error, Some(FormatError::CorruptFormat { .. })));
    }

    #[test]
    fn test_truncated_stream_keeps_prefix() {
        let mut bytes = sample_trace();
        bytes.truncate(bytes.len() - 4);
        let reader = TraceReader::open(&bytes).unwrap();
        let mut events = reader.events();
        for _ in 0..3 {
            assert!(events.next().unwrap().is_ok());
        }
        assert!(matches!(events.next(), Some(Err(FormatError::CorruptFormat { .. }))));
        assert!(events.next().is_none());
    }
}
