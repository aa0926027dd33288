use std::io::{Result, Write};
use tview_common::{HEADER_PADDING, HEADER_SIZE, TRACE_FORMAT_VERSION, TRACE_MAGIC};

use super::{read_u32, read_u64};
use crate::domain::FormatError;

/// Fixed 64-byte trace header
///
/// `start_time_ns`/`end_time_ns` are absolute readings of the session's
/// monotonic clock. Everything else in the trace (thread spans, event
/// timestamps) is relative to `start_time_ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub magic: u32,
    pub version: u32,
    pub start_time_ns: u64,
    pub end_time_ns: u64,
    pub num_threads: u32,
    pub num_events: u32,
    pub string_table_offset: u32,
    pub string_table_size: u32,
}

impl TraceHeader {
    /// Length of the trace in nanoseconds (end of the relative time axis)
    #[must_use]
    pub fn duration_ns(&self) -> u64 {
        self.end_time_ns.saturating_sub(self.start_time_ns)
    }

    /// Byte offset where the event stream begins
    #[must_use]
    pub fn events_offset(&self) -> u64 {
        u64::from(self.string_table_offset) + u64::from(self.string_table_size)
    }

    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(&self.magic.to_le_bytes())?;
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.start_time_ns.to_le_bytes())?;
        w.write_all(&self.end_time_ns.to_le_bytes())?;
        w.write_all(&self.num_threads.to_le_bytes())?;
        w.write_all(&self.num_events.to_le_bytes())?;
        w.write_all(&self.string_table_offset.to_le_bytes())?;
        w.write_all(&self.string_table_size.to_le_bytes())?;
        w.write_all(&[0u8; HEADER_PADDING])
    }

    /// Parse and validate identification fields.
    ///
    /// Only checks what the header alone can prove (length, magic, version,
    /// timestamp order). Offsets are validated against the buffer by the reader.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::TruncatedFile {
                what: "header",
                needed: HEADER_SIZE as u64,
                available: bytes.len() as u64,
            });
        }
        let magic = u32_at(bytes, 0)?;
        if magic != TRACE_MAGIC {
            return Err(FormatError::BadMagic { found: magic, expected: TRACE_MAGIC });
        }
        let version = u32_at(bytes, 4)?;
        if version != TRACE_FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                expected: TRACE_FORMAT_VERSION,
            });
        }

        let header = TraceHeader {
            magic,
            version,
            start_time_ns: u64_at(bytes, 8)?,
            end_time_ns: u64_at(bytes, 16)?,
            num_threads: u32_at(bytes, 24)?,
            num_events: u32_at(bytes, 28)?,
            string_table_offset: u32_at(bytes, 32)?,
            string_table_size: u32_at(bytes, 36)?,
        };

        if header.start_time_ns > header.end_time_ns {
            return Err(FormatError::CorruptFormat {
                offset: 8,
                reason: format!(
                    "start_time_ns {} is after end_time_ns {}",
                    header.start_time_ns, header.end_time_ns
                ),
            });
        }
        Ok(header)
    }
}

fn u32_at(bytes: &[u8], at: usize) -> std::result::Result<u32, FormatError> {
    read_u32(bytes, at).ok_or(FormatError::TruncatedFile {
        what: "header",
        needed: HEADER_SIZE as u64,
        available: bytes.len() as u64,
    })
}

fn u64_at(bytes: &[u8], at: usize) -> std::result::Result<u64, FormatError> {
    read_u64(bytes, at).ok_or(FormatError::TruncatedFile {
        what: "header",
        needed: HEADER_SIZE as u64,
        available: bytes.len() as u64,
    })
}
