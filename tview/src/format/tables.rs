use std::io::{Result, Write};
use tview_common::{SYNC_OBJECT_INFO_SIZE, THREAD_INFO_SIZE};

use super::{read_u32, read_u64};
use crate::domain::{ObjectId, StrOffset, SyncKind, ThreadId};

/// Thread metadata record (24 bytes)
///
/// Times are relative to the trace start. A thread that never emitted
/// `THREAD_END` has `end_time_ns` equal to the trace duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub thread_id: ThreadId,
    pub name_offset: StrOffset,
    pub start_time_ns: u64,
    pub end_time_ns: u64,
}

impl ThreadInfo {
    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(&self.thread_id.0.to_le_bytes())?;
        w.write_all(&self.name_offset.0.to_le_bytes())?;
        w.write_all(&self.start_time_ns.to_le_bytes())?;
        w.write_all(&self.end_time_ns.to_le_bytes())
    }

    /// Decode one record from a slice of at least [`THREAD_INFO_SIZE`] bytes
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < THREAD_INFO_SIZE {
            return None;
        }
        Some(Self {
            thread_id: ThreadId(read_u32(bytes, 0)?),
            name_offset: StrOffset(read_u32(bytes, 4)?),
            start_time_ns: read_u64(bytes, 8)?,
            end_time_ns: read_u64(bytes, 16)?,
        })
    }
}

/// Sync object metadata record (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncObjectInfo {
    pub object_id: ObjectId,
    pub name_offset: StrOffset,
    pub kind: SyncKind,
}

impl SyncObjectInfo {
    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(&self.object_id.0.to_le_bytes())?;
        w.write_all(&self.name_offset.0.to_le_bytes())?;
        w.write_all(&self.kind.to_raw().to_le_bytes())
    }

    /// Decode one record from a slice of at least [`SYNC_OBJECT_INFO_SIZE`] bytes
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SYNC_OBJECT_INFO_SIZE {
            return None;
        }
        Some(Self {
            object_id: ObjectId(read_u64(bytes, 0)?),
            name_offset: StrOffset(read_u32(bytes, 8)?),
            kind: SyncKind::from_raw(read_u32(bytes, 12)?),
        })
    }
}
