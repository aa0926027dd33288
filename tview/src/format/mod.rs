//! # Binary trace wire format (v1)
//!
//! Encoding and decoding of every structure in a `.tview` trace. Sizes,
//! tags and magic numbers live in [`tview_common`]; this module turns them
//! into typed records.
//!
//! ## Conventions
//!
//! - Little-endian everywhere, written field by field with `to_le_bytes`.
//!   Nothing relies on `#[repr(C)]` layout, so traces are portable across
//!   targets and compilers.
//! - Writers take `&mut impl Write`; readers take a byte slice plus an offset
//!   and bounds-check every access, returning [`FormatError`] instead of
//!   panicking on short or corrupt input.
//! - Decoding is zero-copy: event records are plain `Copy` values and strings
//!   resolve to `&str` borrowed from the trace bytes.
//!
//! [`FormatError`]: crate::domain::FormatError

pub mod event;
pub mod header;
pub mod string_table;
pub mod tables;

pub use event::{decode_event, wire_event_size, write_event, Event, EventKind, EventRecord};
pub use header::TraceHeader;
pub use string_table::{StringTable, StringTableView};
pub use tables::{SyncObjectInfo, ThreadInfo};

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let raw = bytes.get(at..at.checked_add(8)?)?;
    Some(u64::from_le_bytes(raw.try_into().ok()?))
}
