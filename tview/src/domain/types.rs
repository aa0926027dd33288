//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a string-table
//! offset where a sync object id is expected, and make function signatures
//! more expressive.

// Time conversions intentionally lose precision for display purposes
#![allow(clippy::cast_precision_loss)]

use std::fmt;
use tview_common::{SYNC_KIND_CONDITION, SYNC_KIND_MUTEX};

/// Thread ID within one trace
///
/// Assigned by the capture session (1, 2, 3, ...). Unique within a trace,
/// unrelated to the kernel TID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Opaque identity of a synchronization object as seen by instrumentation
///
/// Usually derived from the object's address, but never dereferenced or
/// exposed as a pointer. Only meaningful within one capture session, and the
/// same value may name different objects over time (address reuse). The
/// registry treats every reuse as one continuous identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncHandle(pub u64);

impl SyncHandle {
    /// Identity of the object behind `value`
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self(std::ptr::from_ref(value).cast::<()>() as usize as u64)
    }
}

impl fmt::Display for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Per-trace sync object id, as stored in event payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Byte offset into the string table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrOffset(pub u32);

/// Kind of synchronization object
///
/// An open enumeration: unknown wire values survive a round trip as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Mutex,
    Condition,
    Other(u32),
}

impl SyncKind {
    /// Wire value for `SyncObjectInfo.type`
    #[must_use]
    pub fn to_raw(self) -> u32 {
        match self {
            SyncKind::Mutex => SYNC_KIND_MUTEX,
            SyncKind::Condition => SYNC_KIND_CONDITION,
            SyncKind::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            SYNC_KIND_MUTEX => SyncKind::Mutex,
            SYNC_KIND_CONDITION => SyncKind::Condition,
            other => SyncKind::Other(other),
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Mutex => write!(f, "mutex"),
            SyncKind::Condition => write!(f, "condition"),
            SyncKind::Other(raw) => write!(f, "kind#{raw}"),
        }
    }
}

/// Duration in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// Convert to milliseconds (f64)
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Convert to seconds (f64)
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (f64)
    pub fn as_micros(self) -> f64 {
        self.0 as f64 / 1_000.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.as_millis();
        if ms >= 1000.0 {
            write!(f, "{:.2}s", self.as_seconds())
        } else if ms >= 1.0 {
            write!(f, "{ms:.2}ms")
        } else {
            write!(f, "{:.1}us", self.as_micros())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId(5).to_string(), "T5");
    }

    #[test]
    fn test_sync_handle_display_is_hex() {
        assert_eq!(SyncHandle(0xAA).to_string(), "0xaa");
    }

    #[test]
    fn test_sync_handle_of_distinguishes_objects() {
        let a = std::sync::Mutex::new(0);
        let b = std::sync::Mutex::new(0);
        assert_eq!(SyncHandle::of(&a), SyncHandle::of(&a));
        assert_ne!(SyncHandle::of(&a), SyncHandle::of(&b));
    }

    #[test]
    fn test_sync_kind_raw_roundtrip() {
        for kind in [SyncKind::Mutex, SyncKind::Condition, SyncKind::Other(9)] {
            assert_eq!(SyncKind::from_raw(kind.to_raw()), kind);
        }
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(Duration(5_000_000).to_string(), "5.00ms");
        assert_eq!(Duration(1_500_000_000).to_string(), "1.50s");
        assert_eq!(Duration(2_500).to_string(), "2.5us");
    }
}
