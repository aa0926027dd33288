//! # Shared Wire Constants (Capture ↔ Reader)
//!
//! Defines the constants of the `.tview` binary trace format that both the
//! capture side (application threads writing a trace) and readers (offline
//! analysis, viewers) must agree on. Nothing in here allocates, so the crate
//! is `#![no_std]` and can be linked into constrained instrumentation shims.
//!
//! ## File Layout
//!
//! ```text
//! ┌──────────────────────────────┐  offset 0
//! │ Header (64 bytes)            │
//! ├──────────────────────────────┤  HEADER_SIZE
//! │ ThreadInfo × num_threads     │  24 bytes each
//! ├──────────────────────────────┤
//! │ SyncObjectInfo × N           │  16 bytes each (N implied by layout)
//! ├──────────────────────────────┤  string_table_offset
//! │ String table                 │  len:u32 + UTF-8 bytes per entry
//! ├──────────────────────────────┤  string_table_offset + string_table_size
//! │ Event records                │  16-byte header + payload, until EOF
//! └──────────────────────────────┘
//! ```
//!
//! All integers are little-endian and encoded field by field.

#![no_std]

// ============================================================================
// File Identification
// ============================================================================

/// Magic number at offset 0 of every trace: "TVIE" read as a little-endian u32
pub const TRACE_MAGIC: u32 = 0x5456_4945;

/// Format version understood by this build
///
/// Readers reject any other version outright; there is no compatibility shim.
pub const TRACE_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Record Sizes
// ============================================================================

/// Fixed header size in bytes (40 bytes of fields, 24 reserved)
pub const HEADER_SIZE: usize = 64;

/// Reserved bytes at the end of the header, always written as zero
pub const HEADER_PADDING: usize = 24;

/// `thread_id:u32, name_offset:u32, start_time_ns:u64, end_time_ns:u64`
pub const THREAD_INFO_SIZE: usize = 24;

/// `object_id:u64, name_offset:u32, type:u32`
pub const SYNC_OBJECT_INFO_SIZE: usize = 16;

/// `timestamp_ns:u64, thread_id:u32, event_type:u8, data_size:u8, padding:u16`
pub const EVENT_HEADER_SIZE: usize = 16;

/// Length prefix of each string-table entry
pub const STRING_LEN_PREFIX: usize = 4;

// ============================================================================
// Event Type Tags
// ============================================================================

/// **Lifecycle**: thread began executing (opens its timeline)
pub const EVENT_THREAD_START: u8 = 1;

/// **Lifecycle**: thread finished (closes its timeline)
pub const EVENT_THREAD_END: u8 = 2;

/// **Mutex**: thread is about to block on a mutex
///
/// Payload: `MutexLockData`
pub const EVENT_MUTEX_LOCK_ATTEMPT: u8 = 3;

/// **Mutex**: thread now holds the mutex
///
/// Payload: `MutexLockData`
pub const EVENT_MUTEX_LOCK_ACQUIRED: u8 = 4;

/// **Mutex**: thread released the mutex
///
/// Payload: `MutexLockData`
pub const EVENT_MUTEX_UNLOCK: u8 = 5;

/// **Condition**: thread waits on a condition, releasing the associated mutex
///
/// Payload: `ConditionWaitData`
pub const EVENT_CONDITION_WAIT: u8 = 6;

/// **Condition**: thread signalled a condition (never blocks the signaller)
///
/// Payload: `MutexLockData` layout, carrying the condition id
pub const EVENT_CONDITION_SIGNAL: u8 = 7;

/// **Annotation**: free-form marker emitted by the application
///
/// Payload: `AnnotationData`
pub const EVENT_ANNOTATION: u8 = 8;

/// **Sleep**: thread went to sleep
///
/// Payload: `SleepData` (requested duration, 0 when unknown)
pub const EVENT_SLEEP_START: u8 = 9;

/// **Sleep**: thread woke up
pub const EVENT_SLEEP_END: u8 = 10;

/// **I/O**: thread blocked in an I/O call
///
/// Payload: `IOData`
pub const EVENT_IO_START: u8 = 11;

/// **I/O**: I/O call returned
pub const EVENT_IO_END: u8 = 12;

// ============================================================================
// Payload Sizes
// ============================================================================

/// `mutex_id:u64`
pub const MUTEX_LOCK_DATA_SIZE: u8 = 8;

/// `condition_id:u64, mutex_id:u64`
pub const CONDITION_WAIT_DATA_SIZE: u8 = 16;

/// `message_offset:u32`
pub const ANNOTATION_DATA_SIZE: u8 = 4;

/// `duration_ns:u64`
pub const SLEEP_DATA_SIZE: u8 = 8;

/// `operation_offset:u32, target_offset:u32`
pub const IO_DATA_SIZE: u8 = 8;

/// Expected `data_size` for an event tag, or `None` for an unknown tag
#[must_use]
pub const fn payload_size(event_type: u8) -> Option<u8> {
    match event_type {
        EVENT_THREAD_START | EVENT_THREAD_END | EVENT_SLEEP_END | EVENT_IO_END => Some(0),
        EVENT_MUTEX_LOCK_ATTEMPT
        | EVENT_MUTEX_LOCK_ACQUIRED
        | EVENT_MUTEX_UNLOCK
        | EVENT_CONDITION_SIGNAL => Some(MUTEX_LOCK_DATA_SIZE),
        EVENT_CONDITION_WAIT => Some(CONDITION_WAIT_DATA_SIZE),
        EVENT_ANNOTATION => Some(ANNOTATION_DATA_SIZE),
        EVENT_SLEEP_START => Some(SLEEP_DATA_SIZE),
        EVENT_IO_START => Some(IO_DATA_SIZE),
        _ => None,
    }
}

// ============================================================================
// Sync Object Kinds
// ============================================================================

/// `SyncObjectInfo.type` for a mutex
pub const SYNC_KIND_MUTEX: u32 = 0;

/// `SyncObjectInfo.type` for a condition variable
pub const SYNC_KIND_CONDITION: u32 = 1;

// ============================================================================
// Thread States
// ============================================================================

/// Thread execution state derived from events during reconstruction
///
/// The discriminants match the values viewers use for colouring:
/// - `Executing` (1): green, running
/// - `BlockedSync` (2): red, blocked on a mutex or condition
/// - `BlockedIo` (3): blue, blocked on I/O
/// - `Sleeping` (4): gray, sleeping
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThreadState {
    Executing = 1,
    BlockedSync = 2,
    BlockedIo = 3,
    Sleeping = 4,
}

impl ThreadState {
    /// All states, in discriminant order
    pub const ALL: [ThreadState; 4] = [
        ThreadState::Executing,
        ThreadState::BlockedSync,
        ThreadState::BlockedIo,
        ThreadState::Sleeping,
    ];

    /// Upper-case name used in text output
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ThreadState::Executing => "EXECUTING",
            ThreadState::BlockedSync => "BLOCKED_SYNC",
            ThreadState::BlockedIo => "BLOCKED_IO",
            ThreadState::Sleeping => "SLEEPING",
        }
    }
}
