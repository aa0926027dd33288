//! Structured error types for tview
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Reconstruction anomalies are deliberately absent: they are diagnostics
//! returned next to valid output, see [`crate::reconstruct::Anomaly`].

use thiserror::Error;

/// Rejection of a trace (or one record of it) while reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Bad magic number 0x{found:08x} (expected 0x{expected:08x})")]
    BadMagic { found: u32, expected: u32 },

    #[error("Unsupported trace format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Truncated trace: {what} needs {needed} bytes but only {available} are available")]
    TruncatedFile { what: &'static str, needed: u64, available: u64 },

    #[error(
        "Payload size mismatch at byte {offset}: event type {event_type} declares {found} bytes, \
         expected {expected}"
    )]
    PayloadSizeMismatch { offset: usize, event_type: u8, expected: u8, found: u8 },

    #[error("Corrupt trace at byte {offset}: {reason}")]
    CorruptFormat { offset: usize, reason: String },

    #[error("String offset {offset} is outside the string table ({table_size} bytes)")]
    OutOfRange { offset: u32, table_size: u32 },

    #[error("Malformed string table entry at offset {offset}: {reason}")]
    MalformedEntry { offset: u32, reason: &'static str },
}

/// Misuse of, or failure inside, the trace writer
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Trace writer is already finalized")]
    WriterClosed,

    #[error("Trace too large: {what} exceeds the format limit")]
    TooLarge { what: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Invalid capture configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for option `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("Option `{0}` is missing a value (expected key=value)")]
    MissingValue(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
