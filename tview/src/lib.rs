//! # tview - Thread State Tracing
//!
//! tview records what every thread of a process is doing (running, waiting
//! on a lock or condition, blocked in I/O, sleeping) into a compact binary
//! `.tview` file, and turns such files back into per-thread state timelines.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Instrumented Application                     │
//! │        Tracer::record / CaptureBuffer::record per thread        │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ segments (size / time / thread exit)
//!                         ▼ bounded channel, never blocks the caller
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          TraceWriter                            │
//! │   accept ─▶ merge by (timestamp, thread) ─▶ intern ─▶ encode    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ .tview bytes
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  TraceReader ─▶ StateReconstructor ─▶ summary / Chrome export   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: thread-local buffers, the trace clock and the session
//!   that owns a writer and its collector thread
//! - [`writer`]: merge of drained segments and encoding of the file
//! - [`format`]: on-disk layout (header, tables, string table, events)
//! - [`reader`]: validation and zero-copy access to an encoded trace
//! - [`reconstruct`]: per-thread state machine producing timelines and
//!   anomalies
//! - [`analysis`]: time per state and lock contention statistics
//! - [`export`]: Chrome Trace Event JSON for Perfetto
//! - [`config`]: capture options from agent-style argument strings
//! - [`cli`]: the `tview` command-line tool
//! - [`domain`]: identifier newtypes and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! tview record-demo --output demo.tview
//! tview timeline demo.tview --thread 2
//! tview export demo.tview -o demo.json
//! ```

pub mod analysis;
pub mod capture;
pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod format;
pub mod reader;
pub mod reconstruct;
pub mod writer;

pub use capture::{CaptureBuffer, CaptureEvent, Tracer};
pub use reader::TraceReader;
pub use reconstruct::{reconstruct_trace, StateReconstructor};
pub use writer::TraceWriter;
