//! Trace export functionality
//!
//! Converts reconstructed traces into formats other tools understand.
//! Currently supports Chrome Trace Event Format for visualization in
//! Perfetto and chrome://tracing.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
