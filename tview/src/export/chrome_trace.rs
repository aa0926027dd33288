// Timestamps convert from integer nanoseconds to f64 microseconds
#![allow(clippy::cast_precision_loss)]

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::io::Write;

use crate::domain::ExportError;
use crate::reader::TraceReader;
use crate::reconstruct::Reconstruction;

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize)]
struct ChromeTraceEvent {
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "X" = complete, "i" = instant, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Duration in microseconds ("X" events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    pid: u32,
    tid: u32,
    /// Instant event scope ("t" = thread)
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Converts reconstructed timelines into a trace Perfetto / chrome://tracing can load
///
/// One track per thread: an `"X"` slice per state interval, `"i"` markers for
/// annotations and anomalies.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    pid: u32,
}

fn micros(ns: u64) -> f64 {
    ns as f64 / 1000.0
}

impl ChromeTraceExporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process id written into every event
    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Add every timeline of `reconstruction`, resolving names through `reader`
    pub fn add_reconstruction(&mut self, reconstruction: &Reconstruction, reader: &TraceReader<'_>) {
        for timeline in &reconstruction.threads {
            let tid = timeline.thread_id.0;
            let name = reader
                .thread_name(timeline.thread_id)
                .map_or_else(|| timeline.thread_id.to_string(), str::to_string);

            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(name));
            self.events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                dur: None,
                pid: self.pid,
                tid,
                s: None,
                args: Some(args),
            });

            for interval in &timeline.intervals {
                let args = interval.wait.map(|wait| {
                    let mut args = HashMap::new();
                    args.insert("waiting_for".to_string(), serde_json::json!(wait.describe(reader)));
                    args
                });
                self.events.push(ChromeTraceEvent {
                    name: interval.state.name().to_string(),
                    cat: "state".to_string(),
                    ph: "X".to_string(),
                    ts: micros(interval.start_ns),
                    dur: Some(micros(interval.duration_ns())),
                    pid: self.pid,
                    tid,
                    s: None,
                    args,
                });
            }

            for annotation in &timeline.annotations {
                let text = reader.resolve(annotation.message).unwrap_or("<unreadable annotation>");
                self.push_instant(text.to_string(), "annotation", annotation.timestamp_ns, tid);
            }
        }

        for anomaly in &reconstruction.anomalies {
            self.push_instant(anomaly.kind.to_string(), "anomaly", anomaly.timestamp_ns, anomaly.thread_id.0);
        }
    }

    fn push_instant(&mut self, name: String, cat: &str, timestamp_ns: u64, tid: u32) {
        self.events.push(ChromeTraceEvent {
            name,
            cat: cat.to_string(),
            ph: "i".to_string(),
            ts: micros(timestamp_ns),
            dur: None,
            pid: self.pid,
            tid,
            s: Some("t".to_string()),
            args: None,
        });
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// [`ExportError::Json`] if serialization or a write fails,
    /// [`ExportError::Io`] if the final flush fails.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        let trace = ChromeTrace {
            trace_events: self.events.clone(),
            display_time_unit: "ms".to_string(),
        };
        serde_json::to_writer_pretty(&mut writer, &trace)?;
        writer.flush()?;
        Ok(())
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
