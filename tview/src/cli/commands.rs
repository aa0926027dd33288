//! Subcommand implementations
//!
//! Each command loads the whole trace into memory, works on a
//! [`TraceReader`] over it and prints plain text to stdout. A corrupt event
//! stream does not stop a command: output covers the decoded prefix and the
//! decode error is returned afterwards.

use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::{demo, Command};
use crate::analysis::summarize;
use crate::domain::{Duration, FormatError, ThreadId};
use crate::export::ChromeTraceExporter;
use crate::format::EventKind;
use crate::reader::TraceReader;
use crate::reconstruct::{reconstruct_trace, ThreadState};

/// Dispatch a parsed subcommand
///
/// # Errors
/// I/O failures, invalid traces ([`FormatError`] in the chain) and capture
/// failures of `record-demo`.
pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Inspect { file } => inspect(&file),
        Command::Timeline { file, thread } => timeline(&file, thread.map(ThreadId)),
        Command::Summary { file, top } => summary(&file, top),
        Command::Export { file, output } => export(&file, &output),
        Command::RecordDemo {
            output,
            threads,
            iterations,
            options,
        } => demo::record(&output, threads, iterations, options.as_deref()),
    }
}

fn load(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read trace file: {}", path.display()))
}

fn open<'a>(bytes: &'a [u8], path: &Path) -> Result<TraceReader<'a>> {
    TraceReader::open(bytes).with_context(|| format!("Not a valid trace: {}", path.display()))
}

fn decode_failure(error: Option<FormatError>) -> Result<()> {
    match error {
        Some(e) => Err(e).context("Event stream is corrupt; output covers the decoded prefix only"),
        None => Ok(()),
    }
}

// =============================================================================
// INSPECT
// =============================================================================

fn inspect(path: &Path) -> Result<()> {
    let bytes = load(path)?;
    let reader = open(&bytes, path)?;
    let header = reader.header();

    println!("File:          {} ({} bytes)", path.display(), bytes.len());
    println!("Format:        v{}", header.version);
    println!("Duration:      {}", Duration(header.duration_ns()));
    println!("Threads:       {}", header.num_threads);
    println!("Sync objects:  {}", reader.sync_objects().len());
    println!(
        "Strings:       {} bytes, {} entries",
        reader.strings().size(),
        reader.strings().entries().filter(Result::is_ok).count()
    );
    println!("Events:        {} ({} bytes)", header.num_events, reader.events_size());

    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    let mut error = None;
    for item in reader.events() {
        match item {
            Ok(record) => *counts.entry(record.event.kind().tag()).or_default() += 1,
            Err(e) => error = Some(e),
        }
    }
    for kind in EventKind::ALL {
        if let Some(count) = counts.get(&kind.tag()) {
            println!("  {:<20} {count:>10}", kind.name());
        }
    }

    println!();
    println!("THREAD   NAME                          START          END");
    for thread in reader.threads() {
        println!(
            "{:<8} {:<28} {:>12} {:>12}",
            thread.thread_id.to_string(),
            reader.thread_name(thread.thread_id).unwrap_or("<unreadable>"),
            Duration(thread.start_time_ns).to_string(),
            Duration(thread.end_time_ns).to_string()
        );
    }

    if !reader.sync_objects().is_empty() {
        println!();
        println!("OBJECT     KIND        NAME");
        for object in reader.sync_objects() {
            println!(
                "{:<10} {:<11} {}",
                object.object_id.to_string(),
                object.kind.to_string(),
                reader.object_name(object.object_id).unwrap_or("<unreadable>")
            );
        }
    }

    decode_failure(error)
}

// =============================================================================
// TIMELINE
// =============================================================================

fn timeline(path: &Path, only: Option<ThreadId>) -> Result<()> {
    let bytes = load(path)?;
    let reader = open(&bytes, path)?;
    let (reconstruction, error) = reconstruct_trace(&reader);

    for timeline in reconstruction
        .threads
        .iter()
        .filter(|t| only.is_none() || only == Some(t.thread_id))
    {
        println!(
            "{} {:?}  [{} .. {}]",
            timeline.thread_id,
            reader.thread_name(timeline.thread_id).unwrap_or("?"),
            timeline.start_ns,
            timeline.end_ns
        );
        for interval in &timeline.intervals {
            let wait = interval
                .wait
                .map(|w| format!("  waiting for {}", w.describe(&reader)))
                .unwrap_or_default();
            println!(
                "    {:<13} {:>12} .. {:<12} {:>10}{wait}",
                interval.state.name(),
                interval.start_ns,
                interval.end_ns,
                Duration(interval.duration_ns()).to_string()
            );
        }
        for annotation in &timeline.annotations {
            println!(
                "    @{:<12} {}",
                annotation.timestamp_ns,
                reader.resolve(annotation.message).unwrap_or("<unreadable annotation>")
            );
        }
    }

    let anomalies: Vec<_> = reconstruction
        .anomalies
        .iter()
        .filter(|a| only.is_none() || only == Some(a.thread_id))
        .collect();
    if !anomalies.is_empty() {
        println!();
        println!("Anomalies ({}):", anomalies.len());
        for anomaly in anomalies {
            println!("  {anomaly}");
        }
    }

    decode_failure(error)
}

// =============================================================================
// SUMMARY
// =============================================================================

fn summary(path: &Path, top: usize) -> Result<()> {
    let bytes = load(path)?;
    let reader = open(&bytes, path)?;
    let (reconstruction, error) = reconstruct_trace(&reader);
    let summary = summarize(&reconstruction);

    println!("THREAD   NAME                  LIFETIME   EXEC%   SYNC%     IO%  SLEEP%");
    for thread in &summary.threads {
        println!(
            "{:<8} {:<20} {:>9} {:>6.1}% {:>6.1}% {:>6.1}% {:>6.1}%",
            thread.thread_id.to_string(),
            reader.thread_name(thread.thread_id).unwrap_or("?"),
            thread.lifetime.to_string(),
            thread.percentage(ThreadState::Executing),
            thread.percentage(ThreadState::BlockedSync),
            thread.percentage(ThreadState::BlockedIo),
            thread.percentage(ThreadState::Sleeping),
        );
    }

    if !summary.contention.is_empty() {
        println!();
        println!("SYNC OBJECT            WAITS       TOTAL         MAX  THREADS");
        for object in summary.contention.iter().take(top) {
            let name = reader
                .object_name(object.object)
                .map_or_else(|| object.object.to_string(), str::to_string);
            println!(
                "{:<20} {:>7} {:>11} {:>11} {:>8}",
                name,
                object.waits,
                object.total_blocked.to_string(),
                object.max_blocked.to_string(),
                object.threads
            );
        }
    }

    println!();
    println!("Anomalies: {}", summary.anomalies);
    decode_failure(error)
}

// =============================================================================
// EXPORT
// =============================================================================

fn export(path: &Path, output: &Path) -> Result<()> {
    let bytes = load(path)?;
    let reader = open(&bytes, path)?;
    let (reconstruction, error) = reconstruct_trace(&reader);

    let mut exporter = ChromeTraceExporter::new().with_pid(std::process::id());
    exporter.add_reconstruction(&reconstruction, &reader);

    let file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    exporter
        .export(BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Exported {} events to {}", exporter.event_count(), output.display());
    println!("Wrote {} trace events to {}", exporter.event_count(), output.display());
    decode_failure(error)
}
