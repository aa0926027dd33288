//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tview",
    about = "Capture and inspect per-thread state traces (.tview)",
    after_help = "\
EXAMPLES:
    tview record-demo --output demo.tview        Record a contention workload
    tview inspect demo.tview                     Header, tables and event counts
    tview timeline demo.tview --thread 2         State intervals of one thread
    tview summary demo.tview                     Time per state, most contended locks
    tview export demo.tview -o demo.json         Chrome trace for Perfetto"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the header, metadata tables and event counts of a trace
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print reconstructed state intervals and anomalies
    Timeline {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only show this thread id
        #[arg(short, long)]
        thread: Option<u32>,
    },

    /// Time spent per state and the most contended sync objects
    Summary {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Number of sync objects to list
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Convert a trace to Chrome Trace Event JSON
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output JSON file
        #[arg(short, long, value_name = "JSON")]
        output: PathBuf,
    },

    /// Run an instrumented lock-contention workload and record it
    RecordDemo {
        /// Trace file to write
        #[arg(short, long, value_name = "FILE", default_value = "demo.tview")]
        output: PathBuf,

        /// Worker threads
        #[arg(long, default_value = "4")]
        threads: usize,

        /// Lock round-trips per worker
        #[arg(long, default_value = "1000")]
        iterations: usize,

        /// Capture options, e.g. "buffer=256,flush_ms=20" (defaults from TVIEW_OPTIONS)
        #[arg(long, value_name = "OPTIONS")]
        options: Option<String>,
    },
}
