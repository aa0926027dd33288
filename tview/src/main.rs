//! # tview - Main Entry Point
//!
//! Parses the subcommand, runs it and maps failures to exit codes:
//! - `0` success
//! - `1` any other failure (I/O, capture, bad arguments to a subcommand)
//! - `65` the input is not a valid `.tview` trace (`EX_DATAERR`)

use clap::Parser;
use tview::cli::{commands, Args};
use tview::domain::FormatError;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_DATAERR: i32 = 65;

fn main() {
    env_logger::init();
    let args = Args::parse();
    std::process::exit(match commands::run(args.command) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<FormatError>()) {
        EXIT_DATAERR
    } else {
        EXIT_ERROR
    }
}
