//! Command-line interface: argument parsing and subcommand bodies

pub mod args;
pub mod commands;
mod demo;

pub use args::{Args, Command};
