//! Analysis of reconstructed traces
//!
//! Pure functions over a [`Reconstruction`](crate::reconstruct::Reconstruction),
//! kept apart from the CLI that prints them.

pub mod summary;

pub use summary::{summarize, ContentionStats, ObjectContention, ThreadSummary, TraceSummary};
