//! Command implementations for syncq.
//!
//! Every command opens the queue from the data directory, does its work,
//! and returns the text to print.

mod completions;
mod queue;

pub use completions::completions;
pub use queue::{add, clear, drain, list, remove, status, Context};
