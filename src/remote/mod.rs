//! HTTP transport for queued actions.

mod client;

pub use client::{classify_status, endpoint, HttpRemote};
