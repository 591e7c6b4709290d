//! Configuration management for syncq.
//!
//! This module handles loading and saving configuration from `~/.syncq/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{Config, LoggingConfig, QueueConfig, RemoteConfig};
