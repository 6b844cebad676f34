//! Controller-specific error types.
//!
//! This module defines error types specific to watch-tail that are not
//! covered by the watch client's own errors.

use thiserror::Error;
use watch_client::WatchError;

/// Errors that can occur in watch-tail.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Watch client error
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading or writing the checkpoint file failed
    #[error("Checkpoint I/O error: {0}")]
    CheckpointIo(#[from] std::io::Error),

    /// The checkpoint file is not valid JSON
    #[error("Checkpoint decode error: {0}")]
    CheckpointDecode(#[from] serde_json::Error),

    /// The watch task panicked or was cancelled
    #[error("Watch task failed: {0}")]
    Task(String),

    /// The session exhausted its reconnect attempts
    #[error("Gave up watching {0}")]
    GaveUp(String),
}
