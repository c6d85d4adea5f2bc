//! Error types for process scheduling

use thiserror::Error;

use crate::layer::SortingLayerId;
use crate::process::{ProcessId, ProcessState};

/// Errors raised by the process queue and sorting layer registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// A state change outside the allowed lifecycle sequence
    #[error("Invalid process transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ProcessState,
        to: ProcessState,
    },
    /// Sorting layer id not present in the registry
    #[error("Unknown sorting layer: {0:?}")]
    UnknownSortingLayer(SortingLayerId),
    /// Process is not owned by this queue
    #[error("Unknown process: {0}")]
    UnknownProcess(ProcessId),
    /// Threaded processes own a running worker and cannot be requeued
    #[error("Cannot reattach threaded process: {0}")]
    ThreadedReattach(ProcessId),
    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Sorting layer data could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Outcome of a worker routine that did not produce a value
///
/// Worker errors never unwind across the thread boundary; they are carried
/// back to the main thread in this form and surface as a failed process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkError {
    /// The routine reported a failure
    #[error("{0}")]
    Failed(String),
    /// The routine observed the cancellation flag and stopped early
    #[error("Work was cancelled")]
    Cancelled,
    /// The routine panicked; the payload message is preserved
    #[error("Worker panicked: {0}")]
    Panicked(String),
    /// The OS refused to start the worker thread
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}

impl WorkError {
    /// Create a failure from any displayable message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Whether the error came from cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
