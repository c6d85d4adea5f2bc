//! # cadence_process - Layer-Ordered Process Scheduling
//!
//! Cooperative and threaded work driven from a single main loop:
//! - Lifecycle state machine with at-most-once hooks
//! - Sorting layers for deterministic tick order
//! - Two-list queue (active + pending) safe to mutate between phases
//! - Threaded processes that poll an atomic completion flag instead of joining
//!
//! ## Example
//!
//! ```ignore
//! use cadence_process::prelude::*;
//!
//! let mut queue = ProcessQueue::new();
//! let physics = queue.add_sorting_layer(Some("physics"), Some(-10));
//!
//! let handle = queue.attach_process_on_layer(MyStep::default(), physics, false);
//!
//! // Each frame
//! queue.update_processes(16);
//! queue.late_update_processes(16);
//!
//! if !queue.is_alive(handle) {
//!     // Finished, failed or aborted
//! }
//! ```

pub mod config;
pub mod error;
pub mod layer;
pub mod process;
pub mod queue;
pub mod threaded;

pub use config::QueueConfig;
pub use error::{ProcessError, Result, WorkError};
pub use layer::{LayerKey, SortingLayer, SortingLayerId, SortingLayers, DEFAULT_SORTING_LAYER};
pub use process::{
    Lifecycle, LifecycleHook, Outcome, Process, ProcessContext, ProcessHandle, ProcessId,
    ProcessState,
};
pub use queue::ProcessQueue;
pub use threaded::{CancelToken, Threaded, ThreadedProcess, WorkRoutine, WorkerHandle};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::error::{ProcessError, WorkError};
    pub use crate::layer::{SortingLayerId, SortingLayers};
    pub use crate::process::{Process, ProcessContext, ProcessHandle, ProcessState};
    pub use crate::queue::ProcessQueue;
    pub use crate::threaded::{CancelToken, Threaded, ThreadedProcess, WorkRoutine};
}
