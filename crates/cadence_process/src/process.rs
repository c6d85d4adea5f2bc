//! Process - the schedulable unit of work
//!
//! A process is driven by a [`ProcessQueue`](crate::ProcessQueue) through a
//! fixed lifecycle:
//!
//! ```text
//! NotStarted ──on_init──► Running ──on_success──► Finished
//!      │                     ├────on_fail───────► Failed
//!      └───────on_abort──────┴────on_abort──────► Aborted
//! ```
//!
//! Implementors only supply hooks. The queue owns the state and guarantees
//! that `on_init` and the terminal hooks each fire at most once, and that only
//! one terminal hook ever fires for a given process.

use std::fmt;

use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{ProcessError, Result};
use crate::threaded::WorkerHandle;

/// Unique identifier for a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Create a new random process ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Attached but `on_init` has not run
    NotStarted,
    /// Initialized and being ticked
    Running,
    /// Completed successfully
    Finished,
    /// Completed with an error
    Failed,
    /// Stopped before completion
    Aborted,
}

impl ProcessState {
    /// Terminal states never transition further
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Aborted)
    }

    /// Inverse of [`is_terminal`](Self::is_terminal)
    pub fn is_alive(self) -> bool {
        !self.is_terminal()
    }

    fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Running, Finished)
                | (Running, Failed)
                | (NotStarted, Aborted)
                | (Running, Aborted)
        )
    }
}

/// Hooks that fire at most once per process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    Init,
    Success,
    Fail,
    Abort,
}

impl LifecycleHook {
    const fn bit(self) -> u8 {
        match self {
            Self::Init => 1 << 0,
            Self::Success => 1 << 1,
            Self::Fail => 1 << 2,
            Self::Abort => 1 << 3,
        }
    }

    /// Whether this is one of the mutually exclusive completion hooks
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Init)
    }
}

const TERMINAL_HOOKS: u8 =
    LifecycleHook::Success.bit() | LifecycleHook::Fail.bit() | LifecycleHook::Abort.bit();

/// State machine bookkeeping for a single process
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ProcessState,
    threaded: bool,
    fired: u8,
}

impl Lifecycle {
    /// Create a lifecycle in the `NotStarted` state
    pub fn new(threaded: bool) -> Self {
        Self {
            state: ProcessState::NotStarted,
            threaded,
            fired: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Whether the body runs on a background thread
    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    /// Check if not terminal
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Move to `next`, rejecting anything outside the lifecycle diagram
    pub fn transition(&mut self, next: ProcessState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ProcessError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Reserve a hook for dispatch
    ///
    /// Returns false if the hook already fired, or if it is a terminal hook
    /// and another terminal hook already fired.
    pub fn claim(&mut self, hook: LifecycleHook) -> bool {
        if self.fired & hook.bit() != 0 {
            return false;
        }
        if hook.is_terminal() && self.fired & TERMINAL_HOOKS != 0 {
            return false;
        }
        self.fired |= hook.bit();
        true
    }

    /// Check whether a hook has been dispatched
    pub fn has_fired(&self, hook: LifecycleHook) -> bool {
        self.fired & hook.bit() != 0
    }

    /// The completion hook matching the current terminal state
    pub fn terminal_hook(&self) -> Option<LifecycleHook> {
        match self.state {
            ProcessState::Finished => Some(LifecycleHook::Success),
            ProcessState::Failed => Some(LifecycleHook::Fail),
            ProcessState::Aborted => Some(LifecycleHook::Abort),
            ProcessState::NotStarted | ProcessState::Running => None,
        }
    }
}

/// Completion requested by a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
}

/// Per-call context handed to process hooks
pub struct ProcessContext<'a> {
    id: ProcessId,
    delta_ms: u64,
    config: &'a QueueConfig,
    outcome: Option<Outcome>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(id: ProcessId, delta_ms: u64, config: &'a QueueConfig) -> Self {
        Self {
            id,
            delta_ms,
            config,
            outcome: None,
        }
    }

    /// Id of the process being driven
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Milliseconds since the previous pass of the same phase
    pub fn delta_ms(&self) -> u64 {
        self.delta_ms
    }

    /// Configuration of the owning queue
    pub fn config(&self) -> &QueueConfig {
        self.config
    }

    /// Request the `Finished` state once the hook returns
    pub fn succeed(&mut self) {
        self.outcome = Some(Outcome::Succeed);
    }

    /// Request the `Failed` state once the hook returns
    pub fn fail(&mut self) {
        self.outcome = Some(Outcome::Fail);
    }

    /// Completion requested so far, if any
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }
}

/// A unit of work ticked by the process queue
///
/// Every hook has an empty default, so implementors override only what they
/// need. Completion is requested through [`ProcessContext::succeed`] and
/// [`ProcessContext::fail`]; the queue then dispatches exactly one of
/// `on_success`, `on_fail` or `on_abort` on the main thread.
pub trait Process: Send + 'static {
    /// Name used in log output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether the body runs on a dedicated worker thread
    fn is_threaded(&self) -> bool {
        false
    }

    /// Whether this process loads a resource
    fn is_load_process(&self) -> bool {
        false
    }

    /// Called once, before the first update
    fn on_init(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Called every frame while running
    fn on_update(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Called every fixed step while running
    fn on_fixed_update(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Called after all processes received `on_update`
    fn on_late_update(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Called at the end of the frame
    fn on_post_update(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Completed successfully
    fn on_success(&mut self) {}

    /// Completed with an error
    fn on_fail(&mut self) {}

    /// Stopped before completion
    fn on_abort(&mut self) {}

    /// Hand over a still-running worker thread so the queue can reap it
    fn take_worker(&mut self) -> Option<WorkerHandle> {
        None
    }
}

/// Non-owning reference to a process held by a queue
///
/// The handle never keeps the process alive; lookups through the queue return
/// `None` once the process has been erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    id: ProcessId,
}

impl ProcessHandle {
    pub(crate) fn new(id: ProcessId) -> Self {
        Self { id }
    }

    /// Id of the referenced process
    pub fn id(&self) -> ProcessId {
        self.id
    }
}
