//! Threaded processes - work that runs on a dedicated background thread
//!
//! A [`Threaded`] process spawns exactly one OS thread from `on_init`. The
//! worker writes its result into a shared slot and then raises a completion
//! flag with release ordering. The main thread polls the flag (acquire) from
//! `on_update` and only then moves the process out of `Running`, so every
//! user-visible side effect of completion happens on the main thread.
//!
//! Cancellation is cooperative: aborting sets a flag the worker routine polls
//! at safe points through its [`CancelToken`]. Threads are never killed.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::WorkError;
use crate::process::{Process, ProcessContext};

/// Cooperative cancellation flag shared with a worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Safe point for worker routines: `Err(Cancelled)` once cancelled
    pub fn checkpoint(&self) -> Result<(), WorkError> {
        if self.is_cancelled() {
            Err(WorkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Routine executed on the worker thread
pub type WorkRoutine<T> = Box<dyn FnOnce(&CancelToken) -> Result<T, WorkError> + Send + 'static>;

type ResultSlot<T> = Arc<Mutex<Option<Result<T, WorkError>>>>;

/// Work whose body runs off the main thread
///
/// `work` is called once on the main thread and returns the routine for the
/// worker. The completion hooks run on the main thread after the worker has
/// signalled completion.
pub trait ThreadedProcess: Send + 'static {
    /// Value produced by the worker routine
    type Output: Send + 'static;

    /// Name used in log output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this process loads a resource
    fn is_load_process(&self) -> bool {
        false
    }

    /// Build the routine to run on the worker thread
    fn work(&mut self) -> WorkRoutine<Self::Output>;

    /// The worker produced a value
    fn on_success(&mut self, output: Self::Output);

    /// The worker failed, panicked or could not be started
    fn on_fail(&mut self, _error: WorkError) {}

    /// The process was aborted; the worker has been asked to stop
    fn on_abort(&mut self) {}
}

/// Owned worker thread plus its completion and cancellation flags
pub struct WorkerHandle {
    name: String,
    done: Arc<AtomicBool>,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker raised its completion flag
    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Ask the worker to stop at its next safe point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Join the thread if it has finished
    ///
    /// Never blocks on a running worker. Returns true once the thread has
    /// been joined.
    pub fn try_reap(&mut self) -> bool {
        if !self.is_finished() {
            return false;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Worker '{}' panicked outside its routine", self.name);
            }
        }
        true
    }

    /// Wait up to `timeout` for the worker to finish, then detach it
    ///
    /// Returns true if the thread was joined.
    pub fn reap_within(mut self, timeout: Duration) -> bool {
        self.cancel();
        let deadline = Instant::now() + timeout;
        while !self.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        if self.try_reap() {
            true
        } else {
            log::warn!(
                "Worker '{}' did not stop within {:?}, detaching",
                self.name,
                timeout
            );
            self.thread.take();
            false
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
            self.try_reap();
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Adapter that runs a [`ThreadedProcess`] as a queue [`Process`]
pub struct Threaded<T: ThreadedProcess> {
    inner: T,
    cancel: CancelToken,
    slot: ResultSlot<T::Output>,
    worker: Option<WorkerHandle>,
    output: Option<T::Output>,
    error: Option<WorkError>,
    started: bool,
}

impl<T: ThreadedProcess> Threaded<T> {
    /// Wrap a threaded process
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            cancel: CancelToken::new(),
            slot: Arc::new(Mutex::new(None)),
            worker: None,
            output: None,
            error: None,
            started: false,
        }
    }

    /// Get the wrapped process
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Get the wrapped process mutably
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Token shared with the worker routine
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn spawn(&mut self, ctx: &mut ProcessContext<'_>) {
        let routine = self.inner.work();
        let done = Arc::new(AtomicBool::new(false));
        let name = format!(
            "{}-{}",
            ctx.config().worker_name_prefix,
            &ctx.id().as_uuid().simple().to_string()[..8]
        );

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = ctx.config().worker_stack_size {
            builder = builder.stack_size(size);
        }

        let slot = Arc::clone(&self.slot);
        let flag = Arc::clone(&done);
        let cancel = self.cancel.clone();
        let spawned = builder.spawn(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| routine(&cancel))) {
                Ok(result) => result,
                Err(payload) => Err(WorkError::Panicked(panic_message(payload.as_ref()))),
            };
            *slot.lock() = Some(result);
            flag.store(true, Ordering::Release);
        });

        match spawned {
            Ok(thread) => {
                log::debug!("Started worker '{}' for {}", name, self.inner.name());
                self.worker = Some(WorkerHandle {
                    name,
                    done,
                    cancel: self.cancel.clone(),
                    thread: Some(thread),
                });
            }
            Err(e) => {
                log::error!("Failed to start worker for {}: {}", self.inner.name(), e);
                self.error = Some(WorkError::Spawn(e.to_string()));
                ctx.fail();
            }
        }
    }

    fn poll(&mut self, ctx: &mut ProcessContext<'_>) {
        let finished = match self.worker.as_mut() {
            Some(worker) => worker.try_reap(),
            None => return,
        };
        if !finished {
            return;
        }
        self.worker = None;

        match self.slot.lock().take() {
            Some(Ok(output)) => {
                self.output = Some(output);
                ctx.succeed();
            }
            Some(Err(error)) => {
                log::debug!("Worker for {} failed: {}", self.inner.name(), error);
                self.error = Some(error);
                ctx.fail();
            }
            None => {
                self.error = Some(WorkError::failed("worker finished without a result"));
                ctx.fail();
            }
        }
    }
}

impl<T: ThreadedProcess> Process for Threaded<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_threaded(&self) -> bool {
        true
    }

    fn is_load_process(&self) -> bool {
        self.inner.is_load_process()
    }

    fn on_init(&mut self, ctx: &mut ProcessContext<'_>) {
        if self.started {
            log::warn!("Worker for {} already started", self.inner.name());
            return;
        }
        self.started = true;
        self.spawn(ctx);
    }

    fn on_update(&mut self, ctx: &mut ProcessContext<'_>) {
        self.poll(ctx);
    }

    fn on_success(&mut self) {
        match self.output.take() {
            Some(output) => self.inner.on_success(output),
            None => log::error!("{} succeeded without output", self.inner.name()),
        }
    }

    fn on_fail(&mut self) {
        let error = self
            .error
            .take()
            .unwrap_or_else(|| WorkError::failed("unknown failure"));
        self.inner.on_fail(error);
    }

    fn on_abort(&mut self) {
        self.cancel.cancel();
        self.inner.on_abort();
    }

    fn take_worker(&mut self) -> Option<WorkerHandle> {
        self.worker.take()
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
