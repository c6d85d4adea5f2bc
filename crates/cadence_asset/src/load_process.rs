//! Load Process - one background resource load
//!
//! The worker only sees a [`LoadRequest`] snapshot. The handle is touched on
//! the main thread alone: marked loading when the process is created, and
//! settled exactly once from the completion hook that the queue dispatches.

use std::sync::Arc;

use cadence_process::{Threaded, ThreadedProcess, WorkError, WorkRoutine};

use crate::cache::ResourceCache;
use crate::handle::ResourceHandle;
use crate::loader::{self, LoadRequest};
use crate::resource::Resource;

/// Threaded process that loads a single resource into its handle
pub struct LoadProcess {
    cache: Arc<ResourceCache>,
    handle: Arc<ResourceHandle>,
    request: LoadRequest,
    settled: bool,
}

impl LoadProcess {
    /// Claim `handle` for loading
    ///
    /// Returns `None` if the handle already has a load in flight.
    pub fn new(cache: Arc<ResourceCache>, handle: Arc<ResourceHandle>) -> Option<Self> {
        if !handle.begin_load() {
            log::debug!("{} ({}) is already loading", handle.name(), handle.id());
            return None;
        }

        cache.counters().start();
        let request = LoadRequest::from_handle(&handle, &cache.config().asset_dir);
        Some(Self {
            cache,
            handle,
            request,
            settled: false,
        })
    }

    /// Handle being loaded
    pub fn handle(&self) -> &Arc<ResourceHandle> {
        &self.handle
    }

    /// Wrap for attaching to a process queue
    pub fn into_process(self) -> Threaded<Self> {
        Threaded::new(self)
    }

    fn settle(&mut self) -> bool {
        !std::mem::replace(&mut self.settled, true)
    }
}

impl ThreadedProcess for LoadProcess {
    type Output = Resource;

    fn name(&self) -> &str {
        self.handle.name()
    }

    fn is_load_process(&self) -> bool {
        true
    }

    fn work(&mut self) -> WorkRoutine<Resource> {
        let request = self.request.clone();
        Box::new(move |cancel| loader::load(&request, cancel).map_err(WorkError::from))
    }

    fn on_success(&mut self, resource: Resource) {
        if self.settle() {
            self.cache.publish(&self.handle, resource);
            self.cache.counters().finish_loaded();
        }
    }

    fn on_fail(&mut self, error: WorkError) {
        if self.settle() {
            self.cache.fail(&self.handle, error.to_string());
            self.cache.counters().finish_failed();
        }
    }

    fn on_abort(&mut self) {
        if self.settle() {
            self.cache.cancel_load(&self.handle);
            self.cache.counters().finish_cancelled();
        }
    }
}

impl Drop for LoadProcess {
    fn drop(&mut self) {
        // Dropped without a completion hook, e.g. by a queue that was never run
        if self.settle() {
            self.cache.cancel_load(&self.handle);
            self.cache.counters().finish_cancelled();
        }
    }
}
