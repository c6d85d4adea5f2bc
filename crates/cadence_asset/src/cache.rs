//! Resource Cache - owns handles and schedules their loads
//!
//! The cache is the only place handles are created. Loads run as
//! [`LoadProcess`]es on a caller-supplied [`ProcessQueue`]; the cache only
//! coalesces duplicate requests and records the outcome.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use cadence_process::{ProcessHandle, ProcessQueue};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::handle::{LoadState, ResourceHandle, ResourceId, ResourceKind, ResourceRequest};
use crate::load_process::LoadProcess;
use crate::resource::Resource;

/// Event from the resource cache
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEvent {
    /// Resource finished loading (never raised for child resources)
    Loaded(ResourceId),
    /// Resource failed to load
    Failed(ResourceId, String),
    /// Resource was unloaded
    Unloaded(ResourceId),
}

/// Resource cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCacheConfig {
    /// Base directory for relative resource paths
    pub asset_dir: PathBuf,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
        }
    }
}

impl ResourceCacheConfig {
    /// Use `asset_dir` as the base directory
    pub fn with_asset_dir(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
        }
    }

    /// Parse from TOML; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

/// Load bookkeeping shared between the cache and its load processes
#[derive(Debug, Default)]
pub struct LoadCounters {
    outstanding: AtomicUsize,
    loaded: AtomicUsize,
    failed: AtomicUsize,
}

impl LoadCounters {
    /// Loads scheduled but not yet settled
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Loads that published a resource
    pub fn loaded(&self) -> usize {
        self.loaded.load(Ordering::Acquire)
    }

    /// Loads that failed
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn start(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn finish_loaded(&self) {
        self.loaded.fetch_add(1, Ordering::AcqRel);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn finish_failed(&self) {
        self.failed.fetch_add(1, Ordering::AcqRel);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn finish_cancelled(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owner of every resource handle
pub struct ResourceCache {
    config: ResourceCacheConfig,
    next_id: AtomicU64,
    handles: RwLock<BTreeMap<ResourceId, Arc<ResourceHandle>>>,
    /// (kind, path) to handle, for coalescing
    path_map: RwLock<HashMap<(ResourceKind, PathBuf), ResourceId>>,
    events: RwLock<Vec<ResourceEvent>>,
    counters: LoadCounters,
}

impl ResourceCache {
    /// Create a new cache
    pub fn new(config: ResourceCacheConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            handles: RwLock::new(BTreeMap::new()),
            path_map: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            counters: LoadCounters::default(),
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(ResourceCacheConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &ResourceCacheConfig {
        &self.config
    }

    /// Get the load counters
    pub fn counters(&self) -> &LoadCounters {
        &self.counters
    }

    // ========== Handles ==========

    /// Get or create the handle for `kind` at `path`
    pub fn create_handle(
        &self,
        kind: ResourceKind,
        path: impl Into<PathBuf>,
    ) -> Arc<ResourceHandle> {
        self.create_handle_with(ResourceRequest::new(kind, path))
    }

    /// Get or create a handle from a full request
    ///
    /// An existing handle for the same kind and path is returned as is.
    pub fn create_handle_with(&self, request: ResourceRequest) -> Arc<ResourceHandle> {
        let key = (request.kind, request.path.clone());
        if let Some(handle) = self.path_map.read().get(&key).and_then(|id| self.get(*id)) {
            return handle;
        }

        let mut path_map = self.path_map.write();
        // Another thread may have created it in between
        if let Some(handle) = path_map.get(&key).and_then(|id| self.get(*id)) {
            return handle;
        }

        let id = ResourceId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(ResourceHandle::new(id, request));
        log::debug!("Created handle {} for {}", id, handle.path().display());

        self.handles.write().insert(id, Arc::clone(&handle));
        path_map.insert(key, id);
        handle
    }

    /// Get a handle by ID
    pub fn get(&self, id: ResourceId) -> Option<Arc<ResourceHandle>> {
        self.handles.read().get(&id).cloned()
    }

    /// Get a handle by kind and path
    pub fn get_by_path(&self, kind: ResourceKind, path: &Path) -> Option<Arc<ResourceHandle>> {
        let id = *self.path_map.read().get(&(kind, path.to_path_buf()))?;
        self.get(id)
    }

    /// Number of handles
    pub fn handle_count(&self) -> usize {
        self.handles.read().len()
    }

    // ========== Loading ==========

    /// Get or create the handle for `kind` at `path` and load it if needed
    pub fn load(
        self: &Arc<Self>,
        queue: &mut ProcessQueue,
        kind: ResourceKind,
        path: impl Into<PathBuf>,
    ) -> Arc<ResourceHandle> {
        self.load_with(queue, ResourceRequest::new(kind, path))
    }

    /// Get or create a handle from a full request and load it if needed
    ///
    /// Only handles that were never loaded get a load process. A handle that
    /// is loading, loaded or failed is returned unchanged; use
    /// [`reload`](Self::reload) to try again.
    pub fn load_with(
        self: &Arc<Self>,
        queue: &mut ProcessQueue,
        request: ResourceRequest,
    ) -> Arc<ResourceHandle> {
        let handle = self.create_handle_with(request);
        if handle.state() == LoadState::NotLoaded {
            self.reload(queue, &handle);
        } else {
            log::debug!(
                "Coalesced load of {} ({:?})",
                handle.path().display(),
                handle.state()
            );
        }
        handle
    }

    /// Schedule a load for `handle`, whatever its current state
    ///
    /// Returns `None` if a load is already in flight.
    pub fn reload(
        self: &Arc<Self>,
        queue: &mut ProcessQueue,
        handle: &Arc<ResourceHandle>,
    ) -> Option<ProcessHandle> {
        let process = LoadProcess::new(Arc::clone(self), Arc::clone(handle))?;
        Some(queue.attach_process(process.into_process(), false))
    }

    /// Publish a loaded resource to its handle
    pub fn publish(&self, handle: &ResourceHandle, resource: Resource) {
        handle.set_resource(resource);
        log::info!("Loaded {} '{}' ({})", handle.kind().name(), handle.name(), handle.id());

        if !handle.is_child() {
            self.events.write().push(ResourceEvent::Loaded(handle.id()));
        }
    }

    /// Mark a handle as failed
    pub fn fail(&self, handle: &ResourceHandle, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!(
            "Failed to load {} '{}': {}",
            handle.kind().name(),
            handle.name(),
            reason
        );
        handle.set_failed(reason.clone());
        self.events.write().push(ResourceEvent::Failed(handle.id(), reason));
    }

    /// Release a handle whose load was aborted
    pub fn cancel_load(&self, handle: &ResourceHandle) {
        log::debug!("Cancelled load of {} ({})", handle.name(), handle.id());
        handle.reset();
    }

    /// Drop a handle and its resource
    ///
    /// Returns false if the handle is unknown or still loading.
    pub fn unload(&self, id: ResourceId) -> bool {
        let handle = match self.get(id) {
            Some(handle) => handle,
            None => return false,
        };
        if handle.is_loading() {
            log::warn!("Cannot unload {} while it is loading", id);
            return false;
        }

        self.handles.write().remove(&id);
        self.path_map.write().retain(|_, mapped| *mapped != id);
        handle.clear();
        self.events.write().push(ResourceEvent::Unloaded(id));
        true
    }

    /// Take all pending events
    pub fn drain_events(&self) -> Vec<ResourceEvent> {
        std::mem::take(&mut *self.events.write())
    }
}
