//! Resource Handle - shared reference to a (possibly not yet loaded) resource
//!
//! A handle exists before its resource does. The cache creates it in the
//! `NotLoaded` state, a load process moves it to `Loading`, and the resource
//! becomes visible through [`ResourceHandle::resource`] only once the main
//! thread has published it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resource::Resource;

/// Unique identifier for a resource handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Create a new resource ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw ID value
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Load state for a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadState {
    /// Nothing loaded and no load in flight
    NotLoaded = 0,
    /// A load process owns the handle
    Loading = 1,
    /// Resource is published and ready
    Loaded = 2,
    /// Last load failed
    Failed = 3,
}

impl From<u8> for LoadState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Loading,
            2 => Self::Loaded,
            3 => Self::Failed,
            _ => Self::NotLoaded,
        }
    }
}

/// Kind of resource a handle refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Texture,
    CubeTexture,
    Material,
    Mesh,
    Model,
    Animation,
    ShaderProgram,
    Script,
    Audio,
}

impl ResourceKind {
    /// Lowercase name for log output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Texture => "texture",
            Self::CubeTexture => "cube texture",
            Self::Material => "material",
            Self::Mesh => "mesh",
            Self::Model => "model",
            Self::Animation => "animation",
            Self::ShaderProgram => "shader program",
            Self::Script => "script",
            Self::Audio => "audio",
        }
    }
}

/// Everything needed to create a handle
#[derive(Clone, Debug)]
pub struct ResourceRequest {
    pub kind: ResourceKind,
    pub path: PathBuf,
    pub name: Option<String>,
    /// Companion files, e.g. the fragment shader of a program
    pub additional_paths: Vec<PathBuf>,
    /// JSON description used instead of (or alongside) the file
    pub description: Option<Value>,
    /// Child resources are loaded as part of a parent and raise no events
    pub is_child: bool,
}

impl ResourceRequest {
    /// Request a resource by kind and path
    pub fn new(kind: ResourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            name: None,
            additional_paths: Vec::new(),
            description: None,
            is_child: false,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a companion path
    pub fn with_additional_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.additional_paths.push(path.into());
        self
    }

    /// Attach a JSON description
    pub fn with_description(mut self, description: Value) -> Self {
        self.description = Some(description);
        self
    }

    /// Mark as a child resource
    pub fn as_child(mut self) -> Self {
        self.is_child = true;
        self
    }
}

/// Shared handle to a resource
///
/// Handles are created by the [`ResourceCache`](crate::ResourceCache) and
/// shared with load processes through an `Arc`.
pub struct ResourceHandle {
    id: ResourceId,
    kind: ResourceKind,
    path: PathBuf,
    name: String,
    additional_paths: Vec<PathBuf>,
    description: Option<Value>,
    is_child: bool,
    state: AtomicU8,
    /// Incremented on every publish
    generation: AtomicU32,
    resource: RwLock<Option<Arc<Resource>>>,
    error: RwLock<Option<String>>,
}

impl ResourceHandle {
    pub(crate) fn new(id: ResourceId, request: ResourceRequest) -> Self {
        let name = request.name.unwrap_or_else(|| {
            request
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        Self {
            id,
            kind: request.kind,
            path: request.path,
            name,
            additional_paths: request.additional_paths,
            description: request.description,
            is_child: request.is_child,
            state: AtomicU8::new(LoadState::NotLoaded as u8),
            generation: AtomicU32::new(0),
            resource: RwLock::new(None),
            error: RwLock::new(None),
        }
    }

    /// Get the resource ID
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get the resource kind
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Path as requested
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name (file stem unless set explicitly)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Companion paths
    pub fn additional_paths(&self) -> &[PathBuf] {
        &self.additional_paths
    }

    /// JSON description, if any
    pub fn description(&self) -> Option<&Value> {
        self.description.as_ref()
    }

    /// Named attribute from the description object
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.description.as_ref().and_then(|d| d.get(key))
    }

    /// All named attributes from the description object
    pub fn attributes(&self) -> BTreeMap<&str, &Value> {
        match self.description.as_ref().and_then(Value::as_object) {
            Some(object) => object.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            None => BTreeMap::new(),
        }
    }

    /// Whether this resource belongs to a parent resource
    pub fn is_child(&self) -> bool {
        self.is_child
    }

    /// Get the load state
    pub fn state(&self) -> LoadState {
        LoadState::from(self.state.load(Ordering::Acquire))
    }

    /// Check if a load is in flight
    pub fn is_loading(&self) -> bool {
        self.state() == LoadState::Loading
    }

    /// Check if the resource is published
    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// Get the generation (incremented on each publish)
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// The published resource; `None` unless the handle is `Loaded`
    pub fn resource(&self) -> Option<Arc<Resource>> {
        if !self.is_loaded() {
            return None;
        }
        self.resource.read().clone()
    }

    /// Reason for the last failure
    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    /// Claim the handle for a new load
    ///
    /// Returns false if a load is already in flight.
    pub(crate) fn begin_load(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if LoadState::from(current) == LoadState::Loading {
                return false;
            }
            match self.state.compare_exchange(
                current,
                LoadState::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn set_resource(&self, resource: Resource) {
        *self.resource.write() = Some(Arc::new(resource));
        *self.error.write() = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.state.store(LoadState::Loaded as u8, Ordering::Release);
    }

    pub(crate) fn set_failed(&self, reason: String) {
        *self.resource.write() = None;
        *self.error.write() = Some(reason);
        self.state.store(LoadState::Failed as u8, Ordering::Release);
    }

    /// Back to `NotLoaded`, keeping any published resource
    pub(crate) fn reset(&self) {
        let next = if self.resource.read().is_some() {
            LoadState::Loaded
        } else {
            LoadState::NotLoaded
        };
        self.state.store(next as u8, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        *self.resource.write() = None;
        *self.error.write() = None;
        self.state.store(LoadState::NotLoaded as u8, Ordering::Release);
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}
