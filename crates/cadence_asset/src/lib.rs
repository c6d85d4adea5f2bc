//! # cadence_asset - Background Resource Loading
//!
//! Resource loading on top of `cadence_process`:
//! - Handles that exist before their resource and expose it only once loaded
//! - One threaded load process per load, ticked by the caller's queue
//! - Per-kind loaders (images, textures, cube maps, materials, meshes, models,
//!   animations, shader programs, scripts, audio)
//! - Coalescing of duplicate requests and a drainable event queue
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cadence_asset::prelude::*;
//! use cadence_process::ProcessQueue;
//!
//! let cache = Arc::new(ResourceCache::new(ResourceCacheConfig::with_asset_dir("assets")));
//! let mut queue = ProcessQueue::new();
//!
//! let handle = cache.load(&mut queue, ResourceKind::Texture, "textures/player.png");
//!
//! // Each frame
//! queue.update_processes(16);
//! for event in cache.drain_events() {
//!     // ResourceEvent::Loaded(id), Failed(id, reason), Unloaded(id)
//! }
//!
//! if let Some(resource) = handle.resource() {
//!     // Use the texture
//! }
//! ```

pub mod cache;
pub mod handle;
pub mod load_process;
pub mod loader;
pub mod resource;

pub use cache::{LoadCounters, ResourceCache, ResourceCacheConfig, ResourceEvent};
pub use handle::{LoadState, ResourceHandle, ResourceId, ResourceKind, ResourceRequest};
pub use load_process::LoadProcess;
pub use loader::{LoadError, LoadRequest, LoadResult};
pub use resource::{
    AnimationChannel, AnimationClip, AudioClip, AudioSettings, AudioSourceType, CubeTexture,
    ImageData, ImageFormat, Material, Mesh, Model, ModelDescription, Resource, Script,
    ShaderProgram, ShaderStage, ShaderStageKind, Texture, TextureUsage, Vertex, CUBE_FACES,
    POLYGON_NAMES,
};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::cache::{ResourceCache, ResourceCacheConfig, ResourceEvent};
    pub use crate::handle::{LoadState, ResourceHandle, ResourceKind, ResourceRequest};
    pub use crate::loader::LoadError;
    pub use crate::resource::Resource;
}
