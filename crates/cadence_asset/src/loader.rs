//! Resource Loaders - per-kind routines that run on a load worker
//!
//! A [`LoadRequest`] is a snapshot of everything a loader needs, taken from
//! the handle on the main thread. Loaders never touch the handle itself; the
//! finished [`Resource`] is handed back and published on the main thread.

use std::fs;
use std::path::{Path, PathBuf};

use cadence_process::{CancelToken, WorkError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::handle::{ResourceHandle, ResourceKind};
use crate::resource::{
    AnimationClip, AudioClip, AudioSettings, AudioSourceType, CubeTexture, ImageData, ImageFormat,
    Material, Mesh, Model, ModelDescription, Resource, Script, ShaderProgram, ShaderStage,
    ShaderStageKind, Texture, TextureUsage, Vertex, CUBE_FACES,
};

/// Extensions tried for each cube texture face
const FACE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "hdr"];

/// Samples decoded between cancellation checks
const AUDIO_CANCEL_STRIDE: usize = 1 << 16;

/// Error during resource loading
#[derive(Debug, Error)]
pub enum LoadError {
    /// File or directory does not exist
    #[error("Resource not found: {}", .0.display())]
    NotFound(PathBuf),
    /// File exists but could not be read
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Contents could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
    /// File type not handled by the loader
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// A companion file the resource needs is missing
    #[error("Missing path: {0}")]
    MissingPath(String),
    /// The load was aborted
    #[error("Load cancelled")]
    Cancelled,
    /// The request cannot be served by this loader
    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

/// Result type for resource loading
pub type LoadResult<T> = Result<T, LoadError>;

impl From<LoadError> for WorkError {
    fn from(error: LoadError) -> Self {
        match error {
            LoadError::Cancelled => WorkError::Cancelled,
            other => WorkError::Failed(other.to_string()),
        }
    }
}

/// Snapshot of a handle taken on the main thread
#[derive(Clone, Debug)]
pub struct LoadRequest {
    pub kind: ResourceKind,
    pub name: String,
    /// Resolved against the asset directory
    pub path: PathBuf,
    /// Resolved against the asset directory
    pub additional_paths: Vec<PathBuf>,
    pub description: Option<Value>,
}

impl LoadRequest {
    /// Capture a handle, resolving relative paths against `asset_dir`
    pub fn from_handle(handle: &ResourceHandle, asset_dir: &Path) -> Self {
        Self {
            kind: handle.kind(),
            name: handle.name().to_string(),
            path: resolve(asset_dir, handle.path()),
            additional_paths: handle
                .additional_paths()
                .iter()
                .map(|p| resolve(asset_dir, p))
                .collect(),
            description: handle.description().cloned(),
        }
    }

    fn attribute(&self, key: &str) -> Option<&Value> {
        self.description.as_ref().and_then(|d| d.get(key))
    }

    /// Deserialize an attribute, warning and using the default if it is invalid
    fn attribute_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.attribute(key) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                log::warn!("Invalid '{}' for {}: {}, using default", key, self.name, e);
                T::default()
            }),
            None => T::default(),
        }
    }

    /// Deserialize the description, or the JSON file at `path` without one
    fn json_source<T: DeserializeOwned>(&self) -> LoadResult<T> {
        let value = match &self.description {
            Some(description) => description.clone(),
            None => {
                let text = read_text(&self.path)?;
                serde_json::from_str(&text)
                    .map_err(|e| LoadError::Parse(format!("{}: {}", self.path.display(), e)))?
            }
        };
        serde_json::from_value(value).map_err(|e| LoadError::Parse(format!("{}: {}", self.name, e)))
    }
}

fn resolve(asset_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || asset_dir.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        asset_dir.join(path)
    }
}

fn checkpoint(cancel: &CancelToken) -> LoadResult<()> {
    if cancel.is_cancelled() {
        Err(LoadError::Cancelled)
    } else {
        Ok(())
    }
}

fn read_bytes(path: &Path) -> LoadResult<Vec<u8>> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_text(path: &Path) -> LoadResult<String> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Load the resource described by `request`
///
/// Runs on a worker thread. Cancellation is checked between stages.
pub fn load(request: &LoadRequest, cancel: &CancelToken) -> LoadResult<Resource> {
    checkpoint(cancel)?;
    log::debug!(
        "Loading {} '{}' from {}",
        request.kind.name(),
        request.name,
        request.path.display()
    );

    let resource = match request.kind {
        ResourceKind::Image => Resource::Image(load_image(request)?),
        ResourceKind::Texture => Resource::Texture(load_texture(request)?),
        ResourceKind::CubeTexture => Resource::CubeTexture(load_cube_texture(request, cancel)?),
        ResourceKind::Material => Resource::Material(load_material(request)?),
        ResourceKind::Mesh => Resource::Mesh(load_mesh(request)?),
        ResourceKind::Model => Resource::Model(load_model(request, cancel)?),
        ResourceKind::Animation => Resource::Animation(load_animation(request)?),
        ResourceKind::ShaderProgram => Resource::ShaderProgram(load_shader_program(request)?),
        ResourceKind::Script => Resource::Script(load_script(request)?),
        ResourceKind::Audio => Resource::Audio(load_audio(request, cancel)?),
    };

    checkpoint(cancel)?;
    Ok(resource)
}

// ========== Images ==========

fn decode_image(path: &Path) -> LoadResult<image::DynamicImage> {
    let bytes = read_bytes(path)?;
    image::load_from_memory(&bytes).map_err(|e| match e {
        image::ImageError::Unsupported(e) => {
            LoadError::UnsupportedFormat(format!("{}: {}", path.display(), e))
        }
        other => LoadError::Parse(format!("{}: {}", path.display(), other)),
    })
}

fn load_image(request: &LoadRequest) -> LoadResult<ImageData> {
    let format: ImageFormat = request.attribute_or_default("format");
    Ok(ImageData::from_dynamic(decode_image(&request.path)?, format))
}

fn load_texture(request: &LoadRequest) -> LoadResult<Texture> {
    let usage = match request.attribute("usage") {
        Some(value) => TextureUsage::parse(value).unwrap_or_else(|| {
            log::warn!(
                "Invalid texture usage {} for {}, using diffuse",
                value,
                request.name
            );
            TextureUsage::Diffuse
        }),
        None => TextureUsage::Diffuse,
    };
    let generate_mipmaps = request
        .attribute("mipmaps")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(Texture {
        image: ImageData::from_dynamic(decode_image(&request.path)?, ImageFormat::Rgba8),
        usage,
        generate_mipmaps,
    })
}

fn find_face(dir: &Path, face: &str) -> Option<PathBuf> {
    FACE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", face, ext)))
        .find(|candidate| candidate.is_file())
}

fn load_cube_texture(request: &LoadRequest, cancel: &CancelToken) -> LoadResult<CubeTexture> {
    let dir = &request.path;
    if !dir.is_dir() {
        return Err(LoadError::NotFound(dir.clone()));
    }

    let mut faces = Vec::with_capacity(CUBE_FACES.len());
    for face in CUBE_FACES {
        checkpoint(cancel)?;
        let path = find_face(dir, face).ok_or_else(|| {
            LoadError::MissingPath(format!("{}: no '{}' face", dir.display(), face))
        })?;
        faces.push(ImageData::from_dynamic(decode_image(&path)?, ImageFormat::Rgba8));
    }

    let size = faces[0].width;
    if let Some(bad) = faces.iter().position(|f| f.width != size || f.height != size) {
        return Err(LoadError::Parse(format!(
            "{}: face '{}' is {}x{}, expected {}x{}",
            dir.display(),
            CUBE_FACES[bad],
            faces[bad].width,
            faces[bad].height,
            size,
            size
        )));
    }

    let faces: [ImageData; 6] = faces
        .try_into()
        .map_err(|_| LoadError::Parse(format!("{}: expected six faces", dir.display())))?;
    Ok(CubeTexture { faces, size })
}

// ========== Materials and geometry ==========

fn load_material(request: &LoadRequest) -> LoadResult<Material> {
    let mut material: Material = request.json_source()?;
    if material.name.is_empty() {
        material.name = request.name.clone();
    }
    Ok(material)
}

fn load_mesh(request: &LoadRequest) -> LoadResult<Mesh> {
    let stem = request
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match extension(&request.path).as_deref() {
        None => Mesh::polygon(&stem).ok_or_else(|| {
            LoadError::Unsupported(format!("'{}' is not a built-in polygon", stem))
        }),
        Some("obj") => {
            let text = read_text(&request.path)?;
            let mut mesh = Mesh::from_obj(&text)
                .map_err(|e| LoadError::Parse(format!("{}: {}", request.path.display(), e)))?;
            if mesh.name.is_empty() {
                mesh.name = request.name.clone();
            }
            Ok(mesh)
        }
        Some(other) => Err(LoadError::UnsupportedFormat(format!("mesh '.{}'", other))),
    }
}

fn load_model(request: &LoadRequest, cancel: &CancelToken) -> LoadResult<Model> {
    if request.description.is_some() {
        let description: ModelDescription = request.json_source()?;
        let meshes = description
            .meshes
            .iter()
            .map(|name| {
                Mesh::polygon(name)
                    .ok_or_else(|| LoadError::Parse(format!("unknown polygon '{}'", name)))
            })
            .collect::<LoadResult<Vec<Mesh>>>()?;

        return Ok(Model {
            name: if description.name.is_empty() {
                request.name.clone()
            } else {
                description.name
            },
            meshes,
            materials: description.materials,
            user_generated: true,
        });
    }

    match extension(&request.path).as_deref() {
        Some("gltf") | Some("glb") => {
            if !request.path.exists() {
                return Err(LoadError::NotFound(request.path.clone()));
            }
            load_gltf(&request.path, &request.name, cancel)
        }
        Some(other) => Err(LoadError::UnsupportedFormat(format!("model '.{}'", other))),
        None => Err(LoadError::UnsupportedFormat(format!(
            "model without extension: {}",
            request.path.display()
        ))),
    }
}

fn load_gltf(path: &Path, name: &str, cancel: &CancelToken) -> LoadResult<Model> {
    let (document, buffers, _images) = gltf::import(path)
        .map_err(|e| LoadError::Parse(format!("{}: {}", path.display(), e)))?;
    checkpoint(cancel)?;

    let mut meshes = Vec::new();
    for mesh in document.meshes() {
        let mesh_name = mesh.name().unwrap_or(name);
        let count = mesh.primitives().len();

        for (i, primitive) in mesh.primitives().enumerate() {
            let reader = primitive
                .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| {
                    LoadError::Parse(format!("{}: primitive without positions", mesh_name))
                })?
                .collect();
            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map(|n| n.collect())
                .unwrap_or_default();
            let uvs: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|t| t.into_f32().collect())
                .unwrap_or_default();
            let indices: Vec<u32> = reader
                .read_indices()
                .map(|read| read.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());

            let vertices = positions
                .iter()
                .enumerate()
                .map(|(v, &position)| {
                    Vertex::new(
                        position,
                        normals.get(v).copied().unwrap_or([0.0, 1.0, 0.0]),
                        uvs.get(v).copied().unwrap_or([0.0, 0.0]),
                    )
                })
                .collect();

            meshes.push(Mesh {
                name: if count > 1 {
                    format!("{}_{}", mesh_name, i)
                } else {
                    mesh_name.to_string()
                },
                vertices,
                indices,
            });
        }
    }

    let materials = document
        .materials()
        .map(|m| {
            let pbr = m.pbr_metallic_roughness();
            Material {
                name: m.name().unwrap_or_default().to_string(),
                base_color: pbr.base_color_factor(),
                metallic: pbr.metallic_factor(),
                roughness: pbr.roughness_factor(),
                emissive: m.emissive_factor(),
                ..Material::default()
            }
        })
        .collect();

    Ok(Model {
        name: name.to_string(),
        meshes,
        materials,
        user_generated: false,
    })
}

fn load_animation(request: &LoadRequest) -> LoadResult<AnimationClip> {
    let clip: AnimationClip = request.json_source()?;
    clip.validate()
        .map_err(|e| LoadError::Parse(format!("{}: {}", request.name, e)))
}

// ========== Shaders and scripts ==========

fn load_shader_program(request: &LoadRequest) -> LoadResult<ShaderProgram> {
    if request.description.is_some() {
        let mut program: ShaderProgram = request.json_source()?;
        if program.name.is_empty() {
            program.name = request.name.clone();
        }
        return Ok(program);
    }

    let stages: Vec<(ShaderStageKind, &PathBuf)> = match request.additional_paths.as_slice() {
        [] => vec![(ShaderStageKind::Compute, &request.path)],
        [fragment] => vec![
            (ShaderStageKind::Vertex, &request.path),
            (ShaderStageKind::Fragment, fragment),
        ],
        [fragment, geometry] => vec![
            (ShaderStageKind::Vertex, &request.path),
            (ShaderStageKind::Fragment, fragment),
            (ShaderStageKind::Geometry, geometry),
        ],
        more => {
            return Err(LoadError::Unsupported(format!(
                "shader program with {} additional paths",
                more.len()
            )))
        }
    };

    let stages = stages
        .into_iter()
        .map(|(kind, path)| {
            let source = read_text(path)?;
            if source.trim().is_empty() {
                return Err(LoadError::Parse(format!("{}: empty shader source", path.display())));
            }
            Ok(ShaderStage {
                kind,
                path: path.clone(),
                source,
            })
        })
        .collect::<LoadResult<Vec<ShaderStage>>>()?;

    Ok(ShaderProgram {
        name: request.name.clone(),
        stages,
    })
}

fn load_script(request: &LoadRequest) -> LoadResult<Script> {
    if !request.path.is_file() {
        return Err(LoadError::NotFound(request.path.clone()));
    }
    Ok(Script {
        name: request.name.clone(),
        path: request.path.clone(),
        source: read_text(&request.path)?,
    })
}

// ========== Audio ==========

fn load_audio(request: &LoadRequest, cancel: &CancelToken) -> LoadResult<AudioClip> {
    let source_type: AudioSourceType = request.attribute_or_default("sourceType");
    let settings: AudioSettings = request.attribute_or_default("sourceSettings");

    match extension(&request.path).as_deref() {
        Some("wav") | Some("wave") => {}
        Some(other) => return Err(LoadError::UnsupportedFormat(format!("audio '.{}'", other))),
        None => {
            return Err(LoadError::UnsupportedFormat(format!(
                "audio without extension: {}",
                request.path.display()
            )))
        }
    }
    if !request.path.is_file() {
        return Err(LoadError::NotFound(request.path.clone()));
    }

    let parse_error =
        |e: hound::Error| LoadError::Parse(format!("{}: {}", request.path.display(), e));
    let reader = hound::WavReader::open(&request.path).map_err(parse_error)?;
    let spec = reader.spec();

    // The header's sample count is untrusted; never reserve past the file size
    let file_len = fs::metadata(&request.path).map(|m| m.len()).unwrap_or(0);
    let sample_bytes = u64::from(spec.bits_per_sample.div_ceil(8).max(1));
    let capacity = u64::from(reader.len()).min(file_len / sample_bytes);
    let mut samples = Vec::with_capacity(capacity as usize);
    match spec.sample_format {
        hound::SampleFormat::Float => {
            for (i, sample) in reader.into_samples::<f32>().enumerate() {
                if i % AUDIO_CANCEL_STRIDE == 0 {
                    checkpoint(cancel)?;
                }
                samples.push(sample.map_err(parse_error)?);
            }
        }
        hound::SampleFormat::Int => {
            let max = (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            for (i, sample) in reader.into_samples::<i32>().enumerate() {
                if i % AUDIO_CANCEL_STRIDE == 0 {
                    checkpoint(cancel)?;
                }
                samples.push(sample.map_err(parse_error)? as f32 / max);
            }
        }
    }

    Ok(AudioClip {
        source_type,
        settings,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}
