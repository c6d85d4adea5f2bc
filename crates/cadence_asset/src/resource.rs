//! Resource data produced by the loaders
//!
//! Everything here is plain CPU-side data. Uploading to a GPU or an audio
//! device is the job of whoever consumes the published resource.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::handle::ResourceKind;

/// A fully constructed resource
#[derive(Clone, Debug)]
pub enum Resource {
    Image(ImageData),
    Texture(Texture),
    CubeTexture(CubeTexture),
    Material(Material),
    Mesh(Mesh),
    Model(Model),
    Animation(AnimationClip),
    ShaderProgram(ShaderProgram),
    Script(Script),
    Audio(AudioClip),
}

impl Resource {
    /// Kind of this resource
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Image(_) => ResourceKind::Image,
            Self::Texture(_) => ResourceKind::Texture,
            Self::CubeTexture(_) => ResourceKind::CubeTexture,
            Self::Material(_) => ResourceKind::Material,
            Self::Mesh(_) => ResourceKind::Mesh,
            Self::Model(_) => ResourceKind::Model,
            Self::Animation(_) => ResourceKind::Animation,
            Self::ShaderProgram(_) => ResourceKind::ShaderProgram,
            Self::Script(_) => ResourceKind::Script,
            Self::Audio(_) => ResourceKind::Audio,
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&Texture> {
        match self {
            Self::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn as_cube_texture(&self) -> Option<&CubeTexture> {
        match self {
            Self::CubeTexture(cube) => Some(cube),
            _ => None,
        }
    }

    pub fn as_material(&self) -> Option<&Material> {
        match self {
            Self::Material(material) => Some(material),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match self {
            Self::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_animation(&self) -> Option<&AnimationClip> {
        match self {
            Self::Animation(clip) => Some(clip),
            _ => None,
        }
    }

    pub fn as_shader_program(&self) -> Option<&ShaderProgram> {
        match self {
            Self::ShaderProgram(program) => Some(program),
            _ => None,
        }
    }

    pub fn as_script(&self) -> Option<&Script> {
        match self {
            Self::Script(script) => Some(script),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioClip> {
        match self {
            Self::Audio(clip) => Some(clip),
            _ => None,
        }
    }
}

// ========== Images and textures ==========

/// Pixel layout of decoded image data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    #[default]
    Rgba8,
    Rgb8,
    Luma8,
}

impl ImageFormat {
    /// Bytes per pixel
    pub fn channels(&self) -> u32 {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::Luma8 => 1,
        }
    }
}

/// Decoded image pixels
#[derive(Clone, Debug)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Tightly packed rows
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Convert a decoded image into the requested layout
    pub fn from_dynamic(image: image::DynamicImage, format: ImageFormat) -> Self {
        let (width, height) = (image.width(), image.height());
        let pixels = match format {
            ImageFormat::Rgba8 => image.to_rgba8().into_raw(),
            ImageFormat::Rgb8 => image.to_rgb8().into_raw(),
            ImageFormat::Luma8 => image.to_luma8().into_raw(),
        };
        Self {
            width,
            height,
            format,
            pixels,
        }
    }

    /// Bytes per row
    pub fn stride(&self) -> u32 {
        self.width * self.format.channels()
    }
}

/// What a texture is sampled as
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureUsage {
    #[default]
    Diffuse,
    Normal,
    Specular,
    Emissive,
    Opacity,
    Occlusion,
}

impl TextureUsage {
    /// Parse a usage from a name or its numeric index
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        if let Some(index) = value.as_u64() {
            return match index {
                0 => Some(Self::Diffuse),
                1 => Some(Self::Normal),
                2 => Some(Self::Specular),
                3 => Some(Self::Emissive),
                4 => Some(Self::Opacity),
                5 => Some(Self::Occlusion),
                _ => None,
            };
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Image plus sampling information
#[derive(Clone, Debug)]
pub struct Texture {
    pub image: ImageData,
    pub usage: TextureUsage,
    pub generate_mipmaps: bool,
}

/// Order of faces in a cube texture
pub const CUBE_FACES: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

/// Six square faces of equal size
#[derive(Clone, Debug)]
pub struct CubeTexture {
    /// Faces in [`CUBE_FACES`] order
    pub faces: [ImageData; 6],
    pub size: u32,
}

// ========== Materials ==========

/// Surface parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: [f32; 3],
    /// Texture paths by usage name
    pub textures: BTreeMap<String, String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 1.0,
            emissive: [0.0, 0.0, 0.0],
            textures: BTreeMap::new(),
        }
    }
}

// ========== Geometry ==========

/// Vertex shared by every mesh
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Indexed triangle list
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Names of the meshes that are generated instead of read from disk
pub const POLYGON_NAMES: [&str; 4] = ["cube", "quad", "triangle", "plane"];

impl Mesh {
    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check whether `name` is a built-in polygon
    pub fn is_polygon_name(name: &str) -> bool {
        POLYGON_NAMES.contains(&name)
    }

    /// Generate a built-in polygon by name
    pub fn polygon(name: &str) -> Option<Mesh> {
        let mut mesh = match name {
            "cube" => Self::cube(),
            "quad" => Self::quad(),
            "triangle" => Self::triangle(),
            "plane" => Self::plane(4),
            _ => return None,
        };
        mesh.name = name.to_string();
        Some(mesh)
    }

    /// Unit cube centered on the origin
    pub fn cube() -> Mesh {
        #[rustfmt::skip]
        let vertices = vec![
            // Front
            Vertex::new([-0.5, -0.5,  0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([ 0.5, -0.5,  0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [0.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex::new([-0.5,  0.5,  0.5], [0.0, 0.0, 1.0], [0.0, 0.0]),
            // Back
            Vertex::new([-0.5, -0.5, -0.5], [0.0, 0.0, -1.0], [1.0, 1.0]),
            Vertex::new([-0.5,  0.5, -0.5], [0.0, 0.0, -1.0], [1.0, 0.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [0.0, 0.0, -1.0], [0.0, 0.0]),
            Vertex::new([ 0.5, -0.5, -0.5], [0.0, 0.0, -1.0], [0.0, 1.0]),
            // Top
            Vertex::new([-0.5,  0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 1.0]),
            Vertex::new([-0.5,  0.5,  0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [0.0, 1.0, 0.0], [1.0, 1.0]),
            // Bottom
            Vertex::new([-0.5, -0.5, -0.5], [0.0, -1.0, 0.0], [0.0, 0.0]),
            Vertex::new([ 0.5, -0.5, -0.5], [0.0, -1.0, 0.0], [1.0, 0.0]),
            Vertex::new([ 0.5, -0.5,  0.5], [0.0, -1.0, 0.0], [1.0, 1.0]),
            Vertex::new([-0.5, -0.5,  0.5], [0.0, -1.0, 0.0], [0.0, 1.0]),
            // Right
            Vertex::new([ 0.5, -0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([ 0.5,  0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([ 0.5,  0.5,  0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
            Vertex::new([ 0.5, -0.5,  0.5], [1.0, 0.0, 0.0], [0.0, 1.0]),
            // Left
            Vertex::new([-0.5, -0.5, -0.5], [-1.0, 0.0, 0.0], [0.0, 1.0]),
            Vertex::new([-0.5, -0.5,  0.5], [-1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([-0.5,  0.5,  0.5], [-1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([-0.5,  0.5, -0.5], [-1.0, 0.0, 0.0], [0.0, 0.0]),
        ];

        let indices = (0..6u32)
            .flat_map(|face| {
                let base = face * 4;
                [base, base + 1, base + 2, base, base + 2, base + 3]
            })
            .collect();

        Mesh {
            name: String::new(),
            vertices,
            indices,
        }
    }

    /// Unit quad in the XY plane facing +Z
    pub fn quad() -> Mesh {
        let normal = [0.0, 0.0, 1.0];
        Mesh {
            name: String::new(),
            vertices: vec![
                Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
                Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
                Vertex::new([0.5, 0.5, 0.0], normal, [1.0, 0.0]),
                Vertex::new([-0.5, 0.5, 0.0], normal, [0.0, 0.0]),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Single triangle in the XY plane facing +Z
    pub fn triangle() -> Mesh {
        let normal = [0.0, 0.0, 1.0];
        Mesh {
            name: String::new(),
            vertices: vec![
                Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
                Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
                Vertex::new([0.0, 0.5, 0.0], normal, [0.5, 0.0]),
            ],
            indices: vec![0, 1, 2],
        }
    }

    /// Subdivided unit plane in the XZ plane facing +Y
    pub fn plane(subdivisions: u32) -> Mesh {
        let subdivisions = subdivisions.max(1);
        let step = 1.0 / subdivisions as f32;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for y in 0..=subdivisions {
            for x in 0..=subdivisions {
                let u = x as f32 * step;
                let v = y as f32 * step;
                vertices.push(Vertex::new([u - 0.5, 0.0, v - 0.5], [0.0, 1.0, 0.0], [u, v]));
            }
        }

        for y in 0..subdivisions {
            for x in 0..subdivisions {
                let curr = y * (subdivisions + 1) + x;
                let next = (y + 1) * (subdivisions + 1) + x;
                indices.extend_from_slice(&[curr, next, curr + 1, curr + 1, next, next + 1]);
            }
        }

        Mesh {
            name: String::new(),
            vertices,
            indices,
        }
    }

    /// Parse Wavefront OBJ text
    ///
    /// Faces with more than three corners are fan-triangulated. Flat normals
    /// are generated when the file has none.
    pub fn from_obj(text: &str) -> Result<Mesh, String> {
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut normals: Vec<[f32; 3]> = Vec::new();
        let mut uvs: Vec<[f32; 2]> = Vec::new();
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut name = String::new();

        for (line_no, line) in text.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }

            match parts[0] {
                "o" if parts.len() >= 2 && name.is_empty() => name = parts[1].to_string(),
                "v" if parts.len() >= 4 => positions.push([
                    parse_float(parts[1], line_no)?,
                    parse_float(parts[2], line_no)?,
                    parse_float(parts[3], line_no)?,
                ]),
                "vn" if parts.len() >= 4 => normals.push([
                    parse_float(parts[1], line_no)?,
                    parse_float(parts[2], line_no)?,
                    parse_float(parts[3], line_no)?,
                ]),
                "vt" if parts.len() >= 2 => uvs.push([
                    parse_float(parts[1], line_no)?,
                    1.0 - parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.0),
                ]),
                "f" if parts.len() >= 4 => {
                    let corners = parts[1..]
                        .iter()
                        .map(|corner| {
                            parse_corner(corner, &positions, &normals, &uvs).ok_or_else(|| {
                                format!("line {}: bad face corner '{}'", line_no + 1, corner)
                            })
                        })
                        .collect::<Result<Vec<Vertex>, String>>()?;

                    for i in 1..corners.len() - 1 {
                        let base = vertices.len() as u32;
                        vertices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                        indices.extend_from_slice(&[base, base + 1, base + 2]);
                    }
                }
                _ => {}
            }
        }

        if indices.is_empty() {
            return Err("no faces".to_string());
        }
        if normals.is_empty() {
            generate_flat_normals(&mut vertices, &indices);
        }

        Ok(Mesh {
            name,
            vertices,
            indices,
        })
    }
}

fn parse_float(s: &str, line_no: usize) -> Result<f32, String> {
    s.parse()
        .map_err(|_| format!("line {}: '{}' is not a number", line_no + 1, s))
}

/// Parse a face corner like "1/2/3", "1//3" or "1" (negative = relative)
fn parse_corner(
    s: &str,
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
) -> Option<Vertex> {
    fn resolve(raw: &str, len: usize) -> Option<usize> {
        let index: i64 = raw.parse().ok()?;
        if index > 0 {
            Some(index as usize - 1)
        } else if index < 0 {
            len.checked_sub(index.unsigned_abs() as usize)
        } else {
            None
        }
    }

    let parts: Vec<&str> = s.split('/').collect();
    let position = *positions.get(resolve(parts.first()?, positions.len())?)?;

    let uv = match parts.get(1) {
        Some(raw) if !raw.is_empty() => *uvs.get(resolve(raw, uvs.len())?)?,
        _ => [0.0, 0.0],
    };
    let normal = match parts.get(2) {
        Some(raw) if !raw.is_empty() => *normals.get(resolve(raw, normals.len())?)?,
        _ => [0.0, 1.0, 0.0],
    };

    Some(Vertex::new(position, normal, uv))
}

fn generate_flat_normals(vertices: &mut [Vertex], indices: &[u32]) {
    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0.max(i1).max(i2) >= vertices.len() {
            continue;
        }

        let p0 = vertices[i0].position;
        let p1 = vertices[i1].position;
        let p2 = vertices[i2].position;
        let e1 = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
        let e2 = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];
        let n = [
            e1[1] * e2[2] - e1[2] * e2[1],
            e1[2] * e2[0] - e1[0] * e2[2],
            e1[0] * e2[1] - e1[1] * e2[0],
        ];

        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        let normal = if len > 0.0001 {
            [n[0] / len, n[1] / len, n[2] / len]
        } else {
            [0.0, 1.0, 0.0]
        };

        for i in [i0, i1, i2] {
            vertices[i].normal = normal;
        }
    }
}

/// Meshes plus their materials
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    /// Built from a JSON description rather than a model file
    pub user_generated: bool,
}

/// JSON form of a user-built model
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDescription {
    pub name: String,
    /// Built-in polygon names
    pub meshes: Vec<String>,
    pub materials: Vec<Material>,
}

// ========== Animation ==========

/// Keyframed values for one target
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationChannel {
    /// Node or property the channel drives
    pub target: String,
    /// Keyframe times in seconds, non-decreasing
    pub times: Vec<f32>,
    /// One value per keyframe
    pub values: Vec<[f32; 4]>,
}

/// A named set of channels
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Computed from the channels when absent
    #[serde(default)]
    pub duration: f32,
    pub channels: Vec<AnimationChannel>,
}

impl AnimationClip {
    /// Check keyframe consistency and fill in the duration
    pub fn validate(mut self) -> Result<Self, String> {
        for channel in &self.channels {
            if channel.times.len() != channel.values.len() {
                return Err(format!(
                    "channel '{}' has {} times but {} values",
                    channel.target,
                    channel.times.len(),
                    channel.values.len()
                ));
            }
            if channel.times.windows(2).any(|w| w[1] < w[0]) {
                return Err(format!("channel '{}' keyframes are out of order", channel.target));
            }
        }

        let end = self
            .channels
            .iter()
            .filter_map(|c| c.times.last().copied())
            .fold(0.0f32, f32::max);
        if self.duration <= 0.0 {
            self.duration = end;
        }
        Ok(self)
    }
}

// ========== Shaders and scripts ==========

/// Pipeline stage of a shader source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

/// One shader source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShaderStage {
    pub kind: ShaderStageKind,
    #[serde(default)]
    pub path: PathBuf,
    pub source: String,
}

/// Linked set of shader stages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShaderProgram {
    pub name: String,
    pub stages: Vec<ShaderStage>,
}

impl ShaderProgram {
    /// Source of a stage
    pub fn stage(&self, kind: ShaderStageKind) -> Option<&ShaderStage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Whether this is a compute program
    pub fn is_compute(&self) -> bool {
        self.stage(ShaderStageKind::Compute).is_some()
    }
}

/// Script source
#[derive(Clone, Debug)]
pub struct Script {
    pub name: String,
    pub path: PathBuf,
    pub source: String,
}

// ========== Audio ==========

/// How a clip is meant to be played
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceType {
    #[default]
    Sample,
    Stream,
}

/// Playback settings carried with the clip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub volume: f32,
    pub looping: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looping: false,
        }
    }
}

/// Decoded PCM audio, interleaved, normalized to [-1, 1]
#[derive(Clone, Debug)]
pub struct AudioClip {
    pub source_type: AudioSourceType,
    pub settings: AudioSettings,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioClip {
    /// Length in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygons() {
        for name in POLYGON_NAMES {
            let mesh = Mesh::polygon(name).unwrap();
            assert_eq!(mesh.name, name);
            assert!(mesh.triangle_count() > 0);
            assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        }
        assert_eq!(Mesh::cube().triangle_count(), 12);
        assert!(Mesh::polygon("teapot").is_none());
        assert!(!Mesh::is_polygon_name("teapot"));
    }

    #[test]
    fn test_obj_quad_is_fan_triangulated() {
        let obj = "o square\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = Mesh::from_obj(obj).unwrap();

        assert_eq!(mesh.name, "square");
        assert_eq!(mesh.triangle_count(), 2);
        // Flat normals point along +Z for a counter-clockwise XY square
        assert!(mesh.vertices.iter().all(|v| (v.normal[2] - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_obj_negative_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = Mesh::from_obj(obj).unwrap();
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_obj_errors() {
        assert!(Mesh::from_obj("v 0 0 0\n").is_err());
        assert!(Mesh::from_obj("v 0 zero 0\nf 1 1 1\n").is_err());
        assert!(Mesh::from_obj("v 0 0 0\nf 1 2 3\n").is_err());
    }

    #[test]
    fn test_texture_usage_parse() {
        assert_eq!(TextureUsage::parse(&serde_json::json!("normal")), Some(TextureUsage::Normal));
        assert_eq!(TextureUsage::parse(&serde_json::json!(2)), Some(TextureUsage::Specular));
        assert_eq!(TextureUsage::parse(&serde_json::json!("shiny")), None);
        assert_eq!(TextureUsage::parse(&serde_json::json!(99)), None);
    }

    #[test]
    fn test_animation_duration_and_validation() {
        let clip = AnimationClip {
            name: "walk".to_string(),
            duration: 0.0,
            channels: vec![AnimationChannel {
                target: "hip".to_string(),
                times: vec![0.0, 0.5, 1.25],
                values: vec![[0.0; 4]; 3],
            }],
        };
        assert_eq!(clip.clone().validate().unwrap().duration, 1.25);

        let mut broken = clip;
        broken.channels[0].times = vec![0.0, 1.0, 0.5];
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_material_defaults_from_partial_json() {
        let material: Material =
            serde_json::from_str(r#"{ "name": "gold", "metallic": 1.0 }"#).unwrap();
        assert_eq!(material.name, "gold");
        assert_eq!(material.metallic, 1.0);
        assert_eq!(material.roughness, 1.0);
    }
}
