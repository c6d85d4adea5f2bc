//! Integration tests for cadence_asset
//!
//! Loads real files from a temporary asset directory through a process queue

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cadence_asset::*;
use cadence_process::ProcessQueue;
use serde_json::json;
use tempfile::TempDir;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup() -> (TempDir, Arc<ResourceCache>, ProcessQueue) {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResourceCache::new(ResourceCacheConfig::with_asset_dir(
        dir.path(),
    )));
    (dir, cache, ProcessQueue::new())
}

/// Run updates until `handle` stops loading or five seconds pass
fn pump(queue: &mut ProcessQueue, handle: &ResourceHandle) -> LoadState {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        queue.update_processes(1);
        if !handle.is_loading() || Instant::now() > deadline {
            return handle.state();
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn write_png(path: &Path, width: u32, height: u32) {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
    image.save(path).unwrap();
}

#[test]
fn test_missing_file_fails_without_resource() {
    let (_dir, cache, mut queue) = setup();

    let handle = cache.load(&mut queue, ResourceKind::Texture, "missing.png");
    assert_eq!(handle.state(), LoadState::Loading);
    assert_eq!(cache.counters().outstanding(), 1);

    assert_eq!(pump(&mut queue, &handle), LoadState::Failed);
    assert!(handle.resource().is_none());
    assert!(handle.error().unwrap().contains("not found"));
    assert_eq!(cache.counters().failed(), 1);
    assert_eq!(cache.counters().outstanding(), 0);

    let events = cache.drain_events();
    assert!(matches!(events.as_slice(), [ResourceEvent::Failed(id, _)] if *id == handle.id()));
}

#[test]
fn test_texture_loads_from_png() {
    let (dir, cache, mut queue) = setup();
    write_png(&dir.path().join("brick.png"), 4, 2);

    let request = ResourceRequest::new(ResourceKind::Texture, "brick.png")
        .with_description(json!({ "usage": "normal", "mipmaps": false }));
    let handle = cache.load_with(&mut queue, request);

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    let resource = handle.resource().unwrap();
    let texture = resource.as_texture().unwrap();
    assert_eq!((texture.image.width, texture.image.height), (4, 2));
    assert_eq!(texture.image.pixels.len(), 4 * 2 * 4);
    assert_eq!(texture.usage, TextureUsage::Normal);
    assert!(!texture.generate_mipmaps);

    assert_eq!(handle.name(), "brick");
    assert_eq!(handle.generation(), 1);
    assert_eq!(cache.counters().loaded(), 1);
    assert_eq!(cache.drain_events(), vec![ResourceEvent::Loaded(handle.id())]);
}

#[test]
fn test_invalid_texture_usage_falls_back_to_diffuse() {
    let (dir, cache, mut queue) = setup();
    write_png(&dir.path().join("plain.png"), 2, 2);

    let request = ResourceRequest::new(ResourceKind::Texture, "plain.png")
        .with_description(json!({ "usage": 42 }));
    let handle = cache.load_with(&mut queue, request);

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    let resource = handle.resource().unwrap();
    let texture = resource.as_texture().unwrap();
    assert_eq!(texture.usage, TextureUsage::Diffuse);
    assert!(texture.generate_mipmaps);
}

#[test]
fn test_duplicate_loads_are_coalesced() {
    let (dir, cache, mut queue) = setup();
    write_png(&dir.path().join("shared.png"), 2, 2);

    let a = cache.load(&mut queue, ResourceKind::Image, "shared.png");
    let b = cache.load(&mut queue, ResourceKind::Image, "shared.png");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(queue.load_process_count(), 1);
    assert_eq!(cache.counters().outstanding(), 1);

    assert_eq!(pump(&mut queue, &a), LoadState::Loaded);

    // Already loaded: no new process
    let c = cache.load(&mut queue, ResourceKind::Image, "shared.png");
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(queue.load_process_count(), 0);
    assert_eq!(cache.counters().loaded(), 1);
}

#[test]
fn test_failed_load_is_not_retried_until_reload() {
    let (dir, cache, mut queue) = setup();

    let handle = cache.load(&mut queue, ResourceKind::Script, "late.lua");
    assert_eq!(pump(&mut queue, &handle), LoadState::Failed);

    cache.load(&mut queue, ResourceKind::Script, "late.lua");
    assert_eq!(queue.load_process_count(), 0);
    assert_eq!(handle.state(), LoadState::Failed);

    fs::write(dir.path().join("late.lua"), "print('hi')").unwrap();
    assert!(cache.reload(&mut queue, &handle).is_some());
    assert!(cache.reload(&mut queue, &handle).is_none());

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    assert!(handle.error().is_none());
    let resource = handle.resource().unwrap();
    assert_eq!(resource.as_script().unwrap().source, "print('hi')");
    assert_eq!(cache.counters().failed(), 1);
    assert_eq!(cache.counters().loaded(), 1);
}

#[test]
fn test_abort_releases_handle() {
    let (dir, cache, mut queue) = setup();
    write_png(&dir.path().join("abort.png"), 2, 2);

    let handle = cache.create_handle(ResourceKind::Image, "abort.png");
    let process = cache.reload(&mut queue, &handle).unwrap();
    assert!(handle.is_loading());

    assert!(queue.abort_process(process, true));
    assert_eq!(handle.state(), LoadState::NotLoaded);
    assert!(handle.resource().is_none());
    assert_eq!(cache.counters().outstanding(), 0);
    assert_eq!(cache.counters().failed(), 0);
    assert!(cache.drain_events().is_empty());

    // The handle can be loaded again
    cache.load(&mut queue, ResourceKind::Image, "abort.png");
    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
}

#[test]
fn test_dropping_queue_releases_pending_load() {
    let (_dir, cache, mut queue) = setup();
    let handle = cache.load(&mut queue, ResourceKind::Mesh, "cube");
    drop(queue);

    assert_eq!(handle.state(), LoadState::NotLoaded);
    assert_eq!(cache.counters().outstanding(), 0);
}

#[test]
fn test_polygon_mesh_loads() {
    let (_dir, cache, mut queue) = setup();

    let handle = cache.load(&mut queue, ResourceKind::Mesh, "cube");
    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);

    let resource = handle.resource().unwrap();
    let mesh = resource.as_mesh().unwrap();
    assert_eq!(mesh.vertices.len(), 24);
    assert_eq!(mesh.indices.len(), 36);
}

#[test]
fn test_obj_mesh_loads_from_file() {
    let (dir, cache, mut queue) = setup();
    fs::write(
        dir.path().join("tri.obj"),
        "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
    )
    .unwrap();

    let handle = cache.load(&mut queue, ResourceKind::Mesh, "tri.obj");
    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);

    let resource = handle.resource().unwrap();
    let mesh = resource.as_mesh().unwrap();
    assert_eq!(mesh.vertices.len(), 3);
    assert_eq!(mesh.indices, vec![0, 1, 2]);
}

#[test]
fn test_child_resource_raises_no_loaded_event() {
    let (_dir, cache, mut queue) = setup();

    let request = ResourceRequest::new(ResourceKind::Mesh, "quad").as_child();
    let handle = cache.load_with(&mut queue, request);

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    assert!(handle.is_child());
    assert!(cache.drain_events().is_empty());
    assert_eq!(cache.counters().loaded(), 1);
}

#[test]
fn test_model_from_description() {
    let (_dir, cache, mut queue) = setup();

    let request = ResourceRequest::new(ResourceKind::Model, "props/crate")
        .with_description(json!({ "name": "crate", "meshes": ["cube", "plane"] }));
    let handle = cache.load_with(&mut queue, request);

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    let resource = handle.resource().unwrap();
    let model = resource.as_model().unwrap();
    assert_eq!(model.name, "crate");
    assert_eq!(model.meshes.len(), 2);
    assert!(model.user_generated);
}

#[test]
fn test_material_loads_from_json_file() {
    let (dir, cache, mut queue) = setup();
    fs::write(
        dir.path().join("metal.json"),
        r#"{ "metallic": 1.0, "roughness": 0.25 }"#,
    )
    .unwrap();

    let handle = cache.load(&mut queue, ResourceKind::Material, "metal.json");
    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);

    let resource = handle.resource().unwrap();
    let material = resource.as_material().unwrap();
    assert_eq!(material.name, "metal");
    assert_eq!(material.metallic, 1.0);
    assert_eq!(material.roughness, 0.25);
}

#[test]
fn test_audio_loads_from_wav() {
    let (dir, cache, mut queue) = setup();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(dir.path().join("beep.wav"), spec).unwrap();
    for i in 0..800 {
        let sample = if i % 2 == 0 { i16::MAX } else { i16::MIN };
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    let request = ResourceRequest::new(ResourceKind::Audio, "beep.wav").with_description(json!({
        "sourceType": "stream",
        "sourceSettings": { "volume": 0.5, "looping": true }
    }));
    let handle = cache.load_with(&mut queue, request);

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    let resource = handle.resource().unwrap();
    let clip = resource.as_audio().unwrap();
    assert_eq!(clip.sample_rate, 8000);
    assert_eq!(clip.channels, 1);
    assert_eq!(clip.samples.len(), 800);
    assert!((clip.duration_secs() - 0.1).abs() < 1e-4);
    assert!(clip.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    assert_eq!(clip.source_type, AudioSourceType::Stream);
    assert_eq!(clip.settings.volume, 0.5);
    assert!(clip.settings.looping);
}

#[test]
fn test_shader_program_stages_follow_paths() {
    let (dir, cache, mut queue) = setup();
    fs::write(dir.path().join("basic.vert"), "void main() {}").unwrap();
    fs::write(dir.path().join("basic.frag"), "void main() {}").unwrap();

    let request = ResourceRequest::new(ResourceKind::ShaderProgram, "basic.vert")
        .with_name("basic")
        .with_additional_path("basic.frag");
    let handle = cache.load_with(&mut queue, request);

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    let resource = handle.resource().unwrap();
    let program = resource.as_shader_program().unwrap();
    let kinds: Vec<ShaderStageKind> = program.stages.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![ShaderStageKind::Vertex, ShaderStageKind::Fragment]);
    assert!(!program.is_compute());
}

#[test]
fn test_shader_program_missing_stage_fails() {
    let (dir, cache, mut queue) = setup();
    fs::write(dir.path().join("lit.vert"), "void main() {}").unwrap();

    let request = ResourceRequest::new(ResourceKind::ShaderProgram, "lit.vert")
        .with_additional_path("lit.frag");
    let handle = cache.load_with(&mut queue, request);

    assert_eq!(pump(&mut queue, &handle), LoadState::Failed);
    assert!(handle.error().unwrap().contains("lit.frag"));
}

#[test]
fn test_cube_texture_loads_six_faces() {
    let (dir, cache, mut queue) = setup();
    let sky = dir.path().join("sky");
    fs::create_dir(&sky).unwrap();
    for face in CUBE_FACES {
        write_png(&sky.join(format!("{}.png", face)), 2, 2);
    }

    let handle = cache.load(&mut queue, ResourceKind::CubeTexture, "sky");
    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    let resource = handle.resource().unwrap();
    assert_eq!(resource.as_cube_texture().unwrap().size, 2);
}

#[test]
fn test_cube_texture_missing_face_fails() {
    let (dir, cache, mut queue) = setup();
    let sky = dir.path().join("night");
    fs::create_dir(&sky).unwrap();
    for face in &CUBE_FACES[..5] {
        write_png(&sky.join(format!("{}.png", face)), 2, 2);
    }

    let handle = cache.load(&mut queue, ResourceKind::CubeTexture, "night");
    assert_eq!(pump(&mut queue, &handle), LoadState::Failed);
    assert!(handle.error().unwrap().contains("back"));
}

#[test]
fn test_reload_publishes_new_generation() {
    let (dir, cache, mut queue) = setup();
    let path = dir.path().join("hot.lua");
    fs::write(&path, "return 1").unwrap();

    let handle = cache.load(&mut queue, ResourceKind::Script, "hot.lua");
    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    assert_eq!(handle.generation(), 1);

    fs::write(&path, "return 2").unwrap();
    cache.reload(&mut queue, &handle).unwrap();
    assert!(handle.resource().is_none());

    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    assert_eq!(handle.generation(), 2);
    let resource = handle.resource().unwrap();
    assert_eq!(resource.as_script().unwrap().source, "return 2");
    assert_eq!(
        cache.drain_events(),
        vec![ResourceEvent::Loaded(handle.id()), ResourceEvent::Loaded(handle.id())]
    );
}

#[test]
fn test_unload_drops_resource() {
    let (_dir, cache, mut queue) = setup();

    let handle = cache.load(&mut queue, ResourceKind::Mesh, "triangle");
    assert!(!cache.unload(handle.id()));
    assert_eq!(pump(&mut queue, &handle), LoadState::Loaded);
    cache.drain_events();

    assert!(cache.unload(handle.id()));
    assert!(handle.resource().is_none());
    assert!(cache.get(handle.id()).is_none());
    assert_eq!(cache.drain_events(), vec![ResourceEvent::Unloaded(handle.id())]);
}

/// Load `path` and check it settles as a recoverable failure
fn assert_load_fails(
    cache: &Arc<ResourceCache>,
    queue: &mut ProcessQueue,
    kind: ResourceKind,
    path: &str,
) -> String {
    let failed_before = cache.counters().failed();
    let handle = cache.load(queue, kind, path);

    assert_eq!(pump(queue, &handle), LoadState::Failed);
    assert!(handle.resource().is_none());
    assert_eq!(cache.counters().failed(), failed_before + 1);
    assert_eq!(cache.counters().outstanding(), 0);
    handle.error().unwrap()
}

/// 16-bit mono WAV header whose data chunk claims `data_len` bytes
fn wav_header(data_len: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(44);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&36u32.wrapping_add(data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // channels
    bytes.extend_from_slice(&8000u32.to_le_bytes()); // sample rate
    bytes.extend_from_slice(&16000u32.to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes
}

#[test]
fn test_wav_with_oversized_data_chunk_fails() {
    let (dir, cache, mut queue) = setup();
    fs::write(dir.path().join("bad.wav"), wav_header(0xFFFF_FFF0)).unwrap();

    assert_load_fails(&cache, &mut queue, ResourceKind::Audio, "bad.wav");
}

#[test]
fn test_truncated_wav_fails() {
    let (dir, cache, mut queue) = setup();
    let mut bytes = wav_header(1600);
    bytes.extend_from_slice(&[0u8; 100]);
    fs::write(dir.path().join("short.wav"), bytes).unwrap();

    assert_load_fails(&cache, &mut queue, ResourceKind::Audio, "short.wav");
}

#[test]
fn test_corrupt_png_fails() {
    let (dir, cache, mut queue) = setup();
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(b"definitely not chunk data");
    fs::write(dir.path().join("broken.png"), bytes).unwrap();

    assert_load_fails(&cache, &mut queue, ResourceKind::Texture, "broken.png");
    assert_load_fails(&cache, &mut queue, ResourceKind::Image, "broken.png");
}

#[test]
fn test_malformed_gltf_fails() {
    let (dir, cache, mut queue) = setup();
    fs::write(dir.path().join("ship.gltf"), "{ \"asset\": ").unwrap();

    assert_load_fails(&cache, &mut queue, ResourceKind::Model, "ship.gltf");
}

#[test]
fn test_malformed_text_resources_fail() {
    let (dir, cache, mut queue) = setup();
    fs::write(dir.path().join("empty.obj"), "v 0 0 0\n").unwrap();
    fs::write(dir.path().join("bad.json"), "{ \"metallic\": ").unwrap();
    fs::write(dir.path().join("blank.vert"), "   \n").unwrap();

    let error = assert_load_fails(&cache, &mut queue, ResourceKind::Mesh, "empty.obj");
    assert!(error.contains("no faces"));
    assert_load_fails(&cache, &mut queue, ResourceKind::Material, "bad.json");
    assert_load_fails(&cache, &mut queue, ResourceKind::ShaderProgram, "blank.vert");
}
