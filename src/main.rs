//! Headless demo: renders a small street scene with a stereo and a mono
//! segmentation camera and logs per-class pixel counts.

use std::path::Path;

use glam::Vec3;
use rustc_hash::FxHashMap;
use segcam::error::SegmentationError;
use segcam::gpu::compute::ComputeLibrary;
use segcam::gpu::render_context::RenderContext;
use segcam::gpu::shader_composer::{Shader, ShaderComposer};
use segcam::options::{Options, SensorOptions};
use segcam::pipeline::HostPipeline;
use segcam::registry::{ColorRegistry, ColorService, SemanticTag};
use segcam::scene::{ground_geometry, PassId, Scene};
use segcam::sensor::SegmentationCameraSensor;

const FRAMES: u32 = 3;

fn build_street(device: &wgpu::Device, pass: PassId) -> Scene {
    let passes = [pass];
    let mut scene = Scene::new();

    let (road, road_indices) = ground_geometry(Vec3::ZERO, 4.0, 60.0);
    let _ = scene.add_mesh(
        device,
        SemanticTag::Road,
        0,
        &passes,
        &road,
        &road_indices,
    );
    for (i, x) in [-6.0_f32, 6.0].into_iter().enumerate() {
        let (walk, walk_indices) =
            ground_geometry(Vec3::new(x, 0.15, 0.0), 2.0, 60.0);
        let _ = scene.add_mesh(
            device,
            SemanticTag::Sidewalk,
            i as u32,
            &passes,
            &walk,
            &walk_indices,
        );
        let _ = scene.add_box(
            device,
            SemanticTag::Building,
            i as u32,
            &passes,
            Vec3::new(x * 2.0, 6.0, -20.0),
            Vec3::new(4.0, 6.0, 15.0),
        );
    }

    let cars = [(-2.0, -8.0), (2.0, -14.0), (-2.0, -22.0)];
    for (id, (x, z)) in cars.into_iter().enumerate() {
        let _ = scene.add_box(
            device,
            SemanticTag::Car,
            id as u32,
            &passes,
            Vec3::new(x, 0.75, z),
            Vec3::new(0.9, 0.75, 2.2),
        );
    }
    for (id, z) in [-6.0_f32, -11.0].into_iter().enumerate() {
        let _ = scene.add_box(
            device,
            SemanticTag::Pedestrian,
            id as u32,
            &passes,
            Vec3::new(5.5, 0.9, z),
            Vec3::new(0.25, 0.9, 0.25),
        );
    }
    let _ = scene.add_box(
        device,
        SemanticTag::TrafficLight,
        0,
        &passes,
        Vec3::new(4.5, 4.0, -16.0),
        Vec3::new(0.2, 0.6, 0.2),
    );
    let _ = scene.add_box(
        device,
        SemanticTag::Vegetation,
        0,
        &passes,
        Vec3::new(-5.5, 2.0, -30.0),
        Vec3::splat(1.5),
    );
    scene
}

fn run(options: &Options) -> Result<(), SegmentationError> {
    let gpu = pollster::block_on(RenderContext::headless())?;
    let mut composer = ShaderComposer::new()?;
    let library =
        ComputeLibrary::new(&gpu.device, &mut composer, Shader::FillAlpha)?;
    let mut colors = ColorRegistry::new(&options.colors);
    let mut pipeline = HostPipeline::new();

    let front = SegmentationCameraSensor::initialize(
        &gpu,
        &options.sensor,
        &mut colors,
        &mut pipeline,
        &mut composer,
        &library,
    )?;
    let rear_options = SensorOptions {
        name: format!("{}_mono", options.sensor.name),
        camera_id: options.sensor.camera_id + 1,
        view_count: 1,
        instance_segmentation_tags: vec![SemanticTag::Pedestrian],
        ..options.sensor.clone()
    };
    let mono = SegmentationCameraSensor::initialize(
        &gpu,
        &rear_options,
        &mut colors,
        &mut pipeline,
        &mut composer,
        &library,
    )?;

    let scene = build_street(&gpu.device, front.pass());

    for frame in 0..FRAMES {
        let drive = frame as f32 * 1.5;
        let mut views = FxHashMap::default();
        let _ = views.insert(
            front.camera(),
            front.view_state(
                Vec3::new(0.0, 1.6, 10.0 - drive),
                Vec3::new(0.0, 1.2, -20.0),
                Vec3::Y,
            ),
        );
        let _ = views.insert(
            mono.camera(),
            mono.view_state(
                Vec3::new(2.0, 8.0, 12.0 - drive),
                Vec3::new(0.0, 0.0, -12.0),
                Vec3::Y,
            ),
        );
        let summary = pipeline.render_frame(&gpu, &scene, &colors, &views);
        log::info!(
            "frame {}: {} submissions, {} failures",
            summary.frame,
            summary.submissions.len(),
            summary.failures.len()
        );
    }

    let table = colors.color_table();
    if let Ok(legend) = serde_json::to_string(&table.legend()) {
        log::debug!("legend: {legend}");
    }
    for sensor in [&front, &mono] {
        let image = sensor.capture(&gpu)?;
        log::info!(
            "{}: {}x{}x{}, opaque: {}",
            sensor.options().name,
            image.width(),
            image.height(),
            image.view_count(),
            image.all_opaque()
        );
        for layer in 0..image.view_count() {
            let mut classes: Vec<_> =
                image.class_histogram(layer, table).into_iter().collect();
            classes.sort_by(|a, b| b.1.cmp(&a.1));
            for (class, pixels) in classes {
                let name = class.map_or("background", SemanticTag::name);
                log::info!("  view {layer} {name:>12}: {pixels}");
            }
        }
    }

    mono.shutdown(&mut pipeline);
    Ok(())
}

fn main() {
    env_logger::init();

    let options = match std::env::args().nth(1) {
        Some(path) => match Options::load(Path::new(&path)) {
            Ok(options) => options,
            Err(e) => {
                log::error!("{path}: {e}");
                std::process::exit(1);
            }
        },
        None => Options::default(),
    };

    if let Err(e) = run(&options) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
