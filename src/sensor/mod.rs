//! Segmentation camera sensor: one-time setup and readback.
//!
//! [`SegmentationCameraSensor::initialize`] forces lossless output, builds
//! the sensor's private kernel instance and target, registers its instance
//! segmentation tags with the shared color service and installs the
//! per-frame render hook. From then on the host pipeline drives rendering;
//! the sensor handle only reads results back.

mod hook;

use std::sync::Arc;

use glam::{Mat4, Vec3};
use hook::SegmentationHook;

use crate::error::SegmentationError;
use crate::gpu::compute::ComputeLibrary;
use crate::gpu::readback::read_target;
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::ShaderComposer;
use crate::gpu::texture::RenderTarget;
use crate::image::SegmentationImage;
use crate::options::{SensorOptions, LOSSLESS_QUALITY};
use crate::pipeline::{CameraId, HostPipeline, ViewState};
use crate::registry::{ColorService, SemanticTag};
use crate::renderer::{AlphaRepairPass, SegmentationRenderer};
use crate::scene::PassId;

/// Name of the pass scene materials opt into to be segmented.
pub const SEGMENTATION_PASS: &str = "SegmentationPass";

/// Outcome of [`register_instance_tags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagRegistration {
    /// Allocation requests made, one per distinct tag.
    pub allocations: usize,
    /// Another sensor had already configured instance segmentation. The tag
    /// sets were merged and a warning logged.
    pub merged: bool,
}

/// Enable instance segmentation for each distinct tag, then publish.
///
/// A service that already has instance segmentation from another sensor
/// gets a warning; the tag sets are merged.
pub fn register_instance_tags(
    colors: &mut dyn ColorService,
    sensor: &str,
    tags: &[SemanticTag],
) -> TagRegistration {
    if tags.is_empty() {
        return TagRegistration::default();
    }
    let merged = colors.has_instance_segmentation();
    if merged {
        log::warn!(
            "sensor '{sensor}': instance segmentation is already configured \
             by another sensor; tag lists are merged"
        );
    }

    let mut requested = [false; SemanticTag::COUNT];
    let mut allocations = 0;
    for &tag in tags {
        if std::mem::replace(&mut requested[tag.index()], true) {
            continue;
        }
        colors.allocate_instance_color(tag);
        allocations += 1;
    }
    colors.broadcast_color_table();
    TagRegistration {
        allocations,
        merged,
    }
}

/// Positions of `count` views spread along the right axis of a camera at
/// `eye` looking at `target`, `separation` apart and centered on `eye`.
///
/// When `up` is parallel to the viewing direction there is no right axis;
/// all views then share `eye` and a warning is logged.
pub fn spread_eyes(
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    count: u32,
    separation: f32,
) -> Vec<Vec3> {
    let right = (target - eye).cross(up).normalize_or_zero();
    if count > 1 && right == Vec3::ZERO {
        log::warn!(
            "view direction {} is parallel to up {up}; {count} views collapse \
             onto one eye",
            target - eye
        );
    }
    let center = (count.saturating_sub(1)) as f32 / 2.0;
    (0..count)
        .map(|i| eye + right * (i as f32 - center) * separation)
        .collect()
}

fn validate_dimensions(
    options: &SensorOptions,
) -> Result<(), SegmentationError> {
    if options.width == 0 || options.height == 0 || options.view_count == 0 {
        return Err(SegmentationError::InvalidTarget(format!(
            "sensor '{}': {}x{} with {} views",
            options.name, options.width, options.height, options.view_count
        )));
    }
    Ok(())
}

/// Handle of an initialized segmentation camera.
pub struct SegmentationCameraSensor {
    options: SensorOptions,
    camera: CameraId,
    pass: PassId,
    target: Arc<RenderTarget>,
}

impl SegmentationCameraSensor {
    /// Set up a sensor and register its render hook.
    ///
    /// # Errors
    ///
    /// Fails if the dimensions are zero, the alpha fill kernel is missing or
    /// incompatible, the raster shader does not compose, or the camera
    /// already has a hook. Tag conflicts with other sensors only warn.
    pub fn initialize(
        context: &RenderContext,
        options: &SensorOptions,
        colors: &mut dyn ColorService,
        pipeline: &mut HostPipeline,
        composer: &mut ShaderComposer,
        library: &ComputeLibrary,
    ) -> Result<Self, SegmentationError> {
        let mut options = options.clone();
        if options.jpeg_quality != LOSSLESS_QUALITY {
            log::debug!(
                "sensor '{}': output quality {} forced to {LOSSLESS_QUALITY}",
                options.name,
                options.jpeg_quality
            );
            options.jpeg_quality = LOSSLESS_QUALITY;
        }
        validate_dimensions(&options)?;

        let camera = CameraId(options.camera_id);
        if pipeline.has_hook(camera) {
            return Err(SegmentationError::HookAlreadyRegistered(camera));
        }

        let device = &context.device;
        let alpha = AlphaRepairPass::new(device, library)?;
        let pass = PassId::new(SEGMENTATION_PASS);
        let target = Arc::new(RenderTarget::new(
            device,
            options.width,
            options.height,
            options.view_count,
        )?);
        let renderer =
            SegmentationRenderer::new(
                device,
                composer,
                pass,
                options.view_count,
            )?;

        let registration = register_instance_tags(
            colors,
            &options.name,
            &options.instance_segmentation_tags,
        );

        pipeline.register_hook(
            camera,
            Box::new(SegmentationHook {
                label: format!("{} Segmentation", options.name),
                renderer,
                alpha,
                target: Arc::clone(&target),
            }),
        )?;

        log::debug!(
            "sensor '{}' ready: camera {camera}, {}x{}x{}, {} instance tags",
            options.name,
            options.width,
            options.height,
            options.view_count,
            registration.allocations
        );

        Ok(Self {
            options,
            camera,
            pass,
            target,
        })
    }

    /// Effective options (quality already forced to lossless).
    pub fn options(&self) -> &SensorOptions {
        &self.options
    }

    /// Camera the hook renders for.
    pub fn camera(&self) -> CameraId {
        self.camera
    }

    /// Pass identifier scene materials must list to be drawn.
    pub fn pass(&self) -> PassId {
        self.pass
    }

    /// The sensor's render target.
    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Projection shared by all views.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.options.fov_y_degrees.to_radians(),
            self.options.aspect(),
            self.options.near,
            self.options.far,
        )
    }

    /// View state for a camera at `eye` looking at `target`, with views
    /// placed by [`spread_eyes`].
    pub fn view_state(&self, eye: Vec3, target: Vec3, up: Vec3) -> ViewState {
        let eyes = spread_eyes(
            eye,
            target,
            up,
            self.options.view_count,
            self.options.eye_separation,
        );
        ViewState::look_at(&eyes, target, up, self.projection())
    }

    /// Read the current target contents back to the CPU.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::Readback`] if the copy fails.
    pub fn capture(
        &self,
        context: &RenderContext,
    ) -> Result<SegmentationImage, SegmentationError> {
        read_target(context, &self.target)
    }

    /// Remove the sensor's hook from the pipeline. Color assignments stay
    /// for the rest of the session.
    pub fn shutdown(self, pipeline: &mut HostPipeline) {
        if pipeline.unregister_hook(self.camera).is_none() {
            log::warn!(
                "sensor '{}': camera {} had no hook",
                self.options.name,
                self.camera
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rustc_hash::FxHashMap;

    use super::*;
    use crate::gpu::shader_composer::Shader;
    use crate::pipeline::PassKind;
    use crate::registry::{ColorRegistry, ColorTable, Label, Rgba8};
    use crate::scene::{ground_geometry, Scene};

    /// Counts protocol calls while delegating to a real registry.
    #[derive(Default)]
    struct RecordingColors {
        inner: ColorRegistry,
        allocations: Vec<SemanticTag>,
        broadcasts: usize,
        conflict_checks: Cell<usize>,
    }

    impl ColorService for RecordingColors {
        fn has_instance_segmentation(&self) -> bool {
            self.conflict_checks.set(self.conflict_checks.get() + 1);
            self.inner.has_instance_segmentation()
        }

        fn allocate_instance_color(&mut self, tag: SemanticTag) {
            self.allocations.push(tag);
            self.inner.allocate_instance_color(tag);
        }

        fn broadcast_color_table(&mut self) {
            self.broadcasts += 1;
            self.inner.broadcast_color_table();
        }

        fn background(&self) -> Rgba8 {
            self.inner.background()
        }

        fn color_table(&self) -> &ColorTable {
            self.inner.color_table()
        }
    }

    #[test]
    fn duplicate_tags_allocate_once() {
        let mut colors = RecordingColors::default();
        let registration = register_instance_tags(
            &mut colors,
            "front",
            &[SemanticTag::Car, SemanticTag::Car, SemanticTag::Road],
        );
        assert_eq!(registration.allocations, 2);
        assert!(!registration.merged);
        assert_eq!(colors.allocations, [SemanticTag::Car, SemanticTag::Road]);
        assert_eq!(colors.broadcasts, 1);
    }

    #[test]
    fn empty_tag_list_touches_nothing() {
        let mut colors = RecordingColors::default();
        let registration = register_instance_tags(&mut colors, "front", &[]);
        assert_eq!(registration, TagRegistration::default());
        assert!(colors.allocations.is_empty());
        assert_eq!(colors.broadcasts, 0);
        assert_eq!(colors.conflict_checks.get(), 0);
    }

    #[test]
    fn second_sensor_merges_and_keeps_colors() {
        let mut colors = RecordingColors::default();
        let first =
            register_instance_tags(&mut colors, "a", &[SemanticTag::Car]);
        assert!(!first.merged);
        let car = colors.color_table().instance_block(SemanticTag::Car);

        let second = register_instance_tags(
            &mut colors,
            "b",
            &[SemanticTag::Pedestrian, SemanticTag::Car],
        );
        assert!(second.merged);
        assert_eq!(second.allocations, 2);
        assert_eq!(colors.conflict_checks.get(), 2);
        let table = colors.color_table();
        assert_eq!(table.instance_block(SemanticTag::Car), car);
        assert!(table.instance_block(SemanticTag::Pedestrian).is_some());
        assert_eq!(colors.broadcasts, 2);
    }

    #[test]
    fn stereo_eyes_straddle_the_camera() {
        let eyes = spread_eyes(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 2, 0.064);
        assert_eq!(eyes.len(), 2);
        assert!((eyes[0] - Vec3::new(-0.032, 0.0, 0.0)).length() < 1e-6);
        assert!((eyes[1] - Vec3::new(0.032, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn up_along_view_direction_collapses_eyes() {
        let eye = Vec3::new(0.0, 5.0, 0.0);
        let eyes = spread_eyes(eye, Vec3::ZERO, Vec3::Y, 3, 0.064);
        assert_eq!(eyes, [eye; 3]);
    }

    #[test]
    fn zero_sized_sensors_are_rejected() {
        let options = SensorOptions {
            height: 0,
            ..SensorOptions::default()
        };
        assert!(matches!(
            validate_dimensions(&options),
            Err(SegmentationError::InvalidTarget(_))
        ));
    }

    // -- GPU tests (skipped without an adapter) --

    struct Harness {
        gpu: RenderContext,
        composer: ShaderComposer,
        library: ComputeLibrary,
        pipeline: HostPipeline,
        colors: ColorRegistry,
    }

    fn harness() -> Option<Harness> {
        let gpu = pollster::block_on(RenderContext::headless()).ok()?;
        let mut composer = ShaderComposer::new().unwrap();
        let library =
            ComputeLibrary::new(&gpu.device, &mut composer, Shader::FillAlpha)
                .unwrap();
        Some(Harness {
            gpu,
            composer,
            library,
            pipeline: HostPipeline::new(),
            colors: ColorRegistry::default(),
        })
    }

    impl Harness {
        fn sensor(
            &mut self,
            options: &SensorOptions,
        ) -> Result<SegmentationCameraSensor, SegmentationError> {
            SegmentationCameraSensor::initialize(
                &self.gpu,
                options,
                &mut self.colors,
                &mut self.pipeline,
                &mut self.composer,
                &self.library,
            )
        }
    }

    fn stereo_options(tags: Vec<SemanticTag>) -> SensorOptions {
        SensorOptions {
            name: "test".to_owned(),
            width: 20,
            height: 12,
            view_count: 2,
            instance_segmentation_tags: tags,
            ..SensorOptions::default()
        }
    }

    #[test]
    fn quality_is_forced_lossless() {
        let Some(mut h) = harness() else { return };
        let sensor = h.sensor(&stereo_options(Vec::new())).unwrap();
        assert_eq!(sensor.options().jpeg_quality, LOSSLESS_QUALITY);
        let target = sensor.target();
        assert_eq!((target.width(), target.height()), (20, 12));
        assert_eq!(target.view_count(), 2);
    }

    #[test]
    fn empty_scene_is_opaque_background() {
        let Some(mut h) = harness() else { return };
        let sensor = h.sensor(&stereo_options(Vec::new())).unwrap();
        let scene = Scene::new();

        let mut views = FxHashMap::default();
        let _ = views.insert(
            sensor.camera(),
            sensor.view_state(Vec3::new(0.0, 1.5, 5.0), Vec3::ZERO, Vec3::Y),
        );
        let summary =
            h.pipeline.render_frame(&h.gpu, &scene, &h.colors, &views);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.submissions.len(), 1);
        assert_eq!(
            summary.submissions[0].passes,
            [
                PassKind::Raster { layer: 0 },
                PassKind::Raster { layer: 1 },
                PassKind::Compute
            ]
        );

        let image = sensor.capture(&h.gpu).unwrap();
        assert!(image.all_opaque());
        let background = h.colors.background();
        for layer in 0..2 {
            let histogram = image.histogram(layer);
            assert_eq!(histogram.len(), 1);
            assert_eq!(histogram[&background], 20 * 12);
        }
        assert_eq!(h.pipeline.pool().available(), 1);
    }

    #[test]
    fn raster_alone_leaves_alpha_zero() {
        let Some(mut h) = harness() else { return };
        let options = stereo_options(Vec::new());
        let pass = PassId::new(SEGMENTATION_PASS);
        let target = RenderTarget::new(&h.gpu.device, 20, 12, 2).unwrap();
        let mut renderer = SegmentationRenderer::new(
            &h.gpu.device,
            &mut h.composer,
            pass,
            2,
        )
        .unwrap();
        let scene = Scene::new();
        let view = ViewState::new(vec![Mat4::IDENTITY; 2]);
        renderer
            .prepare(&h.gpu, &scene, h.colors.color_table(), &view)
            .unwrap();

        let pool = h.pipeline.pool();
        let mut list = pool.acquire(&options.name);
        renderer.encode(
            &h.gpu.device,
            &mut list,
            &target,
            &scene,
            h.colors.background(),
        );
        h.gpu.submit(list.take_encoder().unwrap());
        drop(list);

        let image = read_target(&h.gpu, &target).unwrap();
        let expected = h.colors.background().with_alpha(0);
        for layer in 0..2 {
            assert!(image
                .layer(layer)
                .unwrap()
                .iter()
                .all(|&t| Rgba8::unpack(t) == expected));
        }
    }

    #[test]
    fn tagged_objects_get_label_colors() {
        let Some(mut h) = harness() else { return };
        let sensor = h.sensor(&stereo_options(vec![SemanticTag::Car])).unwrap();

        let mut scene = Scene::new();
        let passes = [sensor.pass()];
        let (ground, ground_indices) =
            ground_geometry(Vec3::ZERO, 50.0, 50.0);
        let _ = scene.add_mesh(
            &h.gpu.device,
            SemanticTag::Road,
            0,
            &passes,
            &ground,
            &ground_indices,
        );
        let car = scene
            .add_box(
                &h.gpu.device,
                SemanticTag::Car,
                7,
                &passes,
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::splat(1.0),
            )
            .unwrap();
        assert_eq!(scene.object(car).unwrap().instance_id, 7);
        // Not part of the segmentation pass: never drawn.
        let _ = scene.add_box(
            &h.gpu.device,
            SemanticTag::Building,
            0,
            &[PassId::new("Forward")],
            Vec3::new(0.0, 1.0, 3.0),
            Vec3::splat(0.5),
        );

        let mut views = FxHashMap::default();
        let _ = views.insert(
            sensor.camera(),
            sensor.view_state(
                Vec3::new(0.0, 3.0, 8.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::Y,
            ),
        );
        let summary =
            h.pipeline.render_frame(&h.gpu, &scene, &h.colors, &views);
        assert!(summary.failures.is_empty());

        let image = sensor.capture(&h.gpu).unwrap();
        assert!(image.all_opaque());
        let table = h.colors.color_table();
        for layer in 0..2 {
            let center = image.pixel(layer, 10, 6).unwrap();
            assert_eq!(
                table.decode(center),
                Some(Label::Instance {
                    tag: SemanticTag::Car,
                    instance: 7
                })
            );
            let bottom = image.pixel(layer, 10, 11).unwrap();
            assert_eq!(
                table.decode(bottom),
                Some(Label::Semantic(SemanticTag::Road))
            );
            let classes = image.class_histogram(layer, table);
            assert!(!classes.contains_key(&Some(SemanticTag::Building)));
            assert!(classes[&Some(SemanticTag::Car)] > 0);
        }
    }

    #[test]
    fn swapped_scenes_get_their_own_colors() {
        let Some(mut h) = harness() else { return };
        let sensor = h
            .sensor(&SensorOptions {
                view_count: 1,
                ..stereo_options(Vec::new())
            })
            .unwrap();
        let passes = [sensor.pass()];

        let scene_with = |tag| {
            let mut scene = Scene::new();
            let _ = scene.add_box(
                &h.gpu.device,
                tag,
                0,
                &passes,
                Vec3::ZERO,
                Vec3::splat(1.0),
            );
            scene
        };
        let road = scene_with(SemanticTag::Road);
        let car = scene_with(SemanticTag::Car);
        assert_eq!(road.revision(), car.revision());

        let mut views = FxHashMap::default();
        let _ = views.insert(
            sensor.camera(),
            sensor.view_state(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
        );
        let cases = [(&road, SemanticTag::Road), (&car, SemanticTag::Car)];
        for (scene, tag) in cases {
            let summary =
                h.pipeline.render_frame(&h.gpu, scene, &h.colors, &views);
            assert!(summary.failures.is_empty());
            let image = sensor.capture(&h.gpu).unwrap();
            let center = image.pixel(0, 10, 6).unwrap();
            assert_eq!(
                h.colors.color_table().decode(center),
                Some(Label::Semantic(tag))
            );
        }
    }

    #[test]
    fn one_sensor_per_camera() {
        let Some(mut h) = harness() else { return };
        let _first = h.sensor(&stereo_options(Vec::new())).unwrap();
        let err = h.sensor(&stereo_options(Vec::new())).err();
        assert!(matches!(
            err,
            Some(SegmentationError::HookAlreadyRegistered(CameraId(0)))
        ));
    }

    #[test]
    fn two_instance_sensors_both_initialize() {
        let Some(mut h) = harness() else { return };
        let front = h.sensor(&stereo_options(vec![SemanticTag::Car])).unwrap();
        let rear = h
            .sensor(&SensorOptions {
                camera_id: 1,
                view_count: 1,
                ..stereo_options(vec![SemanticTag::Pedestrian])
            })
            .unwrap();
        assert_ne!(front.camera(), rear.camera());
        let table = h.colors.color_table();
        assert!(table.instance_block(SemanticTag::Car).is_some());
        assert!(table.instance_block(SemanticTag::Pedestrian).is_some());

        rear.shutdown(&mut h.pipeline);
        assert!(!h.pipeline.has_hook(CameraId(1)));
    }

    #[test]
    fn missing_kernel_is_fatal() {
        let Some(mut h) = harness() else { return };
        let source = "
@group(0) @binding(0) var out: texture_storage_2d<r32uint, write>;

@compute @workgroup_size(8, 8, 1)
fn other(@builtin(global_invocation_id) id: vec3<u32>) {
    textureStore(out, vec2<i32>(id.xy), vec4<u32>(0u));
}
";
        h.library = ComputeLibrary::from_wgsl(
            &h.gpu.device,
            &mut h.composer,
            "Other",
            source,
            "other.wgsl",
        )
        .unwrap();
        let err = h.sensor(&stereo_options(Vec::new())).err();
        assert!(matches!(err, Some(SegmentationError::KernelNotFound(_))));
        assert!(!h.pipeline.has_hook(CameraId(0)));
    }

    #[test]
    fn kernel_without_layer_count_is_fatal() {
        let Some(mut h) = harness() else { return };
        let source = "
@group(0) @binding(0) var output_xr: texture_storage_2d_array<r32uint, read_write>;
@group(0) @binding(1) var<uniform> tex_size: vec4<f32>;

@compute @workgroup_size(8, 8, 1)
fn fill_alpha_xr(@builtin(global_invocation_id) id: vec3<u32>) {
    if (f32(id.x) < tex_size.x) {
        textureStore(output_xr, vec2<i32>(id.xy), 0, vec4<u32>(0u));
    }
}
";
        h.library = ComputeLibrary::from_wgsl(
            &h.gpu.device,
            &mut h.composer,
            "Flat",
            source,
            "flat.wgsl",
        )
        .unwrap();
        let err = h.sensor(&stereo_options(Vec::new())).err();
        assert!(matches!(
            err,
            Some(SegmentationError::MissingParameter { parameter, .. })
                if parameter == "xr_layers"
        ));
        assert!(!h.pipeline.has_hook(CameraId(0)));
    }

    #[test]
    fn wrong_workgroup_is_fatal() {
        let Some(mut h) = harness() else { return };
        let source = "
@group(0) @binding(0) var output_xr: texture_storage_2d_array<r32uint, read_write>;
@group(0) @binding(1) var<uniform> tex_size: vec4<f32>;

@compute @workgroup_size(16, 16, 1)
fn fill_alpha_xr(@builtin(global_invocation_id) id: vec3<u32>) {
    if (f32(id.x) < tex_size.x) {
        textureStore(output_xr, vec2<i32>(id.xy), 0, vec4<u32>(0u));
    }
}
";
        h.library = ComputeLibrary::from_wgsl(
            &h.gpu.device,
            &mut h.composer,
            "Wide",
            source,
            "wide.wgsl",
        )
        .unwrap();
        let err = h.sensor(&stereo_options(Vec::new())).err();
        assert!(matches!(
            err,
            Some(SegmentationError::KernelWorkgroup {
                found: [16, 16, 1],
                ..
            })
        ));
    }
}
