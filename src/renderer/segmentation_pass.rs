//! Flat label-color raster pass.
//!
//! Draws every scene object whose material lists the renderer's [`PassId`]
//! into one layer of the segmentation target per view. Each object's color
//! comes from a storage buffer indexed by `instance_index`, so one pipeline
//! serves every class and instance.

use encase::{ShaderType, UniformBuffer};
use glam::Mat4;

use crate::error::SegmentationError;
use crate::gpu::dynamic_buffer::TypedBuffer;
use crate::gpu::render_context::{scoped_creation, RenderContext};
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::texture::{RenderTarget, DEPTH_FORMAT, TARGET_FORMAT};
use crate::pipeline::{CommandList, PassKind, ViewState};
use crate::registry::{ColorTable, Rgba8, SemanticTag};
use crate::scene::{PassId, Scene};

/// Per-view camera uniform, matching `segcam::camera::ViewUniform`.
#[derive(ShaderType)]
struct ViewUniform {
    view_proj: Mat4,
}

struct LayerCamera {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Packed color of every object, indexed like [`Scene::objects`].
pub fn pack_object_colors(
    table: &ColorTable,
    objects: impl IntoIterator<Item = (SemanticTag, u32)>,
) -> Vec<u32> {
    objects
        .into_iter()
        .map(|(tag, instance)| table.object_color(tag, instance).pack())
        .collect()
}

/// Raster half of a segmentation camera.
pub struct SegmentationRenderer {
    pass: PassId,
    pipeline: wgpu::RenderPipeline,
    object_layout: wgpu::BindGroupLayout,
    layers: Vec<LayerCamera>,
    object_colors: TypedBuffer<u32>,
    object_bind_group: wgpu::BindGroup,
    /// Color table generation, scene id and scene revision of the uploaded
    /// colors.
    uploaded: Option<(u64, u64, u64)>,
}

impl SegmentationRenderer {
    /// Build the pipeline and per-layer camera uniforms.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::ShaderCompose`] if the raster shader
    /// fails to compose or the device rejects the pipeline.
    pub fn new(
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        pass: PassId,
        view_count: u32,
    ) -> Result<Self, SegmentationError> {
        let shader = composer.compose(device, Shader::Segmentation)?;

        let camera_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Segmentation Camera Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(ViewUniform::min_size()),
                    },
                    count: None,
                }],
            });
        let object_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Segmentation Object Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage {
                            read_only: true,
                        },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Segmentation Pipeline Layout"),
                bind_group_layouts: &[&camera_layout, &object_layout],
                push_constant_ranges: &[],
            });

        let pipeline = scoped_creation(device, "Segmentation Pipeline", || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Segmentation Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: size_of::<[f32; 3]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3
                        ],
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(depth_stencil_state()),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        let layers = (0..view_count)
            .map(|layer| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Segmentation View {layer}")),
                    size: ViewUniform::min_size().get(),
                    usage: wgpu::BufferUsages::UNIFORM
                        | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let bind_group =
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&format!("Segmentation View {layer}")),
                        layout: &camera_layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        }],
                    });
                LayerCamera { buffer, bind_group }
            })
            .collect();

        let object_colors = TypedBuffer::with_capacity(
            device,
            "Segmentation Object Colors",
            64,
            wgpu::BufferUsages::STORAGE,
        );
        let object_bind_group =
            object_bind_group(device, &object_layout, &object_colors);

        Ok(Self {
            pass,
            pipeline,
            object_layout,
            layers,
            object_colors,
            object_bind_group,
            uploaded: None,
        })
    }

    /// Upload view matrices and, when the color table or scene changed,
    /// per-object colors.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidTarget`] if `view` has fewer
    /// layers than the renderer, and [`SegmentationError::UniformEncode`] if
    /// a matrix cannot be encoded.
    pub fn prepare(
        &mut self,
        gpu: &RenderContext,
        scene: &Scene,
        table: &ColorTable,
        view: &ViewState,
    ) -> Result<(), SegmentationError> {
        if view.layer_count() < self.layers.len() {
            return Err(SegmentationError::InvalidTarget(format!(
                "view state has {} layers, target has {}",
                view.layer_count(),
                self.layers.len()
            )));
        }
        for (camera, &view_proj) in self.layers.iter().zip(view.matrices()) {
            let mut uniform = UniformBuffer::new(Vec::<u8>::new());
            uniform
                .write(&ViewUniform { view_proj })
                .map_err(|e| SegmentationError::UniformEncode(e.to_string()))?;
            gpu.queue.write_buffer(&camera.buffer, 0, &uniform.into_inner());
        }

        let key = (table.generation(), scene.id(), scene.revision());
        if self.uploaded != Some(key) {
            let colors = pack_object_colors(
                table,
                scene.objects().iter().map(|o| (o.tag, o.instance_id)),
            );
            if self.object_colors.write(&gpu.device, &gpu.queue, &colors) {
                self.object_bind_group = object_bind_group(
                    &gpu.device,
                    &self.object_layout,
                    &self.object_colors,
                );
            }
            log::trace!(
                "object colors refreshed: {} objects, table generation {}",
                self.object_colors.count(),
                key.0
            );
            self.uploaded = Some(key);
        }
        Ok(())
    }

    /// Record one raster pass per target layer.
    ///
    /// Every layer is cleared to `background` with alpha 0 and depth 1.0.
    pub fn encode(
        &self,
        device: &wgpu::Device,
        list: &mut CommandList,
        target: &RenderTarget,
        scene: &Scene,
        background: Rgba8,
    ) {
        let clear = wgpu::Color {
            r: f64::from(background.with_alpha(0).pack()),
            g: 0.0,
            b: 0.0,
            a: 0.0,
        };

        for (layer, camera) in (0..target.view_count()).zip(&self.layers) {
            let (Some(color_view), Some(depth_view)) =
                (target.layer_view(layer), target.depth_view(layer))
            else {
                continue;
            };
            let encoder = list.record(device, PassKind::Raster { layer });
            let mut pass =
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Segmentation Render Pass"),
                    color_attachments: &[Some(
                        wgpu::RenderPassColorAttachment {
                            view: color_view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(clear),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        },
                    )],
                    depth_stencil_attachment: Some(
                        wgpu::RenderPassDepthStencilAttachment {
                            view: depth_view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(1.0),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        },
                    ),
                    ..Default::default()
                });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &camera.bind_group, &[]);
            pass.set_bind_group(1, &self.object_bind_group, &[]);
            draw_objects(&mut pass, scene, self.pass);
        }
    }
}

fn draw_objects(pass: &mut wgpu::RenderPass<'_>, scene: &Scene, id: PassId) {
    for (index, object) in scene.objects().iter().enumerate() {
        if !object.participates_in(id) {
            continue;
        }
        let index = index as u32;
        pass.set_vertex_buffer(0, object.mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(
            object.mesh.index_buffer.slice(..),
            wgpu::IndexFormat::Uint32,
        );
        pass.draw_indexed(0..object.mesh.index_count, 0, index..index + 1);
    }
}

fn object_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    colors: &TypedBuffer<u32>,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Segmentation Object Colors"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: colors.buffer().as_entire_binding(),
        }],
    })
}

fn depth_stencil_state() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ColorRegistry, ColorService};

    #[test]
    fn objects_take_semantic_or_instance_colors() {
        let mut registry = ColorRegistry::default();
        registry.allocate_instance_color(SemanticTag::Car);
        registry.broadcast_color_table();
        let table = registry.color_table();

        let colors = pack_object_colors(
            table,
            [(SemanticTag::Road, 4), (SemanticTag::Car, 0x0203)],
        );
        assert_eq!(
            Rgba8::unpack(colors[0]),
            table.semantic_color(SemanticTag::Road)
        );
        let car = Rgba8::unpack(colors[1]);
        assert_eq!(Some(car.r), table.instance_block(SemanticTag::Car));
        assert_eq!((car.g, car.b), (2, 3));
    }

    #[test]
    fn view_uniform_is_one_matrix() {
        assert_eq!(ViewUniform::min_size().get(), 64);
    }
}
