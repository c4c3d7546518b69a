//! Compute kernel libraries with name-based lookup and parameter binding.
//!
//! A [`ComputeLibrary`] is one composed WGSL module that may hold several
//! compute entry points ("kernels"). Kernel names, workgroup sizes and the
//! global variables each kernel uses are reflected from the naga IR, so
//! callers bind parameters by name ([`PropertyId`]) instead of hard-coding
//! binding slots. Every sensor instantiates its own [`KernelInstance`] so no
//! mutable compute state is shared between sensors.

use std::hash::{Hash, Hasher};

use glam::Vec4;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use rustc_hash::{FxHashMap, FxHasher};

use crate::error::SegmentationError;
use crate::gpu::render_context::scoped_creation;
use crate::gpu::shader_composer::{create_module, Shader, ShaderComposer};

/// Identifier of a kernel parameter, derived from its WGSL global name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyId(u64);

impl PropertyId {
    /// Hash a parameter name into an identifier.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// What a kernel parameter binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// A storage texture (`texture_storage_*`).
    StorageTexture,
    /// A uniform value of the given byte size.
    Uniform(u32),
}

/// A reflected kernel parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// WGSL global variable name.
    pub name: String,
    /// Binding slot in bind group 0.
    pub binding: u32,
    /// Resource kind.
    pub kind: ParameterKind,
}

/// A reflected compute entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInfo {
    /// Entry point name.
    pub name: String,
    /// Declared `@workgroup_size`.
    pub workgroup_size: [u32; 3],
    /// Group-0 parameters used by this entry point.
    pub parameters: Vec<Parameter>,
}

impl KernelInfo {
    /// Look up a parameter by identifier.
    #[must_use]
    pub fn parameter(&self, id: PropertyId) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| PropertyId::new(&p.name) == id)
    }
}

/// Index of a kernel inside its library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelIndex(usize);

/// Reflect every compute entry point of a module.
///
/// # Errors
///
/// Returns [`SegmentationError::ShaderCompose`] if the module fails naga
/// validation.
pub fn reflect_kernels(
    module: &naga::Module,
) -> Result<Vec<KernelInfo>, SegmentationError> {
    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(module)
        .map_err(|e| SegmentationError::ShaderCompose(format!("{e:?}")))?;

    let kernels = module
        .entry_points
        .iter()
        .enumerate()
        .filter(|(_, ep)| ep.stage == naga::ShaderStage::Compute)
        .map(|(index, ep)| {
            let usage = info.get_entry_point(index);
            let parameters = module
                .global_variables
                .iter()
                .filter(|&(handle, _)| !usage[handle].is_empty())
                .filter_map(|(_, var)| reflect_parameter(module, var))
                .collect();
            KernelInfo {
                name: ep.name.clone(),
                workgroup_size: ep.workgroup_size,
                parameters,
            }
        })
        .collect();

    Ok(kernels)
}

fn reflect_parameter(
    module: &naga::Module,
    var: &naga::GlobalVariable,
) -> Option<Parameter> {
    let binding = var.binding.as_ref().filter(|b| b.group == 0)?;
    let name = var.name.clone()?;
    let inner = &module.types[var.ty].inner;
    let kind = match (var.space, inner) {
        (
            naga::AddressSpace::Handle,
            naga::TypeInner::Image {
                class: naga::ImageClass::Storage { .. },
                ..
            },
        ) => ParameterKind::StorageTexture,
        (naga::AddressSpace::Uniform, _) => {
            ParameterKind::Uniform(inner.size(module.to_ctx()))
        }
        _ => return None,
    };
    Some(Parameter {
        name,
        binding: binding.binding,
        kind,
    })
}

/// A compiled compute shader plus the reflection of its kernels.
pub struct ComputeLibrary {
    label: String,
    module: wgpu::ShaderModule,
    kernels: Vec<KernelInfo>,
}

impl ComputeLibrary {
    /// Compile one of the crate's compute shaders.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::ShaderCompose`] on composition or
    /// validation failure.
    pub fn new(
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        shader: Shader,
    ) -> Result<Self, SegmentationError> {
        Self::from_wgsl(
            device,
            composer,
            shader.label(),
            shader.source(),
            shader.file_path(),
        )
    }

    /// Compile an arbitrary WGSL source (which may use shared imports).
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::ShaderCompose`] on composition or
    /// validation failure.
    pub fn from_wgsl(
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        label: &str,
        source: &str,
        file_path: &str,
    ) -> Result<Self, SegmentationError> {
        let naga_module = composer.compose_naga(source, file_path)?;
        let kernels = reflect_kernels(&naga_module)?;
        log::debug!(
            "compute library '{label}': kernels {:?}",
            kernels.iter().map(|k| k.name.as_str()).collect::<Vec<_>>()
        );
        let module = create_module(device, label, naga_module);
        Ok(Self {
            label: label.to_owned(),
            module,
            kernels,
        })
    }

    /// Find a kernel by entry point name.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::KernelNotFound`] if no compute entry point
    /// has this name.
    pub fn find_kernel(
        &self,
        name: &str,
    ) -> Result<KernelIndex, SegmentationError> {
        self.kernels
            .iter()
            .position(|k| k.name == name)
            .map(KernelIndex)
            .ok_or_else(|| SegmentationError::KernelNotFound(name.to_owned()))
    }

    /// Reflection data of a kernel.
    #[must_use]
    pub fn kernel(&self, index: KernelIndex) -> Option<&KernelInfo> {
        self.kernels.get(index.0)
    }

    /// Create a private pipeline and parameter storage for one kernel.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::KernelNotFound`] if the index does not
    /// belong to this library and [`SegmentationError::ShaderCompose`] if
    /// the device rejects the pipeline.
    pub fn instantiate(
        &self,
        device: &wgpu::Device,
        index: KernelIndex,
    ) -> Result<KernelInstance, SegmentationError> {
        let info = self.kernel(index).cloned().ok_or_else(|| {
            SegmentationError::KernelNotFound(format!(
                "#{} in '{}'",
                index.0, self.label
            ))
        })?;

        let label = format!("{} Pipeline", info.name);
        let pipeline = scoped_creation(device, &label, || {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: None,
                module: &self.module,
                entry_point: Some(&info.name),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;
        let layout = pipeline.get_bind_group_layout(0);

        let uniforms = info
            .parameters
            .iter()
            .filter_map(|p| match p.kind {
                ParameterKind::Uniform(size) => Some((
                    p.binding,
                    UniformSlot {
                        buffer: device.create_buffer(&wgpu::BufferDescriptor {
                            label: Some(&format!("{} {}", info.name, p.name)),
                            size: u64::from(size),
                            usage: wgpu::BufferUsages::UNIFORM
                                | wgpu::BufferUsages::COPY_DST,
                            mapped_at_creation: false,
                        }),
                        written: false,
                    },
                )),
                ParameterKind::StorageTexture => None,
            })
            .collect();

        Ok(KernelInstance {
            info,
            pipeline,
            layout,
            uniforms,
        })
    }
}

struct UniformSlot {
    buffer: wgpu::Buffer,
    written: bool,
}

/// One sensor's private instance of a compute kernel.
pub struct KernelInstance {
    info: KernelInfo,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    uniforms: FxHashMap<u32, UniformSlot>,
}

impl KernelInstance {
    /// Write a 4-component vector parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::MissingParameter`] if the kernel has no
    /// 16-byte uniform parameter with this identifier.
    pub fn set_vector(
        &mut self,
        queue: &wgpu::Queue,
        id: PropertyId,
        value: Vec4,
    ) -> Result<(), SegmentationError> {
        let binding = match self.info.parameter(id) {
            Some(p) if p.kind == ParameterKind::Uniform(16) => p.binding,
            _ => return Err(self.missing(id)),
        };
        let slot = self
            .uniforms
            .get_mut(&binding)
            .ok_or_else(|| missing_parameter(&self.info, id))?;
        queue.write_buffer(
            &slot.buffer,
            0,
            bytemuck::bytes_of(&value.to_array()),
        );
        slot.written = true;
        Ok(())
    }

    /// Start binding texture parameters for a dispatch.
    pub fn bind(&self) -> KernelBindings<'_> {
        KernelBindings {
            kernel: self,
            textures: Vec::new(),
        }
    }

    /// Record a dispatch of `groups` workgroups.
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        groups: [u32; 3],
    ) {
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&self.info.name),
                timestamp_writes: None,
            });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
    }

    fn missing(&self, id: PropertyId) -> SegmentationError {
        missing_parameter(&self.info, id)
    }
}

fn missing_parameter(info: &KernelInfo, id: PropertyId) -> SegmentationError {
    SegmentationError::MissingParameter {
        kernel: info.name.clone(),
        parameter: format!("{id:?}"),
    }
}

/// Texture bindings collected for one dispatch.
pub struct KernelBindings<'a> {
    kernel: &'a KernelInstance,
    textures: Vec<(u32, &'a wgpu::TextureView)>,
}

impl<'a> KernelBindings<'a> {
    /// Bind a storage texture parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::MissingParameter`] if the kernel has no
    /// storage texture parameter with this identifier.
    pub fn texture(
        mut self,
        id: PropertyId,
        view: &'a wgpu::TextureView,
    ) -> Result<Self, SegmentationError> {
        match self.kernel.info.parameter(id) {
            Some(p) if p.kind == ParameterKind::StorageTexture => {
                self.textures.retain(|(binding, _)| *binding != p.binding);
                self.textures.push((p.binding, view));
                Ok(self)
            }
            _ => Err(self.kernel.missing(id)),
        }
    }

    /// Build the bind group for the dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::UnboundParameter`] if any parameter the
    /// kernel uses has not been bound or written.
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
    ) -> Result<wgpu::BindGroup, SegmentationError> {
        let kernel = self.kernel;
        let entries = kernel
            .info
            .parameters
            .iter()
            .map(|p| {
                let resource = match p.kind {
                    ParameterKind::StorageTexture => self
                        .textures
                        .iter()
                        .find(|(binding, _)| *binding == p.binding)
                        .map(|(_, view)| {
                            wgpu::BindingResource::TextureView(view)
                        }),
                    ParameterKind::Uniform(_) => kernel
                        .uniforms
                        .get(&p.binding)
                        .filter(|slot| slot.written)
                        .map(|slot| slot.buffer.as_entire_binding()),
                };
                resource
                    .map(|resource| wgpu::BindGroupEntry {
                        binding: p.binding,
                        resource,
                    })
                    .ok_or_else(|| {
                        SegmentationError::UnboundParameter(format!(
                            "{}.{}",
                            kernel.info.name, p.name
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", kernel.info.name)),
            layout: &kernel.layout,
            entries: &entries,
        }))
    }
}
