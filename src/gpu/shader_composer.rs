use std::borrow::Cow;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor,
    ShaderLanguage, ShaderType,
};

use crate::error::SegmentationError;

/// Every composable shader shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shader {
    /// Flat label-color raster pass.
    Segmentation,
    /// Alpha repair compute kernel library.
    FillAlpha,
}

impl Shader {
    /// All shaders, for validation passes.
    pub const ALL: [Self; 2] = [Self::Segmentation, Self::FillAlpha];

    /// WGSL source text.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::Segmentation => include_str!(
                "../../assets/shaders/raster/segmentation.wgsl"
            ),
            Self::FillAlpha => {
                include_str!("../../assets/shaders/compute/fill_alpha.wgsl")
            }
        }
    }

    /// Path used in composition diagnostics.
    #[must_use]
    pub const fn file_path(self) -> &'static str {
        match self {
            Self::Segmentation => "raster/segmentation.wgsl",
            Self::FillAlpha => "compute/fill_alpha.wgsl",
        }
    }

    /// Debug label for the created shader module.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Segmentation => "Segmentation Shader",
            Self::FillAlpha => "Fill Alpha Shader",
        }
    }
}

/// Shared module definition: (source, file_path)
struct ModuleDef {
    source: &'static str,
    file_path: &'static str,
}

const SHARED_MODULES: &[ModuleDef] = &[
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/packing.wgsl"),
        file_path: "modules/packing.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/camera.wgsl"),
        file_path: "modules/camera.wgsl",
    },
];

/// Wraps `naga_oil::compose::Composer` to provide shader composition with
/// `#import` support.
///
/// Shared WGSL modules are registered at construction time. Consuming
/// shaders use `#import segcam::module_name::item` to pull in shared code.
/// The composer produces `naga::Module` IR directly, skipping WGSL re-parse
/// at runtime.
pub struct ShaderComposer {
    composer: Composer,
}

impl ShaderComposer {
    /// Create a composer with all shared modules registered.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::ShaderCompose`] if a shared module fails
    /// to parse.
    pub fn new() -> Result<Self, SegmentationError> {
        let mut composer = Composer::default();

        // Registered in dependency order.
        for m in SHARED_MODULES {
            let _ = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: m.source,
                    file_path: m.file_path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map_err(|e| {
                    SegmentationError::ShaderCompose(format!(
                        "shared module '{}': {e}",
                        m.file_path
                    ))
                })?;
        }

        Ok(Self { composer })
    }

    /// Compose a shader into a `naga::Module` without creating a wgpu shader
    /// module. Useful for reflection and for validation without a device.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::ShaderCompose`] on parse or import
    /// failures.
    pub fn compose_naga(
        &mut self,
        source: &str,
        file_path: &str,
    ) -> Result<naga::Module, SegmentationError> {
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source,
                file_path,
                shader_type: ShaderType::Wgsl,
                ..Default::default()
            })
            .map_err(|e| {
                SegmentationError::ShaderCompose(format!("'{file_path}': {e}"))
            })
    }

    /// Compose one of the crate's shaders into a `wgpu::ShaderModule`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::ShaderCompose`] on composition failure.
    pub fn compose(
        &mut self,
        device: &wgpu::Device,
        shader: Shader,
    ) -> Result<wgpu::ShaderModule, SegmentationError> {
        let module = self.compose_naga(shader.source(), shader.file_path())?;
        Ok(create_module(device, shader.label(), module))
    }
}

/// Create a wgpu shader module from already-composed naga IR.
pub fn create_module(
    device: &wgpu::Device,
    label: &str,
    module: naga::Module,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
    })
}

#[cfg(test)]
mod tests {
    use naga::valid::{Capabilities, ValidationFlags, Validator};

    use super::*;

    #[test]
    fn all_shaders_compose_and_validate() {
        let mut composer = ShaderComposer::new().unwrap();
        for shader in Shader::ALL {
            let module = composer
                .compose_naga(shader.source(), shader.file_path())
                .unwrap_or_else(|e| {
                    panic!("{} failed to compose: {e}", shader.file_path())
                });
            let _ = Validator::new(ValidationFlags::all(), Capabilities::all())
                .validate(&module)
                .unwrap_or_else(|e| {
                    panic!("{} failed validation: {e:?}", shader.file_path())
                });
        }
    }

    #[test]
    fn unknown_import_is_an_error() {
        let mut composer = ShaderComposer::new().unwrap();
        let source = "#import segcam::nope::thing\n\
                      @compute @workgroup_size(1) fn main() {\n\
                      let x = segcam::nope::thing();\n\
                      }";
        assert!(matches!(
            composer.compose_naga(source, "bad.wgsl"),
            Err(SegmentationError::ShaderCompose(_))
        ));
    }
}
