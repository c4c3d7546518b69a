//! Compute pass forcing every texel of a segmentation target opaque.
//!
//! The raster pass writes label RGB only; this pass runs right after it in
//! the same command list and sets alpha to 255 across all view layers, so
//! consumers never see undefined alpha.

use glam::Vec4;

use crate::error::SegmentationError;
use crate::gpu::compute::{
    ComputeLibrary, KernelInstance, ParameterKind, PropertyId,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::texture::RenderTarget;
use crate::pipeline::{CommandList, PassKind};

/// Entry point of the alpha fill kernel.
pub const KERNEL_NAME: &str = "fill_alpha_xr";

/// Workgroup the dispatch math assumes.
pub const WORKGROUP_SIZE: [u32; 3] = [8, 8, 1];

const OUTPUT_PARAMETER: &str = "output_xr";
const SIZE_PARAMETER: &str = "tex_size";
const LAYERS_PARAMETER: &str = "xr_layers";

/// Workgroup counts covering a `width`×`height` view.
#[must_use]
pub const fn group_counts(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(WORKGROUP_SIZE[0]),
        height.div_ceil(WORKGROUP_SIZE[1]),
    )
}

/// `tex_size` parameter: `(width, height, 1 / width, 1 / height)`.
#[must_use]
pub fn tex_size(width: u32, height: u32) -> Vec4 {
    let (w, h) = (width as f32, height as f32);
    Vec4::new(w, h, w.recip(), h.recip())
}

/// `xr_layers` parameter: `(layer count, 0, 0, 0)`.
#[must_use]
pub fn xr_layers(view_count: u32) -> Vec4 {
    Vec4::new(view_count as f32, 0.0, 0.0, 0.0)
}

/// One sensor's alpha repair kernel.
pub struct AlphaRepairPass {
    kernel: KernelInstance,
    output: PropertyId,
    size: PropertyId,
    layers: PropertyId,
}

impl AlphaRepairPass {
    /// Look up and instantiate the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::KernelNotFound`] if the library lacks
    /// the kernel, [`SegmentationError::KernelWorkgroup`] if it was built
    /// for a different tile, and [`SegmentationError::MissingParameter`] if
    /// it does not take `output_xr`, `tex_size` and `xr_layers`.
    pub fn new(
        device: &wgpu::Device,
        library: &ComputeLibrary,
    ) -> Result<Self, SegmentationError> {
        let index = library.find_kernel(KERNEL_NAME)?;
        let info = library
            .kernel(index)
            .ok_or_else(|| {
                SegmentationError::KernelNotFound(KERNEL_NAME.to_owned())
            })?;

        if info.workgroup_size != WORKGROUP_SIZE {
            return Err(SegmentationError::KernelWorkgroup {
                kernel: KERNEL_NAME.to_owned(),
                expected: WORKGROUP_SIZE,
                found: info.workgroup_size,
            });
        }

        let output = PropertyId::new(OUTPUT_PARAMETER);
        let size = PropertyId::new(SIZE_PARAMETER);
        let layers = PropertyId::new(LAYERS_PARAMETER);
        for (id, name, accepts) in [
            (output, OUTPUT_PARAMETER, ParameterKind::StorageTexture),
            (size, SIZE_PARAMETER, ParameterKind::Uniform(16)),
            (layers, LAYERS_PARAMETER, ParameterKind::Uniform(16)),
        ] {
            if info.parameter(id).map(|p| p.kind) != Some(accepts) {
                return Err(SegmentationError::MissingParameter {
                    kernel: KERNEL_NAME.to_owned(),
                    parameter: name.to_owned(),
                });
            }
        }

        Ok(Self {
            kernel: library.instantiate(device, index)?,
            output,
            size,
            layers,
        })
    }

    /// Record the repair dispatch for `target` into `list`.
    ///
    /// # Errors
    ///
    /// Propagates parameter binding failures of the kernel.
    pub fn encode(
        &mut self,
        gpu: &RenderContext,
        list: &mut CommandList,
        target: &RenderTarget,
    ) -> Result<(), SegmentationError> {
        let (width, height) = (target.width(), target.height());
        self.kernel
            .set_vector(&gpu.queue, self.size, tex_size(width, height))?;
        self.kernel.set_vector(
            &gpu.queue,
            self.layers,
            xr_layers(target.view_count()),
        )?;
        let bind_group = self
            .kernel
            .bind()
            .texture(self.output, target.storage_view())?
            .bind_group(&gpu.device)?;

        let (groups_x, groups_y) = group_counts(width, height);
        log::trace!("alpha repair dispatch {groups_x}x{groups_y}");
        let encoder = list.record(&gpu.device, PassKind::Compute);
        self.kernel.dispatch(encoder, &bind_group, [groups_x, groups_y, 1]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_hd_needs_240_by_135_groups() {
        assert_eq!(group_counts(1920, 1080), (240, 135));
    }

    #[test]
    fn partial_tiles_round_up() {
        assert_eq!(group_counts(1, 1), (1, 1));
        assert_eq!(group_counts(9, 17), (2, 3));
        assert_eq!(group_counts(8, 8), (1, 1));
    }

    #[test]
    fn tex_size_carries_reciprocals() {
        assert_eq!(tex_size(4, 2), Vec4::new(4.0, 2.0, 0.25, 0.5));
    }

    #[test]
    fn layer_count_is_passed_as_a_vector() {
        assert_eq!(xr_layers(2), Vec4::new(2.0, 0.0, 0.0, 0.0));
    }
}
