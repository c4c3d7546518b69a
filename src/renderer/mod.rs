//! GPU passes of a segmentation camera.
//!
//! [`SegmentationRenderer`] rasterizes label colors; [`AlphaRepairPass`]
//! then makes every texel opaque in the same command list.

mod alpha_repair;
mod segmentation_pass;

pub use alpha_repair::{
    group_counts, tex_size, xr_layers, AlphaRepairPass, KERNEL_NAME,
    WORKGROUP_SIZE,
};
pub use segmentation_pass::{pack_object_colors, SegmentationRenderer};
