//! GPU resource management.
//!
//! Headless device creation, shader composition, compute kernels with
//! reflected parameters, segmentation targets and their readback.

/// Compute libraries, kernel lookup by name and parameter binding.
pub mod compute;
/// Growable GPU buffers with automatic reallocation.
pub mod dynamic_buffer;
/// Blocking target readback.
pub mod readback;
/// wgpu device and queue initialization.
pub mod render_context;
/// WGSL shader composition with `#import` support via naga-oil.
pub mod shader_composer;
/// Layered segmentation render targets.
pub mod texture;
