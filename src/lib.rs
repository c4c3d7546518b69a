//! GPU segmentation camera sensor for driving simulation, built on wgpu.
//!
//! A segmentation camera replaces the normal shading of a virtual camera with
//! flat per-class (and optionally per-instance) label colors, then repairs the
//! alpha channel of its possibly multi-view target with a compute pass.
//!
//! # Key entry points
//!
//! - [`sensor::SegmentationCameraSensor`] - one-time setup and readback
//! - [`registry::ColorRegistry`] - process-wide tag → color assignments
//! - [`pipeline::HostPipeline`] - per-camera render hooks and command lists
//! - [`options::Options`] - TOML sensor and palette configuration
//!
//! # Frame structure
//!
//! Each frame the host pipeline invokes every registered hook. The
//! segmentation hook records one raster pass per view layer followed by the
//! alpha repair dispatch into a single pooled command list, then submits it.
//! Record order is execution order, so the repair pass always observes the
//! finished raster output.

pub mod error;
pub mod gpu;
pub mod image;
pub mod options;
pub mod pipeline;
pub mod registry;
pub mod renderer;
pub mod scene;
pub mod sensor;
