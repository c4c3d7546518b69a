//! Host render pipeline: per-camera render hooks and pooled command lists.
//!
//! The pipeline owns one hook per camera. [`HostPipeline::render_frame`]
//! invokes every hook serially with a [`FrameContext`] and collects the
//! submissions they made.

mod command_list;
mod frame;

use std::fmt;

pub use command_list::{
    CommandList, CommandListPool, PassKind, PooledCommandList,
};
pub use frame::{FrameContext, Submission};
use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::error::SegmentationError;
use crate::gpu::render_context::RenderContext;
use crate::registry::ColorService;
use crate::scene::Scene;

/// Identifier of a camera in the host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-frame camera state: one view-projection matrix per view layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    view_proj: Vec<Mat4>,
}

impl ViewState {
    /// View state from explicit matrices, one per layer.
    #[must_use]
    pub fn new(view_proj: Vec<Mat4>) -> Self {
        Self { view_proj }
    }

    /// Views looking at `target` from each eye position, sharing one
    /// projection.
    #[must_use]
    pub fn look_at(
        eyes: &[Vec3],
        target: Vec3,
        up: Vec3,
        projection: Mat4,
    ) -> Self {
        Self::new(
            eyes.iter()
                .map(|&eye| projection * Mat4::look_at_rh(eye, target, up))
                .collect(),
        )
    }

    /// Number of view layers described.
    pub fn layer_count(&self) -> usize {
        self.view_proj.len()
    }

    /// All view-projections, in layer order.
    pub fn matrices(&self) -> &[Mat4] {
        &self.view_proj
    }

    /// View-projection of one layer.
    pub fn view_proj(&self, layer: u32) -> Option<&Mat4> {
        self.view_proj.get(layer as usize)
    }
}

/// Per-frame callback owned by the host pipeline for one camera.
pub trait RenderHook {
    /// Record and submit this camera's work for the frame.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the frame could not be recorded;
    /// the pipeline logs it and continues with the next camera.
    fn render(
        &mut self,
        frame: &FrameContext<'_>,
        view: &ViewState,
    ) -> Result<(), SegmentationError>;
}

/// Result of one [`HostPipeline::render_frame`] call.
#[derive(Debug, Default)]
pub struct FrameSummary {
    /// Frame counter, starting at 1.
    pub frame: u64,
    /// Submissions in order.
    pub submissions: Vec<Submission>,
    /// Hooks that failed this frame.
    pub failures: Vec<(CameraId, SegmentationError)>,
}

/// Registry of render hooks plus the command list pool they share.
#[derive(Default)]
pub struct HostPipeline {
    hooks: Vec<(CameraId, Box<dyn RenderHook>)>,
    pool: CommandListPool,
    frame: u64,
}

impl HostPipeline {
    /// Pipeline without hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default rendering of `camera` with `hook`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::HookAlreadyRegistered`] if the camera
    /// already has a hook.
    pub fn register_hook(
        &mut self,
        camera: CameraId,
        hook: Box<dyn RenderHook>,
    ) -> Result<(), SegmentationError> {
        if self.has_hook(camera) {
            return Err(SegmentationError::HookAlreadyRegistered(camera));
        }
        log::debug!("render hook registered for camera {camera}");
        self.hooks.push((camera, hook));
        Ok(())
    }

    /// Remove and return the hook of `camera`.
    pub fn unregister_hook(
        &mut self,
        camera: CameraId,
    ) -> Option<Box<dyn RenderHook>> {
        let index = self.hooks.iter().position(|(id, _)| *id == camera)?;
        Some(self.hooks.remove(index).1)
    }

    /// True if `camera` has a hook.
    pub fn has_hook(&self, camera: CameraId) -> bool {
        self.hooks.iter().any(|(id, _)| *id == camera)
    }

    /// Command list pool shared by all hooks.
    pub fn pool(&self) -> &CommandListPool {
        &self.pool
    }

    /// Invoke every hook whose camera has a view this frame.
    pub fn render_frame(
        &mut self,
        gpu: &RenderContext,
        scene: &Scene,
        colors: &dyn ColorService,
        views: &FxHashMap<CameraId, ViewState>,
    ) -> FrameSummary {
        self.frame += 1;
        let frame = FrameContext::new(gpu, scene, colors, &self.pool);
        let mut failures = Vec::new();

        for (camera, hook) in &mut self.hooks {
            let Some(view) = views.get(camera) else {
                log::trace!("camera {camera} has no view this frame");
                continue;
            };
            frame.set_camera(*camera);
            if let Err(e) = hook.render(&frame, view) {
                log::error!("camera {camera} frame {}: {e}", self.frame);
                failures.push((*camera, e));
            }
        }

        FrameSummary {
            frame: self.frame,
            submissions: frame.into_submissions(),
            failures,
        }
    }
}
