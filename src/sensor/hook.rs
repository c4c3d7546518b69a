use std::sync::Arc;

use crate::error::SegmentationError;
use crate::gpu::texture::RenderTarget;
use crate::pipeline::{FrameContext, RenderHook, ViewState};
use crate::renderer::{AlphaRepairPass, SegmentationRenderer};

/// Per-frame work of one segmentation camera: raster passes, then alpha
/// repair, in one command list.
pub(super) struct SegmentationHook {
    pub(super) label: String,
    pub(super) renderer: SegmentationRenderer,
    pub(super) alpha: AlphaRepairPass,
    pub(super) target: Arc<RenderTarget>,
}

impl RenderHook for SegmentationHook {
    fn render(
        &mut self,
        frame: &FrameContext<'_>,
        view: &ViewState,
    ) -> Result<(), SegmentationError> {
        let mut list = frame.acquire(&self.label);

        self.renderer.prepare(
            frame.gpu,
            frame.scene,
            frame.colors.color_table(),
            view,
        )?;
        self.renderer.encode(
            &frame.gpu.device,
            &mut list,
            &self.target,
            frame.scene,
            frame.colors.background(),
        );
        self.alpha.encode(frame.gpu, &mut list, &self.target)?;

        frame.execute(list);
        Ok(())
    }
}
