use std::cell::{Cell, RefCell};

use super::command_list::{CommandListPool, PassKind, PooledCommandList};
use super::CameraId;
use crate::gpu::render_context::RenderContext;
use crate::registry::ColorService;
use crate::scene::Scene;

/// One submitted command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Camera whose hook submitted the list.
    pub camera: CameraId,
    /// Command list label.
    pub label: String,
    /// Passes in execution order.
    pub passes: Vec<PassKind>,
}

/// Everything a render hook may use while rendering one frame.
pub struct FrameContext<'a> {
    /// GPU device and queue.
    pub gpu: &'a RenderContext,
    /// Geometry to draw.
    pub scene: &'a Scene,
    /// Published label colors.
    pub colors: &'a dyn ColorService,
    pool: &'a CommandListPool,
    camera: Cell<CameraId>,
    submissions: RefCell<Vec<Submission>>,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(
        gpu: &'a RenderContext,
        scene: &'a Scene,
        colors: &'a dyn ColorService,
        pool: &'a CommandListPool,
    ) -> Self {
        Self {
            gpu,
            scene,
            colors,
            pool,
            camera: Cell::new(CameraId(0)),
            submissions: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn set_camera(&self, camera: CameraId) {
        self.camera.set(camera);
    }

    /// Borrow a command list from the frame's pool.
    pub fn acquire(&self, label: &str) -> PooledCommandList<'a> {
        self.pool.acquire(label)
    }

    /// Submit a command list. The list returns to its pool afterwards.
    pub fn execute(&self, mut list: PooledCommandList<'_>) {
        let Some(encoder) = list.take_encoder() else {
            log::trace!("command list '{}' recorded nothing", list.label());
            return;
        };
        self.gpu.submit(encoder);
        self.submissions.borrow_mut().push(Submission {
            camera: self.camera.get(),
            label: list.label().to_owned(),
            passes: list.passes().to_vec(),
        });
    }

    pub(crate) fn into_submissions(self) -> Vec<Submission> {
        self.submissions.into_inner()
    }
}
