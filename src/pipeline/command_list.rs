use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// Kind of pass recorded into a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Raster pass into one view layer.
    Raster {
        /// Target array layer.
        layer: u32,
    },
    /// Compute dispatch.
    Compute,
}

/// A reusable recording of GPU passes.
///
/// The encoder is created on the first recorded pass and consumed on
/// submission; the pass log survives until the list returns to its pool.
#[derive(Default)]
pub struct CommandList {
    label: String,
    encoder: Option<wgpu::CommandEncoder>,
    passes: Vec<PassKind>,
}

impl CommandList {
    /// Debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Passes recorded so far, in execution order.
    pub fn passes(&self) -> &[PassKind] {
        &self.passes
    }

    /// Log a pass and return the encoder to record it into.
    pub fn record(
        &mut self,
        device: &wgpu::Device,
        kind: PassKind,
    ) -> &mut wgpu::CommandEncoder {
        self.passes.push(kind);
        let label = &self.label;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(label),
            })
        })
    }

    pub(crate) fn take_encoder(&mut self) -> Option<wgpu::CommandEncoder> {
        self.encoder.take()
    }

    /// Drop recorded work. An unsubmitted encoder is discarded.
    fn clear(&mut self) {
        self.encoder = None;
        self.passes.clear();
        self.label.clear();
    }
}

/// Pool of idle command lists.
///
/// Not `Sync`: hooks run serially on the render thread.
#[derive(Default)]
pub struct CommandListPool {
    idle: RefCell<Vec<CommandList>>,
}

impl CommandListPool {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an idle list (or a new one). The guard returns it on drop.
    pub fn acquire(&self, label: &str) -> PooledCommandList<'_> {
        let mut list = self.idle.borrow_mut().pop().unwrap_or_default();
        list.label.push_str(label);
        PooledCommandList { pool: self, list }
    }

    /// Number of idle lists.
    pub fn available(&self) -> usize {
        self.idle.borrow().len()
    }
}

/// A command list borrowed from a [`CommandListPool`].
///
/// Dropping the guard clears the list and returns it to the pool, on every
/// exit path.
pub struct PooledCommandList<'a> {
    pool: &'a CommandListPool,
    list: CommandList,
}

impl Deref for PooledCommandList<'_> {
    type Target = CommandList;

    fn deref(&self) -> &CommandList {
        &self.list
    }
}

impl DerefMut for PooledCommandList<'_> {
    fn deref_mut(&mut self) -> &mut CommandList {
        &mut self.list
    }
}

impl Drop for PooledCommandList<'_> {
    fn drop(&mut self) {
        let mut list = std::mem::take(&mut self.list);
        list.clear();
        self.pool.idle.borrow_mut().push(list);
    }
}
