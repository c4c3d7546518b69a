//! Crate-level error types.

use std::fmt;

use crate::gpu::render_context::RenderContextError;
use crate::pipeline::CameraId;

/// Errors produced by the segcam crate.
#[derive(Debug)]
pub enum SegmentationError {
    /// GPU context initialization failure.
    Gpu(RenderContextError),
    /// WGSL composition or validation failure.
    ShaderCompose(String),
    /// The compute library has no kernel with this entry point name.
    KernelNotFound(String),
    /// A kernel was compiled with a different workgroup size than its
    /// dispatch math assumes.
    KernelWorkgroup {
        /// Kernel entry point name.
        kernel: String,
        /// Workgroup size the caller dispatches with.
        expected: [u32; 3],
        /// Workgroup size declared by the shader.
        found: [u32; 3],
    },
    /// A kernel parameter name does not resolve to a resource binding.
    MissingParameter {
        /// Kernel entry point name.
        kernel: String,
        /// Parameter (global variable) name.
        parameter: String,
    },
    /// A kernel was dispatched before all of its parameters were bound.
    UnboundParameter(String),
    /// Invalid render-target dimensions.
    InvalidTarget(String),
    /// The camera already has a render hook.
    HookAlreadyRegistered(CameraId),
    /// A uniform value could not be laid out for the GPU.
    UniformEncode(String),
    /// GPU → CPU readback failure.
    Readback(String),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
}

impl fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::ShaderCompose(msg) => {
                write!(f, "shader composition error: {msg}")
            }
            Self::KernelNotFound(name) => {
                write!(f, "compute kernel '{name}' not found")
            }
            Self::KernelWorkgroup {
                kernel,
                expected,
                found,
            } => write!(
                f,
                "compute kernel '{kernel}' has workgroup size {found:?}, \
                 expected {expected:?}"
            ),
            Self::MissingParameter { kernel, parameter } => write!(
                f,
                "compute kernel '{kernel}' has no parameter '{parameter}'"
            ),
            Self::UnboundParameter(msg) => {
                write!(f, "unbound kernel parameter: {msg}")
            }
            Self::InvalidTarget(msg) => {
                write!(f, "invalid render target: {msg}")
            }
            Self::HookAlreadyRegistered(camera) => {
                write!(f, "camera {camera} already has a render hook")
            }
            Self::UniformEncode(msg) => {
                write!(f, "uniform encoding error: {msg}")
            }
            Self::Readback(msg) => write!(f, "readback error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
        }
    }
}

impl std::error::Error for SegmentationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderContextError> for SegmentationError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for SegmentationError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
