use std::fmt;
use std::path::PathBuf;

/// Which part of a shader program a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Program,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "VERTEX",
            ShaderStage::Fragment => "FRAGMENT",
            ShaderStage::Program => "PROGRAM",
        })
    }
}

/// Errors reported by a [`RenderDevice`](crate::RenderDevice) implementation.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("mesh upload failed: {0}")]
    Mesh(String),
    #[error("pipeline creation failed: {0}")]
    Program(String),
    #[error("surface error: {0}")]
    Surface(String),
}

/// Errors from loading, compiling or linking a shader program.
#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to read shader source {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Shader compilation error: {stage}\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("Shader linking error: PROGRAM\n{log}")]
    Link { log: String },
    #[error("Shader linking error: PROGRAM\n{0}")]
    Device(#[from] DeviceError),
    #[error("no shader sources have been loaded yet")]
    NothingToReload,
}

impl ShaderError {
    /// Stage tag for the diagnostic, when the failure is stage-specific.
    pub fn stage(&self) -> Option<ShaderStage> {
        match self {
            ShaderError::Compile { stage, .. } => Some(*stage),
            ShaderError::Link { .. } | ShaderError::Device(_) => Some(ShaderStage::Program),
            ShaderError::Io { .. } | ShaderError::NothingToReload => None,
        }
    }
}
