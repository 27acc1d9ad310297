//! Rendering Adapter: shader resource, quad mesh and the checkerboard frame.
//!
//! # Invariants
//! - The renderer never mutates game or input state.
//! - A shader that fails to compile or link never replaces a working one.
//! - The quad mesh is uploaded once and shared by every cell.
//!
//! GPU access goes through the [`RenderDevice`] trait. [`RecordingDevice`]
//! implements it without a GPU so the frame logic can be inspected and tested.

mod device;
mod error;
mod mesh;
mod program;
mod renderer;
mod shader;

pub use device::{
    RecordedDraw, RecordedFrame, RecordedMesh, RecordedProgram, RecordingDevice, RenderDevice,
};
pub use error::{DeviceError, ShaderError, ShaderStage};
pub use mesh::{QUAD_INDICES, Vertex, quad_vertices};
pub use program::{
    CompiledStage, LinkedProgram, UniformBlock, UniformKind, UniformLocation, compile, link,
};
pub use renderer::{
    ASPECT_RATIO, CLEAR_COLOR, DARK_SQUARE, FAR_PLANE, FIELD_OF_VIEW, FRAGMENT_SHADER, GRID_SIZE,
    GridRenderer, LIGHT_SQUARE, NEAR_PLANE, RELOAD_KEY, VERTEX_SHADER, cell_transform, color_for,
    projection_matrix,
};
pub use shader::{ProgramId, Shader};
