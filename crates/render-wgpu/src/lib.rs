//! wgpu render backend for the grid viewer.
//!
//! Implements [`grid_render::RenderDevice`] on top of a wgpu surface.
//!
//! # Invariants
//! - Draws are recorded during the frame and encoded in one render pass at
//!   `end_frame`; every draw keeps its own slice of the uniform buffer.
//! - A pipeline that fails validation is reported, never installed.

mod gpu;

pub use gpu::{GpuInitError, GpuMesh, GpuProgram, WgpuDevice};
