use crate::error::DeviceError;
use crate::mesh::Vertex;
use crate::program::LinkedProgram;

/// Renderer-agnostic GPU interface. All backends implement this trait.
///
/// A frame is `begin_frame`, any number of `bind_program`/`draw_indexed`
/// calls, then `end_frame`, which presents. Each draw carries the full
/// uniform block as it stood when the draw was issued.
pub trait RenderDevice {
    /// Uploaded geometry.
    type Mesh;
    /// A pipeline built from a linked program.
    type Program;

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32])
    -> Result<Self::Mesh, DeviceError>;

    fn create_program(&mut self, program: &LinkedProgram) -> Result<Self::Program, DeviceError>;

    /// Start a frame that clears color to `clear_color` and depth to 1.0.
    fn begin_frame(&mut self, clear_color: [f32; 4]);

    /// Use `program` for subsequent draws.
    fn bind_program(&mut self, program: &Self::Program);

    /// Draw `index_count` indices of `mesh` with the bound program.
    /// Ignored when no program is bound.
    fn draw_indexed(&mut self, mesh: &Self::Mesh, index_count: u32, uniforms: &[u8]);

    /// Submit the frame and present it.
    fn end_frame(&mut self) -> Result<(), DeviceError>;
}

/// Handle to a mesh created by [`RecordingDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedMesh {
    pub id: usize,
    pub vertex_count: usize,
    pub index_count: usize,
}

/// Handle to a program created by [`RecordingDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedProgram {
    pub id: usize,
    pub uniform_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: usize,
    pub mesh: usize,
    pub index_count: u32,
    pub uniforms: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub clear_color: [f32; 4],
    pub draws: Vec<RecordedDraw>,
}

/// Headless device that records what the renderer asks for.
///
/// Useful for tests, logging, and checking the render interface without a
/// GPU. Set `reject_programs` to make pipeline creation fail.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub reject_programs: bool,
    meshes: Vec<RecordedMesh>,
    programs: Vec<RecordedProgram>,
    bound: Option<RecordedProgram>,
    current: Option<RecordedFrame>,
    frames: Vec<RecordedFrame>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meshes_created(&self) -> usize {
        self.meshes.len()
    }

    pub fn programs_created(&self) -> usize {
        self.programs.len()
    }

    /// Frames completed with `end_frame`, oldest first.
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.frames.last()
    }
}

impl RenderDevice for RecordingDevice {
    type Mesh = RecordedMesh;
    type Program = RecordedProgram;

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<RecordedMesh, DeviceError> {
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(DeviceError::Mesh(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }
        let mesh = RecordedMesh {
            id: self.meshes.len(),
            vertex_count: vertices.len(),
            index_count: indices.len(),
        };
        self.meshes.push(mesh);
        Ok(mesh)
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<RecordedProgram, DeviceError> {
        if self.reject_programs {
            return Err(DeviceError::Program("rejected by recording device".into()));
        }
        let recorded = RecordedProgram {
            id: self.programs.len(),
            uniform_size: program.uniforms.size,
        };
        self.programs.push(recorded);
        Ok(recorded)
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) {
        self.current = Some(RecordedFrame {
            clear_color,
            draws: Vec::new(),
        });
    }

    fn bind_program(&mut self, program: &RecordedProgram) {
        self.bound = Some(*program);
    }

    fn draw_indexed(&mut self, mesh: &RecordedMesh, index_count: u32, uniforms: &[u8]) {
        let (Some(program), Some(frame)) = (self.bound, self.current.as_mut()) else {
            tracing::trace!("draw skipped: no program bound or no frame open");
            return;
        };
        frame.draws.push(RecordedDraw {
            program: program.id,
            mesh: mesh.id,
            index_count,
            uniforms: uniforms.to_vec(),
        });
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        let frame = self
            .current
            .take()
            .ok_or_else(|| DeviceError::Surface("end_frame without begin_frame".into()))?;
        self.frames.push(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{QUAD_INDICES, quad_vertices};

    #[test]
    fn draws_without_a_program_are_dropped() {
        let mut device = RecordingDevice::new();
        let mesh = device.create_mesh(&quad_vertices(), &QUAD_INDICES).unwrap();
        device.begin_frame([0.0; 4]);
        device.draw_indexed(&mesh, 6, &[]);
        device.end_frame().unwrap();
        assert!(device.last_frame().unwrap().draws.is_empty());
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut device = RecordingDevice::new();
        let err = device.create_mesh(&quad_vertices(), &[0, 1, 4]).unwrap_err();
        assert!(matches!(err, DeviceError::Mesh(_)));
        assert_eq!(device.meshes_created(), 0);
    }

    #[test]
    fn end_frame_requires_begin_frame() {
        let mut device = RecordingDevice::new();
        assert!(device.end_frame().is_err());
    }
}
