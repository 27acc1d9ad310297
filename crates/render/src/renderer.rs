use crate::device::RenderDevice;
use crate::mesh::{QUAD_INDICES, quad_vertices};
use crate::shader::Shader;
use glam::{Mat4, Vec3};
use grid_common::Transform;
use grid_input::{InputState, Key};
use std::f32::consts::PI;
use std::path::PathBuf;

/// Cells per side of the board.
pub const GRID_SIZE: u32 = 8;

pub const LIGHT_SQUARE: Vec3 = Vec3::new(0.957_031_25, 0.898_437_5, 0.746_093_75);
pub const DARK_SQUARE: Vec3 = Vec3::new(0.398_437_5, 0.265_625, 0.226_562_5);

/// Vertical field of view in radians.
pub const FIELD_OF_VIEW: f32 = 1.0;
/// Fixed projection aspect; not tied to the surface size.
pub const ASPECT_RATIO: f32 = 1920.0 / 1080.0;
pub const NEAR_PLANE: f32 = 0.005;
pub const FAR_PLANE: f32 = 50.0;

pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

pub const VERTEX_SHADER: &str = "solidcolor.vert.wgsl";
pub const FRAGMENT_SHADER: &str = "solidcolor.frag.wgsl";

/// Pressing this recompiles the shader from disk.
pub const RELOAD_KEY: Key = Key::H;

/// Checkerboard rule: light where `x + z` is even, so (0, 0) is light.
pub fn color_for(x: u32, z: u32) -> Vec3 {
    if (x + z) % 2 == 0 {
        LIGHT_SQUARE
    } else {
        DARK_SQUARE
    }
}

pub fn projection_matrix() -> Mat4 {
    Mat4::perspective_rh(FIELD_OF_VIEW, ASPECT_RATIO, NEAR_PLANE, FAR_PLANE)
}

/// Transform that lays the unit quad flat at cell (x, z), facing +Y.
pub fn cell_transform(x: u32, z: u32) -> Transform {
    Transform {
        position: Vec3::new(x as f32, 0.0, z as f32),
        rotation: Vec3::new(PI * -0.5, 0.0, 0.0),
        ..Transform::default()
    }
}

/// Draws the checkerboard with one shared quad and one shader.
pub struct GridRenderer<D: RenderDevice> {
    shader: Shader<D::Program>,
    quad: Option<D::Mesh>,
    shader_dir: PathBuf,
}

impl<D: RenderDevice> GridRenderer<D> {
    /// `shader_dir` holds [`VERTEX_SHADER`] and [`FRAGMENT_SHADER`].
    pub fn new(shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            shader: Shader::new(),
            quad: None,
            shader_dir: shader_dir.into(),
        }
    }

    /// Load the shared shader. A failure is logged and leaves nothing to draw
    /// with until a reload succeeds.
    pub fn init(&mut self, device: &mut D) {
        self.load_shader(device);
    }

    pub fn shader(&self) -> &Shader<D::Program> {
        &self.shader
    }

    /// Compile the shader from disk again, keeping the old one on failure.
    pub fn load_shader(&mut self, device: &mut D) {
        let vertex = self.shader_dir.join(VERTEX_SHADER);
        let fragment = self.shader_dir.join(FRAGMENT_SHADER);
        if let Err(e) = self.shader.load(device, vertex, fragment) {
            match self.shader.program_id() {
                Some(id) => tracing::warn!("shader load failed, still using {id}: {e}"),
                None => tracing::warn!("shader load failed, nothing to draw with: {e}"),
            }
        }
    }

    /// Draw the shared quad, uploading it on first use.
    pub fn draw_quad(&mut self, device: &mut D) {
        if self.quad.is_none() {
            match device.create_mesh(&quad_vertices(), &QUAD_INDICES) {
                Ok(mesh) => {
                    tracing::debug!("quad mesh uploaded");
                    self.quad = Some(mesh);
                }
                Err(e) => {
                    tracing::error!("{e}");
                    return;
                }
            }
        }
        if let Some(quad) = &self.quad {
            device.draw_indexed(quad, QUAD_INDICES.len() as u32, self.shader.uniform_data());
        }
    }

    /// Record one frame: clear, draw every cell, then handle the reload key.
    pub fn render_frame(&mut self, device: &mut D, view: Mat4, input: &InputState) {
        device.begin_frame(CLEAR_COLOR);

        self.shader.bind(device);
        self.shader.set_mat4("projection", projection_matrix());
        self.shader.set_mat4("view", view);

        for x in 0..GRID_SIZE {
            for z in 0..GRID_SIZE {
                self.shader.set_mat4("model", cell_transform(x, z).to_mat4());
                self.shader.set_vec3("color", color_for(x, z));
                self.draw_quad(device);
            }
        }

        if input.key_pressed(RELOAD_KEY) {
            tracing::info!("reloading shader");
            self.load_shader(device);
        }
    }
}
