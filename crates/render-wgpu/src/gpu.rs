use grid_render::{DeviceError, LinkedProgram, RenderDevice, Vertex};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Uniform slots reserved up front; one per grid cell.
const INITIAL_UNIFORM_SLOTS: u64 = 64;
/// Smallest binding size handed to a pipeline, even one without uniforms.
const MIN_UNIFORM_BINDING: u64 = 16;

/// Errors while bringing up the GPU.
#[derive(Debug, thiserror::Error)]
pub enum GpuInitError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("surface is unusable: {0}")]
    Unsupported(&'static str),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Vertex and index buffers for one uploaded mesh.
pub struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
}

/// A render pipeline plus the size of the uniform block it reads.
pub struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_size: u64,
}

struct DrawCall {
    program: Arc<GpuProgram>,
    mesh: Arc<GpuMesh>,
    index_count: u32,
    uniform_offset: u32,
}

struct FrameRecording {
    clear: wgpu::Color,
    draws: Vec<DrawCall>,
    uniforms: Vec<u8>,
}

impl FrameRecording {
    fn new(clear: wgpu::Color) -> Self {
        Self {
            clear,
            draws: Vec::new(),
            uniforms: Vec::new(),
        }
    }

    /// Copy `uniforms` into a fresh zero-padded slot of `slot` bytes and
    /// return the slot's offset.
    fn push(&mut self, uniforms: &[u8], slot: u64) -> u32 {
        let offset = self.uniforms.len();
        self.uniforms.extend_from_slice(uniforms);
        self.uniforms.resize(offset + slot as usize, 0);
        offset as u32
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Bytes one draw occupies in the uniform buffer.
fn slot_size(binding_size: u64, uniforms_len: usize, alignment: u64) -> u64 {
    align_up(binding_size.max(uniforms_len as u64), alignment)
}

/// Pick the swapchain format and alpha mode. Colors are written as given,
/// so a linear format wins over sRGB.
fn surface_settings(
    formats: &[wgpu::TextureFormat],
    alpha_modes: &[wgpu::CompositeAlphaMode],
) -> Result<(wgpu::TextureFormat, wgpu::CompositeAlphaMode), GpuInitError> {
    let format = formats
        .iter()
        .find(|f| !f.is_srgb())
        .or(formats.first())
        .copied()
        .ok_or(GpuInitError::Unsupported("no surface formats"))?;
    let alpha_mode = alpha_modes
        .first()
        .copied()
        .ok_or(GpuInitError::Unsupported("no alpha modes"))?;
    Ok((format, alpha_mode))
}

fn clear_color(rgba: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: rgba[0] as f64,
        g: rgba[1] as f64,
        b: rgba[2] as f64,
        a: rgba[3] as f64,
    }
}

/// wgpu-backed [`RenderDevice`].
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_texture: wgpu::TextureView,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_capacity: u64,
    uniform_alignment: u64,
    /// Bind groups over `uniform_buffer`, keyed by binding size.
    bind_groups: HashMap<u64, wgpu::BindGroup>,
    bound: Option<Arc<GpuProgram>>,
    frame: Option<FrameRecording>,
}

impl WgpuDevice {
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(target)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(GpuInitError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("grid_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let (surface_format, alpha_mode) =
            surface_settings(&surface_caps.formats, &surface_caps.alpha_modes)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_capacity = INITIAL_UNIFORM_SLOTS * uniform_alignment;
        let uniform_buffer = Self::create_uniform_buffer(&device, uniform_capacity);
        let depth_texture = Self::create_depth_texture(&device, config.width, config.height);

        tracing::info!(
            "GPU initialized with {} backend, surface format {surface_format:?}",
            adapter.get_info().backend.to_str()
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_texture,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer,
            uniform_capacity,
            uniform_alignment,
            bind_groups: HashMap::new(),
            bound: None,
            frame: None,
        })
    }

    /// Reconfigure the surface and depth buffer for a new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_texture =
            Self::create_depth_texture(&self.device, self.config.width, self.config.height);
        tracing::debug!("surface resized to {}x{}", self.config.width, self.config.height);
    }

    fn ensure_uniform_capacity(&mut self, needed: u64) {
        if needed <= self.uniform_capacity {
            return;
        }
        self.uniform_capacity = needed.next_power_of_two();
        self.uniform_buffer = Self::create_uniform_buffer(&self.device, self.uniform_capacity);
        self.bind_groups.clear();
        tracing::debug!("uniform buffer grown to {} bytes", self.uniform_capacity);
    }

    fn prepare_bind_group(&mut self, binding_size: u64) {
        if self.bind_groups.contains_key(&binding_size) {
            return;
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.uniform_buffer,
                    offset: 0,
                    size: NonZeroU64::new(binding_size),
                }),
            }],
        });
        self.bind_groups.insert(binding_size, bind_group);
    }

    fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_buffer"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }
}

impl RenderDevice for WgpuDevice {
    type Mesh = Arc<GpuMesh>;
    type Program = Arc<GpuProgram>;

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<Arc<GpuMesh>, DeviceError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(DeviceError::Mesh("empty vertex or index data".into()));
        }
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_vertex_buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_index_buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(Arc::new(GpuMesh {
            vertex_buffer,
            index_buffer,
        }))
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<Arc<GpuProgram>, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("vertex_shader"),
            source: wgpu::ShaderSource::Wgsl(program.vertex_source.as_str().into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fragment_shader"),
            source: wgpu::ShaderSource::Wgsl(program.fragment_source.as_str().into()),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("solid_color_pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(program.vertex_entry.as_str()),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x3,
                        1 => Float32x3,
                        2 => Float32x2,
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(program.fragment_entry.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Program(err.to_string()));
        }

        Ok(Arc::new(GpuProgram {
            pipeline,
            uniform_size: (program.uniforms.size as u64).max(MIN_UNIFORM_BINDING),
        }))
    }

    fn begin_frame(&mut self, clear_color_rgba: [f32; 4]) {
        if self.frame.is_some() {
            tracing::warn!("begin_frame called twice; discarding unsubmitted draws");
        }
        self.frame = Some(FrameRecording::new(clear_color(clear_color_rgba)));
    }

    fn bind_program(&mut self, program: &Arc<GpuProgram>) {
        self.bound = Some(Arc::clone(program));
    }

    fn draw_indexed(&mut self, mesh: &Arc<GpuMesh>, index_count: u32, uniforms: &[u8]) {
        let Some(program) = self.bound.clone() else {
            tracing::trace!("draw skipped: no program bound");
            return;
        };
        let slot = slot_size(program.uniform_size, uniforms.len(), self.uniform_alignment);
        let Some(frame) = self.frame.as_mut() else {
            tracing::trace!("draw skipped: no frame open");
            return;
        };
        let uniform_offset = frame.push(uniforms, slot);
        frame.draws.push(DrawCall {
            program,
            mesh: Arc::clone(mesh),
            index_count,
            uniform_offset,
        });
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| DeviceError::Surface("end_frame without begin_frame".into()))?;

        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(e) => return Err(DeviceError::Surface(e.to_string())),
        };

        self.ensure_uniform_capacity(frame.uniforms.len() as u64);
        if !frame.uniforms.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &frame.uniforms);
        }
        for draw in &frame.draws {
            self.prepare_bind_group(draw.program.uniform_size);
        }

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("grid_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("grid_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for draw in &frame.draws {
                let Some(bind_group) = self.bind_groups.get(&draw.program.uniform_size) else {
                    continue;
                };
                pass.set_pipeline(&draw.program.pipeline);
                pass.set_bind_group(0, bind_group, &[draw.uniform_offset]);
                pass.set_vertex_buffer(0, draw.mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(draw.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(208, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(0, 256), 0);
    }

    #[test]
    fn each_draw_gets_its_own_aligned_slot() {
        let alignment = 256;
        let binding = 208;
        let mut frame = FrameRecording::new(clear_color([0.0; 4]));
        let draws: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i + 1; binding as usize]).collect();

        let offsets: Vec<u32> = draws
            .iter()
            .map(|bytes| frame.push(bytes, slot_size(binding, bytes.len(), alignment)))
            .collect();

        assert_eq!(offsets, vec![0, 256, 512, 768, 1024]);
        for (bytes, &offset) in draws.iter().zip(&offsets) {
            assert_eq!(offset as u64 % alignment, 0);
            let start = offset as usize;
            assert_eq!(&frame.uniforms[start..start + bytes.len()], &bytes[..]);
        }
        let last = *offsets.last().unwrap() as u64;
        assert!(frame.uniforms.len() as u64 >= last + binding);
    }

    #[test]
    fn short_uniforms_are_zero_padded_to_the_binding() {
        let mut frame = FrameRecording::new(clear_color([0.0; 4]));
        let slot = slot_size(MIN_UNIFORM_BINDING, 0, 256);
        assert_eq!(slot, 256);
        let first = frame.push(&[], slot);
        let second = frame.push(&[7; 4], slot);
        assert_eq!((first, second), (0, 256));
        assert_eq!(&frame.uniforms[256..260], &[7; 4]);
        assert!(frame.uniforms[..256].iter().all(|&b| b == 0));
        assert_eq!(frame.uniforms.len(), 512);
    }

    #[test]
    fn surface_settings_prefer_linear_format() {
        let (format, alpha) = surface_settings(
            &[wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Bgra8Unorm],
            &[wgpu::CompositeAlphaMode::Opaque],
        )
        .unwrap();
        assert_eq!(format, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(alpha, wgpu::CompositeAlphaMode::Opaque);

        let (format, _) = surface_settings(
            &[wgpu::TextureFormat::Rgba8UnormSrgb],
            &[wgpu::CompositeAlphaMode::Auto],
        )
        .unwrap();
        assert_eq!(format, wgpu::TextureFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn empty_surface_capabilities_are_an_error() {
        let err = surface_settings(&[], &[wgpu::CompositeAlphaMode::Opaque]).unwrap_err();
        assert!(matches!(err, GpuInitError::Unsupported(_)));
        let err = surface_settings(&[wgpu::TextureFormat::Bgra8Unorm], &[]).unwrap_err();
        assert!(matches!(err, GpuInitError::Unsupported(_)));
    }

    #[test]
    fn clear_color_converts_channels() {
        let c = clear_color([0.0, 0.25, 0.5, 1.0]);
        assert_eq!((c.r, c.g, c.b, c.a), (0.0, 0.25, 0.5, 1.0));
    }

    #[test]
    fn vertex_stride_matches_attributes() {
        let attrs = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
        let last = attrs[2];
        assert_eq!(
            last.offset + last.format.size(),
            std::mem::size_of::<Vertex>() as u64
        );
    }
}
