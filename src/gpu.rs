//! Offscreen wgpu rendering of the scene into an OpenCV canvas.

use crate::config::SceneConfig;
use crate::error::Error;
use crate::geometry::HeadPosition;
use crate::renderer::{scene_mesh, view_projection, Scene, SceneRendering, Vertex, WindowDimensions};
use crate::Result;
use log::{debug, info};
use opencv::core::{Scalar, CV_8UC4};
use opencv::imgproc;
use opencv::prelude::*;
use wgpu::util::DeviceExt;

const MAX_LIGHTS: usize = 4;
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x3];

#[repr(C)]
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuLight {
    position: [f32; 4],
    diffuse: [f32; 4],
}

/// Packed params matching the WGSL uniform layout (240 bytes).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuSceneParams {
    view_projection: [[f32; 4]; 4],
    ambient: [f32; 4],
    eye: [f32; 4],
    light_count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
    lights: [GpuLight; MAX_LIGHTS],
}

impl GpuSceneParams {
    fn new(scene: &Scene, eye: &HeadPosition, window: WindowDimensions, config: &SceneConfig) -> Self {
        let mut lights = [GpuLight::default(); MAX_LIGHTS];
        let light_count = scene.lights.len().min(MAX_LIGHTS);
        for (slot, light) in lights.iter_mut().zip(&scene.lights) {
            let [r, g, b] = light.diffuse().to_array();
            *slot = GpuLight {
                position: light.position(),
                diffuse: [r, g, b, 1.0],
            };
        }
        let [r, g, b] = scene.ambient.to_array();

        Self {
            view_projection: view_projection(eye, window, config).cast::<f32>().into(),
            ambient: [r, g, b, 1.0],
            eye: [eye.x as f32, eye.y as f32, eye.z as f32, 1.0],
            light_count: light_count as u32,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
            lights,
        }
    }
}

/// Color and depth attachments plus the staging buffer for one window size.
struct RenderTarget {
    size: WindowDimensions,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, size: WindowDimensions) -> Self {
        let extent = wgpu::Extent3d {
            width: size.width as u32,
            height: size.height as u32,
            depth_or_array_layers: 1,
        };
        let texture = |label: &str, format: wgpu::TextureFormat, usage: wgpu::TextureUsages| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let color = texture(
            "scene-color",
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let depth = texture(
            "scene-depth",
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );

        // rows of a texture copy must be aligned to 256 bytes
        let padded_bytes_per_row = (extent.width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene-readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(extent.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            size,
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            readback,
            padded_bytes_per_row,
        }
    }
}

/// Renders the scene with a depth buffer on the GPU and reads the result
/// back into a BGR `Mat`.
pub struct GpuSceneRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lit_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    params_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    target: Option<RenderTarget>,
    scene: Scene,
    config: SceneConfig,
}

impl GpuSceneRenderer {
    /// Fails with [`Error::Gpu`] if no suitable adapter is available.
    pub fn new(scene: Scene, config: SceneConfig) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| Error::Gpu("no suitable graphics adapter".to_owned()))?;
        info!("Rendering on {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("scene-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|err| Error::Gpu(err.to_string()))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene-bind-group-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, topology: wgpu::PrimitiveTopology, fragment_entry: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    // the cubes are open, both sides are visible
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        };
        let lit_pipeline = pipeline("scene-lit", wgpu::PrimitiveTopology::TriangleList, "fs_lit");
        let line_pipeline = pipeline("scene-lines", wgpu::PrimitiveTopology::LineList, "fs_flat");

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene-params"),
            size: std::mem::size_of::<GpuSceneParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene-bind-group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        Ok(Self {
            device,
            queue,
            lit_pipeline,
            line_pipeline,
            params_buffer,
            bind_group,
            target: None,
            scene,
            config,
        })
    }

    /// Renderer for [`Scene::virtual_window`].
    pub fn virtual_window(config: &SceneConfig) -> Result<Self> {
        Self::new(Scene::virtual_window(config.axes_length), config.clone())
    }

    fn ensure_target(&mut self, size: WindowDimensions) {
        if self.target.as_ref().is_some_and(|target| target.size == size) {
            return;
        }
        debug!("allocating {}x{} render target", size.width, size.height);
        self.target = Some(RenderTarget::new(&self.device, size));
    }

    fn vertex_buffer(&self, label: &str, vertices: &[Vertex]) -> Option<wgpu::Buffer> {
        if vertices.is_empty() {
            return None;
        }
        Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }))
    }
}

impl SceneRendering for GpuSceneRenderer {
    fn render(&mut self, eye: &HeadPosition, window: WindowDimensions, wireframe: bool) -> Result<Mat> {
        let size = WindowDimensions::new(window.width.max(1), window.height.max(1));
        let mesh = scene_mesh(&self.scene, window, self.config.screen_divisor, wireframe);
        let params = GpuSceneParams::new(&self.scene, eye, size, &self.config);
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let triangles = self.vertex_buffer("scene-triangles", &mesh.triangles);
        let lines = self.vertex_buffer("scene-lines", &mesh.lines);
        self.ensure_target(size);
        let Some(target) = self.target.as_ref() else {
            return Err(Error::Gpu("render target missing".to_owned()));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &self.bind_group, &[]);
            if let Some(buffer) = &triangles {
                pass.set_pipeline(&self.lit_pipeline);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(0..mesh.triangles.len() as u32, 0..1);
            }
            if let Some(buffer) = &lines {
                pass.set_pipeline(&self.line_pipeline);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(0..mesh.lines.len() as u32, 0..1);
            }
        }

        let extent = wgpu::Extent3d {
            width: size.width as u32,
            height: size.height as u32,
            depth_or_array_layers: 1,
        };
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &target.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_bytes_per_row),
                    rows_per_image: Some(extent.height),
                },
            },
            extent,
        );
        self.queue.submit(Some(encoder.finish()));

        read_back(&self.device, target)
    }
}

/// Copies the rendered BGRA rows out of the staging buffer into a BGR canvas.
fn read_back(device: &wgpu::Device, target: &RenderTarget) -> Result<Mat> {
    let slice = target.readback.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| Error::Gpu("readback callback dropped".to_owned()))?
        .map_err(|err| Error::Gpu(err.to_string()))?;

    let size = target.size;
    let mut bgra = Mat::new_rows_cols_with_default(size.height, size.width, CV_8UC4, Scalar::all(0.0))?;
    {
        let mapped = slice.get_mapped_range();
        let row_bytes = size.width as usize * 4;
        let padded = target.padded_bytes_per_row as usize;
        for (row, pixels) in bgra.data_bytes_mut()?.chunks_exact_mut(row_bytes).enumerate() {
            let start = row * padded;
            pixels.copy_from_slice(&mapped[start..start + row_bytes]);
        }
    }
    target.readback.unmap();

    let mut canvas = Mat::default();
    imgproc::cvt_color_def(&bgra, &mut canvas, imgproc::COLOR_BGRA2BGR)?;
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use opencv::core::{Size, Vec3b};

    fn try_renderer() -> Option<GpuSceneRenderer> {
        GpuSceneRenderer::virtual_window(&SceneConfig::default()).ok()
    }

    fn pixel(canvas: &Mat, row: i32, col: i32) -> Vec3b {
        *canvas.at_2d::<Vec3b>(row, col).unwrap()
    }

    fn eye() -> HeadPosition {
        Point3::new(0.0, 0.0, 60.0)
    }

    #[test]
    fn params_match_shader_layout() {
        assert_eq!(std::mem::size_of::<GpuSceneParams>(), 240);
        assert_eq!(std::mem::size_of::<Vertex>(), 36);
    }

    #[test]
    fn params_carry_scene_lights() {
        let scene = Scene::virtual_window(10.0);
        let window = WindowDimensions::new(640, 480);
        let params = GpuSceneParams::new(&scene, &eye(), window, &SceneConfig::default());
        assert_eq!(params.light_count, 2);
        assert_eq!(params.lights[0].position, [4.0, 0.0, 8.0, 1.0]);
        assert_eq!(params.lights[1].position[3], 0.0);
        assert_eq!(params.lights[2].diffuse, [0.0; 4]);
        assert_eq!(params.eye, [0.0, 0.0, 60.0, 1.0]);
    }

    #[test]
    fn filled_scene_shows_lit_yellow_cube() {
        let mut renderer = match try_renderer() {
            Some(r) => r,
            None => return, // skip if no GPU
        };
        let canvas = renderer.render(&eye(), WindowDimensions::new(640, 480), false).unwrap();
        assert_eq!(canvas.size().unwrap(), Size::new(640, 480));
        let center = pixel(&canvas, 240, 320);
        // BGR
        assert_eq!(center[0], 0);
        assert!(center[1] > 0);
        assert!(center[2] >= center[1]);
    }

    #[test]
    fn nearer_cube_hides_the_one_behind() {
        if try_renderer().is_none() {
            return; // skip if no GPU
        }
        // draw the far cube last so only the depth test keeps the near one visible
        let mut scene = Scene::virtual_window(10.0);
        scene.cubes.reverse();
        let mut renderer = GpuSceneRenderer::new(scene, SceneConfig::default()).unwrap();
        let canvas = renderer.render(&eye(), WindowDimensions::new(640, 480), false).unwrap();
        // the small cyan cube at (5, 0, 10) sits in front of the yellow one
        let covered = pixel(&canvas, 240, 362);
        assert_eq!(covered[2], 0);
        assert!(covered[0] > 0);
    }

    #[test]
    fn screen_outline_is_drawn_in_red() {
        let mut renderer = match try_renderer() {
            Some(r) => r,
            None => return, // skip if no GPU
        };
        let canvas = renderer.render(&eye(), WindowDimensions::new(640, 480), false).unwrap();
        // top edge at y = 12 projects to row ~157
        let red = Vec3b::from_array([0, 0, 255]);
        assert!((150..165).any(|row| pixel(&canvas, row, 320) == red));
    }

    #[test]
    fn wireframe_adds_axes() {
        let mut renderer = match try_renderer() {
            Some(r) => r,
            None => return, // skip if no GPU
        };
        let window = WindowDimensions::new(640, 480);
        let filled = renderer.render(&eye(), window, false).unwrap();
        let wireframe = renderer.render(&eye(), window, true).unwrap();
        // the y axis runs up the middle above the yellow cube
        let green = Vec3b::from_array([0, 255, 0]);
        assert!((318..=321).all(|col| pixel(&filled, 180, col) != green));
        assert!((318..=321).any(|col| pixel(&wireframe, 180, col) == green));
    }

    #[test]
    fn canvas_follows_window_resize() {
        let mut renderer = match try_renderer() {
            Some(r) => r,
            None => return, // skip if no GPU
        };
        let large = renderer.render(&eye(), WindowDimensions::new(640, 480), false).unwrap();
        let small = renderer.render(&eye(), WindowDimensions::new(333, 200), false).unwrap();
        assert_eq!(large.size().unwrap(), Size::new(640, 480));
        // width not a multiple of the copy alignment
        assert_eq!(small.size().unwrap(), Size::new(333, 200));
    }
}
