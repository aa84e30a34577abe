use wgpu::util::DeviceExt;

use crate::enums::ScalarType;
use crate::renderer::{Camera, RendererConfig, RendererError, VolumeRenderer};
use crate::scene::{Bounds, SceneVolume};

pub struct WGPU {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniforms {
    position: [f32; 4],
    focal_point: [f32; 4],
    bounds_min: [f32; 4],
    bounds_max: [f32; 4],
}

/// Resources of one uploaded volume: the voxel grid as a 3D texture and the
/// transfer functions baked into a 1D lookup texture.
pub struct GpuVolume {
    id: u64,
    volume_texture: wgpu::Texture,
    lut_texture: wgpu::Texture,
    _bind_group: wgpu::BindGroup,
    bounds: Bounds,
}

impl GpuVolume {
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn destroy(self) {
        self.volume_texture.destroy();
        self.lut_texture.destroy();
    }
}

/// Renderer on a wgpu device with an offscreen color target.
///
/// Uploaded volumes are bound to their textures and the camera uniforms;
/// no ray-casting pipeline draws them. `render` refreshes the uniforms and
/// clears the target to the background color.
pub struct WgpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RendererConfig,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    camera_buffer: wgpu::Buffer,
    camera: Camera,
    bounds: Option<Bounds>,
    next_id: u64,
    frames: u64,
    released: bool,
}

impl WgpuRenderer {
    pub fn new(wgpu: WGPU, config: RendererConfig) -> Self {
        let WGPU { device, queue } = wgpu;
        let [width, height] = config.viewport;

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume Render Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        // Nearest filtering: R16Sint and R32Float are not filterable
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: bytemuck::bytes_of(&<CameraUniforms as bytemuck::Zeroable>::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        log::info!("render surface acquired ({width}x{height})");

        Self {
            device,
            queue,
            config,
            target,
            target_view,
            sampler,
            camera_buffer,
            camera: Camera::default(),
            bounds: None,
            next_id: 0,
            frames: 0,
            released: false,
        }
    }

    /// Create a renderer on the default adapter without a window.
    pub async fn headless(config: RendererConfig) -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RendererError::Adapter(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("nifti-volume device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await
            .map_err(|e| RendererError::Device(e.to_string()))?;

        Ok(Self::new(WGPU { device, queue }, config))
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn texture_format(scalar_type: ScalarType) -> (wgpu::TextureFormat, wgpu::TextureSampleType) {
        match scalar_type {
            ScalarType::UInt8 => (
                wgpu::TextureFormat::R8Unorm,
                wgpu::TextureSampleType::Float { filterable: true },
            ),
            ScalarType::Int16 => (wgpu::TextureFormat::R16Sint, wgpu::TextureSampleType::Sint),
            ScalarType::Float32 => (
                wgpu::TextureFormat::R32Float,
                wgpu::TextureSampleType::Float { filterable: false },
            ),
        }
    }

    fn create_volume_texture(&self, volume: &SceneVolume) -> Result<wgpu::Texture, RendererError> {
        let dims = volume.geometry().dims;
        let limit = self.device.limits().max_texture_dimension_3d;
        if dims.iter().any(|&d| d > limit as usize) {
            return Err(RendererError::VolumeTooLarge { dims, limit });
        }
        let [width, height, depth] = dims.map(|d| d as u32);

        let voxels = volume.field().voxels();
        let scalar_type = voxels.scalar_type();
        let (format, _) = Self::texture_format(scalar_type);
        let data = voxels.as_bytes().ok_or(RendererError::NonContiguous)?;

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * scalar_type.size() as u32),
                rows_per_image: Some(height),
            },
            texture_size,
        );
        Ok(texture)
    }

    fn create_lut_texture(&self, volume: &SceneVolume) -> wgpu::Texture {
        let resolution = self.config.lut_resolution;
        let table = volume.lookup_table(resolution);
        let size = wgpu::Extent3d {
            width: resolution,
            height: 1,
            depth_or_array_layers: 1,
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Transfer Function Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D1,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&table),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(resolution * 4),
                rows_per_image: None,
            },
            size,
        );
        texture
    }

    fn create_bind_group(
        &self,
        sample_type: wgpu::TextureSampleType,
        volume_view: &wgpu::TextureView,
        lut_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Volume Bind Group Layout"),
                entries: &[
                    // 3D scalar field
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type,
                            view_dimension: wgpu::TextureViewDimension::D3,
                            multisampled: false,
                        },
                        count: None,
                    },
                    // Transfer function lookup table
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D1,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                    // Camera
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(volume_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(lut_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.camera_buffer.as_entire_binding(),
                },
            ],
        })
    }

    fn camera_uniforms(&self) -> CameraUniforms {
        let extend = |v: [f32; 3]| [v[0], v[1], v[2], 1.0];
        let bounds = self.bounds.unwrap_or(Bounds {
            min: [0.0; 3],
            max: [0.0; 3],
        });
        CameraUniforms {
            position: extend(self.camera.position),
            focal_point: extend(self.camera.focal_point),
            bounds_min: extend(bounds.min),
            bounds_max: extend(bounds.max),
        }
    }
}

impl VolumeRenderer for WgpuRenderer {
    type Volume = GpuVolume;

    fn upload(&mut self, volume: &SceneVolume) -> Result<GpuVolume, RendererError> {
        if self.released {
            return Err(RendererError::Closed);
        }
        let (_, sample_type) = Self::texture_format(volume.field().voxels().scalar_type());
        let volume_texture = self.create_volume_texture(volume)?;
        let lut_texture = self.create_lut_texture(volume);

        let volume_view = volume_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let lut_view = lut_texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D1),
            ..Default::default()
        });
        let bind_group = self.create_bind_group(sample_type, &volume_view, &lut_view);

        let id = self.next_id;
        self.next_id += 1;
        Ok(GpuVolume {
            id,
            volume_texture,
            lut_texture,
            _bind_group: bind_group,
            bounds: volume.bounds(),
        })
    }

    fn add_volume(&mut self, volume: &GpuVolume) {
        log::debug!("attached volume {}", volume.id);
    }

    fn remove_volume(&mut self, volume: GpuVolume) {
        log::debug!("destroying volume {}", volume.id);
        volume.destroy();
    }

    fn reset_camera(&mut self, bounds: &Bounds) {
        self.camera = Camera::framing(bounds, self.config.field_of_view);
        self.bounds = Some(*bounds);
    }

    fn render(&mut self) -> Result<(), RendererError> {
        if self.released {
            return Err(RendererError::Closed);
        }
        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&self.camera_uniforms()),
        );

        let [r, g, b] = self.config.background.map(f64::from);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Volume Render Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Volume Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a: 1.0 }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
        }
        self.queue.submit(Some(encoder.finish()));
        self.frames += 1;
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.target.destroy();
        self.released = true;
        log::info!("render surface released after {} frames", self.frames);
    }
}
