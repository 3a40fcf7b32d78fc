/// wgpu compute pipeline for adjustment processing
///
/// This module manages all the wgpu boilerplate:
/// - Adapter, device and queue initialization
/// - One compute pipeline per stage, sharing the shader module
/// - Ping-pong rgba32float textures between stages
/// - Readback with 256-byte row padding
///
/// Each stage is submitted separately so a superseded render can stop at
/// the next stage boundary.

use std::sync::mpsc;

use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use super::layout::{GpuAdjustments, GpuMaskParams};
use super::shaders::{self, WORKGROUP_SIZE};
use crate::buffer::{ImageBuffer, Rgba};
use crate::error::{Error, Result};
use crate::pipeline::{PixelPipeline, PreparedEdits, RenderState, RenderTicket};

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const BYTES_PER_PIXEL: u32 = 16;

/// Binding slots shared by every stage
const BINDING_INPUT: u32 = 0;
const BINDING_OUTPUT: u32 = 1;
const BINDING_ADJUSTMENTS: u32 = 2;
const BINDING_LUT: u32 = 3;
const BINDING_MASKS: u32 = 4;

struct Stage {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    extra_binding: u32,
}

/// GPU execution strategy
pub struct GpuPipeline {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adjust: Stage,
    curve: Stage,
    mask: Stage,
    adapter_name: String,
    max_dimension: u32,
    max_buffer_size: u64,
}

// Manual Debug implementation (wgpu types don't implement Debug)
impl std::fmt::Debug for GpuPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuPipeline")
            .field("adapter", &self.adapter_name)
            .field("max_dimension", &self.max_dimension)
            .finish_non_exhaustive()
    }
}

impl GpuPipeline {
    /// Request an adapter and device and build the stage pipelines.
    /// Fails with `Error::Gpu` when no usable adapter exists.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Gpu("no suitable GPU adapter".into()))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Photo Pipeline Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(format!("failed to create device: {}", e)))?;

        // Route validation errors into our own scopes instead of panicking
        device.on_uncaptured_error(Box::new(|e| {
            tracing::error!(error = %e, "uncaptured wgpu error");
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Pipeline Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::get_shader().into()),
        });
        let adjust = create_stage(
            &device,
            &module,
            shaders::ADJUST_ENTRY,
            BINDING_ADJUSTMENTS,
            wgpu::BufferBindingType::Uniform,
        );
        let curve = create_stage(
            &device,
            &module,
            shaders::CURVE_ENTRY,
            BINDING_LUT,
            wgpu::BufferBindingType::Storage { read_only: true },
        );
        let mask = create_stage(
            &device,
            &module,
            shaders::MASK_ENTRY,
            BINDING_MASKS,
            wgpu::BufferBindingType::Storage { read_only: true },
        );
        if let Some(e) = device.pop_error_scope().await {
            return Err(Error::Gpu(format!("pipeline creation failed: {}", e)));
        }

        let limits = device.limits();
        let max_dimension = limits.max_texture_dimension_2d;
        let max_buffer_size = limits.max_buffer_size;
        debug!(adapter = %adapter_name, max_dimension, "GPU pipeline ready");

        Ok(Self {
            device,
            queue,
            adjust,
            curve,
            mask,
            adapter_name,
            max_dimension,
            max_buffer_size,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn create_texture(&self, label: &str, width: u32, height: u32) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Dispatch one stage reading `src` and writing `dst`
    fn run_stage(
        &self,
        stage: &Stage,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        params: &wgpu::Buffer,
        width: u32,
        height: u32,
    ) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Stage Bind Group"),
            layout: &stage.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BINDING_INPUT,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: BINDING_OUTPUT,
                    resource: wgpu::BindingResource::TextureView(dst),
                },
                wgpu::BindGroupEntry {
                    binding: stage.extra_binding,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Stage Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Stage Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&stage.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                width.div_ceil(WORKGROUP_SIZE),
                height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        self.queue.submit(Some(encoder.finish()));
    }

    /// Copy a texture back to host memory
    fn read_back(&self, texture: &wgpu::Texture, width: u32, height: u32) -> Result<Vec<Rgba>> {
        let bytes_per_row = width * BYTES_PER_PIXEL;
        let padded_bytes_per_row = bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer_size = (padded_bytes_per_row * height) as u64;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| Error::Gpu("readback callback dropped".into()))?
            .map_err(|e| Error::Gpu(format!("buffer map failed: {}", e)))?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let start = (y * padded_bytes_per_row) as usize;
            let end = start + bytes_per_row as usize;
            pixels.extend(
                data[start..end]
                    .chunks_exact(BYTES_PER_PIXEL as usize)
                    .map(bytemuck::pod_read_unaligned::<Rgba>),
            );
        }
        drop(data);
        output_buffer.unmap();
        Ok(pixels)
    }

    fn process_scoped(
        &self,
        input: &ImageBuffer,
        edits: &PreparedEdits,
        ticket: &RenderTicket,
    ) -> Result<Option<ImageBuffer>> {
        let (width, height) = (input.width, input.height);
        if !ticket.enter(RenderState::Adjusting) {
            return Ok(None);
        }

        let textures = [
            self.create_texture("Ping Texture", width, height),
            self.create_texture("Pong Texture", width, height),
        ];
        let views = [
            textures[0].create_view(&wgpu::TextureViewDescriptor::default()),
            textures[1].create_view(&wgpu::TextureViewDescriptor::default()),
        ];
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &textures[0],
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&input.pixels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * BYTES_PER_PIXEL),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        // Index of the texture holding the latest result
        let mut current = 0;

        let adjustments = GpuAdjustments::from(&edits.adjustments);
        let params = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Adjustments Uniform"),
                contents: bytemuck::bytes_of(&adjustments),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.run_stage(&self.adjust, &views[current], &views[1 - current], &params, width, height);
        current = 1 - current;

        if !ticket.enter(RenderState::ToneCurve) {
            return Ok(None);
        }
        if let Some(lut) = &edits.lut {
            let params = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Curve LUT"),
                    contents: bytemuck::cast_slice(&lut.lut),
                    usage: wgpu::BufferUsages::STORAGE,
                });
            self.run_stage(&self.curve, &views[current], &views[1 - current], &params, width, height);
            current = 1 - current;
        }

        if !ticket.enter(RenderState::Masking) {
            return Ok(None);
        }
        if !edits.masks.is_empty() {
            let masks = GpuMaskParams::from(&edits.masks);
            let params = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Mask Params"),
                    contents: bytemuck::bytes_of(&masks),
                    usage: wgpu::BufferUsages::STORAGE,
                });
            self.run_stage(&self.mask, &views[current], &views[1 - current], &params, width, height);
            current = 1 - current;
        }

        let pixels = self.read_back(&textures[current], width, height)?;
        if !ticket.is_current() {
            return Ok(None);
        }
        trace!(width, height, "gpu pass complete");
        ImageBuffer::new(width, height, pixels).map(Some)
    }
}

impl PixelPipeline for GpuPipeline {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn supports(&self, width: u32, height: u32) -> bool {
        let padded_row = (width as u64 * BYTES_PER_PIXEL as u64)
            .div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64;
        width <= self.max_dimension
            && height <= self.max_dimension
            && padded_row * height as u64 <= self.max_buffer_size
    }

    fn process(
        &self,
        input: &ImageBuffer,
        edits: &PreparedEdits,
        ticket: &RenderTicket,
    ) -> Result<Option<ImageBuffer>> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = self.process_scoped(input, edits, ticket);
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::Gpu(format!("validation error: {}", e)));
        }
        result
    }
}

/// Bind group layout and pipeline for one entry point. Layout holds the two
/// texture bindings plus the stage's own parameter buffer.
fn create_stage(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    entry_point: &str,
    extra_binding: u32,
    buffer_type: wgpu::BufferBindingType,
) -> Stage {
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(entry_point),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: BINDING_INPUT,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: BINDING_OUTPUT,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: TEXTURE_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: extra_binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: buffer_type,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(entry_point),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(&pipeline_layout),
        module,
        entry_point,
    });

    Stage {
        pipeline,
        layout,
        extra_binding,
    }
}
