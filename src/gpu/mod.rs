/// GPU compute strategy for the pixel pipeline
///
/// Architecture:
/// - `shaders.rs` - WGSL compute shader source, one entry point per stage
/// - `layout.rs` - `#[repr(C)]` parameter blocks matching the WGSL structs
/// - `pipeline.rs` - wgpu device, stage pipelines, dispatch and readback
///
/// `GpuPipeline::new` fails cleanly when no adapter is present; callers fall
/// back to `pipeline::CpuPipeline`.

pub mod layout;
pub mod pipeline;
pub mod shaders;

pub use pipeline::GpuPipeline;
