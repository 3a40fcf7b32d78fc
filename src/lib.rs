// Non-destructive photo adjustment pipeline.
//
// Global adjustments, a tone curve and gradient masks run in a fixed order
// over an RGBA float buffer, on the GPU through wgpu compute shaders or on
// the CPU. Generated thumbnails and previews are scheduled through a
// bounded priority queue and kept in a memory LRU backed by a persistent
// directory store.

pub mod buffer;
pub mod color;
pub mod config;
pub mod curve;
pub mod error;
pub mod gpu;
pub mod gradient;
pub mod histogram;
pub mod pipeline;
pub mod state;
pub mod thumbnail;

pub use buffer::ImageBuffer;
pub use config::Config;
pub use curve::{CurvePoint, ToneCurve, ToneCurveLut};
pub use error::{Error, Result};
pub use histogram::Histogram;
pub use pipeline::{
    PixelPipeline, RenderExecutor, RenderOutput, RenderQuality, RenderSource, RenderState,
};
pub use state::data::AssetId;
pub use state::edit::{AdjustmentSet, EditState};
pub use state::mask::{GradientMask, LinearGradient, MaskId, MaskShape, Point, RadialGradient};
