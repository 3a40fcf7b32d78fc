use thiserror::Error;

use crate::state::mask::{MaskId, MaskKind};

/// Library error type for pipeline, cache and generation operations.
///
/// Cancellation of a superseded render is deliberately absent: it is reported
/// as `Ok(None)` by the executor, never as an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Tone curve control points failed validation.
    #[error("invalid tone curve: {0}")]
    InvalidCurve(String),

    /// An adjustment scalar is outside its documented range or not finite.
    #[error("adjustment `{field}` out of range: {value}")]
    InvalidAdjustment { field: &'static str, value: f32 },

    /// A mask definition failed validation (feather, radius, coordinates).
    #[error("invalid mask: {0}")]
    InvalidMask(String),

    /// Adding another mask of this kind would exceed the per-image limit.
    #[error("too many {kind} masks (limit {limit})")]
    TooManyMasks { kind: MaskKind, limit: usize },

    /// No mask with this id is owned by the edit state.
    #[error("unknown mask id {0}")]
    UnknownMask(MaskId),

    /// Pixel buffer dimensions do not match its data, or are zero.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Configuration value rejected by `Config::validate`.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Source bytes could not be decoded or the output could not be encoded.
    #[error(transparent)]
    Decode(#[from] image::ImageError),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error for edits or configuration.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// GPU adapter/device unavailable or lost, or a dispatch failed.
    #[error("gpu error: {0}")]
    Gpu(String),

    /// Neither the GPU nor the CPU strategy could produce a result.
    #[error("no execution path available for render")]
    NoExecutionPath,
}

pub type Result<T> = std::result::Result<T, Error>;
