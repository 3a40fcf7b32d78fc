/// State management module
///
/// This module holds the per-asset edit state:
/// - Scalar adjustments and the owning edit state (edit.rs)
/// - Gradient mask definitions (mask.rs)
/// - Asset identity shared by the queue and cache layers (data.rs)

pub mod data;
pub mod edit;
pub mod mask;
