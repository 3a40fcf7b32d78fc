/// Non-destructive edit parameters for an asset
///
/// `AdjustmentSet` is the scalar bundle applied globally or per mask.
/// `EditState` owns everything needed to render an asset: the global
/// adjustments, the tone curve and the gradient mask list. It is serialized
/// to JSON so edits survive restarts.

use serde::{Deserialize, Serialize};

use super::mask::{GradientMask, MaskId, MaskKind, MaskShape, MAX_MASKS_PER_KIND};
use crate::curve::ToneCurve;
use crate::error::{Error, Result};

/// All scalar adjustments, in canonical order.
///
/// The field order here is the order the GPU uniform block uses; see
/// `gpu::layout::GpuAdjustments`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct AdjustmentSet {
    // ========== White Balance ==========
    /// Temperature (-100 to +100); negative warms, positive cools
    pub temperature: f32,
    /// Tint (-100 to +100); negative is green, positive is magenta
    pub tint: f32,

    // ========== Exposure & Tone ==========
    /// Exposure in stops (-5.0 to +5.0)
    pub exposure: f32,
    /// Contrast around mid-grey (-100 to +100)
    pub contrast: f32,
    /// Highlights (-100 to +100); negative recovers, positive boosts
    pub highlights: f32,
    /// Shadows (-100 to +100); negative crushes, positive lifts
    pub shadows: f32,
    /// Whites (-100 to +100), acts on pixels whose brightest channel > 0.9
    pub whites: f32,
    /// Blacks (-100 to +100), acts on pixels whose darkest channel < 0.1
    pub blacks: f32,

    // ========== Color ==========
    /// Vibrance (-100 to +100), saturation that protects skin and saturated colors
    pub vibrance: f32,
    /// Saturation (-100 to +100); -100 is greyscale
    pub saturation: f32,
}

/// Allowed range for exposure, in stops
pub const EXPOSURE_RANGE: (f32, f32) = (-5.0, 5.0);
/// Allowed range for every other slider
pub const SLIDER_RANGE: (f32, f32) = (-100.0, 100.0);

impl AdjustmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for an exposure-only adjustment
    pub fn with_exposure(exposure: f32) -> Self {
        Self {
            exposure,
            ..Self::default()
        }
    }

    /// True when every field is exactly zero; such a set is a no-op.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Field names and values in canonical order
    pub fn fields(&self) -> [(&'static str, f32); 10] {
        [
            ("temperature", self.temperature),
            ("tint", self.tint),
            ("exposure", self.exposure),
            ("contrast", self.contrast),
            ("highlights", self.highlights),
            ("shadows", self.shadows),
            ("whites", self.whites),
            ("blacks", self.blacks),
            ("vibrance", self.vibrance),
            ("saturation", self.saturation),
        ]
    }

    /// Reject non-finite or out-of-range values.
    ///
    /// The math in `color` trusts its inputs, so this must run before an
    /// adjustment set reaches a pipeline.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in self.fields() {
            let (lo, hi) = if field == "exposure" {
                EXPOSURE_RANGE
            } else {
                SLIDER_RANGE
            };
            if !value.is_finite() || value < lo || value > hi {
                return Err(Error::InvalidAdjustment { field, value });
            }
        }
        Ok(())
    }
}

/// Everything that describes how an asset is rendered
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct EditState {
    pub adjustments: AdjustmentSet,
    pub tone_curve: ToneCurve,
    masks: Vec<GradientMask>,
    next_mask_id: u32,
}

impl EditState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert to JSON string for storage
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let state: EditState = serde_json::from_str(json)?;
        state.validate()?;
        Ok(state)
    }

    /// Check if this represents an unedited image
    pub fn is_unedited(&self) -> bool {
        self.adjustments.is_zero() && self.tone_curve.is_identity() && self.masks.is_empty()
    }

    /// Reset all adjustments, the curve and the mask list
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self) -> Result<()> {
        self.adjustments.validate()?;
        self.tone_curve.validate()?;
        for kind in [MaskKind::Linear, MaskKind::Radial] {
            if self.count(kind) > MAX_MASKS_PER_KIND {
                return Err(Error::TooManyMasks {
                    kind,
                    limit: MAX_MASKS_PER_KIND,
                });
            }
        }
        for mask in &self.masks {
            mask.validate()?;
        }
        Ok(())
    }

    /// All masks in list order
    pub fn masks(&self) -> &[GradientMask] {
        &self.masks
    }

    /// Masks in compositing order: linear masks first, then radial masks,
    /// each group in list order.
    pub fn masks_in_composite_order(&self) -> impl Iterator<Item = &GradientMask> {
        let linear = self.masks.iter().filter(|m| m.kind() == MaskKind::Linear);
        let radial = self.masks.iter().filter(|m| m.kind() == MaskKind::Radial);
        linear.chain(radial)
    }

    fn count(&self, kind: MaskKind) -> usize {
        self.masks.iter().filter(|m| m.kind() == kind).count()
    }

    /// Create a mask and return its id
    pub fn add_mask(&mut self, shape: MaskShape, adjustments: AdjustmentSet) -> Result<MaskId> {
        let kind = shape.kind();
        if self.count(kind) >= MAX_MASKS_PER_KIND {
            return Err(Error::TooManyMasks {
                kind,
                limit: MAX_MASKS_PER_KIND,
            });
        }
        let id = MaskId(self.next_mask_id);
        let mask = GradientMask {
            id,
            enabled: true,
            adjustments,
            shape,
        };
        mask.validate()?;
        self.next_mask_id += 1;
        self.masks.push(mask);
        Ok(id)
    }

    pub fn remove_mask(&mut self, id: MaskId) -> Result<GradientMask> {
        let index = self.index_of(id)?;
        Ok(self.masks.remove(index))
    }

    /// Move a mask to `new_index` in the list (clamped to the end)
    pub fn move_mask(&mut self, id: MaskId, new_index: usize) -> Result<()> {
        let index = self.index_of(id)?;
        let mask = self.masks.remove(index);
        let target = new_index.min(self.masks.len());
        self.masks.insert(target, mask);
        Ok(())
    }

    pub fn mask(&self, id: MaskId) -> Option<&GradientMask> {
        self.masks.iter().find(|m| m.id == id)
    }

    pub fn mask_mut(&mut self, id: MaskId) -> Option<&mut GradientMask> {
        self.masks.iter_mut().find(|m| m.id == id)
    }

    fn index_of(&self, id: MaskId) -> Result<usize> {
        self.masks
            .iter()
            .position(|m| m.id == id)
            .ok_or(Error::UnknownMask(id))
    }
}
