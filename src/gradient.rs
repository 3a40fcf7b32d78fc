/// Gradient mask evaluation and compositing.
///
/// A mask yields a strength in 0..1 for a normalized pixel position. Masks are
/// composited in order (linear group first, then radial), each blending its
/// own fully adjusted colour over the running result.

use cgmath::{Basis2, InnerSpace, Rad, Rotation, Rotation2, Vector2};

use crate::color::{apply_adjustments, smootherstep, Rgb};
use crate::state::edit::{AdjustmentSet, EditState};
use crate::state::mask::{LinearGradient, MaskShape, Point, RadialGradient};

/// Mask strengths below this are treated as no effect
pub const MASK_EPSILON: f32 = 0.001;

/// Squared start→end length below which a linear mask is degenerate
const DEGENERATE_LENGTH_SQ: f32 = 1e-6;

/// Linear gradient strength: 1 on the start side, 0 past the midpoint band.
pub fn linear_mask_value(mask: &LinearGradient, p: Point) -> f32 {
    let start = mask.start.to_vector();
    let dir = mask.end.to_vector() - start;
    let len_sq = dir.magnitude2();
    if len_sq < DEGENERATE_LENGTH_SQ {
        return 0.5;
    }
    let t = (p.to_vector() - start).dot(dir) / len_sq;

    let half = mask.feather * 0.5;
    let lo = 0.5 - half;
    let hi = 0.5 + half;
    if t <= lo {
        return 1.0;
    }
    if t >= hi {
        return 0.0;
    }
    1.0 - smootherstep((t - lo) / (hi - lo))
}

/// Radial (elliptical) gradient strength, honouring `invert`.
pub fn radial_mask_value(mask: &RadialGradient, p: Point) -> f32 {
    let offset = p.to_vector() - mask.center.to_vector();
    let local: Vector2<f32> = Basis2::from_angle(Rad(-mask.rotation)).rotate_vector(offset);
    let nx = local.x / mask.radius_x;
    let ny = local.y / mask.radius_y;
    let dist = (nx * nx + ny * ny).sqrt();

    let inner = 1.0 - mask.feather;
    let value = if dist >= 1.0 {
        0.0
    } else if dist <= inner {
        1.0
    } else {
        1.0 - smootherstep((dist - inner) / (1.0 - inner))
    };

    if mask.invert {
        1.0 - value
    } else {
        value
    }
}

pub fn mask_value(shape: &MaskShape, p: Point) -> f32 {
    match shape {
        MaskShape::Linear(linear) => linear_mask_value(linear, p),
        MaskShape::Radial(radial) => radial_mask_value(radial, p),
    }
}

/// Masks that can affect output, flattened into compositing order.
///
/// Disabled masks and masks whose adjustment set is all zero are dropped up
/// front, so the per-pixel loop only sees work that changes pixels.
#[derive(Debug, Clone, Default)]
pub struct MaskStack {
    layers: Vec<(MaskShape, AdjustmentSet)>,
}

impl MaskStack {
    pub fn from_state(state: &EditState) -> Self {
        let layers = state
            .masks_in_composite_order()
            .filter(|m| m.enabled && !m.adjustments.is_zero())
            .map(|m| (m.shape, m.adjustments))
            .collect();
        Self { layers }
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[(MaskShape, AdjustmentSet)] {
        &self.layers
    }

    /// Composite every layer over `color` at normalized position `p`
    pub fn apply(&self, mut color: Rgb, p: Point) -> Rgb {
        for (shape, adjustments) in &self.layers {
            let strength = mask_value(shape, p);
            if strength < MASK_EPSILON {
                continue;
            }
            let adjusted = apply_adjustments(color, adjustments);
            for ch in 0..3 {
                color[ch] = color[ch] * (1.0 - strength) + adjusted[ch] * strength;
            }
        }
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizontal(feather: f32) -> LinearGradient {
        LinearGradient {
            start: Point::new(0.0, 0.0),
            end: Point::new(1.0, 0.0),
            feather,
        }
    }

    fn ellipse(invert: bool, rotation: f32) -> RadialGradient {
        RadialGradient {
            center: Point::new(0.5, 0.5),
            radius_x: 0.4,
            radius_y: 0.2,
            rotation,
            feather: 0.5,
            invert,
        }
    }

    #[test]
    fn test_linear_hard_edge() {
        let mask = horizontal(0.0);
        assert_eq!(linear_mask_value(&mask, Point::new(0.49, 0.3)), 1.0);
        assert_eq!(linear_mask_value(&mask, Point::new(0.51, 0.7)), 0.0);
        assert_eq!(linear_mask_value(&mask, Point::new(0.0, 0.0)), 1.0);
        assert_eq!(linear_mask_value(&mask, Point::new(1.0, 0.0)), 0.0);
    }

    #[test]
    fn test_linear_feather_is_centered() {
        let mask = horizontal(1.0);
        assert!((linear_mask_value(&mask, Point::new(0.5, 0.0)) - 0.5).abs() < 1e-6);
        let a = linear_mask_value(&mask, Point::new(0.25, 0.0));
        let b = linear_mask_value(&mask, Point::new(0.75, 0.0));
        assert!(a > 0.5 && b < 0.5);
        assert!((a + b - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_linear_degenerate_is_half() {
        let mask = LinearGradient {
            start: Point::new(0.3, 0.3),
            end: Point::new(0.3, 0.3),
            feather: 0.5,
        };
        assert_eq!(linear_mask_value(&mask, Point::new(0.9, 0.1)), 0.5);
    }

    #[test]
    fn test_radial_inside_outside() {
        let mask = ellipse(false, 0.0);
        assert_eq!(radial_mask_value(&mask, Point::new(0.5, 0.5)), 1.0);
        assert_eq!(radial_mask_value(&mask, Point::new(0.95, 0.5)), 0.0);
        // Within x radius but outside y radius
        assert_eq!(radial_mask_value(&mask, Point::new(0.5, 0.75)), 0.0);
        let edge = radial_mask_value(&mask, Point::new(0.5 + 0.4 * 0.75, 0.5));
        assert!(edge > 0.0 && edge < 1.0);
    }

    #[test]
    fn test_radial_invert_is_complement() {
        let plain = ellipse(false, 0.6);
        let inverted = ellipse(true, 0.6);
        for i in 0..=20 {
            for j in 0..=20 {
                let p = Point::new(i as f32 / 20.0, j as f32 / 20.0);
                let sum = radial_mask_value(&plain, p) + radial_mask_value(&inverted, p);
                assert!((sum - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_radial_rotation() {
        // Rotating a 0.4 x 0.2 ellipse by 90° makes it tall
        let mask = ellipse(false, std::f32::consts::FRAC_PI_2);
        assert_eq!(radial_mask_value(&mask, Point::new(0.5, 0.6)), 1.0);
        let falloff = radial_mask_value(&mask, Point::new(0.5, 0.8));
        assert!(falloff > 0.0 && falloff < 1.0);
        assert_eq!(radial_mask_value(&mask, Point::new(0.8, 0.5)), 0.0);
    }

    fn state_with(masks: &[(MaskShape, AdjustmentSet)]) -> EditState {
        let mut state = EditState::default();
        for (shape, adj) in masks {
            state.add_mask(*shape, *adj).unwrap();
        }
        state
    }

    #[test]
    fn test_stack_skips_disabled_and_zero_masks() {
        let mut state = state_with(&[
            (MaskShape::Linear(horizontal(0.0)), AdjustmentSet::with_exposure(1.0)),
            (MaskShape::Radial(ellipse(false, 0.0)), AdjustmentSet::default()),
        ]);
        assert_eq!(MaskStack::from_state(&state).len(), 1);

        let id = state.masks()[0].id;
        state.mask_mut(id).unwrap().enabled = false;
        assert!(MaskStack::from_state(&state).is_empty());
    }

    #[test]
    fn test_stack_blends_full_and_zero_strength() {
        let state = state_with(&[(
            MaskShape::Linear(horizontal(0.0)),
            AdjustmentSet::with_exposure(1.0),
        )]);
        let stack = MaskStack::from_state(&state);
        let c = [0.2, 0.3, 0.4];
        let left = stack.apply(c, Point::new(0.25, 0.5));
        assert!((left[0] - 0.4).abs() < 1e-6 && (left[2] - 0.8).abs() < 1e-6);
        assert_eq!(stack.apply(c, Point::new(0.75, 0.5)), c);
    }

    #[test]
    fn test_stack_later_masks_see_earlier_output() {
        let state = state_with(&[
            (MaskShape::Radial(ellipse(false, 0.0)), AdjustmentSet::with_exposure(-1.0)),
            (MaskShape::Linear(horizontal(0.0)), AdjustmentSet::with_exposure(1.0)),
        ]);
        let stack = MaskStack::from_state(&state);
        // Linear composites first (x2, clipped at 1), then radial halves the result
        let out = stack.apply([0.6, 0.6, 0.6], Point::new(0.45, 0.5));
        assert!((out[0] - 0.5).abs() < 1e-6);
    }
}
