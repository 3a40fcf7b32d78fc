/// Gradient mask definitions owned by an `EditState`
///
/// Coordinates are normalized to the unit image square: (0,0) is the top-left
/// corner, (1,1) the bottom-right. Evaluation lives in `crate::gradient`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::edit::AdjustmentSet;
use crate::error::{Error, Result};

/// Maximum masks of each kind composited per image
pub const MAX_MASKS_PER_KIND: usize = 8;

/// Stable identity of a mask within its owning edit state
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaskId(pub u32);

impl fmt::Display for MaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    Linear,
    Radial,
}

impl fmt::Display for MaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskKind::Linear => f.write_str("linear"),
            MaskKind::Radial => f.write_str("radial"),
        }
    }
}

/// A point in normalized image space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub(crate) fn to_vector(self) -> cgmath::Vector2<f32> {
        cgmath::Vector2::new(self.x, self.y)
    }
}

/// Linear gradient: full effect on the `start` side, none past `end`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LinearGradient {
    pub start: Point,
    pub end: Point,
    /// Transition width around the midpoint (0 = hard edge, 1 = whole span)
    pub feather: f32,
}

/// Elliptical gradient: full effect inside, none outside the ellipse
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RadialGradient {
    pub center: Point,
    pub radius_x: f32,
    pub radius_y: f32,
    /// Ellipse rotation in radians
    pub rotation: f32,
    /// Fraction of the radius used for the falloff (0 = hard edge)
    pub feather: f32,
    /// Apply the effect outside the ellipse instead
    pub invert: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MaskShape {
    Linear(LinearGradient),
    Radial(RadialGradient),
}

impl MaskShape {
    pub fn kind(&self) -> MaskKind {
        match self {
            MaskShape::Linear(_) => MaskKind::Linear,
            MaskShape::Radial(_) => MaskKind::Radial,
        }
    }
}

/// One mask in an edit state's mask list
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GradientMask {
    pub id: MaskId,
    pub enabled: bool,
    /// Adjustments applied where the mask is active
    pub adjustments: AdjustmentSet,
    pub shape: MaskShape,
}

impl GradientMask {
    pub fn kind(&self) -> MaskKind {
        self.shape.kind()
    }

    pub fn validate(&self) -> Result<()> {
        self.adjustments.validate()?;
        match &self.shape {
            MaskShape::Linear(linear) => {
                check_point(linear.start)?;
                check_point(linear.end)?;
                check_feather(linear.feather)
            }
            MaskShape::Radial(radial) => {
                check_point(radial.center)?;
                if !(radial.radius_x.is_finite() && radial.radius_x > 0.0)
                    || !(radial.radius_y.is_finite() && radial.radius_y > 0.0)
                {
                    return Err(Error::InvalidMask(format!(
                        "radial radii must be positive, got {}x{}",
                        radial.radius_x, radial.radius_y
                    )));
                }
                if !radial.rotation.is_finite() {
                    return Err(Error::InvalidMask("rotation is not finite".into()));
                }
                check_feather(radial.feather)
            }
        }
    }
}

fn check_point(p: Point) -> Result<()> {
    if p.x.is_finite() && p.y.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidMask(format!("non-finite point ({}, {})", p.x, p.y)))
    }
}

fn check_feather(feather: f32) -> Result<()> {
    if (0.0..=1.0).contains(&feather) {
        Ok(())
    } else {
        Err(Error::InvalidMask(format!("feather must be in [0, 1], got {}", feather)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_json_is_tagged() {
        let shape = MaskShape::Linear(LinearGradient {
            start: Point::new(0.0, 0.0),
            end: Point::new(0.0, 1.0),
            feather: 0.3,
        });
        let json = serde_json::to_string(&shape).unwrap();
        assert!(json.contains(r#""type":"linear""#));
        let back: MaskShape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn test_validate_radial_radius() {
        let mask = GradientMask {
            id: MaskId(0),
            enabled: true,
            adjustments: AdjustmentSet::default(),
            shape: MaskShape::Radial(RadialGradient {
                center: Point::new(0.5, 0.5),
                radius_x: 0.0,
                radius_y: 0.2,
                rotation: 0.0,
                feather: 0.2,
                invert: false,
            }),
        };
        assert!(matches!(mask.validate(), Err(Error::InvalidMask(_))));
    }

    #[test]
    fn test_validate_feather_range() {
        let mask = GradientMask {
            id: MaskId(1),
            enabled: true,
            adjustments: AdjustmentSet::default(),
            shape: MaskShape::Linear(LinearGradient {
                start: Point::new(0.0, 0.0),
                end: Point::new(1.0, 1.0),
                feather: 1.5,
            }),
        };
        assert!(mask.validate().is_err());
    }
}
