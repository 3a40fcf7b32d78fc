/// Tone curve and its 256-entry lookup table.
///
/// Control points are joined by a Catmull-Rom spline, converted per segment
/// into a cubic Bezier and sampled at 256 evenly spaced inputs. Applying the
/// curve linearly interpolates between adjacent LUT entries, the same way a
/// GPU texture sampler would.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::{Error, Result};

pub const LUT_SIZE: usize = 256;

/// Catmull-Rom tension (0.5 is the centripetal-free standard form)
pub const CURVE_TENSION: f32 = 0.5;

/// Bisection steps used to invert x(t) on a Bezier segment
const SOLVE_ITERATIONS: usize = 32;

/// Tone curve control point
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Input value (0.0 to 1.0)
    pub x: f32,
    /// Output value (0.0 to 1.0)
    pub y: f32,
}

impl CurvePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Cubic Bezier segment `p0 → p3` with inner control points `p1`, `p2`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierSegment {
    pub p0: CurvePoint,
    pub p1: CurvePoint,
    pub p2: CurvePoint,
    pub p3: CurvePoint,
}

impl BezierSegment {
    fn eval(&self, t: f32) -> CurvePoint {
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        CurvePoint {
            x: a * self.p0.x + b * self.p1.x + c * self.p2.x + d * self.p3.x,
            y: a * self.p0.y + b * self.p1.y + c * self.p2.y + d * self.p3.y,
        }
    }

    /// y at input `x`, found by bisection on t. Requires x(t) monotonic,
    /// which `catmull_rom_to_bezier` guarantees by clamping control x's.
    fn y_at(&self, x: f32) -> f32 {
        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        for _ in 0..SOLVE_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if self.eval(mid).x < x {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        self.eval(0.5 * (lo + hi)).y
    }
}

/// Convert a Catmull-Rom spline through `points` into Bezier segments.
///
/// Tangents at sequence boundaries reuse the nearest valid neighbor. Segments
/// with zero width in x (duplicate x values) are emitted but never sampled.
pub fn catmull_rom_to_bezier(points: &[CurvePoint]) -> Vec<BezierSegment> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let k = CURVE_TENSION / 3.0;
    (0..n - 1)
        .map(|i| {
            let p0 = points[i.saturating_sub(1)];
            let p1 = points[i];
            let p2 = points[i + 1];
            let p3 = points[(i + 2).min(n - 1)];

            let (x_lo, x_hi) = (p1.x, p2.x);
            let c1 = CurvePoint {
                x: (p1.x + (p2.x - p0.x) * k).clamp(x_lo, x_hi),
                y: p1.y + (p2.y - p0.y) * k,
            };
            let c2 = CurvePoint {
                x: (p2.x - (p3.x - p1.x) * k).clamp(x_lo, x_hi),
                y: p2.y - (p3.y - p1.y) * k,
            };
            BezierSegment {
                p0: p1,
                p1: c1,
                p2: c2,
                p3: p2,
            }
        })
        .collect()
}

/// 256-entry lookup table mapping an input level to an output level
#[derive(Debug, Clone, PartialEq)]
pub struct ToneCurveLut {
    pub lut: [f32; LUT_SIZE],
}

impl ToneCurveLut {
    pub fn identity() -> Self {
        let mut lut = [0.0; LUT_SIZE];
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as f32 / (LUT_SIZE - 1) as f32;
        }
        Self { lut }
    }

    /// Sample the spline through `points` at 256 evenly spaced inputs
    pub fn from_points(points: &[CurvePoint]) -> Result<Self> {
        validate_points(points)?;
        let segments = catmull_rom_to_bezier(points);
        let mut lut = [0.0; LUT_SIZE];
        let mut seg = 0;
        for (i, v) in lut.iter_mut().enumerate() {
            let x = i as f32 / (LUT_SIZE - 1) as f32;
            // Advance to the segment containing x, skipping zero-width ones
            while seg + 1 < segments.len() && x > segments[seg].p3.x {
                seg += 1;
            }
            let s = &segments[seg];
            let y = if s.p3.x - s.p0.x <= 0.0 { s.p3.y } else { s.y_at(x) };
            *v = y.clamp(0.0, 1.0);
        }
        Ok(Self { lut })
    }

    /// Map one channel value through the curve
    #[inline]
    pub fn sample(&self, value: f32) -> f32 {
        let pos = value.clamp(0.0, 1.0) * (LUT_SIZE - 1) as f32;
        let index = (pos.floor() as usize).min(LUT_SIZE - 2);
        let frac = pos - index as f32;
        let a = self.lut[index];
        let b = self.lut[index + 1];
        a + (b - a) * frac
    }

    #[inline]
    pub fn apply(&self, c: Rgb) -> Rgb {
        c.map(|v| self.sample(v))
    }
}

fn validate_points(points: &[CurvePoint]) -> Result<()> {
    if points.len() < 2 {
        return Err(Error::InvalidCurve(format!(
            "need at least 2 control points, got {}",
            points.len()
        )));
    }
    for p in points {
        if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
            return Err(Error::InvalidCurve(format!(
                "point ({}, {}) outside the unit square",
                p.x, p.y
            )));
        }
    }
    if points.windows(2).any(|w| w[1].x < w[0].x) {
        return Err(Error::InvalidCurve("points are not sorted by x".into()));
    }
    let first = points[0].x;
    let last = points[points.len() - 1].x;
    if first != 0.0 || last != 1.0 {
        return Err(Error::InvalidCurve(format!(
            "curve must span x=0..1, got {}..{}",
            first, last
        )));
    }
    Ok(())
}

/// Tone curve with control points and a lazily built LUT.
///
/// The LUT is rebuilt on first use after any change to the points.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToneCurve {
    points: Vec<CurvePoint>,
    #[serde(skip)]
    lut: OnceLock<ToneCurveLut>,
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self {
            // Linear curve by default
            points: vec![CurvePoint::new(0.0, 0.0), CurvePoint::new(1.0, 1.0)],
            lut: OnceLock::new(),
        }
    }
}

impl PartialEq for ToneCurve {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl ToneCurve {
    /// Build a curve from validated control points
    pub fn new(points: Vec<CurvePoint>) -> Result<Self> {
        validate_points(&points)?;
        Ok(Self {
            points,
            lut: OnceLock::new(),
        })
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Replace the control points, invalidating the cached LUT
    pub fn set_points(&mut self, points: Vec<CurvePoint>) -> Result<()> {
        validate_points(&points)?;
        self.points = points;
        self.lut = OnceLock::new();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_points(&self.points)
    }

    /// True for the two-point diagonal; the pipeline skips the stage then
    pub fn is_identity(&self) -> bool {
        self.points.len() == 2
            && self.points[0] == CurvePoint::new(0.0, 0.0)
            && self.points[1] == CurvePoint::new(1.0, 1.0)
    }

    /// The derived LUT, built on first access
    pub fn lut(&self) -> Result<&ToneCurveLut> {
        if let Some(lut) = self.lut.get() {
            return Ok(lut);
        }
        let built = ToneCurveLut::from_points(&self.points)?;
        Ok(self.lut.get_or_init(|| built))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(list: &[(f32, f32)]) -> Vec<CurvePoint> {
        list.iter().map(|&(x, y)| CurvePoint::new(x, y)).collect()
    }

    #[test]
    fn test_identity_curve_is_noop() {
        let curve = ToneCurve::default();
        assert!(curve.is_identity());
        let lut = curve.lut().unwrap();
        for i in 0..=1000 {
            let v = i as f32 / 1000.0;
            assert!((lut.sample(v) - v).abs() < 1e-5, "v={v} -> {}", lut.sample(v));
        }
    }

    #[test]
    fn test_linear_curve_midpoint() {
        let lut = ToneCurveLut::from_points(&pts(&[(0.0, 0.0), (1.0, 1.0)])).unwrap();
        assert!((lut.sample(0.5) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_catmull_rom_to_bezier_linear_controls() {
        let segs = catmull_rom_to_bezier(&pts(&[(0.0, 0.0), (1.0, 1.0)]));
        assert_eq!(segs.len(), 1);
        let s = segs[0];
        assert!((s.p1.x - 1.0 / 6.0).abs() < 1e-6 && (s.p1.y - 1.0 / 6.0).abs() < 1e-6);
        assert!((s.p2.x - 5.0 / 6.0).abs() < 1e-6 && (s.p2.y - 5.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_curve_passes_through_control_points() {
        let points = pts(&[(0.0, 0.0), (0.25, 0.4), (0.75, 0.8), (1.0, 1.0)]);
        let lut = ToneCurveLut::from_points(&points).unwrap();
        assert!((lut.sample(0.25) - 0.4).abs() < 1.0 / 255.0);
        assert!((lut.sample(0.75) - 0.8).abs() < 1.0 / 255.0);
        assert!(lut.lut[0].abs() < 1e-6);
        assert!((lut.lut[255] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_interpolates_between_entries() {
        let mut lut = ToneCurveLut::identity();
        lut.lut[10] = 0.0;
        lut.lut[11] = 1.0;
        let v = 10.5 / 255.0;
        assert!((lut.sample(v) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_sample_clamps_input() {
        let lut = ToneCurveLut::identity();
        assert_eq!(lut.sample(-0.5), 0.0);
        assert_eq!(lut.sample(2.0), 1.0);
    }

    #[test]
    fn test_rejects_invalid_sequences() {
        assert!(ToneCurve::new(pts(&[(0.0, 0.0)])).is_err());
        assert!(ToneCurve::new(pts(&[(0.0, 0.0), (0.6, 0.5), (0.4, 0.4), (1.0, 1.0)])).is_err());
        assert!(ToneCurve::new(pts(&[(0.1, 0.0), (1.0, 1.0)])).is_err());
        assert!(ToneCurve::new(pts(&[(0.0, 0.0), (1.0, 1.5)])).is_err());
    }

    #[test]
    fn test_duplicate_x_is_finite() {
        let points = pts(&[(0.0, 0.0), (0.5, 0.3), (0.5, 0.7), (1.0, 1.0)]);
        let lut = ToneCurveLut::from_points(&points).unwrap();
        assert!(lut.lut.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_set_points_invalidates_lut() {
        let mut curve = ToneCurve::default();
        let before = curve.lut().unwrap().sample(0.5);
        curve
            .set_points(pts(&[(0.0, 0.0), (0.5, 0.8), (1.0, 1.0)]))
            .unwrap();
        let after = curve.lut().unwrap().sample(0.5);
        assert!((before - 0.5).abs() < 1e-5);
        assert!((after - 0.8).abs() < 1.0 / 255.0);
        assert!(!curve.is_identity());
    }
}
