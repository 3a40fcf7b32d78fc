/// Per-pixel adjustment math
///
/// Every function takes a linear RGB triple in 0..1 plus its scalar and
/// returns the transformed triple. A parameter of exactly 0 returns the input
/// untouched, so unedited images never pick up floating point drift.
///
/// The WGSL in `gpu::shaders` mirrors these functions line for line; keep the
/// two in step.

use crate::state::edit::AdjustmentSet;

pub type Rgb = [f32; 3];

/// ITU-R BT.709 luma coefficients
pub const LUMA_WEIGHTS: Rgb = [0.2126, 0.7152, 0.0722];

/// Relative luminance (BT.709)
#[inline]
pub fn luminance(c: Rgb) -> f32 {
    c[0] * LUMA_WEIGHTS[0] + c[1] * LUMA_WEIGHTS[1] + c[2] * LUMA_WEIGHTS[2]
}

/// Cubic Hermite step `3t² - 2t³` on `t = clamp((x - edge0) / (edge1 - edge0))`.
///
/// `edge0 > edge1` is allowed and yields a falling step.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Quintic step `6t⁵ - 15t⁴ + 10t³` on an already-local `t` (clamped to 0..1)
#[inline]
pub fn smootherstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn scale(c: Rgb, k: f32) -> Rgb {
    [c[0] * k, c[1] * k, c[2] * k]
}

/// Exposure: `color * 2^stops`
pub fn apply_exposure(c: Rgb, stops: f32) -> Rgb {
    if stops == 0.0 {
        return c;
    }
    scale(c, stops.exp2())
}

/// Contrast around mid-grey: `(c - 0.5) * (1 + contrast/100) + 0.5`
pub fn apply_contrast(c: Rgb, contrast: f32) -> Rgb {
    if contrast == 0.0 {
        return c;
    }
    let factor = 1.0 + contrast / 100.0;
    c.map(|v| (v - 0.5) * factor + 0.5)
}

/// Temperature: negative warms (R up, B down), positive cools (R down, B up)
pub fn apply_temperature(c: Rgb, temperature: f32) -> Rgb {
    if temperature == 0.0 {
        return c;
    }
    let shift = temperature / 100.0 * 0.3;
    let s = shift.abs();
    if shift < 0.0 {
        [c[0] * (1.0 + s), c[1], c[2] * (1.0 - s)]
    } else {
        [c[0] * (1.0 - s), c[1], c[2] * (1.0 + s)]
    }
}

/// Tint: negative pushes green, positive pushes magenta (R and B up, G down)
pub fn apply_tint(c: Rgb, tint: f32) -> Rgb {
    if tint == 0.0 {
        return c;
    }
    let shift = tint / 100.0 * 0.2;
    let s = shift.abs();
    if shift < 0.0 {
        [c[0], c[1] * (1.0 + s), c[2]]
    } else {
        [c[0] * (1.0 + s), c[1] * (1.0 - s), c[2] * (1.0 + s)]
    }
}

/// Shared body of highlights/shadows once the tonal mask is known
#[inline]
fn apply_tonal(c: Rgb, mask: f32, amount: f32) -> Rgb {
    if amount < 0.0 {
        scale(c, 1.0 + mask * amount / 100.0)
    } else {
        let lift = mask * amount / 100.0 * 0.5;
        c.map(|v| v + lift)
    }
}

/// Highlights, gated by `smoothstep(0.5, 1.0, lum)`
pub fn apply_highlights(c: Rgb, lum: f32, highlights: f32) -> Rgb {
    if highlights == 0.0 {
        return c;
    }
    apply_tonal(c, smoothstep(0.5, 1.0, lum), highlights)
}

/// Shadows, gated by `smoothstep(0.5, 0.0, lum)`
pub fn apply_shadows(c: Rgb, lum: f32, shadows: f32) -> Rgb {
    if shadows == 0.0 {
        return c;
    }
    apply_tonal(c, smoothstep(0.5, 0.0, lum), shadows)
}

/// Whites: scales pixels whose brightest channel exceeds 0.9 (hard cutoff)
pub fn apply_whites(c: Rgb, whites: f32) -> Rgb {
    if whites == 0.0 {
        return c;
    }
    let max = c[0].max(c[1]).max(c[2]);
    if max > 0.9 {
        scale(c, 1.0 + whites / 100.0 * 0.3)
    } else {
        c
    }
}

/// Blacks: scales pixels whose darkest channel is below 0.1 (hard cutoff)
pub fn apply_blacks(c: Rgb, blacks: f32) -> Rgb {
    if blacks == 0.0 {
        return c;
    }
    let min = c[0].min(c[1]).min(c[2]);
    if min < 0.1 {
        scale(c, 1.0 + blacks / 100.0 * 0.2)
    } else {
        c
    }
}

/// Saturation: `gray + (c - gray) * (1 + sat/100)` with BT.709 gray
pub fn apply_saturation(c: Rgb, saturation: f32) -> Rgb {
    if saturation == 0.0 {
        return c;
    }
    let gray = luminance(c);
    let factor = 1.0 + saturation / 100.0;
    c.map(|v| gray + (v - gray) * factor)
}

/// Vibrance: saturation attenuated for skin tones and already-saturated pixels
pub fn apply_vibrance(c: Rgb, vibrance: f32) -> Rgb {
    if vibrance == 0.0 {
        return c;
    }
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    let current_sat = if max > 0.0 { (max - min) / max } else { 0.0 };

    let is_skin = c[0] > c[1] && c[1] > c[2] && (c[0] - c[1]) > 0.06;
    let skin_protection = if is_skin { 0.5 } else { 1.0 };
    let saturation_protection = 1.0 - current_sat;

    apply_saturation(c, vibrance * skin_protection * saturation_protection)
}

/// Apply the full adjustment stack in its fixed order, without clamping.
///
/// Order: exposure, contrast, temperature, tint, highlights, shadows, whites,
/// blacks, saturation, vibrance. Luminance for highlights/shadows is taken
/// once, after tint.
pub fn apply_adjustments_unclamped(c: Rgb, adj: &AdjustmentSet) -> Rgb {
    let mut c = apply_exposure(c, adj.exposure);
    c = apply_contrast(c, adj.contrast);
    c = apply_temperature(c, adj.temperature);
    c = apply_tint(c, adj.tint);

    if adj.highlights != 0.0 || adj.shadows != 0.0 {
        let lum = luminance(c);
        c = apply_highlights(c, lum, adj.highlights);
        c = apply_shadows(c, lum, adj.shadows);
    }

    c = apply_whites(c, adj.whites);
    c = apply_blacks(c, adj.blacks);
    c = apply_saturation(c, adj.saturation);
    apply_vibrance(c, adj.vibrance)
}

/// Apply the full adjustment stack and clamp the result to [0, 1]
pub fn apply_adjustments(c: Rgb, adj: &AdjustmentSet) -> Rgb {
    clamp_unit(apply_adjustments_unclamped(c, adj))
}

#[inline]
pub fn clamp_unit(c: Rgb) -> Rgb {
    c.map(|v| v.clamp(0.0, 1.0))
}
