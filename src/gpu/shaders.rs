/// WGSL compute shaders for real-time adjustment processing
///
/// One module, three entry points, one per pipeline stage:
/// 1. `adjust_main`  - global adjustment stack, clamped
/// 2. `curve_main`   - tone curve LUT with linear interpolation
/// 3. `mask_main`    - gradient mask compositing (linear, then radial)
///
/// Stages ping-pong between two rgba32float textures. Every function here
/// mirrors its counterpart in `crate::color`, `crate::curve` or
/// `crate::gradient`; the CPU path is the reference.

/// Workgroup edge length; dispatch is `ceil(w/16) x ceil(h/16)`
pub const WORKGROUP_SIZE: u32 = 16;

pub const ADJUST_ENTRY: &str = "adjust_main";
pub const CURVE_ENTRY: &str = "curve_main";
pub const MASK_ENTRY: &str = "mask_main";

pub const PIPELINE_SHADER: &str = r#"
// ========== Parameter blocks ==========
// Field order must match gpu::layout (GpuAdjustments, GpuLinearMask, ...)

struct Adjustments {
    temperature: f32,
    tint: f32,
    exposure: f32,
    contrast: f32,
    highlights: f32,
    shadows: f32,
    whites: f32,
    blacks: f32,
    vibrance: f32,
    saturation: f32,
    padding0: f32,        // Padding for 16-byte alignment
    padding1: f32,
}

struct LinearMask {
    start: vec2<f32>,
    end: vec2<f32>,
    feather: f32,
    enabled: u32,
    padding0: f32,
    padding1: f32,
    adj: Adjustments,
}

struct RadialMask {
    center: vec2<f32>,
    radius: vec2<f32>,
    rotation: f32,
    feather: f32,
    invert: u32,
    enabled: u32,
    adj: Adjustments,
}

struct MaskParams {
    linear_count: u32,
    radial_count: u32,
    padding0: u32,
    padding1: u32,
    linear: array<LinearMask, 8>,
    radial: array<RadialMask, 8>,
}

@group(0) @binding(0)
var input_texture: texture_2d<f32>;

@group(0) @binding(1)
var output_texture: texture_storage_2d<rgba32float, write>;

@group(0) @binding(2)
var<uniform> global_adjustments: Adjustments;

@group(0) @binding(3)
var<storage, read> curve_lut: array<f32, 256>;

@group(0) @binding(4)
var<storage, read> mask_params: MaskParams;

// ========== Adjustment math ==========

fn luminance(c: vec3<f32>) -> f32 {
    return c.r * 0.2126 + c.g * 0.7152 + c.b * 0.0722;
}

// Cubic Hermite step; edge0 > edge1 gives a falling step
fn hermite_step(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = clamp((x - edge0) / (edge1 - edge0), 0.0, 1.0);
    return t * t * (3.0 - 2.0 * t);
}

fn smootherstep(t_in: f32) -> f32 {
    let t = clamp(t_in, 0.0, 1.0);
    return t * t * t * (t * (t * 6.0 - 15.0) + 10.0);
}

fn apply_tonal(c: vec3<f32>, mask: f32, amount: f32) -> vec3<f32> {
    if amount < 0.0 {
        return c * (1.0 + mask * amount / 100.0);
    }
    return c + vec3<f32>(mask * amount / 100.0 * 0.5);
}

fn apply_saturation(c: vec3<f32>, saturation: f32) -> vec3<f32> {
    if saturation == 0.0 {
        return c;
    }
    let gray = luminance(c);
    let factor = 1.0 + saturation / 100.0;
    return vec3<f32>(gray) + (c - vec3<f32>(gray)) * factor;
}

fn apply_adjustments(color_in: vec3<f32>, adj: Adjustments) -> vec3<f32> {
    var c = color_in;

    // 1. Exposure
    if adj.exposure != 0.0 {
        c = c * exp2(adj.exposure);
    }

    // 2. Contrast around mid-grey
    if adj.contrast != 0.0 {
        c = (c - vec3<f32>(0.5)) * (1.0 + adj.contrast / 100.0) + vec3<f32>(0.5);
    }

    // 3. Temperature
    if adj.temperature != 0.0 {
        let shift = adj.temperature / 100.0 * 0.3;
        let s = abs(shift);
        if shift < 0.0 {
            c = vec3<f32>(c.r * (1.0 + s), c.g, c.b * (1.0 - s));
        } else {
            c = vec3<f32>(c.r * (1.0 - s), c.g, c.b * (1.0 + s));
        }
    }

    // 4. Tint
    if adj.tint != 0.0 {
        let shift = adj.tint / 100.0 * 0.2;
        let s = abs(shift);
        if shift < 0.0 {
            c = vec3<f32>(c.r, c.g * (1.0 + s), c.b);
        } else {
            c = vec3<f32>(c.r * (1.0 + s), c.g * (1.0 - s), c.b * (1.0 + s));
        }
    }

    // 5-6. Highlights & shadows share one luminance taken after tint
    if adj.highlights != 0.0 || adj.shadows != 0.0 {
        let lum = luminance(c);
        if adj.highlights != 0.0 {
            c = apply_tonal(c, hermite_step(0.5, 1.0, lum), adj.highlights);
        }
        if adj.shadows != 0.0 {
            c = apply_tonal(c, hermite_step(0.5, 0.0, lum), adj.shadows);
        }
    }

    // 7. Whites (hard cutoff)
    if adj.whites != 0.0 {
        if max(c.r, max(c.g, c.b)) > 0.9 {
            c = c * (1.0 + adj.whites / 100.0 * 0.3);
        }
    }

    // 8. Blacks (hard cutoff)
    if adj.blacks != 0.0 {
        if min(c.r, min(c.g, c.b)) < 0.1 {
            c = c * (1.0 + adj.blacks / 100.0 * 0.2);
        }
    }

    // 9. Saturation
    c = apply_saturation(c, adj.saturation);

    // 10. Vibrance
    if adj.vibrance != 0.0 {
        let max_c = max(c.r, max(c.g, c.b));
        let min_c = min(c.r, min(c.g, c.b));
        var current_sat = 0.0;
        if max_c > 0.0 {
            current_sat = (max_c - min_c) / max_c;
        }
        var skin_protection = 1.0;
        if c.r > c.g && c.g > c.b && (c.r - c.g) > 0.06 {
            skin_protection = 0.5;
        }
        c = apply_saturation(c, adj.vibrance * skin_protection * (1.0 - current_sat));
    }

    return c;
}

// ========== Mask evaluation ==========

fn linear_mask_value(m: LinearMask, p: vec2<f32>) -> f32 {
    let dir = m.end - m.start;
    let len_sq = dot(dir, dir);
    if len_sq < 1e-6 {
        return 0.5;
    }
    let t = dot(p - m.start, dir) / len_sq;
    let half_width = m.feather * 0.5;
    let lo = 0.5 - half_width;
    let hi = 0.5 + half_width;
    if t <= lo {
        return 1.0;
    }
    if t >= hi {
        return 0.0;
    }
    return 1.0 - smootherstep((t - lo) / (hi - lo));
}

fn radial_mask_value(m: RadialMask, p: vec2<f32>) -> f32 {
    let d = p - m.center;
    let cos_r = cos(-m.rotation);
    let sin_r = sin(-m.rotation);
    let local = vec2<f32>(cos_r * d.x - sin_r * d.y, sin_r * d.x + cos_r * d.y);
    let n = local / m.radius;
    let dist = sqrt(n.x * n.x + n.y * n.y);
    let inner = 1.0 - m.feather;

    var value = 0.0;
    if dist >= 1.0 {
        value = 0.0;
    } else if dist <= inner {
        value = 1.0;
    } else {
        value = 1.0 - smootherstep((dist - inner) / (1.0 - inner));
    }

    if m.invert != 0u {
        return 1.0 - value;
    }
    return value;
}

fn blend(color: vec3<f32>, adj: Adjustments, strength: f32) -> vec3<f32> {
    let adjusted = clamp(apply_adjustments(color, adj), vec3<f32>(0.0), vec3<f32>(1.0));
    return color * (1.0 - strength) + adjusted * strength;
}

// ========== Entry points ==========

@compute @workgroup_size(16, 16)
fn adjust_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(input_texture);
    if gid.x >= dims.x || gid.y >= dims.y {
        return;
    }
    let coords = vec2<i32>(gid.xy);
    let px = textureLoad(input_texture, coords, 0);
    let rgb = clamp(apply_adjustments(px.rgb, global_adjustments), vec3<f32>(0.0), vec3<f32>(1.0));
    textureStore(output_texture, coords, vec4<f32>(rgb, px.a));
}

fn sample_curve(v: f32) -> f32 {
    let pos = clamp(v, 0.0, 1.0) * 255.0;
    let index = min(u32(floor(pos)), 254u);
    let frac = pos - f32(index);
    let a = curve_lut[index];
    let b = curve_lut[index + 1u];
    return a + (b - a) * frac;
}

@compute @workgroup_size(16, 16)
fn curve_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(input_texture);
    if gid.x >= dims.x || gid.y >= dims.y {
        return;
    }
    let coords = vec2<i32>(gid.xy);
    let px = textureLoad(input_texture, coords, 0);
    let rgb = vec3<f32>(sample_curve(px.r), sample_curve(px.g), sample_curve(px.b));
    textureStore(output_texture, coords, vec4<f32>(rgb, px.a));
}

@compute @workgroup_size(16, 16)
fn mask_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(input_texture);
    if gid.x >= dims.x || gid.y >= dims.y {
        return;
    }
    let coords = vec2<i32>(gid.xy);
    let px = textureLoad(input_texture, coords, 0);
    // Pixel centre in normalized image space
    let uv = (vec2<f32>(gid.xy) + vec2<f32>(0.5)) / vec2<f32>(dims);

    var color = px.rgb;
    for (var i = 0u; i < mask_params.linear_count; i = i + 1u) {
        let m = mask_params.linear[i];
        if m.enabled == 0u {
            continue;
        }
        let strength = linear_mask_value(m, uv);
        if strength < 0.001 {
            continue;
        }
        color = blend(color, m.adj, strength);
    }
    for (var i = 0u; i < mask_params.radial_count; i = i + 1u) {
        let m = mask_params.radial[i];
        if m.enabled == 0u {
            continue;
        }
        let strength = radial_mask_value(m, uv);
        if strength < 0.001 {
            continue;
        }
        color = blend(color, m.adj, strength);
    }

    textureStore(output_texture, coords, vec4<f32>(clamp(color, vec3<f32>(0.0), vec3<f32>(1.0)), px.a));
}
"#;

/// Get the shader source code for the pipeline stages
pub fn get_shader() -> &'static str {
    PIPELINE_SHADER
}
