/// Numeric contract of the pixel pipeline, checked through the public API.
/// The GPU comparison returns early on machines without an adapter.

use std::sync::Arc;

use photo_pipeline::color::{apply_blacks, apply_whites};
use photo_pipeline::gpu::GpuPipeline;
use photo_pipeline::{
    AdjustmentSet, CurvePoint, EditState, ImageBuffer, LinearGradient, MaskShape, Point,
    RadialGradient, RenderExecutor, RenderQuality, RenderSource,
};

/// Smooth colour ramp covering shadows, midtones and highlights
fn ramp(width: u32, height: u32) -> Arc<ImageBuffer> {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let u = x as f32 / (width - 1) as f32;
            let v = y as f32 / (height - 1) as f32;
            pixels.push([u, v, 0.5 * (u + v), 1.0]);
        }
    }
    Arc::new(ImageBuffer::new(width, height, pixels).unwrap())
}

fn cpu_render(input: &Arc<ImageBuffer>, edits: &EditState) -> ImageBuffer {
    RenderExecutor::new(0.25)
        .render(RenderSource::Decoded(input.clone()), edits, RenderQuality::Full)
        .unwrap()
        .unwrap()
        .image
}

fn scenarios() -> Vec<(&'static str, EditState)> {
    let mut out = Vec::new();

    let mut tone = EditState::default();
    tone.adjustments.exposure = 0.7;
    tone.adjustments.contrast = 25.0;
    tone.adjustments.highlights = -40.0;
    tone.adjustments.shadows = 35.0;
    out.push(("tone", tone));

    let mut color = EditState::default();
    color.adjustments.temperature = -30.0;
    color.adjustments.tint = 20.0;
    color.adjustments.saturation = 15.0;
    out.push(("color", color));

    let mut curve = EditState::default();
    curve
        .tone_curve
        .set_points(vec![
            CurvePoint::new(0.0, 0.05),
            CurvePoint::new(0.3, 0.2),
            CurvePoint::new(0.7, 0.85),
            CurvePoint::new(1.0, 1.0),
        ])
        .unwrap();
    out.push(("curve", curve));

    let mut masked = EditState::default();
    masked.adjustments.exposure = -0.3;
    masked
        .add_mask(
            MaskShape::Linear(LinearGradient {
                start: Point::new(0.0, 0.0),
                end: Point::new(0.2, 1.0),
                feather: 0.6,
            }),
            AdjustmentSet {
                exposure: 0.8,
                saturation: -30.0,
                ..AdjustmentSet::default()
            },
        )
        .unwrap();
    masked
        .add_mask(
            MaskShape::Radial(RadialGradient {
                center: Point::new(0.6, 0.4),
                radius_x: 0.35,
                radius_y: 0.25,
                rotation: 0.5,
                feather: 0.7,
                invert: true,
            }),
            AdjustmentSet {
                temperature: 40.0,
                contrast: -20.0,
                ..AdjustmentSet::default()
            },
        )
        .unwrap();
    out.push(("masks", masked));

    out
}

/// Edits containing every hard cutoff: whites, blacks and the vibrance skin test
fn cutoff_edits() -> EditState {
    let mut edits = EditState::default();
    edits.adjustments.whites = 30.0;
    edits.adjustments.blacks = -40.0;
    edits.adjustments.vibrance = 40.0;
    edits
}

/// Whether float rounding could put `p` on either side of a cutoff in
/// `cutoff_edits`. With nothing before them in the stack, whites and blacks
/// see the input pixel and vibrance sees their output.
fn near_cutoff(p: [f32; 4]) -> bool {
    const EPS: f32 = 1e-4;
    let c = [p[0], p[1], p[2]];
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    let adj = cutoff_edits().adjustments;
    let v = apply_blacks(apply_whites(c, adj.whites), adj.blacks);
    (max - 0.9).abs() < EPS
        || (min - 0.1).abs() < EPS
        || (v[0] - v[1]).abs() < EPS
        || (v[1] - v[2]).abs() < EPS
        || ((v[0] - v[1]) - 0.06).abs() < EPS
}

fn outliers<'a>(
    gpu: &'a ImageBuffer,
    cpu: &'a ImageBuffer,
    input: &'a ImageBuffer,
    tolerance: f32,
) -> impl Iterator<Item = [f32; 4]> + 'a {
    gpu.pixels
        .iter()
        .zip(&cpu.pixels)
        .zip(&input.pixels)
        .filter(move |((g, c), _)| (0..4).any(|ch| (g[ch] - c[ch]).abs() > tolerance))
        .map(|(_, p)| *p)
}

#[test]
fn cutoff_detection_flags_boundaries() {
    assert!(near_cutoff([0.9, 0.5, 0.3, 1.0]));
    assert!(near_cutoff([0.5, 0.1, 0.3, 1.0]));
    assert!(near_cutoff([0.5, 0.5, 0.3, 1.0]));
    assert!(!near_cutoff([0.6, 0.4, 0.2, 1.0]));
}

#[test]
fn unedited_render_is_exact() {
    let input = ramp(33, 17);
    assert_eq!(cpu_render(&input, &EditState::default()), *input);
}

#[test]
fn exposure_doubles_quarter_grey() {
    let input = Arc::new(ImageBuffer::filled(4, 4, [0.25, 0.25, 0.25, 1.0]).unwrap());
    let mut edits = EditState::default();
    edits.adjustments.exposure = 1.0;
    let out = cpu_render(&input, &edits);
    for p in &out.pixels {
        for ch in 0..3 {
            assert!((p[ch] - 0.5).abs() < 1e-6, "got {p:?}");
        }
        assert_eq!(p[3], 1.0);
    }
}

#[test]
fn exposure_up_then_down_round_trips() {
    let input = Arc::new(ImageBuffer::filled(2, 2, [0.1, 0.3, 0.45, 1.0]).unwrap());
    let mut up = EditState::default();
    up.adjustments.exposure = 1.0;
    let mut down = EditState::default();
    down.adjustments.exposure = -1.0;
    let brighter = Arc::new(cpu_render(&input, &up));
    let back = cpu_render(&brighter, &down);
    for (a, b) in back.pixels.iter().zip(&input.pixels) {
        for ch in 0..4 {
            assert!((a[ch] - b[ch]).abs() < 1e-6);
        }
    }
}

#[test]
fn draft_render_is_smaller() {
    let input = ramp(64, 40);
    let out = RenderExecutor::new(0.25)
        .render(
            RenderSource::Decoded(input),
            &EditState::default(),
            RenderQuality::Draft { scale: 0.5 },
        )
        .unwrap()
        .unwrap();
    assert_eq!((out.image.width, out.image.height), (32, 20));
}

#[test]
fn gpu_matches_cpu() {
    let gpu = match pollster::block_on(GpuPipeline::new()) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("skipping GPU conformance: {e}");
            return;
        }
    };
    let executor = RenderExecutor::with_gpu(Arc::new(gpu), 0.25);
    let input = ramp(70, 45);
    let tolerance = 1.0 / 255.0;

    for (name, edits) in scenarios() {
        let cpu = cpu_render(&input, &edits);
        let out = executor
            .render(RenderSource::Decoded(input.clone()), &edits, RenderQuality::Full)
            .unwrap()
            .unwrap();
        assert_eq!(out.strategy, "gpu", "{name}: GPU strategy was dropped");
        assert_eq!((out.image.width, out.image.height), (cpu.width, cpu.height));

        // Every stage in these scenarios is continuous
        let bad: Vec<_> = outliers(&out.image, &cpu, &input, tolerance).collect();
        assert!(bad.is_empty(), "{name}: {} pixels differ, first {:?}", bad.len(), bad[0]);
    }

    // Hard cutoffs may flip, but only for pixels sitting on the boundary
    let edits = cutoff_edits();
    let cpu = cpu_render(&input, &edits);
    let out = executor
        .render(RenderSource::Decoded(input.clone()), &edits, RenderQuality::Full)
        .unwrap()
        .unwrap();
    for p in outliers(&out.image, &cpu, &input, tolerance) {
        assert!(near_cutoff(p), "cutoffs: pixel {p:?} differs away from any cutoff");
    }
}
