/// Sequential CPU strategy; the reference the GPU path must match.

use tracing::trace;

use super::{PixelPipeline, PreparedEdits, RenderState, RenderTicket};
use crate::buffer::ImageBuffer;
use crate::color::{apply_adjustments, clamp_unit};
use crate::error::Result;
use crate::state::mask::Point;

/// Rows processed between cancellation checks
const ROWS_PER_CHECK: u32 = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuPipeline;

impl CpuPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl PixelPipeline for CpuPipeline {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn process(
        &self,
        input: &ImageBuffer,
        edits: &PreparedEdits,
        ticket: &RenderTicket,
    ) -> Result<Option<ImageBuffer>> {
        let mut out = input.clone();
        let width = out.width as usize;

        if !ticket.enter(RenderState::Adjusting) {
            return Ok(None);
        }
        for p in out.pixels.iter_mut() {
            let rgb = apply_adjustments([p[0], p[1], p[2]], &edits.adjustments);
            p[..3].copy_from_slice(&rgb);
        }

        if !ticket.enter(RenderState::ToneCurve) {
            return Ok(None);
        }
        if let Some(lut) = &edits.lut {
            for p in out.pixels.iter_mut() {
                let rgb = lut.apply([p[0], p[1], p[2]]);
                p[..3].copy_from_slice(&rgb);
            }
        }

        if !ticket.enter(RenderState::Masking) {
            return Ok(None);
        }
        if !edits.masks.is_empty() {
            for y in 0..out.height {
                if y % ROWS_PER_CHECK == 0 && !ticket.is_current() {
                    return Ok(None);
                }
                let row = y as usize * width;
                for x in 0..out.width {
                    let (nx, ny) = out.normalized(x, y);
                    let p = &mut out.pixels[row + x as usize];
                    let rgb = clamp_unit(edits.masks.apply([p[0], p[1], p[2]], Point::new(nx, ny)));
                    p[..3].copy_from_slice(&rgb);
                }
            }
        }

        trace!(pixels = out.pixel_count(), masks = edits.masks.len(), "cpu pass complete");
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurvePoint;
    use crate::pipeline::RenderExecutor;
    use crate::state::edit::{AdjustmentSet, EditState};
    use crate::state::mask::{LinearGradient, MaskShape};

    fn run(input: &ImageBuffer, state: &EditState) -> ImageBuffer {
        let executor = RenderExecutor::new(0.25);
        let ticket = executor.begin();
        let edits = PreparedEdits::from_state(state).unwrap();
        CpuPipeline::new().process(input, &edits, &ticket).unwrap().unwrap()
    }

    #[test]
    fn test_unedited_is_bit_exact() {
        let pixels = (0..64).map(|i| {
            let v = i as f32 / 63.0;
            [v, 1.0 - v, v * 0.5, 0.5]
        });
        let input = ImageBuffer::new(8, 8, pixels.collect()).unwrap();
        assert_eq!(run(&input, &EditState::default()), input);
    }

    #[test]
    fn test_alpha_passes_through() {
        let input = ImageBuffer::filled(3, 3, [0.4, 0.4, 0.4, 0.3]).unwrap();
        let mut state = EditState::default();
        state.adjustments.exposure = 2.0;
        state.adjustments.saturation = -50.0;
        let out = run(&input, &state);
        assert!(out.pixels.iter().all(|p| p[3] == 0.3));
        assert!(out.pixels.iter().all(|p| p[0] == 1.0));
    }

    #[test]
    fn test_curve_applies_after_adjustments() {
        let input = ImageBuffer::filled(2, 2, [0.25, 0.25, 0.25, 1.0]).unwrap();
        let mut state = EditState::default();
        state.adjustments.exposure = 1.0;
        state
            .tone_curve
            .set_points(vec![
                CurvePoint::new(0.0, 0.0),
                CurvePoint::new(0.5, 0.8),
                CurvePoint::new(1.0, 1.0),
            ])
            .unwrap();
        let out = run(&input, &state);
        // 0.25 -> 0.5 by exposure, then 0.5 -> 0.8 by the curve
        assert!((out.pixels[0][0] - 0.8).abs() < 1.0 / 255.0);
    }

    #[test]
    fn test_mask_only_affects_covered_half() {
        let input = ImageBuffer::filled(4, 1, [0.2, 0.2, 0.2, 1.0]).unwrap();
        let mut state = EditState::default();
        state
            .add_mask(
                MaskShape::Linear(LinearGradient {
                    start: Point::new(0.0, 0.5),
                    end: Point::new(1.0, 0.5),
                    feather: 0.0,
                }),
                AdjustmentSet::with_exposure(1.0),
            )
            .unwrap();
        let out = run(&input, &state);
        assert!((out.pixels[0][0] - 0.4).abs() < 1e-6);
        assert!((out.pixels[1][0] - 0.4).abs() < 1e-6);
        assert_eq!(out.pixels[2][0], 0.2);
        assert_eq!(out.pixels[3][0], 0.2);
    }

    #[test]
    fn test_superseded_ticket_stops_work() {
        let executor = RenderExecutor::new(0.25);
        let ticket = executor.begin();
        executor.begin();
        let input = ImageBuffer::filled(2, 2, [0.5, 0.5, 0.5, 1.0]).unwrap();
        let edits = PreparedEdits::from_state(&EditState::default()).unwrap();
        assert!(CpuPipeline::new().process(&input, &edits, &ticket).unwrap().is_none());
    }
}
