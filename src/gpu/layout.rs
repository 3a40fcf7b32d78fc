/// GPU-friendly parameter blocks
///
/// Each struct must match the WGSL struct of the same shape in
/// `shaders.rs` byte for byte (std140/std430 rules: vec2 aligns to 8,
/// uniform blocks round up to 16).

use crate::gradient::MaskStack;
use crate::state::edit::AdjustmentSet;
use crate::state::mask::{MaskShape, MAX_MASKS_PER_KIND};

/// Adjustment scalars in canonical order, padded to 48 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuAdjustments {
    pub temperature: f32,
    pub tint: f32,
    pub exposure: f32,
    pub contrast: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub whites: f32,
    pub blacks: f32,
    pub vibrance: f32,
    pub saturation: f32,
    padding0: f32, // For 16-byte alignment
    padding1: f32,
}

impl From<&AdjustmentSet> for GpuAdjustments {
    fn from(adj: &AdjustmentSet) -> Self {
        Self {
            temperature: adj.temperature,
            tint: adj.tint,
            exposure: adj.exposure,
            contrast: adj.contrast,
            highlights: adj.highlights,
            shadows: adj.shadows,
            whites: adj.whites,
            blacks: adj.blacks,
            vibrance: adj.vibrance,
            saturation: adj.saturation,
            padding0: 0.0,
            padding1: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLinearMask {
    pub start: [f32; 2],
    pub end: [f32; 2],
    pub feather: f32,
    pub enabled: u32,
    padding0: f32,
    padding1: f32,
    pub adj: GpuAdjustments,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuRadialMask {
    pub center: [f32; 2],
    /// (radius_x, radius_y)
    pub radius: [f32; 2],
    pub rotation: f32,
    pub feather: f32,
    pub invert: u32,
    pub enabled: u32,
    pub adj: GpuAdjustments,
}

/// Storage block holding every mask, linear group first
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMaskParams {
    pub linear_count: u32,
    pub radial_count: u32,
    padding0: u32,
    padding1: u32,
    pub linear: [GpuLinearMask; MAX_MASKS_PER_KIND],
    pub radial: [GpuRadialMask; MAX_MASKS_PER_KIND],
}

impl From<&MaskStack> for GpuMaskParams {
    fn from(stack: &MaskStack) -> Self {
        let mut params: GpuMaskParams = bytemuck::Zeroable::zeroed();
        for (shape, adj) in stack.layers() {
            match shape {
                MaskShape::Linear(m) => {
                    let i = params.linear_count as usize;
                    if i >= MAX_MASKS_PER_KIND {
                        continue;
                    }
                    params.linear[i] = GpuLinearMask {
                        start: [m.start.x, m.start.y],
                        end: [m.end.x, m.end.y],
                        feather: m.feather,
                        enabled: !adj.is_zero() as u32,
                        padding0: 0.0,
                        padding1: 0.0,
                        adj: adj.into(),
                    };
                    params.linear_count += 1;
                }
                MaskShape::Radial(m) => {
                    let i = params.radial_count as usize;
                    if i >= MAX_MASKS_PER_KIND {
                        continue;
                    }
                    params.radial[i] = GpuRadialMask {
                        center: [m.center.x, m.center.y],
                        radius: [m.radius_x, m.radius_y],
                        rotation: m.rotation,
                        feather: m.feather,
                        invert: m.invert as u32,
                        enabled: !adj.is_zero() as u32,
                        adj: adj.into(),
                    };
                    params.radial_count += 1;
                }
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::edit::EditState;
    use crate::state::mask::{LinearGradient, Point, RadialGradient};

    #[test]
    fn test_struct_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<GpuAdjustments>(), 48);
        assert_eq!(std::mem::size_of::<GpuLinearMask>(), 80);
        assert_eq!(std::mem::size_of::<GpuRadialMask>(), 80);
        assert_eq!(std::mem::size_of::<GpuMaskParams>(), 16 + 8 * 80 * 2);
    }

    #[test]
    fn test_adjustments_keep_canonical_order() {
        let adj = AdjustmentSet {
            temperature: 1.0,
            tint: 2.0,
            exposure: 3.0,
            contrast: 4.0,
            highlights: 5.0,
            shadows: 6.0,
            whites: 7.0,
            blacks: 8.0,
            vibrance: 9.0,
            saturation: 10.0,
        };
        let gpu = GpuAdjustments::from(&adj);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&gpu));
        assert_eq!(&floats[..10], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_mask_params_split_by_kind() {
        let mut state = EditState::default();
        let radial = RadialGradient {
            center: Point::new(0.5, 0.5),
            radius_x: 0.3,
            radius_y: 0.2,
            rotation: 0.1,
            feather: 0.4,
            invert: true,
        };
        let linear = LinearGradient {
            start: Point::new(0.0, 0.0),
            end: Point::new(0.0, 1.0),
            feather: 0.2,
        };
        state
            .add_mask(MaskShape::Radial(radial), AdjustmentSet::with_exposure(0.5))
            .unwrap();
        state
            .add_mask(MaskShape::Linear(linear), AdjustmentSet::with_exposure(-0.5))
            .unwrap();

        let params = GpuMaskParams::from(&MaskStack::from_state(&state));
        assert_eq!((params.linear_count, params.radial_count), (1, 1));
        assert_eq!(params.linear[0].end, [0.0, 1.0]);
        assert_eq!(params.linear[0].adj.exposure, -0.5);
        assert_eq!(params.radial[0].radius, [0.3, 0.2]);
        assert_eq!(params.radial[0].invert, 1);
        assert_eq!(params.radial[0].enabled, 1);
    }
}
