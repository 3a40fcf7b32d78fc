/// Real-time histogram for exposure feedback
///
/// Per-channel (R, G, B, luminance) 256-bin counts plus shadow/highlight
/// clipping flags. Computed from scratch for every buffer; accumulation is a
/// pure reduction, so large buffers are split across threads and the partial
/// histograms merged.

use rayon::prelude::*;

use crate::buffer::ImageBuffer;
use crate::color::{luminance, LUMA_WEIGHTS};

pub const BINS: usize = 256;

/// Pixels per parallel chunk
const CHUNK_PIXELS: usize = 16 * 1024;

/// Which colour channels clipped at one end of the range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClippedChannels {
    pub r: bool,
    pub g: bool,
    pub b: bool,
}

/// Colour used to draw a clipping indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipIndicator {
    None,
    /// All three channels clipped
    White,
    // Two channels clipped: the secondary they mix to
    Yellow,
    Magenta,
    Cyan,
    // One channel clipped
    Red,
    Green,
    Blue,
}

impl ClippedChannels {
    pub fn any(&self) -> bool {
        self.r || self.g || self.b
    }

    pub fn indicator(&self) -> ClipIndicator {
        match (self.r, self.g, self.b) {
            (true, true, true) => ClipIndicator::White,
            (true, true, false) => ClipIndicator::Yellow,
            (true, false, true) => ClipIndicator::Magenta,
            (false, true, true) => ClipIndicator::Cyan,
            (true, false, false) => ClipIndicator::Red,
            (false, true, false) => ClipIndicator::Green,
            (false, false, true) => ClipIndicator::Blue,
            (false, false, false) => ClipIndicator::None,
        }
    }
}

/// Histogram data structure
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub red: [u32; BINS],
    pub green: [u32; BINS],
    pub blue: [u32; BINS],
    pub luminance: [u32; BINS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            red: [0; BINS],
            green: [0; BINS],
            blue: [0; BINS],
            luminance: [0; BINS],
        }
    }
}

/// Bin for a channel value: `floor(clamp(v, 0, 1) * 255)`
#[inline]
pub fn bin_for(value: f32) -> usize {
    ((value.clamp(0.0, 1.0) * 255.0).floor() as usize).min(BINS - 1)
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate a floating point buffer
    pub fn from_buffer(buffer: &ImageBuffer) -> Self {
        buffer
            .pixels
            .par_chunks(CHUNK_PIXELS)
            .fold(Histogram::new, |mut hist, chunk| {
                for p in chunk {
                    hist.add(p[0], p[1], p[2]);
                }
                hist
            })
            .reduce(Histogram::new, |mut a, b| {
                a.merge(&b);
                a
            })
    }

    /// Accumulate RGBA8 bytes; channel bins are the byte values themselves
    pub fn from_rgba8(bytes: &[u8]) -> Self {
        bytes
            .par_chunks(CHUNK_PIXELS * 4)
            .fold(Histogram::new, |mut hist, chunk| {
                for p in chunk.chunks_exact(4) {
                    hist.red[p[0] as usize] += 1;
                    hist.green[p[1] as usize] += 1;
                    hist.blue[p[2] as usize] += 1;
                    let lum = p[0] as f32 / 255.0 * LUMA_WEIGHTS[0]
                        + p[1] as f32 / 255.0 * LUMA_WEIGHTS[1]
                        + p[2] as f32 / 255.0 * LUMA_WEIGHTS[2];
                    hist.luminance[bin_for(lum)] += 1;
                }
                hist
            })
            .reduce(Histogram::new, |mut a, b| {
                a.merge(&b);
                a
            })
    }

    #[inline]
    fn add(&mut self, r: f32, g: f32, b: f32) {
        self.red[bin_for(r)] += 1;
        self.green[bin_for(g)] += 1;
        self.blue[bin_for(b)] += 1;
        let lum = luminance([r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]);
        self.luminance[bin_for(lum)] += 1;
    }

    /// Add another partial histogram into this one
    pub fn merge(&mut self, other: &Histogram) {
        for i in 0..BINS {
            self.red[i] += other.red[i];
            self.green[i] += other.green[i];
            self.blue[i] += other.blue[i];
            self.luminance[i] += other.luminance[i];
        }
    }

    /// Total samples counted (per channel)
    pub fn total(&self) -> u64 {
        self.red.iter().map(|&c| c as u64).sum()
    }

    /// Find the maximum value across the colour channels for normalization
    pub fn max_value(&self) -> u32 {
        let max_r = self.red.iter().copied().max().unwrap_or(0);
        let max_g = self.green.iter().copied().max().unwrap_or(0);
        let max_b = self.blue.iter().copied().max().unwrap_or(0);
        max_r.max(max_g).max(max_b)
    }

    pub fn shadow_clipping(&self) -> ClippedChannels {
        ClippedChannels {
            r: self.red[0] > 0,
            g: self.green[0] > 0,
            b: self.blue[0] > 0,
        }
    }

    pub fn highlight_clipping(&self) -> ClippedChannels {
        ClippedChannels {
            r: self.red[BINS - 1] > 0,
            g: self.green[BINS - 1] > 0,
            b: self.blue[BINS - 1] > 0,
        }
    }

    pub fn has_shadow_clipping(&self) -> bool {
        self.shadow_clipping().any()
    }

    pub fn has_highlight_clipping(&self) -> bool {
        self.highlight_clipping().any()
    }
}
