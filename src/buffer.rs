/// Floating point RGBA pixel buffer shared by both pipeline strategies.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};

use crate::error::{Error, Result};

/// One RGBA pixel, channels nominally in 0..1
pub type Rgba = [f32; 4];

/// Row-major RGBA image, `width * height` pixels
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Rgba>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, pixels: Vec<Rgba>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidImage(format!("empty image {}x{}", width, height)));
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(Error::InvalidImage(format!(
                "{}x{} image needs {} pixels, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    /// Solid colour image, mostly for tests
    pub fn filled(width: u32, height: u32, pixel: Rgba) -> Result<Self> {
        Self::new(width, height, vec![pixel; width as usize * height as usize])
    }

    /// Wrap decoded RGBA8 bytes (stride = width * 4)
    pub fn from_rgba8(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(Error::InvalidImage(format!(
                "{}x{} RGBA8 needs {} bytes, got {}",
                width,
                height,
                expected,
                bytes.len()
            )));
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|p| {
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                    p[3] as f32 / 255.0,
                ]
            })
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn from_image(image: &RgbaImage) -> Result<Self> {
        Self::from_rgba8(image.width(), image.height(), image.as_raw())
    }

    /// Decode an encoded image (JPEG, PNG, ...) into a buffer
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Self::from_image(&decoded.to_rgba8())
    }

    /// Quantize to RGBA8, rounding to nearest
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for p in &self.pixels {
            for v in p {
                out.push((v.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
        out
    }

    pub fn to_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.to_rgba8())
            .ok_or_else(|| Error::InvalidImage("buffer size mismatch".into()))
    }

    /// Encode as baseline JPEG; alpha is dropped
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgb = DynamicImage::ImageRgba8(self.to_image()?).to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
        Ok(out)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.to_image()?
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(out)
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Normalized coordinates of a pixel centre
    #[inline]
    pub fn normalized(&self, x: u32, y: u32) -> (f32, f32) {
        (
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }

    /// Area-average over `n x n` blocks; edge blocks average what they cover.
    pub fn downsample_box(&self, n: u32) -> ImageBuffer {
        if n <= 1 {
            return self.clone();
        }
        let out_w = self.width.div_ceil(n);
        let out_h = self.height.div_ceil(n);
        let mut pixels = Vec::with_capacity(out_w as usize * out_h as usize);
        for by in 0..out_h {
            for bx in 0..out_w {
                let x0 = bx * n;
                let y0 = by * n;
                let x1 = (x0 + n).min(self.width);
                let y1 = (y0 + n).min(self.height);
                let mut sum = [0.0_f32; 4];
                for y in y0..y1 {
                    let row = (y * self.width) as usize;
                    for x in x0..x1 {
                        let p = self.pixels[row + x as usize];
                        for ch in 0..4 {
                            sum[ch] += p[ch];
                        }
                    }
                }
                let count = ((x1 - x0) * (y1 - y0)) as f32;
                pixels.push(sum.map(|s| s / count));
            }
        }
        ImageBuffer {
            width: out_w,
            height: out_h,
            pixels,
        }
    }

    /// Shrink so the longest edge is at most `max_edge` (Lanczos3).
    /// Images already small enough are returned unchanged.
    pub fn resize_to_fit(&self, max_edge: u32) -> Result<ImageBuffer> {
        if self.width.max(self.height) <= max_edge {
            return Ok(self.clone());
        }
        let image = self.to_image()?;
        let resized = DynamicImage::ImageRgba8(image)
            .resize(max_edge, max_edge, FilterType::Lanczos3)
            .to_rgba8();
        Self::from_image(&resized)
    }
}

/// Block size used by the draft downsample for a given scale
pub fn draft_block_size(scale: f32) -> u32 {
    if scale >= 1.0 || scale <= 0.0 {
        return 1;
    }
    (1.0 / scale).round().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_round_trip_is_lossless() {
        let bytes: Vec<u8> = (0..=255u8).flat_map(|v| [v, 255 - v, v / 2, 255]).collect();
        let buffer = ImageBuffer::from_rgba8(16, 16, &bytes).unwrap();
        assert_eq!(buffer.to_rgba8(), bytes);
    }

    #[test]
    fn test_rejects_mismatched_sizes() {
        assert!(ImageBuffer::from_rgba8(2, 2, &[0; 15]).is_err());
        assert!(ImageBuffer::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn test_downsample_box_averages_blocks() {
        let pixels = vec![
            [0.0, 0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
        ];
        let buffer = ImageBuffer::new(2, 2, pixels).unwrap();
        let small = buffer.downsample_box(2);
        assert_eq!((small.width, small.height), (1, 1));
        assert_eq!(small.pixels[0], [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_downsample_partial_edge_blocks() {
        let buffer = ImageBuffer::filled(5, 3, [0.2, 0.4, 0.6, 1.0]).unwrap();
        let small = buffer.downsample_box(2);
        assert_eq!((small.width, small.height), (3, 2));
        for p in &small.pixels {
            assert!((p[0] - 0.2).abs() < 1e-6 && (p[2] - 0.6).abs() < 1e-6);
        }
    }

    #[test]
    fn test_draft_block_size() {
        assert_eq!(draft_block_size(0.25), 4);
        assert_eq!(draft_block_size(0.5), 2);
        assert_eq!(draft_block_size(1.0), 1);
    }

    #[test]
    fn test_encoders_produce_decodable_bytes() {
        let buffer = ImageBuffer::filled(8, 4, [0.2, 0.4, 0.6, 1.0]).unwrap();
        let png = ImageBuffer::decode(&buffer.encode_png().unwrap()).unwrap();
        assert_eq!(png, buffer.clone());
        let jpeg = buffer.encode_jpeg(90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = ImageBuffer::decode(&jpeg).unwrap();
        assert_eq!((decoded.width, decoded.height), (8, 4));
        assert!((decoded.pixels[0][1] - 0.4).abs() < 0.05);
    }

    #[test]
    fn test_resize_to_fit_keeps_aspect() {
        let buffer = ImageBuffer::filled(400, 200, [0.5, 0.5, 0.5, 1.0]).unwrap();
        let small = buffer.resize_to_fit(100).unwrap();
        assert_eq!((small.width, small.height), (100, 50));
        let same = buffer.resize_to_fit(1000).unwrap();
        assert_eq!(same.width, 400);
    }
}
