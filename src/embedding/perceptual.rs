//! Perceptual fingerprint embedder.
//!
//! Produces a 64-dimensional block-luminance vector that is stable across
//! re-encodes and resolution changes of the same picture. It is cheap, fully
//! deterministic, and doubles as the fallback when the visual model fails.
//!
//! # Algorithm
//!
//! 1. Sniff the container signature (PNG or JPEG) and decode to RGBA
//! 2. Convert to luminance: `0.299 R + 0.587 G + 0.114 B`
//! 3. Nearest-neighbour downsample to 32x32
//! 4. Average each 4x4 block of the 8x8 block grid, scaled to [0, 1]
//! 5. L2-normalize, rounding components to 8 decimals

use super::{Embedding, ImageEmbedder, normalize_rounded};
use crate::models::EmbedderId;
use crate::{Error, Result};
use image::ImageFormat;

/// Dimensionality of a fingerprint vector.
pub const FINGERPRINT_DIMENSIONS: usize = BLOCKS * BLOCKS;

/// Side length of the downsampled luminance grid.
const TARGET_SIZE: usize = 32;

/// Blocks per side.
const BLOCKS: usize = 8;

/// Pixels per block side.
const BLOCK_SIZE: usize = TARGET_SIZE / BLOCKS;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
const JPEG_SIGNATURE: [u8; 2] = [0xff, 0xd8];

/// Deterministic perceptual fingerprinter.
///
/// # Example
///
/// ```rust,ignore
/// use ecotag_cache::embedding::PerceptualFingerprinter;
///
/// let vector = PerceptualFingerprinter::new().fingerprint(&png_bytes)?;
/// assert_eq!(vector.len(), 64);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualFingerprinter;

impl PerceptualFingerprinter {
    /// Creates a new fingerprinter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint vector for encoded image bytes.
    ///
    /// Returns a zero vector for images whose blocks are all black.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if the bytes are not a decodable
    /// PNG or JPEG.
    pub fn fingerprint(&self, image: &[u8]) -> Result<Vec<f32>> {
        let (luma, width, height) = decode_luminance(image)?;
        let grid = resize_nearest(&luma, width, height);
        let blocks = block_means(&grid);
        Ok(normalize_rounded(&blocks).unwrap_or_else(|| vec![0.0; FINGERPRINT_DIMENSIONS]))
    }
}

impl ImageEmbedder for PerceptualFingerprinter {
    fn dimensions(&self) -> Option<usize> {
        Some(FINGERPRINT_DIMENSIONS)
    }

    fn embed(&self, image: &[u8]) -> Result<Embedding> {
        Ok(Embedding::new(EmbedderId::Fingerprint, self.fingerprint(image)?))
    }
}

/// Identifies a supported container from its leading bytes.
#[must_use]
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&JPEG_SIGNATURE) {
        Some(ImageFormat::Jpeg)
    } else {
        None
    }
}

/// Decodes image bytes into a row-major luminance buffer.
fn decode_luminance(bytes: &[u8]) -> Result<(Vec<f64>, usize, usize)> {
    let format = sniff_format(bytes).ok_or_else(|| {
        Error::UnsupportedFormat("byte signature is neither PNG nor JPEG".to_string())
    })?;

    let rgba = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| Error::UnsupportedFormat(format!("{format:?} decode failed: {e}")))?
        .to_rgba8();

    let width = rgba.width() as usize;
    let height = rgba.height() as usize;
    if width == 0 || height == 0 {
        return Err(Error::UnsupportedFormat("image has no pixels".to_string()));
    }

    let luma = rgba
        .pixels()
        .map(|p| {
            0.299 * f64::from(p[0]) + 0.587 * f64::from(p[1]) + 0.114 * f64::from(p[2])
        })
        .collect();

    Ok((luma, width, height))
}

/// Nearest-neighbour resample to a `TARGET_SIZE` square.
fn resize_nearest(src: &[f64], width: usize, height: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(TARGET_SIZE * TARGET_SIZE);
    for y in 0..TARGET_SIZE {
        let src_y = ((y * height) / TARGET_SIZE).min(height - 1);
        for x in 0..TARGET_SIZE {
            let src_x = ((x * width) / TARGET_SIZE).min(width - 1);
            out.push(src[src_y * width + src_x]);
        }
    }
    out
}

/// Mean luminance of each block, scaled to [0, 1], in row-major block order.
#[allow(clippy::cast_precision_loss)]
fn block_means(grid: &[f64]) -> Vec<f64> {
    let divisor = (BLOCK_SIZE * BLOCK_SIZE) as f64 * 255.0;
    let mut means = Vec::with_capacity(FINGERPRINT_DIMENSIONS);
    for by in 0..BLOCKS {
        for bx in 0..BLOCKS {
            let mut sum = 0.0;
            for y in 0..BLOCK_SIZE {
                let row = (by * BLOCK_SIZE + y) * TARGET_SIZE;
                for x in 0..BLOCK_SIZE {
                    sum += grid[row + bx * BLOCK_SIZE + x];
                }
            }
            means.push(sum / divisor);
        }
    }
    means
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = u8::try_from((x * 255) / width.max(1)).unwrap_or(255);
            let w = u8::try_from((y * 255) / height.max(1)).unwrap_or(255);
            Rgb([v, w, v / 2])
        })
    }

    fn norm(v: &[f32]) -> f64 {
        v.iter()
            .map(|x| f64::from(*x) * f64::from(*x))
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_64_dims() {
        let png = encode(&gradient(64, 48), ImageFormat::Png);
        let fp = PerceptualFingerprinter::new();
        let a = fp.fingerprint(&png).unwrap();
        let b = fp.fingerprint(&png).unwrap();
        assert_eq!(a.len(), FINGERPRINT_DIMENSIONS);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_is_normalized() {
        let png = encode(&gradient(100, 100), ImageFormat::Png);
        let v = PerceptualFingerprinter::new().fingerprint(&png).unwrap();
        assert!((norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_black_image_yields_zero_vector() {
        let black: RgbImage = ImageBuffer::from_pixel(16, 16, Rgb([0, 0, 0]));
        let v = PerceptualFingerprinter::new()
            .fingerprint(&encode(&black, ImageFormat::Png))
            .unwrap();
        assert_eq!(v.len(), FINGERPRINT_DIMENSIONS);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_uniform_image_has_equal_components() {
        let grey: RgbImage = ImageBuffer::from_pixel(40, 40, Rgb([128, 128, 128]));
        let v = PerceptualFingerprinter::new()
            .fingerprint(&encode(&grey, ImageFormat::Png))
            .unwrap();
        // Every block has the same mean, so each component is 1/sqrt(64).
        for x in &v {
            assert!((f64::from(*x) - 0.125).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resolution_invariance_for_scaled_copy() {
        let small = gradient(32, 32);
        let large = image::imageops::resize(&small, 128, 128, image::imageops::FilterType::Nearest);
        let fp = PerceptualFingerprinter::new();
        let a = fp.fingerprint(&encode(&small, ImageFormat::Png)).unwrap();
        let b = fp.fingerprint(&encode(&large, ImageFormat::Png)).unwrap();
        let sim: f64 = a
            .iter()
            .zip(&b)
            .map(|(x, y)| f64::from(*x) * f64::from(*y))
            .sum();
        assert!(sim > 0.99, "scaled copy similarity was {sim}");
    }

    #[test]
    fn test_jpeg_is_supported() {
        let jpeg = encode(&gradient(50, 30), ImageFormat::Jpeg);
        assert_eq!(sniff_format(&jpeg), Some(ImageFormat::Jpeg));
        let v = PerceptualFingerprinter::new().fingerprint(&jpeg).unwrap();
        assert_eq!(v.len(), FINGERPRINT_DIMENSIONS);
    }

    #[test]
    fn test_unknown_signature_is_unsupported() {
        let result = PerceptualFingerprinter::new().fingerprint(b"GIF89a....");
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_empty_buffer_is_unsupported() {
        let result = PerceptualFingerprinter::new().fingerprint(&[]);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_truncated_png_is_unsupported() {
        let mut png = encode(&gradient(20, 20), ImageFormat::Png);
        png.truncate(24);
        let result = PerceptualFingerprinter::new().fingerprint(&png);
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_embed_reports_fingerprint_id() {
        let png = encode(&gradient(8, 8), ImageFormat::Png);
        let embedding = PerceptualFingerprinter::new().embed(&png).unwrap();
        assert_eq!(embedding.embedder, EmbedderId::Fingerprint);
        assert_eq!(embedding.vector.len(), FINGERPRINT_DIMENSIONS);
    }

    #[test]
    fn test_resize_nearest_picks_expected_source_pixels() {
        // 2x1 source: left half of the grid samples 0, right half samples 1.
        let grid = resize_nearest(&[0.0, 1.0], 2, 1);
        assert_eq!(grid.len(), TARGET_SIZE * TARGET_SIZE);
        assert!(grid[0].abs() < f64::EPSILON);
        assert!((grid[TARGET_SIZE - 1] - 1.0).abs() < f64::EPSILON);
        assert!((grid[TARGET_SIZE / 2] - 1.0).abs() < f64::EPSILON);
    }
}
