//! Offset computation for the slide challenge.
//!
//! The server hands back a shaded background and a cutout piece; the piece
//! must be dragged to the x position where it was cut from. Matching runs on
//! edge maps rather than raw pixels because the shade layer darkens the
//! target notch without changing its outline.

use image::{GrayImage, Luma, RgbaImage};
use thiserror::Error;

/// Gradient magnitude at or above this value counts as an edge.
const EDGE_THRESHOLD: f64 = 128.0;

/// Alpha at or above this value counts as opaque when cropping the cutout.
const ALPHA_FLOOR: u8 = 16;

/// Correlation peaks below this score are reported as degraded; the offset
/// is still returned because the upstream check tolerates small errors.
pub const CONFIDENCE_FLOOR: f32 = 0.4;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("failed to decode challenge image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("cutout image has no opaque pixels")]
    EmptyCutout,

    #[error("cutout is larger than the background")]
    CutoutTooLarge,
}

/// Result of one offset computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    /// Horizontal pixel offset of the best correlation peak.
    pub offset: u32,
    /// Peak normalized cross-correlation score, clamped to `[0, 1]`.
    pub confidence: f32,
}

impl SolveReport {
    /// True when the peak score fell below [`CONFIDENCE_FLOOR`].
    pub fn is_degraded(&self) -> bool {
        self.confidence < CONFIDENCE_FLOOR
    }
}

/// Compute the slide offset for a background/cutout image pair.
///
/// The cutout is cropped to the tight bounding box of its opaque region
/// (the delivered asset pads the piece with transparent margin that would
/// bias matching), both images are reduced to thresholded gradient edge
/// maps, and the cutout map is template-matched against the background map
/// by normalized cross-correlation. The x coordinate of the best peak is
/// the offset.
pub fn solve(background: &[u8], cutout: &[u8]) -> Result<SolveReport, VisionError> {
    let bg = image::load_from_memory(background)?.to_luma8();
    let piece = image::load_from_memory(cutout)?.to_rgba8();

    let (x, y, w, h) = opaque_bounds(&piece).ok_or(VisionError::EmptyCutout)?;
    let cropped = image::imageops::crop_imm(&piece, x, y, w, h).to_image();

    let bg_edges = edge_map(&bg);
    let piece_edges = edge_map(&luma_of_rgba(&cropped));

    let (offset, confidence) = best_match(&bg_edges, &piece_edges)?;
    Ok(SolveReport { offset, confidence })
}

/// Tight bounding box `(x, y, w, h)` of the opaque region, if any.
fn opaque_bounds(img: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = img.dimensions();
    let mut min_x = w;
    let mut min_y = h;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for (x, y, pixel) in img.enumerate_pixels() {
        if pixel.0[3] >= ALPHA_FLOOR {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Grayscale conversion that zeroes transparent pixels.
fn luma_of_rgba(img: &RgbaImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let luma = if a < ALPHA_FLOOR {
            0
        } else {
            (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)) as u8
        };
        out.put_pixel(x, y, Luma([luma]));
    }
    out
}

/// Thresholded Sobel gradient magnitude; edge pixels are 255, the rest 0.
fn edge_map(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    if w < 3 || h < 3 {
        return out;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dx: i32, dy: i32| -> i32 {
                let px = (x as i32 + dx) as u32;
                let py = (y as i32 + dy) as u32;
                i32::from(gray.get_pixel(px, py).0[0])
            };
            let gx = -p(-1, -1) - 2 * p(-1, 0) - p(-1, 1) + p(1, -1) + 2 * p(1, 0) + p(1, 1);
            let gy = -p(-1, -1) - 2 * p(0, -1) - p(1, -1) + p(-1, 1) + 2 * p(0, 1) + p(1, 1);
            let magnitude = f64::from(gx * gx + gy * gy).sqrt();
            if magnitude >= EDGE_THRESHOLD {
                out.put_pixel(x, y, Luma([255]));
            }
        }
    }
    out
}

/// Normalized cross-correlation of `template` against `img`.
///
/// Returns the x coordinate of the best-scoring window and the peak score.
/// Windows with zero variance are skipped; a featureless template yields a
/// zero-confidence best effort rather than an error.
fn best_match(img: &GrayImage, template: &GrayImage) -> Result<(u32, f32), VisionError> {
    let (iw, ih) = img.dimensions();
    let (tw, th) = template.dimensions();
    if tw > iw || th > ih {
        return Err(VisionError::CutoutTooLarge);
    }

    let area = f64::from(tw) * f64::from(th);
    let t_sum: f64 = template.pixels().map(|p| f64::from(p.0[0])).sum();
    let t_mean = t_sum / area;
    let t_norm: f64 = template
        .pixels()
        .map(|p| {
            let d = f64::from(p.0[0]) - t_mean;
            d * d
        })
        .sum();

    if t_norm == 0.0 {
        return Ok((0, 0.0));
    }

    let mut best_x = 0u32;
    let mut best_score = f64::MIN;

    for wy in 0..=(ih - th) {
        for wx in 0..=(iw - tw) {
            let mut w_sum = 0.0f64;
            for ty in 0..th {
                for tx in 0..tw {
                    w_sum += f64::from(img.get_pixel(wx + tx, wy + ty).0[0]);
                }
            }
            let w_mean = w_sum / area;

            let mut cross = 0.0f64;
            let mut w_norm = 0.0f64;
            for ty in 0..th {
                for tx in 0..tw {
                    let iv = f64::from(img.get_pixel(wx + tx, wy + ty).0[0]) - w_mean;
                    let tv = f64::from(template.get_pixel(tx, ty).0[0]) - t_mean;
                    cross += iv * tv;
                    w_norm += iv * iv;
                }
            }
            if w_norm == 0.0 {
                continue;
            }

            let score = cross / (t_norm * w_norm).sqrt();
            if score > best_score {
                best_score = score;
                best_x = wx;
            }
        }
    }

    if best_score == f64::MIN {
        return Ok((0, 0.0));
    }
    Ok((best_x, best_score.clamp(0.0, 1.0) as f32))
}
