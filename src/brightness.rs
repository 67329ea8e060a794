use image::{ImageBuffer, Luma, RgbImage};

use crate::error::{PrepError, PrepResult};
use crate::types::BoundingBox;

/// Single-channel luminance image in the 0..255 range.
pub type LumaPlane = ImageBuffer<Luma<f32>, Vec<f32>>;

// Keeps log() away from zero-valued pixels.
const EPSILON: f32 = 1e-6;

/// Convert an RGB image to a luminance plane using Rec.601 weights, the
/// same mix the source footage's grayscale statistics were computed with.
pub fn luminance(rgb: &RgbImage) -> LumaPlane {
    let mut plane = LumaPlane::new(rgb.width(), rgb.height());
    for (src, dst) in rgb.pixels().zip(plane.pixels_mut()) {
        let [r, g, b] = src.0;
        dst.0[0] = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    }
    plane
}

/// Log-luminance dynamic-range score of the boxed region, in `[0, 1]` for
/// any region with spread.
///
/// `remove_outliers` clips the 1st/99th percentile tails first so sensor
/// noise and specular highlights do not dominate the range. A region with
/// zero spread has no defined score and yields `DegenerateRegion`; callers
/// treat such regions as non-scorable rather than silently best or worst.
pub fn dynamic_range(
    luma: &LumaPlane,
    bbox: &BoundingBox,
    remove_outliers: bool,
) -> PrepResult<f32> {
    let mut region = region_pixels(luma, bbox);
    if region.is_empty() {
        return Err(PrepError::DegenerateRegion);
    }

    if remove_outliers {
        let mut sorted = region.clone();
        sorted.sort_by(f32::total_cmp);
        let darkest = percentile(&sorted, 1.0);
        let brightest = percentile(&sorted, 99.0);
        for value in &mut region {
            *value = value.clamp(darkest, brightest);
        }
    }

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut log_sum = 0f64;
    for &value in &region {
        min = min.min(value);
        max = max.max(value);
        log_sum += f64::from(value.ln());
    }
    if max <= min {
        return Err(PrepError::DegenerateRegion);
    }

    let log_avg = (log_sum / region.len() as f64) as f32;
    Ok((log_avg - min.ln()) / (max.ln() - min.ln()))
}

// Gather the region's pixels, epsilon-shifted, clipped to the plane bounds.
fn region_pixels(luma: &LumaPlane, bbox: &BoundingBox) -> Vec<f32> {
    if bbox.width <= 0 || bbox.height <= 0 {
        return Vec::new();
    }
    let x0 = bbox.x.max(0) as u32;
    let y0 = bbox.y.max(0) as u32;
    let x1 = ((bbox.x + bbox.width).max(0) as u32).min(luma.width());
    let y1 = ((bbox.y + bbox.height).max(0) as u32).min(luma.height());

    let mut region = Vec::with_capacity(((x1.saturating_sub(x0)) * (y1.saturating_sub(y0))) as usize);
    for y in y0..y1 {
        for x in x0..x1 {
            region.push(luma.get_pixel(x, y).0[0] + EPSILON);
        }
    }
    region
}

// Linear-interpolation percentile over an ascending slice.
fn percentile(sorted: &[f32], pct: f32) -> f32 {
    debug_assert!(!sorted.is_empty());
    let rank = pct / 100.0 * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
