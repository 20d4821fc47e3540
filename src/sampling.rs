//! Bilinear and nearest-pixel sampling at real-valued `(row, col)` positions.
//!
//! A position is *inside* an `H × W` image when it lies within the pixel footprint,
//! `-0.5 <= row <= H - 0.5` and likewise for columns. Inside positions near the border are
//! interpolated with indices clamped to the image, so sampling never reads out of bounds.

use image::{Rgb, Rgb32FImage};
use rayon::prelude::*;

use crate::raster::{BinaryMask, RgbSource};

#[inline]
fn inside(pos: f64, len: u32) -> bool {
    pos >= -0.5 && pos <= len as f64 - 0.5
}

/// Bilinear interpolation of the four pixels around `(row, col)`.
///
/// Returns `None` when the position is outside the image.
pub fn bilinear<S: RgbSource + ?Sized>(image: &S, row: f64, col: f64) -> Option<[f32; 3]> {
    let (rows, cols) = (image.n_rows(), image.n_cols());
    if rows == 0 || cols == 0 || !inside(row, rows) || !inside(col, cols) {
        return None;
    }

    let r = row.clamp(0.0, (rows - 1) as f64);
    let c = col.clamp(0.0, (cols - 1) as f64);
    let r0 = r.floor() as u32;
    let c0 = c.floor() as u32;
    let r1 = (r0 + 1).min(rows - 1);
    let c1 = (c0 + 1).min(cols - 1);
    let fr = (r - r0 as f64) as f32;
    let fc = (c - c0 as f64) as f32;

    let p00 = image.rgb_at(r0, c0);
    let p01 = image.rgb_at(r0, c1);
    let p10 = image.rgb_at(r1, c0);
    let p11 = image.rgb_at(r1, c1);

    let mut out = [0.0f32; 3];
    for ch in 0..3 {
        let top = p00[ch] + (p01[ch] - p00[ch]) * fc;
        let bottom = p10[ch] + (p11[ch] - p10[ch]) * fc;
        out[ch] = top + (bottom - top) * fr;
    }
    Some(out)
}

/// The pixel whose footprint contains `(row, col)`, if any.
#[inline]
pub fn nearest_pixel(rows: u32, cols: u32, row: f64, col: f64) -> Option<(u32, u32)> {
    if rows == 0 || cols == 0 || !inside(row, rows) || !inside(col, cols) {
        return None;
    }
    let r = (row.round() as i64).clamp(0, rows as i64 - 1) as u32;
    let c = (col.round() as i64).clamp(0, cols as i64 - 1) as u32;
    Some((r, c))
}

/// Nearest-pixel mask lookup; outside positions are background.
#[inline]
pub fn nearest_mask(mask: &BinaryMask, row: f64, col: f64) -> bool {
    nearest_pixel(mask.height(), mask.width(), row, col)
        .is_some_and(|(r, c)| mask.get_pixel(c, r).0[0] != 0)
}

/// Builds a `width × height` image row by row in parallel.
///
/// `pixel(row, col)` returns the output value of each pixel.
pub(crate) fn render_rgb<F>(width: u32, height: u32, pixel: F) -> Rgb32FImage
where
    F: Fn(u32, u32) -> Rgb<f32> + Sync,
{
    let mut out = Rgb32FImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }
    out.par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(row, line)| {
            for (col, px) in line.chunks_exact_mut(3).enumerate() {
                px.copy_from_slice(&pixel(row as u32, col as u32).0);
            }
        });
    out
}

/// Mask counterpart of [`render_rgb`].
pub(crate) fn render_mask<F>(width: u32, height: u32, pixel: F) -> BinaryMask
where
    F: Fn(u32, u32) -> u8 + Sync,
{
    let mut out = BinaryMask::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }
    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(row, line)| {
            for (col, px) in line.iter_mut().enumerate() {
                *px = pixel(row as u32, col as u32);
            }
        });
    out
}
