//! Binary morphology with a square `(2k+1)×(2k+1)` structuring element.
//!
//! A square element of radius `k` is the Chebyshev (L∞) ball, so the operations delegate to
//! the distance-transform based [imageproc::morphology] routines with [`Norm::LInf`]. Those
//! treat everything outside the image as "no pixel at all"; erosion here must treat the
//! outside as background instead, so [`erode`] pads the mask with a one pixel background
//! frame before eroding and crops it away afterwards.
//!
//! Every function returns a new mask; a radius `k <= 0` returns an unchanged copy. Large
//! radii are applied in several passes.

use image::imageops;
use imageproc::distance_transform::Norm;
use imageproc::morphology as improc;

use crate::raster::{BACKGROUND, BinaryMask};

/// Largest radius of a single [improc] pass.
///
/// Distances there saturate at 255 (or at `width + height` for an empty mask), so every
/// radius must stay strictly below that value.
const MAX_PASS: u32 = 254;

/// Splits radius `k` into passes of at most [`MAX_PASS`].
///
/// A square of radius `a + b` is a square of radius `a` grown by `b`, so running the passes
/// in sequence is exact. Radii beyond the longest image side change nothing further and are
/// cut down to it first.
fn passes(k: i32, width: u32, height: u32) -> Vec<u8> {
    if k <= 0 || width == 0 || height == 0 {
        return Vec::new();
    }
    let mut left = (k as u32).min(width.max(height));
    let mut out = Vec::new();
    while left > 0 {
        let step = left.min(MAX_PASS);
        out.push(step as u8);
        left -= step;
    }
    out
}

/// Sets a pixel if any pixel within Chebyshev distance `k` is set.
///
/// Neighbours outside the image are skipped.
pub fn dilate(mask: &BinaryMask, k: i32) -> BinaryMask {
    let (width, height) = mask.dimensions();
    passes(k, width, height)
        .into_iter()
        .fold(mask.clone(), |acc, step| improc::dilate(&acc, Norm::LInf, step))
}

/// Keeps a pixel only if every pixel within Chebyshev distance `k` is set.
///
/// Neighbours outside the image count as background, so erosion always eats into the border.
pub fn erode(mask: &BinaryMask, k: i32) -> BinaryMask {
    let (width, height) = mask.dimensions();
    passes(k, width, height).into_iter().fold(mask.clone(), |acc, step| {
        let mut padded = BinaryMask::from_pixel(width + 2, height + 2, BACKGROUND);
        imageops::replace(&mut padded, &acc, 1, 1);
        let eroded = improc::erode(&padded, Norm::LInf, step);
        imageops::crop_imm(&eroded, 1, 1, width, height).to_image()
    })
}

/// Dilation followed by erosion: fills gaps narrower than the element.
pub fn close(mask: &BinaryMask, k: i32) -> BinaryMask {
    if k <= 0 {
        return mask.clone();
    }
    erode(&dilate(mask, k), k)
}

/// Erosion followed by dilation: removes specks smaller than the element.
pub fn open(mask: &BinaryMask, k: i32) -> BinaryMask {
    if k <= 0 {
        return mask.clone();
    }
    dilate(&erode(mask, k), k)
}
