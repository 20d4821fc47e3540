//! Image and mask representations shared by every module.
//!
//! Color images are read through the [`RgbSource`] trait so that detection and resampling
//! accept both floating point buffers and plain 8-bit photographs. Binary masks are
//! [`GrayImage`]s: `0` is background and any non-zero value is foreground. Masks produced
//! by this crate always use `255` for foreground so they can be fed straight into
//! [imageproc] routines.

use image::{GrayImage, Luma, Rgb, Rgb32FImage, RgbImage};

/// A boolean grid, `0` = false, non-zero = true.
pub type BinaryMask = GrayImage;

/// Foreground value written by every mask-producing function.
pub const FOREGROUND: Luma<u8> = Luma([255]);

/// Background value of a [`BinaryMask`].
pub const BACKGROUND: Luma<u8> = Luma([0]);

/// Neutral gray written wherever a resampled image has no source data.
///
/// Gray rather than black so that "no data" stays distinguishable from a valid dark pixel.
pub const PLACEHOLDER: Rgb<f32> = Rgb([0.5, 0.5, 0.5]);

/// Read access to a three channel image addressed by `(row, col)`.
///
/// Channel values are nominally in `[0, 1]` but are not required to be clamped.
pub trait RgbSource: Sync {
    /// Number of pixel rows (image height).
    fn n_rows(&self) -> u32;

    /// Number of pixel columns (image width).
    fn n_cols(&self) -> u32;

    /// The three channels of the pixel at `(row, col)`.
    ///
    /// Callers guarantee `row < self.n_rows()` and `col < self.n_cols()`.
    fn rgb_at(&self, row: u32, col: u32) -> [f32; 3];
}

impl RgbSource for Rgb32FImage {
    fn n_rows(&self) -> u32 {
        self.height()
    }

    fn n_cols(&self) -> u32 {
        self.width()
    }

    fn rgb_at(&self, row: u32, col: u32) -> [f32; 3] {
        self.get_pixel(col, row).0
    }
}

impl RgbSource for RgbImage {
    fn n_rows(&self) -> u32 {
        self.height()
    }

    fn n_cols(&self) -> u32 {
        self.width()
    }

    fn rgb_at(&self, row: u32, col: u32) -> [f32; 3] {
        let [r, g, b] = self.get_pixel(col, row).0;
        [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
    }
}

/// Returns `true` if the mask pixel at `(row, col)` is foreground.
///
/// Out of range coordinates are background.
#[inline]
pub fn mask_at(mask: &BinaryMask, row: i64, col: i64) -> bool {
    if row < 0 || col < 0 || row >= mask.height() as i64 || col >= mask.width() as i64 {
        return false;
    }
    mask.get_pixel(col as u32, row as u32).0[0] != 0
}

/// Number of foreground pixels in a mask.
pub fn count_foreground(mask: &BinaryMask) -> usize {
    mask.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Converts any [`RgbSource`] into an owned floating point image.
pub fn to_rgb32f<S: RgbSource + ?Sized>(source: &S) -> Rgb32FImage {
    Rgb32FImage::from_fn(source.n_cols(), source.n_rows(), |x, y| Rgb(source.rgb_at(y, x)))
}
