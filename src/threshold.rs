//! Candidate masks for marker detection.
//!
//! Fixed thresholding tests each channel against a band. Adaptive thresholding works on
//! the mean of the three channels: a pixel is a candidate when its intensity exceeds the
//! mean intensity of its `window × window` neighbourhood minus an offset. The neighbourhood
//! is clipped at the image border and averaged over the pixels that exist.

use crate::raster::{BACKGROUND, BinaryMask, FOREGROUND, RgbSource};

/// `true` if all three channels lie in `[low, upper]`.
#[inline]
pub fn in_band(rgb: [f32; 3], low: f32, upper: f32) -> bool {
    rgb.iter().all(|&v| v >= low && v <= upper)
}

/// Mean of the three channels, the intensity used by adaptive thresholding.
#[inline]
pub fn intensity(rgb: [f32; 3]) -> f64 {
    (rgb[0] as f64 + rgb[1] as f64 + rgb[2] as f64) / 3.0
}

/// Pixels whose three channels all lie in `[low, upper]`.
pub fn band_threshold<S: RgbSource + ?Sized>(image: &S, low: f32, upper: f32) -> BinaryMask {
    BinaryMask::from_fn(image.n_cols(), image.n_rows(), |x, y| {
        if in_band(image.rgb_at(y, x), low, upper) {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Summed-area table over the channel-mean intensity, with a zero first row and column.
struct IntegralImage {
    sums: Vec<f64>,
    stride: usize,
}

impl IntegralImage {
    fn new<S: RgbSource + ?Sized>(image: &S) -> Self {
        let (rows, cols) = (image.n_rows() as usize, image.n_cols() as usize);
        let stride = cols + 1;
        let mut sums = vec![0.0; (rows + 1) * stride];
        for r in 0..rows {
            let mut row_sum = 0.0;
            for c in 0..cols {
                row_sum += intensity(image.rgb_at(r as u32, c as u32));
                sums[(r + 1) * stride + c + 1] = sums[r * stride + c + 1] + row_sum;
            }
        }
        IntegralImage { sums, stride }
    }

    /// Sum over rows `r0..r1` and cols `c0..c1` (half-open).
    fn sum(&self, r0: usize, r1: usize, c0: usize, c1: usize) -> f64 {
        let s = self.stride;
        self.sums[r1 * s + c1] - self.sums[r0 * s + c1] - self.sums[r1 * s + c0]
            + self.sums[r0 * s + c0]
    }
}

/// Local-mean thresholding: foreground where `intensity > local_mean - offset`.
///
/// `window` is the side of the square neighbourhood and should be odd; an even value
/// behaves like the next odd one.
pub fn adaptive_threshold<S: RgbSource + ?Sized>(
    image: &S,
    window: u32,
    offset: f32,
) -> BinaryMask {
    let (rows, cols) = (image.n_rows() as usize, image.n_cols() as usize);
    let integral = IntegralImage::new(image);
    let half = (window / 2) as usize;
    let offset = offset as f64;

    BinaryMask::from_fn(image.n_cols(), image.n_rows(), |x, y| {
        let (r, c) = (y as usize, x as usize);
        let r0 = r.saturating_sub(half);
        let r1 = (r + half + 1).min(rows);
        let c0 = c.saturating_sub(half);
        let c1 = (c + half + 1).min(cols);
        let count = ((r1 - r0) * (c1 - c0)) as f64;
        let local_mean = integral.sum(r0, r1, c0, c1) / count;
        if intensity(image.rgb_at(y, x)) > local_mean - offset {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Foreground where both masks are foreground.
pub fn intersect(a: &BinaryMask, b: &BinaryMask) -> BinaryMask {
    BinaryMask::from_fn(a.width(), a.height(), |x, y| {
        if a.get_pixel(x, y).0[0] != 0 && b.get_pixel(x, y).0[0] != 0 {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}
