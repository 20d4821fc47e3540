use image::{Rgb, Rgb32FImage};

use crate::raster::{RgbSource, to_rgb32f};
use crate::sampling::{bilinear, render_rgb};

/// Slack for canvas sizing so that e.g. a quarter turn does not grow the canvas by a pixel
/// because `cos(90°)` is not exactly zero.
const SIZE_EPSILON: f64 = 1e-6;

/// Size of the canvas that holds a `width × height` image rotated by `radians`.
pub fn rotated_canvas_size(width: u32, height: u32, radians: f64) -> (u32, u32) {
    let (sin, cos) = radians.sin_cos();
    let (w, h) = (width as f64, height as f64);
    let new_w = w * cos.abs() + h * sin.abs();
    let new_h = w * sin.abs() + h * cos.abs();
    (
        (new_w - SIZE_EPSILON).ceil().max(1.0) as u32,
        (new_h - SIZE_EPSILON).ceil().max(1.0) as u32,
    )
}

/// Rotates an image about its centre, clockwise on screen for positive `degrees`.
///
/// The canvas grows to hold all four rotated corners, so nothing is clipped. Output pixels
/// are inverse-rotated into the source and bilinearly interpolated; pixels that map outside
/// the source get `fill`. Whole turns return an unchanged copy.
pub fn rotate_bilinear<S: RgbSource + ?Sized>(image: &S, degrees: f64, fill: Rgb<f32>) -> Rgb32FImage {
    let (width, height) = (image.n_cols(), image.n_rows());
    if width == 0 || height == 0 || degrees.rem_euclid(360.0) == 0.0 {
        return to_rgb32f(image);
    }

    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();
    let (out_w, out_h) = rotated_canvas_size(width, height, radians);

    let src_center = ((height as f64 - 1.0) / 2.0, (width as f64 - 1.0) / 2.0);
    let dst_center = ((out_h as f64 - 1.0) / 2.0, (out_w as f64 - 1.0) / 2.0);

    render_rgb(out_w, out_h, |row, col| {
        // With rows pointing down, x' = x cos - y sin, y' = x sin + y cos turns clockwise;
        // apply the transpose to go from output back to source.
        let dy = row as f64 - dst_center.0;
        let dx = col as f64 - dst_center.1;
        let sx = dx * cos + dy * sin;
        let sy = -dx * sin + dy * cos;
        bilinear(image, src_center.0 + sy, src_center.1 + sx)
            .map(Rgb)
            .unwrap_or(fill)
    })
}
