//! Rectified close-ups of a detected marker.
//!
//! The marker's box is resampled along its own edges into an axis-aligned canvas, the long
//! edge running left to right. The basis vectors come straight from corner differences, so
//! no angle is re-derived through trigonometry. A rotation of zero shows the marker exactly
//! as its box was detected; any extra rotation is relative to that, not to the horizon.

use image::{Rgb, Rgb32FImage};

use crate::detector::Marker;
use crate::raster::{BinaryMask, PLACEHOLDER, RgbSource};
use crate::rotate::rotate_bilinear;
use crate::sampling::{bilinear, nearest_mask, render_rgb};

/// Width/height frame of an oriented box, derived from its corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxFrame {
    /// Centre of the box, `(row, col)`.
    pub center: [f64; 2],
    /// Unit vector along the long edge.
    pub width_basis: [f64; 2],
    /// Unit vector along the short edge.
    pub height_basis: [f64; 2],
    pub width: f64,
    pub height: f64,
}

impl BoxFrame {
    /// Builds the frame from corners in [`OrientedBox::corners`](crate::obb::OrientedBox::corners)
    /// order, measuring both edges that leave the first corner.
    pub fn from_corners(corners: &[[f64; 2]; 4]) -> BoxFrame {
        let [p0, p1, _, p3] = *corners;
        let edge_a = [p1[0] - p0[0], p1[1] - p0[1]];
        let edge_b = [p3[0] - p0[0], p3[1] - p0[1]];
        let len_a = edge_a[0].hypot(edge_a[1]);
        let len_b = edge_b[0].hypot(edge_b[1]);

        let unit = |v: [f64; 2], len: f64| {
            if len > f64::EPSILON {
                [v[0] / len, v[1] / len]
            } else {
                [0.0, 0.0]
            }
        };
        let (u_a, u_b) = (unit(edge_a, len_a), unit(edge_b, len_b));

        // Swapping the roles of the edges would mirror the content; flipping one of them
        // keeps the orientation.
        let (width_basis, height_basis, width, height) = if len_a >= len_b {
            (u_a, u_b, len_a, len_b)
        } else {
            (u_b, [-u_a[0], -u_a[1]], len_b, len_a)
        };

        let center = [
            corners.iter().map(|c| c[0]).sum::<f64>() / 4.0,
            corners.iter().map(|c| c[1]).sum::<f64>() / 4.0,
        ];

        BoxFrame {
            center,
            width_basis,
            height_basis,
            width,
            height,
        }
    }

    /// Canvas size `(cols, rows)` of the rectified view, at least one pixel each way.
    pub fn canvas_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }

    /// Source position of canvas pixel `(row, col)`.
    pub fn source_of(&self, row: u32, col: u32, canvas: (u32, u32)) -> [f64; 2] {
        let local_col = col as f64 - (canvas.0 as f64 - 1.0) / 2.0;
        let local_row = row as f64 - (canvas.1 as f64 - 1.0) / 2.0;
        [
            self.center[0] + local_col * self.width_basis[0] + local_row * self.height_basis[0],
            self.center[1] + local_col * self.width_basis[1] + local_row * self.height_basis[1],
        ]
    }
}

/// Resamples the box given by `corners` into an axis-aligned image.
///
/// Positions outside the source, or whose nearest pixel is not set in `mask` (when given),
/// are painted [`PLACEHOLDER`].
pub fn rectify_box<S: RgbSource + ?Sized>(
    image: &S,
    corners: &[[f64; 2]; 4],
    mask: Option<&BinaryMask>,
) -> Rgb32FImage {
    let frame = BoxFrame::from_corners(corners);
    let canvas = frame.canvas_size();

    render_rgb(canvas.0, canvas.1, |row, col| {
        let [r, c] = frame.source_of(row, col, canvas);
        if let Some(mask) = mask
            && !nearest_mask(mask, r, c)
        {
            return PLACEHOLDER;
        }
        bilinear(image, r, c).map(Rgb).unwrap_or(PLACEHOLDER)
    })
}

/// The rectified close-up of `marker`, optionally rotated by `rotation_degrees` more
/// (clockwise positive). The canvas grows to fit the rotation.
pub fn extract_closeup<S: RgbSource + ?Sized>(
    image: &S,
    marker: &Marker,
    rotation_degrees: f64,
) -> Rgb32FImage {
    let rectified = rectify_box(image, &marker.corners, Some(&marker.mask));
    if rotation_degrees == 0.0 {
        rectified
    } else {
        rotate_bilinear(&rectified, rotation_degrees, PLACEHOLDER)
    }
}
