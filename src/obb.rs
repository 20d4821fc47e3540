//! Principal-component oriented bounding boxes.
//!
//! The box of a pixel set is aligned with the eigenvectors of its population covariance.
//! Conventions, used consistently by detection, scoring and close-up extraction:
//!
//! * eigenvalues are sorted ascending; the *major* axis is the eigenvector of the larger one,
//! * the major axis is sign-normalized so its larger-magnitude component is positive
//!   (the row component wins a tie),
//! * the minor axis is `(major.col, -major.row)`, the major axis turned a quarter turn,
//! * [`OrientedBox::angle`] is `atan2(major.row, major.col)`, the angle of the major axis from
//!   the `+col` direction towards `+row`,
//! * corners run `(min_major, min_minor) → (max_major, min_minor) → (max_major, max_minor) →
//!   (min_major, max_minor)`.
//!
//! Extents are measured between pixel centres: a single row of pixels has zero height.

use nalgebra::{Matrix2, SymmetricEigen, Vector2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An oriented rectangle in `(row, col)` image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrientedBox {
    /// Mean position of the fitted points.
    pub centroid: [f64; 2],
    /// Unit vector of the major axis, `[row, col]`.
    pub major_axis: [f64; 2],
    /// Unit vector of the minor axis, `[row, col]`.
    pub minor_axis: [f64; 2],
    /// Covariance eigenvalues, ascending.
    pub eigenvalues: [f64; 2],
    /// `[min, max]` of the centred projections on the major axis.
    pub major_extent: [f64; 2],
    /// `[min, max]` of the centred projections on the minor axis.
    pub minor_extent: [f64; 2],
}

impl OrientedBox {
    /// Side length along the major axis.
    pub fn width(&self) -> f64 {
        self.major_extent[1] - self.major_extent[0]
    }

    /// Side length along the minor axis.
    pub fn height(&self) -> f64 {
        self.minor_extent[1] - self.minor_extent[0]
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Rotation of the major axis in radians, see the module docs.
    pub fn angle(&self) -> f64 {
        self.major_axis[0].atan2(self.major_axis[1])
    }

    /// Longer side over shorter side, or `1.0` when the shorter side is zero.
    pub fn aspect_ratio(&self) -> f64 {
        aspect_ratio(self.width(), self.height())
    }

    /// Centre of the rectangle (not necessarily the centroid of the points).
    pub fn center(&self) -> [f64; 2] {
        let a = 0.5 * (self.major_extent[0] + self.major_extent[1]);
        let b = 0.5 * (self.minor_extent[0] + self.minor_extent[1]);
        self.to_image(a, b)
    }

    /// The four `(row, col)` corners in the documented winding order.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        let [a0, a1] = self.major_extent;
        let [b0, b1] = self.minor_extent;
        [
            self.to_image(a0, b0),
            self.to_image(a1, b0),
            self.to_image(a1, b1),
            self.to_image(a0, b1),
        ]
    }

    /// The same box grown by `margin` on every side.
    ///
    /// `expanded(0.5)` turns pixel-centre extents into the pixel footprint.
    pub fn expanded(&self, margin: f64) -> OrientedBox {
        OrientedBox {
            major_extent: [self.major_extent[0] - margin, self.major_extent[1] + margin],
            minor_extent: [self.minor_extent[0] - margin, self.minor_extent[1] + margin],
            ..*self
        }
    }

    fn to_image(&self, a: f64, b: f64) -> [f64; 2] {
        [
            self.centroid[0] + a * self.major_axis[0] + b * self.minor_axis[0],
            self.centroid[1] + a * self.major_axis[1] + b * self.minor_axis[1],
        ]
    }
}

/// `max(a, b) / min(a, b)`, with `1.0` for a zero (or negative) shorter side.
pub fn aspect_ratio(a: f64, b: f64) -> f64 {
    let (long, short) = if a >= b { (a, b) } else { (b, a) };
    if short <= f64::EPSILON {
        1.0
    } else {
        long / short
    }
}

/// Eigen-decomposes a symmetric 2×2 matrix.
///
/// Returns the eigenvalues ascending and the matching unit eigenvectors.
pub fn symmetric_eigen_2x2(m: Matrix2<f64>) -> ([f64; 2], [Vector2<f64>; 2]) {
    let eig = SymmetricEigen::new(m);
    let v0: Vector2<f64> = eig.eigenvectors.column(0).into_owned();
    let v1: Vector2<f64> = eig.eigenvectors.column(1).into_owned();
    let (l0, l1) = (eig.eigenvalues[0], eig.eigenvalues[1]);
    if l1 < l0 { ([l1, l0], [v1, v0]) } else { ([l0, l1], [v0, v1]) }
}

fn sign_normalized(v: Vector2<f64>) -> Vector2<f64> {
    let dominant = if v[0].abs() >= v[1].abs() { v[0] } else { v[1] };
    if dominant < 0.0 { -v } else { v }
}

/// Fits the principal-axis bounding box of a set of `(row, col)` pixel coordinates.
///
/// Returns `None` for an empty set. Collinear input is valid and yields a zero-height box.
pub fn fit_oriented_box(pixels: &[(u32, u32)]) -> Option<OrientedBox> {
    if pixels.is_empty() {
        return None;
    }
    let n = pixels.len() as f64;

    let (sum_r, sum_c) = pixels
        .iter()
        .fold((0.0, 0.0), |(sr, sc), &(r, c)| (sr + r as f64, sc + c as f64));
    let centroid = [sum_r / n, sum_c / n];

    let (mut s_rr, mut s_rc, mut s_cc) = (0.0, 0.0, 0.0);
    for &(r, c) in pixels {
        let dr = r as f64 - centroid[0];
        let dc = c as f64 - centroid[1];
        s_rr += dr * dr;
        s_rc += dr * dc;
        s_cc += dc * dc;
    }
    let cov = Matrix2::new(s_rr / n, s_rc / n, s_rc / n, s_cc / n);

    let (eigenvalues, vectors) = symmetric_eigen_2x2(cov);
    let major = sign_normalized(vectors[1]);
    let minor = Vector2::new(major[1], -major[0]);

    let mut major_extent = [f64::INFINITY, f64::NEG_INFINITY];
    let mut minor_extent = [f64::INFINITY, f64::NEG_INFINITY];
    for &(r, c) in pixels {
        let d = Vector2::new(r as f64 - centroid[0], c as f64 - centroid[1]);
        let a = d.dot(&major);
        let b = d.dot(&minor);
        major_extent = [major_extent[0].min(a), major_extent[1].max(a)];
        minor_extent = [minor_extent[0].min(b), minor_extent[1].max(b)];
    }

    Some(OrientedBox {
        centroid,
        major_axis: [major[0], major[1]],
        minor_axis: [minor[0], minor[1]],
        eigenvalues,
        major_extent,
        minor_extent,
    })
}
