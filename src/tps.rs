//! Thin plate spline warps between two `(row, col)` point sets.
//!
//! A fitted model maps a point `p` to
//!
//! ```text
//! f(p) = Σᵢ wᵢ · U(|p - sᵢ|) + a₀ + a₁·row + a₂·col,   U(r) = r² ln r
//! ```
//!
//! separately for the output row and column. The weights are found from the usual bordered
//! system
//!
//! ```text
//! | K + λI  P | | w |   | y |
//! | Pᵀ      0 | | a | = | 0 |
//! ```
//!
//! whose lower block enforces `Σ w = 0` and `Σ w·s = 0`. With `λ = 0` the model passes
//! through every control point; a positive `λ` trades that for smoothness.
//!
//! Mask warps pull each output pixel from the input (a model fitted from target to source)
//! with a nearest-pixel lookup, since masks have no meaningful in-between values. Image
//! warps use bilinear interpolation instead.

use image::{Rgb, Rgb32FImage};
use nalgebra::{DMatrix, DVector};
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TpsError;
use crate::raster::{BinaryMask, RgbSource};
use crate::sampling::{bilinear, nearest_mask, render_mask, render_rgb};

/// Distances below this are treated as zero by [`tps_kernel`].
pub const KERNEL_EPSILON: f64 = 1e-12;

/// A `(row, col)` control point.
pub type Point = [f64; 2];

/// The thin plate radial basis function `r² ln r`, with `U(0) = 0`.
#[inline]
pub fn tps_kernel(r: f64) -> f64 {
    if r < KERNEL_EPSILON {
        0.0
    } else {
        r * r * r.ln()
    }
}

#[inline]
fn distance(a: Point, b: Point) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

/// `false` when all points lie on one line (or coincide); the affine part is then undetermined.
fn spans_plane(points: &[Point]) -> bool {
    let n = points.len() as f64;
    let mean_r = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_c = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let (mut s_rr, mut s_rc, mut s_cc) = (0.0, 0.0, 0.0);
    for p in points {
        let (dr, dc) = (p[0] - mean_r, p[1] - mean_c);
        s_rr += dr * dr;
        s_rc += dr * dc;
        s_cc += dc * dc;
    }
    let scale = (s_rr + s_cc) * (s_rr + s_cc);
    scale > 0.0 && s_rr * s_cc - s_rc * s_rc > 1e-12 * scale
}

/// `K[i][j] = U(|pᵢ - pⱼ|)`; symmetric with a zero diagonal.
pub fn kernel_matrix(points: &[Point]) -> DMatrix<f64> {
    let n = points.len();
    let mut k = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let v = tps_kernel(distance(points[i], points[j]));
            k[(i, j)] = v;
            k[(j, i)] = v;
        }
    }
    k
}

/// Per-point errors with their mean and maximum.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorSummary {
    pub per_point: Vec<f64>,
    pub mean: f64,
    pub max: f64,
}

impl ErrorSummary {
    fn from_errors(per_point: Vec<f64>) -> Self {
        let mean = if per_point.is_empty() {
            0.0
        } else {
            per_point.iter().sum::<f64>() / per_point.len() as f64
        };
        let max = per_point.iter().copied().fold(0.0, f64::max);
        ErrorSummary {
            per_point,
            mean,
            max,
        }
    }
}

/// A fitted thin plate spline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TpsModel {
    pub source_points: Vec<Point>,
    pub weights_row: Vec<f64>,
    pub weights_col: Vec<f64>,
    /// Coefficients of `[1, row, col]` for the output row.
    pub affine_row: [f64; 3],
    /// Coefficients of `[1, row, col]` for the output column.
    pub affine_col: [f64; 3],
    pub regularization: f64,
}

impl TpsModel {
    /// Maps one point through the spline.
    pub fn apply(&self, point: Point) -> Point {
        let mut row = self.affine_row[0] + self.affine_row[1] * point[0] + self.affine_row[2] * point[1];
        let mut col = self.affine_col[0] + self.affine_col[1] * point[0] + self.affine_col[2] * point[1];
        for (i, &s) in self.source_points.iter().enumerate() {
            let u = tps_kernel(distance(point, s));
            row += self.weights_row[i] * u;
            col += self.weights_col[i] * u;
        }
        [row, col]
    }

    pub fn apply_all(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|&p| self.apply(p)).collect()
    }

    /// Distance between `apply(source[i])` and `target[i]` for every pair.
    pub fn residual_error(&self, source: &[Point], target: &[Point]) -> ErrorSummary {
        let errors = source
            .iter()
            .zip(target)
            .map(|(&s, &t)| distance(self.apply(s), t))
            .collect();
        ErrorSummary::from_errors(errors)
    }

    /// Euclidean norm of both non-affine weight vectors together.
    pub fn weights_norm(&self) -> f64 {
        self.weights_row
            .iter()
            .chain(&self.weights_col)
            .map(|w| w * w)
            .sum::<f64>()
            .sqrt()
    }
}

/// Fitting and warping entry points.
pub struct ThinPlateSpline;

impl ThinPlateSpline {
    /// Fits the spline mapping each `source[i]` to `target[i]`.
    ///
    /// # Arguments
    ///
    /// * `source` - Control points in the input space, at least three and not all collinear.
    /// * `target` - Where each control point should land; same length as `source`.
    /// * `regularization` - `λ` added to the kernel diagonal. `0.0` interpolates exactly.
    ///
    /// # Errors
    ///
    /// [`TpsError::PointCountMismatch`], [`TpsError::NotEnoughPoints`],
    /// [`TpsError::InvalidRegularization`] for a negative or non-finite `λ`, and
    /// [`TpsError::SingularSystem`] when the points do not span the plane.
    ///
    /// # Examples
    ///
    /// ```
    /// use wound_marker_geometry::ThinPlateSpline;
    ///
    /// let square = [[10.0, 10.0], [90.0, 10.0], [90.0, 90.0], [10.0, 90.0]];
    /// let shifted: Vec<[f64; 2]> = square.iter().map(|p| [p[0] + 5.0, p[1] + 10.0]).collect();
    ///
    /// let model = ThinPlateSpline::fit(&square, &shifted, 0.0).unwrap();
    /// let [row, col] = model.apply([50.0, 50.0]);
    /// assert!((row - 55.0).abs() < 1e-6 && (col - 60.0).abs() < 1e-6);
    /// ```
    pub fn fit(source: &[Point], target: &[Point], regularization: f64) -> Result<TpsModel, TpsError> {
        if source.len() != target.len() {
            return Err(TpsError::PointCountMismatch {
                source_len: source.len(),
                target_len: target.len(),
            });
        }
        let n = source.len();
        if n < 3 {
            return Err(TpsError::NotEnoughPoints(n));
        }
        if !regularization.is_finite() || regularization < 0.0 {
            return Err(TpsError::InvalidRegularization(regularization));
        }
        if !spans_plane(source) {
            return Err(TpsError::SingularSystem);
        }

        let k = kernel_matrix(source);
        let mut system = DMatrix::<f64>::zeros(n + 3, n + 3);
        system.view_mut((0, 0), (n, n)).copy_from(&k);
        for (i, &[r, c]) in source.iter().enumerate() {
            system[(i, i)] += regularization;
            for (j, v) in [1.0, r, c].into_iter().enumerate() {
                system[(i, n + j)] = v;
                system[(n + j, i)] = v;
            }
        }

        let mut rhs = DMatrix::<f64>::zeros(n + 3, 2);
        for (i, &[r, c]) in target.iter().enumerate() {
            rhs[(i, 0)] = r;
            rhs[(i, 1)] = c;
        }

        let solution = system
            .lu()
            .solve(&rhs)
            .filter(|x| x.iter().all(|v| v.is_finite()))
            .ok_or(TpsError::SingularSystem)?;

        let column = |axis: usize| -> DVector<f64> { solution.column(axis).into_owned() };
        let (sol_row, sol_col) = (column(0), column(1));

        let model = TpsModel {
            source_points: source.to_vec(),
            weights_row: sol_row.rows(0, n).iter().copied().collect(),
            weights_col: sol_col.rows(0, n).iter().copied().collect(),
            affine_row: [sol_row[n], sol_row[n + 1], sol_row[n + 2]],
            affine_col: [sol_col[n], sol_col[n + 1], sol_col[n + 2]],
            regularization,
        };

        if regularization == 0.0 {
            let fit = model.residual_error(source, target);
            if fit.max > 1e-6 * (1.0 + model.weights_norm()) {
                warn!(max_residual = fit.max, "thin plate spline fit is ill-conditioned");
            }
        }
        Ok(model)
    }

    /// Fits and maps a batch of points in one go.
    pub fn transform_points(
        source: &[Point],
        target: &[Point],
        points: &[Point],
        regularization: f64,
    ) -> Result<Vec<Point>, TpsError> {
        Ok(Self::fit(source, target, regularization)?.apply_all(points))
    }

    /// Distance between each `source[i]` and `target[i]`, without any model.
    pub fn estimate_deformation_magnitude(source: &[Point], target: &[Point]) -> ErrorSummary {
        let displacements = source
            .iter()
            .zip(target)
            .map(|(&s, &t)| distance(s, t))
            .collect();
        ErrorSummary::from_errors(displacements)
    }

    /// Warps a mask so that content at `source` points ends up at `target` points.
    ///
    /// The output has the input's size; pixels pulled from outside the input are background.
    pub fn warp_mask(
        mask: &BinaryMask,
        source: &[Point],
        target: &[Point],
        regularization: f64,
    ) -> Result<BinaryMask, TpsError> {
        let inverse = Self::fit(target, source, regularization)?;
        Ok(render_mask(mask.width(), mask.height(), |row, col| {
            let [r, c] = inverse.apply([row as f64, col as f64]);
            if nearest_mask(mask, r, c) { 255 } else { 0 }
        }))
    }

    /// Image counterpart of [`warp_mask`](Self::warp_mask) with bilinear sampling.
    ///
    /// Pixels pulled from outside the input get `fill`.
    pub fn warp_image<S: RgbSource + ?Sized>(
        image: &S,
        source: &[Point],
        target: &[Point],
        regularization: f64,
        fill: Rgb<f32>,
    ) -> Result<Rgb32FImage, TpsError> {
        let inverse = Self::fit(target, source, regularization)?;
        Ok(render_rgb(image.n_cols(), image.n_rows(), |row, col| {
            let [r, c] = inverse.apply([row as f64, col as f64]);
            bilinear(image, r, c).map(Rgb).unwrap_or(fill)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{BACKGROUND, FOREGROUND, PLACEHOLDER, count_foreground, mask_at};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const SQUARE: [Point; 4] = [[10.0, 10.0], [90.0, 10.0], [90.0, 90.0], [10.0, 90.0]];

    fn assert_point(actual: Point, expected: Point, epsilon: f64) {
        assert_abs_diff_eq!(actual[0], expected[0], epsilon = epsilon);
        assert_abs_diff_eq!(actual[1], expected[1], epsilon = epsilon);
    }

    #[test]
    fn test_kernel_values() {
        assert_eq!(tps_kernel(0.0), 0.0);
        assert_eq!(tps_kernel(1e-15), 0.0);
        assert_eq!(tps_kernel(1.0), 0.0);
        assert_relative_eq!(tps_kernel(2.0), 4.0 * 2f64.ln(), max_relative = 1e-12);
        assert_abs_diff_eq!(tps_kernel(2.0), 2.7726, epsilon = 1e-4);
        assert!(tps_kernel(0.5) < 0.0);
    }

    #[test]
    fn test_kernel_matrix_is_symmetric_with_zero_diagonal() {
        let points = [[0.0, 0.0], [3.0, 4.0], [10.0, -2.0], [7.5, 7.5]];
        let k = kernel_matrix(&points);
        for i in 0..4 {
            assert_eq!(k[(i, i)], 0.0);
            for j in 0..4 {
                assert_eq!(k[(i, j)], k[(j, i)]);
            }
        }
        assert_relative_eq!(k[(0, 1)], 25.0 * 5f64.ln(), max_relative = 1e-12);
    }

    #[test]
    fn test_fit_rejects_bad_point_sets() {
        let three = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let err = ThinPlateSpline::fit(&three[..2], &three[..2], 0.0).unwrap_err();
        assert_eq!(err, TpsError::NotEnoughPoints(2));
        assert!(err.to_string().contains("at least 3"));

        let err = ThinPlateSpline::fit(&three, &SQUARE, 0.0).unwrap_err();
        assert!(matches!(err, TpsError::PointCountMismatch { source_len: 3, target_len: 4 }));
        assert!(err.to_string().contains("same number"));

        assert!(matches!(
            ThinPlateSpline::fit(&three, &three, -1.0),
            Err(TpsError::InvalidRegularization(_))
        ));
    }

    #[test]
    fn test_collinear_control_points_are_singular() {
        let line = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        assert_eq!(
            ThinPlateSpline::fit(&line, &line, 0.0),
            Err(TpsError::SingularSystem)
        );
    }

    #[test]
    fn test_identity_interpolates_exactly() {
        let model = ThinPlateSpline::fit(&SQUARE, &SQUARE, 0.0).unwrap();
        for p in SQUARE {
            assert_point(model.apply(p), p, 1e-6);
        }
        assert_point(model.apply([50.0, 50.0]), [50.0, 50.0], 1e-6);
    }

    #[test]
    fn test_pure_translation() {
        let target: Vec<Point> = SQUARE.iter().map(|p| [p[0] + 5.0, p[1] + 10.0]).collect();
        let model = ThinPlateSpline::fit(&SQUARE, &target, 0.0).unwrap();
        assert_point(model.apply([50.0, 50.0]), [55.0, 60.0], 1e-6);
        assert_point(model.apply([30.0, 70.0]), [35.0, 80.0], 1e-6);
    }

    #[test]
    fn test_uniform_scale() {
        let source = [[10.0, 10.0], [50.0, 10.0], [50.0, 50.0], [10.0, 50.0]];
        let target: Vec<Point> = source.iter().map(|p| [p[0] * 2.0, p[1] * 2.0]).collect();
        let model = ThinPlateSpline::fit(&source, &target, 0.0).unwrap();
        assert_point(model.apply([30.0, 30.0]), [60.0, 60.0], 1e-4);
    }

    #[test]
    fn test_non_affine_fit_passes_through_control_points() {
        let source = [SQUARE[0], SQUARE[1], SQUARE[2], SQUARE[3], [50.0, 50.0]];
        let target = [SQUARE[0], SQUARE[1], SQUARE[2], SQUARE[3], [58.0, 44.0]];
        let model = ThinPlateSpline::fit(&source, &target, 0.0).unwrap();
        let residual = model.residual_error(&source, &target);
        assert!(residual.max < 1e-6, "{residual:?}");
        assert_eq!(residual.per_point.len(), 5);

        let sum_w: f64 = model.weights_row.iter().sum();
        assert_abs_diff_eq!(sum_w, 0.0, epsilon = 1e-9);
        let moved: Vec<Point> = model.apply_all(&[[50.0, 50.0], [10.0, 10.0]]);
        assert_point(moved[0], [58.0, 44.0], 1e-6);
    }

    #[test]
    fn test_regularization_shrinks_weights_and_leaves_residuals() {
        let source = [
            [10.0, 10.0],
            [90.0, 10.0],
            [90.0, 90.0],
            [10.0, 90.0],
            [50.0, 50.0],
            [30.0, 60.0],
        ];
        let target = [
            [12.0, 9.0],
            [88.0, 13.0],
            [91.0, 87.0],
            [9.0, 92.0],
            [56.0, 45.0],
            [27.0, 66.0],
        ];
        let exact = ThinPlateSpline::fit(&source, &target, 0.0).unwrap();
        let smooth = ThinPlateSpline::fit(&source, &target, 0.1).unwrap();

        assert!(smooth.weights_norm() <= 1.1 * exact.weights_norm());

        let residual = smooth.residual_error(&source, &target);
        assert!(residual.max > 0.0);
        assert!(residual.max < 2.0, "{residual:?}");
        assert!(exact.residual_error(&source, &target).max < 1e-6);
    }

    #[test]
    fn test_deformation_magnitude() {
        let none = ThinPlateSpline::estimate_deformation_magnitude(&SQUARE, &SQUARE);
        assert_eq!(none.mean, 0.0);
        assert_eq!(none.max, 0.0);

        let moved: Vec<Point> = SQUARE.iter().map(|p| [p[0] + 3.0, p[1] + 4.0]).collect();
        let shift = ThinPlateSpline::estimate_deformation_magnitude(&SQUARE, &moved);
        assert_eq!(shift.mean, 5.0);
        assert_eq!(shift.max, 5.0);
        assert_eq!(shift.per_point, vec![5.0; 4]);
    }

    fn disc_mask() -> BinaryMask {
        BinaryMask::from_fn(100, 100, |x, y| {
            let (dr, dc) = (y as f64 - 50.0, x as f64 - 45.0);
            if dr * dr + dc * dc <= 25.0 * 25.0 {
                FOREGROUND
            } else {
                BACKGROUND
            }
        })
    }

    #[test]
    fn test_identity_mask_warp_preserves_the_mask() {
        let mask = disc_mask();
        let warped = ThinPlateSpline::warp_mask(&mask, &SQUARE, &SQUARE, 0.0).unwrap();
        let (before, after) = (count_foreground(&mask) as f64, count_foreground(&warped) as f64);
        assert!((before - after).abs() <= 0.05 * before);
        assert!(mask_at(&warped, 50, 45));
        assert!(!mask_at(&warped, 5, 5));
        for r in 35..65 {
            for c in 30..60 {
                assert_eq!(mask_at(&warped, r, c), mask_at(&mask, r, c));
            }
        }
    }

    #[test]
    fn test_translated_mask_warp_moves_content() {
        let mask = disc_mask();
        let target: Vec<Point> = SQUARE.iter().map(|p| [p[0] + 10.0, p[1] - 5.0]).collect();
        let warped = ThinPlateSpline::warp_mask(&mask, &SQUARE, &target, 0.0).unwrap();
        assert!(mask_at(&warped, 60, 40));
        assert!(!mask_at(&warped, 28, 45), "disc moved ten rows down");
        // Content pulled from above row 0 is background.
        assert!(!mask_at(&warped, 2, 40));
    }

    #[test]
    fn test_image_warp_translates_and_fills() {
        let img = Rgb32FImage::from_fn(40, 30, |x, y| Rgb([x as f32, y as f32, 1.0]));
        let source = [[0.0, 0.0], [0.0, 39.0], [29.0, 39.0], [29.0, 0.0]];
        let target: Vec<Point> = source.iter().map(|p| [p[0] + 2.0, p[1] + 3.0]).collect();
        let out = ThinPlateSpline::warp_image(&img, &source, &target, 0.0, PLACEHOLDER).unwrap();
        assert_eq!(out.dimensions(), (40, 30));
        let p = out.get_pixel(13, 12).0;
        assert_abs_diff_eq!(p[0], 10.0, epsilon = 1e-3);
        assert_abs_diff_eq!(p[1], 10.0, epsilon = 1e-3);
        assert_eq!(out.get_pixel(0, 0), &PLACEHOLDER);
    }
}
