//! Calibration-marker detection.
//!
//! A photograph is thresholded into a candidate mask (fixed band or adaptive local mean),
//! optionally restricted to a region, cleaned with a closing and an opening, and split into
//! 4-connected components. Every component above the area floor gets a principal-axis box
//! (see [`crate::obb`]) and a score mixing how densely it fills that box with how close its
//! aspect ratio is to the preferred one:
//!
//! ```text
//! aspect_score = exp(-|aspect_ratio - preferred| / preferred)
//! score        = (1 - w) * min(density, 1) + w * aspect_score
//! ```
//!
//! Box sides and areas are measured on the pixel footprint (pixel-centre extents plus half
//! a pixel on every side), so a solid `20 × 60` block has area 1200, density 1 and aspect
//! ratio 3. The highest score wins; equal scores keep the component with the lowest label,
//! i.e. the one reached first in raster order.

use imageproc::region_labelling::Connectivity;
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::DetectError;
use crate::labelling::{Component, label_components};
use crate::morphology;
use crate::obb::{OrientedBox, aspect_ratio, fit_oriented_box};
use crate::raster::{BinaryMask, RgbSource};
use crate::region::Region;
use crate::threshold::{adaptive_threshold, band_threshold, intersect};

/// Largest supported morphology radius.
pub const MAX_KERNEL_SIZE: i32 = 10;

/// Local-mean thresholding settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdaptiveThreshold {
    /// Side of the square neighbourhood, odd.
    pub window: u32,
    /// Subtracted from the local mean to get the per-pixel threshold.
    pub offset: f32,
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        AdaptiveThreshold {
            window: 51,
            offset: 0.05,
        }
    }
}

impl AdaptiveThreshold {
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.window == 0 || self.window % 2 == 0 {
            return Err(DetectError::invalid(
                "adaptive.window",
                format!("must be a positive odd number, got {}", self.window),
            ));
        }
        if !self.offset.is_finite() {
            return Err(DetectError::invalid("adaptive.offset", "must be finite"));
        }
        Ok(())
    }
}

/// Parameters of [`detect_marker`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectionParams {
    /// Lower bound of the fixed threshold band, applied to every channel.
    pub threshold_low: f32,
    /// Upper bound of the band; `1.0` means "at least `threshold_low`".
    pub threshold_upper: f32,
    /// Components with fewer pixels are ignored.
    pub min_component_area: usize,
    /// Long side over short side of the marker being looked for, at least 1.
    pub preferred_aspect_ratio: f64,
    /// Share of the score given to the aspect ratio match, in `[0, 1]`.
    pub aspect_ratio_weight: f64,
    /// Radius of the closing/opening applied to the candidate mask, `0..=10`.
    pub kernel_size: i32,
    /// Only search inside this rectangle.
    pub region: Option<Region>,
    /// Only search where this mask is set; must match the image size.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub region_mask: Option<BinaryMask>,
    /// Replace the fixed band with local-mean thresholding.
    pub adaptive: Option<AdaptiveThreshold>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        DetectionParams {
            threshold_low: 0.8,
            threshold_upper: 1.0,
            min_component_area: 100,
            preferred_aspect_ratio: 1.0,
            aspect_ratio_weight: 0.5,
            kernel_size: 0,
            region: None,
            region_mask: None,
            adaptive: None,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), DetectError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.threshold_low) {
            return Err(DetectError::invalid(
                "threshold_low",
                format!("must be in [0, 1], got {}", self.threshold_low),
            ));
        }
        if !unit.contains(&self.threshold_upper) || self.threshold_upper < self.threshold_low {
            return Err(DetectError::invalid(
                "threshold_upper",
                format!(
                    "must be in [threshold_low, 1], got {} (threshold_low {})",
                    self.threshold_upper, self.threshold_low
                ),
            ));
        }
        if self.min_component_area == 0 {
            return Err(DetectError::invalid("min_component_area", "must be positive"));
        }
        if !(self.preferred_aspect_ratio >= 1.0 && self.preferred_aspect_ratio.is_finite()) {
            return Err(DetectError::invalid(
                "preferred_aspect_ratio",
                format!("must be a finite value >= 1, got {}", self.preferred_aspect_ratio),
            ));
        }
        if !(0.0..=1.0).contains(&self.aspect_ratio_weight) {
            return Err(DetectError::invalid(
                "aspect_ratio_weight",
                format!("must be in [0, 1], got {}", self.aspect_ratio_weight),
            ));
        }
        if self.kernel_size > MAX_KERNEL_SIZE {
            return Err(DetectError::invalid(
                "kernel_size",
                format!("must be at most {MAX_KERNEL_SIZE}, got {}", self.kernel_size),
            ));
        }
        if let Some(adaptive) = &self.adaptive {
            adaptive.validate()?;
        }
        Ok(())
    }
}

/// The best-scoring calibration marker of a photograph.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Label of the component in the cleaned candidate mask.
    pub label: u32,
    /// Mean `(row, col)` of the marker pixels.
    pub centroid: [f64; 2],
    /// Footprint box corners as `(row, col)`, in [`OrientedBox::corners`] order.
    pub corners: [[f64; 2]; 4],
    /// Full-size mask holding only the marker.
    pub mask: BinaryMask,
    pub pixel_count: usize,
    /// Angle of the box's major axis in radians, see [`OrientedBox::angle`].
    pub rotation_angle: f64,
    /// Footprint side along the major axis.
    pub width: f64,
    /// Footprint side along the minor axis.
    pub height: f64,
    /// Long side over short side, at least 1.
    pub aspect_ratio: f64,
    /// `pixel_count / box area`.
    pub density: f64,
    pub score: f64,
}

impl Marker {
    /// Corners flattened to `[r0, c0, r1, c1, r2, c2, r3, c3]`.
    pub fn corners_flat(&self) -> [f64; 8] {
        let mut flat = [0.0; 8];
        for (i, [r, c]) in self.corners.iter().enumerate() {
            flat[2 * i] = *r;
            flat[2 * i + 1] = *c;
        }
        flat
    }

    /// The axis-aligned rectangle around the marker's corners.
    pub fn bounding_region(&self) -> Region {
        Region::from_corners(&self.corners)
    }
}

/// Outcome of [`detect_marker`].
///
/// `components_seen` counts every component of the cleaned candidate mask, including those
/// below the area floor, so that callers can tell the user why nothing was found.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Found { marker: Marker, components_seen: usize },
    NotFound { components_seen: usize },
}

impl Detection {
    pub fn marker(&self) -> Option<&Marker> {
        match self {
            Detection::Found { marker, .. } => Some(marker),
            Detection::NotFound { .. } => None,
        }
    }

    pub fn into_marker(self) -> Option<Marker> {
        match self {
            Detection::Found { marker, .. } => Some(marker),
            Detection::NotFound { .. } => None,
        }
    }

    pub fn components_seen(&self) -> usize {
        match self {
            Detection::Found {
                components_seen, ..
            }
            | Detection::NotFound { components_seen } => *components_seen,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Detection::Found { .. })
    }
}

/// Geometry and score of one candidate component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    /// The footprint box of the component.
    pub footprint: OrientedBox,
    pub density: f64,
    pub aspect_ratio: f64,
    pub aspect_score: f64,
    pub score: f64,
}

/// Scores a component's pixels against the preferred shape.
///
/// Returns `None` for an empty pixel set.
pub fn score_component(
    pixels: &[(u32, u32)],
    preferred_aspect_ratio: f64,
    aspect_ratio_weight: f64,
) -> Option<CandidateScore> {
    let footprint = fit_oriented_box(pixels)?.expanded(0.5);
    let area = footprint.area();
    let density = if area > f64::EPSILON {
        pixels.len() as f64 / area
    } else {
        0.0
    };
    let aspect_ratio = aspect_ratio(footprint.width(), footprint.height());
    let aspect_score =
        (-(aspect_ratio - preferred_aspect_ratio).abs() / preferred_aspect_ratio).exp();
    let score =
        (1.0 - aspect_ratio_weight) * density.min(1.0) + aspect_ratio_weight * aspect_score;
    Some(CandidateScore {
        footprint,
        density,
        aspect_ratio,
        aspect_score,
        score,
    })
}

/// Builds the cleaned candidate mask: threshold, region restriction, close, open.
pub fn candidate_mask<S: RgbSource + ?Sized>(
    image: &S,
    params: &DetectionParams,
) -> Result<BinaryMask, DetectError> {
    params.validate()?;
    let (width, height) = (image.n_cols(), image.n_rows());

    let mut mask = match &params.adaptive {
        Some(adaptive) => adaptive_threshold(image, adaptive.window, adaptive.offset),
        None => band_threshold(image, params.threshold_low, params.threshold_upper),
    };

    if let Some(region) = &params.region {
        mask = intersect(&mask, &region.to_mask(width, height));
    }
    if let Some(region_mask) = &params.region_mask {
        if region_mask.dimensions() != (width, height) {
            return Err(DetectError::MaskSizeMismatch {
                mask_width: region_mask.width(),
                mask_height: region_mask.height(),
                image_width: width,
                image_height: height,
            });
        }
        mask = intersect(&mask, region_mask);
    }

    if params.kernel_size > 0 {
        mask = morphology::close(&mask, params.kernel_size);
        mask = morphology::open(&mask, params.kernel_size);
    }
    Ok(mask)
}

/// Finds the best calibration marker in `image`.
///
/// # Arguments
///
/// * `image` - The photograph, any [`RgbSource`]; 8-bit images are read as `value / 255`.
/// * `params` - Threshold, cleaning and scoring settings, checked with
///   [`DetectionParams::validate`] first.
///
/// # Returns
///
/// [`Detection::Found`] with the highest-scoring component, or [`Detection::NotFound`] when
/// no component reaches `min_component_area`. Both carry the number of components seen.
///
/// # Errors
///
/// [`DetectError::InvalidParameter`] for out-of-range settings and
/// [`DetectError::MaskSizeMismatch`] when `region_mask` does not match the image.
///
/// # Examples
///
/// ```
/// use image::{Rgb, RgbImage};
/// use wound_marker_geometry::{DetectionParams, detect_marker};
///
/// // A white 10 x 40 strip on a dark background.
/// let photo = RgbImage::from_fn(80, 40, |x, y| {
///     if (15..25).contains(&y) && (20..60).contains(&x) {
///         Rgb([250, 250, 250])
///     } else {
///         Rgb([30, 20, 20])
///     }
/// });
/// let params = DetectionParams {
///     preferred_aspect_ratio: 4.0,
///     ..DetectionParams::default()
/// };
///
/// let detection = detect_marker(&photo, &params).unwrap();
/// let marker = detection.marker().unwrap();
/// assert_eq!(marker.pixel_count, 400);
/// assert!((marker.aspect_ratio - 4.0).abs() < 1e-9);
/// ```
pub fn detect_marker<S: RgbSource + ?Sized>(
    image: &S,
    params: &DetectionParams,
) -> Result<Detection, DetectError> {
    let mask = candidate_mask(image, params)?;
    let components = label_components(&mask, Connectivity::Four);
    let components_seen = components.len();

    let mut best: Option<(&Component, CandidateScore)> = None;
    for component in components
        .iter()
        .filter(|c| c.pixel_count() >= params.min_component_area)
    {
        let Some(candidate) = score_component(
            &component.pixels,
            params.preferred_aspect_ratio,
            params.aspect_ratio_weight,
        ) else {
            continue;
        };
        trace!(
            label = component.label,
            pixels = component.pixel_count(),
            density = candidate.density,
            aspect_ratio = candidate.aspect_ratio,
            score = candidate.score,
            "scored marker candidate"
        );
        if best
            .as_ref()
            .is_none_or(|(_, current)| candidate.score > current.score)
        {
            best = Some((component, candidate));
        }
    }

    let Some((component, candidate)) = best else {
        debug!(components_seen, "no marker candidate reached the area floor");
        return Ok(Detection::NotFound { components_seen });
    };

    debug!(
        components_seen,
        label = component.label,
        score = candidate.score,
        "marker selected"
    );

    let footprint = candidate.footprint;
    let marker = Marker {
        label: component.label,
        centroid: footprint.centroid,
        corners: footprint.corners(),
        mask: component.to_mask(image.n_cols(), image.n_rows()),
        pixel_count: component.pixel_count(),
        rotation_angle: footprint.angle(),
        width: footprint.width(),
        height: footprint.height(),
        aspect_ratio: candidate.aspect_ratio,
        density: candidate.density,
        score: candidate.score,
    };
    Ok(Detection::Found {
        marker,
        components_seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{count_foreground, mask_at};
    use crate::region::rotated_rect_mask;
    use approx::assert_abs_diff_eq;
    use image::{Rgb, Rgb32FImage};

    const DARK: Rgb<f32> = Rgb([0.1, 0.1, 0.1]);
    const BRIGHT: Rgb<f32> = Rgb([0.95, 0.95, 0.95]);

    /// A dark image with bright axis-aligned blocks `(row0, col0, rows, cols)`.
    fn with_blocks(width: u32, height: u32, blocks: &[(u32, u32, u32, u32)]) -> Rgb32FImage {
        Rgb32FImage::from_fn(width, height, |x, y| {
            let lit = blocks
                .iter()
                .any(|&(r, c, h, w)| (r..r + h).contains(&y) && (c..c + w).contains(&x));
            if lit { BRIGHT } else { DARK }
        })
    }

    fn params() -> DetectionParams {
        DetectionParams {
            threshold_low: 0.5,
            min_component_area: 50,
            ..DetectionParams::default()
        }
    }

    #[test]
    fn test_single_rectangle_is_found_with_its_geometry() {
        let img = with_blocks(120, 80, &[(30, 20, 20, 60)]);
        let detection = detect_marker(&img, &params()).unwrap();
        assert_eq!(detection.components_seen(), 1);
        let marker = detection.marker().expect("marker");
        assert_eq!(marker.pixel_count, 1200);
        assert_abs_diff_eq!(marker.aspect_ratio, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(marker.density, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(marker.width, 60.0, epsilon = 1e-9);
        assert_abs_diff_eq!(marker.height, 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(marker.rotation_angle, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(marker.centroid[0], 39.5, epsilon = 1e-9);
        assert_abs_diff_eq!(marker.centroid[1], 49.5, epsilon = 1e-9);
        assert_eq!(count_foreground(&marker.mask), 1200);
        assert_eq!(marker.bounding_region(), Region::new(29, 49, 19, 79));
        let flat = marker.corners_flat();
        assert_abs_diff_eq!(flat[0], 29.5, epsilon = 1e-9);
        assert_abs_diff_eq!(flat[1], 19.5, epsilon = 1e-9);
    }

    #[test]
    fn test_dark_image_reports_not_found() {
        let img = Rgb32FImage::from_pixel(50, 40, DARK);
        let detection = detect_marker(&img, &params()).unwrap();
        assert_eq!(detection, Detection::NotFound { components_seen: 0 });
        assert!(!detection.is_found());
    }

    #[test]
    fn test_small_components_are_counted_but_not_selected() {
        let img = with_blocks(60, 60, &[(5, 5, 3, 3), (40, 40, 4, 4)]);
        let detection = detect_marker(&img, &params()).unwrap();
        assert_eq!(detection, Detection::NotFound { components_seen: 2 });
    }

    #[test]
    fn test_preferred_aspect_ratio_decides_between_candidates() {
        // A 30x30 square and a 10x60 bar, both solid.
        let img = with_blocks(150, 100, &[(10, 10, 30, 30), (60, 20, 10, 60)]);

        let square = DetectionParams {
            preferred_aspect_ratio: 1.0,
            aspect_ratio_weight: 0.8,
            ..params()
        };
        let found = detect_marker(&img, &square).unwrap().into_marker().unwrap();
        assert_eq!(found.pixel_count, 900);

        let bar = DetectionParams {
            preferred_aspect_ratio: 6.0,
            ..square
        };
        let found = detect_marker(&img, &bar).unwrap().into_marker().unwrap();
        assert_eq!(found.pixel_count, 600);
        assert_abs_diff_eq!(found.aspect_ratio, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_equal_scores_keep_the_first_component() {
        let img = with_blocks(100, 40, &[(5, 60, 10, 10), (5, 10, 10, 10)]);
        let marker = detect_marker(&img, &params()).unwrap().into_marker().unwrap();
        assert_eq!(marker.label, 1);
        assert!(mask_at(&marker.mask, 5, 10));
    }

    #[test]
    fn test_density_prefers_solid_over_hollow() {
        // Same outline, but the second block has a large hole.
        let mut img = with_blocks(120, 60, &[(10, 10, 30, 30), (10, 70, 30, 30)]);
        for y in 15..35 {
            for x in 75..95 {
                img.put_pixel(x, y, DARK);
            }
        }
        let only_density = DetectionParams {
            aspect_ratio_weight: 0.0,
            ..params()
        };
        let marker = detect_marker(&img, &only_density).unwrap().into_marker().unwrap();
        assert_eq!(marker.pixel_count, 900);
        assert_abs_diff_eq!(marker.score, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_region_restricts_the_search() {
        let img = with_blocks(120, 60, &[(10, 10, 30, 30), (10, 70, 20, 40)]);
        let restricted = DetectionParams {
            region: Some(Region::new(0, 59, 60, 119)),
            ..params()
        };
        let marker = detect_marker(&img, &restricted).unwrap().into_marker().unwrap();
        assert_eq!(marker.pixel_count, 800);
        assert_eq!(detect_marker(&img, &restricted).unwrap().components_seen(), 1);
    }

    #[test]
    fn test_region_mask_restricts_the_search() {
        let img = with_blocks(120, 60, &[(10, 10, 30, 30), (10, 70, 20, 40)]);
        let mask = rotated_rect_mask(120, 60, [25.0, 25.0], [20.0, 20.0], 0.3);
        let restricted = DetectionParams {
            region_mask: Some(mask),
            ..params()
        };
        let marker = detect_marker(&img, &restricted).unwrap().into_marker().unwrap();
        assert_eq!(marker.pixel_count, 900);
    }

    #[test]
    fn test_region_mask_size_must_match() {
        let img = Rgb32FImage::from_pixel(10, 10, DARK);
        let bad = DetectionParams {
            region_mask: Some(BinaryMask::new(5, 5)),
            ..params()
        };
        assert!(matches!(
            detect_marker(&img, &bad),
            Err(DetectError::MaskSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_morphology_joins_a_broken_marker() {
        // A 20x60 bar cut by a one pixel dark seam.
        let mut img = with_blocks(100, 60, &[(20, 20, 20, 60)]);
        for y in 20..40 {
            img.put_pixel(50, y, DARK);
        }
        let raw = detect_marker(&img, &params()).unwrap();
        assert_eq!(raw.components_seen(), 2);

        let cleaned = DetectionParams {
            kernel_size: 1,
            ..params()
        };
        let detection = detect_marker(&img, &cleaned).unwrap();
        assert_eq!(detection.components_seen(), 1);
        assert_eq!(detection.marker().unwrap().pixel_count, 1200);
    }

    #[test]
    fn test_rotated_bar_reports_its_angle() {
        let angle = 30f64.to_radians();
        let mask = rotated_rect_mask(200, 200, [100.0, 100.0], [40.0, 8.0], angle);
        let img = Rgb32FImage::from_fn(200, 200, |x, y| {
            if mask.get_pixel(x, y).0[0] != 0 { BRIGHT } else { DARK }
        });
        let marker = detect_marker(&img, &params()).unwrap().into_marker().unwrap();
        assert_abs_diff_eq!(marker.rotation_angle, angle, epsilon = 0.02);
        assert!((marker.aspect_ratio - 5.0).abs() < 0.5, "{}", marker.aspect_ratio);
        assert!(marker.density > 0.9);
    }

    #[test]
    fn test_adaptive_mode_finds_marker_under_uneven_light() {
        // Strong left-to-right illumination ramp; the marker is only locally bright.
        let img = Rgb32FImage::from_fn(160, 80, |x, y| {
            let base = 0.05 + 0.005 * x as f32;
            let lit = (30..45).contains(&y) && (10..55).contains(&x);
            let v = if lit { base + 0.2 } else { base };
            Rgb([v, v, v])
        });
        let fixed = DetectionParams {
            threshold_low: 0.4,
            ..params()
        };
        let detection = detect_marker(&img, &fixed).unwrap();
        assert_ne!(detection.marker().map(|m| m.pixel_count), Some(15 * 45));

        let adaptive = DetectionParams {
            adaptive: Some(AdaptiveThreshold {
                window: 61,
                offset: -0.05,
            }),
            ..params()
        };
        let marker = detect_marker(&img, &adaptive).unwrap().into_marker().unwrap();
        assert_eq!(marker.pixel_count, 15 * 45);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let img = Rgb32FImage::from_pixel(4, 4, DARK);
        let cases = [
            DetectionParams {
                threshold_low: 1.5,
                ..params()
            },
            DetectionParams {
                threshold_upper: 0.2,
                ..params()
            },
            DetectionParams {
                preferred_aspect_ratio: 0.5,
                ..params()
            },
            DetectionParams {
                aspect_ratio_weight: f64::NAN,
                ..params()
            },
            DetectionParams {
                kernel_size: 11,
                ..params()
            },
            DetectionParams {
                adaptive: Some(AdaptiveThreshold {
                    window: 4,
                    offset: 0.0,
                }),
                ..params()
            },
        ];
        for case in &cases {
            assert!(matches!(
                detect_marker(&img, case),
                Err(DetectError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_degenerate_line_scores_low_but_finite() {
        let pixels: Vec<(u32, u32)> = (0..50).map(|c| (3, c)).collect();
        let s = score_component(&pixels, 3.0, 0.5).unwrap();
        assert!(s.score.is_finite());
        assert_abs_diff_eq!(s.aspect_ratio, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.density, 1.0, epsilon = 1e-9);
    }
}
