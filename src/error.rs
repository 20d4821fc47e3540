use thiserror::Error;

/// Failures of [`ThinPlateSpline::fit`](crate::tps::ThinPlateSpline::fit) and the warps built on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TpsError {
    #[error("thin plate spline needs at least 3 control points, got {0}")]
    NotEnoughPoints(usize),
    #[error("source and target must have the same number of points ({source_len} vs {target_len})")]
    PointCountMismatch { source_len: usize, target_len: usize },
    #[error("regularization must be finite and non-negative, got {0}")]
    InvalidRegularization(f64),
    #[error("thin plate spline system is singular (are the control points collinear?)")]
    SingularSystem,
}

/// Invalid input to [`detect_marker`](crate::detector::detect_marker).
///
/// A photograph without any marker is not an error; see
/// [`Detection::NotFound`](crate::detector::Detection::NotFound).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("region mask is {mask_width}x{mask_height} but the image is {image_width}x{image_height}")]
    MaskSizeMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },
}

impl DetectError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        DetectError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
