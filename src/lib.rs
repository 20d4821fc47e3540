//! Geometric core of a wound-image laboratory toolkit.
//!
//! The crate detects bright calibration markers (rulers) in photographs, extracts a
//! rectified close-up of the detected marker, and fits thin plate spline warps between
//! point sets. Everything works on plain [image] buffers and uses a single `(row, col)`
//! coordinate convention; the `x`/`y` ordering of [image] and [imageproc] only appears
//! at the boundary (`x = col`, `y = row`).
//!
//! The modules are organized leaves first:
//!
//! * [raster] image/mask aliases and the [RgbSource] accessor trait,
//! * [morphology] and [labelling] on binary masks,
//! * [obb] oriented bounding box fitting,
//! * [threshold] and [detector] for marker detection,
//! * [sampling], [rotate] and [closeup] for bilinear resampling,
//! * [tps] thin plate splines,
//! * [shape_stats] for batch component statistics.

pub mod closeup;
pub mod detector;
pub mod error;
pub mod labelling;
pub mod morphology;
pub mod obb;
pub mod raster;
pub mod region;
pub mod rotate;
pub mod sampling;
pub mod shape_stats;
pub mod threshold;
pub mod tps;

pub use crate::closeup::extract_closeup;
pub use crate::detector::{AdaptiveThreshold, Detection, DetectionParams, Marker, detect_marker};
pub use crate::error::{DetectError, TpsError};
pub use crate::raster::{BinaryMask, PLACEHOLDER, RgbSource};
pub use crate::obb::{OrientedBox, fit_oriented_box};
pub use crate::region::Region;
pub use crate::rotate::rotate_bilinear;
pub use crate::tps::{ThinPlateSpline, TpsModel};
