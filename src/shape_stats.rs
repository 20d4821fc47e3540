//! Oriented-box shape statistics over segmentation masks.
//!
//! Meant for batch quality reports: label a ground-truth mask, fit a principal-axis box to
//! every component and summarize widths, heights and aspect ratios, optionally per class.

use std::collections::BTreeMap;

use image::GrayImage;
use imageproc::region_labelling::Connectivity;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::labelling::label_components;
use crate::obb::{OrientedBox, fit_oriented_box};
use crate::raster::{BACKGROUND, BinaryMask, FOREGROUND};

/// Shape of one connected component.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComponentShape {
    pub label: u32,
    pub pixel_count: usize,
    /// Box over the pixel footprint.
    pub footprint: OrientedBox,
    pub width: f64,
    pub height: f64,
    pub aspect_ratio: f64,
}

/// Mean, minimum and maximum of one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stat {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Stat {
    fn of(values: impl Iterator<Item = f64>) -> Option<Stat> {
        let (mut n, mut sum, mut min, mut max) = (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY);
        for v in values {
            n += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (n > 0).then(|| Stat {
            mean: sum / n as f64,
            min,
            max,
        })
    }
}

/// Summary over a set of components.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeSummary {
    pub count: usize,
    pub width: Stat,
    pub height: Stat,
    pub aspect_ratio: Stat,
}

/// Fits a footprint box to every 4-connected component with at least `min_area` pixels.
///
/// The result is sorted by pixel count, largest first. Components of equal size keep no
/// particular order.
pub fn component_shapes(mask: &BinaryMask, min_area: usize) -> Vec<ComponentShape> {
    let mut shapes: Vec<ComponentShape> = label_components(mask, Connectivity::Four)
        .into_iter()
        .filter(|c| c.pixel_count() >= min_area.max(1))
        .filter_map(|c| {
            let footprint = fit_oriented_box(&c.pixels)?.expanded(0.5);
            Some(ComponentShape {
                label: c.label,
                pixel_count: c.pixel_count(),
                width: footprint.width(),
                height: footprint.height(),
                aspect_ratio: footprint.aspect_ratio(),
                footprint,
            })
        })
        .collect();

    shapes.sort_unstable_by(|a, b| b.pixel_count.cmp(&a.pixel_count));
    shapes
}

/// Mean/min/max of width, height and aspect ratio; `None` for an empty slice.
pub fn summarize(shapes: &[ComponentShape]) -> Option<ShapeSummary> {
    Some(ShapeSummary {
        count: shapes.len(),
        width: Stat::of(shapes.iter().map(|s| s.width))?,
        height: Stat::of(shapes.iter().map(|s| s.height))?,
        aspect_ratio: Stat::of(shapes.iter().map(|s| s.aspect_ratio))?,
    })
}

/// Per-class summaries of a class-index mask, where `0` is background.
///
/// Classes without any component of at least `min_area` pixels are left out.
pub fn summarize_by_class(classes: &GrayImage, min_area: usize) -> BTreeMap<u8, ShapeSummary> {
    let mut present: Vec<u8> = classes.as_raw().iter().copied().filter(|&v| v != 0).collect();
    present.sort_unstable();
    present.dedup();

    present
        .into_iter()
        .filter_map(|class| {
            let mask = BinaryMask::from_fn(classes.width(), classes.height(), |x, y| {
                if classes.get_pixel(x, y).0[0] == class {
                    FOREGROUND
                } else {
                    BACKGROUND
                }
            });
            let shapes = component_shapes(&mask, min_area);
            summarize(&shapes).map(|summary| (class, summary))
        })
        .collect()
}
