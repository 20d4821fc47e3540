use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::raster::{BinaryMask, FOREGROUND};

/// One connected region of a binary mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Label assigned by the labeller, starting at 1 in raster-scan order.
    pub label: u32,
    /// `(row, col)` of every pixel in the component, in raster-scan order.
    pub pixels: Vec<(u32, u32)>,
}

impl Component {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// A full-size mask holding only this component.
    pub fn to_mask(&self, width: u32, height: u32) -> BinaryMask {
        let mut mask = BinaryMask::new(width, height);
        for &(row, col) in &self.pixels {
            mask.put_pixel(col, row, FOREGROUND);
        }
        mask
    }
}

/// Labels the foreground of `mask` and groups pixel coordinates per component.
///
/// The returned vector is ordered by label, so index `i` holds label `i + 1`.
pub fn label_components(mask: &BinaryMask, connectivity: Connectivity) -> Vec<Component> {
    let labels = connected_components(mask, connectivity, Luma([0u8]));

    let mut components: Vec<Component> = Vec::new();
    for (col, row, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0];
        if label == 0 {
            continue;
        }
        let index = (label - 1) as usize;
        if index >= components.len() {
            components.extend((components.len()..=index).map(|i| Component {
                label: i as u32 + 1,
                pixels: Vec::new(),
            }));
        }
        components[index].pixels.push((row, col));
    }

    components
}
