use num_traits::{Num, ToPrimitive};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::raster::{BACKGROUND, BinaryMask, FOREGROUND};

/// An axis-aligned pixel rectangle with inclusive bounds.
///
/// Used to restrict marker detection to a sub-area of the photograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    pub row_min: u32,
    pub row_max: u32,
    pub col_min: u32,
    pub col_max: u32,
}

impl Region {
    pub fn new(row_min: u32, row_max: u32, col_min: u32, col_max: u32) -> Self {
        Region {
            row_min,
            row_max,
            col_min,
            col_max,
        }
    }

    /// Calculates the axis-aligned region enclosing the corners of an oriented box.
    ///
    /// Typically fed with [`OrientedBox::corners`](crate::obb::OrientedBox::corners) or
    /// [`Marker::corners`](crate::detector::Marker::corners) to crop around a detection. Only
    /// `PartialOrd` is needed for the comparison, so integer and floating-point corners both
    /// work.
    ///
    /// # Arguments
    ///
    /// * `corners` - Four `(row, col)` points in any order.
    ///
    /// # Returns
    ///
    /// The smallest inclusive [`Region`] holding all four points. Negative coordinates are
    /// clamped to 0 and fractional bounds are truncated towards zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use wound_marker_geometry::fit_oriented_box;
    /// use wound_marker_geometry::region::Region;
    ///
    /// // A 3 x 8 block of pixels starting at row 4, col 10.
    /// let pixels: Vec<(u32, u32)> = (4..7).flat_map(|r| (10..18).map(move |c| (r, c))).collect();
    /// let footprint = fit_oriented_box(&pixels).unwrap().expanded(0.5);
    ///
    /// let region = Region::from_corners(&footprint.corners());
    /// assert_eq!(region, Region::new(3, 6, 9, 17));
    /// ```
    pub fn from_corners<T>(corners: &[[T; 2]; 4]) -> Region
    where
        T: Copy + PartialOrd + Num + ToPrimitive,
    {
        let [r0, c0] = corners[0];
        let (mut min_r, mut max_r, mut min_c, mut max_c) = (r0, r0, c0, c0);

        // `T` is only `PartialOrd`, so no `min`/`max` helpers.
        for &[r, c] in &corners[1..] {
            if r < min_r {
                min_r = r;
            }
            if r > max_r {
                max_r = r;
            }
            if c < min_c {
                min_c = c;
            }
            if c > max_c {
                max_c = c;
            }
        }

        let row_min = min_r.to_u32().unwrap_or(0);
        let col_min = min_c.to_u32().unwrap_or(0);
        Region {
            row_min,
            row_max: max_r.to_u32().unwrap_or(0).max(row_min),
            col_min,
            col_max: max_c.to_u32().unwrap_or(0).max(col_min),
        }
    }

    pub fn height(&self) -> u32 {
        self.row_max.saturating_sub(self.row_min) + 1
    }

    pub fn width(&self) -> u32 {
        self.col_max.saturating_sub(self.col_min) + 1
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.row_min..=self.row_max).contains(&row) && (self.col_min..=self.col_max).contains(&col)
    }

    /// The part of the region that lies inside a `width × height` image, if any.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        if width == 0 || height == 0 || self.row_min >= height || self.col_min >= width {
            return None;
        }
        Some(Region {
            row_min: self.row_min,
            row_max: self.row_max.min(height - 1),
            col_min: self.col_min,
            col_max: self.col_max.min(width - 1),
        })
    }

    /// A `width × height` mask that is foreground inside the region.
    pub fn to_mask(&self, width: u32, height: u32) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, y| {
            if self.contains(y, x) {
                FOREGROUND
            } else {
                BACKGROUND
            }
        })
    }
}

/// A mask of a rotated rectangle, for restricting detection to a non-axis-aligned area.
///
/// `center` is `(row, col)`, `half_extents` are the half side lengths along the rectangle's
/// own axes and `angle` (radians) is measured like
/// [`OrientedBox::angle`](crate::obb::OrientedBox::angle): the first axis points along
/// `(sin angle, cos angle)` in `(row, col)`.
pub fn rotated_rect_mask(
    width: u32,
    height: u32,
    center: [f64; 2],
    half_extents: [f64; 2],
    angle: f64,
) -> BinaryMask {
    let (sin, cos) = angle.sin_cos();
    let axis_a = [sin, cos];
    let axis_b = [cos, -sin];
    BinaryMask::from_fn(width, height, |x, y| {
        let dr = y as f64 - center[0];
        let dc = x as f64 - center[1];
        let a = dr * axis_a[0] + dc * axis_a[1];
        let b = dr * axis_b[0] + dc * axis_b[1];
        if a.abs() <= half_extents[0] + 1e-9 && b.abs() <= half_extents[1] + 1e-9 {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}
