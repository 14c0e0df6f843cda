// THEORY:
// A `DetectedRegion` is one candidate product: an axis-aligned box in pixel
// space around a closed edge contour. Like the blob summaries of a motion
// detector it is a plain data container with no memory; it lives for exactly
// one audit.
//
// `area` is the area enclosed by the contour itself, not `width * height`.
// A contour is rarely a perfect rectangle, so the two differ, and the contour
// area is the value the noise filter was applied to.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel space, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One candidate product found in the photograph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Area enclosed by the originating contour, in square pixels.
    pub area: f64,
}

impl DetectedRegion {
    pub fn new(bounds: BoundingBox, area: f64) -> Self {
        Self {
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            area,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}
