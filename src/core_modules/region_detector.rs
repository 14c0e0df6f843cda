// THEORY:
// The `RegionDetector` proposes where products sit on the shelf using nothing
// but geometry. It does not classify anything; it finds closed outlines that
// are large enough to be a product and reports their boxes.
//
// Algorithm (`ContourRegionDetector`):
// 1.  **Edge map**: Canny with hysteresis thresholds 50/150 on the grayscale
//     image produces a binary map of strong, connected edges.
// 2.  **External contours**: border following over the edge map. Only
//     outermost borders are kept; holes and anything nested inside a hole are
//     discarded, so a product's printed label never becomes its own region.
// 3.  **Noise floor**: contours enclosing less than 1000 square pixels are
//     dropped.
// 4.  **Boxing**: each survivor becomes a `DetectedRegion` with its bounding
//     rectangle and its contour area.
//
// Regions are reported in discovery order (raster order of each contour's
// first pixel), not sorted.
//
// `PlaceholderLayout` is the reduced-capability strategy: a fixed two-row
// layout of ten boxes returned for any image. It exists so the rest of the
// engine can run without pixel data and must not be mistaken for detection.

use tracing::{debug, warn};

use crate::core_modules::detected_region::{BoundingBox, DetectedRegion};
use crate::core_modules::shelf_image::ShelfImage;

pub const CANNY_LOW_THRESHOLD: f32 = 50.0;
pub const CANNY_HIGH_THRESHOLD: f32 = 150.0;
pub const MIN_CONTOUR_AREA: f64 = 1000.0;

/// A strategy for proposing product regions.
pub trait RegionDetector: Send + Sync {
    /// A short label for logs.
    fn name(&self) -> &'static str;

    /// Proposes regions for one image. Never fails on a decoded image.
    fn detect(&self, image: &ShelfImage) -> Vec<DetectedRegion>;
}

/// Edge and contour based detection over real pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourRegionDetector;

impl RegionDetector for ContourRegionDetector {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn detect(&self, image: &ShelfImage) -> Vec<DetectedRegion> {
        let Some(luma) = image.luma() else {
            warn!("contour detector received an image without pixel data");
            return Vec::new();
        };

        let edges = contour_geometry::edge_map(luma);
        let contours = contour_geometry::external_contours(&edges);
        let total = contours.len();

        let regions: Vec<DetectedRegion> = contours
            .iter()
            .filter_map(|points| {
                let area = contour_geometry::contour_area(points);
                if area < MIN_CONTOUR_AREA {
                    return None;
                }
                let bounds = contour_geometry::bounding_rect(points)?;
                Some(DetectedRegion::new(bounds, area))
            })
            .collect();

        debug!(contours = total, regions = regions.len(), "contour detection");
        regions
    }
}

/// The fixed demo layout: two shelves of five boxes each.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderLayout;

impl PlaceholderLayout {
    const LAYOUT: [(u32, u32, u32, u32); 10] = [
        (50, 30, 100, 80),
        (200, 30, 120, 80),
        (370, 30, 90, 80),
        (510, 30, 110, 80),
        (670, 30, 80, 80),
        (50, 150, 100, 80),
        (200, 150, 120, 80),
        (370, 150, 90, 80),
        (510, 150, 110, 80),
        (670, 150, 80, 80),
    ];
}

impl RegionDetector for PlaceholderLayout {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn detect(&self, _image: &ShelfImage) -> Vec<DetectedRegion> {
        Self::LAYOUT
            .iter()
            .map(|&(x, y, width, height)| {
                let bounds = BoundingBox { x, y, width, height };
                DetectedRegion::new(bounds, (width * height) as f64)
            })
            .collect()
    }
}

pub mod contour_geometry {
    use image::GrayImage;
    use imageproc::contours::{find_contours, BorderType};
    use imageproc::edges::canny;
    use imageproc::point::Point;

    use super::*;

    /// Binary edge map (0 or 255) from the Canny operator.
    pub fn edge_map(luma: &GrayImage) -> GrayImage {
        canny(luma, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD)
    }

    /// Point lists of the outermost borders in the edge map, in discovery order.
    pub fn external_contours(edges: &GrayImage) -> Vec<Vec<Point<i32>>> {
        find_contours::<i32>(edges)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .map(|contour| contour.points)
            .collect()
    }

    /// Area enclosed by a closed polygon (shoelace formula). Degenerate
    /// contours with fewer than three points enclose nothing.
    pub fn contour_area(points: &[Point<i32>]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let twice_area: i64 = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .map(|(p, q)| p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64)
            .sum();
        twice_area.abs() as f64 / 2.0
    }

    /// Smallest axis-aligned box containing every point, inclusive of the
    /// extreme pixels.
    pub fn bounding_rect(points: &[Point<i32>]) -> Option<BoundingBox> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(BoundingBox {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::contour_geometry::*;
    use super::*;
    use crate::core_modules::utils::image_helper::image_helper;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::point::Point;
    use imageproc::rect::Rect;

    fn canvas_with_rect(width: u32, height: u32, rect: Rect) -> ShelfImage {
        let mut luma = GrayImage::from_pixel(width, height, Luma([235]));
        draw_filled_rect_mut(&mut luma, rect, Luma([20]));
        ShelfImage::from_luma(luma, 0)
    }

    #[test]
    fn shoelace_area_of_a_square() {
        let square = [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        assert_eq!(contour_area(&square), 100.0);
        // Orientation does not matter.
        let reversed: Vec<_> = square.iter().rev().copied().collect();
        assert_eq!(contour_area(&reversed), 100.0);
    }

    #[test]
    fn area_of_a_triangle_differs_from_its_box() {
        let triangle = [Point::new(0, 0), Point::new(60, 0), Point::new(0, 40)];
        let bounds = bounding_rect(&triangle).unwrap();
        assert_eq!(contour_area(&triangle), 1200.0);
        assert_eq!((bounds.width, bounds.height), (61, 41));
    }

    #[test]
    fn degenerate_contours_enclose_nothing() {
        assert_eq!(contour_area(&[]), 0.0);
        assert_eq!(contour_area(&[Point::new(1, 1), Point::new(5, 5)]), 0.0);
        assert!(bounding_rect(&[]).is_none());
    }

    #[test]
    fn finds_a_single_high_contrast_product() {
        let image = canvas_with_rect(400, 300, Rect::at(50, 40).of_size(100, 80));
        let regions = ContourRegionDetector.detect(&image);

        assert_eq!(regions.len(), 1, "regions: {regions:?}");
        let region = &regions[0];
        assert!(region.x.abs_diff(50) <= 3, "x = {}", region.x);
        assert!(region.y.abs_diff(40) <= 3, "y = {}", region.y);
        assert!(region.width.abs_diff(100) <= 6, "width = {}", region.width);
        assert!(region.height.abs_diff(80) <= 6, "height = {}", region.height);
        assert!(region.area >= MIN_CONTOUR_AREA);
        assert!(region.area <= (region.width * region.height) as f64);
    }

    #[test]
    fn small_shapes_fall_below_the_noise_floor() {
        let image = canvas_with_rect(200, 200, Rect::at(60, 60).of_size(20, 20));
        assert!(ContourRegionDetector.detect(&image).is_empty());
    }

    #[test]
    fn blank_image_has_no_regions() {
        let image = ShelfImage::from_luma(GrayImage::from_pixel(320, 240, Luma([128])), 0);
        assert!(ContourRegionDetector.detect(&image).is_empty());
    }

    #[test]
    fn nested_outlines_are_not_reported_twice() {
        let mut luma = GrayImage::from_pixel(400, 300, Luma([235]));
        draw_filled_rect_mut(&mut luma, Rect::at(40, 40).of_size(200, 160), Luma([20]));
        draw_filled_rect_mut(&mut luma, Rect::at(90, 80).of_size(80, 60), Luma([235]));
        let regions = ContourRegionDetector.detect(&ShelfImage::from_luma(luma, 0));

        assert_eq!(regions.len(), 1, "regions: {regions:?}");
        assert!(regions[0].width.abs_diff(200) <= 6);
    }

    #[test]
    fn every_region_on_the_sample_shelf_clears_the_noise_floor() {
        let shelf = image::DynamicImage::ImageRgb8(image_helper::sample_shelf());
        let bytes = image_helper::encode_png(&shelf).unwrap();
        let image = ShelfImage::decode(&bytes).unwrap();
        let regions = ContourRegionDetector.detect(&image);

        assert!(!regions.is_empty());
        assert!(regions.iter().all(|r| r.area >= MIN_CONTOUR_AREA));
        assert!(regions.iter().all(|r| r.x + r.width <= image.width && r.y + r.height <= image.height));
    }

    #[test]
    fn detection_is_deterministic() {
        let image = canvas_with_rect(400, 300, Rect::at(120, 90).of_size(150, 100));
        assert_eq!(ContourRegionDetector.detect(&image), ContourRegionDetector.detect(&image));
    }

    #[test]
    fn header_only_images_yield_no_regions() {
        let bytes = image_helper::encode_png(&image::DynamicImage::ImageLuma8(GrayImage::new(8, 8))).unwrap();
        let image = ShelfImage::probe(&bytes).unwrap();
        assert!(ContourRegionDetector.detect(&image).is_empty());
    }

    #[test]
    fn placeholder_layout_is_fixed() {
        let image = ShelfImage::from_luma(GrayImage::new(1, 1), 0);
        let regions = PlaceholderLayout.detect(&image);

        assert_eq!(regions.len(), 10);
        assert_eq!(regions[0], DetectedRegion::new(BoundingBox { x: 50, y: 30, width: 100, height: 80 }, 8000.0));
        assert_eq!(regions[9].area, 6400.0);
        assert!(regions.iter().all(|r| r.area >= MIN_CONTOUR_AREA));
    }
}
