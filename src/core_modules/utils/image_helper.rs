pub mod image_helper {
    use std::io::Cursor;
    use std::path::Path;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    pub const SAMPLE_WIDTH: u32 = 800;
    pub const SAMPLE_HEIGHT: u32 = 600;

    /// Product placements `(x, y, width, height)` on the synthetic shelf: five
    /// shelves of five products each.
    pub const SAMPLE_PRODUCTS: [(i32, i32, u32, u32); 25] = [
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
        (50, 270, 100, 80),
        (200, 270, 120, 80),
        (370, 270, 90, 80),
        (510, 270, 110, 80),
        (670, 270, 80, 80),
        (50, 390, 100, 80),
        (200, 390, 120, 80),
        (370, 390, 90, 80),
        (510, 390, 110, 80),
        (670, 390, 80, 80),
        (50, 510, 100, 80),
        (200, 510, 120, 80),
        (370, 510, 90, 80),
        (510, 510, 110, 80),
        (670, 510, 80, 80),
    ];

    const SAMPLE_COLORS: [[u8; 3]; 10] = [
        [255, 0, 0],
        [0, 255, 0],
        [0, 0, 255],
        [255, 255, 0],
        [255, 0, 255],
        [0, 255, 255],
        [128, 0, 0],
        [0, 128, 0],
        [0, 0, 128],
        [128, 128, 0],
    ];

    /// Encodes an image as PNG in memory.
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Writes an image as PNG.
    pub fn save(path: impl AsRef<Path>, image: &DynamicImage) -> Result<(), image::ImageError> {
        image.save_with_format(path, ImageFormat::Png)
    }

    /// Draws the synthetic shelf: a white 800x600 canvas with four grey shelf
    /// boards and 25 coloured products with black outlines.
    pub fn sample_shelf() -> RgbImage {
        let mut canvas = RgbImage::from_pixel(SAMPLE_WIDTH, SAMPLE_HEIGHT, Rgb([255, 255, 255]));

        for i in 1..5 {
            let y = i * 120 - 2;
            draw_filled_rect_mut(&mut canvas, Rect::at(0, y).of_size(SAMPLE_WIDTH, 5), Rgb([200, 200, 200]));
        }

        for (i, &(x, y, w, h)) in SAMPLE_PRODUCTS.iter().enumerate() {
            let color = Rgb(SAMPLE_COLORS[i % SAMPLE_COLORS.len()]);
            draw_filled_rect_mut(&mut canvas, Rect::at(x, y).of_size(w, h), color);
            draw_hollow_rect_mut(&mut canvas, Rect::at(x, y).of_size(w, h), Rgb([0, 0, 0]));
            draw_hollow_rect_mut(&mut canvas, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), Rgb([0, 0, 0]));
        }

        canvas
    }

    /// A manifest listing one row per sample product.
    pub fn sample_manifest() -> String {
        let sections = ["A", "B", "C", "D", "E"];
        SAMPLE_PRODUCTS
            .iter()
            .enumerate()
            .map(|(i, _)| format!("SKU{:03} {}.99 {}\n", i + 1, 2 + i % 7, sections[i / 5]))
            .collect()
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use image::{DynamicImage, GrayImage, Luma};

    #[test]
    fn save_white_file() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        let path = dir.path().join("white_file.png");
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(500, 500, Luma([255])));

        save(&path, &image).expect("Error Saving File.");
        let reloaded = image::open(&path).expect("Error Reading File.");
        assert_eq!((reloaded.width(), reloaded.height()), (500, 500));
    }

    #[test]
    fn encode_gradient_in_memory() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_fn(256, 4, |x, _| Luma([x as u8])));
        let bytes = encode_png(&image).expect("Error Encoding File.");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn sample_shelf_paints_products_and_outlines() {
        let shelf = sample_shelf();
        assert_eq!(shelf.dimensions(), (SAMPLE_WIDTH, SAMPLE_HEIGHT));
        // Background, product fill and outline.
        assert_eq!(shelf.get_pixel(5, 5).0, [255, 255, 255]);
        assert_eq!(shelf.get_pixel(100, 70).0, [255, 0, 0]);
        assert_eq!(shelf.get_pixel(50, 30).0, [0, 0, 0]);
    }

    #[test]
    fn sample_manifest_has_one_line_per_product() {
        let manifest = sample_manifest();
        assert_eq!(manifest.lines().count(), SAMPLE_PRODUCTS.len());
        assert!(manifest.starts_with("SKU001 2.99 A\n"));
    }
}
