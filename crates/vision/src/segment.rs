use std::path::Path;

use image::DynamicImage;
use imageproc::contours::{find_contours, Contour};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::point::Point;
use tracing::{debug, info};

use kvitto_core::{OutputConfig, PipelineConfig};

use crate::artifact::image_stem;
use crate::pipeline::{sigma_for_kernel, PreprocessError, Preprocessor, ProcessResult};

/// An axis-aligned candidate receipt region within the source photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn contains(&self, other: &Region) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.x + self.width >= other.x + other.width
            && self.y + self.height >= other.y + other.height
    }

    fn padded(&self, margin: u32, img_width: u32, img_height: u32) -> Region {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        let x2 = (self.x + self.width + margin).min(img_width);
        let y2 = (self.y + self.height + margin).min(img_height);
        Region { x, y, width: x2 - x, height: y2 - y }
    }
}

/// Locates several physically separate receipts in one photograph and runs
/// the single-receipt pipeline on each region independently.
///
/// The region search is deliberately coarser than the quad search: it only
/// needs bounding boxes above an area floor, not clean quadrilaterals.
/// Results are ordered left-to-right then top-to-bottom by region origin,
/// and identifiers are positional, so output order is deterministic.
pub struct MultiReceiptProcessor {
    inner: Preprocessor,
    config: PipelineConfig,
}

impl MultiReceiptProcessor {
    pub fn new(config: PipelineConfig, output: OutputConfig) -> Self {
        Self { inner: Preprocessor::new(config.clone(), output), config }
    }

    pub fn process_path(&self, path: &Path) -> Result<Vec<(String, ProcessResult)>, PreprocessError> {
        let img = image::open(path)?;
        info!(image = %path.display(), "segmenting multi-receipt image");
        Ok(self.process_image(&img, &image_stem(path)))
    }

    /// Crop and process every detected region. Regions are isolated: one
    /// region failing to find its quad or binarize poorly never affects
    /// the others.
    pub fn process_image(&self, img: &DynamicImage, stem: &str) -> Vec<(String, ProcessResult)> {
        let regions = self.detect_regions(img);
        info!(count = regions.len(), "detected receipt regions");

        let mut results = Vec::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            let identifier = format!("{stem}_receipt{:02}", i + 1);
            debug!(
                region = %identifier,
                x = region.x,
                y = region.y,
                width = region.width,
                height = region.height,
                "processing region"
            );
            let crop = img.crop_imm(region.x, region.y, region.width, region.height);
            let result = self.inner.process_image(&crop, &identifier);
            results.push((identifier, result));
        }
        results
    }

    /// Coarse region search: blurred edges, contour bounding boxes, area
    /// floor, nested boxes dropped, a margin of context added around each.
    pub fn detect_regions(&self, img: &DynamicImage) -> Vec<Region> {
        let cfg = &self.config;
        let gray = img.to_luma8();
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return Vec::new();
        }

        let blurred = gaussian_blur_f32(&gray, sigma_for_kernel(cfg.blur_kernel));
        let edges = canny(&blurred, cfg.canny_low, cfg.canny_high);
        let contours: Vec<Contour<i32>> = find_contours(&edges);

        let min_area = w as f64 * h as f64 * cfg.min_region_fraction as f64;
        let mut boxes: Vec<Region> = contours
            .iter()
            .filter_map(|c| bounding_box(&c.points))
            .filter(|r| r.area() as f64 >= min_area)
            .collect();

        // Largest first so a receipt's inner contour box collapses into its
        // outer one.
        boxes.sort_by(|a, b| b.area().cmp(&a.area()));
        let mut kept: Vec<Region> = Vec::new();
        for b in boxes {
            if !kept.iter().any(|k| k.contains(&b)) {
                kept.push(b);
            }
        }

        for r in &mut kept {
            *r = r.padded(cfg.region_margin, w, h);
        }
        kept.sort_by_key(|r| (r.x, r.y));
        kept
    }
}

fn bounding_box(points: &[Point<i32>]) -> Option<Region> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Region {
        x: min_x.max(0) as u32,
        y: min_y.max(0) as u32,
        width: (max_x - min_x + 1).max(1) as u32,
        height: (max_y - min_y + 1).max(1) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};
    use kvitto_core::Config;

    /// Three separated bright rectangles on a dark table.
    fn triple_receipt_photo() -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(360, 120, |x, y| {
            let in_band = (10..110).contains(&y);
            let in_column =
                (10..110).contains(&x) || (130..230).contains(&x) || (250..350).contains(&x);
            Luma([if in_band && in_column { 235u8 } else { 25u8 }])
        });
        DynamicImage::ImageLuma8(img)
    }

    fn processor() -> MultiReceiptProcessor {
        let cfg = Config::default();
        MultiReceiptProcessor::new(cfg.pipeline, cfg.output)
    }

    #[test]
    fn three_receipts_yield_three_ordered_regions() {
        let regions = processor().detect_regions(&triple_receipt_photo());
        assert_eq!(regions.len(), 3, "regions: {regions:?}");
        assert!(regions[0].x < regions[1].x && regions[1].x < regions[2].x);
    }

    #[test]
    fn identifiers_are_unique_and_positional() {
        let results = processor().process_image(&triple_receipt_photo(), "table");
        assert_eq!(results.len(), 3);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["table_receipt01", "table_receipt02", "table_receipt03"]);
    }

    #[test]
    fn each_region_produces_a_full_result() {
        let results = processor().process_image(&triple_receipt_photo(), "table");
        for (_, result) in &results {
            assert!(result.gray.width() > 0);
            assert_eq!(result.ocr_ready.dimensions(), result.warped.as_ref().map_or(result.gray.dimensions(), |w| w.dimensions()));
        }
    }

    #[test]
    fn nested_contour_boxes_collapse_to_one_region() {
        let img: GrayImage = ImageBuffer::from_fn(200, 200, |x, y| {
            if (30..170).contains(&x) && (30..170).contains(&y) {
                Luma([230u8])
            } else {
                Luma([20u8])
            }
        });
        let regions = processor().detect_regions(&DynamicImage::ImageLuma8(img));
        assert_eq!(regions.len(), 1, "regions: {regions:?}");
    }

    #[test]
    fn featureless_image_yields_no_regions() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(100, 100, Luma([90u8])));
        assert!(processor().detect_regions(&img).is_empty());
    }

    #[test]
    fn padding_clamps_to_image_bounds() {
        let r = Region { x: 5, y: 5, width: 90, height: 90 };
        let padded = r.padded(12, 100, 100);
        assert_eq!(padded, Region { x: 0, y: 0, width: 100, height: 100 });
    }
}
