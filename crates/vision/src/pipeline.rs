use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, Contour};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::{close, open};
use imageproc::point::Point;
use thiserror::Error;
use tracing::{debug, info, warn};

use kvitto_core::{BinarizeStrategy, OutputConfig, PipelineConfig};

use crate::artifact::{image_stem, ArtifactError, StepWriter};
use crate::binarize::{adaptive_mean_threshold, otsu_binarize};
use crate::enhance::clahe;
use crate::geometry::four_point_transform;

/// Only the largest contours are candidates for the receipt boundary.
const MAX_QUAD_CANDIDATES: usize = 10;
/// Polygon approximation tolerance as a fraction of the contour perimeter.
const APPROX_EPSILON_FRACTION: f64 = 0.02;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("failed to load image: {0}")]
    Load(#[from] image::ImageError),
}

/// Everything one pipeline run produces.
///
/// `ocr_ready` and `gray` are always present; `warped` only when a
/// 4-vertex contour was accepted as the receipt boundary. `steps` maps
/// stage tags to persisted artifact paths (empty when persistence is off).
#[derive(Debug)]
pub struct ProcessResult {
    /// Binarized, morphologically cleaned image — the primary OCR input.
    pub ocr_ready: GrayImage,
    /// Grayscale before any destructive thresholding — last-resort OCR input.
    pub gray: GrayImage,
    /// Perspective-corrected grayscale, when a boundary quad was found.
    pub warped: Option<GrayImage>,
    pub steps: BTreeMap<String, PathBuf>,
}

/// The single-receipt preprocessing pipeline.
///
/// Strictly ordered stages: grayscale, CLAHE, Gaussian blur, Canny edges,
/// quadrilateral search, optional perspective correction, binarization,
/// morphological open then close. Edges are computed on the blurred
/// grayscale — never on the binarized image, which destroys the contour
/// geometry the quad search depends on.
pub struct Preprocessor {
    config: PipelineConfig,
    output: OutputConfig,
}

impl Preprocessor {
    pub fn new(config: PipelineConfig, output: OutputConfig) -> Self {
        Self { config, output }
    }

    /// Run the pipeline on an image file.
    pub fn process_path(&self, path: &Path) -> Result<ProcessResult, PreprocessError> {
        let img = image::open(path)?;
        info!(image = %path.display(), "preprocessing receipt image");
        Ok(self.process_image(&img, &image_stem(path)))
    }

    /// Run the pipeline on an already decoded image. Infallible: every
    /// stage past loading degrades instead of erroring.
    pub fn process_image(&self, img: &DynamicImage, stem: &str) -> ProcessResult {
        let cfg = &self.config;
        let writer = StepWriter::new(&self.output, stem);
        let mut steps = BTreeMap::new();

        record(&mut steps, "orig", writer.save("orig", img));

        let gray = img.to_luma8();
        record(&mut steps, "gray", writer.save_gray("gray", &gray));

        let enhanced = clahe(&gray, cfg.clahe_clip_limit, cfg.clahe_tile_grid);
        record(&mut steps, "clahe", writer.save_gray("clahe", &enhanced));

        let blurred = gaussian_blur_f32(&enhanced, sigma_for_kernel(cfg.blur_kernel));
        record(&mut steps, "blur", writer.save_gray("blur", &blurred));

        let edges = canny(&blurred, cfg.canny_low, cfg.canny_high);
        record(&mut steps, "edges", writer.save_gray("edges", &edges));

        let warped = find_receipt_quad(&edges).and_then(|corners| {
            match four_point_transform(&gray, corners) {
                Some(w) => {
                    debug!(width = w.width(), height = w.height(), "perspective corrected");
                    Some(w)
                }
                None => {
                    debug!("degenerate quadrilateral, keeping uncorrected grayscale");
                    None
                }
            }
        });
        if let Some(w) = &warped {
            record(&mut steps, "warped", writer.save_gray("warped", w));
        }

        let source = warped.as_ref().unwrap_or(&gray);
        let (binary, tag) = match cfg.strategy {
            BinarizeStrategy::Adaptive => (
                adaptive_mean_threshold(source, cfg.adaptive_block_size, cfg.adaptive_c),
                "th_adaptive",
            ),
            BinarizeStrategy::Otsu => (otsu_binarize(source), "th_otsu"),
        };
        record(&mut steps, tag, writer.save_gray(tag, &binary));

        // Opening strips speckle noise, closing reconnects broken strokes.
        // Opening must run first.
        let k = (cfg.morph_kernel / 2).max(1) as u8;
        let mut opened = binary;
        for _ in 0..cfg.morph_open_iterations {
            opened = open(&opened, Norm::LInf, k);
        }
        record(&mut steps, "morph_open", writer.save_gray("morph_open", &opened));

        let mut cleaned = opened;
        for _ in 0..cfg.morph_close_iterations {
            cleaned = close(&cleaned, Norm::LInf, k);
        }
        record(&mut steps, "morph_close", writer.save_gray("morph_close", &cleaned));

        ProcessResult { ocr_ready: cleaned, gray, warped, steps }
    }
}

fn record(
    steps: &mut BTreeMap<String, PathBuf>,
    tag: &str,
    saved: Result<Option<PathBuf>, ArtifactError>,
) {
    match saved {
        Ok(Some(path)) => {
            steps.insert(tag.to_string(), path);
        }
        Ok(None) => {}
        // Artifact persistence is best-effort; never fail the run over it.
        Err(e) => warn!(tag, error = %e, "failed to persist step image"),
    }
}

/// OpenCV's kernel-size to sigma mapping for Gaussian smoothing.
pub(crate) fn sigma_for_kernel(kernel: u32) -> f32 {
    0.3 * ((kernel.max(1) as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Search the edge map for the receipt boundary: take the largest contours
/// by enclosed area, approximate each at 2% of its perimeter, accept the
/// first that reduces to exactly four vertices. Finding none is the normal
/// case for receipts photographed flat-on.
fn find_receipt_quad(edges: &GrayImage) -> Option<[(f32, f32); 4]> {
    let contours: Vec<Contour<i32>> = find_contours(edges);
    let mut ranked: Vec<(f64, &Contour<i32>)> = contours
        .iter()
        .map(|c| (shoelace_area(&c.points), c))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    for &(area, contour) in ranked.iter().take(MAX_QUAD_CANDIDATES) {
        let perimeter = arc_length(&contour.points, true);
        let approx =
            approximate_polygon_dp(&contour.points, APPROX_EPSILON_FRACTION * perimeter, true);
        if approx.len() == 4 {
            debug!(area, "accepted 4-vertex contour as receipt boundary");
            return Some([
                (approx[0].x as f32, approx[0].y as f32),
                (approx[1].x as f32, approx[1].y as f32),
                (approx[2].x as f32, approx[2].y as f32),
                (approx[3].x as f32, approx[3].y as f32),
            ]);
        }
    }
    None
}

/// Enclosed polygon area via the shoelace formula.
pub(crate) fn shoelace_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        acc += points[i].x as i64 * points[j].y as i64;
        acc -= points[j].x as i64 * points[i].y as i64;
    }
    acc.unsigned_abs() as f64 / 2.0
}
