use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be odd, got {value}")]
    EvenKernel { field: &'static str, value: u32 },
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall { field: &'static str, min: u32, value: u32 },
    #[error("{field} must be within (0, 1], got {value}")]
    BadFraction { field: &'static str, value: f32 },
}

/// Which binarization strategy the pipeline applies after perspective
/// correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BinarizeStrategy {
    /// Local-mean threshold over a block neighbourhood minus a constant
    /// offset. Robust to uneven illumination.
    #[default]
    Adaptive,
    /// Single global cut value picked by Otsu's method. Faster, assumes
    /// roughly uniform lighting.
    Otsu,
}

/// Tuning knobs for the image preprocessing pipeline.
///
/// Immutable once built — thread a clone through each processor instead of
/// mutating shared state, so runs with different settings can coexist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// CLAHE clip limit.
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid — the image is split into an NxN grid of tiles.
    pub clahe_tile_grid: u32,
    /// Gaussian blur kernel size. Must be odd.
    pub blur_kernel: u32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    pub strategy: BinarizeStrategy,
    /// Adaptive threshold block size. Must be odd.
    pub adaptive_block_size: u32,
    /// Adaptive threshold constant offset, subtracted from the local mean.
    pub adaptive_c: i32,
    /// Morphology structuring element size. Must be odd.
    pub morph_kernel: u32,
    pub morph_open_iterations: u32,
    pub morph_close_iterations: u32,
    /// Multi-receipt segmentation: minimum region area as a fraction of
    /// the full image area.
    pub min_region_fraction: f32,
    /// Multi-receipt segmentation: padding added around each detected
    /// region before cropping, clamped to the image bounds.
    pub region_margin: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            blur_kernel: 3,
            canny_low: 50.0,
            canny_high: 150.0,
            strategy: BinarizeStrategy::Adaptive,
            adaptive_block_size: 31,
            adaptive_c: 10,
            morph_kernel: 3,
            morph_open_iterations: 1,
            morph_close_iterations: 1,
            min_region_fraction: 0.05,
            region_margin: 12,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("blur_kernel", self.blur_kernel),
            ("adaptive_block_size", self.adaptive_block_size),
            ("morph_kernel", self.morph_kernel),
        ] {
            if value % 2 == 0 {
                return Err(ConfigError::EvenKernel { field, value });
            }
        }
        if self.adaptive_block_size < 3 {
            return Err(ConfigError::TooSmall {
                field: "adaptive_block_size",
                min: 3,
                value: self.adaptive_block_size,
            });
        }
        if self.clahe_tile_grid < 1 {
            return Err(ConfigError::TooSmall {
                field: "clahe_tile_grid",
                min: 1,
                value: self.clahe_tile_grid,
            });
        }
        if !(self.min_region_fraction > 0.0 && self.min_region_fraction <= 1.0) {
            return Err(ConfigError::BadFraction {
                field: "min_region_fraction",
                value: self.min_region_fraction,
            });
        }
        Ok(())
    }
}

/// Settings handed to the OCR backend at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code(s), e.g. "eng" or "eng+swe".
    pub lang: String,
    /// Tesseract page segmentation mode. 6 = uniform block of text.
    pub psm: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { lang: "eng".to_string(), psm: 6 }
    }
}

/// Where results and optional step images land.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Persist every intermediate pipeline image alongside the results.
    pub save_steps: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("outputs"), save_steps: false }
    }
}

/// Top-level configuration, loadable from a TOML file. Every section is
/// optional and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub ocr: OcrConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()
    }
}
