use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use thiserror::Error;

use kvitto_core::OutputConfig;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to create output directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write step image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Persists intermediate pipeline images as
/// `<outputDir>/<imageStem>_<stageTag>.png`.
///
/// Persistence is side-effecting but non-essential: a disabled writer
/// records nothing, and callers treat write failures as warnings rather
/// than pipeline errors.
pub struct StepWriter {
    dir: PathBuf,
    stem: String,
    enabled: bool,
}

impl StepWriter {
    pub fn new(output: &OutputConfig, stem: &str) -> Self {
        Self {
            dir: output.dir.clone(),
            stem: stem.to_string(),
            enabled: output.save_steps,
        }
    }

    pub fn step_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.png", self.stem, tag))
    }

    /// Write one step image. Returns the path written, or `None` when the
    /// writer is disabled.
    pub fn save(&self, tag: &str, image: &DynamicImage) -> Result<Option<PathBuf>, ArtifactError> {
        if !self.enabled {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.step_path(tag);
        normalize_8bit(image).save_with_format(&path, image::ImageFormat::Png)?;
        Ok(Some(path))
    }

    pub fn save_gray(&self, tag: &str, image: &GrayImage) -> Result<Option<PathBuf>, ArtifactError> {
        if !self.enabled {
            return Ok(None);
        }
        self.save(tag, &DynamicImage::ImageLuma8(image.clone()))
    }
}

/// Bring any image down to 8 bits per channel before PNG encoding;
/// deeper formats are rescaled into the 0–255 range.
fn normalize_8bit(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => image.clone(),
        other if other.color().has_color() => DynamicImage::ImageRgb8(other.to_rgb8()),
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    }
}

/// Derive the file stem used in artifact and summary names.
pub fn image_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string()
}
