//! The single boundary between pipeline output and the OCR engine.
//!
//! Binarization sometimes over-thresholds delicate print and silently
//! destroys recoverable text, so recognition runs over a layered fallback
//! rather than trusting the cleaned image alone.

use std::io::Cursor;

use image::{DynamicImage, GrayImage};
use tracing::debug;

use kvitto_vision::ProcessResult;

use crate::recognizer::{OcrBackend, OcrError};

/// Run OCR over a pipeline result with the fallback chain
/// `ocr_ready` → `warped` (when present) → `gray`.
///
/// Returns the first non-empty trimmed text, or an empty string when every
/// attempt comes back blank — an empty result is degradation, not an error.
pub fn recognize_result<R: OcrBackend>(
    backend: &R,
    result: &ProcessResult,
) -> Result<String, OcrError> {
    let text = recognize_image(backend, &result.ocr_ready)?;
    if !text.is_empty() {
        return Ok(text);
    }

    if let Some(warped) = &result.warped {
        debug!("binarized image yielded no text, retrying on warped grayscale");
        let text = recognize_image(backend, warped)?;
        if !text.is_empty() {
            return Ok(text);
        }
    }

    debug!("retrying OCR on plain grayscale");
    recognize_image(backend, &result.gray)
}

fn recognize_image<R: OcrBackend>(backend: &R, image: &GrayImage) -> Result<String, OcrError> {
    Ok(backend.recognize(&encode_png(image)?)?.trim().to_string())
}

fn encode_png(image: &GrayImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
    Ok(buf)
}
