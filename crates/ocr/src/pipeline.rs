use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use kvitto_core::{Config, ParsedReceipt};
use kvitto_vision::{MultiReceiptProcessor, PreprocessError, Preprocessor, ProcessResult};

use crate::adapter::recognize_result;
use crate::extract::parse_receipt;
use crate::recognizer::{OcrBackend, OcrError};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
}

/// The outcome of scanning one receipt (or one region of a multi-receipt
/// photo).
#[derive(Debug)]
pub struct ScanReport {
    /// Image stem, or `<stem>_receiptNN` for multi-receipt regions.
    pub identifier: String,
    /// Structured fields parsed from the OCR text.
    pub record: ParsedReceipt,
    /// Persisted step images, when artifact persistence was enabled.
    pub steps: BTreeMap<String, PathBuf>,
}

/// Orchestrates preprocess → OCR (with fallback chain) → parse.
pub struct ScanPipeline<R: OcrBackend> {
    recognizer: R,
    single: Preprocessor,
    multi: MultiReceiptProcessor,
}

impl<R: OcrBackend> ScanPipeline<R> {
    pub fn new(recognizer: R, config: Config) -> Self {
        Self {
            single: Preprocessor::new(config.pipeline.clone(), config.output.clone()),
            multi: MultiReceiptProcessor::new(config.pipeline, config.output),
            recognizer,
        }
    }

    /// Scan a single-receipt image file.
    pub fn scan_file(&self, path: &Path) -> Result<ScanReport, ScanError> {
        let result = self.single.process_path(path)?;
        let identifier = kvitto_vision::artifact::image_stem(path);
        let record = self.recognize_and_parse(&identifier, &result)?;
        Ok(ScanReport { identifier, record, steps: result.steps })
    }

    /// Scan an image containing several receipts; one report per detected
    /// region, in the segmenter's deterministic order. A region whose OCR
    /// call fails is reported and skipped — the rest continue.
    pub fn scan_multi(&self, path: &Path) -> Result<Vec<ScanReport>, ScanError> {
        let regions = self.multi.process_path(path)?;
        let mut reports = Vec::with_capacity(regions.len());
        for (identifier, result) in regions {
            match self.recognize_and_parse(&identifier, &result) {
                Ok(record) => {
                    reports.push(ScanReport { identifier, record, steps: result.steps })
                }
                Err(e) => warn!(region = %identifier, error = %e, "skipping region"),
            }
        }
        Ok(reports)
    }

    fn recognize_and_parse(
        &self,
        identifier: &str,
        result: &ProcessResult,
    ) -> Result<ParsedReceipt, ScanError> {
        let text = recognize_result(&self.recognizer, result)?;
        if text.is_empty() {
            info!(image = identifier, "OCR produced no text, emitting bare record");
        }
        Ok(parse_receipt(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

    fn write_receipt_photo(dir: &Path) -> PathBuf {
        let img: GrayImage = ImageBuffer::from_fn(200, 300, |x, y| {
            if (40..160).contains(&x) && (50..250).contains(&y) {
                Luma([240u8])
            } else {
                Luma([30u8])
            }
        });
        let path = dir.join("till_photo.png");
        DynamicImage::ImageLuma8(img).save(&path).unwrap();
        path
    }

    #[test]
    fn scan_file_parses_mock_ocr_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_receipt_photo(dir.path());
        let pipeline = ScanPipeline::new(
            MockRecognizer::new("STORE ABC\nWater 2 2.00\nSub Total 45.00\nTOTAL 45.00\nCash 50.00\nChange 5.00"),
            Config::default(),
        );

        let report = pipeline.scan_file(&path).unwrap();
        assert_eq!(report.identifier, "till_photo");
        assert_eq!(report.record.merchant.as_deref(), Some("STORE ABC"));
        assert_eq!(report.record.subtotal, Some(45.0));
        assert_eq!(report.record.total, Some(45.0));
        assert_eq!(report.record.cash, Some(50.0));
        assert_eq!(report.record.change, Some(5.0));
        assert_eq!(report.record.items.len(), 1);
    }

    #[test]
    fn empty_ocr_yields_bare_but_valid_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_receipt_photo(dir.path());
        let pipeline = ScanPipeline::new(MockRecognizer::new(""), Config::default());

        let report = pipeline.scan_file(&path).unwrap();
        assert_eq!(report.record.raw_text, "");
        assert!(report.record.is_bare());
    }

    #[test]
    fn missing_file_surfaces_preprocess_error() {
        let pipeline = ScanPipeline::new(MockRecognizer::new("x"), Config::default());
        let err = pipeline.scan_file(Path::new("/no/such/receipt.png")).unwrap_err();
        assert!(matches!(err, ScanError::Preprocess(_)));
    }
}
