pub mod adapter;
pub mod extract;
pub mod pipeline;
pub mod recognizer;

pub use adapter::recognize_result;
pub use extract::{parse_receipt, split_receipts};
pub use pipeline::{ScanError, ScanPipeline, ScanReport};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError};
#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
