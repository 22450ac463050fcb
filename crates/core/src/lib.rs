pub mod config;
pub mod receipt;

pub use config::{BinarizeStrategy, Config, ConfigError, OcrConfig, OutputConfig, PipelineConfig};
pub use receipt::{ParsedReceipt, ReceiptItem};
