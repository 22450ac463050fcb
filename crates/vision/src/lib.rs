pub mod artifact;
pub mod binarize;
pub mod enhance;
pub mod geometry;
pub mod pipeline;
pub mod segment;

pub use artifact::{ArtifactError, StepWriter};
pub use geometry::{four_point_transform, order_corners};
pub use pipeline::{PreprocessError, Preprocessor, ProcessResult};
pub use segment::MultiReceiptProcessor;
