//! Mammography DICOM preprocessing
//!
//! Converts screening mammograms into fixed-size 8-bit images partitioned by
//! view and laterality:
//! - `raw` decodes DICOM pixel data through an ordered chain of backends
//! - `intensity` and `contrast` window, normalize, equalize and fix polarity
//! - `canvas` resizes with preserved aspect and pads onto the target canvas
//! - `writer` persists each image together with its thumbnail
//! - `batch` runs the pipeline over a metadata table and counts outcomes

pub mod batch;
pub mod canvas;
pub mod config;
pub mod contrast;
pub mod error;
pub mod intensity;
pub mod processor;
pub mod raw;
pub mod state;
pub mod writer;

pub use batch::{BatchProcessor, BatchSummary, ProcessingOutcome, RecordFailure};
pub use canvas::{CanvasFitter, FittedImage, Padding};
pub use config::{OutputFormat, PreprocessConfig, TargetSize};
pub use error::{ConfigError, FailureKind, MetadataError, PreprocessError};
pub use intensity::{IntensityNormalizer, NormalizedImage};
pub use processor::{CancelFlag, Preprocessor};
pub use writer::{ImageWriter, WrittenPaths};
