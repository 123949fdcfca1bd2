/// Per-record preprocessing pipeline
///
/// One record flows through Decode -> Normalize -> Fit -> Write. Every stage is
/// a plain function of its input; the only state the `Preprocessor` holds is
/// the validated configuration.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::canvas::{CanvasFitter, FittedImage};
use crate::config::{OutputFormat, PreprocessConfig};
use crate::error::{ConfigError, PreprocessError};
use crate::intensity::IntensityNormalizer;
use crate::raw::backend::DecodeChain;
use crate::raw::loader::ImageDecoder;
use crate::state::data::{ImageRecord, ImageSource};
use crate::writer::{ImageWriter, WrittenPaths};

/// Shared flag telling an in-flight record to stop before writing
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PreprocessError> {
        if self.is_cancelled() {
            return Err(PreprocessError::Cancelled);
        }
        Ok(())
    }
}

/// Validated preprocessing pipeline for single records
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
    format: OutputFormat,
    decoder: ImageDecoder,
    normalizer: IntensityNormalizer,
    fitter: CanvasFitter,
    writer: ImageWriter,
}

impl Preprocessor {
    /// Build a pipeline, rejecting invalid configuration before any record is read
    pub fn new(config: PreprocessConfig) -> Result<Self, ConfigError> {
        let format = config.validate()?;

        let decoder = ImageDecoder::new(&config.base_path, config.source_extension.as_str());
        let fitter = CanvasFitter::new(config.target_size);
        let writer = ImageWriter::new(format)
            .with_jpeg_quality(config.jpeg_quality)
            .with_thumbnail_size(config.thumbnail_size);

        Ok(Self {
            config,
            format,
            decoder,
            normalizer: IntensityNormalizer::default(),
            fitter,
            writer,
        })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Decode, normalize and fit one record without writing anything
    pub fn prepare(
        &self,
        record: &ImageRecord,
        source: ImageSource,
    ) -> Result<FittedImage, PreprocessError> {
        self.prepare_unless(record, source, &CancelFlag::new())
    }

    fn prepare_unless(
        &self,
        record: &ImageRecord,
        source: ImageSource,
        cancel: &CancelFlag,
    ) -> Result<FittedImage, PreprocessError> {
        // A fresh chain per record; nothing carries over between calls
        let chain = DecodeChain::default();
        let raw = self
            .decoder
            .decode(&record.patient_id, &record.image_id, source, &chain)?;
        debug!(
            "Decoded {}/{}: {}x{}",
            record.patient_id, record.image_id, raw.width, raw.height
        );
        cancel.check()?;

        let normalized = self.normalizer.normalize(&raw)?;
        cancel.check()?;

        Ok(self.fitter.fit(&normalized))
    }

    /// Run the whole pipeline for one record
    pub fn process_record(
        &self,
        record: &ImageRecord,
        source: ImageSource,
        output_root: &Path,
    ) -> Result<WrittenPaths, PreprocessError> {
        let fitted = self.prepare(record, source)?;
        self.writer.write(&fitted, record, output_root)
    }

    /// Like `process_record`, but stops between stages once `cancel` is set
    ///
    /// A cancelled record leaves no files: the writer checks the flag again
    /// after staging and before renaming anything into place.
    pub fn process_record_cancellable(
        &self,
        record: &ImageRecord,
        source: ImageSource,
        output_root: &Path,
        cancel: &CancelFlag,
    ) -> Result<WrittenPaths, PreprocessError> {
        let fitted = self.prepare_unless(record, source, cancel)?;
        self.writer
            .write_unless(&fitted, record, output_root, || cancel.is_cancelled())
    }
}
