/// DICOM pixel loader
///
/// This module resolves a record to its source file, parses it, and runs the
/// backend chain until one backend produces samples. The chain is passed in by
/// the caller for every call, so two records needing different backends never
/// see each other's configuration.

use dicom_object::file::{OpenFileOptions, ReadPreamble};
use dicom_object::DefaultDicomObject;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::backend::{DecodeBackend, DecodeChain};
use super::metadata::{self, Photometric, WindowLevel};
use crate::error::PreprocessError;
use crate::state::data::ImageSource;

/// Decoded intensities of one image plus the acquisition metadata needed to normalize them
#[derive(Debug, Clone, PartialEq)]
pub struct RawIntensityArray {
    pub width: u32,
    pub height: u32,
    /// Row-major stored values of the first frame
    pub samples: Vec<f32>,
    /// VOI window, when the file carries both center and width
    pub window: Option<WindowLevel>,
    /// Photometric interpretation, when present
    pub photometric: Option<Photometric>,
}

impl RawIntensityArray {
    pub fn new(width: u32, height: u32, samples: Vec<f32>) -> Self {
        Self {
            width,
            height,
            samples,
            window: None,
            photometric: None,
        }
    }

    pub fn with_window(mut self, window: WindowLevel) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_photometric(mut self, photometric: Photometric) -> Self {
        self.photometric = Some(photometric);
        self
    }
}

/// Reads source files from `<base>/<train|test>_images/<patient_id>/<image_id>.<ext>`
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    base_path: PathBuf,
    extension: String,
}

impl ImageDecoder {
    pub fn new(base_path: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            extension: extension.into(),
        }
    }

    /// Expected location of a record's source file
    pub fn source_path(&self, patient_id: &str, image_id: &str, source: ImageSource) -> PathBuf {
        self.base_path
            .join(source.dir_name())
            .join(patient_id)
            .join(format!("{}.{}", image_id, self.extension))
    }

    /// Decode one record's source file
    ///
    /// # Arguments
    /// * `patient_id` / `image_id` - identify the file
    /// * `source` - train or test tree
    /// * `chain` - backends to try, in order
    ///
    /// # Returns
    /// * `Ok(RawIntensityArray)` from the first backend that succeeds
    /// * `Err(NotFound)` if the file is absent
    /// * `Err(Decode)` with the last backend's message if every backend fails
    pub fn decode(
        &self,
        patient_id: &str,
        image_id: &str,
        source: ImageSource,
        chain: &DecodeChain,
    ) -> Result<RawIntensityArray, PreprocessError> {
        let path = self.source_path(patient_id, image_id, source);
        self.decode_path(&path, chain)
    }

    /// Decode a file at an explicit path
    pub fn decode_path(
        &self,
        path: &Path,
        chain: &DecodeChain,
    ) -> Result<RawIntensityArray, PreprocessError> {
        if !path.is_file() {
            return Err(PreprocessError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let obj = open_dicom(path).map_err(|message| PreprocessError::Decode {
            path: path.to_path_buf(),
            backend: "dicom-parse",
            message,
        })?;

        let transfer_syntax = metadata::transfer_syntax(&obj);
        let compressed = metadata::is_compressed_transfer_syntax(&transfer_syntax);
        debug!(
            "Decoding {} (transfer syntax {}, compressed: {})",
            path.display(),
            transfer_syntax,
            compressed
        );

        let mut last_failure: Option<(DecodeBackend, String)> = None;
        for backend in chain.backends() {
            match backend.decode(&obj, compressed) {
                Ok(decoded) => {
                    debug!(
                        "   → {} decoded {}x{}",
                        backend,
                        decoded.width,
                        decoded.height
                    );
                    let mut raw = RawIntensityArray::new(decoded.width, decoded.height, decoded.samples);
                    raw.window = metadata::read_window(&obj);
                    raw.photometric = metadata::read_photometric(&obj);
                    return Ok(raw);
                }
                Err(e) => {
                    warn!("⚠️  {} failed for {}: {}, trying next backend", backend, path.display(), e);
                    last_failure = Some((*backend, e.to_string()));
                }
            }
        }

        let (backend, message) = match last_failure {
            Some((backend, message)) => (backend.name(), message),
            None => ("none", "decode chain is empty".to_string()),
        };
        Err(PreprocessError::Decode {
            path: path.to_path_buf(),
            backend,
            message,
        })
    }
}

/// Parse a DICOM file, tolerating a missing preamble
fn open_dicom(path: &Path) -> Result<DefaultDicomObject, String> {
    OpenFileOptions::new()
        .read_preamble(ReadPreamble::Auto)
        .open_file(path)
        .map_err(|e| format!("failed to parse DICOM: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_path_layout() {
        let decoder = ImageDecoder::new("/kaggle/input/rsna", "dcm");
        assert_eq!(
            decoder.source_path("10006", "462822612", ImageSource::Train),
            PathBuf::from("/kaggle/input/rsna/train_images/10006/462822612.dcm")
        );
        assert_eq!(
            decoder.source_path("10008", "736471439", ImageSource::Test),
            PathBuf::from("/kaggle/input/rsna/test_images/10008/736471439.dcm")
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let decoder = ImageDecoder::new("/nonexistent/base", "dcm");
        let result = decoder.decode("1", "2", ImageSource::Train, &DecodeChain::default());
        assert!(matches!(result, Err(PreprocessError::NotFound { .. })));
    }

    #[test]
    fn test_unparseable_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.dcm");
        std::fs::write(&path, b"definitely not a dicom file").unwrap();

        let decoder = ImageDecoder::new(dir.path(), "dcm");
        let err = decoder.decode_path(&path, &DecodeChain::default()).unwrap_err();
        assert!(matches!(err, PreprocessError::Decode { backend: "dicom-parse", .. }));
    }
}
