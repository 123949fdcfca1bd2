/// Output writer
///
/// Writes the fitted canvas and a square thumbnail into
/// `<output_root>/<view>/<laterality>/<patient_id>_<image_id>[_thumb].<ext>`.
/// Both files are encoded in memory, staged next to their final names and
/// renamed into place together, so a record leaves either both files or neither.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::canvas::FittedImage;
use crate::config::{OutputFormat, DEFAULT_JPEG_QUALITY, DEFAULT_THUMBNAIL_SIZE};
use crate::error::PreprocessError;
use crate::state::data::{ImageRecord, Laterality, View};

/// Files produced for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPaths {
    pub image: PathBuf,
    pub thumbnail: PathBuf,
}

/// Encodes and persists fitted images
#[derive(Debug, Clone, Copy)]
pub struct ImageWriter {
    format: OutputFormat,
    jpeg_quality: u8,
    thumbnail_size: u32,
}

impl ImageWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = size;
        self
    }

    /// Directory holding one view/laterality partition
    pub fn partition_dir(output_root: &Path, view: &View, laterality: Laterality) -> PathBuf {
        output_root.join(view.as_str()).join(laterality.as_str())
    }

    /// Where a record's image and thumbnail go
    pub fn output_paths(&self, output_root: &Path, record: &ImageRecord) -> WrittenPaths {
        let dir = Self::partition_dir(output_root, &record.view, record.laterality);
        let stem = record.stem();
        let ext = self.format.extension();
        WrittenPaths {
            image: dir.join(format!("{}.{}", stem, ext)),
            thumbnail: dir.join(format!("{}_thumb.{}", stem, ext)),
        }
    }

    /// Write the full canvas and its thumbnail as one unit
    pub fn write(
        &self,
        fitted: &FittedImage,
        record: &ImageRecord,
        output_root: &Path,
    ) -> Result<WrittenPaths, PreprocessError> {
        self.write_unless(fitted, record, output_root, || false)
    }

    /// Like `write`, but gives up once `cancelled()` returns true
    ///
    /// Both files are staged under `.partial` names and only renamed into place
    /// after the last cancellation check. On any failure (or cancellation) the
    /// staged files and both final paths are removed, so the record ends up with
    /// both files or neither, even when an earlier run had written them.
    pub fn write_unless(
        &self,
        fitted: &FittedImage,
        record: &ImageRecord,
        output_root: &Path,
        cancelled: impl Fn() -> bool,
    ) -> Result<WrittenPaths, PreprocessError> {
        let paths = self.output_paths(output_root, record);
        let dir = Self::partition_dir(output_root, &record.view, record.laterality);

        // create_dir_all succeeds if the directory already exists
        fs::create_dir_all(&dir).map_err(|e| write_error(&dir, e))?;

        let thumbnail = imageops::resize(
            &fitted.image,
            self.thumbnail_size,
            self.thumbnail_size,
            FilterType::Triangle,
        );

        let image_bytes = self.encode(&fitted.image).map_err(|e| write_error(&paths.image, e))?;
        let thumb_bytes = self.encode(&thumbnail).map_err(|e| write_error(&paths.thumbnail, e))?;

        let staged = WrittenPaths {
            image: staging_path(&paths.image),
            thumbnail: staging_path(&paths.thumbnail),
        };
        let committed = commit(&paths, &staged, &image_bytes, &thumb_bytes, &cancelled);
        if committed.is_err() {
            discard(&staged);
            discard(&paths);
        }
        committed?;

        debug!("💾 Wrote {} (+ thumbnail)", paths.image.display());
        Ok(paths)
    }

    /// Encode an 8-bit image in the configured format
    pub fn encode(&self, img: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        match self.format {
            OutputFormat::Png => img.write_to(&mut Cursor::new(&mut bytes), self.format.image_format())?,
            OutputFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut bytes, self.jpeg_quality).encode_image(img)?
            }
        }
        Ok(bytes)
    }
}

/// Stage both files, then rename them into place unless cancelled
fn commit(
    paths: &WrittenPaths,
    staged: &WrittenPaths,
    image_bytes: &[u8],
    thumb_bytes: &[u8],
    cancelled: &dyn Fn() -> bool,
) -> Result<(), PreprocessError> {
    fs::write(&staged.image, image_bytes).map_err(|e| write_error(&paths.image, e))?;
    fs::write(&staged.thumbnail, thumb_bytes).map_err(|e| write_error(&paths.thumbnail, e))?;

    if cancelled() {
        return Err(PreprocessError::Cancelled);
    }

    fs::rename(&staged.image, &paths.image).map_err(|e| write_error(&paths.image, e))?;
    fs::rename(&staged.thumbnail, &paths.thumbnail).map_err(|e| write_error(&paths.thumbnail, e))?;
    Ok(())
}

/// `<name>.<ext>.partial` next to the final file
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Remove a record's files, ignoring the ones that do not exist
pub fn discard(paths: &WrittenPaths) {
    for path in [&paths.image, &paths.thumbnail] {
        match fs::remove_file(path) {
            Ok(()) => debug!("🗑️  Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️  Could not remove {}: {}", path.display(), e),
        }
    }
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> PreprocessError {
    PreprocessError::Write {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Pre-create every standard view/laterality partition under `output_root`
///
/// Safe to call repeatedly; existing directories are left alone.
pub fn create_directory_structure(output_root: &Path) -> Result<(), PreprocessError> {
    for view in View::STANDARD.iter() {
        for laterality in Laterality::ALL {
            let dir = ImageWriter::partition_dir(output_root, view, laterality);
            fs::create_dir_all(&dir).map_err(|e| write_error(&dir, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasFitter;
    use crate::config::TargetSize;

    fn record() -> ImageRecord {
        ImageRecord::new("10006", "462822612", View::Cc, Laterality::Left)
    }

    fn fitted(edge: u32) -> FittedImage {
        let img = GrayImage::from_fn(edge, edge / 2, |x, _| image::Luma([(x % 256) as u8]));
        CanvasFitter::new(TargetSize::new(edge, edge)).fit(&img)
    }

    #[test]
    fn test_output_paths_layout() {
        let writer = ImageWriter::new(OutputFormat::Png);
        let paths = writer.output_paths(Path::new("/out"), &record());
        assert_eq!(paths.image, PathBuf::from("/out/CC/L/10006_462822612.png"));
        assert_eq!(paths.thumbnail, PathBuf::from("/out/CC/L/10006_462822612_thumb.png"));

        let jpeg = ImageWriter::new(OutputFormat::Jpeg).output_paths(Path::new("/out"), &record());
        assert_eq!(jpeg.image, PathBuf::from("/out/CC/L/10006_462822612.jpg"));
    }

    #[test]
    fn test_write_png_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(OutputFormat::Png).with_thumbnail_size(32);
        let paths = writer.write(&fitted(64), &record(), dir.path()).unwrap();

        let main = image::open(&paths.image).unwrap();
        let thumb = image::open(&paths.thumbnail).unwrap();
        assert_eq!((main.width(), main.height()), (64, 64));
        assert_eq!((thumb.width(), thumb.height()), (32, 32));
    }

    #[test]
    fn test_write_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(OutputFormat::Jpeg).with_thumbnail_size(16);
        let paths = writer.write(&fitted(48), &record(), dir.path()).unwrap();
        assert!(paths.image.extension().is_some_and(|e| e == "jpg"));
        let main = image::open(&paths.image).unwrap();
        assert_eq!((main.width(), main.height()), (48, 48));
    }

    #[test]
    fn test_unwritable_root_is_write_error_without_files() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the output root should be
        let root = dir.path().join("not-a-dir");
        fs::write(&root, b"x").unwrap();

        let writer = ImageWriter::new(OutputFormat::Png);
        let err = writer.write(&fitted(32), &record(), &root).unwrap_err();
        assert!(matches!(err, PreprocessError::Write { .. }));
        let paths = writer.output_paths(&root, &record());
        assert!(!paths.image.exists() && !paths.thumbnail.exists());
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_thumbnail_leaves_neither_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(OutputFormat::Png).with_thumbnail_size(16);
        let paths = writer.output_paths(dir.path(), &record());
        // A directory squatting on the thumbnail path makes the second file fail
        fs::create_dir_all(&paths.thumbnail).unwrap();

        let err = writer.write(&fitted(32), &record(), dir.path()).unwrap_err();
        assert!(matches!(err, PreprocessError::Write { .. }));
        assert!(!paths.image.exists());
        assert!(!paths.thumbnail.is_file());
        assert!(!file_names(paths.image.parent().unwrap()).iter().any(|n| n.ends_with(".partial")));
    }

    #[test]
    fn test_failed_rewrite_removes_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(OutputFormat::Png).with_thumbnail_size(16);
        let paths = writer.write(&fitted(32), &record(), dir.path()).unwrap();

        fs::remove_file(&paths.thumbnail).unwrap();
        fs::create_dir(&paths.thumbnail).unwrap();

        assert!(writer.write(&fitted(32), &record(), dir.path()).is_err());
        assert!(!paths.image.exists());
        assert!(!paths.thumbnail.is_file());
    }

    #[test]
    fn test_cancelled_write_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(OutputFormat::Png).with_thumbnail_size(16);
        let paths = writer.write(&fitted(32), &record(), dir.path()).unwrap();

        let err = writer
            .write_unless(&fitted(32), &record(), dir.path(), || true)
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Cancelled));
        assert!(file_names(paths.image.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        assert_eq!(
            staging_path(Path::new("/out/CC/L/1_2.png")),
            PathBuf::from("/out/CC/L/1_2.png.partial")
        );
    }

    #[test]
    fn test_directory_structure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        create_directory_structure(dir.path()).unwrap();
        create_directory_structure(dir.path()).unwrap();
        for view in ["CC", "MLO"] {
            for side in ["L", "R"] {
                assert!(dir.path().join(view).join(side).is_dir());
            }
        }
    }

    #[test]
    fn test_other_view_directory_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let record = ImageRecord::new("1", "2", View::Other("AT".to_string()), Laterality::Right);
        let paths = ImageWriter::new(OutputFormat::Png)
            .write(&fitted(32), &record, dir.path())
            .unwrap();
        assert!(paths.image.starts_with(dir.path().join("AT").join("R")));
    }
}
