/// Preprocessing configuration
///
/// The configuration can be built in code, loaded from a JSON file,
/// or assembled from command-line flags. It is validated once, when the
/// `Preprocessor` is constructed, so an invalid value never reaches a record.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Default canvas edge (pixels)
pub const DEFAULT_TARGET_EDGE: u32 = 512;

/// Default thumbnail edge (pixels, square)
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 512;

/// Default JPEG quality (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// Encoded output format for both the main image and the thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    /// File extension written to disk (`jpg` and `jpeg` both write `.jpg`)
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            _ => Err(ConfigError::UnsupportedOutputFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Canvas size as (height, width)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub height: u32,
    pub width: u32,
}

impl TargetSize {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Reject zero-sized canvases
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.height == 0 || self.width == 0 {
            return Err(ConfigError::InvalidTargetSize {
                height: self.height,
                width: self.width,
            });
        }
        Ok(())
    }
}

impl Default for TargetSize {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_EDGE, DEFAULT_TARGET_EDGE)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

impl FromStr for TargetSize {
    type Err = String;

    /// Parse `HxW` (e.g. `1024x512`) or a single edge (`512`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid target size '{}': {}", s, e))
        };
        match s.split_once(['x', 'X']) {
            Some((h, w)) => Ok(Self::new(parse(h)?, parse(w)?)),
            None => {
                let edge = parse(s)?;
                Ok(Self::new(edge, edge))
            }
        }
    }
}

/// All recognised preprocessing options
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Root containing `train_images/` and `test_images/`
    pub base_path: PathBuf,

    /// Fixed output canvas
    pub target_size: TargetSize,

    /// `png`, `jpg` or `jpeg`; anything else is rejected at construction
    pub output_format: String,

    /// Extension of the source files (without the dot)
    pub source_extension: String,

    /// Edge of the square thumbnail written next to each image
    pub thumbnail_size: u32,

    /// Quality for JPEG output (1-100)
    pub jpeg_quality: u8,

    /// Optional per-record timeout, used by the timed batch runner
    pub record_timeout_secs: Option<u64>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            target_size: TargetSize::default(),
            output_format: "png".to_string(),
            source_extension: "dcm".to_string(),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            record_timeout_secs: None,
        }
    }
}

impl PreprocessConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file on disk
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Convert to a JSON string (written next to a processed corpus)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check every option and resolve the output format
    pub fn validate(&self) -> Result<OutputFormat, ConfigError> {
        let format = self.output_format.parse::<OutputFormat>()?;
        self.target_size.validate()?;
        if self.thumbnail_size == 0 {
            return Err(ConfigError::InvalidThumbnailSize);
        }
        if self.base_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyBasePath);
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidJpegQuality(self.jpeg_quality));
        }
        if self.record_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(format)
    }
}
