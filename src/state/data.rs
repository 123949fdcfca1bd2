/// Shared data structures for the pipeline
///
/// These structs represent one row of the externally-owned metadata table.
/// The pipeline reads them and never mutates them.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::MetadataError;

/// Mammographic view position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum View {
    /// Cranio-caudal
    Cc,
    /// Medio-lateral oblique
    Mlo,
    /// Any other view code present in the table (e.g. `AT`, `ML`, `LM`)
    Other(String),
}

impl View {
    /// Views whose output directories are pre-created before a batch
    pub const STANDARD: [View; 2] = [View::Cc, View::Mlo];

    pub fn as_str(&self) -> &str {
        match self {
            View::Cc => "CC",
            View::Mlo => "MLO",
            View::Other(code) => code,
        }
    }
}

impl FromStr for View {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        match code.to_ascii_uppercase().as_str() {
            "CC" => Ok(View::Cc),
            "MLO" => Ok(View::Mlo),
            // The code becomes a directory name
            upper if !upper.is_empty() && upper.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(View::Other(upper.to_string()))
            }
            _ => Err(MetadataError::InvalidField {
                field: "view",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for View {
    type Error = MetadataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breast side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Laterality {
    Left,
    Right,
}

impl Laterality {
    pub const ALL: [Laterality; 2] = [Laterality::Left, Laterality::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Laterality::Left => "L",
            Laterality::Right => "R",
        }
    }
}

impl FromStr for Laterality {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(Laterality::Left),
            "R" => Ok(Laterality::Right),
            _ => Err(MetadataError::InvalidField {
                field: "laterality",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Laterality {
    type Error = MetadataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Laterality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which source tree a batch reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSource {
    #[default]
    Train,
    Test,
}

impl ImageSource {
    /// Directory name under `base_path`
    pub fn dir_name(&self) -> &'static str {
        match self {
            ImageSource::Train => "train_images",
            ImageSource::Test => "test_images",
        }
    }
}

impl FromStr for ImageSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(ImageSource::Train),
            "test" => Ok(ImageSource::Test),
            other => Err(format!("unknown source '{}', expected 'train' or 'test'", other)),
        }
    }
}

/// One exam image, as listed in the metadata table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageRecord {
    pub patient_id: String,
    pub image_id: String,
    pub view: View,
    pub laterality: Laterality,
    /// Present only for training rows (`cancer` column)
    #[serde(default, rename = "cancer")]
    pub label: Option<f32>,
    /// Cross-validation fold, if the table carries one
    #[serde(default)]
    pub fold: Option<u32>,
}

impl ImageRecord {
    pub fn new(
        patient_id: impl Into<String>,
        image_id: impl Into<String>,
        view: View,
        laterality: Laterality,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            image_id: image_id.into(),
            view,
            laterality,
            label: None,
            fold: None,
        }
    }

    /// `<patient_id>_<image_id>`, the output file stem
    pub fn stem(&self) -> String {
        format!("{}_{}", self.patient_id, self.image_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_parsing() {
        assert_eq!("CC".parse::<View>().unwrap(), View::Cc);
        assert_eq!("mlo".parse::<View>().unwrap(), View::Mlo);
        assert_eq!("AT".parse::<View>().unwrap(), View::Other("AT".to_string()));
        assert!("../etc".parse::<View>().is_err());
        assert!("".parse::<View>().is_err());
    }

    #[test]
    fn test_laterality_parsing() {
        assert_eq!("L".parse::<Laterality>().unwrap(), Laterality::Left);
        assert_eq!(" r ".parse::<Laterality>().unwrap(), Laterality::Right);
        assert!("B".parse::<Laterality>().is_err());
    }

    #[test]
    fn test_record_stem() {
        let record = ImageRecord::new("10006", "462822612", View::Cc, Laterality::Left);
        assert_eq!(record.stem(), "10006_462822612");
    }

    #[test]
    fn test_source_dir_names() {
        assert_eq!(ImageSource::Train.dir_name(), "train_images");
        assert_eq!("test".parse::<ImageSource>().unwrap(), ImageSource::Test);
    }
}
