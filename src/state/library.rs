use std::io::Read;
use std::path::Path;
use tracing::info;

use super::data::ImageRecord;
use crate::error::MetadataError;

/// Columns every row must provide
const REQUIRED_COLUMNS: [&str; 4] = ["patient_id", "image_id", "view", "laterality"];

/// The metadata table: an ordered list of exam images.
///
/// Loaded once from `train.csv` / `test.csv`. Schema problems (missing
/// columns, unknown view or laterality codes) are reported here, at load
/// time, so they never show up as per-record failures inside a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    records: Vec<ImageRecord>,
}

impl MetadataTable {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self { records }
    }

    /// Load a table from a CSV file with a header row
    pub fn from_csv_path(path: &Path) -> Result<Self, MetadataError> {
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let table = Self::from_csv(reader)?;
        info!("📋 Loaded {} records from {}", table.len(), path.display());
        Ok(table)
    }

    /// Load a table from any CSV source (used for in-memory tables)
    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, MetadataError> {
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
        Self::from_csv(reader)
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, MetadataError> {
        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(MetadataError::MissingColumn(column));
            }
        }

        let mut records = Vec::new();
        for row in reader.deserialize::<ImageRecord>() {
            records.push(row?);
        }

        Ok(Self { records })
    }

    /// Keep only the first `n` rows (debug / sample runs)
    pub fn head(mut self, n: usize) -> Self {
        self.records.truncate(n);
        self
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
