/// Record-level state
///
/// This module holds the inputs the pipeline consumes:
/// - Shared data structures for one exam image (data.rs)
/// - The metadata table loaded from CSV (library.rs)

pub mod library;
pub mod data;

pub use data::{ImageRecord, ImageSource, Laterality, View};
pub use library::MetadataTable;
