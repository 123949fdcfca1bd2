/// DICOM decoding module
///
/// This module handles:
/// - Resolving a record to its source file (loader.rs)
/// - Trying an ordered chain of pixel decoders (backend.rs)
/// - Reading VOI window, polarity and transfer syntax (metadata.rs)

pub mod backend;
pub mod loader;
pub mod metadata;

pub use backend::{DecodeBackend, DecodeChain};
pub use loader::{ImageDecoder, RawIntensityArray};
pub use metadata::{Photometric, WindowLevel};
