/// Pixel decoding backends
///
/// Each backend turns a parsed DICOM object into a grid of samples, or
/// explains why it could not. Backends are tried in order by the loader:
/// - Tier 1: `PixelDataCodec` - the pixel data codec registry (decompresses when needed)
/// - Tier 2: `EncapsulatedJpeg` - software JPEG decode of the encapsulated fragments
/// - Tier 3: `NativeRaw` - reads an uncompressed pixel stream with no codec at all
///
/// The chain is a plain value handed to each decode call. Nothing here is global.

use dicom_core::value::PrimitiveValue;
use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use image::DynamicImage;
use std::fmt;

/// Samples of the first frame, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSamples {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<f32>,
}

/// Why a single backend gave up
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The backend does not handle this kind of pixel stream
    NotApplicable(String),
    /// The backend tried and failed
    Failed(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NotApplicable(msg) => write!(f, "not applicable: {}", msg),
            BackendError::Failed(msg) => f.write_str(msg),
        }
    }
}

/// One way of turning pixel data into samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeBackend {
    PixelDataCodec,
    EncapsulatedJpeg,
    NativeRaw,
}

impl DecodeBackend {
    pub fn name(&self) -> &'static str {
        match self {
            DecodeBackend::PixelDataCodec => "pixel-data-codec",
            DecodeBackend::EncapsulatedJpeg => "encapsulated-jpeg",
            DecodeBackend::NativeRaw => "native-raw",
        }
    }

    /// Run this backend against an already-parsed object
    ///
    /// # Arguments
    /// * `obj` - the parsed file
    /// * `compressed` - whether the transfer syntax says the pixel stream is compressed
    pub fn decode(
        &self,
        obj: &DefaultDicomObject,
        compressed: bool,
    ) -> Result<DecodedSamples, BackendError> {
        match self {
            DecodeBackend::PixelDataCodec => decode_with_codec(obj),
            DecodeBackend::EncapsulatedJpeg => {
                if !compressed {
                    return Err(BackendError::NotApplicable(
                        "pixel data is not encapsulated".to_string(),
                    ));
                }
                decode_encapsulated_jpeg(obj)
            }
            DecodeBackend::NativeRaw => {
                if compressed {
                    return Err(BackendError::NotApplicable(
                        "pixel data is compressed".to_string(),
                    ));
                }
                decode_native_raw(obj)
            }
        }
    }
}

impl fmt::Display for DecodeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of backends, first success wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeChain {
    backends: Vec<DecodeBackend>,
}

impl DecodeChain {
    pub fn new(backends: Vec<DecodeBackend>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &[DecodeBackend] {
        &self.backends
    }
}

impl Default for DecodeChain {
    fn default() -> Self {
        Self::new(vec![
            DecodeBackend::PixelDataCodec,
            DecodeBackend::EncapsulatedJpeg,
            DecodeBackend::NativeRaw,
        ])
    }
}

/// Tier 1: the pixel data codec registry, raw stored values (no modality LUT)
fn decode_with_codec(obj: &DefaultDicomObject) -> Result<DecodedSamples, BackendError> {
    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| BackendError::Failed(format!("decompression failed: {}", e)))?;

    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let array = decoded
        .to_ndarray_with_options::<f32>(&options)
        .map_err(|e| BackendError::Failed(format!("pixel conversion failed: {}", e)))?;

    // Shape is [frames, rows, columns, samples]
    let shape = array.shape().to_vec();
    if shape.len() != 4 {
        return Err(BackendError::Failed(format!("unexpected pixel array shape {:?}", shape)));
    }
    let (rows, columns, samples_per_pixel) = (shape[1], shape[2], shape[3].max(1));

    let samples: Vec<f32> = array
        .iter()
        .step_by(samples_per_pixel)
        .take(rows * columns)
        .copied()
        .collect();

    finish(columns, rows, samples)
}

/// Tier 2: JPEG bitstream inside the encapsulated fragments, decoded in software
fn decode_encapsulated_jpeg(obj: &DefaultDicomObject) -> Result<DecodedSamples, BackendError> {
    let elem = obj
        .element(tags::PIXEL_DATA)
        .map_err(|e| BackendError::Failed(format!("no pixel data: {}", e)))?;

    let fragments = elem
        .value()
        .fragments()
        .ok_or_else(|| BackendError::NotApplicable("pixel data has no fragments".to_string()))?;

    // Single-frame images: every fragment belongs to frame 0
    let bitstream: Vec<u8> = fragments.iter().flat_map(|f| f.iter().copied()).collect();
    if bitstream.is_empty() {
        return Err(BackendError::Failed("encapsulated pixel data is empty".to_string()));
    }

    let img = image::load_from_memory_with_format(&bitstream, image::ImageFormat::Jpeg)
        .map_err(|e| BackendError::Failed(format!("JPEG decode failed: {}", e)))?;

    let (width, height) = (img.width() as usize, img.height() as usize);
    // Keep stored units so the VOI window still applies
    let samples: Vec<f32> = match img {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        other => other.to_luma8().into_raw().into_iter().map(f32::from).collect(),
    };

    finish(width, height, samples)
}

/// Tier 3: read the native pixel stream directly from the element bytes
fn decode_native_raw(obj: &DefaultDicomObject) -> Result<DecodedSamples, BackendError> {
    let read_u16 = |tag: dicom_core::Tag, name: &str| -> Result<u16, BackendError> {
        obj.element(tag)
            .map_err(|e| BackendError::Failed(format!("missing {}: {}", name, e)))?
            .to_int::<u16>()
            .map_err(|e| BackendError::Failed(format!("invalid {}: {}", name, e)))
    };

    let rows = read_u16(tags::ROWS, "Rows")? as usize;
    let columns = read_u16(tags::COLUMNS, "Columns")? as usize;
    let bits_allocated = read_u16(tags::BITS_ALLOCATED, "BitsAllocated")?;
    let signed = read_u16(tags::PIXEL_REPRESENTATION, "PixelRepresentation").unwrap_or(0) == 1;
    let samples_per_pixel = read_u16(tags::SAMPLES_PER_PIXEL, "SamplesPerPixel")
        .unwrap_or(1)
        .max(1) as usize;

    let pixel_count = rows * columns;
    let elem = obj
        .element(tags::PIXEL_DATA)
        .map_err(|e| BackendError::Failed(format!("no pixel data: {}", e)))?;
    let primitive = elem
        .value()
        .primitive()
        .ok_or_else(|| {
            BackendError::NotApplicable("pixel data is not a primitive value".to_string())
        })?;

    let interleaved: Vec<f32> = match (primitive, bits_allocated) {
        // Words already decoded in the file's byte order
        (PrimitiveValue::U16(words), 16) => words
            .iter()
            .map(|&w| if signed { f32::from(w as i16) } else { f32::from(w) })
            .collect(),
        (PrimitiveValue::U8(bytes), 8) => bytes
            .iter()
            .map(|&b| if signed { f32::from(b as i8) } else { f32::from(b) })
            .collect(),
        (PrimitiveValue::U8(bytes), 16) => bytes
            .chunks_exact(2)
            .map(|c| {
                let raw = u16::from_le_bytes([c[0], c[1]]);
                if signed { f32::from(raw as i16) } else { f32::from(raw) }
            })
            .collect(),
        (PrimitiveValue::U8(bytes), 32) => bytes
            .chunks_exact(4)
            .map(|c| {
                let raw = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                if signed { raw as i32 as f32 } else { raw as f32 }
            })
            .collect(),
        (_, bits) => {
            return Err(BackendError::Failed(format!(
                "unsupported native layout ({} bits allocated)",
                bits
            )))
        }
    };

    if interleaved.len() < pixel_count * samples_per_pixel {
        return Err(BackendError::Failed(format!(
            "pixel data too short: {} samples for {}x{}",
            interleaved.len(),
            columns,
            rows
        )));
    }

    let samples = interleaved
        .into_iter()
        .step_by(samples_per_pixel)
        .take(pixel_count)
        .collect();

    finish(columns, rows, samples)
}

fn finish(width: usize, height: usize, samples: Vec<f32>) -> Result<DecodedSamples, BackendError> {
    if width == 0 || height == 0 || samples.len() != width * height {
        return Err(BackendError::Failed(format!(
            "decoded {} samples for a {}x{} image",
            samples.len(),
            width,
            height
        )));
    }
    Ok(DecodedSamples {
        width: width as u32,
        height: height as u32,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_order() {
        let chain = DecodeChain::default();
        assert_eq!(
            chain.backends(),
            &[
                DecodeBackend::PixelDataCodec,
                DecodeBackend::EncapsulatedJpeg,
                DecodeBackend::NativeRaw,
            ]
        );
    }

    #[test]
    fn test_finish_rejects_mismatched_length() {
        assert!(finish(2, 2, vec![0.0; 3]).is_err());
        assert!(finish(0, 2, vec![]).is_err());
        let ok = finish(2, 1, vec![1.0, 2.0]).unwrap();
        assert_eq!((ok.width, ok.height), (2, 1));
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::NotApplicable("pixel data is compressed".to_string());
        assert_eq!(err.to_string(), "not applicable: pixel data is compressed");
    }
}
