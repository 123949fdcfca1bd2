/// Intensity normalization
///
/// Turns decoded stored values into an 8-bit display image:
/// 1. Widen to f64
/// 2. Clip to the VOI window (when the file carries one)
/// 3. Min-max normalize to [0, 1] (a constant image becomes all zeros)
/// 4. Scale to [0, 255] and quantize
/// 5. CLAHE (clip limit 2.0, 8x8 tiles)
/// 6. Invert MONOCHROME1 images

use image::GrayImage;
use tracing::debug;

use crate::contrast::Clahe;
use crate::error::PreprocessError;
use crate::raw::loader::RawIntensityArray;
use crate::raw::metadata::WindowLevel;

/// 8-bit single-channel image, values in [0, 255]
pub type NormalizedImage = GrayImage;

/// Applies windowing, normalization, contrast enhancement and polarity correction
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntensityNormalizer {
    clahe: Clahe,
}

impl IntensityNormalizer {
    pub fn new(clahe: Clahe) -> Self {
        Self { clahe }
    }

    /// Normalize one decoded image
    ///
    /// # Returns
    /// * `Ok(NormalizedImage)` with the same dimensions as the input
    /// * `Err(Normalization)` for empty or non-finite data, or an unusable window
    pub fn normalize(&self, raw: &RawIntensityArray) -> Result<NormalizedImage, PreprocessError> {
        let expected = raw.width as usize * raw.height as usize;
        if expected == 0 {
            return Err(PreprocessError::Normalization("image has no pixels".to_string()));
        }
        if raw.samples.len() != expected {
            return Err(PreprocessError::Normalization(format!(
                "expected {} samples for {}x{}, got {}",
                expected,
                raw.width,
                raw.height,
                raw.samples.len()
            )));
        }

        let mut values: Vec<f64> = raw.samples.iter().map(|&v| f64::from(v)).collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PreprocessError::Normalization("non-finite sample value".to_string()));
        }

        if let Some(window) = raw.window {
            apply_window(&mut values, window)?;
        }

        let quantized = to_u8(&min_max_normalize(&values));
        let img = GrayImage::from_raw(raw.width, raw.height, quantized).ok_or_else(|| {
            PreprocessError::Normalization("buffer does not match image dimensions".to_string())
        })?;

        let mut img = self.clahe.apply(&img);

        if raw.photometric.as_ref().is_some_and(|p| p.is_inverted()) {
            debug!("Inverting MONOCHROME1 image");
            invert(&mut img);
        }

        Ok(img)
    }
}

/// Clip every sample to `[center - width/2, center + width/2]`
pub fn apply_window(values: &mut [f64], window: WindowLevel) -> Result<(), PreprocessError> {
    if !window.center.is_finite() || !window.width.is_finite() || window.width <= 0.0 {
        return Err(PreprocessError::Normalization(format!(
            "invalid VOI window (center {}, width {})",
            window.center, window.width
        )));
    }
    let (lower, upper) = window.bounds();
    for v in values.iter_mut() {
        *v = v.clamp(lower, upper);
    }
    Ok(())
}

/// Scale to [0, 1]; a constant array maps to all zeros
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if values.is_empty() || max == min {
        return vec![0.0; values.len()];
    }

    let range = max - min;
    values.iter().map(|&v| (v - min) / range).collect()
}

/// Scale [0, 1] to [0, 255], truncating to 8 bits
pub fn to_u8(values: &[f64]) -> Vec<u8> {
    values
        .iter()
        .map(|&v| (v * 255.0).clamp(0.0, 255.0) as u8)
        .collect()
}

/// `pixel = 255 - pixel`
pub fn invert(img: &mut GrayImage) {
    for p in img.pixels_mut() {
        p[0] = 255 - p[0];
    }
}
