/// Acquisition metadata read alongside the pixel data
///
/// Only the attributes the normalizer needs are extracted here:
/// - VOI window (center/width, first value when multi-valued)
/// - Photometric interpretation (polarity)
/// - Transfer syntax classification (compressed or native pixel stream)

use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;

/// Transfer syntaxes whose pixel data is stored natively (not encapsulated)
const NATIVE_TRANSFER_SYNTAXES: [&str; 4] = [
    "1.2.840.10008.1.2",      // Implicit VR Little Endian
    "1.2.840.10008.1.2.1",    // Explicit VR Little Endian
    "1.2.840.10008.1.2.1.99", // Deflated Explicit VR Little Endian
    "1.2.840.10008.1.2.2",    // Explicit VR Big Endian
];

/// A linear VOI window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    pub center: f64,
    pub width: f64,
}

impl WindowLevel {
    pub fn new(center: f64, width: f64) -> Self {
        Self { center, width }
    }

    /// `[center - width/2, center + width/2]`
    pub fn bounds(&self) -> (f64, f64) {
        let half = self.width / 2.0;
        (self.center - half, self.center + half)
    }
}

/// Photometric interpretation of a monochrome image
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Photometric {
    /// Low values render bright; needs inversion
    Monochrome1,
    /// Low values render dark
    #[default]
    Monochrome2,
    Other(String),
}

impl Photometric {
    pub fn parse(value: &str) -> Self {
        match value.trim_end_matches('\0').trim() {
            "MONOCHROME1" => Photometric::Monochrome1,
            "MONOCHROME2" => Photometric::Monochrome2,
            other => Photometric::Other(other.to_string()),
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!(self, Photometric::Monochrome1)
    }
}

/// First value of a possibly multi-valued decimal string (`"2047\\4095"` -> 2047)
pub fn parse_first_value(value: &str) -> Option<f64> {
    value
        .split('\\')
        .next()
        .map(|v| v.trim_end_matches('\0').trim())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
}

/// Whether the given transfer syntax UID carries a compressed pixel stream
pub fn is_compressed_transfer_syntax(uid: &str) -> bool {
    let uid = uid.trim_end_matches('\0').trim();
    !NATIVE_TRANSFER_SYNTAXES.contains(&uid)
}

/// Transfer syntax UID from the file meta group
pub fn transfer_syntax(obj: &DefaultDicomObject) -> String {
    obj.meta().transfer_syntax().trim_end_matches('\0').to_string()
}

/// Window center/width, present only when both attributes parse
pub fn read_window(obj: &DefaultDicomObject) -> Option<WindowLevel> {
    let center = read_first_value(obj, tags::WINDOW_CENTER)?;
    let width = read_first_value(obj, tags::WINDOW_WIDTH)?;
    Some(WindowLevel::new(center, width))
}

/// Photometric interpretation, if the attribute is present
pub fn read_photometric(obj: &DefaultDicomObject) -> Option<Photometric> {
    let elem = obj.element(tags::PHOTOMETRIC_INTERPRETATION).ok()?;
    let value = elem.to_str().ok()?;
    Some(Photometric::parse(&value))
}

fn read_first_value(obj: &DefaultDicomObject, tag: dicom_core::Tag) -> Option<f64> {
    let elem = obj.element(tag).ok()?;
    let value = elem.to_str().ok()?;
    parse_first_value(&value)
}
