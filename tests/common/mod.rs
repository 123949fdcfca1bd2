//! Fixture builders shared by the integration tests

#![allow(dead_code)]

use dicom_core::value::PixelFragmentSequence;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, StandardDataDictionary};
use dicom_object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use std::fs;
use std::path::{Path, PathBuf};

use mammo_prep::state::{ImageRecord, ImageSource, Laterality, View};

const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";
pub const JPEG_2000: &str = "1.2.840.10008.1.2.4.90";
const DIGITAL_MAMMOGRAPHY_PRESENTATION: &str = "1.2.840.10008.5.1.4.1.1.1.2";

/// A 16-bit monochrome image to be written as a DICOM file
pub struct Fixture {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<u16>,
    pub photometric: &'static str,
    pub window: Option<(f64, f64)>,
}

impl Fixture {
    /// Horizontal ramp from 0 to `max`
    pub fn ramp(width: u16, height: u16, max: u16) -> Self {
        let pixels = (0..height)
            .flat_map(|_| (0..width).map(move |x| (u32::from(x) * u32::from(max) / u32::from(width.max(2) - 1)) as u16))
            .collect();
        Self {
            width,
            height,
            pixels,
            photometric: "MONOCHROME2",
            window: None,
        }
    }

    pub fn monochrome1(mut self) -> Self {
        self.photometric = "MONOCHROME1";
        self
    }

    pub fn with_window(mut self, center: f64, width: f64) -> Self {
        self.window = Some((center, width));
        self
    }

    /// Write to an explicit path, creating parent directories
    pub fn write(&self, path: &Path, instance_uid: &str) {
        let mut obj = image_object(
            instance_uid,
            self.width,
            self.height,
            16,
            self.photometric,
            self.window,
        );
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(self.pixels.clone().into()),
        ));
        save(obj, path, EXPLICIT_VR_LITTLE_ENDIAN, instance_uid);
    }

    /// Write where the decoder expects a record's source file
    pub fn write_for(&self, base: &Path, source: ImageSource, record: &ImageRecord) -> PathBuf {
        let path = base
            .join(source.dir_name())
            .join(&record.patient_id)
            .join(format!("{}.dcm", record.image_id));
        self.write(&path, &format!("1.2.826.0.1.3680043.8.498.{}", record.image_id));
        path
    }
}

/// Baseline JPEG bitstream of an 8-bit horizontal ramp, padded to even length
pub fn jpeg_ramp(width: u32, height: u32) -> Vec<u8> {
    let img = image::GrayImage::from_fn(width, height, |x, _| {
        image::Luma([(x * 255 / (width - 1).max(1)) as u8])
    });
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 95)
        .encode_image(&img)
        .unwrap();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

/// Write an 8-bit monochrome image whose pixel data is one encapsulated fragment
pub fn write_encapsulated(
    path: &Path,
    transfer_syntax: &str,
    width: u16,
    height: u16,
    fragment: Vec<u8>,
    instance_uid: &str,
) {
    let mut obj = image_object(instance_uid, width, height, 8, "MONOCHROME2", None);
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        PixelFragmentSequence::new(Vec::<u32>::new(), vec![fragment]),
    ));
    save(obj, path, transfer_syntax, instance_uid);
}

fn image_object(
    instance_uid: &str,
    width: u16,
    height: u16,
    bits: u16,
    photometric: &str,
    window: Option<(f64, f64)>,
) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    let us = |tag, v: u16| DataElement::new(tag, VR::US, PrimitiveValue::from(v));

    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(DIGITAL_MAMMOGRAPHY_PRESENTATION),
    ));
    obj.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(instance_uid),
    ));
    obj.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MG")));
    obj.put(us(tags::SAMPLES_PER_PIXEL, 1));
    obj.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from(photometric),
    ));
    obj.put(us(tags::ROWS, height));
    obj.put(us(tags::COLUMNS, width));
    obj.put(us(tags::BITS_ALLOCATED, bits));
    obj.put(us(tags::BITS_STORED, bits));
    obj.put(us(tags::HIGH_BIT, bits - 1));
    obj.put(us(tags::PIXEL_REPRESENTATION, 0));
    if let Some((center, width)) = window {
        obj.put(DataElement::new(
            tags::WINDOW_CENTER,
            VR::DS,
            PrimitiveValue::from(center.to_string()),
        ));
        obj.put(DataElement::new(
            tags::WINDOW_WIDTH,
            VR::DS,
            PrimitiveValue::from(width.to_string()),
        ));
    }
    obj
}

fn save(obj: InMemDicomObject, path: &Path, transfer_syntax: &str, instance_uid: &str) {
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid(DIGITAL_MAMMOGRAPHY_PRESENTATION)
        .media_storage_sop_instance_uid(instance_uid)
        .build()
        .unwrap();

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in obj {
        file_obj.put(elem);
    }

    fs::create_dir_all(path.parent().unwrap()).unwrap();
    file_obj.write_to_file(path).unwrap();
}

pub fn record(patient_id: &str, image_id: &str, view: View, laterality: Laterality) -> ImageRecord {
    ImageRecord::new(patient_id, image_id, view, laterality)
}

/// Every regular file under `root`
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
