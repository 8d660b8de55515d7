use crate::{
    combine::{CombineError, CombineOptions, combine_slices},
    slice::{PixelArray, SliceRecord, StorageKind},
    volume::Volume,
};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use log::info;
use ndarray::{Array4, Axis, s};
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// MediaStorageSOPClassUID of a DICOMDIR
pub const MEDIA_STORAGE_DIRECTORY_STORAGE: &str = "1.2.840.10008.1.3.10";

/// Carried into [`SliceRecord::attributes`] when present.
const PASS_THROUGH: [(Tag, &str); 4] = [
    (tags::SOP_INSTANCE_UID, "SOPInstanceUID"),
    (tags::STUDY_INSTANCE_UID, "StudyInstanceUID"),
    (tags::SERIES_DESCRIPTION, "SeriesDescription"),
    (tags::ACQUISITION_NUMBER, "AcquisitionNumber"),
];

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Missing or malformed attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Unsupported pixel format: BitsAllocated {bits_allocated}, PixelRepresentation {pixel_representation}")]
    UnsupportedPixelFormat {
        bits_allocated: u16,
        pixel_representation: u16,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),

    #[error(transparent)]
    Combine(#[from] CombineError),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - DICOM file objects of one series, in any order
    /// * `options` - How the slices are ordered, validated and merged
    ///
    /// # Errors
    ///
    /// Returns error if no images remain after dropping DICOMDIR objects, an
    /// image lacks a required attribute, or the slices cannot be combined
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        options: &CombineOptions,
    ) -> Result<Volume, VolumeLoaderError> {
        let slices = dicom_objects
            .par_iter()
            .filter(|dicom_object| !Self::is_dicomdir(dicom_object))
            .map(Self::slice_record)
            .collect::<Result<Vec<_>, _>>()?;

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Ok(combine_slices(&slices, options)?)
    }

    /// Load a volume from file paths. Files that are not DICOM are skipped.
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        options: &CombineOptions,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Vec<_> = paths
            .par_iter()
            .filter_map(|path| match open_file(path.as_ref()) {
                Ok(object) => Some(object),
                Err(e) => {
                    info!("Skipping invalid DICOM file {:?}: {e}", path.as_ref());
                    None
                }
            })
            .collect();

        Self::load_from_dicom_objects(&objects, options)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        options: &CombineOptions,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<PathBuf> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, options)
    }

    fn is_dicomdir(dicom_object: &FileDicomObject<InMemDicomObject>) -> bool {
        let is_dicomdir = dicom_object
            .meta()
            .media_storage_sop_class_uid()
            .trim_end_matches(['\0', ' '])
            == MEDIA_STORAGE_DIRECTORY_STORAGE;
        if is_dicomdir {
            info!("Skipping DICOMDIR object");
        }
        is_dicomdir
    }

    /// Read the attributes the combiner needs and decode the first frame.
    ///
    /// Pixel data is decoded last, so a missing header attribute is reported
    /// by name.
    pub fn slice_record(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<SliceRecord, VolumeLoaderError> {
        let mut attributes = BTreeMap::new();
        for (tag, keyword) in PASS_THROUGH {
            if let Some(value) = Self::string(dicom_object, tag) {
                attributes.insert(keyword.to_owned(), value);
            }
        }

        let bits_allocated = Self::required_int(dicom_object, tags::BITS_ALLOCATED, "BitsAllocated")?;
        let pixel_representation =
            Self::required_int(dicom_object, tags::PIXEL_REPRESENTATION, "PixelRepresentation")?;

        Ok(SliceRecord {
            modality: Self::required_string(dicom_object, tags::MODALITY, "Modality")?,
            sop_class_uid: Self::required_string(dicom_object, tags::SOP_CLASS_UID, "SOPClassUID")?,
            series_instance_uid: Self::required_string(
                dicom_object,
                tags::SERIES_INSTANCE_UID,
                "SeriesInstanceUID",
            )?,
            rows: Self::required_int(dicom_object, tags::ROWS, "Rows")?,
            columns: Self::required_int(dicom_object, tags::COLUMNS, "Columns")?,
            samples_per_pixel: Self::required_int(dicom_object, tags::SAMPLES_PER_PIXEL, "SamplesPerPixel")?,
            pixel_spacing: Self::required_floats(dicom_object, tags::PIXEL_SPACING, "PixelSpacing")?,
            bits_allocated,
            bits_stored: Self::required_int(dicom_object, tags::BITS_STORED, "BitsStored")?,
            high_bit: Self::required_int(dicom_object, tags::HIGH_BIT, "HighBit")?,
            pixel_representation,
            image_orientation_patient: Self::required_floats(
                dicom_object,
                tags::IMAGE_ORIENTATION_PATIENT,
                "ImageOrientationPatient",
            )?,
            image_position_patient: Self::required_floats(
                dicom_object,
                tags::IMAGE_POSITION_PATIENT,
                "ImagePositionPatient",
            )?,
            instance_number: Self::int(dicom_object, tags::INSTANCE_NUMBER),
            rescale_slope: Self::float(dicom_object, tags::RESCALE_SLOPE),
            rescale_intercept: Self::float(dicom_object, tags::RESCALE_INTERCEPT),
            spacing_between_slices: Self::float(dicom_object, tags::SPACING_BETWEEN_SLICES),
            attributes,
            pixels: Self::decode_pixels(dicom_object, bits_allocated, pixel_representation)?,
        })
    }

    /// Stored values of the first frame, without the modality LUT.
    fn decode_pixels(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        bits_allocated: u16,
        pixel_representation: u16,
    ) -> Result<PixelArray, VolumeLoaderError> {
        let kind = StorageKind::from_dicom(bits_allocated, pixel_representation).ok_or(
            VolumeLoaderError::UnsupportedPixelFormat {
                bits_allocated,
                pixel_representation,
            },
        )?;
        let pixel_data = dicom_object.decode_pixel_data()?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);

        let pixels = match kind {
            StorageKind::U8 => first_frame(pixel_data.to_ndarray_with_options::<u8>(&options)?),
            StorageKind::I8 => first_frame(pixel_data.to_ndarray_with_options::<i8>(&options)?),
            StorageKind::U16 => first_frame(pixel_data.to_ndarray_with_options::<u16>(&options)?),
            StorageKind::I16 => first_frame(pixel_data.to_ndarray_with_options::<i16>(&options)?),
            StorageKind::U32 => first_frame(pixel_data.to_ndarray_with_options::<u32>(&options)?),
            StorageKind::I32 => first_frame(pixel_data.to_ndarray_with_options::<i32>(&options)?),
            StorageKind::F32 | StorageKind::F64 => {
                return Err(VolumeLoaderError::UnsupportedPixelFormat {
                    bits_allocated,
                    pixel_representation,
                });
            }
        };
        Ok(pixels)
    }

    fn string(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<String> {
        let value = dicom_object.element(tag).ok()?.to_str().ok()?;
        Some(value.trim_end_matches(['\0', ' ']).to_owned())
    }

    fn int<T: TryFrom<i64>>(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<T> {
        let value = dicom_object.element(tag).ok()?.to_int::<i64>().ok()?;
        T::try_from(value).ok()
    }

    fn float(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn required_string(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
        keyword: &'static str,
    ) -> Result<String, VolumeLoaderError> {
        Self::string(dicom_object, tag).ok_or(VolumeLoaderError::MissingAttribute(keyword))
    }

    fn required_int<T: TryFrom<i64>>(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
        keyword: &'static str,
    ) -> Result<T, VolumeLoaderError> {
        Self::int(dicom_object, tag).ok_or(VolumeLoaderError::MissingAttribute(keyword))
    }

    fn required_floats<const N: usize>(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
        keyword: &'static str,
    ) -> Result<[f64; N], VolumeLoaderError> {
        dicom_object
            .element(tag)
            .ok()
            .and_then(|element| element.to_multi_float64().ok())
            .and_then(|values| <[f64; N]>::try_from(values).ok())
            .ok_or(VolumeLoaderError::MissingAttribute(keyword))
    }
}

/// `(frames, rows, columns, samples)` down to `(rows, columns)` or
/// `(rows, columns, samples)` of frame 0.
fn first_frame<T>(frames: Array4<T>) -> PixelArray
where
    PixelArray: From<ndarray::Array3<T>> + From<ndarray::Array2<T>>,
{
    let frame = frames.slice_move(s![0, .., .., ..]);
    if frame.len_of(Axis(2)) == 1 {
        PixelArray::from(frame.index_axis_move(Axis(2), 0))
    } else {
        PixelArray::from(frame)
    }
}
