use std::borrow::Borrow;
use std::collections::BTreeMap;

use nalgebra::Vector3;
use ndarray::{Array, ArrayD, Dimension};

/// Numeric storage of a pixel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl StorageKind {
    pub fn bits(self) -> u16 {
        match self {
            StorageKind::U8 | StorageKind::I8 => 8,
            StorageKind::U16 | StorageKind::I16 => 16,
            StorageKind::U32 | StorageKind::I32 | StorageKind::F32 => 32,
            StorageKind::F64 => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        !matches!(
            self,
            StorageKind::U8 | StorageKind::U16 | StorageKind::U32
        )
    }

    /// Integer storage described by BitsAllocated (0028,0100) and
    /// PixelRepresentation (0028,0103).
    pub fn from_dicom(bits_allocated: u16, pixel_representation: u16) -> Option<Self> {
        match (bits_allocated, pixel_representation) {
            (8, 0) => Some(StorageKind::U8),
            (8, 1) => Some(StorageKind::I8),
            (16, 0) => Some(StorageKind::U16),
            (16, 1) => Some(StorageKind::I16),
            (32, 0) => Some(StorageKind::U32),
            (32, 1) => Some(StorageKind::I32),
            _ => None,
        }
    }
}

/// Pixel buffer of one slice, shaped `(rows, columns)` or
/// `(rows, columns, samples)`.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelArray {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! pixel_array_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<D: Dimension> From<Array<$ty, D>> for PixelArray {
                fn from(array: Array<$ty, D>) -> Self {
                    PixelArray::$variant(array.into_dyn())
                }
            }
        )*
    };
}

pixel_array_from!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    f64 => F64,
);

impl PixelArray {
    pub fn kind(&self) -> StorageKind {
        match self {
            PixelArray::U8(_) => StorageKind::U8,
            PixelArray::I8(_) => StorageKind::I8,
            PixelArray::U16(_) => StorageKind::U16,
            PixelArray::I16(_) => StorageKind::I16,
            PixelArray::U32(_) => StorageKind::U32,
            PixelArray::I32(_) => StorageKind::I32,
            PixelArray::F32(_) => StorageKind::F32,
            PixelArray::F64(_) => StorageKind::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            PixelArray::U8(a) => a.shape(),
            PixelArray::I8(a) => a.shape(),
            PixelArray::U16(a) => a.shape(),
            PixelArray::I16(a) => a.shape(),
            PixelArray::U32(a) => a.shape(),
            PixelArray::I32(a) => a.shape(),
            PixelArray::F32(a) => a.shape(),
            PixelArray::F64(a) => a.shape(),
        }
    }
}

/// Row, column and slice direction cosines of an image plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cosines {
    pub row: Vector3<f64>,
    pub column: Vector3<f64>,
    pub slice: Vector3<f64>,
}

impl Cosines {
    pub fn from_orientation(orientation: &[f64; 6]) -> Self {
        let row = Vector3::new(orientation[0], orientation[1], orientation[2]);
        let column = Vector3::new(orientation[3], orientation[4], orientation[5]);
        Self {
            row,
            column,
            slice: row.cross(&column),
        }
    }
}

/// One decoded image of a series: the attributes the combiner inspects plus
/// its pixel buffer.
///
/// Attribute names follow the DICOM keywords they are read from. Attributes
/// that are carried along but never interpreted live in `attributes`.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceRecord {
    pub modality: String,
    pub sop_class_uid: String,
    pub series_instance_uid: String,
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u16,
    /// `[row spacing, column spacing]`
    pub pixel_spacing: [f64; 2],
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    pub pixel_representation: u16,
    /// Row cosine followed by column cosine
    pub image_orientation_patient: [f64; 6],
    pub image_position_patient: [f64; 3],
    pub instance_number: Option<i32>,
    pub rescale_slope: Option<f64>,
    pub rescale_intercept: Option<f64>,
    pub spacing_between_slices: Option<f64>,
    pub attributes: BTreeMap<String, String>,
    pub pixels: PixelArray,
}

impl SliceRecord {
    /// An axial slice at the origin with unit pixel spacing, geometry
    /// attributes derived from the pixel buffer.
    pub fn new(pixels: impl Into<PixelArray>) -> Self {
        let pixels = pixels.into();
        let shape = pixels.shape();
        let rows = shape.first().copied().unwrap_or(0) as u32;
        let columns = shape.get(1).copied().unwrap_or(0) as u32;
        let samples_per_pixel = shape.get(2).copied().unwrap_or(1) as u16;
        let kind = pixels.kind();
        let bits = kind.bits();

        Self {
            modality: String::new(),
            sop_class_uid: String::new(),
            series_instance_uid: String::new(),
            rows,
            columns,
            samples_per_pixel,
            pixel_spacing: [1.0, 1.0],
            bits_allocated: bits,
            bits_stored: bits,
            high_bit: bits - 1,
            pixel_representation: u16::from(kind.is_signed()),
            image_orientation_patient: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            image_position_patient: [0.0; 3],
            instance_number: None,
            rescale_slope: None,
            rescale_intercept: None,
            spacing_between_slices: None,
            attributes: BTreeMap::new(),
            pixels,
        }
    }

    pub fn with_modality(mut self, modality: impl Into<String>) -> Self {
        self.modality = modality.into();
        self
    }

    pub fn with_sop_class_uid(mut self, uid: impl Into<String>) -> Self {
        self.sop_class_uid = uid.into();
        self
    }

    pub fn with_series_instance_uid(mut self, uid: impl Into<String>) -> Self {
        self.series_instance_uid = uid.into();
        self
    }

    pub fn with_pixel_spacing(mut self, row_spacing: f64, column_spacing: f64) -> Self {
        self.pixel_spacing = [row_spacing, column_spacing];
        self
    }

    pub fn with_orientation(mut self, orientation: [f64; 6]) -> Self {
        self.image_orientation_patient = orientation;
        self
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.image_position_patient = position;
        self
    }

    pub fn with_instance_number(mut self, instance_number: i32) -> Self {
        self.instance_number = Some(instance_number);
        self
    }

    pub fn with_rescale_slope(mut self, slope: f64) -> Self {
        self.rescale_slope = Some(slope);
        self
    }

    pub fn with_rescale_intercept(mut self, intercept: f64) -> Self {
        self.rescale_intercept = Some(intercept);
        self
    }

    pub fn with_spacing_between_slices(mut self, spacing: f64) -> Self {
        self.spacing_between_slices = Some(spacing);
        self
    }

    pub fn with_attribute(mut self, keyword: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(keyword.into(), value.into());
        self
    }

    pub fn cosines(&self) -> Cosines {
        Cosines::from_orientation(&self.image_orientation_patient)
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::from(self.image_position_patient)
    }

    /// Distance of this slice along `slice_cosine`.
    pub fn slice_position(&self, slice_cosine: &Vector3<f64>) -> f64 {
        slice_cosine.dot(&self.position())
    }

    pub fn has_rescale(&self) -> bool {
        self.rescale_slope.is_some() || self.rescale_intercept.is_some()
    }
}

/// Projection of every slice's position onto `slice_cosine`, in input order.
pub fn slice_positions<S: Borrow<SliceRecord>>(slices: &[S], slice_cosine: &Vector3<f64>) -> Vec<f64> {
    slices
        .iter()
        .map(|slice| slice.borrow().slice_position(slice_cosine))
        .collect()
}
