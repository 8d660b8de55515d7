#![allow(dead_code)]

use dicom_combine::{PixelArray, SliceRecord};
use nalgebra::Vector3;
use ndarray::{Array2, Array3};

pub const X_COS: [f64; 3] = [1.0, 0.0, 0.0];
pub const Y_COS: [f64; 3] = [0.0, 1.0, 0.0];
pub const Z_COS: [f64; 3] = [0.0, 0.0, 1.0];
pub const NEGATIVE_Z_COS: [f64; 3] = [0.0, 0.0, -1.0];

pub const ARBITRARY_SHAPE: (usize, usize) = (10, 11);
pub const ARBITRARY_RGB_SHAPE: (usize, usize, usize) = (10, 11, 3);

/// Deterministic stand-in for random 12-bit pixels.
pub fn randi(seed: u16) -> Array2<u16> {
    Array2::from_shape_fn(ARBITRARY_SHAPE, |(r, c)| {
        ((r as u16 * 31 + c as u16 * 17 + seed * 101) * 7) % 1000
    })
}

pub fn randi_rgb(seed: u16) -> Array3<u16> {
    Array3::from_shape_fn(ARBITRARY_RGB_SHAPE, |(r, c, s)| {
        ((r as u16 * 31 + c as u16 * 17 + s as u16 * 5 + seed * 101) * 7) % 1000
    })
}

/// A slice whose in-plane grid is centred on the slice axis, `slice_position`
/// along the cross product of the two cosines.
pub fn mock_slice_oriented(
    pixels: impl Into<PixelArray>,
    slice_position: f64,
    row_cosine: [f64; 3],
    column_cosine: [f64; 3],
) -> SliceRecord {
    let slice = SliceRecord::new(pixels);
    let row = Vector3::from(row_cosine);
    let column = Vector3::from(column_cosine);
    let position = row * (-(slice.columns as f64) / 2.0)
        + column * (-(slice.rows as f64) / 2.0)
        + row.cross(&column) * slice_position;

    slice
        .with_series_instance_uid("arbitrary uid")
        .with_sop_class_uid("arbitrary sopclass uid")
        .with_modality("MR")
        .with_orientation([
            row_cosine[0],
            row_cosine[1],
            row_cosine[2],
            column_cosine[0],
            column_cosine[1],
            column_cosine[2],
        ])
        .with_position(position.into())
}

pub fn mock_slice(pixels: impl Into<PixelArray>, slice_position: f64) -> SliceRecord {
    mock_slice_oriented(pixels, slice_position, X_COS, Y_COS)
}

pub fn axial_slices() -> Vec<SliceRecord> {
    (0..4).map(|z| mock_slice(randi(z), f64::from(z))).collect()
}

pub fn axial_rgb_slices() -> Vec<SliceRecord> {
    (0..4).map(|z| mock_slice(randi_rgb(z), f64::from(z))).collect()
}

pub fn pixels_u16(slice: &SliceRecord) -> &ndarray::ArrayD<u16> {
    match &slice.pixels {
        PixelArray::U16(array) => array,
        other => panic!("expected u16 pixels, found {:?}", other.kind()),
    }
}
