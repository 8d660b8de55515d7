use std::borrow::Borrow;

use log::debug;
use nalgebra::{Matrix4, Vector3};

use crate::{
    combine::CombineError,
    slice::{SliceRecord, slice_positions},
};

/// The 4x4 matrix `M` mapping voxel indices to patient coordinates,
/// `[x, y, z, 1]ᵗ = M · [i, j, k, 1]ᵗ`, for slices in merge order.
///
/// `i` runs along the row cosine, which is the direction of increasing
/// column index, so it is scaled by the column spacing; `j` pairs the
/// column cosine with the row spacing. `k` advances by the slice spacing and
/// the translation is the position of `ordered[0]`.
pub fn ijk_to_patient_xyz<S: Borrow<SliceRecord>>(ordered: &[S]) -> Result<Matrix4<f64>, CombineError> {
    let first = ordered.first().ok_or(CombineError::NoSlices)?.borrow();
    let cosines = first.cosines();
    let [row_spacing, column_spacing] = first.pixel_spacing;
    let slice_spacing = slice_spacing(ordered, &cosines.slice);
    debug!("slice spacing {slice_spacing}");

    let i = cosines.row * column_spacing;
    let j = cosines.column * row_spacing;
    let k = cosines.slice * slice_spacing;
    let origin = first.position();

    #[rustfmt::skip]
    let transform = Matrix4::new(
        i.x, j.x, k.x, origin.x,
        i.y, j.y, k.y, origin.y,
        i.z, j.z, k.z, origin.z,
        0.0, 0.0, 0.0, 1.0,
    );
    Ok(transform)
}

/// Median step between consecutive slices along `slice_cosine`, signed, so
/// a reversed ordering yields a negative spacing.
///
/// A single slice falls back to SpacingBetweenSlices, or 0.
pub fn slice_spacing<S: Borrow<SliceRecord>>(ordered: &[S], slice_cosine: &Vector3<f64>) -> f64 {
    if ordered.len() < 2 {
        return ordered
            .first()
            .and_then(|slice| slice.borrow().spacing_between_slices)
            .unwrap_or(0.0);
    }

    let positions = slice_positions(ordered, slice_cosine);
    let mut steps: Vec<f64> = positions.windows(2).map(|pair| pair[1] - pair[0]).collect();
    median(&mut steps)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;
    use ndarray::Array2;

    fn slice(position: [f64; 3]) -> SliceRecord {
        SliceRecord::new(Array2::<i16>::zeros((10, 11))).with_position(position)
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn spacing_is_robust_to_one_gap() {
        let ordered = [
            slice([0.0, 0.0, 0.0]),
            slice([0.0, 0.0, 1.0]),
            slice([0.0, 0.0, 3.0]),
            slice([0.0, 0.0, 4.0]),
        ];
        assert_eq!(slice_spacing(&ordered, &Vector3::z()), 1.0);
    }

    #[test]
    fn single_slice_spacing() {
        assert_eq!(slice_spacing(&[slice([0.0; 3])], &Vector3::z()), 0.0);
        let hinted = slice([0.0; 3]).with_spacing_between_slices(0.65);
        let affine = ijk_to_patient_xyz(&[hinted]).unwrap();
        assert_relative_eq!(affine.column(2).norm(), 0.65);
    }

    #[test]
    fn columns_pair_cosines_with_crossed_spacing() {
        let ordered = [
            slice([5.0, 6.0, 7.0]).with_pixel_spacing(0.5, 0.25),
            slice([5.0, 6.0, 9.0]).with_pixel_spacing(0.5, 0.25),
        ];
        let affine = ijk_to_patient_xyz(&ordered).unwrap();

        #[rustfmt::skip]
        let expected = Matrix4::new(
            0.25, 0.0, 0.0, 5.0,
            0.0,  0.5, 0.0, 6.0,
            0.0,  0.0, 2.0, 7.0,
            0.0,  0.0, 0.0, 1.0,
        );
        assert_relative_eq!(affine, expected);
    }

    #[test]
    fn reversed_order_maps_back_to_each_slice() {
        let ordered = [slice([0.0, 0.0, 2.0]), slice([0.0, 0.0, 1.0]), slice([0.0, 0.0, 0.0])];
        let affine = ijk_to_patient_xyz(&ordered).unwrap();
        for (k, slice) in ordered.iter().enumerate() {
            let mapped = affine * Vector4::new(0.0, 0.0, k as f64, 1.0);
            assert_relative_eq!(mapped.xyz(), slice.position());
        }
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(
            ijk_to_patient_xyz::<SliceRecord>(&[]).unwrap_err(),
            CombineError::NoSlices
        );
    }
}
