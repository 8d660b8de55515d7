use std::borrow::Borrow;

use log::debug;
use thiserror::Error;

use crate::{
    affine::ijk_to_patient_xyz,
    enums::{Layout, Rescale, SliceOrdering},
    merge::merge_slice_pixel_arrays,
    ordering::{apply_order, order_slices},
    slice::{SliceRecord, StorageKind},
    validation::{CosineAxis, Diagnostics, validate_slices_form_uniform_grid},
    volume::Volume,
};

/// `index` fields count from zero in the slice list handed to
/// [`combine_slices`], whatever the ordering.
#[derive(Debug, Error, PartialEq)]
pub enum CombineError {
    #[error("Must provide at least one slice")]
    NoSlices,

    #[error("All slices must have the same value for \"{attribute}\": {found} != {expected} (slice {index})")]
    AttributeMismatch {
        attribute: &'static str,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Non-orthogonal direction cosines: {row:?}, {column:?} (dot product {dot})")]
    NonOrthogonalCosines {
        row: [f64; 3],
        column: [f64; 3],
        dot: f64,
    },

    #[error("The {axis} direction cosine's magnitude is not 1: {magnitude}")]
    NonUnitCosine { axis: CosineAxis, magnitude: f64 },

    #[error("It appears there are missing slices; slice spacings: {spacings:?}")]
    MissingSlices { spacings: Vec<f64> },

    #[error("Slice {index} has a non-finite ImagePositionPatient: {position:?}")]
    NonFinitePosition { index: usize, position: [f64; 3] },

    #[error("Slice {index} has no InstanceNumber")]
    MissingInstanceNumber { index: usize },

    #[error("Slice {index} has pixel shape {found:?}, expected {expected:?}")]
    PixelShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Slice {index} stores {found:?} pixels, expected {expected:?}")]
    PixelKindMismatch {
        index: usize,
        expected: StorageKind,
        found: StorageKind,
    },
}

impl CombineError {
    /// Point a per-slice error raised on the ordered list back at the input.
    fn into_input_index(mut self, order: &[usize]) -> Self {
        match &mut self {
            CombineError::AttributeMismatch { index, .. }
            | CombineError::NonFinitePosition { index, .. }
            | CombineError::PixelShapeMismatch { index, .. }
            | CombineError::PixelKindMismatch { index, .. } => {
                if let Some(&source) = order.get(*index) {
                    *index = source;
                }
            }
            _ => {}
        }
        self
    }
}

/// Options for [`combine_slices`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombineOptions {
    pub rescale: Rescale,
    /// Reject series whose slice positions are not evenly spaced
    pub enforce_slice_spacing: bool,
    pub ordering: SliceOrdering,
    pub layout: Layout,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            rescale: Rescale::Auto,
            enforce_slice_spacing: true,
            ordering: SliceOrdering::SlicePosition,
            layout: Layout::SliceMinor,
        }
    }
}

impl CombineOptions {
    pub fn with_rescale(mut self, rescale: Rescale) -> Self {
        self.rescale = rescale;
        self
    }

    pub fn with_enforce_slice_spacing(mut self, enforce: bool) -> Self {
        self.enforce_slice_spacing = enforce;
        self
    }

    pub fn with_ordering(mut self, ordering: SliceOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }
}

/// Stitch the slices of one series into a voxel array and a 4x4 affine `M`
/// with `[x, y, z, 1]ᵗ = M · [i, j, k, 1]ᵗ`.
///
/// The slices are ordered first, then validated, then merged. Merging and the
/// affine both see the same ordered list, which is returned as
/// [`Volume::order`].
///
/// # Errors
///
/// Returns error if no slices are given, the slices do not form a uniform
/// grid, or the requested ordering cannot be applied.
pub fn combine_slices<S>(slices: &[S], options: &CombineOptions) -> Result<Volume, CombineError>
where
    S: Borrow<SliceRecord> + Sync,
{
    if slices.is_empty() {
        return Err(CombineError::NoSlices);
    }

    let order = order_slices(slices, options.ordering)?;
    debug!("ordered {} slices by {:?}: {:?}", slices.len(), options.ordering, order);

    let ordered = apply_order(slices, &order);

    let mut diagnostics = Diagnostics::default();
    validate_slices_form_uniform_grid(&ordered, options.enforce_slice_spacing, &mut diagnostics)
        .map_err(|error| error.into_input_index(&order))?;

    let voxels = merge_slice_pixel_arrays(&ordered, options.rescale, options.layout)
        .map_err(|error| error.into_input_index(&order))?;
    let affine = ijk_to_patient_xyz(&ordered)?;

    Ok(Volume::new(voxels, affine, order, options.layout, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn axial(position: f64) -> SliceRecord {
        SliceRecord::new(Array2::<u16>::zeros((3, 2))).with_position([0.0, 0.0, position])
    }

    #[test]
    fn empty_input_is_rejected() {
        let slices: Vec<SliceRecord> = Vec::new();
        assert_eq!(
            combine_slices(&slices, &CombineOptions::default()).unwrap_err(),
            CombineError::NoSlices
        );
    }

    #[test]
    fn defaults() {
        let options = CombineOptions::default();
        assert_eq!(options.rescale, Rescale::Auto);
        assert!(options.enforce_slice_spacing);
        assert_eq!(options.ordering, SliceOrdering::SlicePosition);
        assert_eq!(options.layout, Layout::SliceMinor);
    }

    #[test]
    fn accepts_borrowed_records() {
        let slices = [axial(1.0), axial(0.0)];
        let refs: Vec<&SliceRecord> = slices.iter().collect();
        let volume = combine_slices(&refs, &CombineOptions::default()).unwrap();
        assert_eq!(volume.order(), &[1, 0]);
        assert_eq!(volume.dim(), &[2, 3, 2]);
    }

    #[test]
    fn mismatch_index_refers_to_the_input_list() {
        let slices = [axial(2.0), axial(0.0), axial(1.0).with_modality("CT")];
        match combine_slices(&slices, &CombineOptions::default()).unwrap_err() {
            CombineError::AttributeMismatch { attribute, index, .. } => {
                assert_eq!(attribute, "Modality");
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn pixel_shape_index_refers_to_the_input_list() {
        let mut slices = [axial(1.0), axial(0.0)];
        // Rows and Columns still agree, only the buffer is wrong.
        slices[1].pixels = Array2::<u16>::zeros((2, 3)).into();
        match combine_slices(&slices, &CombineOptions::default()).unwrap_err() {
            CombineError::PixelShapeMismatch { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn nan_position_is_rejected() {
        let mut slices = [axial(0.0), axial(1.0), axial(2.0), axial(3.0)];
        slices[1].image_position_patient[2] = f64::NAN;
        for enforce in [true, false] {
            let options = CombineOptions::default().with_enforce_slice_spacing(enforce);
            assert!(matches!(
                combine_slices(&slices, &options).unwrap_err(),
                CombineError::NonFinitePosition { index: 1, .. }
            ));
        }
    }

    #[test]
    fn ordering_errors_surface_before_validation() {
        let slices = [axial(0.0).with_instance_number(2), axial(1.0)];
        let options = CombineOptions::default().with_ordering(SliceOrdering::InstanceNumber);
        assert_eq!(
            combine_slices(&slices, &options).unwrap_err(),
            CombineError::MissingInstanceNumber { index: 1 }
        );
    }
}
