//! Checks that a list of slices forms an evenly spaced grid.
//!
//! Several quantities are compared against two tolerances: exceeding the
//! outer one rejects the series, exceeding only the inner one is accepted
//! but reported as a [`Warning`]. Values like these show up in real
//! acquisitions, so they are worth surfacing without failing the import.

use std::{borrow::Borrow, fmt};

use log::warn;
use nalgebra::Vector3;

use crate::{
    combine::CombineError,
    slice::{Cosines, SliceRecord, slice_positions},
};

pub const ORIENTATION_TOLERANCE: f64 = 1e-4;
pub const ORIENTATION_WARN_TOLERANCE: f64 = 1e-8;
/// Largest per-component difference between two slices' orientations
pub const ORIENTATION_CONSISTENCY_TOLERANCE: f64 = 1e-5;
/// Relative to the first slice gap
pub const SPACING_TOLERANCE: f64 = 1e-1;
pub const SPACING_WARN_TOLERANCE: f64 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CosineAxis {
    Row,
    Column,
}

impl fmt::Display for CosineAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CosineAxis::Row => f.write_str("row"),
            CosineAxis::Column => f.write_str("column"),
        }
    }
}

/// A condition that is accepted but notably imprecise.
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    NearlyOrthogonalCosines { row: [f64; 3], column: [f64; 3], dot: f64 },
    NearlyUnitCosine { axis: CosineAxis, magnitude: f64 },
    NonUniformSpacing { spacings: Vec<f64> },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NearlyOrthogonalCosines { row, column, dot } => write!(
                f,
                "Direction cosines aren't quite orthogonal: {row:?}, {column:?} (dot product {dot})"
            ),
            Warning::NearlyUnitCosine { axis, magnitude } => write!(
                f,
                "The {axis} direction cosine's magnitude is not quite 1: {magnitude}"
            ),
            Warning::NonUniformSpacing { spacings } => {
                write!(f, "The slice spacing is non-uniform. Slice spacings: {spacings:?}")
            }
        }
    }
}

/// Warnings collected while combining one series.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn push(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Outcome of a single check.
#[derive(Debug, PartialEq)]
pub enum Check {
    Pass,
    Warn(Warning),
    Fail(CombineError),
}

impl Check {
    /// Log and collect a warning, or turn a failure into an error.
    pub fn record(self, diagnostics: &mut Diagnostics) -> Result<(), CombineError> {
        match self {
            Check::Pass => Ok(()),
            Check::Warn(warning) => {
                warn!("{warning}");
                diagnostics.push(warning);
                Ok(())
            }
            Check::Fail(error) => Err(error),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Band {
    Within,
    Imprecise,
    Exceeded,
}

// NaN deviations land in `Exceeded`.
fn band(deviation: f64, warn_tolerance: f64, tolerance: f64) -> Band {
    if !(deviation <= tolerance) {
        Band::Exceeded
    } else if deviation > warn_tolerance {
        Band::Imprecise
    } else {
        Band::Within
    }
}

pub fn check_orthogonality(cosines: &Cosines) -> Check {
    let dot = cosines.row.dot(&cosines.column);
    let (row, column) = (cosines.row.into(), cosines.column.into());
    match band(dot.abs(), ORIENTATION_WARN_TOLERANCE, ORIENTATION_TOLERANCE) {
        Band::Within => Check::Pass,
        Band::Imprecise => Check::Warn(Warning::NearlyOrthogonalCosines { row, column, dot }),
        Band::Exceeded => Check::Fail(CombineError::NonOrthogonalCosines { row, column, dot }),
    }
}

pub fn check_unit_magnitude(axis: CosineAxis, cosine: &Vector3<f64>) -> Check {
    let magnitude = cosine.norm();
    match band((magnitude - 1.0).abs(), ORIENTATION_WARN_TOLERANCE, ORIENTATION_TOLERANCE) {
        Band::Within => Check::Pass,
        Band::Imprecise => Check::Warn(Warning::NearlyUnitCosine { axis, magnitude }),
        Band::Exceeded => Check::Fail(CombineError::NonUnitCosine { axis, magnitude }),
    }
}

/// Compare the gaps between sorted slice positions with the first gap.
///
/// A gap far from the others is how a slice missing from the interior of
/// the series shows up. Missing slices at either end cannot be detected.
pub fn check_slice_spacing(slice_positions: &[f64]) -> Check {
    let mut sorted = slice_positions.to_vec();
    sorted.sort_by(f64::total_cmp);
    let spacings: Vec<f64> = sorted.windows(2).map(|pair| pair[1] - pair[0]).collect();

    let Some(&reference) = spacings.first() else {
        return Check::Pass;
    };
    let deviation = spacings
        .iter()
        .map(|spacing| (spacing - reference).abs())
        .fold(0.0, |worst: f64, deviation| {
            // `f64::max` would drop a NaN gap
            if worst.is_nan() || deviation.is_nan() {
                f64::NAN
            } else {
                worst.max(deviation)
            }
        });
    let scale = reference.abs();

    match band(deviation, SPACING_WARN_TOLERANCE * scale, SPACING_TOLERANCE * scale) {
        Band::Within => Check::Pass,
        Band::Imprecise => Check::Warn(Warning::NonUniformSpacing { spacings }),
        Band::Exceeded => Check::Fail(CombineError::MissingSlices { spacings }),
    }
}

fn check_attribute<S, T>(
    slices: &[S],
    attribute: &'static str,
    value: impl Fn(&SliceRecord) -> T,
) -> Result<(), CombineError>
where
    S: Borrow<SliceRecord>,
    T: PartialEq + fmt::Debug,
{
    let Some((first, rest)) = slices.split_first() else {
        return Ok(());
    };
    let expected = value(first.borrow());
    for (index, slice) in rest.iter().enumerate() {
        let found = value(slice.borrow());
        if found != expected {
            return Err(CombineError::AttributeMismatch {
                attribute,
                index: index + 1,
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            });
        }
    }
    Ok(())
}

/// Identity and geometry attributes must be equal across the series.
pub fn check_invariant_attributes<S: Borrow<SliceRecord>>(slices: &[S]) -> Result<(), CombineError> {
    check_attribute(slices, "Modality", |s| s.modality.clone())?;
    check_attribute(slices, "SOPClassUID", |s| s.sop_class_uid.clone())?;
    check_attribute(slices, "SeriesInstanceUID", |s| s.series_instance_uid.clone())?;
    check_attribute(slices, "Rows", |s| s.rows)?;
    check_attribute(slices, "Columns", |s| s.columns)?;
    check_attribute(slices, "SamplesPerPixel", |s| s.samples_per_pixel)?;
    check_attribute(slices, "PixelSpacing", |s| s.pixel_spacing)?;
    check_attribute(slices, "PixelRepresentation", |s| s.pixel_representation)?;
    check_attribute(slices, "BitsAllocated", |s| s.bits_allocated)?;
    check_attribute(slices, "BitsStored", |s| s.bits_stored)?;
    check_attribute(slices, "HighBit", |s| s.high_bit)
}

/// Orientations need only be close, not identical.
pub fn check_orientation_consistency<S: Borrow<SliceRecord>>(slices: &[S]) -> Result<(), CombineError> {
    let Some((first, rest)) = slices.split_first() else {
        return Ok(());
    };
    let expected = first.borrow().image_orientation_patient;
    for (index, slice) in rest.iter().enumerate() {
        let found = slice.borrow().image_orientation_patient;
        let close = expected
            .iter()
            .zip(&found)
            .all(|(a, b)| (a - b).abs() <= ORIENTATION_CONSISTENCY_TOLERANCE);
        if !close {
            return Err(CombineError::AttributeMismatch {
                attribute: "ImageOrientationPatient",
                index: index + 1,
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            });
        }
    }
    Ok(())
}

/// Every ImagePositionPatient component must be finite.
pub fn check_finite_positions<S: Borrow<SliceRecord>>(slices: &[S]) -> Result<(), CombineError> {
    match slices
        .iter()
        .map(|slice| slice.borrow().image_position_patient)
        .enumerate()
        .find(|(_, position)| !position.iter().all(|c| c.is_finite()))
    {
        Some((index, position)) => Err(CombineError::NonFinitePosition { index, position }),
        None => Ok(()),
    }
}

/// Run every grid check in order, stopping at the first failure.
///
/// Warnings are logged and appended to `diagnostics`. The spacing check is
/// skipped when `enforce_slice_spacing` is false or there is only one slice.
pub fn validate_slices_form_uniform_grid<S: Borrow<SliceRecord>>(
    slices: &[S],
    enforce_slice_spacing: bool,
    diagnostics: &mut Diagnostics,
) -> Result<(), CombineError> {
    let first = slices.first().ok_or(CombineError::NoSlices)?.borrow();

    check_invariant_attributes(slices)?;

    let cosines = first.cosines();
    check_orthogonality(&cosines).record(diagnostics)?;
    check_unit_magnitude(CosineAxis::Row, &cosines.row).record(diagnostics)?;
    check_unit_magnitude(CosineAxis::Column, &cosines.column).record(diagnostics)?;

    check_orientation_consistency(slices)?;
    check_finite_positions(slices)?;

    if enforce_slice_spacing && slices.len() > 1 {
        let positions = slice_positions(slices, &cosines.slice);
        check_slice_spacing(&positions).record(diagnostics)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn axial(position: f64) -> SliceRecord {
        SliceRecord::new(Array2::<u16>::zeros((4, 4))).with_position([0.0, 0.0, position])
    }

    #[test]
    fn band_edges() {
        assert_eq!(band(0.0, 1e-8, 1e-4), Band::Within);
        assert_eq!(band(1e-6, 1e-8, 1e-4), Band::Imprecise);
        assert_eq!(band(1e-4, 1e-8, 1e-4), Band::Imprecise);
        assert_eq!(band(1e-3, 1e-8, 1e-4), Band::Exceeded);
        assert_eq!(band(f64::NAN, 1e-8, 1e-4), Band::Exceeded);
    }

    #[test]
    fn orthogonality() {
        let exact = Cosines::from_orientation(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(check_orthogonality(&exact), Check::Pass);

        let slightly_off = Cosines::from_orientation(&[1.0, 0.0, 0.0, 1e-6, 1.0, 0.0]);
        assert!(matches!(
            check_orthogonality(&slightly_off),
            Check::Warn(Warning::NearlyOrthogonalCosines { .. })
        ));

        let skewed = Cosines::from_orientation(&[1.0, 0.0, 0.0, 0.1, 1.0, 0.0]);
        assert!(matches!(
            check_orthogonality(&skewed),
            Check::Fail(CombineError::NonOrthogonalCosines { .. })
        ));
    }

    #[test]
    fn unit_magnitude() {
        let unit = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(check_unit_magnitude(CosineAxis::Column, &unit), Check::Pass);

        let nearly = Vector3::new(1.0 + 1e-6, 0.0, 0.0);
        assert!(matches!(
            check_unit_magnitude(CosineAxis::Row, &nearly),
            Check::Warn(Warning::NearlyUnitCosine { axis: CosineAxis::Row, .. })
        ));

        let long = Vector3::new(1.01, 0.0, 0.0);
        assert!(matches!(
            check_unit_magnitude(CosineAxis::Row, &long),
            Check::Fail(CombineError::NonUnitCosine { axis: CosineAxis::Row, .. })
        ));
    }

    #[test]
    fn spacing_is_order_independent() {
        assert_eq!(check_slice_spacing(&[3.0, 0.0, 2.0, 1.0]), Check::Pass);
        assert_eq!(check_slice_spacing(&[5.0]), Check::Pass);
    }

    #[test]
    fn spacing_bands() {
        assert!(matches!(
            check_slice_spacing(&[0.0, 1.0, 2.001, 3.001]),
            Check::Warn(Warning::NonUniformSpacing { .. })
        ));
        assert_eq!(
            check_slice_spacing(&[0.0, 2.0, 3.0]),
            Check::Fail(CombineError::MissingSlices { spacings: vec![2.0, 1.0] })
        );
    }

    #[test]
    fn nan_gap_is_a_failure() {
        for positions in [[0.0, 1.0, 2.0, f64::NAN], [f64::NAN, 0.0, 1.0, 2.0]] {
            assert!(matches!(
                check_slice_spacing(&positions),
                Check::Fail(CombineError::MissingSlices { .. })
            ));
        }
    }

    #[test]
    fn non_finite_position_is_rejected_without_spacing_check() {
        let mut slices = [axial(0.0), axial(1.0), axial(2.0)];
        slices[2].image_position_patient[2] = f64::NAN;
        let mut diagnostics = Diagnostics::default();
        assert!(matches!(
            validate_slices_form_uniform_grid(&slices, false, &mut diagnostics),
            Err(CombineError::NonFinitePosition { index: 2, .. })
        ));
    }

    #[test]
    fn duplicate_positions_need_all_gaps_zero() {
        assert_eq!(check_slice_spacing(&[1.0, 1.0, 1.0]), Check::Pass);
        assert!(matches!(
            check_slice_spacing(&[1.0, 1.0, 2.0]),
            Check::Fail(CombineError::MissingSlices { .. })
        ));
    }

    #[test]
    fn first_attribute_mismatch_is_reported() {
        let slices = [
            axial(0.0).with_series_instance_uid("a"),
            axial(1.0).with_series_instance_uid("a").with_modality("CT"),
            axial(2.0).with_series_instance_uid("b"),
        ];
        assert_eq!(
            check_invariant_attributes(&slices).unwrap_err(),
            CombineError::AttributeMismatch {
                attribute: "Modality",
                index: 1,
                expected: "\"\"".to_owned(),
                found: "\"CT\"".to_owned(),
            }
        );
    }

    #[test]
    fn warnings_are_collected() {
        let mut slices = vec![axial(0.0), axial(1.0), axial(2.0)];
        for slice in &mut slices {
            slice.image_orientation_patient[0] += 1e-6;
        }
        let mut diagnostics = Diagnostics::default();
        validate_slices_form_uniform_grid(&slices, true, &mut diagnostics).unwrap();
        assert!(matches!(
            diagnostics.warnings(),
            [Warning::NearlyUnitCosine { axis: CosineAxis::Row, .. }]
        ));
    }

    #[test]
    fn relaxed_spacing_skips_gap_check() {
        let slices = [axial(0.0), axial(2.0), axial(3.0)];
        let mut diagnostics = Diagnostics::default();
        assert!(validate_slices_form_uniform_grid(&slices, true, &mut diagnostics).is_err());
        assert!(validate_slices_form_uniform_grid(&slices, false, &mut diagnostics).is_ok());
        assert!(diagnostics.is_empty());
    }
}
