//! # DICOM-combine library
//!
//! This crate stitches the slices of one DICOM series into a single voxel
//! array together with the 4x4 affine `M` that maps voxel indices to the
//! patient coordinate system:
//!
//! ```text
//! [x, y, z, 1]ᵗ = M · [i, j, k, 1]ᵗ
//! ```
//!
//! Combining happens in four steps, each available on its own:
//!  - [`ordering`]: order the slices by position along the slice cosine
//!    (default), by descending InstanceNumber, or not at all
//!  - [`validation`]: check that the slices form a uniform grid, i.e. share
//!    their series, geometry and orientation and are evenly spaced
//!  - [`merge`]: copy every slice into one array, optionally rescaled with
//!    RescaleSlope/RescaleIntercept
//!  - [`affine`]: derive the affine from the ordered slices
//!
//! Slices are plain [`SliceRecord`]s. [`VolumeLoader`] builds them from
//! DICOM files using the dicom-rs ecosystem, reading files in parallel with
//! rayon.
//!
//! Imprecise but acceptable direction cosines and slice spacings are logged
//! through the `log` facade and collected in [`Volume::diagnostics`].
//!
//! The following is not attempted:
//!   - detecting slices missing at either end of the series
//!   - resampling non-uniformly spaced slices
//!   - validating pixel values
//!
//! # Examples
//!
//! ## Reading multiple DICOM files into a volume
//!
//! ```no_run
//! # use dicom_combine::{CombineOptions, VolumeLoader};
//! let volume = VolumeLoader::load_from_directory("dicom", &CombineOptions::default())
//!     .expect("should have loaded files from directory");
//! println!("{:?} voxels, affine {}", volume.dim(), volume.affine());
//! ```
//!
//! ## Combining decoded slices
//!
//! ```
//! # use dicom_combine::{combine_slices, CombineOptions, SliceRecord};
//! # use ndarray::Array2;
//! let slices: Vec<SliceRecord> = (0..4)
//!     .map(|z| SliceRecord::new(Array2::<u16>::zeros((10, 11))).with_position([0.0, 0.0, z as f64]))
//!     .collect();
//! let volume = combine_slices(&slices, &CombineOptions::default()).unwrap();
//! assert_eq!(volume.dim(), &[11, 10, 4]);
//! ```

pub mod affine;
pub mod combine;
pub mod enums;
pub mod merge;
pub mod ordering;
pub mod slice;
pub mod validation;
pub mod volume;
pub mod volume_loader;

pub use combine::{CombineError, CombineOptions, combine_slices};
pub use enums::{Layout, Rescale, SliceOrdering};
pub use merge::{Pixel, Voxels};
pub use slice::{Cosines, PixelArray, SliceRecord, StorageKind};
pub use validation::{Diagnostics, Warning};
pub use volume::Volume;
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
