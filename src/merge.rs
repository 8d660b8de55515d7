use std::borrow::Borrow;

use log::debug;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use rayon::prelude::*;

use crate::{
    combine::CombineError,
    enums::{Layout, Rescale},
    slice::{PixelArray, SliceRecord, StorageKind},
};

/// The merged voxel array, in the storage kind chosen by
/// [`promoted_kind`].
#[derive(Clone, Debug, PartialEq)]
pub enum Voxels {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Numeric types a slice can store its pixels in.
pub trait Pixel: Copy + Default + Send + Sync + 'static {
    const KIND: StorageKind;

    fn pixels(pixels: &PixelArray) -> Option<&ArrayD<Self>>;

    fn voxels(voxels: &Voxels) -> Option<&ArrayD<Self>>;

    fn into_voxels(array: ArrayD<Self>) -> Voxels;

    fn to_f32(self) -> f32;

    fn to_f64(self) -> f64;
}

macro_rules! impl_pixel {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Pixel for $ty {
                const KIND: StorageKind = StorageKind::$variant;

                fn pixels(pixels: &PixelArray) -> Option<&ArrayD<Self>> {
                    match pixels {
                        PixelArray::$variant(array) => Some(array),
                        _ => None,
                    }
                }

                fn voxels(voxels: &Voxels) -> Option<&ArrayD<Self>> {
                    match voxels {
                        Voxels::$variant(array) => Some(array),
                        _ => None,
                    }
                }

                fn into_voxels(array: ArrayD<Self>) -> Voxels {
                    Voxels::$variant(array)
                }

                #[inline]
                fn to_f32(self) -> f32 {
                    self as f32
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_pixel!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    f64 => F64,
);

macro_rules! dispatch {
    ($value:expr, $enum:ident, $array:ident => $body:expr) => {
        match $value {
            $enum::U8($array) => $body,
            $enum::I8($array) => $body,
            $enum::U16($array) => $body,
            $enum::I16($array) => $body,
            $enum::U32($array) => $body,
            $enum::I32($array) => $body,
            $enum::F32($array) => $body,
            $enum::F64($array) => $body,
        }
    };
}

impl Voxels {
    pub fn kind(&self) -> StorageKind {
        dispatch!(self, Voxels, array => element_kind(array))
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, Voxels, array => array.shape())
    }

    /// The underlying array if it stores `T`.
    pub fn as_array<T: Pixel>(&self) -> Option<&ArrayD<T>> {
        T::voxels(self)
    }

    /// Slice `k` of a volume laid out as `layout`, in `f64`.
    pub fn slice_f64(&self, layout: Layout, k: usize) -> Option<ArrayD<f64>> {
        dispatch!(self, Voxels, array => {
            let axis = slice_axis(layout, array.ndim());
            (k < array.len_of(axis)).then(|| array.index_axis(axis, k).mapv(Pixel::to_f64))
        })
    }
}

fn element_kind<T: Pixel>(_: &ArrayD<T>) -> StorageKind {
    T::KIND
}

/// Storage kind of the merged array: rescaling always produces `f32`,
/// otherwise the slices' own storage is kept.
pub fn promoted_kind(input: StorageKind, rescale: bool) -> StorageKind {
    if rescale { StorageKind::F32 } else { input }
}

fn slice_axis(layout: Layout, ndim: usize) -> Axis {
    match layout {
        Layout::SliceMinor => Axis(ndim - 1),
        Layout::SliceMajor => Axis(0),
    }
}

fn volume_shape(slice_shape: &[usize], num_slices: usize, layout: Layout) -> Vec<usize> {
    let (rows, columns, samples) = (slice_shape[0], slice_shape[1], &slice_shape[2..]);
    let mut shape = Vec::with_capacity(slice_shape.len() + 1);
    match layout {
        Layout::SliceMinor => {
            shape.extend([columns, rows]);
            shape.extend_from_slice(samples);
            shape.push(num_slices);
        }
        Layout::SliceMajor => {
            shape.extend([num_slices, rows, columns]);
            shape.extend_from_slice(samples);
        }
    }
    shape
}

/// A slice's `(rows, columns, ..)` pixels as they are laid into the volume.
fn oriented<T>(mut view: ArrayViewD<'_, T>, layout: Layout) -> ArrayViewD<'_, T> {
    if layout == Layout::SliceMinor {
        view.swap_axes(0, 1);
    }
    view
}

/// Every slice must match the first slice's Rows, Columns and
/// SamplesPerPixel.
fn check_pixel_shapes<S: Borrow<SliceRecord>>(slices: &[S]) -> Result<Vec<usize>, CombineError> {
    let first = slices.first().ok_or(CombineError::NoSlices)?.borrow();
    let mut expected = vec![first.rows as usize, first.columns as usize];
    if first.samples_per_pixel > 1 {
        expected.push(first.samples_per_pixel as usize);
    }

    for (index, slice) in slices.iter().enumerate() {
        let found = slice.borrow().pixels.shape();
        if found != expected.as_slice() {
            return Err(CombineError::PixelShapeMismatch {
                index,
                expected,
                found: found.to_vec(),
            });
        }
    }
    Ok(expected)
}

/// Copy every slice's pixels into one array, `ordered[k]` becoming slice `k`.
///
/// Rescaling is resolved per series by `rescale`, then applied per slice
/// with that slice's own coefficients (slope 1 and intercept 0 when absent).
pub fn merge_slice_pixel_arrays<S>(
    ordered: &[S],
    rescale: Rescale,
    layout: Layout,
) -> Result<Voxels, CombineError>
where
    S: Borrow<SliceRecord> + Sync,
{
    let slice_shape = check_pixel_shapes(ordered)?;
    let first_kind = ordered[0].borrow().pixels.kind();
    let rescale = rescale.resolve(ordered.iter().any(|slice| slice.borrow().has_rescale()));
    let shape = volume_shape(&slice_shape, ordered.len(), layout);
    debug!(
        "merging {} slices into {:?} voxels of shape {:?}",
        ordered.len(),
        promoted_kind(first_kind, rescale),
        shape
    );

    if rescale {
        return Ok(Voxels::F32(merge_rescaled(ordered, &shape, layout)));
    }

    match first_kind {
        StorageKind::U8 => merge_stored::<u8, _>(ordered, &shape, layout),
        StorageKind::I8 => merge_stored::<i8, _>(ordered, &shape, layout),
        StorageKind::U16 => merge_stored::<u16, _>(ordered, &shape, layout),
        StorageKind::I16 => merge_stored::<i16, _>(ordered, &shape, layout),
        StorageKind::U32 => merge_stored::<u32, _>(ordered, &shape, layout),
        StorageKind::I32 => merge_stored::<i32, _>(ordered, &shape, layout),
        StorageKind::F32 => merge_stored::<f32, _>(ordered, &shape, layout),
        StorageKind::F64 => merge_stored::<f64, _>(ordered, &shape, layout),
    }
}

fn merge_stored<T, S>(ordered: &[S], shape: &[usize], layout: Layout) -> Result<Voxels, CombineError>
where
    T: Pixel,
    S: Borrow<SliceRecord>,
{
    let sources = ordered
        .iter()
        .enumerate()
        .map(|(index, slice)| {
            let pixels = &slice.borrow().pixels;
            T::pixels(pixels)
                .map(|array| oriented(array.view(), layout))
                .ok_or(CombineError::PixelKindMismatch {
                    index,
                    expected: T::KIND,
                    found: pixels.kind(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut voxels = ArrayD::<T>::default(IxDyn(shape));
    let axis = slice_axis(layout, shape.len());
    voxels
        .axis_iter_mut(axis)
        .into_par_iter()
        .zip(sources.par_iter())
        .for_each(|(mut target, source)| target.assign(source));

    Ok(T::into_voxels(voxels))
}

fn merge_rescaled<S>(ordered: &[S], shape: &[usize], layout: Layout) -> ArrayD<f32>
where
    S: Borrow<SliceRecord> + Sync,
{
    let mut voxels = ArrayD::<f32>::zeros(IxDyn(shape));
    let axis = slice_axis(layout, shape.len());
    voxels
        .axis_iter_mut(axis)
        .into_par_iter()
        .zip(ordered.par_iter())
        .for_each(|(target, slice)| rescale_into(target, slice.borrow(), layout));
    voxels
}

fn rescale_into(target: ArrayViewMutD<'_, f32>, slice: &SliceRecord, layout: Layout) {
    let slope = slice.rescale_slope.unwrap_or(1.0) as f32;
    let intercept = slice.rescale_intercept.unwrap_or(0.0) as f32;
    dispatch!(&slice.pixels, PixelArray, array => {
        write_rescaled(target, oriented(array.view(), layout), slope, intercept)
    })
}

fn write_rescaled<T: Pixel>(
    mut target: ArrayViewMutD<'_, f32>,
    source: ArrayViewD<'_, T>,
    slope: f32,
    intercept: f32,
) {
    target.zip_mut_with(&source, |voxel, &value| {
        *voxel = value.to_f32() * slope + intercept;
    });
}
