use crate::enums::Layout;
use crate::merge::Voxels;
use crate::validation::Diagnostics;

use image::ImageBuffer;
use image::Luma;
use nalgebra::Matrix4;
use nalgebra::Point3;
use ndarray::ArrayViewD;
use rayon::prelude::*;

/// A combined series: the voxel array, its index-to-patient affine and the
/// order the input slices were stacked in.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    voxels: Voxels,
    affine: Matrix4<f64>,
    order: Vec<usize>,
    layout: Layout,
    diagnostics: Diagnostics,
}

impl Volume {
    pub(crate) fn new(
        voxels: Voxels,
        affine: Matrix4<f64>,
        order: Vec<usize>,
        layout: Layout,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            voxels,
            affine,
            order,
            layout,
            diagnostics,
        }
    }

    /// Get the shape of the voxel array
    pub fn dim(&self) -> &[usize] {
        self.voxels.shape()
    }

    /// Get a reference to the underlying data
    pub fn voxels(&self) -> &Voxels {
        &self.voxels
    }

    pub fn into_voxels(self) -> Voxels {
        self.voxels
    }

    /// `[x, y, z, 1]ᵗ = affine · [i, j, k, 1]ᵗ`
    pub fn affine(&self) -> &Matrix4<f64> {
        &self.affine
    }

    /// Input index of each stacked slice.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Warnings raised while validating the series
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn num_slices(&self) -> usize {
        self.order.len()
    }

    /// Input index of the slice stored at `k`.
    pub fn source_index(&self, k: usize) -> Option<usize> {
        self.order.get(k).copied()
    }

    /// Patient coordinates of voxel `(i, j, k)`; `i` indexes columns and `j`
    /// rows in either layout.
    pub fn voxel_to_physical(&self, i: f64, j: f64, k: f64) -> Point3<f64> {
        self.affine.transform_point(&Point3::new(i, j, k))
    }

    #[inline]
    fn normalize_to_u8(value: f64, min: f64, range: f64) -> u8 {
        if range <= 0.0 {
            return 0;
        }
        (((value - min) / range) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// Single-channel slice `k` windowed to its own min/max, rows top to
    /// bottom. `None` for an out-of-range index or multi-sample data.
    pub fn slice_image(&self, k: usize) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let slice = self.voxels.slice_f64(self.layout, k)?;
        if slice.ndim() != 2 {
            return None;
        }
        let slice = match self.layout {
            Layout::SliceMinor => slice.view().reversed_axes(),
            Layout::SliceMajor => slice.view(),
        };
        Self::slice_to_image(slice)
    }

    fn slice_to_image(slice: ArrayViewD<'_, f64>) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = (slice.shape()[0], slice.shape()[1]);
        let (min, max) = slice
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            });
        let range = max - min;
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, min, range))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }
}
