/// Whether stored pixel values are mapped through RescaleSlope/RescaleIntercept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rescale {
    /// Rescale when at least one slice carries a slope or an intercept
    #[default]
    Auto,
    Always,
    Never,
}

impl Rescale {
    /// Resolve the mode against a concrete list of slices.
    pub fn resolve(self, any_slice_has_coefficients: bool) -> bool {
        match self {
            Rescale::Auto => any_slice_has_coefficients,
            Rescale::Always => true,
            Rescale::Never => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SliceOrdering {
    /// Ascending projection of ImagePositionPatient onto the slice cosine
    #[default]
    SlicePosition,
    /// Descending InstanceNumber
    InstanceNumber,
    /// Keep the caller's order
    None,
}

/// Memory layout of the merged voxel array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Layout {
    /// `(columns, rows, [samples], slices)`, indexed like the affine's `(i, j, k)`
    #[default]
    SliceMinor,
    /// `(slices, rows, columns, [samples])`, every slice contiguous
    SliceMajor,
}
