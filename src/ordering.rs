use std::borrow::Borrow;

use crate::{
    combine::CombineError,
    enums::SliceOrdering,
    slice::{SliceRecord, slice_positions},
};

/// Permutation of `slices` that defines the third axis of the volume:
/// `order[k]` is the input index of the slice placed at `k`.
pub fn order_slices<S: Borrow<SliceRecord>>(
    slices: &[S],
    ordering: SliceOrdering,
) -> Result<Vec<usize>, CombineError> {
    match ordering {
        SliceOrdering::SlicePosition => Ok(sort_by_slice_position(slices)),
        SliceOrdering::InstanceNumber => sort_by_instance_number(slices),
        SliceOrdering::None => Ok((0..slices.len()).collect()),
    }
}

/// Ascending position along the first slice's slice cosine. Slices at equal
/// positions keep their input order.
pub fn sort_by_slice_position<S: Borrow<SliceRecord>>(slices: &[S]) -> Vec<usize> {
    let Some(first) = slices.first() else {
        return Vec::new();
    };
    let positions = slice_positions(slices, &first.borrow().cosines().slice);

    let mut order: Vec<usize> = (0..slices.len()).collect();
    order.sort_by(|&a, &b| positions[a].total_cmp(&positions[b]));
    order
}

/// Descending InstanceNumber. Every slice must carry one.
pub fn sort_by_instance_number<S: Borrow<SliceRecord>>(
    slices: &[S],
) -> Result<Vec<usize>, CombineError> {
    let instance_numbers = slices
        .iter()
        .enumerate()
        .map(|(index, slice)| {
            slice
                .borrow()
                .instance_number
                .ok_or(CombineError::MissingInstanceNumber { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut order: Vec<usize> = (0..slices.len()).collect();
    order.sort_by(|&a, &b| instance_numbers[b].cmp(&instance_numbers[a]));
    Ok(order)
}

/// The slices in the given order.
pub fn apply_order<'a, S: Borrow<SliceRecord>>(slices: &'a [S], order: &[usize]) -> Vec<&'a SliceRecord> {
    order.iter().map(|&index| slices[index].borrow()).collect()
}
