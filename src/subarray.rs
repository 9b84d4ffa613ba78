//! Subarray views handed to reduction kernels.
//!
//! Views are built once per reduction call; the driver only rewrites their
//! offsets while iterating, so no descriptor is allocated per loop step.

use std::sync::Arc;

use crate::view::NdView;

/// Append one zero-rank view per ancillary array to `out`.
///
/// Each view shares its array's storage, order and access protocol and points
/// at a single element; the driver moves it by overwriting the offset.
pub fn initialize_views<'a>(ancillary: &[NdView<'a>], out: &mut Vec<NdView<'a>>) {
    let shape: Arc<[usize]> = Arc::from(Vec::new());
    let strides: Arc<[isize]> = Arc::from(Vec::new());
    out.extend(ancillary.iter().map(|arr| {
        NdView::from_parts(
            arr.buffer(),
            shape.clone(),
            strides.clone(),
            arr.offset(),
            arr.order(),
            arr.uses_accessors(),
        )
    }));
}

/// View of `input` restricted to the core (reduced) dimensions.
pub(crate) fn core_view<'a>(
    input: &NdView<'a>,
    core_shape: &Arc<[usize]>,
    core_strides: Vec<isize>,
) -> NdView<'a> {
    NdView::from_parts(
        input.buffer(),
        core_shape.clone(),
        Arc::from(core_strides),
        input.offset(),
        input.order(),
        input.uses_accessors(),
    )
}
