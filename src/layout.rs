//! Stride and offset algebra.
//!
//! Pure functions over shapes and strides shared by the view types, the loop
//! order resolver and the reduction driver. Strides are in elements and may
//! be negative or zero.

use std::fmt;
use std::str::FromStr;

use crate::{ReduceError, Result};

/// Memory layout of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Last index varies fastest (C order).
    #[default]
    RowMajor,
    /// First index varies fastest (Fortran/Julia order).
    ColumnMajor,
}

impl Order {
    pub fn as_str(self) -> &'static str {
        match self {
            Order::RowMajor => "row-major",
            Order::ColumnMajor => "column-major",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Order {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "row-major" => Ok(Order::RowMajor),
            "column-major" => Ok(Order::ColumnMajor),
            _ => Err(ReduceError::UnknownOrder(s.to_string())),
        }
    }
}

/// Number of elements described by `shape` (1 for rank 0, 0 if any size is 0).
#[inline]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Contiguous strides for `shape` in the given layout.
pub fn shape_to_strides(shape: &[usize], order: Order) -> Vec<isize> {
    let rank = shape.len();
    if rank == 0 {
        return vec![];
    }
    let mut strides = vec![1isize; rank];
    match order {
        Order::RowMajor => {
            for i in (0..rank - 1).rev() {
                strides[i] = strides[i + 1] * shape[i + 1].max(1) as isize;
            }
        }
        Order::ColumnMajor => {
            for i in 1..rank {
                strides[i] = strides[i - 1] * shape[i - 1].max(1) as isize;
            }
        }
    }
    strides
}

/// Offset of the first logical element when some strides are negative.
///
/// For storage laid out from index 0, walking a negative stride starts at the
/// far end of that dimension: `sum((size - 1) * -stride)` over negative strides.
pub fn strides_to_offset(shape: &[usize], strides: &[isize]) -> usize {
    shape
        .iter()
        .zip(strides)
        .filter(|(_, &s)| s < 0)
        .map(|(&d, &s)| d.saturating_sub(1) * s.unsigned_abs())
        .sum()
}

/// Traversal direction implied by `strides`.
///
/// Returns `1` when no stride is negative, `-1` when every stride is negative,
/// and `0` for a mix.
pub fn iteration_order(strides: &[isize]) -> i8 {
    let negative = strides.iter().filter(|&&s| s < 0).count();
    if negative == 0 {
        1
    } else if negative == strides.len() {
        -1
    } else {
        0
    }
}

/// Storage offset of the element at position `index` of the view enumeration.
///
/// The view enumeration walks the logical index space in `order` (row-major:
/// last dimension fastest), independent of how the storage is laid out. This is
/// what lets several arrays with different physical orders be co-iterated with
/// one flat counter.
pub fn linear_index_to_offset(
    shape: &[usize],
    strides: &[isize],
    base: usize,
    order: Order,
    index: usize,
) -> usize {
    let mut offset = base as isize;
    let mut rem = index;
    match order {
        Order::RowMajor => {
            for d in (0..shape.len()).rev() {
                let n = shape[d].max(1);
                offset += (rem % n) as isize * strides[d];
                rem /= n;
            }
        }
        Order::ColumnMajor => {
            for d in 0..shape.len() {
                let n = shape[d].max(1);
                offset += (rem % n) as isize * strides[d];
                rem /= n;
            }
        }
    }
    offset as usize
}

/// Validate that every element reachable through the layout lies in `[0, len)`.
pub(crate) fn validate_bounds(
    len: usize,
    shape: &[usize],
    strides: &[isize],
    offset: usize,
) -> Result<()> {
    if shape.len() != strides.len() {
        return Err(ReduceError::StrideLengthMismatch);
    }
    // Empty array - no access needed
    if shape.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let start = isize::try_from(offset).map_err(|_| ReduceError::OffsetOverflow)?;
    let mut min_offset = start;
    let mut max_offset = start;
    for (&dim, &stride) in shape.iter().zip(strides) {
        if dim > 1 {
            let end = stride
                .checked_mul(dim as isize - 1)
                .ok_or(ReduceError::OffsetOverflow)?;
            if end >= 0 {
                max_offset = max_offset
                    .checked_add(end)
                    .ok_or(ReduceError::OffsetOverflow)?;
            } else {
                min_offset = min_offset
                    .checked_add(end)
                    .ok_or(ReduceError::OffsetOverflow)?;
            }
        }
    }
    if min_offset < 0 || max_offset as usize >= len {
        return Err(ReduceError::OffsetOverflow);
    }
    Ok(())
}

// ============================================================================
// Dimension partition
// ============================================================================

/// Normalize reduction dimensions against `rank`.
///
/// Negative indices count from the end. Bounds are checked before duplicates;
/// a list longer than `rank` always repeats a dimension and is rejected as a
/// duplicate. The result is sorted and unique.
pub fn normalize_dims(dims: &[isize], rank: usize) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(dims.len());
    for &dim in dims {
        let d = if dim < 0 { dim + rank as isize } else { dim };
        if d < 0 || d >= rank as isize {
            return Err(ReduceError::DimOutOfBounds { dim, rank });
        }
        out.push(d as usize);
    }
    out.sort_unstable();
    if let Some(w) = out.windows(2).find(|w| w[0] == w[1]) {
        return Err(ReduceError::DuplicateDim(w[0]));
    }
    Ok(out)
}

/// Complement of the (sorted) `core` dimensions, in original order.
pub fn loop_dims(core: &[usize], rank: usize) -> Vec<usize> {
    (0..rank).filter(|d| core.binary_search(d).is_err()).collect()
}

/// Pick the entries of `values` at positions `dims`.
#[inline]
pub(crate) fn take<T: Copy>(values: &[T], dims: &[usize]) -> Vec<T> {
    dims.iter().map(|&d| values[d]).collect()
}

/// Reinsert the sorted `dims` as size-1 axes (stride 0) into a lower-rank layout.
///
/// `ndims` is the rank of the result; `shape`/`strides` describe the remaining
/// dimensions in order.
pub fn spread_dimensions(
    ndims: usize,
    shape: &[usize],
    strides: &[isize],
    dims: &[usize],
) -> Result<(Vec<usize>, Vec<isize>)> {
    if shape.len() + dims.len() != ndims {
        return Err(ReduceError::RankMismatch(shape.len() + dims.len(), ndims));
    }
    let mut out_shape = Vec::with_capacity(ndims);
    let mut out_strides = Vec::with_capacity(ndims);
    let mut j = 0;
    for d in 0..ndims {
        if dims.binary_search(&d).is_ok() {
            out_shape.push(1);
            out_strides.push(0);
        } else {
            out_shape.push(shape[j]);
            out_strides.push(strides[j]);
            j += 1;
        }
    }
    Ok((out_shape, out_strides))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel() {
        assert_eq!(numel(&[]), 1);
        assert_eq!(numel(&[2, 3, 4]), 24);
        assert_eq!(numel(&[2, 0, 4]), 0);
    }

    #[test]
    fn test_shape_to_strides() {
        assert_eq!(shape_to_strides(&[2, 3, 4], Order::RowMajor), vec![12, 4, 1]);
        assert_eq!(shape_to_strides(&[2, 3, 4], Order::ColumnMajor), vec![1, 2, 6]);
        assert!(shape_to_strides(&[], Order::RowMajor).is_empty());
    }

    #[test]
    fn test_strides_to_offset() {
        assert_eq!(strides_to_offset(&[2, 3], &[3, 1]), 0);
        assert_eq!(strides_to_offset(&[2, 3], &[-3, 1]), 3);
        assert_eq!(strides_to_offset(&[2, 3], &[-3, -1]), 5);
    }

    #[test]
    fn test_iteration_order() {
        assert_eq!(iteration_order(&[4, 1]), 1);
        assert_eq!(iteration_order(&[0, 1]), 1);
        assert_eq!(iteration_order(&[-4, -1]), -1);
        assert_eq!(iteration_order(&[-4, 1]), 0);
    }

    #[test]
    fn test_linear_index_to_offset_column_major_storage() {
        // 2x3 column-major storage, row-major view enumeration
        let shape = [2, 3];
        let strides = [1isize, 2];
        let offsets: Vec<usize> = (0..6)
            .map(|i| linear_index_to_offset(&shape, &strides, 0, Order::RowMajor, i))
            .collect();
        assert_eq!(offsets, vec![0, 2, 4, 1, 3, 5]);
    }

    #[test]
    fn test_linear_index_to_offset_negative_strides() {
        let shape = [2, 2];
        let strides = [-2isize, -1];
        let base = strides_to_offset(&shape, &strides);
        let offsets: Vec<usize> = (0..4)
            .map(|i| linear_index_to_offset(&shape, &strides, base, Order::RowMajor, i))
            .collect();
        assert_eq!(offsets, vec![3, 2, 1, 0]);
        assert_eq!(
            linear_index_to_offset(&shape, &strides, base, Order::ColumnMajor, 1),
            1
        );
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate_bounds(6, &[2, 3], &[3, 1], 0).is_ok());
        assert!(validate_bounds(6, &[2, 3], &[-3, 1], 3).is_ok());
        assert!(validate_bounds(5, &[2, 3], &[3, 1], 0).is_err());
        assert!(validate_bounds(6, &[2, 3], &[-3, 1], 0).is_err());
        assert!(validate_bounds(0, &[0, 3], &[3, 1], 0).is_ok());
    }

    #[test]
    fn test_normalize_dims() {
        assert_eq!(normalize_dims(&[2, -3], 3).unwrap(), vec![0, 2]);
        let err = normalize_dims(&[3], 3).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Range);
        let err = normalize_dims(&[1, -2], 3).unwrap_err();
        assert!(matches!(err, ReduceError::DuplicateDim(1)));
        let err = normalize_dims(&[0, 1, 2], 2).unwrap_err();
        assert!(matches!(err, ReduceError::DimOutOfBounds { dim: 2, rank: 2 }));
    }

    #[test]
    fn test_normalize_dims_duplicate_before_count() {
        let err = normalize_dims(&[0, 0], 1).unwrap_err();
        assert!(matches!(err, ReduceError::DuplicateDim(0)));
        let err = normalize_dims(&[0, 1, 0], 2).unwrap_err();
        assert!(matches!(err, ReduceError::DuplicateDim(0)));
    }

    #[test]
    fn test_loop_dims() {
        assert_eq!(loop_dims(&[1], 3), vec![0, 2]);
        assert_eq!(loop_dims(&[], 2), vec![0, 1]);
        assert!(loop_dims(&[0, 1], 2).is_empty());
    }

    #[test]
    fn test_spread_dimensions() {
        let (shape, strides) = spread_dimensions(3, &[2, 4], &[4, 1], &[1]).unwrap();
        assert_eq!(shape, vec![2, 1, 4]);
        assert_eq!(strides, vec![4, 0, 1]);
        assert!(spread_dimensions(3, &[2, 4], &[4, 1], &[]).is_err());
    }
}
