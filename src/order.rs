//! Loop ordering for co-iterated strided arrays.
//!
//! Dimensions are scored by the stride magnitudes of every array iterated
//! together (the destination counts double) and sorted so the cheapest
//! dimension is visited innermost.

/// A loop permutation together with the permuted shape and strides.
///
/// Everything is stored innermost-first: `shape[0]` is the dimension visited
/// in the innermost loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOrder {
    /// `perm[k]` is the original index of the k-th innermost dimension.
    pub perm: Vec<usize>,
    pub shape: Vec<usize>,
    /// One permuted stride vector per array, in input order.
    pub strides: Vec<Vec<isize>>,
}

/// Compute the loop order for `shape` iterated over arrays with `strides_list`.
///
/// `dest_index` marks the array that is written; its strides weigh twice as
/// much. Ties keep the original dimension order.
pub fn resolve_loop_order(
    shape: &[usize],
    strides_list: &[&[isize]],
    dest_index: Option<usize>,
) -> LoopOrder {
    let perm = compute_order(shape.len(), strides_list, dest_index);
    let shape = perm.iter().map(|&d| shape[d]).collect();
    let strides = strides_list
        .iter()
        .map(|strides| perm.iter().map(|&d| strides[d]).collect())
        .collect();
    LoopOrder {
        perm,
        shape,
        strides,
    }
}

/// Dimension permutation, innermost first.
pub(crate) fn compute_order(
    rank: usize,
    strides_list: &[&[isize]],
    dest_index: Option<usize>,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rank).collect();
    if strides_list.is_empty() {
        return order;
    }
    order.sort_by(|&a, &b| {
        let score_a = dim_score(a, strides_list, dest_index);
        let score_b = dim_score(b, strides_list, dest_index);
        score_a.cmp(&score_b).then_with(|| a.cmp(&b))
    });
    order
}

fn dim_score(dim: usize, strides_list: &[&[isize]], dest_index: Option<usize>) -> usize {
    let mut score = 0usize;
    for (i, strides) in strides_list.iter().enumerate() {
        let weight = if dest_index == Some(i) { 2 } else { 1 };
        let stride = strides[dim].unsigned_abs();
        score = score.saturating_add(weight * stride);
    }
    score
}

/// Compute the relative order of strides.
///
/// Returns a vector where `result[i]` is the rank of `strides[i]` among all
/// non-zero strides. Zero strides have order 1.
pub(crate) fn index_order(strides: &[isize]) -> Vec<usize> {
    strides
        .iter()
        .map(|&si| {
            let si = si.unsigned_abs();
            if si == 0 {
                return 1;
            }
            1 + strides
                .iter()
                .filter(|&&s| s != 0 && s.unsigned_abs() < si)
                .count()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_puts_last_dim_innermost() {
        let strides = [12isize, 4, 1];
        let order = resolve_loop_order(&[2, 3, 4], &[&strides], None);
        assert_eq!(order.perm, vec![2, 1, 0]);
        assert_eq!(order.shape, vec![4, 3, 2]);
        assert_eq!(order.strides, vec![vec![1, 4, 12]]);
    }

    #[test]
    fn test_destination_weighted() {
        // input row-major, output column-major: destination wins
        let input = [5isize, 1];
        let output = [1isize, 4];
        let order = resolve_loop_order(&[4, 5], &[&input, &output], Some(1));
        assert_eq!(order.perm, vec![0, 1]);
        assert_eq!(order.strides, vec![vec![5, 1], vec![1, 4]]);
    }

    #[test]
    fn test_negative_strides_use_magnitude() {
        let strides = [-1isize, 3];
        let order = resolve_loop_order(&[3, 2], &[&strides], None);
        assert_eq!(order.perm, vec![0, 1]);
    }

    #[test]
    fn test_ties_are_stable() {
        let strides = [2isize, 2, 2];
        assert_eq!(compute_order(3, &[&strides], None), vec![0, 1, 2]);
    }

    #[test]
    fn test_index_order() {
        assert_eq!(index_order(&[4, 1, 2]), vec![3, 1, 2]);
        assert_eq!(index_order(&[4, 0, 2]), vec![2, 1, 1]);
        assert_eq!(index_order(&[-4, 1, -2]), vec![3, 1, 2]);
        assert_eq!(index_order(&[2, 2, 1]), vec![2, 2, 1]);
    }
}
