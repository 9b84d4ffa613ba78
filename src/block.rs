//! Tile sizes for the blocked reduction strategy.
//!
//! Follows Strided.jl's `_computeblocks`: if the whole loop nest touches less
//! memory than the target, no tiling happens; otherwise the dimension with the
//! largest `(block - 1) * cost` is halved, then decremented, until the estimated
//! working set fits.

use crate::order::index_order;
use crate::CACHE_LINE_SIZE;

/// Tile edge per loop dimension.
///
/// `dims` and every entry of `strides_list` are in iteration order
/// (innermost first). `elem_size` is the widest element among the arrays.
pub(crate) fn compute_block_sizes(
    dims: &[usize],
    strides_list: &[&[isize]],
    elem_size: usize,
    block_memory: usize,
) -> Vec<usize> {
    if dims.is_empty() {
        return Vec::new();
    }

    let byte_strides: Vec<Vec<isize>> = strides_list
        .iter()
        .map(|strides| strides.iter().map(|&s| s * elem_size as isize).collect())
        .collect();
    let stride_orders: Vec<Vec<usize>> = byte_strides.iter().map(|bs| index_order(bs)).collect();
    let costs = compute_costs(strides_list);

    let byte_refs: Vec<&[isize]> = byte_strides.iter().map(Vec::as_slice).collect();
    let order_refs: Vec<&[usize]> = stride_orders.iter().map(Vec::as_slice).collect();
    let blocks = compute_blocks(dims, &costs, &byte_refs, &order_refs, block_memory);
    tracing::trace!(?dims, ?blocks, elem_size, "computed tile sizes");
    blocks
}

fn compute_blocks(
    dims: &[usize],
    costs: &[isize],
    byte_strides: &[&[isize]],
    stride_orders: &[&[usize]],
    block_memory: usize,
) -> Vec<usize> {
    let n = dims.len();
    if n == 0 {
        return vec![];
    }
    if total_memory_region(dims, byte_strides) <= block_memory {
        return dims.to_vec();
    }

    // Innermost dimension is the fastest for every array: keep it whole and
    // tile the rest.
    let min_order = stride_orders
        .iter()
        .filter_map(|orders| orders.iter().min().copied())
        .min()
        .unwrap_or(1);
    if stride_orders
        .iter()
        .all(|orders| !orders.is_empty() && orders[0] == min_order)
    {
        let tail_strides: Vec<&[isize]> = byte_strides.iter().map(|s| &s[1..]).collect();
        let tail_orders: Vec<&[usize]> = stride_orders.iter().map(|s| &s[1..]).collect();
        let mut blocks = vec![dims[0]];
        blocks.extend(compute_blocks(
            &dims[1..],
            &costs[1..],
            &tail_strides,
            &tail_orders,
            block_memory,
        ));
        return blocks;
    }

    let min_stride = byte_strides
        .iter()
        .filter_map(|s| s.iter().map(|x| x.unsigned_abs()).min())
        .min()
        .unwrap_or(0);
    if min_stride > block_memory {
        return vec![1; n];
    }

    let mut blocks = dims.to_vec();
    while total_memory_region(&blocks, byte_strides) >= 2 * block_memory {
        match last_argmax_weighted(&blocks, costs) {
            Some(i) => blocks[i] = blocks[i].div_ceil(2),
            None => break,
        }
    }
    while total_memory_region(&blocks, byte_strides) > block_memory {
        match last_argmax_weighted(&blocks, costs) {
            Some(i) => blocks[i] -= 1,
            None => break,
        }
    }
    blocks
}

/// Estimated bytes touched by a loop nest over `dims`, counted in cache lines.
///
/// Strides below a cache line extend one contiguous run; larger strides
/// multiply the number of separate runs.
fn total_memory_region(dims: &[usize], byte_strides: &[&[isize]]) -> usize {
    byte_strides
        .iter()
        .map(|strides| {
            let mut contiguous = 0usize;
            let mut blocks = 1usize;
            for (&d, &s) in dims.iter().zip(strides.iter()) {
                let s = s.unsigned_abs();
                if s < CACHE_LINE_SIZE {
                    contiguous += d.saturating_sub(1) * s;
                } else {
                    blocks = blocks.saturating_mul(d);
                }
            }
            let lines = contiguous / CACHE_LINE_SIZE + 1;
            CACHE_LINE_SIZE.saturating_mul(lines).saturating_mul(blocks)
        })
        .fold(0usize, usize::saturating_add)
}

/// Last index maximizing `(block - 1) * cost`, ignoring exhausted dimensions.
fn last_argmax_weighted(blocks: &[usize], costs: &[isize]) -> Option<usize> {
    let mut best = 0isize;
    let mut best_idx = None;
    for (i, (&b, &c)) in blocks.iter().zip(costs).enumerate() {
        if b <= 1 {
            continue;
        }
        let score = (b as isize - 1) * c;
        if score >= best {
            best = score;
            best_idx = Some(i);
        }
    }
    best_idx
}

/// Per-dimension cost: twice the smallest stride magnitude, 1 for broadcast dims.
fn compute_costs(strides_list: &[&[isize]]) -> Vec<isize> {
    let Some(first) = strides_list.first() else {
        return vec![];
    };
    (0..first.len())
        .map(|d| {
            let min = strides_list
                .iter()
                .map(|s| s[d].abs())
                .min()
                .unwrap_or(0);
            if min == 0 {
                1
            } else {
                2 * min
            }
        })
        .collect()
}
