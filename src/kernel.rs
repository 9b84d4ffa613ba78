//! Loop nests over the loop dimensions of a reduction.
//!
//! Every function walks a set of co-iterated arrays and calls `f` with the
//! current storage offset of each array. Shapes and strides passed to the
//! linear, nested and blocked walkers are in iteration order (innermost
//! first); the generic walker takes them in logical order.

use smallvec::SmallVec;

use crate::layout::{linear_index_to_offset, Order};

pub(crate) type Offsets = SmallVec<[isize; 4]>;

#[inline]
fn advance(offsets: &mut [isize], strides: &[Vec<isize>], dim: usize, steps: isize) {
    for (offset, s) in offsets.iter_mut().zip(strides) {
        *offset += steps * s[dim];
    }
}

/// Single loop of `len` steps; `strides` holds one stride per array.
#[inline]
pub(crate) fn for_each_linear<F>(len: usize, strides: &[isize], bases: &[isize], f: &mut F)
where
    F: FnMut(&[isize]),
{
    let mut offsets: Offsets = bases.iter().copied().collect();
    for _ in 0..len {
        f(offsets.as_slice());
        for (offset, &s) in offsets.iter_mut().zip(strides) {
            *offset += s;
        }
    }
}

/// Plain nested loops for rank 2 or 3, innermost dimension first.
pub(crate) fn for_each_nested<F>(shape: &[usize], strides: &[Vec<isize>], bases: &[isize], f: &mut F)
where
    F: FnMut(&[isize]),
{
    let mut offsets: Offsets = bases.iter().copied().collect();
    match shape.len() {
        2 => nested_2d(shape, strides, &mut offsets, f),
        3 => {
            let d2 = shape[2];
            for _ in 0..d2 {
                nested_2d(shape, strides, &mut offsets, f);
                advance(&mut offsets, strides, 1, -(shape[1] as isize));
                advance(&mut offsets, strides, 2, 1);
            }
        }
        _ => for_each_generic_ordered(shape, strides, bases, f),
    }
}

// Leaves `offsets` advanced by `shape[1]` steps along dim 1.
#[inline]
fn nested_2d<F>(shape: &[usize], strides: &[Vec<isize>], offsets: &mut [isize], f: &mut F)
where
    F: FnMut(&[isize]),
{
    let (d0, d1) = (shape[0], shape[1]);
    for _ in 0..d1 {
        for _ in 0..d0 {
            f(&*offsets);
            advance(offsets, strides, 0, 1);
        }
        advance(offsets, strides, 0, -(d0 as isize));
        advance(offsets, strides, 1, 1);
    }
}

/// Tiled loops for rank 2 or 3, innermost dimension first.
///
/// Tiles are visited outermost dimension first; inside a tile elements are
/// visited with the innermost dimension varying fastest.
pub(crate) fn for_each_blocked<F>(
    shape: &[usize],
    blocks: &[usize],
    strides: &[Vec<isize>],
    bases: &[isize],
    f: &mut F,
) where
    F: FnMut(&[isize]),
{
    match shape.len() {
        2 => blocked_2d(shape, blocks, strides, bases, f),
        3 => blocked_3d(shape, blocks, strides, bases, f),
        _ => for_each_generic_ordered(shape, strides, bases, f),
    }
}

fn blocked_2d<F>(shape: &[usize], blocks: &[usize], strides: &[Vec<isize>], bases: &[isize], f: &mut F)
where
    F: FnMut(&[isize]),
{
    let (d0, d1) = (shape[0], shape[1]);
    let b0 = blocks[0].clamp(1, d0.max(1));
    let b1 = blocks[1].clamp(1, d1.max(1));

    let mut offsets: Offsets = bases.iter().copied().collect();
    let mut j1 = 0usize;
    while j1 < d1 {
        let n1 = b1.min(d1 - j1);
        let mut j0 = 0usize;
        while j0 < d0 {
            let n0 = b0.min(d0 - j0);
            tile_start(&mut offsets, bases, strides, &[j0, j1]);
            nested_2d(&[n0, n1], strides, &mut offsets, f);
            j0 += n0;
        }
        j1 += n1;
    }
}

fn blocked_3d<F>(shape: &[usize], blocks: &[usize], strides: &[Vec<isize>], bases: &[isize], f: &mut F)
where
    F: FnMut(&[isize]),
{
    let (d0, d1, d2) = (shape[0], shape[1], shape[2]);
    let b0 = blocks[0].clamp(1, d0.max(1));
    let b1 = blocks[1].clamp(1, d1.max(1));
    let b2 = blocks[2].clamp(1, d2.max(1));

    let mut offsets: Offsets = bases.iter().copied().collect();
    let mut j2 = 0usize;
    while j2 < d2 {
        let n2 = b2.min(d2 - j2);
        let mut j1 = 0usize;
        while j1 < d1 {
            let n1 = b1.min(d1 - j1);
            let mut j0 = 0usize;
            while j0 < d0 {
                let n0 = b0.min(d0 - j0);
                tile_start(&mut offsets, bases, strides, &[j0, j1, j2]);
                for _ in 0..n2 {
                    nested_2d(&[n0, n1], strides, &mut offsets, f);
                    advance(&mut offsets, strides, 1, -(n1 as isize));
                    advance(&mut offsets, strides, 2, 1);
                }
                j0 += n0;
            }
            j1 += n1;
        }
        j2 += n2;
    }
}

#[inline]
fn tile_start(offsets: &mut [isize], bases: &[isize], strides: &[Vec<isize>], start: &[usize]) {
    for ((offset, &base), s) in offsets.iter_mut().zip(bases).zip(strides) {
        *offset = base
            + start
                .iter()
                .zip(s.iter())
                .map(|(&j, &st)| j as isize * st)
                .sum::<isize>();
    }
}

/// Flat view-index walk for any rank.
///
/// Each array's offset is recomputed independently from the row-major view
/// index, so arrays with unrelated memory orders stay in lockstep.
pub(crate) fn for_each_generic<F>(
    shape: &[usize],
    strides: &[&[isize]],
    bases: &[usize],
    f: &mut F,
) where
    F: FnMut(&[isize]),
{
    let len: usize = shape.iter().product();
    let mut offsets: Offsets = SmallVec::from_elem(0, strides.len());
    for idx in 0..len {
        for ((offset, s), &base) in offsets.iter_mut().zip(strides).zip(bases) {
            *offset = linear_index_to_offset(shape, s, base, Order::RowMajor, idx) as isize;
        }
        f(offsets.as_slice());
    }
}

fn for_each_generic_ordered<F>(shape: &[usize], strides: &[Vec<isize>], bases: &[isize], f: &mut F)
where
    F: FnMut(&[isize]),
{
    let refs: Vec<&[isize]> = strides.iter().map(Vec::as_slice).collect();
    let bases: Vec<usize> = bases.iter().map(|&b| b as usize).collect();
    for_each_generic(shape, &refs, &bases, f);
}
