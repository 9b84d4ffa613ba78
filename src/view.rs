//! Dynamic-rank array descriptors.
//!
//! - [`NdView`]: read-only, non-owning view over a [`Buffer`]
//! - [`NdViewMut`]: writable, non-owning view
//! - [`NdArray`]: owned array
//!
//! Several views may alias the same storage. A view never owns its buffer;
//! only `NdArray` does.

use std::sync::Arc;

use crate::buffer::{Buffer, RawElement};
use crate::dtype::{DType, Scalar};
use crate::layout::{
    linear_index_to_offset, numel, shape_to_strides, spread_dimensions, validate_bounds, Order,
};
use crate::{ReduceError, Result};

fn element_offset(shape: &[usize], strides: &[isize], offset: usize, indices: &[usize]) -> usize {
    assert_eq!(indices.len(), shape.len(), "index rank mismatch");
    let mut pos = offset as isize;
    for ((&i, &d), &s) in indices.iter().zip(shape).zip(strides) {
        assert!(i < d, "index {i} out of bounds for dimension of size {d}");
        pos += i as isize * s;
    }
    pos as usize
}

// ============================================================================
// NdView
// ============================================================================

/// Read-only strided view over a buffer.
#[derive(Clone)]
pub struct NdView<'a> {
    buffer: &'a Buffer,
    shape: Arc<[usize]>,
    strides: Arc<[isize]>,
    offset: usize,
    order: Order,
    accessors: bool,
}

impl std::fmt::Debug for NdView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdView")
            .field("dtype", &self.dtype())
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("order", &self.order)
            .finish()
    }
}

impl<'a> NdView<'a> {
    /// Create a view, checking that every element lies inside `buffer`.
    pub fn new(
        buffer: &'a Buffer,
        shape: &[usize],
        strides: &[isize],
        offset: usize,
        order: Order,
    ) -> Result<Self> {
        validate_bounds(buffer.len(), shape, strides, offset)?;
        Ok(Self {
            buffer,
            shape: Arc::from(shape),
            strides: Arc::from(strides),
            offset,
            order,
            accessors: buffer.dtype().requires_accessors(),
        })
    }

    /// View with shared layout vectors; bounds are the caller's responsibility.
    pub(crate) fn from_parts(
        buffer: &'a Buffer,
        shape: Arc<[usize]>,
        strides: Arc<[isize]>,
        offset: usize,
        order: Order,
        accessors: bool,
    ) -> Self {
        Self {
            buffer,
            shape,
            strides,
            offset,
            order,
            accessors,
        }
    }

    /// Route element access through the accessor protocol even for raw storage.
    pub fn with_accessors(mut self) -> Self {
        self.accessors = true;
        self
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    #[inline]
    pub fn buffer(&self) -> &'a Buffer {
        self.buffer
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        numel(&self.shape)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether reads go through the accessor protocol.
    #[inline]
    pub fn uses_accessors(&self) -> bool {
        self.accessors
    }

    /// Directly indexable storage, `None` when the accessor protocol applies.
    pub fn raw_slice<T: RawElement>(&self) -> Option<&'a [T]> {
        if self.accessors {
            return None;
        }
        self.buffer.as_slice::<T>()
    }

    /// Element at a multi-index.
    ///
    /// # Panics
    /// Panics if `indices` has the wrong length or is out of bounds.
    pub fn get(&self, indices: &[usize]) -> Scalar {
        self.buffer
            .get(element_offset(&self.shape, &self.strides, self.offset, indices))
    }

    /// Element at a position of the row-major view enumeration.
    pub fn get_linear(&self, index: usize) -> Scalar {
        self.buffer.get(linear_index_to_offset(
            &self.shape,
            &self.strides,
            self.offset,
            Order::RowMajor,
            index,
        ))
    }

    /// Visit every element in row-major view order.
    pub fn for_each<F: FnMut(Scalar)>(&self, mut f: F) {
        self.for_each_offset(|pos| f(self.buffer.get(pos)));
    }

    /// Visit the storage offset of every element in row-major view order.
    pub fn for_each_offset<F: FnMut(usize)>(&self, mut f: F) {
        let len = self.len();
        if len == 0 {
            return;
        }
        let rank = self.shape.len();
        if rank == 0 {
            f(self.offset);
            return;
        }
        let mut idx = vec![0usize; rank];
        let mut pos = self.offset as isize;
        for _ in 0..len {
            f(pos as usize);
            for d in (0..rank).rev() {
                idx[d] += 1;
                pos += self.strides[d];
                if idx[d] < self.shape[d] {
                    break;
                }
                pos -= self.shape[d] as isize * self.strides[d];
                idx[d] = 0;
            }
        }
    }

    /// Collect all elements in row-major view order.
    pub fn to_scalars(&self) -> Vec<Scalar> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|v| out.push(v));
        out
    }

    /// Copy-convert into a new contiguous array of `dtype` with this view's order.
    pub fn cast_to(&self, dtype: DType) -> NdArray {
        let mut out = NdArray::zeros(dtype, &self.shape, self.order);
        let strides = out.strides.clone();
        let mut k = 0usize;
        self.for_each(|v| {
            let pos = linear_index_to_offset(&self.shape, &strides, 0, Order::RowMajor, k);
            out.buffer.set(pos, v.cast(dtype));
            k += 1;
        });
        out
    }
}

// ============================================================================
// NdViewMut
// ============================================================================

/// Writable strided view over a buffer.
pub struct NdViewMut<'a> {
    buffer: &'a mut Buffer,
    shape: Arc<[usize]>,
    strides: Arc<[isize]>,
    offset: usize,
    order: Order,
    accessors: bool,
}

impl std::fmt::Debug for NdViewMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdViewMut")
            .field("dtype", &self.dtype())
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("order", &self.order)
            .finish()
    }
}

impl<'a> NdViewMut<'a> {
    /// Create a writable view, checking that every element lies inside `buffer`.
    pub fn new(
        buffer: &'a mut Buffer,
        shape: &[usize],
        strides: &[isize],
        offset: usize,
        order: Order,
    ) -> Result<Self> {
        validate_bounds(buffer.len(), shape, strides, offset)?;
        let accessors = buffer.dtype().requires_accessors();
        Ok(Self {
            buffer,
            shape: Arc::from(shape),
            strides: Arc::from(strides),
            offset,
            order,
            accessors,
        })
    }

    /// Route element writes through the accessor protocol even for raw storage.
    pub fn with_accessors(mut self) -> Self {
        self.accessors = true;
        self
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        numel(&self.shape)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn uses_accessors(&self) -> bool {
        self.accessors
    }

    #[inline]
    pub(crate) fn buffer_mut(&mut self) -> &mut Buffer {
        &mut *self.buffer
    }

    /// Read-only view of the same elements.
    pub fn as_view(&self) -> NdView<'_> {
        NdView::from_parts(
            &*self.buffer,
            self.shape.clone(),
            self.strides.clone(),
            self.offset,
            self.order,
            self.accessors,
        )
    }

    pub fn get(&self, indices: &[usize]) -> Scalar {
        self.buffer
            .get(element_offset(&self.shape, &self.strides, self.offset, indices))
    }

    pub fn set(&mut self, indices: &[usize], value: Scalar) {
        let pos = element_offset(&self.shape, &self.strides, self.offset, indices);
        self.buffer.set(pos, value);
    }
}

// ============================================================================
// NdArray
// ============================================================================

/// Owned strided array.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    buffer: Buffer,
    shape: Vec<usize>,
    strides: Vec<isize>,
    offset: usize,
    order: Order,
}

impl NdArray {
    /// Zero-filled contiguous array.
    pub fn zeros(dtype: DType, shape: &[usize], order: Order) -> Self {
        Self {
            buffer: Buffer::zeros(dtype, numel(shape)),
            shape: shape.to_vec(),
            strides: shape_to_strides(shape, order),
            offset: 0,
            order,
        }
    }

    /// Contiguous array from data laid out in `order`.
    pub fn from_vec<T: RawElement>(data: Vec<T>, shape: &[usize], order: Order) -> Result<Self> {
        Self::from_buffer(T::into_buffer(data), shape, order)
    }

    /// Contiguous array over existing storage laid out in `order`.
    pub fn from_buffer(buffer: Buffer, shape: &[usize], order: Order) -> Result<Self> {
        if buffer.len() != numel(shape) {
            return Err(ReduceError::DataLengthMismatch {
                len: buffer.len(),
                shape: shape.to_vec(),
            });
        }
        Ok(Self {
            buffer,
            shape: shape.to_vec(),
            strides: shape_to_strides(shape, order),
            offset: 0,
            order,
        })
    }

    /// Array with an explicit layout over existing storage.
    pub fn from_parts(
        buffer: Buffer,
        shape: &[usize],
        strides: &[isize],
        offset: usize,
        order: Order,
    ) -> Result<Self> {
        validate_bounds(buffer.len(), shape, strides, offset)?;
        Ok(Self {
            buffer,
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            offset,
            order,
        })
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        numel(&self.shape)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view(&self) -> NdView<'_> {
        NdView::from_parts(
            &self.buffer,
            Arc::from(self.shape.as_slice()),
            Arc::from(self.strides.as_slice()),
            self.offset,
            self.order,
            self.buffer.dtype().requires_accessors(),
        )
    }

    pub fn view_mut(&mut self) -> NdViewMut<'_> {
        let accessors = self.buffer.dtype().requires_accessors();
        NdViewMut {
            buffer: &mut self.buffer,
            shape: Arc::from(self.shape.as_slice()),
            strides: Arc::from(self.strides.as_slice()),
            offset: self.offset,
            order: self.order,
            accessors,
        }
    }

    pub fn get(&self, indices: &[usize]) -> Scalar {
        self.buffer
            .get(element_offset(&self.shape, &self.strides, self.offset, indices))
    }

    pub fn set(&mut self, indices: &[usize], value: Scalar) {
        let pos = element_offset(&self.shape, &self.strides, self.offset, indices);
        self.buffer.set(pos, value);
    }

    /// All elements in row-major view order.
    pub fn to_scalars(&self) -> Vec<Scalar> {
        self.view().to_scalars()
    }

    /// All elements in row-major view order, as `f64` (real part).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.to_scalars().iter().map(Scalar::to_f64).collect()
    }

    /// Reinsert the sorted reduced `dims` as size-1 dimensions.
    pub fn spread_dimensions(self, ndims: usize, dims: &[usize]) -> Result<Self> {
        let (shape, strides) = spread_dimensions(ndims, &self.shape, &self.strides, dims)?;
        Ok(Self {
            buffer: self.buffer,
            shape,
            strides,
            offset: self.offset,
            order: self.order,
        })
    }

    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_view_bounds_checked() {
        let buf = Buffer::Float64(vec![0.0; 6]);
        assert!(NdView::new(&buf, &[2, 3], &[3, 1], 0, Order::RowMajor).is_ok());
        assert!(NdView::new(&buf, &[2, 3], &[3, 1], 1, Order::RowMajor).is_err());
        assert!(NdView::new(&buf, &[2, 3], &[-3, 1], 3, Order::RowMajor).is_ok());
    }

    #[test]
    fn test_for_each_negative_strides() {
        let buf = Buffer::Int32((0..6).collect());
        let view = NdView::new(&buf, &[2, 3], &[-3, -1], 5, Order::RowMajor).unwrap();
        let values: Vec<f64> = view.to_scalars().iter().map(Scalar::to_f64).collect();
        assert_eq!(values, vec![5.0, 4.0, 3.0, 2.0, 1.0, 0.0]);
        assert_eq!(view.get(&[1, 0]), Scalar::Int32(2));
        assert_eq!(view.get_linear(4), Scalar::Int32(1));
    }

    #[test]
    fn test_for_each_rank0_and_empty() {
        let buf = Buffer::Float64(vec![1.0, 2.0]);
        let scalar = NdView::new(&buf, &[], &[], 1, Order::RowMajor).unwrap();
        assert_eq!(scalar.to_scalars(), vec![Scalar::Float64(2.0)]);
        let empty = NdView::new(&buf, &[0, 2], &[2, 1], 0, Order::RowMajor).unwrap();
        assert!(empty.to_scalars().is_empty());
    }

    #[test]
    fn test_raw_slice_respects_accessor_flag() {
        let buf = Buffer::Float64(vec![1.0]);
        let view = NdView::new(&buf, &[1], &[1], 0, Order::RowMajor).unwrap();
        assert!(view.raw_slice::<f64>().is_some());
        assert!(view.clone().with_accessors().raw_slice::<f64>().is_none());

        let cbuf = Buffer::from_complex128(&[Complex64::new(1.0, 1.0)]);
        let cview = NdView::new(&cbuf, &[1], &[1], 0, Order::RowMajor).unwrap();
        assert!(cview.uses_accessors());
    }

    #[test]
    fn test_cast_to_preserves_logical_order() {
        let a = NdArray::from_vec(vec![1i32, 2, 3, 4, 5, 6], &[2, 3], Order::ColumnMajor).unwrap();
        let b = a.view().cast_to(DType::Float32);
        assert_eq!(b.order(), Order::ColumnMajor);
        assert_eq!(b.to_f64_vec(), a.to_f64_vec());
        assert_eq!(b.buffer(), &Buffer::Float32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    }

    #[test]
    fn test_array_spread_dimensions() {
        let a = NdArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2], Order::RowMajor).unwrap();
        let b = a.clone().spread_dimensions(3, &[0]).unwrap();
        assert_eq!(b.shape(), &[1, 2, 2]);
        assert_eq!(b.get(&[0, 1, 0]), Scalar::Float64(3.0));
        assert_eq!(b.to_f64_vec(), a.to_f64_vec());
    }

    #[test]
    fn test_from_buffer_length_checked() {
        let err = NdArray::from_vec(vec![1u8, 2, 3], &[2, 2], Order::RowMajor).unwrap_err();
        assert!(matches!(err, ReduceError::DataLengthMismatch { .. }));
    }
}
