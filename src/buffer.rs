//! Owned element storage.
//!
//! Real, integer and boolean dtypes are stored as plain vectors and can be
//! indexed directly. Complex dtypes are stored as interleaved `(re, im)`
//! component pairs and `generic` as boxed [`Scalar`] objects; those can only be
//! read and written through [`Buffer::get`] / [`Buffer::set`].

use num_complex::{Complex32, Complex64};
use num_traits::AsPrimitive;

use crate::dtype::{DType, Scalar};

/// Typed storage backing one or more array descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Float64(Vec<f64>),
    Float32(Vec<f32>),
    Int32(Vec<i32>),
    Int16(Vec<i16>),
    Int8(Vec<i8>),
    Uint32(Vec<u32>),
    Uint16(Vec<u16>),
    Uint8(Vec<u8>),
    Bool(Vec<bool>),
    /// Interleaved `(re, im)` pairs of `f64`.
    Complex128(Vec<f64>),
    /// Interleaved `(re, im)` pairs of `f32`.
    Complex64(Vec<f32>),
    Generic(Vec<Scalar>),
}

impl Buffer {
    /// Zero-filled storage of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Buffer {
        match dtype {
            DType::Float64 => Buffer::Float64(vec![0.0; len]),
            DType::Float32 => Buffer::Float32(vec![0.0; len]),
            DType::Int32 => Buffer::Int32(vec![0; len]),
            DType::Int16 => Buffer::Int16(vec![0; len]),
            DType::Int8 => Buffer::Int8(vec![0; len]),
            DType::Uint32 => Buffer::Uint32(vec![0; len]),
            DType::Uint16 => Buffer::Uint16(vec![0; len]),
            DType::Uint8 => Buffer::Uint8(vec![0; len]),
            DType::Bool => Buffer::Bool(vec![false; len]),
            DType::Complex128 => Buffer::Complex128(vec![0.0; 2 * len]),
            DType::Complex64 => Buffer::Complex64(vec![0.0; 2 * len]),
            DType::Generic => Buffer::Generic(vec![Scalar::Float64(0.0); len]),
        }
    }

    /// Interleave complex values into `complex128` storage.
    pub fn from_complex128(values: &[Complex64]) -> Buffer {
        Buffer::Complex128(bytemuck::cast_slice::<Complex64, f64>(values).to_vec())
    }

    /// Interleave complex values into `complex64` storage.
    pub fn from_complex64(values: &[Complex32]) -> Buffer {
        Buffer::Complex64(bytemuck::cast_slice::<Complex32, f32>(values).to_vec())
    }

    pub fn dtype(&self) -> DType {
        match self {
            Buffer::Float64(_) => DType::Float64,
            Buffer::Float32(_) => DType::Float32,
            Buffer::Int32(_) => DType::Int32,
            Buffer::Int16(_) => DType::Int16,
            Buffer::Int8(_) => DType::Int8,
            Buffer::Uint32(_) => DType::Uint32,
            Buffer::Uint16(_) => DType::Uint16,
            Buffer::Uint8(_) => DType::Uint8,
            Buffer::Bool(_) => DType::Bool,
            Buffer::Complex128(_) => DType::Complex128,
            Buffer::Complex64(_) => DType::Complex64,
            Buffer::Generic(_) => DType::Generic,
        }
    }

    /// Number of logical elements (complex pairs count once).
    pub fn len(&self) -> usize {
        match self {
            Buffer::Float64(v) => v.len(),
            Buffer::Float32(v) => v.len(),
            Buffer::Int32(v) => v.len(),
            Buffer::Int16(v) => v.len(),
            Buffer::Int8(v) => v.len(),
            Buffer::Uint32(v) => v.len(),
            Buffer::Uint16(v) => v.len(),
            Buffer::Uint8(v) => v.len(),
            Buffer::Bool(v) => v.len(),
            Buffer::Complex128(v) => v.len() / 2,
            Buffer::Complex64(v) => v.len() / 2,
            Buffer::Generic(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complex view of `complex128` storage.
    pub fn as_complex128(&self) -> Option<&[Complex64]> {
        match self {
            Buffer::Complex128(v) => Some(bytemuck::cast_slice(v)),
            _ => None,
        }
    }

    /// Directly indexable slice, if the storage holds `T`.
    #[inline]
    pub fn as_slice<T: RawElement>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    #[inline]
    pub fn as_mut_slice<T: RawElement>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(self)
    }

    /// Accessor read of element `index`.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn get(&self, index: usize) -> Scalar {
        match self {
            Buffer::Float64(v) => Scalar::Float64(v[index]),
            Buffer::Float32(v) => Scalar::Float32(v[index]),
            Buffer::Int32(v) => Scalar::Int32(v[index]),
            Buffer::Int16(v) => Scalar::Int16(v[index]),
            Buffer::Int8(v) => Scalar::Int8(v[index]),
            Buffer::Uint32(v) => Scalar::Uint32(v[index]),
            Buffer::Uint16(v) => Scalar::Uint16(v[index]),
            Buffer::Uint8(v) => Scalar::Uint8(v[index]),
            Buffer::Bool(v) => Scalar::Bool(v[index]),
            Buffer::Complex128(v) => {
                Scalar::Complex128(Complex64::new(v[2 * index], v[2 * index + 1]))
            }
            Buffer::Complex64(v) => {
                Scalar::Complex64(Complex32::new(v[2 * index], v[2 * index + 1]))
            }
            Buffer::Generic(v) => v[index],
        }
    }

    /// Accessor write of element `index`, converting `value` to this dtype.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn set(&mut self, index: usize, value: Scalar) {
        match self {
            Buffer::Float64(v) => v[index] = f64::from_scalar(value),
            Buffer::Float32(v) => v[index] = f32::from_scalar(value),
            Buffer::Int32(v) => v[index] = i32::from_scalar(value),
            Buffer::Int16(v) => v[index] = i16::from_scalar(value),
            Buffer::Int8(v) => v[index] = i8::from_scalar(value),
            Buffer::Uint32(v) => v[index] = u32::from_scalar(value),
            Buffer::Uint16(v) => v[index] = u16::from_scalar(value),
            Buffer::Uint8(v) => v[index] = u8::from_scalar(value),
            Buffer::Bool(v) => v[index] = value.to_bool(),
            Buffer::Complex128(v) => {
                let c = value.to_complex();
                v[2 * index] = c.re;
                v[2 * index + 1] = c.im;
            }
            Buffer::Complex64(v) => {
                let c = value.to_complex();
                v[2 * index] = c.re as f32;
                v[2 * index + 1] = c.im as f32;
            }
            Buffer::Generic(v) => v[index] = value,
        }
    }
}

/// Element types stored directly (no accessor indirection needed).
pub trait RawElement: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn slice(buf: &Buffer) -> Option<&[Self]>;
    fn slice_mut(buf: &mut Buffer) -> Option<&mut [Self]>;
    fn into_buffer(data: Vec<Self>) -> Buffer;
    fn to_scalar(self) -> Scalar;
    fn from_scalar(value: Scalar) -> Self;
}

macro_rules! impl_raw_numeric {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl RawElement for $t {
                const DTYPE: DType = DType::$variant;

                #[inline]
                fn slice(buf: &Buffer) -> Option<&[Self]> {
                    match buf {
                        Buffer::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                #[inline]
                fn slice_mut(buf: &mut Buffer) -> Option<&mut [Self]> {
                    match buf {
                        Buffer::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_buffer(data: Vec<Self>) -> Buffer {
                    Buffer::$variant(data)
                }

                #[inline]
                fn to_scalar(self) -> Scalar {
                    Scalar::$variant(self)
                }

                #[inline]
                fn from_scalar(value: Scalar) -> Self {
                    match value {
                        Scalar::Float64(x) => x.as_(),
                        Scalar::Float32(x) => x.as_(),
                        Scalar::Int32(x) => x.as_(),
                        Scalar::Int16(x) => x.as_(),
                        Scalar::Int8(x) => x.as_(),
                        Scalar::Uint32(x) => x.as_(),
                        Scalar::Uint16(x) => x.as_(),
                        Scalar::Uint8(x) => x.as_(),
                        Scalar::Bool(x) => u8::from(x).as_(),
                        Scalar::Complex128(c) => c.re.as_(),
                        Scalar::Complex64(c) => c.re.as_(),
                    }
                }
            }
        )*
    };
}

impl_raw_numeric!(
    f64 => Float64,
    f32 => Float32,
    i32 => Int32,
    i16 => Int16,
    i8 => Int8,
    u32 => Uint32,
    u16 => Uint16,
    u8 => Uint8,
);

impl RawElement for bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn slice(buf: &Buffer) -> Option<&[Self]> {
        match buf {
            Buffer::Bool(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    fn slice_mut(buf: &mut Buffer) -> Option<&mut [Self]> {
        match buf {
            Buffer::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn into_buffer(data: Vec<Self>) -> Buffer {
        Buffer::Bool(data)
    }

    #[inline]
    fn to_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    #[inline]
    fn from_scalar(value: Scalar) -> Self {
        value.to_bool()
    }
}
