//! Runtime element type tags and scalar values.

use std::fmt;
use std::str::FromStr;

use num_complex::{Complex32, Complex64};

use crate::{ReduceError, Result};

/// Tag identifying an element's logical type and storage representation.
///
/// Each dtype has a stable integer enumeration code ([`DType::code`]) used for
/// dispatch table keys, and a string tag ([`Display`](fmt::Display) /
/// [`FromStr`]) used at configuration boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DType {
    Float64 = 0,
    Float32 = 1,
    Int32 = 2,
    Int16 = 3,
    Int8 = 4,
    Uint32 = 5,
    Uint16 = 6,
    Uint8 = 7,
    Bool = 8,
    Complex128 = 9,
    Complex64 = 10,
    Generic = 11,
}

const ALL: [DType; 12] = [
    DType::Float64,
    DType::Float32,
    DType::Int32,
    DType::Int16,
    DType::Int8,
    DType::Uint32,
    DType::Uint16,
    DType::Uint8,
    DType::Bool,
    DType::Complex128,
    DType::Complex64,
    DType::Generic,
];

impl DType {
    /// Integer enumeration code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Resolve an integer enumeration code.
    pub fn from_code(code: u8) -> Result<Self> {
        ALL.get(code as usize)
            .copied()
            .ok_or(ReduceError::UnknownDTypeCode(code))
    }

    /// String tag, e.g. `"float64"`.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Float64 => "float64",
            DType::Float32 => "float32",
            DType::Int32 => "int32",
            DType::Int16 => "int16",
            DType::Int8 => "int8",
            DType::Uint32 => "uint32",
            DType::Uint16 => "uint16",
            DType::Uint8 => "uint8",
            DType::Bool => "bool",
            DType::Complex128 => "complex128",
            DType::Complex64 => "complex64",
            DType::Generic => "generic",
        }
    }

    /// Bytes per element, or `None` for object-valued storage.
    pub fn bytes_per_element(self) -> Option<usize> {
        match self {
            DType::Float64 | DType::Complex64 => Some(8),
            DType::Float32 | DType::Int32 | DType::Uint32 => Some(4),
            DType::Int16 | DType::Uint16 => Some(2),
            DType::Int8 | DType::Uint8 | DType::Bool => Some(1),
            DType::Complex128 => Some(16),
            DType::Generic => None,
        }
    }

    /// Whether storage of this dtype can only be reached through accessors.
    #[inline]
    pub fn requires_accessors(self) -> bool {
        matches!(self, DType::Complex128 | DType::Complex64 | DType::Generic)
    }

    #[inline]
    pub fn is_complex(self) -> bool {
        matches!(self, DType::Complex128 | DType::Complex64)
    }

    #[inline]
    pub fn is_real_floating(self) -> bool {
        matches!(self, DType::Float64 | DType::Float32)
    }

    #[inline]
    pub fn is_floating(self) -> bool {
        self.is_real_floating() || self.is_complex()
    }

    #[inline]
    pub fn is_signed_integer(self) -> bool {
        matches!(self, DType::Int32 | DType::Int16 | DType::Int8)
    }

    #[inline]
    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, DType::Uint32 | DType::Uint16 | DType::Uint8)
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    #[inline]
    pub fn is_real(self) -> bool {
        self.is_real_floating() || self.is_integer()
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        self.is_real() || self.is_complex()
    }

    /// Every dtype.
    pub fn all() -> Vec<DType> {
        ALL.to_vec()
    }

    /// Real and complex numeric dtypes.
    pub fn numeric() -> Vec<DType> {
        Self::filter(DType::is_numeric)
    }

    /// Real-valued numeric dtypes.
    pub fn real() -> Vec<DType> {
        Self::filter(DType::is_real)
    }

    pub fn floating_point() -> Vec<DType> {
        Self::filter(DType::is_floating)
    }

    pub fn real_floating_point() -> Vec<DType> {
        Self::filter(DType::is_real_floating)
    }

    pub fn complex_floating_point() -> Vec<DType> {
        Self::filter(DType::is_complex)
    }

    pub fn integer() -> Vec<DType> {
        Self::filter(DType::is_integer)
    }

    pub fn signed_integer() -> Vec<DType> {
        Self::filter(DType::is_signed_integer)
    }

    pub fn unsigned_integer() -> Vec<DType> {
        Self::filter(DType::is_unsigned_integer)
    }

    fn filter(pred: fn(DType) -> bool) -> Vec<DType> {
        ALL.iter().copied().filter(|&d| pred(d)).collect()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        ALL.iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ReduceError::UnknownDType(s.to_string()))
    }
}

// ============================================================================
// Scalar
// ============================================================================

/// A single element value of any dtype.
///
/// Reduction kernels return a `Scalar`; the driver stores it into the output
/// array, converting it to the output's dtype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Float64(f64),
    Float32(f32),
    Int32(i32),
    Int16(i16),
    Int8(i8),
    Uint32(u32),
    Uint16(u16),
    Uint8(u8),
    Bool(bool),
    Complex128(Complex64),
    Complex64(Complex32),
}

impl Scalar {
    /// The dtype this value naturally belongs to.
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Float64(_) => DType::Float64,
            Scalar::Float32(_) => DType::Float32,
            Scalar::Int32(_) => DType::Int32,
            Scalar::Int16(_) => DType::Int16,
            Scalar::Int8(_) => DType::Int8,
            Scalar::Uint32(_) => DType::Uint32,
            Scalar::Uint16(_) => DType::Uint16,
            Scalar::Uint8(_) => DType::Uint8,
            Scalar::Bool(_) => DType::Bool,
            Scalar::Complex128(_) => DType::Complex128,
            Scalar::Complex64(_) => DType::Complex64,
        }
    }

    /// Real part as `f64`; booleans map to 0/1.
    pub fn to_f64(&self) -> f64 {
        match *self {
            Scalar::Float64(v) => v,
            Scalar::Float32(v) => v as f64,
            Scalar::Int32(v) => v as f64,
            Scalar::Int16(v) => v as f64,
            Scalar::Int8(v) => v as f64,
            Scalar::Uint32(v) => v as f64,
            Scalar::Uint16(v) => v as f64,
            Scalar::Uint8(v) => v as f64,
            Scalar::Bool(v) => u8::from(v) as f64,
            Scalar::Complex128(c) => c.re,
            Scalar::Complex64(c) => c.re as f64,
        }
    }

    /// Value as a double-precision complex number.
    pub fn to_complex(&self) -> Complex64 {
        match *self {
            Scalar::Complex128(c) => c,
            Scalar::Complex64(c) => Complex64::new(c.re as f64, c.im as f64),
            _ => Complex64::new(self.to_f64(), 0.0),
        }
    }

    /// Truthiness: non-zero for numbers, the value itself for booleans.
    pub fn to_bool(&self) -> bool {
        match *self {
            Scalar::Bool(v) => v,
            Scalar::Complex128(c) => c.re != 0.0 || c.im != 0.0,
            Scalar::Complex64(c) => c.re != 0.0 || c.im != 0.0,
            _ => self.to_f64() != 0.0,
        }
    }

    /// Convert to `dtype`.
    ///
    /// Integer conversions follow `as` semantics, complex to real keeps the
    /// real part, and `generic` keeps the value unchanged.
    pub fn cast(self, dtype: DType) -> Scalar {
        if dtype == DType::Generic || dtype == self.dtype() {
            return self;
        }
        match dtype {
            DType::Bool => Scalar::Bool(self.to_bool()),
            DType::Complex128 => Scalar::Complex128(self.to_complex()),
            DType::Complex64 => {
                let c = self.to_complex();
                Scalar::Complex64(Complex32::new(c.re as f32, c.im as f32))
            }
            _ => {
                if let Some(i) = self.as_i64() {
                    match dtype {
                        DType::Float64 => Scalar::Float64(i as f64),
                        DType::Float32 => Scalar::Float32(i as f32),
                        DType::Int32 => Scalar::Int32(i as i32),
                        DType::Int16 => Scalar::Int16(i as i16),
                        DType::Int8 => Scalar::Int8(i as i8),
                        DType::Uint32 => Scalar::Uint32(i as u32),
                        DType::Uint16 => Scalar::Uint16(i as u16),
                        _ => Scalar::Uint8(i as u8),
                    }
                } else {
                    let v = self.to_f64();
                    match dtype {
                        DType::Float64 => Scalar::Float64(v),
                        DType::Float32 => Scalar::Float32(v as f32),
                        DType::Int32 => Scalar::Int32(v as i32),
                        DType::Int16 => Scalar::Int16(v as i16),
                        DType::Int8 => Scalar::Int8(v as i8),
                        DType::Uint32 => Scalar::Uint32(v as u32),
                        DType::Uint16 => Scalar::Uint16(v as u16),
                        _ => Scalar::Uint8(v as u8),
                    }
                }
            }
        }
    }

    // Integer and boolean sources convert exactly through i64, so wrapping
    // between integer widths matches `as` on the original value.
    fn as_i64(&self) -> Option<i64> {
        match *self {
            Scalar::Int32(v) => Some(v as i64),
            Scalar::Int16(v) => Some(v as i64),
            Scalar::Int8(v) => Some(v as i64),
            Scalar::Uint32(v) => Some(v as i64),
            Scalar::Uint16(v) => Some(v as i64),
            Scalar::Uint8(v) => Some(v as i64),
            Scalar::Bool(v) => Some(v as i64),
            _ => None,
        }
    }
}

macro_rules! impl_scalar_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Scalar {
                #[inline]
                fn from(v: $t) -> Self {
                    Scalar::$variant(v)
                }
            }
        )*
    };
}

impl_scalar_from!(
    f64 => Float64,
    f32 => Float32,
    i32 => Int32,
    i16 => Int16,
    i8 => Int8,
    u32 => Uint32,
    u16 => Uint16,
    u8 => Uint8,
    bool => Bool,
    Complex64 => Complex128,
    Complex32 => Complex64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for d in DType::all() {
            assert_eq!(DType::from_code(d.code()).unwrap(), d);
        }
        assert!(DType::from_code(200).is_err());
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!("complex64".parse::<DType>().unwrap(), DType::Complex64);
        let err = "float16".parse::<DType>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Type);
    }

    #[test]
    fn test_named_sets() {
        assert_eq!(DType::real_floating_point(), vec![DType::Float64, DType::Float32]);
        assert!(!DType::numeric().contains(&DType::Bool));
        assert!(!DType::numeric().contains(&DType::Generic));
        assert_eq!(DType::integer().len(), 6);
    }

    #[test]
    fn test_cast_integer_wraps() {
        assert_eq!(Scalar::Int32(300).cast(DType::Uint8), Scalar::Uint8(44));
        assert_eq!(Scalar::Int8(-1).cast(DType::Uint16), Scalar::Uint16(u16::MAX));
        assert_eq!(Scalar::Float64(-2.7).cast(DType::Int32), Scalar::Int32(-2));
    }

    #[test]
    fn test_cast_complex() {
        let c = Scalar::Complex128(Complex64::new(1.5, -2.0));
        assert_eq!(c.cast(DType::Float64), Scalar::Float64(1.5));
        assert_eq!(c.cast(DType::Bool), Scalar::Bool(true));
        assert_eq!(
            Scalar::Int16(3).cast(DType::Complex64),
            Scalar::Complex64(Complex32::new(3.0, 0.0))
        );
    }

    #[test]
    fn test_cast_generic_is_identity() {
        let v = Scalar::Uint16(9);
        assert_eq!(v.cast(DType::Generic), v);
    }
}
