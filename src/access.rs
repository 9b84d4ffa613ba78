//! Element access protocols used by the reduction driver.
//!
//! The driver is generic over [`ElementAccess`]: one instantiation indexes a
//! typed slice directly, the other goes through the buffer's accessor
//! functions. The protocol is chosen once per call, never per element.

use crate::buffer::{Buffer, RawElement};
use crate::dtype::Scalar;

/// Indexed read/write of the elements of one buffer.
pub trait ElementAccess {
    fn get(&self, index: usize) -> Scalar;
    fn set(&mut self, index: usize, value: Scalar);
}

/// Direct indexed access into a typed slice.
pub struct RawAccess<'a, T> {
    data: &'a mut [T],
}

impl<'a, T: RawElement> RawAccess<'a, T> {
    #[inline]
    pub fn new(data: &'a mut [T]) -> Self {
        Self { data }
    }
}

impl<T: RawElement> ElementAccess for RawAccess<'_, T> {
    #[inline]
    fn get(&self, index: usize) -> Scalar {
        self.data[index].to_scalar()
    }

    #[inline]
    fn set(&mut self, index: usize, value: Scalar) {
        self.data[index] = T::from_scalar(value);
    }
}

/// Access through the buffer's get/set accessor functions.
pub struct AccessorAccess<'a> {
    buf: &'a mut Buffer,
}

impl<'a> AccessorAccess<'a> {
    #[inline]
    pub fn new(buf: &'a mut Buffer) -> Self {
        Self { buf }
    }
}

impl ElementAccess for AccessorAccess<'_> {
    #[inline]
    fn get(&self, index: usize) -> Scalar {
        self.buf.get(index)
    }

    #[inline]
    fn set(&mut self, index: usize, value: Scalar) {
        self.buf.set(index, value);
    }
}

/// Run `f` with the raw protocol when the buffer is directly indexable and
/// `use_accessors` is false, otherwise with the accessor protocol.
macro_rules! with_element_access {
    ($buf:expr, $use_accessors:expr, |$acc:ident| $body:expr) => {{
        let buf: &mut $crate::buffer::Buffer = $buf;
        if $use_accessors {
            let $acc = &mut $crate::access::AccessorAccess::new(buf);
            $body
        } else {
            match buf {
                $crate::buffer::Buffer::Float64(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Float32(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Int32(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Int16(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Int8(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Uint32(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Uint16(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Uint8(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                $crate::buffer::Buffer::Bool(v) => {
                    let $acc = &mut $crate::access::RawAccess::new(v.as_mut_slice());
                    $body
                }
                other => {
                    let $acc = &mut $crate::access::AccessorAccess::new(other);
                    $body
                }
            }
        }
    }};
}

pub(crate) use with_element_access;
