//! Subarray reduction engine for n-dimensional strided arrays.
//!
//! This crate reduces strided arrays along arbitrary subsets of dimensions,
//! producing either a scalar or a lower-rank array. It works uniformly over
//! storage that can be indexed directly (plain numeric buffers) and storage
//! that must go through accessor functions (interleaved complex pairs,
//! object-valued elements), and over any memory layout: row-major,
//! column-major, negative or mixed-sign strides, non-contiguous views.
//!
//! # Core Types
//!
//! - [`NdView`] / [`NdViewMut`]: non-owning array descriptors over a [`Buffer`]
//! - [`NdArray`]: owned array, hands out views
//! - [`DType`] / [`Scalar`]: runtime element type tags and values
//!
//! # Reduction
//!
//! - [`reduce_subarray`]: split dimensions into reduced ("core") and loop
//!   dimensions, then call a reduction kernel once per loop index
//! - [`unary_reduce_subarray`], [`binary_reduce_subarray`]: fixed-arity forms
//!
//! # Dispatch
//!
//! - [`BinaryStridedDispatch`]: selects a kernel per input dtype pair from a
//!   [`DispatchTable`], resolves the output dtype and input casting from
//!   [`Policies`], then drives the binary reduction
//!
//! # Example
//!
//! ```rust
//! use strided_reduce::{unary_reduce_subarray, NdArray, NdView, Order, ReduceConfig, Scalar};
//!
//! let x = NdArray::from_vec((1..=8).map(f64::from).collect(), &[2, 2, 2], Order::RowMajor).unwrap();
//! let mut out = NdArray::zeros(strided_reduce::DType::Float64, &[2, 2], Order::RowMajor);
//!
//! let sum = |views: &[NdView<'_>], _: &()| {
//!     let mut acc = 0.0;
//!     views[0].for_each(|v| acc += v.to_f64());
//!     Scalar::Float64(acc)
//! };
//! unary_reduce_subarray(sum, &x.view(), &mut out.view_mut(), &[], &[2], &(), &ReduceConfig::default())
//!     .unwrap();
//! assert_eq!(out.to_f64_vec(), vec![3.0, 7.0, 11.0, 15.0]);
//! ```
//!
//! # Cache Optimization
//!
//! Loop dimensions are ordered by stride magnitude so the smallest stride is
//! iterated innermost. When the operands disagree on traversal direction the
//! 2-D and 3-D loops are tiled into blocks fitting [`BLOCK_MEMORY_SIZE`].
//! Ranks beyond [`MAX_SPECIALIZED_RANK`] use a generic index-decomposition path.

mod access;
mod block;
mod buffer;
mod dispatch;
mod dtype;
mod kernel;
pub mod layout;
mod order;
mod policy;
mod reduce;
mod subarray;
mod view;

pub use access::{AccessorAccess, ElementAccess, RawAccess};
pub use buffer::{Buffer, RawElement};
pub use dispatch::{
    kernel, BinaryStridedDispatch, DispatchConfig, DispatchTable, Kernel, ReduceOptions,
};
pub use dtype::{DType, Scalar};
pub use layout::Order;
pub use order::{resolve_loop_order, LoopOrder};
pub use policy::{
    accumulation_dtype, promote_dtypes, resolve_casting_dtype, resolve_output_dtype,
    CastingPolicy, OutputPolicy, Policies,
};
pub use reduce::{
    binary_reduce_subarray, reduce_subarray, unary_reduce_subarray, ReduceConfig, Strategy,
};
pub use subarray::initialize_views;
pub use view::{NdArray, NdView, NdViewMut};

// ============================================================================
// Constants
// ============================================================================

/// Block memory size for tiled iteration (L1 cache target).
///
/// The blocked strategy shrinks tiles until their estimated working set fits
/// within this many bytes. Default: 32KB (typical L1 data cache size).
pub const BLOCK_MEMORY_SIZE: usize = 32 * 1024;

/// Cache line size in bytes.
///
/// Used for memory region estimates in block size computation.
pub const CACHE_LINE_SIZE: usize = 64;

/// Highest loop rank with specialized (nested or blocked) loop nests.
pub const MAX_SPECIALIZED_RANK: usize = 3;

/// Element width assumed for dtypes without a fixed byte size (`generic`).
pub const DEFAULT_ELEMENT_BYTES: usize = 8;

// ============================================================================
// Error types
// ============================================================================

/// Coarse classification of a [`ReduceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong kind of argument, unsupported dtype, unrecognized tag.
    Type,
    /// An index outside the valid range.
    Range,
    /// Structural mismatch: shapes, ranks, duplicate dimensions, counts.
    Structural,
}

/// Errors that can occur while building or running a reduction.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    /// Unrecognized dtype tag.
    #[error("unknown dtype: {0:?}")]
    UnknownDType(String),

    /// Unrecognized dtype enumeration code.
    #[error("unknown dtype code: {0}")]
    UnknownDTypeCode(u8),

    /// Unrecognized policy tag.
    #[error("unknown {kind} policy: {value:?}")]
    UnknownPolicy { kind: &'static str, value: String },

    /// Unrecognized memory order tag.
    #[error("unknown order: {0:?}")]
    UnknownOrder(String),

    /// A declared supported dtype set is empty.
    #[error("supported dtype set for argument {position} is empty")]
    EmptyDTypeSet { position: usize },

    /// Fewer than two input dtype sets were declared.
    #[error("expected at least 2 input dtype sets, found {0}")]
    MissingInputDTypes(usize),

    /// Dispatch table type list does not describe two codes per kernel.
    #[error("dispatch table has {types} type codes for {kernels} kernels (expected 2 per kernel)")]
    TypeKernelCountMismatch { types: usize, kernels: usize },

    /// Operand dtype is not in the declared supported set.
    #[error("argument {position} has unsupported dtype {dtype}")]
    UnsupportedDType { position: usize, dtype: crate::DType },

    /// Resolved output dtype is not in the declared supported set.
    #[error("unsupported output dtype {0}")]
    UnsupportedOutputDType(crate::DType),

    /// Number of ancillary operands differs from the declared count.
    #[error("expected {expected} ancillary arrays, found {found}")]
    AncillaryCountMismatch { expected: usize, found: usize },

    /// A reduction dimension is out of bounds.
    #[error("invalid dimension {dim} for rank {rank}")]
    DimOutOfBounds { dim: isize, rank: usize },

    /// A reduction dimension was listed twice.
    #[error("duplicate reduction dimension {0}")]
    DuplicateDim(usize),

    /// Array ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Array shapes are incompatible for the operation.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Ancillary operand rank differs from the number of loop dimensions.
    #[error("ancillary array {index} has rank {found}, expected {expected}")]
    AncillaryRank {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// Ancillary operand loop sizes differ from the input's.
    #[error("ancillary array {index} has shape {found:?}, expected {expected:?}")]
    AncillaryShape {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Stride array length doesn't match dimensions.
    #[error("stride and dims length mismatch")]
    StrideLengthMismatch,

    /// Data length doesn't match the shape.
    #[error("data length {len} does not match shape {shape:?}")]
    DataLengthMismatch { len: usize, shape: Vec<usize> },

    /// A view would reach outside its buffer, or offset arithmetic overflowed.
    #[error("offset out of bounds while computing element position")]
    OffsetOverflow,

    /// Reduction needs at least one primary input.
    #[error("reduction requires at least one input array")]
    NoInputs,
}

impl ReduceError {
    /// Classify the error the way callers of the reduction engine branch on it.
    pub fn kind(&self) -> ErrorKind {
        use ReduceError::*;
        match self {
            UnknownDType(_)
            | UnknownDTypeCode(_)
            | UnknownPolicy { .. }
            | UnknownOrder(_)
            | EmptyDTypeSet { .. }
            | MissingInputDTypes(_)
            | UnsupportedDType { .. }
            | UnsupportedOutputDType(_)
            | NoInputs => ErrorKind::Type,
            DimOutOfBounds { .. } | OffsetOverflow => ErrorKind::Range,
            TypeKernelCountMismatch { .. }
            | AncillaryCountMismatch { .. }
            | DuplicateDim(_)
            | RankMismatch(..)
            | ShapeMismatch(..)
            | AncillaryRank { .. }
            | AncillaryShape { .. }
            | StrideLengthMismatch
            | DataLengthMismatch { .. } => ErrorKind::Structural,
        }
    }
}

/// Result type for reduction operations.
pub type Result<T> = std::result::Result<T, ReduceError>;
