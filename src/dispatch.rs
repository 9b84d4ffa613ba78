//! Binary strided-reduction dispatcher.
//!
//! [`BinaryStridedDispatch`] validates operand dtypes and shapes, resolves the
//! output dtype and input casts from its [`Policies`], picks a kernel for the
//! (possibly cast) input dtype pair and hands everything to
//! [`binary_reduce_subarray`](crate::binary_reduce_subarray).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::dtype::{DType, Scalar};
use crate::layout::{loop_dims, normalize_dims, take, Order};
use crate::policy::{resolve_casting_dtype, resolve_output_dtype, Policies};
use crate::reduce::{binary_reduce_subarray, ReduceConfig};
use crate::view::{NdArray, NdView, NdViewMut};
use crate::{ReduceError, Result};

/// A reduction kernel: core-dimension views of both inputs followed by one
/// zero-rank view per ancillary operand, plus the call options.
pub type Kernel = Arc<dyn Fn(&[NdView<'_>], &ReduceOptions) -> Scalar + Send + Sync>;

/// Box a closure as a [`Kernel`].
pub fn kernel<F>(f: F) -> Kernel
where
    F: Fn(&[NdView<'_>], &ReduceOptions) -> Scalar + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Kernels keyed by input dtype pair, with a mandatory fallback.
#[derive(Clone)]
pub struct DispatchTable {
    default: Kernel,
    entries: BTreeMap<(u8, u8), Kernel>,
}

impl DispatchTable {
    pub fn new(default: Kernel) -> Self {
        Self {
            default,
            entries: BTreeMap::new(),
        }
    }

    /// Build a table from a flat type list holding two dtypes per kernel.
    pub fn from_parts(default: Kernel, types: &[DType], fcns: Vec<Kernel>) -> Result<Self> {
        if types.len() != 2 * fcns.len() {
            return Err(ReduceError::TypeKernelCountMismatch {
                types: types.len(),
                kernels: fcns.len(),
            });
        }
        Ok(types
            .chunks_exact(2)
            .zip(fcns)
            .fold(Self::new(default), |table, (pair, f)| {
                table.with_entry(pair[0], pair[1], f)
            }))
    }

    /// Register `kernel` for the exact pair `(x, y)`. An existing entry for the
    /// same pair is kept.
    pub fn with_entry(mut self, x: DType, y: DType, kernel: Kernel) -> Self {
        self.entries.entry((x.code(), y.code())).or_insert(kernel);
        self
    }

    /// Exact-match kernel for `(x, y)`, if any.
    pub fn get(&self, x: DType, y: DType) -> Option<&Kernel> {
        self.entries.get(&(x.code(), y.code()))
    }

    /// Kernel for `(x, y)`, falling back to the default. The flag is true when
    /// the default was used.
    pub fn resolve(&self, x: DType, y: DType) -> (&Kernel, bool) {
        match self.get(x, y) {
            Some(k) => (k, false),
            None => (&self.default, true),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<(DType, DType)> = self
            .entries
            .keys()
            .filter_map(|&(x, y)| Some((DType::from_code(x).ok()?, DType::from_code(y).ok()?)))
            .collect();
        f.debug_struct("DispatchTable")
            .field("entries", &pairs)
            .finish_non_exhaustive()
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceOptions {
    /// Dimensions to reduce; `None` reduces all of them.
    pub dims: Option<Vec<isize>>,
    /// Keep reduced dimensions as size-1 axes (`apply` only).
    pub keepdims: bool,
    /// Output dtype override (`apply` only).
    pub dtype: Option<DType>,
}

impl ReduceOptions {
    pub fn with_dims(mut self, dims: impl Into<Vec<isize>>) -> Self {
        self.dims = Some(dims.into());
        self
    }

    pub fn with_keepdims(mut self, keepdims: bool) -> Self {
        self.keepdims = keepdims;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Memory order of outputs allocated by `apply`; `None` follows the first input.
    pub order: Option<Order>,
    /// Dtype used by the `default` output policy and as fallback for the
    /// category policies.
    pub default_dtype: DType,
    pub reduce: ReduceConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            order: None,
            default_dtype: DType::Float64,
            reduce: ReduceConfig::default(),
        }
    }
}

impl DispatchConfig {
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_default_dtype(mut self, dtype: DType) -> Self {
        self.default_dtype = dtype;
        self
    }

    pub fn with_reduce(mut self, reduce: ReduceConfig) -> Self {
        self.reduce = reduce;
        self
    }
}

/// Reduction over two strided inputs with per-dtype kernel dispatch.
#[derive(Debug, Clone)]
pub struct BinaryStridedDispatch {
    table: DispatchTable,
    idtypes: Vec<Vec<DType>>,
    odtypes: Vec<DType>,
    policies: Policies,
    config: DispatchConfig,
}

impl BinaryStridedDispatch {
    /// `idtypes` holds one supported dtype set per positional array: the two
    /// primary inputs first, then one per ancillary operand.
    pub fn new(
        table: DispatchTable,
        idtypes: Vec<Vec<DType>>,
        odtypes: Vec<DType>,
        policies: Policies,
    ) -> Result<Self> {
        Self::with_config(table, idtypes, odtypes, policies, DispatchConfig::default())
    }

    pub fn with_config(
        table: DispatchTable,
        idtypes: Vec<Vec<DType>>,
        odtypes: Vec<DType>,
        policies: Policies,
        config: DispatchConfig,
    ) -> Result<Self> {
        if idtypes.len() < 2 {
            return Err(ReduceError::MissingInputDTypes(idtypes.len()));
        }
        if let Some(position) = idtypes.iter().position(Vec::is_empty) {
            return Err(ReduceError::EmptyDTypeSet { position });
        }
        if odtypes.is_empty() {
            return Err(ReduceError::EmptyDTypeSet {
                position: idtypes.len(),
            });
        }
        Ok(Self {
            table,
            idtypes,
            odtypes,
            policies,
            config,
        })
    }

    pub fn policies(&self) -> Policies {
        self.policies
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Number of ancillary operands each call must supply.
    pub fn ancillary_count(&self) -> usize {
        self.idtypes.len() - 2
    }

    /// Reduce `x` and `y` into a newly allocated array.
    ///
    /// The result has the non-reduced dimensions of the inputs (or all
    /// dimensions with reduced ones set to 1 when `keepdims` is set), the
    /// dtype from `options.dtype` or the output policy, and the configured
    /// order.
    pub fn apply(
        &self,
        x: &NdView<'_>,
        y: &NdView<'_>,
        ancillary: &[NdView<'_>],
        options: &ReduceOptions,
    ) -> Result<NdArray> {
        self.validate(x, y, ancillary)?;
        let dims = resolve_dims(options, x.ndim());
        let core = normalize_dims(&dims, x.ndim())?;
        let loops = loop_dims(&core, x.ndim());

        let dtype = options.dtype.unwrap_or_else(|| {
            resolve_output_dtype(
                self.policies.output,
                x.dtype(),
                y.dtype(),
                self.config.default_dtype,
            )
        });
        self.check_output_dtype(dtype)?;

        let order = self.config.order.unwrap_or(x.order());
        let mut out = NdArray::zeros(dtype, &take(x.shape(), &loops), order);
        self.run(x, y, ancillary, &dims, &mut out.view_mut(), options)?;

        if options.keepdims {
            out = out.spread_dimensions(x.ndim(), &core)?;
        }
        Ok(out)
    }

    /// Reduce `x` and `y` into `out`, whose dtype is used as is.
    pub fn assign(
        &self,
        x: &NdView<'_>,
        y: &NdView<'_>,
        ancillary: &[NdView<'_>],
        out: &mut NdViewMut<'_>,
        options: &ReduceOptions,
    ) -> Result<()> {
        self.validate(x, y, ancillary)?;
        self.check_output_dtype(out.dtype())?;
        let dims = resolve_dims(options, x.ndim());
        self.run(x, y, ancillary, &dims, out, options)
    }

    fn validate(&self, x: &NdView<'_>, y: &NdView<'_>, ancillary: &[NdView<'_>]) -> Result<()> {
        let expected = self.ancillary_count();
        if ancillary.len() != expected {
            return Err(ReduceError::AncillaryCountMismatch {
                expected,
                found: ancillary.len(),
            });
        }
        let operands = [x, y].into_iter().chain(ancillary);
        for (position, (arr, supported)) in operands.zip(&self.idtypes).enumerate() {
            if !supported.contains(&arr.dtype()) {
                return Err(ReduceError::UnsupportedDType {
                    position,
                    dtype: arr.dtype(),
                });
            }
        }
        if x.ndim() != y.ndim() {
            return Err(ReduceError::RankMismatch(x.ndim(), y.ndim()));
        }
        if x.shape() != y.shape() {
            return Err(ReduceError::ShapeMismatch(
                x.shape().to_vec(),
                y.shape().to_vec(),
            ));
        }
        Ok(())
    }

    fn check_output_dtype(&self, dtype: DType) -> Result<()> {
        if self.odtypes.contains(&dtype) {
            Ok(())
        } else {
            Err(ReduceError::UnsupportedOutputDType(dtype))
        }
    }

    fn run(
        &self,
        x: &NdView<'_>,
        y: &NdView<'_>,
        ancillary: &[NdView<'_>],
        dims: &[isize],
        out: &mut NdViewMut<'_>,
        options: &ReduceOptions,
    ) -> Result<()> {
        let casting = self.policies.casting;
        let xt = resolve_casting_dtype(casting, x.dtype(), y.dtype(), out.dtype());
        let yt = resolve_casting_dtype(casting, y.dtype(), x.dtype(), out.dtype());
        let xc = cast_operand(x, xt, 0);
        let yc = cast_operand(y, yt, 1);
        let xv = substitute(x, xc.as_ref());
        let yv = substitute(y, yc.as_ref());

        let (kernel, fallback) = self.table.resolve(xv.dtype(), yv.dtype());
        tracing::debug!(
            x = %xv.dtype(),
            y = %yv.dtype(),
            out = %out.dtype(),
            fallback,
            "resolved reduction kernel"
        );
        binary_reduce_subarray(
            &**kernel,
            &xv,
            &yv,
            out,
            ancillary,
            dims,
            options,
            &self.config.reduce,
        )
    }
}

fn resolve_dims(options: &ReduceOptions, rank: usize) -> Vec<isize> {
    match &options.dims {
        Some(dims) => dims.clone(),
        None => (0..rank as isize).collect(),
    }
}

/// View the kernel sees for `view`: the cast temporary if there is one,
/// keeping the caller's accessor request.
fn substitute<'a>(view: &NdView<'a>, cast: Option<&'a NdArray>) -> NdView<'a> {
    match cast {
        Some(arr) if view.uses_accessors() => arr.view().with_accessors(),
        Some(arr) => arr.view(),
        None => view.clone(),
    }
}

/// Contiguous copy of `view` in `dtype`, or `None` when no cast is needed.
fn cast_operand(view: &NdView<'_>, dtype: DType, position: usize) -> Option<NdArray> {
    if view.dtype() == dtype {
        return None;
    }
    tracing::debug!(position, from = %view.dtype(), to = %dtype, "casting operand");
    Some(view.cast_to(dtype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CastingPolicy, OutputPolicy};
    use crate::ErrorKind;

    fn dot() -> Kernel {
        kernel(|views, _| {
            let (x, y) = (views[0].to_scalars(), views[1].to_scalars());
            let sum: f64 = x.iter().zip(&y).map(|(a, b)| a.to_f64() * b.to_f64()).sum();
            Scalar::Float64(sum)
        })
    }

    fn constant(v: f64) -> Kernel {
        kernel(move |_, _| Scalar::Float64(v))
    }

    fn dispatcher(table: DispatchTable, ancillary: usize) -> BinaryStridedDispatch {
        let mut idtypes = vec![DType::real(), DType::real()];
        idtypes.extend(std::iter::repeat(DType::all()).take(ancillary));
        BinaryStridedDispatch::new(
            table,
            idtypes,
            DType::all(),
            Policies::new(OutputPolicy::Promoted, CastingPolicy::None),
        )
        .unwrap()
    }

    #[test]
    fn test_table_first_entry_wins() {
        let table = DispatchTable::from_parts(
            constant(0.0),
            &[DType::Float64, DType::Float64, DType::Float64, DType::Float64],
            vec![constant(1.0), constant(2.0)],
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        let k = table.get(DType::Float64, DType::Float64).unwrap();
        assert_eq!(k(&[], &ReduceOptions::default()), Scalar::Float64(1.0));
        assert!(table.resolve(DType::Int8, DType::Float64).1);
    }

    #[test]
    fn test_table_count_mismatch() {
        let err = DispatchTable::from_parts(constant(0.0), &[DType::Float64], vec![constant(1.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            ReduceError::TypeKernelCountMismatch { types: 1, kernels: 1 }
        ));
    }

    #[test]
    fn test_construction_validation() {
        let p = Policies::default();
        let err = BinaryStridedDispatch::new(DispatchTable::new(dot()), vec![DType::all()], DType::all(), p)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        let err = BinaryStridedDispatch::new(
            DispatchTable::new(dot()),
            vec![DType::all(), vec![]],
            DType::all(),
            p,
        )
        .unwrap_err();
        assert!(matches!(err, ReduceError::EmptyDTypeSet { position: 1 }));
    }

    #[test]
    fn test_apply_dot_rows() {
        let d = dispatcher(DispatchTable::new(dot()), 0);
        let x = NdArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], Order::RowMajor).unwrap();
        let y = NdArray::from_vec(vec![1.0f64; 6], &[2, 3], Order::RowMajor).unwrap();
        let opts = ReduceOptions::default().with_dims(vec![-1]);
        let out = d.apply(&x.view(), &y.view(), &[], &opts).unwrap();
        assert_eq!(out.shape(), &[2]);
        assert_eq!(out.to_f64_vec(), vec![6.0, 15.0]);

        let full = d.apply(&x.view(), &y.view(), &[], &ReduceOptions::default()).unwrap();
        assert_eq!(full.shape(), &[] as &[usize]);
        assert_eq!(full.to_f64_vec(), vec![21.0]);
    }

    #[test]
    fn test_unsupported_input_dtype() {
        let d = dispatcher(DispatchTable::new(dot()), 0);
        let x = NdArray::zeros(DType::Complex128, &[2], Order::RowMajor);
        let y = NdArray::zeros(DType::Float64, &[2], Order::RowMajor);
        let err = d.apply(&x.view(), &y.view(), &[], &ReduceOptions::default()).unwrap_err();
        assert!(matches!(err, ReduceError::UnsupportedDType { position: 0, .. }));
    }

    #[test]
    fn test_ancillary_count_enforced() {
        let d = dispatcher(DispatchTable::new(dot()), 1);
        let x = NdArray::zeros(DType::Float64, &[2, 2], Order::RowMajor);
        let err = d.apply(&x.view(), &x.view(), &[], &ReduceOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ReduceError::AncillaryCountMismatch { expected: 1, found: 0 }
        ));
    }

    #[test]
    fn test_assign_rejects_unsupported_output() {
        let d = BinaryStridedDispatch::new(
            DispatchTable::new(dot()),
            vec![DType::all(), DType::all()],
            vec![DType::Float64],
            Policies::default(),
        )
        .unwrap();
        let x = NdArray::zeros(DType::Float64, &[2, 2], Order::RowMajor);
        let mut out = NdArray::zeros(DType::Int8, &[2], Order::RowMajor);
        let opts = ReduceOptions::default().with_dims(vec![1]);
        let err = d
            .assign(&x.view(), &x.view(), &[], &mut out.view_mut(), &opts)
            .unwrap_err();
        assert!(matches!(err, ReduceError::UnsupportedOutputDType(DType::Int8)));
    }

    #[test]
    fn test_configured_order() {
        let config = DispatchConfig::default().with_order(Order::ColumnMajor);
        let d = BinaryStridedDispatch::with_config(
            DispatchTable::new(dot()),
            vec![DType::all(), DType::all()],
            DType::all(),
            Policies::default(),
            config,
        )
        .unwrap();
        let x = NdArray::from_vec(vec![1.0f64; 24], &[2, 3, 4], Order::RowMajor).unwrap();
        let out = d
            .apply(&x.view(), &x.view(), &[], &ReduceOptions::default().with_dims(vec![0]))
            .unwrap();
        assert_eq!(out.order(), Order::ColumnMajor);
        assert_eq!(out.strides(), &[1, 3]);
        assert_eq!(out.to_f64_vec(), vec![2.0; 12]);
    }
}
