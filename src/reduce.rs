//! Subarray reduction driver.
//!
//! The input's dimensions are split into core dimensions, which the kernel
//! reduces, and loop dimensions, which index the output. The driver walks the
//! loop dimensions with the cheapest applicable strategy and stores one kernel
//! result per loop index.

use std::sync::Arc;

use crate::access::{with_element_access, ElementAccess};
use crate::block::compute_block_sizes;
use crate::dtype::Scalar;
use crate::kernel::{for_each_blocked, for_each_generic, for_each_linear, for_each_nested};
use crate::layout::{iteration_order, loop_dims, normalize_dims, numel, take};
use crate::order::resolve_loop_order;
use crate::subarray::{core_view, initialize_views};
use crate::view::{NdView, NdViewMut};
use crate::{ReduceError, Result, BLOCK_MEMORY_SIZE, DEFAULT_ELEMENT_BYTES, MAX_SPECIALIZED_RANK};

/// Loop strategy over the loop dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Pick by loop rank and stride directions.
    #[default]
    Auto,
    /// Single loop; applies when at most one loop dimension is larger than 1.
    Linear,
    /// Plain nested loops; applies to 2 or 3 loop dimensions.
    Nested,
    /// Tiled nested loops; applies to 2 or 3 loop dimensions.
    Blocked,
    /// Flat index decomposition; applies to any loop rank.
    Generic,
}

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceConfig {
    /// Requested strategy. A strategy that does not apply to the loop rank
    /// falls back to [`Strategy::Auto`].
    pub strategy: Strategy,
    /// Tile working-set target in bytes for [`Strategy::Blocked`].
    pub block_memory: usize,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            block_memory: BLOCK_MEMORY_SIZE,
        }
    }
}

impl ReduceConfig {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_block_memory(mut self, bytes: usize) -> Self {
        self.block_memory = bytes.max(1);
        self
    }
}

/// Reduce `inputs` over `dims`, writing one value per loop index into `output`.
///
/// `inputs` are the primary operands (one for a unary reduction, two for a
/// binary one); they must share a shape. `output` and every `ancillary` array
/// must have exactly the loop dimensions of the inputs. For each loop index the
/// kernel receives one core-dimension view per input followed by one zero-rank
/// view per ancillary array, and its result is converted to the output dtype.
///
/// All validation happens before the first write; zero-sized loop or core
/// dimensions make the call a no-op.
pub fn reduce_subarray<'a, O, F>(
    kernel: F,
    inputs: &[NdView<'a>],
    output: &mut NdViewMut<'_>,
    ancillary: &[NdView<'a>],
    dims: &[isize],
    options: &O,
    config: &ReduceConfig,
) -> Result<()>
where
    F: FnMut(&[NdView<'a>], &O) -> Scalar,
{
    let x = inputs.first().ok_or(ReduceError::NoInputs)?;
    let rank = x.ndim();
    let core = normalize_dims(dims, rank)?;
    for other in &inputs[1..] {
        if other.ndim() != rank {
            return Err(ReduceError::RankMismatch(rank, other.ndim()));
        }
        if other.shape() != x.shape() {
            return Err(ReduceError::ShapeMismatch(
                x.shape().to_vec(),
                other.shape().to_vec(),
            ));
        }
    }

    let loops = loop_dims(&core, rank);
    let k = loops.len();
    if output.ndim() != k {
        return Err(ReduceError::RankMismatch(output.ndim(), k));
    }
    for (index, arr) in ancillary.iter().enumerate() {
        if arr.ndim() != k {
            return Err(ReduceError::AncillaryRank {
                index,
                expected: k,
                found: arr.ndim(),
            });
        }
    }

    let loop_shape = take(x.shape(), &loops);
    if output.shape() != loop_shape.as_slice() {
        return Err(ReduceError::ShapeMismatch(
            output.shape().to_vec(),
            loop_shape,
        ));
    }
    for (index, arr) in ancillary.iter().enumerate() {
        if arr.shape() != loop_shape.as_slice() {
            return Err(ReduceError::AncillaryShape {
                index,
                expected: loop_shape,
                found: arr.shape().to_vec(),
            });
        }
    }

    let core_shape: Arc<[usize]> = Arc::from(take(x.shape(), &core));
    if numel(&loop_shape) == 0 || numel(&core_shape) == 0 {
        tracing::debug!(?loop_shape, ?core_shape, "empty reduction, nothing to do");
        return Ok(());
    }

    // Co-iterated arrays: inputs, then the output, then ancillary arrays.
    let nin = inputs.len();
    let mut loop_strides: Vec<Vec<isize>> = Vec::with_capacity(nin + 1 + ancillary.len());
    let mut bases: Vec<isize> = Vec::with_capacity(nin + 1 + ancillary.len());
    for inp in inputs {
        loop_strides.push(take(inp.strides(), &loops));
        bases.push(inp.offset() as isize);
    }
    loop_strides.push(output.strides().to_vec());
    bases.push(output.offset() as isize);
    for arr in ancillary {
        loop_strides.push(arr.strides().to_vec());
        bases.push(arr.offset() as isize);
    }

    let use_accessors = inputs.iter().any(NdView::uses_accessors)
        || output.uses_accessors()
        || ancillary.iter().any(NdView::uses_accessors);

    let elem_size = inputs
        .iter()
        .map(NdView::dtype)
        .chain(std::iter::once(output.dtype()))
        .chain(ancillary.iter().map(NdView::dtype))
        .map(|d| d.bytes_per_element().unwrap_or(DEFAULT_ELEMENT_BYTES))
        .max()
        .unwrap_or(DEFAULT_ELEMENT_BYTES);

    let plan = plan_loops(&loop_shape, &loop_strides, nin, elem_size, config);
    tracing::debug!(
        strategy = plan.name(),
        loop_rank = k,
        core_rank = core.len(),
        accessors = use_accessors,
        "subarray reduction"
    );

    let mut views = Vec::with_capacity(nin + ancillary.len());
    for inp in inputs {
        views.push(core_view(inp, &core_shape, take(inp.strides(), &core)));
    }
    initialize_views(ancillary, &mut views);

    let mut visitor = Visitor {
        views,
        nin,
        kernel,
        options,
    };
    with_element_access!(output.buffer_mut(), use_accessors, |acc| {
        execute(&plan, &bases, &mut visitor, acc)
    });
    Ok(())
}

/// [`reduce_subarray`] with a single primary input.
pub fn unary_reduce_subarray<'a, O, F>(
    kernel: F,
    x: &NdView<'a>,
    output: &mut NdViewMut<'_>,
    ancillary: &[NdView<'a>],
    dims: &[isize],
    options: &O,
    config: &ReduceConfig,
) -> Result<()>
where
    F: FnMut(&[NdView<'a>], &O) -> Scalar,
{
    reduce_subarray(
        kernel,
        std::slice::from_ref(x),
        output,
        ancillary,
        dims,
        options,
        config,
    )
}

/// [`reduce_subarray`] with two primary inputs of identical shape.
#[allow(clippy::too_many_arguments)]
pub fn binary_reduce_subarray<'a, O, F>(
    kernel: F,
    x: &NdView<'a>,
    y: &NdView<'a>,
    output: &mut NdViewMut<'_>,
    ancillary: &[NdView<'a>],
    dims: &[isize],
    options: &O,
    config: &ReduceConfig,
) -> Result<()>
where
    F: FnMut(&[NdView<'a>], &O) -> Scalar,
{
    let inputs = [x.clone(), y.clone()];
    reduce_subarray(kernel, &inputs, output, ancillary, dims, options, config)
}

// ============================================================================
// Planning
// ============================================================================

#[derive(Debug)]
enum Plan {
    /// No loop dimensions: one kernel call.
    Single,
    Linear {
        len: usize,
        strides: Vec<isize>,
    },
    Nested {
        shape: Vec<usize>,
        strides: Vec<Vec<isize>>,
    },
    Blocked {
        shape: Vec<usize>,
        blocks: Vec<usize>,
        strides: Vec<Vec<isize>>,
    },
    Generic {
        shape: Vec<usize>,
        strides: Vec<Vec<isize>>,
    },
}

impl Plan {
    fn name(&self) -> &'static str {
        match self {
            Plan::Single => "single",
            Plan::Linear { .. } => "linear",
            Plan::Nested { .. } => "nested",
            Plan::Blocked { .. } => "blocked",
            Plan::Generic { .. } => "generic",
        }
    }
}

/// Strategy after resolving `Auto` and inapplicable requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Linear,
    Nested,
    Blocked,
    Generic,
}

/// `loop_strides[nin]` belongs to the output.
fn plan_loops(
    loop_shape: &[usize],
    loop_strides: &[Vec<isize>],
    nin: usize,
    elem_size: usize,
    config: &ReduceConfig,
) -> Plan {
    if loop_shape.is_empty() {
        return Plan::Single;
    }

    // Size-1 loop dimensions never move an offset.
    let active: Vec<usize> = (0..loop_shape.len())
        .filter(|&d| loop_shape[d] != 1)
        .collect();
    let shape = take(loop_shape, &active);
    let strides: Vec<Vec<isize>> = loop_strides.iter().map(|s| take(s, &active)).collect();
    let eff_rank = shape.len();

    let specialized = (2..=MAX_SPECIALIZED_RANK).contains(&eff_rank);
    let walk = match config.strategy {
        Strategy::Linear if eff_rank <= 1 => Walk::Linear,
        Strategy::Nested if specialized => Walk::Nested,
        Strategy::Blocked if specialized => Walk::Blocked,
        Strategy::Generic => Walk::Generic,
        _ => {
            if eff_rank <= 1 {
                Walk::Linear
            } else if specialized {
                if consistent_direction(&strides[..=nin]) {
                    Walk::Nested
                } else {
                    Walk::Blocked
                }
            } else {
                Walk::Generic
            }
        }
    };

    match walk {
        Walk::Linear => {
            let (len, strides) = match eff_rank {
                0 => (1, vec![0; strides.len()]),
                _ => (shape[0], strides.iter().map(|s| s[0]).collect()),
            };
            Plan::Linear { len, strides }
        }
        Walk::Generic => Plan::Generic { shape, strides },
        Walk::Nested | Walk::Blocked => {
            let refs: Vec<&[isize]> = strides.iter().map(Vec::as_slice).collect();
            let order = resolve_loop_order(&shape, &refs, Some(nin));
            if walk == Walk::Nested {
                Plan::Nested {
                    shape: order.shape,
                    strides: order.strides,
                }
            } else {
                let ordered: Vec<&[isize]> = order.strides.iter().map(Vec::as_slice).collect();
                let blocks =
                    compute_block_sizes(&order.shape, &ordered, elem_size, config.block_memory);
                Plan::Blocked {
                    shape: order.shape,
                    blocks,
                    strides: order.strides,
                }
            }
        }
    }
}

/// Inputs and output all traverse their loop dimensions in the same direction.
fn consistent_direction(strides: &[Vec<isize>]) -> bool {
    let mut dirs = strides.iter().map(|s| iteration_order(s));
    match dirs.next() {
        Some(first) if first != 0 => dirs.all(|d| d == first),
        _ => false,
    }
}

// ============================================================================
// Execution
// ============================================================================

struct Visitor<'a, 'o, O, F> {
    views: Vec<NdView<'a>>,
    nin: usize,
    kernel: F,
    options: &'o O,
}

impl<'a, O, F> Visitor<'a, '_, O, F>
where
    F: FnMut(&[NdView<'a>], &O) -> Scalar,
{
    #[inline]
    fn visit<A: ElementAccess>(&mut self, out: &mut A, offsets: &[isize]) {
        let nin = self.nin;
        for (i, view) in self.views.iter_mut().enumerate() {
            let j = if i < nin { i } else { i + 1 };
            view.set_offset(offsets[j] as usize);
        }
        let value = (self.kernel)(&self.views, self.options);
        out.set(offsets[nin] as usize, value);
    }
}

fn execute<'a, O, F, A>(plan: &Plan, bases: &[isize], visitor: &mut Visitor<'a, '_, O, F>, out: &mut A)
where
    F: FnMut(&[NdView<'a>], &O) -> Scalar,
    A: ElementAccess,
{
    let mut step = |offsets: &[isize]| visitor.visit(out, offsets);
    match plan {
        Plan::Single => step(bases),
        Plan::Linear { len, strides } => for_each_linear(*len, strides, bases, &mut step),
        Plan::Nested { shape, strides } => for_each_nested(shape, strides, bases, &mut step),
        Plan::Blocked {
            shape,
            blocks,
            strides,
        } => for_each_blocked(shape, blocks, strides, bases, &mut step),
        Plan::Generic { shape, strides } => {
            let refs: Vec<&[isize]> = strides.iter().map(Vec::as_slice).collect();
            let starts: Vec<usize> = bases.iter().map(|&b| b as usize).collect();
            for_each_generic(shape, &refs, &starts, &mut step)
        }
    }
}
