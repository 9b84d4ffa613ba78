use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use strided_reduce::layout::{numel, shape_to_strides};
use strided_reduce::{
    binary_reduce_subarray, reduce_subarray, unary_reduce_subarray, Buffer, DType, NdArray, NdView, NdViewMut, Order,
    ReduceConfig, ReduceError, Scalar, Strategy,
};

const STRATEGIES: [Strategy; 5] = [
    Strategy::Auto,
    Strategy::Linear,
    Strategy::Nested,
    Strategy::Blocked,
    Strategy::Generic,
];

fn sum(views: &[NdView<'_>], _: &()) -> Scalar {
    let mut acc = 0.0;
    views[0].for_each(|v| acc += v.to_f64());
    Scalar::Float64(acc)
}

/// Sum of the core elements plus ten times the ancillary element.
fn sum_plus_ancillary(views: &[NdView<'_>], _: &()) -> Scalar {
    let mut acc = 0.0;
    views[0].for_each(|v| acc += v.to_f64());
    Scalar::Float64(acc + 10.0 * views[1].get(&[]).to_f64())
}

/// All multi-indices of `shape` in row-major order.
fn indices(shape: &[usize]) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if numel(shape) == 0 {
        return out;
    }
    let mut idx = vec![0; shape.len()];
    loop {
        out.push(idx.clone());
        let mut d = shape.len();
        loop {
            if d == 0 {
                return out;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < shape[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

/// Merge loop and core indices back into a full index.
fn merge(loop_idx: &[usize], core_idx: &[usize], core: &[usize]) -> Vec<usize> {
    let rank = loop_idx.len() + core_idx.len();
    let (mut li, mut ci) = (0, 0);
    (0..rank)
        .map(|d| {
            if core.contains(&d) {
                ci += 1;
                core_idx[ci - 1]
            } else {
                li += 1;
                loop_idx[li - 1]
            }
        })
        .collect()
}

/// Strides for `shape` with random spacing and randomly flipped dimensions.
fn random_layout(rng: &mut StdRng, shape: &[usize], order: Order) -> (Vec<isize>, usize, usize) {
    let spacing: isize = if rng.gen_bool(0.3) { 2 } else { 1 };
    let mut strides: Vec<isize> = shape_to_strides(shape, order)
        .into_iter()
        .map(|s| s * spacing)
        .collect();
    let mut offset = 0usize;
    for d in 0..shape.len() {
        if shape[d] > 1 && rng.gen_bool(0.35) {
            offset += (shape[d] - 1) * strides[d] as usize;
            strides[d] = -strides[d];
        }
    }
    let len = numel(shape) * spacing as usize;
    (strides, offset, len.max(1))
}

fn random_order(rng: &mut StdRng) -> Order {
    if rng.gen_bool(0.5) {
        Order::RowMajor
    } else {
        Order::ColumnMajor
    }
}

fn reference_sum(x: &NdView<'_>, core: &[usize], loop_shape: &[usize]) -> Vec<f64> {
    let core_shape: Vec<usize> = core.iter().map(|&d| x.shape()[d]).collect();
    indices(loop_shape)
        .iter()
        .map(|li| {
            indices(&core_shape)
                .iter()
                .map(|ci| x.get(&merge(li, ci, core)).to_f64())
                .sum()
        })
        .collect()
}

#[test]
fn test_concrete_sum_last_dim() {
    let x = NdArray::from_vec((1..=8).map(f64::from).collect(), &[2, 2, 2], Order::RowMajor)
        .unwrap();
    for strategy in STRATEGIES {
        let mut out = NdArray::zeros(DType::Float64, &[2, 2], Order::RowMajor);
        let config = ReduceConfig::default().with_strategy(strategy);
        unary_reduce_subarray(sum, &x.view(), &mut out.view_mut(), &[], &[2], &(), &config)
            .unwrap();
        assert_eq!(out.to_f64_vec(), vec![3.0, 7.0, 11.0, 15.0], "{strategy:?}");
    }
}

#[test]
fn test_negative_dims_count_from_end() {
    let x = NdArray::from_vec((1..=8).map(f64::from).collect(), &[2, 2, 2], Order::RowMajor)
        .unwrap();
    let mut out = NdArray::zeros(DType::Float64, &[2, 2], Order::RowMajor);
    unary_reduce_subarray(
        sum,
        &x.view(),
        &mut out.view_mut(),
        &[],
        &[-3],
        &(),
        &ReduceConfig::default(),
    )
    .unwrap();
    assert_eq!(out.to_f64_vec(), vec![6.0, 8.0, 10.0, 12.0]);
}

#[test]
fn test_strategy_equivalence_random_layouts() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..120 {
        let rank = rng.gen_range(1..=6);
        let shape: Vec<usize> = (0..rank).map(|_| rng.gen_range(1..=4)).collect();
        let ncore = rng.gen_range(0..=rank.min(2));
        let mut core: Vec<usize> = (0..rank).collect();
        for i in (1..rank).rev() {
            core.swap(i, rng.gen_range(0..=i));
        }
        core.truncate(ncore);
        core.sort_unstable();
        let dims: Vec<isize> = core.iter().map(|&d| d as isize).collect();
        let loop_shape: Vec<usize> = (0..rank)
            .filter(|d| !core.contains(d))
            .map(|d| shape[d])
            .collect();

        let x_order = random_order(&mut rng);
        let (x_strides, x_offset, x_len) = random_layout(&mut rng, &shape, x_order);
        let x_buf = Buffer::Float64((0..x_len).map(|_| rng.gen_range(-5.0..5.0)).collect());
        let x = NdView::new(&x_buf, &shape, &x_strides, x_offset, x_order).unwrap();
        let expected = reference_sum(&x, &core, &loop_shape);

        let o_order = random_order(&mut rng);
        let (o_strides, o_offset, o_len) = random_layout(&mut rng, &loop_shape, o_order);

        for strategy in STRATEGIES {
            let mut o_buf = Buffer::zeros(DType::Float64, o_len);
            let mut out =
                NdViewMut::new(&mut o_buf, &loop_shape, &o_strides, o_offset, o_order).unwrap();
            let config = ReduceConfig::default()
                .with_strategy(strategy)
                .with_block_memory(64);
            unary_reduce_subarray(sum, &x, &mut out, &[], &dims, &(), &config).unwrap();

            let got: Vec<f64> = out.as_view().to_scalars().iter().map(Scalar::to_f64).collect();
            assert_eq!(got.len(), expected.len());
            for (g, e) in got.iter().zip(&expected) {
                assert_relative_eq!(*g, *e, epsilon = 1e-10);
            }
        }
    }
}

#[test]
fn test_blocked_matches_nested_on_transposed_input() {
    // column-major input with a row-major output forces the blocked path in auto mode
    let shape = [6, 5, 4, 3];
    let x = NdArray::from_vec(
        (0..360).map(|v| v as f64 * 0.5).collect(),
        &shape,
        Order::ColumnMajor,
    )
    .unwrap();
    let flipped = NdView::new(x.buffer(), &[6, 5, 4, 3], &[-1, 6, 30, 120], 5, Order::ColumnMajor)
        .unwrap();
    let mut results = Vec::new();
    for strategy in [Strategy::Nested, Strategy::Blocked, Strategy::Generic] {
        let mut out = NdArray::zeros(DType::Float64, &[6, 5, 4], Order::RowMajor);
        let config = ReduceConfig::default()
            .with_strategy(strategy)
            .with_block_memory(64);
        unary_reduce_subarray(sum, &flipped, &mut out.view_mut(), &[], &[3], &(), &config)
            .unwrap();
        results.push(out.to_f64_vec());
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
    assert_eq!(results[0], reference_sum(&flipped, &[3], &[6, 5, 4]));
}

#[test]
fn test_binary_strategies_agree_on_mixed_layouts() {
    let shape = [7, 5, 3, 4];
    let n = numel(&shape);
    let mut rng = StdRng::seed_from_u64(23);
    let x_buf = Buffer::Float64((0..n).map(|_| rng.gen_range(-2.0..2.0)).collect());
    let y_buf = Buffer::Float64((0..n).map(|_| rng.gen_range(-2.0..2.0)).collect());
    let x_strides = shape_to_strides(&shape, Order::RowMajor);
    let x = NdView::new(&x_buf, &shape, &x_strides, 0, Order::RowMajor).unwrap();
    // column-major with dimension 1 walked backwards
    let y = NdView::new(&y_buf, &shape, &[1, -7, 35, 105], 28, Order::ColumnMajor).unwrap();

    let loop_shape = [7, 5, 4];
    let expected: Vec<f64> = indices(&loop_shape)
        .iter()
        .map(|li| {
            (0..3)
                .map(|k| {
                    let idx = [li[0], li[1], k, li[2]];
                    x.get(&idx).to_f64() * y.get(&idx).to_f64()
                })
                .sum()
        })
        .collect();

    let dot = |views: &[NdView<'_>], _: &()| {
        let (a, b) = (views[0].to_scalars(), views[1].to_scalars());
        Scalar::Float64(a.iter().zip(&b).map(|(p, q)| p.to_f64() * q.to_f64()).sum())
    };
    for strategy in STRATEGIES {
        let mut out = NdArray::zeros(DType::Float64, &loop_shape, Order::ColumnMajor);
        let config = ReduceConfig::default()
            .with_strategy(strategy)
            .with_block_memory(64);
        binary_reduce_subarray(dot, &x, &y, &mut out.view_mut(), &[], &[2], &(), &config)
            .unwrap();
        let got = out.to_f64_vec();
        assert_eq!(got.len(), 140);
        for (g, e) in got.iter().zip(&expected) {
            assert_relative_eq!(*g, *e, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_ancillary_follows_loop_index() {
    let mut rng = StdRng::seed_from_u64(11);
    let x = NdArray::from_vec(
        (0..60).map(|_| rng.gen_range(0.0..1.0)).collect::<Vec<f64>>(),
        &[3, 4, 5],
        Order::RowMajor,
    )
    .unwrap();
    let anc = NdArray::from_vec(
        (0..12).map(f64::from).collect::<Vec<f64>>(),
        &[3, 4],
        Order::ColumnMajor,
    )
    .unwrap();
    let base = reference_sum(&x.view(), &[2], &[3, 4]);

    for strategy in STRATEGIES {
        let mut out = NdArray::zeros(DType::Float64, &[3, 4], Order::RowMajor);
        let config = ReduceConfig::default().with_strategy(strategy);
        reduce_subarray(
            sum_plus_ancillary,
            &[x.view()],
            &mut out.view_mut(),
            &[anc.view()],
            &[2],
            &(),
            &config,
        )
        .unwrap();
        let got = out.to_f64_vec();
        for (k, idx) in indices(&[3, 4]).iter().enumerate() {
            let expected = base[k] + 10.0 * anc.get(idx).to_f64();
            assert_relative_eq!(got[k], expected, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_storage_protocols_agree() {
    let values: Vec<f64> = (0..24).map(|v| (v * 7 % 11) as f64).collect();
    let raw = Buffer::Float64(values.clone());
    let generic = Buffer::Generic(values.iter().map(|&v| Scalar::Float64(v)).collect());
    let strides = shape_to_strides(&[2, 3, 4], Order::RowMajor);

    let run = |x: NdView<'_>, accessor_out: bool| {
        let mut buf = Buffer::zeros(DType::Float64, 8);
        let mut out = NdViewMut::new(&mut buf, &[2, 4], &[4, 1], 0, Order::RowMajor).unwrap();
        if accessor_out {
            out = out.with_accessors();
        }
        unary_reduce_subarray(sum, &x, &mut out, &[], &[1], &(), &ReduceConfig::default())
            .unwrap();
        buf
    };

    let direct = run(NdView::new(&raw, &[2, 3, 4], &strides, 0, Order::RowMajor).unwrap(), false);
    let forced = run(
        NdView::new(&raw, &[2, 3, 4], &strides, 0, Order::RowMajor)
            .unwrap()
            .with_accessors(),
        true,
    );
    let boxed = run(
        NdView::new(&generic, &[2, 3, 4], &strides, 0, Order::RowMajor).unwrap(),
        false,
    );
    assert_eq!(direct, forced);
    assert_eq!(direct, boxed);
}

#[test]
fn test_complex_output_through_accessors() {
    let x = NdArray::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 2], Order::RowMajor).unwrap();
    let mut out = NdArray::zeros(DType::Complex64, &[2], Order::RowMajor);
    unary_reduce_subarray(
        sum,
        &x.view(),
        &mut out.view_mut(),
        &[],
        &[1],
        &(),
        &ReduceConfig::default(),
    )
    .unwrap();
    assert_eq!(out.buffer(), &Buffer::Complex64(vec![3.0, 0.0, 7.0, 0.0]));
}

#[test]
fn test_empty_loop_dims_is_noop() {
    let x = NdArray::from_vec(Vec::<f64>::new(), &[0, 3], Order::RowMajor).unwrap();
    let mut out = NdArray::zeros(DType::Float64, &[0], Order::RowMajor);
    let mut calls = 0;
    let counting = |_: &[NdView<'_>], _: &()| {
        calls += 1;
        Scalar::Float64(0.0)
    };
    unary_reduce_subarray(
        counting,
        &x.view(),
        &mut out.view_mut(),
        &[],
        &[1],
        &(),
        &ReduceConfig::default(),
    )
    .unwrap();
    assert_eq!(calls, 0);
    assert_eq!(out.shape(), &[0]);
}

#[test]
fn test_empty_core_dims_is_noop() {
    let x = NdArray::from_vec(Vec::<f64>::new(), &[3, 0], Order::RowMajor).unwrap();
    let mut out = NdArray::from_vec(vec![9.0f64; 3], &[3], Order::RowMajor).unwrap();
    unary_reduce_subarray(
        sum,
        &x.view(),
        &mut out.view_mut(),
        &[],
        &[1],
        &(),
        &ReduceConfig::default(),
    )
    .unwrap();
    assert_eq!(out.to_f64_vec(), vec![9.0; 3]);
}

#[test]
fn test_dimension_errors() {
    let x = NdArray::zeros(DType::Float64, &[2, 3], Order::RowMajor);
    let mut out = NdArray::zeros(DType::Float64, &[2], Order::RowMajor);
    let config = ReduceConfig::default();

    let err = unary_reduce_subarray(sum, &x.view(), &mut out.view_mut(), &[], &[2], &(), &config)
        .unwrap_err();
    assert!(matches!(err, ReduceError::DimOutOfBounds { dim: 2, rank: 2 }));
    assert_eq!(err.kind(), strided_reduce::ErrorKind::Range);

    let err = unary_reduce_subarray(sum, &x.view(), &mut out.view_mut(), &[], &[1, -1], &(), &config)
        .unwrap_err();
    assert!(matches!(err, ReduceError::DuplicateDim(1)));
    assert_eq!(err.kind(), strided_reduce::ErrorKind::Structural);

    let err = unary_reduce_subarray(
        sum,
        &x.view(),
        &mut out.view_mut(),
        &[],
        &[0, 1, 0],
        &(),
        &config,
    )
    .unwrap_err();
    assert!(matches!(err, ReduceError::DuplicateDim(0)));
}

#[test]
fn test_binary_inputs_must_share_shape() {
    let x = NdArray::zeros(DType::Float64, &[2, 3], Order::RowMajor);
    let y = NdArray::zeros(DType::Float64, &[3, 2], Order::RowMajor);
    let mut out = NdArray::zeros(DType::Float64, &[2], Order::RowMajor);
    let err = reduce_subarray(
        sum,
        &[x.view(), y.view()],
        &mut out.view_mut(),
        &[],
        &[1],
        &(),
        &ReduceConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ReduceError::ShapeMismatch(..)));
}
