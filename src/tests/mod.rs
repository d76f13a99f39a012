use rand::Rng;

use crate::{
    config::DispatchConfig,
    dispatch::{dispatch, select_and_dispatch, OpParams},
    dtype::{affine_to_fp32, fp16_to_fp32, fp32_to_affine, fp32_to_fp16, DType, DataType, QuantType},
    error::VxError,
    graph::{BorderConstant, BorderMode, BoundParam, GraphRuntime, HostGraph, ScalarValue},
    kernel::{registry, BackendKind, KernelDtype, OperatorId, UniformValue},
    ops::{OneHotParams, SequenceMaskParams, SignalFrameParams},
    shape::{optimize_element_shape, optimize_eltwise_shape, optimize_tensor_shape, ShapeLimits},
    tensor::{dtype_compare, reshape_tensor, Tensor, TensorAttr, TensorRef},
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tensor(shape: &[usize], dtype: DType) -> TensorRef {
    Tensor::new(TensorAttr::new(shape, dtype)).unwrap()
}

fn filled(shape: &[usize], dtype: DType, values: &[f32]) -> TensorRef {
    Tensor::from_f32(TensorAttr::new(shape, dtype), values).unwrap()
}

fn random_shape<R: Rng>(rng: &mut R, max_rank: usize, max_dim: usize) -> Vec<usize> {
    let rank = rng.gen_range(1..=max_rank);
    (0..rank).map(|_| rng.gen_range(1..=max_dim)).collect()
}

#[test]
fn fp16_round_trip_is_exact() {
    let mut rng = rand::thread_rng();
    for _ in 0..10_000 {
        let x = fp16_to_fp32(rng.gen::<u16>());
        if x.is_nan() {
            continue;
        }
        assert_eq!(fp16_to_fp32(fp32_to_fp16(x)), x);
    }
}

#[test]
fn affine_round_trip_within_one_step() {
    let mut rng = rand::thread_rng();
    for _ in 0..10_000 {
        let scale = rng.gen_range(0.001f32..2.0);
        let zero_point = rng.gen_range(0..=255);
        let min = (0 - zero_point) as f32 * scale;
        let max = (255 - zero_point) as f32 * scale;
        let x = rng.gen_range(min..=max);
        let stored = fp32_to_affine(x, scale, zero_point, DataType::Uint8);
        let back = affine_to_fp32(stored, scale, zero_point);
        assert!((back - x).abs() <= scale, "{} -> {} -> {}", x, stored, back);
    }
}

#[test]
fn reshape_keeps_element_count() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let shape = random_shape(&mut rng, 4, 6);
        let t = tensor(&shape, DType::new(DataType::Float16));
        let mut reversed = shape.clone();
        reversed.reverse();
        for target in [reversed, vec![t.element_num()]].iter() {
            let view = reshape_tensor(&t, target).unwrap();
            assert_eq!(view.element_num(), t.element_num());
            assert!(view.shares_storage_with(&t));
        }
    }
}

#[test]
fn reshape_rejects_count_mismatch() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let shape = random_shape(&mut rng, 4, 6);
        let t = tensor(&shape, DType::new(DataType::Uint8));
        let mut grown = shape.clone();
        grown.push(rng.gen_range(2..5));
        assert!(matches!(
            reshape_tensor(&t, &grown),
            Err(VxError::ElementCountMismatch { .. })
        ));
    }
}

#[test]
fn registry_keys_are_unique_per_table() {
    let registry = registry();
    for op in registry.operators() {
        for backend in registry.backends(op) {
            let kernels = registry.kernels(op, backend).unwrap();
            let mut keys: Vec<_> = kernels.variants().iter().map(|v| v.key).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), total, "{} on {}", op.name(), backend);
            for variant in kernels.variants() {
                assert_eq!(kernels.lookup(variant.key), Some(variant));
            }
        }
    }
}

#[test]
fn element_shapes_respect_extent_limit() {
    let mut rng = rand::thread_rng();
    let limits = ShapeLimits {
        max_extent: 64,
        ..ShapeLimits::default()
    };
    for _ in 0..2_000 {
        let shape = random_shape(&mut rng, 5, 40);
        match optimize_element_shape(&shape, &limits) {
            Ok(out) => {
                assert!(out.iter().all(|&d| d <= limits.max_extent), "{:?} -> {:?}", shape, out);
                assert_eq!(out.iter().product::<usize>(), shape.iter().product::<usize>());
            }
            Err(e) => assert!(matches!(e, VxError::ShapeNotOptimizable { .. })),
        }
    }
}

fn assert_within(limits: &ShapeLimits, from: &[usize], out: &[usize]) {
    assert!(out.len() <= limits.max_rank, "{:?} -> {:?}", from, out);
    assert!(out.iter().all(|&d| d <= limits.max_extent), "{:?} -> {:?}", from, out);
}

#[test]
fn eltwise_shapes_respect_rank_and_extent() {
    let mut rng = rand::thread_rng();
    let limits = ShapeLimits {
        max_extent: 64,
        ..ShapeLimits::default()
    };
    for _ in 0..2_000 {
        let shape = random_shape(&mut rng, 6, 40);
        let broadcast: Vec<usize> = shape
            .iter()
            .map(|&d| if rng.gen_bool(0.5) { 1 } else { d })
            .collect();
        match optimize_eltwise_shape(&shape, &broadcast, &shape, &limits) {
            Ok(out) => {
                assert_within(&limits, &shape, &out.output);
                assert_eq!(out.x.len(), out.output.len());
                assert_eq!(out.y.len(), out.output.len());
                assert_eq!(out.output.iter().product::<usize>(), shape.iter().product::<usize>());
                assert_eq!(out.y.iter().product::<usize>(), broadcast.iter().product::<usize>());
            }
            Err(e) => assert!(matches!(e, VxError::ShapeNotOptimizable { .. }), "{:?}", e),
        }
    }
}

#[test]
fn axis_shapes_respect_rank_and_extent() {
    let mut rng = rand::thread_rng();
    let limits = ShapeLimits {
        max_extent: 64,
        ..ShapeLimits::default()
    };
    for _ in 0..2_000 {
        let shape = random_shape(&mut rng, 6, 40);
        let first = rng.gen_range(0..shape.len());
        let last = rng.gen_range(first..shape.len());
        let axes: Vec<usize> = (first..=last).collect();
        match optimize_tensor_shape(&shape, &axes, &limits) {
            Ok(out) => {
                assert_within(&limits, &shape, &out.shape);
                assert!(out.axes.iter().all(|&a| a < out.shape.len()));
                assert_eq!(out.shape.iter().product::<usize>(), shape.iter().product::<usize>());
            }
            Err(e) => assert!(matches!(e, VxError::ShapeNotOptimizable { .. }), "{:?}", e),
        }
    }
}

#[test]
fn one_hot_unit_suffix_selects_2d_kernel() {
    init();
    let mut graph = HostGraph::default();
    let input = filled(&[3], DType::new(DataType::Uint8), &[0., 1., 2.]);
    let output = tensor(&[3, 3], DType::new(DataType::Uint8));
    let node = select_and_dispatch(
        OperatorId::OneHot,
        &mut graph,
        &[input],
        &[output],
        &OpParams::OneHot(OneHotParams::new(3, 0)),
    )
    .unwrap();

    let node = graph.node(node).unwrap();
    assert_eq!(node.backend(), BackendKind::Evis);
    assert_eq!(
        node.kernel_name(),
        "com.vivantecorp.extension.evis.one_hot_U8toU8_2D"
    );
    let config = node.config().unwrap();
    let gpu = config.gpu.as_ref().unwrap();
    assert_eq!(gpu.global_size[0] % 4, 0);
    assert_eq!(config.uniforms.get("depth"), Some(&UniformValue::I32(3)));
    assert_eq!((graph.live_views(), graph.live_scalars()), (0, 0));
}

#[test]
fn one_hot_identity_on_host() {
    init();
    let mut graph = HostGraph::new(DispatchConfig::host_only());
    let input = filled(&[3], DType::new(DataType::Int32), &[0., 1., 2.]);
    let output = tensor(&[3, 3], DType::new(DataType::Float32));
    select_and_dispatch(
        OperatorId::OneHot,
        &mut graph,
        &[input],
        &[output.clone()],
        &OpParams::OneHot(OneHotParams::new(3, 0)),
    )
    .unwrap();
    assert_eq!(graph.nodes()[0].backend(), BackendKind::Cpu);
    graph.run().unwrap();
    assert_eq!(
        output.read_f32().unwrap(),
        vec![1., 0., 0., 0., 1., 0., 0., 0., 1.]
    );
}

#[test]
fn one_hot_out_of_range_index_is_all_off() {
    init();
    let mut graph = HostGraph::default();
    let input = filled(&[4], DType::new(DataType::Int32), &[0., 2., -1., 1.]);
    let output = tensor(&[3, 4], DType::new(DataType::Int8));
    select_and_dispatch(
        OperatorId::OneHot,
        &mut graph,
        &[input],
        &[output.clone()],
        &OpParams::OneHot(OneHotParams::new(3, -1).with_values(6.0, -1.0)),
    )
    .unwrap();
    graph.run().unwrap();
    let bytes: Vec<i8> = output.read_bytes().unwrap().iter().map(|&b| b as i8).collect();
    assert_eq!(bytes, vec![6, -1, -1, -1, -1, 6, -1, -1, -1, -1, 6, -1]);
}

#[test]
fn one_hot_values_take_output_encoding() {
    let mut graph = HostGraph::default();
    let input = tensor(&[4], DType::new(DataType::Uint8));
    let output = tensor(&[3, 4], DType::new(DataType::Int8));
    let node = dispatch(
        OperatorId::OneHot,
        BackendKind::Evis,
        &mut graph,
        &[input],
        &[output],
        &OpParams::OneHot(OneHotParams::new(3, -1).with_values(6.0, -1.0)),
    )
    .unwrap();
    let params = graph.node(node).unwrap().params();
    assert!(matches!(params[3], BoundParam::Scalar(ScalarValue::U32(6))));
    assert!(matches!(params[4], BoundParam::Scalar(ScalarValue::U32(0xffff_ffff))));
}

#[test]
fn sequence_mask_rows() {
    init();
    let mut graph = HostGraph::default();
    let lengths = filled(&[3], DType::new(DataType::Int32), &[2., 0., 3.]);
    let mask = tensor(&[3, 3], DType::new(DataType::Uint8));
    select_and_dispatch(
        OperatorId::SequenceMask,
        &mut graph,
        &[lengths],
        &[mask.clone()],
        &OpParams::SequenceMask(SequenceMaskParams { max_len: 3 }),
    )
    .unwrap();
    assert_eq!(graph.nodes()[0].backend(), BackendKind::Cpu);
    graph.run().unwrap();
    assert_eq!(mask.read_bytes().unwrap(), vec![1, 1, 0, 0, 0, 0, 1, 1, 1]);
}

#[test]
fn sequence_mask_bool_output_uses_u8_kernel() {
    let mut graph = HostGraph::default();
    let node = dispatch(
        OperatorId::SequenceMask,
        BackendKind::Evis,
        &mut graph,
        &[tensor(&[3], DType::new(DataType::Float16))],
        &[tensor(&[4, 3], DType::new(DataType::Bool8))],
        &OpParams::SequenceMask(SequenceMaskParams { max_len: 4 }),
    )
    .unwrap();
    assert_eq!(
        graph.node(node).unwrap().kernel_name(),
        "com.vivantecorp.extension.evis.sequence_mask_F16toU8_2D"
    );
}

#[test]
fn signal_frame_padding_sets_border() {
    let mut graph = HostGraph::default();
    let input = tensor(&[6], DType::new(DataType::Int16));
    let output = tensor(&[3, 3], DType::new(DataType::Int16));
    let node = dispatch(
        OperatorId::SignalFrame,
        BackendKind::Evis,
        &mut graph,
        &[input],
        &[output],
        &OpParams::SignalFrame(SignalFrameParams::new(3, 2, 0).padded(-2.0)),
    )
    .unwrap();
    let node = graph.node(node).unwrap();
    assert_eq!(
        node.border(),
        BorderMode::Constant(BorderConstant::U16((-2i16) as u16))
    );
    assert_eq!(node.config().unwrap().gpu.as_ref().unwrap().global_scale[0], 8);
}

#[test]
fn signal_frame_on_host() {
    let mut graph = HostGraph::new(DispatchConfig::host_only());
    let input = filled(&[2, 5], DType::new(DataType::Float32), &[0., 1., 2., 3., 4., 5., 6., 7., 8., 9.]);
    let output = tensor(&[2, 2, 2], DType::new(DataType::Float32));
    select_and_dispatch(
        OperatorId::SignalFrame,
        &mut graph,
        &[input],
        &[output.clone()],
        &OpParams::SignalFrame(SignalFrameParams::new(2, 2, 1)),
    )
    .unwrap();
    graph.run().unwrap();
    // each sample is a pair of inner values; frames start at samples 0 and 2
    assert_eq!(output.read_f32().unwrap(), vec![0., 1., 2., 3., 4., 5., 6., 7.]);
}

#[test]
fn dtype_compare_tolerance() {
    let base = DType::affine(DataType::Uint8, 0.1, 3);
    assert!(dtype_compare(&base, &DType::affine(DataType::Uint8, 0.1 + 9e-6, 3)));
    assert!(!dtype_compare(&base, &DType::affine(DataType::Uint8, 0.1 + 2e-5, 3)));
    assert!(!dtype_compare(&base, &DType::affine(DataType::Uint8, 0.1, 4)));
}

#[test]
fn failed_node_creation_releases_views() {
    let mut graph = HostGraph::default().with_node_limit(0);
    let result = dispatch(
        OperatorId::OneHot,
        BackendKind::Evis,
        &mut graph,
        &[tensor(&[3], DType::new(DataType::Uint8))],
        &[tensor(&[3, 3], DType::new(DataType::Uint8))],
        &OpParams::OneHot(OneHotParams::new(3, 0)),
    );
    assert!(matches!(result, Err(VxError::BackendResourceExhausted { .. })));
    assert_eq!((graph.live_views(), graph.live_scalars()), (0, 0));
}

#[test]
fn failed_packing_removes_node() {
    let mut graph = HostGraph::default();
    let per_channel = DType {
        vx_type: DataType::Int8,
        qnt: QuantType::AffinePerChannel {
            scales: vec![0.5; 3],
            zero_points: vec![0; 3],
            channel_dim: 0,
        },
    };
    let result = dispatch(
        OperatorId::OneHot,
        BackendKind::Evis,
        &mut graph,
        &[tensor(&[3], DType::new(DataType::Uint8))],
        &[tensor(&[3, 3], per_channel)],
        &OpParams::OneHot(OneHotParams::new(3, 0)),
    );
    assert!(matches!(result, Err(VxError::UnsupportedQuantization { .. })));
    assert!(graph.nodes().is_empty());
    assert_eq!((graph.live_views(), graph.live_scalars()), (0, 0));
}

#[test]
fn oversized_view_is_not_optimizable() {
    let mut graph = HostGraph::default();
    let result = dispatch(
        OperatorId::OneHot,
        BackendKind::Evis,
        &mut graph,
        &[tensor(&[70_000], DType::new(DataType::Uint8))],
        &[tensor(&[2, 70_000], DType::new(DataType::Uint8))],
        &OpParams::OneHot(OneHotParams::new(2, 0)),
    );
    assert!(matches!(result, Err(VxError::ShapeNotOptimizable { .. })));
    assert!(graph.nodes().is_empty());
    assert_eq!(graph.live_views(), 0);
}

#[test]
fn committed_nodes_survive_later_failures() {
    let mut graph = HostGraph::default();
    let params = OpParams::SequenceMask(SequenceMaskParams { max_len: 2 });
    let first = select_and_dispatch(
        OperatorId::SequenceMask,
        &mut graph,
        &[tensor(&[2], DType::new(DataType::Uint8))],
        &[tensor(&[2, 2], DType::new(DataType::Uint8))],
        &params,
    )
    .unwrap();
    let second = select_and_dispatch(
        OperatorId::SequenceMask,
        &mut graph,
        &[tensor(&[2], DType::new(DataType::Uint8))],
        &[tensor(&[3, 3], DType::new(DataType::Uint8))],
        &params,
    );
    assert!(second.is_err());
    assert_eq!(graph.nodes().len(), 1);
    assert!(graph.node(first).is_some());
}

#[test]
fn four_bit_operands_skip_shaders() {
    init();
    let mut graph = HostGraph::default();
    let result = select_and_dispatch(
        OperatorId::OneHot,
        &mut graph,
        &[tensor(&[4], DType::new(DataType::Int4))],
        &[tensor(&[2, 4], DType::new(DataType::Float32))],
        &OpParams::OneHot(OneHotParams::new(2, -1)),
    );
    match result {
        Err(VxError::UnsupportedDtypeCombination { backend, input, .. }) => {
            assert_eq!(backend, BackendKind::Cpu);
            assert_eq!(input, KernelDtype::I4);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(graph.nodes().is_empty());
}

#[test]
fn shader_disable_falls_back_to_host() {
    let mut graph = HostGraph::new(DispatchConfig {
        enable_shader: false,
        ..DispatchConfig::default()
    });
    let node = select_and_dispatch(
        OperatorId::OneHot,
        &mut graph,
        &[tensor(&[3], DType::new(DataType::Uint8))],
        &[tensor(&[3, 3], DType::new(DataType::Uint8))],
        &OpParams::OneHot(OneHotParams::new(3, 0)),
    )
    .unwrap();
    assert_eq!(graph.node(node).unwrap().backend(), BackendKind::Cpu);
    assert!(graph.config().priority.len() >= 2);
}
