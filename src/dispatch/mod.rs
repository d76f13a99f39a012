use log::debug;

use crate::{
    error::{Result, VxError},
    graph::{BorderMode, GraphRuntime, KernelDescriptor, NodeId},
    kernel::{registry, BackendKind, KernelDtype, OperatorId, Registry, VariantKey},
    ops::{OneHotParams, SequenceMaskParams, SignalFrameParams},
    pack::{DispatchScope, ParamPacker},
    shape::ShapeLimits,
    tensor::TensorRef,
};

mod selector;

pub use selector::{select_and_dispatch, select_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    ParamValidate,
    KernelLookup,
    ShapeOptimize,
    NodeCreate,
    ParamPackAndBind,
    Border,
}

/// Operator parameters, one variant per registered operator.
#[derive(Debug, Clone, PartialEq)]
pub enum OpParams {
    OneHot(OneHotParams),
    SequenceMask(SequenceMaskParams),
    SignalFrame(SignalFrameParams),
}

impl OpParams {
    pub fn operator(&self) -> OperatorId {
        match self {
            OpParams::OneHot(_) => OperatorId::OneHot,
            OpParams::SequenceMask(_) => OperatorId::SequenceMask,
            OpParams::SignalFrame(_) => OperatorId::SignalFrame,
        }
    }

    fn wrong(&self, expected: OperatorId) -> VxError {
        VxError::invalid(
            "params",
            format!("{} params given to {}", self.operator().name(), expected.name()),
        )
    }

    pub(crate) fn one_hot(&self) -> Result<&OneHotParams> {
        match self {
            OpParams::OneHot(p) => Ok(p),
            other => Err(other.wrong(OperatorId::OneHot)),
        }
    }

    pub(crate) fn sequence_mask(&self) -> Result<&SequenceMaskParams> {
        match self {
            OpParams::SequenceMask(p) => Ok(p),
            other => Err(other.wrong(OperatorId::SequenceMask)),
        }
    }

    pub(crate) fn signal_frame(&self) -> Result<&SignalFrameParams> {
        match self {
            OpParams::SignalFrame(p) => Ok(p),
            other => Err(other.wrong(OperatorId::SignalFrame)),
        }
    }
}

/// Shapes each tensor is bound under. `None` binds the tensor unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapePlan {
    pub inputs: Vec<Option<Vec<usize>>>,
    pub outputs: Vec<Option<Vec<usize>>>,
}

impl ShapePlan {
    pub fn unchanged(inputs: usize, outputs: usize) -> Self {
        ShapePlan {
            inputs: vec![None; inputs],
            outputs: vec![None; outputs],
        }
    }

    pub fn reshaped(inputs: Vec<Vec<usize>>, outputs: Vec<Vec<usize>>) -> Self {
        ShapePlan {
            inputs: inputs.into_iter().map(Some).collect(),
            outputs: outputs.into_iter().map(Some).collect(),
        }
    }
}

/// Operator-specific steps of dispatching one node on one backend.
pub trait KernelSetup: Send + Sync {
    fn validate(&self, inputs: &[TensorRef], outputs: &[TensorRef], params: &OpParams) -> Result<()>;

    fn variant_key(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        params: &OpParams,
        limits: &ShapeLimits,
    ) -> Result<VariantKey>;

    fn optimize_shapes(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        params: &OpParams,
        limits: &ShapeLimits,
    ) -> Result<ShapePlan>;

    /// Fills the packer with the views produced from the shape plan.
    fn pack(&self, packer: &mut ParamPacker<'_, '_>, io: &BoundIo<'_>, params: &OpParams) -> Result<()>;

    fn border(&self, _io: &BoundIo<'_>, _params: &OpParams) -> Result<BorderMode> {
        Ok(BorderMode::Undefined)
    }
}

/// Tensors as the caller passed them and as they are bound to the node.
pub struct BoundIo<'a> {
    pub inputs: &'a [TensorRef],
    pub outputs: &'a [TensorRef],
    pub input_views: &'a [TensorRef],
    pub output_views: &'a [TensorRef],
}

pub(crate) fn no_kernel(
    op: OperatorId,
    backend: BackendKind,
    inputs: &[TensorRef],
    outputs: &[TensorRef],
    key: Option<VariantKey>,
) -> VxError {
    let first = |ts: &[TensorRef]| {
        ts.first()
            .map(|t| KernelDtype::map(t.dtype().vx_type))
            .unwrap_or(KernelDtype::F32)
    };
    let (input, output, image_2d) = key
        .and_then(VariantKey::decode)
        .unwrap_or_else(|| (first(inputs), first(outputs), false));
    VxError::UnsupportedDtypeCombination {
        operator: op,
        backend,
        input,
        output,
        image_2d,
    }
}

fn stage<T>(stage: DispatchStage, op: OperatorId, backend: BackendKind, result: Result<T>) -> Result<T> {
    if let Err(ref e) = result {
        debug!("{} on {} failed at {:?}: {}", op.name(), backend, stage, e);
    }
    result
}

fn bind_views(
    scope: &mut DispatchScope<'_>,
    tensors: &[TensorRef],
    shapes: &[Option<Vec<usize>>],
) -> Result<Vec<TensorRef>> {
    if shapes.len() != tensors.len() {
        return Err(VxError::invalid(
            "shape plan",
            format!("{} shapes for {} tensors", shapes.len(), tensors.len()),
        ));
    }
    tensors
        .iter()
        .zip(shapes.iter())
        .map(|(t, shape)| match shape {
            Some(shape) => scope.view(t, shape),
            None => Ok(t.clone()),
        })
        .collect()
}

/// Creates one node for `op` on `backend` using the process-wide registry.
pub fn dispatch(
    op: OperatorId,
    backend: BackendKind,
    graph: &mut dyn GraphRuntime,
    inputs: &[TensorRef],
    outputs: &[TensorRef],
    params: &OpParams,
) -> Result<NodeId> {
    dispatch_with(registry(), op, backend, graph, inputs, outputs, params)
}

/// Runs the dispatch stages once, without retrying another backend.
///
/// Views and scalars acquired on the way are released before returning, on
/// success and on failure. A failure after node creation removes the node.
pub fn dispatch_with(
    registry: &Registry,
    op: OperatorId,
    backend: BackendKind,
    graph: &mut dyn GraphRuntime,
    inputs: &[TensorRef],
    outputs: &[TensorRef],
    params: &OpParams,
) -> Result<NodeId> {
    let kernels = registry
        .kernels(op, backend)
        .ok_or_else(|| no_kernel(op, backend, inputs, outputs, None))?;
    let setup = kernels.setup();
    let limits = graph.config().limits;

    stage(DispatchStage::ParamValidate, op, backend, {
        if params.operator() != op {
            Err(params.wrong(op))
        } else {
            inputs
                .iter()
                .chain(outputs.iter())
                .try_for_each(|t| t.attr().validate())
                .and_then(|_| setup.validate(inputs, outputs, params))
        }
    })?;

    let variant = stage(DispatchStage::KernelLookup, op, backend, {
        setup
            .variant_key(inputs, outputs, params, &limits)
            .and_then(|key| {
                kernels
                    .lookup(key)
                    .ok_or_else(|| no_kernel(op, backend, inputs, outputs, Some(key)))
            })
    })?;
    debug!("{} selected {}", op.name(), variant.kernel_name);

    let plan = stage(
        DispatchStage::ShapeOptimize,
        op,
        backend,
        setup.optimize_shapes(inputs, outputs, params, &limits),
    )?;

    let mut scope = DispatchScope::new(graph);
    let (in_views, out_views) = stage(DispatchStage::ShapeOptimize, op, backend, {
        bind_views(&mut scope, inputs, &plan.inputs).and_then(|i| {
            bind_views(&mut scope, outputs, &plan.outputs).map(|o| (i, o))
        })
    })?;

    let descriptor = KernelDescriptor {
        operator: op,
        backend,
        kernel_name: variant.kernel_name.clone(),
        source_name: variant.source_name,
        slots: kernels.slots(),
        lifecycle: kernels.lifecycle(),
        executor: kernels.executor(),
    };
    stage(DispatchStage::NodeCreate, op, backend, scope.create_node(descriptor))?;

    let io = BoundIo {
        inputs,
        outputs,
        input_views: &in_views,
        output_views: &out_views,
    };
    let node_params = stage(DispatchStage::ParamPackAndBind, op, backend, {
        let mut packer = ParamPacker::new(&mut scope, &variant.kernel_name, kernels.slots());
        setup
            .pack(&mut packer, &io, params)
            .and_then(|_| packer.finish())
    })?;
    stage(
        DispatchStage::ParamPackAndBind,
        op,
        backend,
        scope.pass_params(&node_params),
    )?;

    stage(DispatchStage::Border, op, backend, {
        setup
            .border(&io, params)
            .and_then(|mode| match mode {
                BorderMode::Undefined => Ok(()),
                mode => scope.set_border_mode(mode),
            })
    })?;

    scope.commit()
}
