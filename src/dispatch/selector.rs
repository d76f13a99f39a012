use log::{debug, warn};

use super::{dispatch_with, no_kernel, OpParams};
use crate::{
    config::{DispatchConfig, EvisVersion},
    error::Result,
    graph::{GraphRuntime, NodeId},
    kernel::{registry, BackendKind, OperatorId, Registry},
    tensor::TensorRef,
};

fn skip_reason(
    backend: BackendKind,
    config: &DispatchConfig,
    has_4bit: bool,
) -> Option<&'static str> {
    match backend {
        b if b.is_shader() && !config.enable_shader => Some("shaders disabled"),
        b if b.is_shader() && has_4bit => Some("4-bit operand"),
        BackendKind::Evis if config.evis == EvisVersion::None => Some("no EVIS support"),
        BackendKind::Sp if !config.support_stream_processor => Some("no stream processor"),
        _ => None,
    }
}

/// Dispatches on the highest priority backend that accepts the node.
pub fn select_and_dispatch(
    op: OperatorId,
    graph: &mut dyn GraphRuntime,
    inputs: &[TensorRef],
    outputs: &[TensorRef],
    params: &OpParams,
) -> Result<NodeId> {
    select_with(registry(), op, graph, inputs, outputs, params)
}

pub fn select_with(
    registry: &Registry,
    op: OperatorId,
    graph: &mut dyn GraphRuntime,
    inputs: &[TensorRef],
    outputs: &[TensorRef],
    params: &OpParams,
) -> Result<NodeId> {
    let config = graph.config().clone();
    let has_4bit = inputs
        .iter()
        .chain(outputs.iter())
        .any(|t| t.dtype().vx_type.bits() == 4);

    let mut last_err = None;
    for backend in config.priority.iter().map(|p| p.backend) {
        if let Some(reason) = skip_reason(backend, &config, has_4bit) {
            debug!("Skip {} for {}: {}", backend, op.name(), reason);
            continue;
        }
        if registry.kernels(op, backend).is_none() {
            continue;
        }
        match dispatch_with(registry, op, backend, graph, inputs, outputs, params) {
            Ok(node) => {
                debug!("{} dispatched on {}", op.name(), backend);
                return Ok(node);
            }
            Err(e) => {
                debug!("{} rejected by {}: {}", op.name(), backend, e);
                last_err = Some(e);
            }
        }
    }
    warn!("No valid kernel for {}", op.name());
    Err(last_err.unwrap_or_else(|| no_kernel(op, BackendKind::Cpu, inputs, outputs, None)))
}
