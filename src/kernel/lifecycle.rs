use super::{KernelConfig, ParamKind, ParamSlot, ParamState};
use crate::{
    error::{Result, VxError},
    graph::BoundParam,
};

/// Checks bound arguments against a kernel's declared slot layout.
pub fn check_bound_params(kernel: &str, slots: &[ParamSlot], params: &[BoundParam]) -> Result<()> {
    let mismatch = |index: usize, reason: String| VxError::ParamSlotMismatch {
        kernel: kernel.to_string(),
        index,
        reason,
    };
    if params.len() > slots.len() {
        return Err(mismatch(
            slots.len(),
            format!("{} params for {} slots", params.len(), slots.len()),
        ));
    }
    for (index, slot) in slots.iter().enumerate() {
        match (params.get(index), slot.kind) {
            (None, _) if slot.state == ParamState::Optional => {}
            (None, _) => return Err(mismatch(index, "required slot is empty".to_string())),
            (Some(BoundParam::Tensor(_)), ParamKind::Tensor)
            | (Some(BoundParam::Scalar(_)), ParamKind::Scalar) => {}
            (Some(p), kind) => {
                return Err(mismatch(
                    index,
                    format!("expected {:?}, got {}", kind, p.kind_name()),
                ))
            }
        }
    }
    Ok(())
}

/// Per-backend hooks run when a node's parameters are bound and released.
pub trait KernelLifecycle: Send + Sync {
    fn validate(&self, kernel: &str, slots: &[ParamSlot], params: &[BoundParam]) -> Result<()> {
        check_bound_params(kernel, slots, params)
    }

    fn initialize(&self, params: &[BoundParam]) -> Result<KernelConfig>;

    fn deinitialize(&self, config: &mut KernelConfig) {
        config.gpu = None;
        config.uniforms.clear();
    }
}

/// Host kernels need no launch configuration.
pub struct HostLifecycle;

impl KernelLifecycle for HostLifecycle {
    fn initialize(&self, _params: &[BoundParam]) -> Result<KernelConfig> {
        Ok(KernelConfig::default())
    }
}

/// Computes a node's outputs from its bound parameters on the host.
pub trait KernelExecutor: Send + Sync {
    fn execute(&self, params: &[BoundParam]) -> Result<()>;
}
