use std::sync::Arc;

use num_traits::ToPrimitive;

use super::validate;
use crate::{
    dispatch::{BoundIo, KernelSetup, OpParams, ShapePlan},
    error::Result,
    graph::{BoundParam, BoundParams},
    kernel::{
        BackendKernels, BackendKind, HostLifecycle, KernelExecutor, KernelVariant, OperatorId,
        ParamSlot, VariantKey,
    },
    ops::host_convertible,
    pack::ParamPacker,
    shape::ShapeLimits,
    tensor::TensorRef,
};

static SLOTS: [ParamSlot; 3] = [
    ParamSlot::input_tensor(),
    ParamSlot::output_tensor(),
    ParamSlot::scalar(),
];

struct SequenceMaskCpu;

impl KernelSetup for SequenceMaskCpu {
    fn validate(&self, inputs: &[TensorRef], outputs: &[TensorRef], params: &OpParams) -> Result<()> {
        validate(inputs, outputs, params.sequence_mask()?)
    }

    fn variant_key(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        _params: &OpParams,
        _limits: &ShapeLimits,
    ) -> Result<VariantKey> {
        host_convertible(OperatorId::SequenceMask, inputs, outputs)?;
        Ok(VariantKey::HOST)
    }

    fn optimize_shapes(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        _params: &OpParams,
        _limits: &ShapeLimits,
    ) -> Result<ShapePlan> {
        Ok(ShapePlan::unchanged(inputs.len(), outputs.len()))
    }

    fn pack(&self, packer: &mut ParamPacker<'_, '_>, io: &BoundIo<'_>, params: &OpParams) -> Result<()> {
        let p = params.sequence_mask()?;
        packer
            .tensor(&io.input_views[0])?
            .tensor(&io.output_views[0])?
            .i32(p.max_len as i32)?;
        Ok(())
    }
}

struct SequenceMaskExecutor;

impl KernelExecutor for SequenceMaskExecutor {
    fn execute(&self, params: &[BoundParam]) -> Result<()> {
        let lengths = params.tensor(0)?.read_f32()?;
        let output = params.tensor(1)?;
        let max_len = params.i32(2)?.max(0) as usize;

        let mut mask = Vec::with_capacity(lengths.len() * max_len);
        for len in lengths {
            // Negative or NaN lengths mask everything.
            let len = len.to_usize().unwrap_or(0);
            mask.extend((0..max_len).map(|j| if j < len { 1.0 } else { 0.0 }));
        }
        output.write_f32(&mask)
    }
}

pub(crate) fn cpu_kernels() -> BackendKernels {
    BackendKernels::new(
        BackendKind::Cpu,
        &SLOTS,
        Arc::new(SequenceMaskCpu),
        Arc::new(HostLifecycle),
    )
    .with_executor(Arc::new(SequenceMaskExecutor))
    .with_variants(vec![KernelVariant::host(OperatorId::SequenceMask)])
}
