use std::sync::Arc;

use super::{num_frames, split_axis, validate};
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

static SLOTS: [ParamSlot; 7] = [
    ParamSlot::input_tensor(),
    ParamSlot::output_tensor(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
];

struct SignalFrameCpu;

impl KernelSetup for SignalFrameCpu {
    fn validate(&self, inputs: &[TensorRef], outputs: &[TensorRef], params: &OpParams) -> Result<()> {
        validate(inputs, outputs, params.signal_frame()?)
    }

    fn variant_key(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        _params: &OpParams,
        _limits: &ShapeLimits,
    ) -> Result<VariantKey> {
        host_convertible(OperatorId::SignalFrame, inputs, outputs)?;
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
        let p = params.signal_frame()?;
        packer
            .tensor(&io.input_views[0])?
            .tensor(&io.output_views[0])?
            .i32(p.frame_length as i32)?
            .i32(p.frame_step as i32)?
            .i32(p.axis as i32)?
            .i32(p.pad_end as i32)?
            .f32(p.pad_val)?;
        Ok(())
    }
}

struct SignalFrameExecutor;

impl KernelExecutor for SignalFrameExecutor {
    fn execute(&self, params: &[BoundParam]) -> Result<()> {
        let input = params.tensor(0)?;
        let output = params.tensor(1)?;
        let frame_length = params.i32(2)?.max(0) as usize;
        let frame_step = params.i32(3)?.max(1) as usize;
        let axis = params.i32(4)?.max(0) as usize;
        let pad_end = params.i32(5)? != 0;
        let pad_val = params.f32(6)?;

        let samples = input.read_f32()?;
        let (inner, len, outer) = split_axis(input.shape(), axis);
        let frames = num_frames(len, frame_length, frame_step, pad_end);

        let mut out = Vec::with_capacity(outer * frames * frame_length * inner);
        for block in samples.chunks(len * inner).take(outer) {
            for j in 0..frames {
                for k in 0..frame_length {
                    let m = j * frame_step + k;
                    if m < len {
                        out.extend_from_slice(&block[m * inner..(m + 1) * inner]);
                    } else {
                        out.extend(std::iter::repeat(pad_val).take(inner));
                    }
                }
            }
        }
        output.write_f32(&out)
    }
}

pub(crate) fn cpu_kernels() -> BackendKernels {
    BackendKernels::new(
        BackendKind::Cpu,
        &SLOTS,
        Arc::new(SignalFrameCpu),
        Arc::new(HostLifecycle),
    )
    .with_executor(Arc::new(SignalFrameExecutor))
    .with_variants(vec![KernelVariant::host(OperatorId::SignalFrame)])
}
