use std::sync::Arc;

use log::debug;
use num_traits::ToPrimitive;

use super::{factor, validate};
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

static SLOTS: [ParamSlot; 6] = [
    ParamSlot::input_tensor(),
    ParamSlot::output_tensor(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
];

struct OneHotCpu;

impl KernelSetup for OneHotCpu {
    fn validate(&self, inputs: &[TensorRef], outputs: &[TensorRef], params: &OpParams) -> Result<()> {
        validate(inputs, outputs, params.one_hot()?)
    }

    fn variant_key(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        _params: &OpParams,
        _limits: &ShapeLimits,
    ) -> Result<VariantKey> {
        host_convertible(OperatorId::OneHot, inputs, outputs)?;
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
        let p = params.one_hot()?;
        packer
            .tensor(&io.input_views[0])?
            .tensor(&io.output_views[0])?
            .i32(p.depth as i32)?
            .f32(p.on_value)?
            .f32(p.off_value)?
            .i32(p.axis)?;
        Ok(())
    }
}

struct OneHotExecutor;

impl KernelExecutor for OneHotExecutor {
    fn execute(&self, params: &[BoundParam]) -> Result<()> {
        let input = params.tensor(0)?;
        let output = params.tensor(1)?;
        let depth = params.i32(2)?;
        let on_value = params.f32(3)?;
        let off_value = params.f32(4)?;
        let (prefix, suffix) = factor(input.shape(), params.i32(5)?)?;
        debug!("one_hot prefix {} depth {} suffix {}", prefix, depth, suffix);

        let indices: Vec<Option<i32>> = input.read_f32()?.iter().map(|v| v.to_i32()).collect();
        let mut values = Vec::with_capacity(prefix * depth.max(0) as usize * suffix);
        for i in 0..prefix {
            for j in 0..depth {
                for k in 0..suffix {
                    let hit = indices[i * suffix + k] == Some(j);
                    values.push(if hit { on_value } else { off_value });
                }
            }
        }
        output.write_f32(&values)
    }
}

pub(crate) fn cpu_kernels() -> BackendKernels {
    BackendKernels::new(BackendKind::Cpu, &SLOTS, Arc::new(OneHotCpu), Arc::new(HostLifecycle))
        .with_executor(Arc::new(OneHotExecutor))
        .with_variants(vec![KernelVariant::host(OperatorId::OneHot)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dtype::{DType, DataType},
        graph::ScalarValue,
        tensor::{Tensor, TensorAttr},
    };

    #[test]
    fn depth_is_inserted_at_axis() {
        let input = Tensor::from_f32(TensorAttr::new(&[2, 2], DType::new(DataType::Int32)), &[0., 1., 1., 0.])
            .unwrap();
        let output = Tensor::new(TensorAttr::new(&[2, 2, 2], DType::new(DataType::Float32))).unwrap();
        let params = vec![
            BoundParam::Tensor(input),
            BoundParam::Tensor(output.clone()),
            BoundParam::Scalar(ScalarValue::I32(2)),
            BoundParam::Scalar(ScalarValue::F32(1.0)),
            BoundParam::Scalar(ScalarValue::F32(0.0)),
            BoundParam::Scalar(ScalarValue::I32(1)),
        ];
        OneHotExecutor.execute(&params).unwrap();
        // prefix 2, suffix 2: each depth row holds both suffix positions
        assert_eq!(
            output.read_f32().unwrap(),
            vec![1., 0., 0., 1., 0., 1., 1., 0.]
        );
    }
}
