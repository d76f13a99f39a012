use std::sync::Arc;

use super::{split_axis, validate};
use crate::{
    dispatch::{BoundIo, KernelSetup, OpParams, ShapePlan},
    dtype::{float32_to_dtype, DataType},
    error::Result,
    graph::{BorderConstant, BorderMode, BoundParam, BoundParams},
    kernel::{
        BackendKernels, BackendKind, GpuParam, KernelConfig, KernelDtype, KernelLifecycle,
        KernelVariant, OperatorId, ParamSlot, VariantKey,
    },
    ops::ceil_div,
    pack::ParamPacker,
    shape::{gpu_check_shape, ShapeLimits},
    tensor::TensorRef,
};

const SOURCE: &str = "signal_frame";

static SLOTS: [ParamSlot; 3] = [
    ParamSlot::input_tensor(),
    ParamSlot::output_tensor(),
    ParamSlot::scalar(),
];

const TYPES: [KernelDtype; 5] = [
    KernelDtype::I16,
    KernelDtype::F16,
    KernelDtype::BF16,
    KernelDtype::U8,
    KernelDtype::I8,
];

fn variants() -> Vec<KernelVariant> {
    TYPES
        .iter()
        .map(|&t| KernelVariant::shader(BackendKind::Evis, OperatorId::SignalFrame, t, t, false, SOURCE))
        .collect()
}

struct SignalFrameEvis;

impl KernelSetup for SignalFrameEvis {
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
        Ok(VariantKey::new(
            KernelDtype::map(inputs[0].dtype().vx_type),
            KernelDtype::map(outputs[0].dtype().vx_type),
            false,
        ))
    }

    fn optimize_shapes(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        params: &OpParams,
        limits: &ShapeLimits,
    ) -> Result<ShapePlan> {
        let p = params.signal_frame()?;
        let (inner, len, outer) = split_axis(inputs[0].shape(), p.axis);
        let frames = outputs[0].shape()[p.axis + 1];
        let framed = vec![inner, p.frame_length, frames, outer];
        if !gpu_check_shape(&framed, limits) {
            return Err(limits.not_optimizable(&framed));
        }
        Ok(ShapePlan::reshaped(vec![vec![inner, len, 1, outer]], vec![framed]))
    }

    fn pack(&self, packer: &mut ParamPacker<'_, '_>, io: &BoundIo<'_>, params: &OpParams) -> Result<()> {
        let p = params.signal_frame()?;
        packer
            .tensor(&io.input_views[0])?
            .tensor(&io.output_views[0])?
            .i32(p.frame_step as i32)?;
        Ok(())
    }

    /// Frames running past the end read the constant border.
    fn border(&self, io: &BoundIo<'_>, params: &OpParams) -> Result<BorderMode> {
        let p = params.signal_frame()?;
        if !p.pad_end {
            return Ok(BorderMode::Undefined);
        }
        let dtype = io.outputs[0].dtype();
        let mut raw = [0u8; 4];
        let bytes = dtype.bytes()?;
        float32_to_dtype(p.pad_val, &mut raw[..bytes.min(4)], dtype)?;
        let constant = match bytes {
            1 => BorderConstant::U8(raw[0]),
            4 => BorderConstant::U32(u32::from_le_bytes(raw)),
            _ => BorderConstant::U16(u16::from_le_bytes([raw[0], raw[1]])),
        };
        Ok(BorderMode::Constant(constant))
    }
}

struct SignalFrameInitializer;

impl KernelLifecycle for SignalFrameInitializer {
    fn initialize(&self, params: &[BoundParam]) -> Result<KernelConfig> {
        let output = params.tensor(1)?;
        let shape = output.shape();
        let width = match output.dtype().vx_type {
            DataType::Float16 | DataType::Int16 | DataType::Uint16 | DataType::BFloat16 => 8,
            _ => 16,
        };
        let mut gpu = GpuParam::new(3, [width, 1, 1]);
        gpu.global_size = [
            ceil_div(shape[0], width),
            shape.get(1).copied().unwrap_or(1),
            shape.get(2).copied().unwrap_or(1),
        ];
        Ok(KernelConfig {
            gpu: Some(gpu),
            ..KernelConfig::default()
        })
    }
}

pub(crate) fn evis_kernels() -> BackendKernels {
    BackendKernels::new(
        BackendKind::Evis,
        &SLOTS,
        Arc::new(SignalFrameEvis),
        Arc::new(SignalFrameInitializer),
    )
    .with_variants(variants())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dtype::DType,
        graph::ScalarValue,
        tensor::{Tensor, TensorAttr},
    };

    #[test]
    fn only_same_type_pairs() {
        let rows = variants();
        assert_eq!(rows.len(), TYPES.len());
        assert!(rows
            .iter()
            .all(|v| matches!(v.key.decode(), Some((i, o, false)) if i == o)));
        assert_eq!(
            rows[0].kernel_name,
            "com.vivantecorp.extension.evis.signal_frame_I16toI16"
        );
    }

    #[test]
    fn half_width_types_use_narrow_vectors() {
        let input = Tensor::new(TensorAttr::new(&[2, 10, 1, 1], DType::new(DataType::Float16))).unwrap();
        let output = Tensor::new(TensorAttr::new(&[2, 4, 4, 1], DType::new(DataType::Float16))).unwrap();
        let params = vec![
            BoundParam::Tensor(input),
            BoundParam::Tensor(output),
            BoundParam::Scalar(ScalarValue::I32(2)),
        ];
        let gpu = SignalFrameInitializer.initialize(&params).unwrap().gpu.unwrap();
        assert_eq!(gpu.global_scale, [8, 1, 1]);
        assert_eq!(gpu.global_size, [1, 4, 4]);
    }
}
