use std::sync::Arc;

use super::{factor, validate};
use crate::{
    dispatch::{BoundIo, KernelSetup, OpParams, ShapePlan},
    dtype::{DataType, QuantType},
    error::{Result, VxError},
    graph::{BoundParam, BoundParams},
    kernel::{
        align_p2, BackendKernels, BackendKind, DpInstruction, DpType, GpuParam, KernelConfig,
        KernelDtype, KernelLifecycle, KernelVariant, OperatorId, ParamSlot, VariantKey,
    },
    ops::{ceil_div, dfp_fl, scale_zero_point, UNI_EXTRACT_8DATA_2X8},
    pack::ParamPacker,
    shape::{gpu_check_shape, ShapeLimits},
    tensor::TensorRef,
};

const SOURCE: &str = "one_hot";

static SLOTS: [ParamSlot; 5] = [
    ParamSlot::input_tensor(),
    ParamSlot::output_tensor(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
    ParamSlot::scalar(),
];

const TABLE_3D: &[(KernelDtype, KernelDtype)] = &[
    (KernelDtype::U8, KernelDtype::I8),
    (KernelDtype::U8, KernelDtype::U8),
    (KernelDtype::U8, KernelDtype::F16),
    (KernelDtype::U8, KernelDtype::I16),
    (KernelDtype::U8, KernelDtype::BF16),
    (KernelDtype::I8, KernelDtype::I8),
    (KernelDtype::I8, KernelDtype::F16),
    (KernelDtype::I16, KernelDtype::I8),
    (KernelDtype::I16, KernelDtype::U8),
    (KernelDtype::I16, KernelDtype::I16),
    (KernelDtype::I16, KernelDtype::F16),
    (KernelDtype::I16, KernelDtype::BF16),
    (KernelDtype::F16, KernelDtype::F16),
    (KernelDtype::F16, KernelDtype::I16),
    (KernelDtype::F16, KernelDtype::U8),
    (KernelDtype::F16, KernelDtype::I8),
    (KernelDtype::BF16, KernelDtype::BF16),
];

fn variants() -> Vec<KernelVariant> {
    let rows_3d = TABLE_3D.iter().map(|&(i, o)| (i, o, false));
    // No 2D kernel narrows I16 to I8.
    let rows_2d = TABLE_3D
        .iter()
        .filter(|&&row| row != (KernelDtype::I16, KernelDtype::I8))
        .map(|&(i, o)| (i, o, true));
    rows_3d
        .chain(rows_2d)
        .map(|(i, o, is_2d)| {
            KernelVariant::shader(BackendKind::Evis, OperatorId::OneHot, i, o, is_2d, SOURCE)
        })
        .collect()
}

/// Input and output views; the input shrinks to 2D when the suffix is 1.
fn view_shapes(prefix: usize, suffix: usize, depth: usize) -> (Vec<usize>, Vec<usize>) {
    if suffix == 1 {
        (vec![prefix, 1], vec![depth, prefix, 1])
    } else {
        (vec![suffix, prefix], vec![suffix, depth, prefix])
    }
}

struct OneHotEvis;

impl KernelSetup for OneHotEvis {
    fn validate(&self, inputs: &[TensorRef], outputs: &[TensorRef], params: &OpParams) -> Result<()> {
        validate(inputs, outputs, params.one_hot()?)
    }

    fn variant_key(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        params: &OpParams,
        _limits: &ShapeLimits,
    ) -> Result<VariantKey> {
        let p = params.one_hot()?;
        let in_dtype = inputs[0].dtype();
        let input = KernelDtype::map(in_dtype.vx_type);
        let output = KernelDtype::map(outputs[0].dtype().vx_type);
        if matches!(input, KernelDtype::I8 | KernelDtype::I16)
            && !matches!(in_dtype.qnt, QuantType::Dfp { .. } | QuantType::None)
        {
            return Err(VxError::UnsupportedQuantization {
                dtype: in_dtype.vx_type,
                quant: in_dtype.qnt.name(),
            });
        }
        let (_, suffix) = factor(inputs[0].shape(), p.axis)?;
        Ok(VariantKey::new(input, output, suffix == 1))
    }

    fn optimize_shapes(
        &self,
        inputs: &[TensorRef],
        _outputs: &[TensorRef],
        params: &OpParams,
        limits: &ShapeLimits,
    ) -> Result<ShapePlan> {
        let p = params.one_hot()?;
        let (prefix, suffix) = factor(inputs[0].shape(), p.axis)?;
        let (input, output) = view_shapes(prefix, suffix, p.depth);
        if !gpu_check_shape(&output, limits) {
            return Err(limits.not_optimizable(&output));
        }
        Ok(ShapePlan::reshaped(vec![input], vec![output]))
    }

    fn pack(&self, packer: &mut ParamPacker<'_, '_>, io: &BoundIo<'_>, params: &OpParams) -> Result<()> {
        let p = params.one_hot()?;
        let (_, suffix) = factor(io.inputs[0].shape(), p.axis)?;
        let out_dtype = io.outputs[0].dtype();
        packer
            .tensor(&io.input_views[0])?
            .tensor(&io.output_views[0])?
            .i32(suffix as i32)?
            .output_scalar(p.on_value, out_dtype)?
            .output_scalar(p.off_value, out_dtype)?;
        Ok(())
    }
}

const UNI_DATA_CONVERT_0_4X4: DpInstruction = DpInstruction::new(
    [
        0x01010101, 0x00000000, 0x00010000, 0x00030002, 0x02020202, 0x00000000, 0x00000000,
        0x00000600, 0x00000001, 0x00000000, 0x00000001, 0x00000000, 0x00000001, 0x00000000,
        0x00000001, 0x00000000,
    ],
    DpType::Type16,
);

const UNI_DATA_CONVERT_1_4X4: DpInstruction = DpInstruction::new(
    [
        0x01010101, 0x00000000, 0x00050004, 0x00070006, 0x02020202, 0x00000000, 0x00000000,
        0x00000600, 0x00000001, 0x00000000, 0x00000001, 0x00000000, 0x00000001, 0x00000000,
        0x00000001, 0x00000000,
    ],
    DpType::Type16,
);

const UNI_CONV_BF16_TO_F32_PART0_2X8: DpInstruction = DpInstruction::new(
    [
        0x11111111, 0x01010101, 0x01050004, 0x03070206, 0x22222222, 0x00000000, 0x00000000,
        0x00000600, 0x00000001, 0x00000001, 0x00000001, 0x00000001, 0x00000001, 0x00000001,
        0x00000001, 0x00000001,
    ],
    DpType::Type16,
);

const UNI_CONV_BF16_TO_F32_PART1_2X8: DpInstruction = DpInstruction::new(
    [
        0x11111111, 0x01010101, 0x05050404, 0x07070606, 0x22222222, 0x00000000, 0x00000000,
        0x00000600, 0x00000001, 0x00000001, 0x00000001, 0x00000001, 0x00000001, 0x00000001,
        0x00000001, 0x00000001,
    ],
    DpType::Type16,
);

struct OneHotInitializer;

impl KernelLifecycle for OneHotInitializer {
    fn initialize(&self, params: &[BoundParam]) -> Result<KernelConfig> {
        let input = params.tensor(0)?;
        let output = params.tensor(1)?;
        let suffix = params.i32(2)?;
        let in_shape = input.shape();
        let out_shape = output.shape();

        let (scale, depth) = if suffix == 1 {
            ([4, 1, 1], out_shape[0])
        } else {
            ([1, 1, 1], out_shape[1])
        };
        let mut gpu = GpuParam::new(2, scale);
        gpu.global_size[0] = align_p2(ceil_div(in_shape[0], scale[0]), 4);
        gpu.global_size[1] = in_shape.get(1).copied().unwrap_or(1);

        let mut config = KernelConfig::default();
        let uniforms = &mut config.uniforms;
        let in_dtype = input.dtype();
        match in_dtype.vx_type {
            DataType::Int16 | DataType::Int8 | DataType::Float16 => {
                let fl = dfp_fl(in_dtype);
                let mut convert_0 = UNI_DATA_CONVERT_0_4X4;
                let mut convert_1 = UNI_DATA_CONVERT_1_4X4;
                convert_0.update_postshift(fl);
                convert_1.update_postshift(fl);
                uniforms.set_dp("uniDataConvert_0_4x4", convert_0);
                uniforms.set_dp("uniDataConvert_1_4x4", convert_1);
                uniforms.set_dp("uniExtract8Data_2x8", UNI_EXTRACT_8DATA_2X8);
            }
            DataType::Uint8 => {
                // only asymmetric indices are rescaled
                let (input_scale, zero_point) = match in_dtype.qnt {
                    QuantType::AffineAsymmetric { .. } => scale_zero_point(in_dtype),
                    _ => (1.0, 0),
                };
                uniforms.set_dp("uniDataConvert_0_4x4", UNI_DATA_CONVERT_0_4X4);
                uniforms.set_dp("uniDataConvert_1_4x4", UNI_DATA_CONVERT_1_4X4);
                uniforms.set_dp("uniExtract8Data_2x8", UNI_EXTRACT_8DATA_2X8);
                uniforms.set_f32("input_scale", input_scale);
                uniforms.set_f32("input_tail", -(zero_point as f32) * input_scale);
            }
            DataType::BFloat16 => {
                uniforms.set_dp("uniConvBF16toF32_Part0_2x8", UNI_CONV_BF16_TO_F32_PART0_2X8);
                uniforms.set_dp("uniConvBF16toF32_Part1_2x8", UNI_CONV_BF16_TO_F32_PART1_2X8);
                uniforms.set_dp("uniExtract8Data_2x8", UNI_EXTRACT_8DATA_2X8);
            }
            other => {
                return Err(VxError::UnsupportedConversion {
                    from: other,
                    to: output.dtype().vx_type,
                })
            }
        }
        uniforms.set_i32("depth", depth as i32);
        config.gpu = Some(gpu);
        Ok(config)
    }
}

pub(crate) fn evis_kernels() -> BackendKernels {
    BackendKernels::new(
        BackendKind::Evis,
        &SLOTS,
        Arc::new(OneHotEvis),
        Arc::new(OneHotInitializer),
    )
    .with_variants(variants())
}
