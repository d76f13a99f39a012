use std::sync::Arc;

use super::validate;
use crate::{
    dispatch::{BoundIo, KernelSetup, OpParams, ShapePlan},
    error::Result,
    graph::{BoundParam, BoundParams},
    kernel::{
        align_p2, BackendKernels, BackendKind, DpInstruction, DpType, GpuParam, KernelConfig,
        KernelDtype, KernelLifecycle, KernelVariant, OperatorId, ParamSlot, VariantKey,
    },
    ops::{ceil_div, scale_zero_point, UNI_EXTRACT_8DATA_2X8},
    pack::ParamPacker,
    shape::{gpu_check_shape, optimize_element_shape, ShapeLimits},
    tensor::TensorRef,
};

const SOURCE: &str = "sequence_mask";

static SLOTS: [ParamSlot; 3] = [
    ParamSlot::input_tensor(),
    ParamSlot::output_tensor(),
    ParamSlot::scalar(),
];

const TABLE: &[(KernelDtype, KernelDtype)] = &[
    (KernelDtype::U8, KernelDtype::U8),
    (KernelDtype::I8, KernelDtype::I8),
    (KernelDtype::I16, KernelDtype::I16),
    (KernelDtype::F16, KernelDtype::F16),
    (KernelDtype::I16, KernelDtype::U8),
    (KernelDtype::I8, KernelDtype::U8),
    (KernelDtype::F16, KernelDtype::U8),
];

fn variants() -> Vec<KernelVariant> {
    TABLE
        .iter()
        .flat_map(|&(i, o)| vec![(i, o, false), (i, o, true)])
        .map(|(i, o, is_2d)| {
            KernelVariant::shader(BackendKind::Evis, OperatorId::SequenceMask, i, o, is_2d, SOURCE)
        })
        .collect()
}

/// The lengths flattened to 2D, and the mask with `max_len` prepended.
fn mask_shapes(input: &[usize], max_len: usize, limits: &ShapeLimits) -> Result<(Vec<usize>, Vec<usize>)> {
    let lengths = optimize_element_shape(input, limits)?;
    if lengths.len() > 2 {
        return Err(limits.not_optimizable(input));
    }
    let mut mask = vec![1; 4];
    mask[0] = max_len;
    mask[1..=lengths.len()].copy_from_slice(&lengths);
    Ok((lengths, mask))
}

struct SequenceMaskEvis;

impl KernelSetup for SequenceMaskEvis {
    fn validate(&self, inputs: &[TensorRef], outputs: &[TensorRef], params: &OpParams) -> Result<()> {
        validate(inputs, outputs, params.sequence_mask()?)
    }

    fn variant_key(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        params: &OpParams,
        limits: &ShapeLimits,
    ) -> Result<VariantKey> {
        let p = params.sequence_mask()?;
        let input = KernelDtype::map(inputs[0].dtype().vx_type);
        let output = match KernelDtype::map(outputs[0].dtype().vx_type) {
            KernelDtype::BOOL8 => KernelDtype::U8,
            other => other,
        };
        let (_, mask) = mask_shapes(inputs[0].shape(), p.max_len, limits)?;
        Ok(VariantKey::new(input, output, mask[2] == 1))
    }

    fn optimize_shapes(
        &self,
        inputs: &[TensorRef],
        outputs: &[TensorRef],
        params: &OpParams,
        limits: &ShapeLimits,
    ) -> Result<ShapePlan> {
        let p = params.sequence_mask()?;
        if !gpu_check_shape(outputs[0].shape(), limits) {
            return Err(limits.not_optimizable(outputs[0].shape()));
        }
        let (lengths, mask) = mask_shapes(inputs[0].shape(), p.max_len, limits)?;
        Ok(ShapePlan::reshaped(vec![lengths], vec![mask]))
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

const UNI_CONVERT_1ST_UINT8_SUB_ZP_TO_FP32_4X4: DpInstruction = DpInstruction::new(
    [
        0x05050505, 0x04040404, 0x00010000, 0x00030002, 0x0a0a0a0a, 0x00000000, 0x00000000,
        0x00000400, 0xffff0001, 0x00000000, 0xffff0001, 0x00000000, 0xffff0001, 0x00000000,
        0xffff0001, 0x00000000,
    ],
    DpType::Type16,
);

const UNI_FP16_TO_FP32_LO4_DP4X4: DpInstruction = DpInstruction::new(
    [
        0x01010101, 0x00000000, 0x00010000, 0x00030002, 0x02020202, 0x00000000, 0x00000000,
        0x00000100, 0x00003c00, 0x00000000, 0x00003c00, 0x00000000, 0x00003c00, 0x00000000,
        0x00003c00, 0x00000000,
    ],
    DpType::Type16,
);

struct SequenceMaskInitializer;

impl KernelLifecycle for SequenceMaskInitializer {
    fn initialize(&self, params: &[BoundParam]) -> Result<KernelConfig> {
        let input = params.tensor(0)?;
        let output = params.tensor(1)?;
        let out_shape = output.shape();

        let (input_scale, input_zp) = scale_zero_point(input.dtype());
        let (output_scale, output_zp) = scale_zero_point(output.dtype());
        let output_one = 1.0 / output_scale + output_zp as f32;

        let mut gpu = GpuParam::new(3, [4, 1, 1]);
        gpu.global_size = [
            align_p2(ceil_div(out_shape[0], 4), 4),
            out_shape.get(1).copied().unwrap_or(1),
            out_shape.get(2).copied().unwrap_or(1),
        ];

        let mut config = KernelConfig::default();
        let uniforms = &mut config.uniforms;
        uniforms.set_dp(
            "uniConvert1stUint8SubZpToFp32_4x4",
            UNI_CONVERT_1ST_UINT8_SUB_ZP_TO_FP32_4X4,
        );
        uniforms.set_dp("uniConvertInt32toUint8_2x8", UNI_EXTRACT_8DATA_2X8);
        uniforms.set_dp("UniFP16toFP32Lo4_dp4x4", UNI_FP16_TO_FP32_LO4_DP4X4);
        uniforms.set_i32("inputZP", input_zp);
        uniforms.set_f32("input_scale", input_scale);
        uniforms.set_i32("output_ZP", output_zp);
        uniforms.set_f32("outputVal1", output_one);
        config.gpu = Some(gpu);
        Ok(config)
    }
}

pub(crate) fn evis_kernels() -> BackendKernels {
    BackendKernels::new(
        BackendKind::Evis,
        &SLOTS,
        Arc::new(SequenceMaskEvis),
        Arc::new(SequenceMaskInitializer),
    )
    .with_variants(variants())
}
