//! Operators and the kernel tables each backend offers for them.

use crate::{
    dtype::{check_convertible, DType, QuantType},
    error::{Result, VxError},
    kernel::{BackendKind, DpInstruction, DpType, OperatorId, Registry},
    tensor::TensorRef,
};

mod one_hot;
mod sequence_mask;
mod signal_frame;

pub use one_hot::OneHotParams;
pub use sequence_mask::SequenceMaskParams;
pub use signal_frame::SignalFrameParams;

/// Packs the low byte of each 32-bit lane into eight bytes.
pub(crate) const UNI_EXTRACT_8DATA_2X8: DpInstruction = DpInstruction::new(
    [
        0x33333333, 0x11110000, 0x03020100, 0x03020100, 0x00000000, 0x00000000, 0x00000000,
        0x00002400, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    DpType::Type16,
);

/// Every operator's tables, in registration order.
pub fn build_registry() -> Registry {
    Registry::builder()
        .register(OperatorId::OneHot, one_hot::evis_kernels())
        .register(OperatorId::OneHot, one_hot::cpu_kernels())
        .register(OperatorId::SequenceMask, sequence_mask::evis_kernels())
        .register(OperatorId::SequenceMask, sequence_mask::cpu_kernels())
        .register(OperatorId::SignalFrame, signal_frame::evis_kernels())
        .register(OperatorId::SignalFrame, signal_frame::cpu_kernels())
        .build()
}

pub(crate) fn expect_io(op: OperatorId, inputs: &[TensorRef], outputs: &[TensorRef]) -> Result<()> {
    if inputs.len() != 1 || outputs.len() != 1 {
        return Err(VxError::invalid(
            op.name(),
            format!("takes 1 input and 1 output, got {} and {}", inputs.len(), outputs.len()),
        ));
    }
    Ok(())
}

/// Host kernels go through f32, so every operand must convert to and from it.
pub(crate) fn host_convertible(op: OperatorId, inputs: &[TensorRef], outputs: &[TensorRef]) -> Result<()> {
    inputs
        .iter()
        .chain(outputs.iter())
        .try_for_each(|t| check_convertible(t.dtype()))
        .map_err(|e| {
            log::debug!("{} on {}: {}", op.name(), BackendKind::Cpu, e);
            crate::dispatch::no_kernel(op, BackendKind::Cpu, inputs, outputs, None)
        })
}

/// Fractional length of a DFP dtype, zero for anything else.
pub(crate) fn dfp_fl(dtype: &DType) -> i32 {
    match dtype.qnt {
        QuantType::Dfp { fl } => i32::from(fl),
        _ => 0,
    }
}

/// Real value of one stored step and the stored value of zero.
pub(crate) fn scale_zero_point(dtype: &DType) -> (f32, i32) {
    match dtype.qnt {
        QuantType::AffineAsymmetric { scale, zero_point } => (scale, zero_point),
        QuantType::Dfp { fl } => (2f32.powi(-i32::from(fl)), 0),
        _ => (1.0, 0),
    }
}

pub(crate) fn ceil_div(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;

    #[test]
    fn quant_parameters() {
        assert_eq!(dfp_fl(&DType::dfp(DataType::Int8, 3)), 3);
        assert_eq!(dfp_fl(&DType::affine(DataType::Uint8, 0.5, 3)), 0);
        assert_eq!(scale_zero_point(&DType::dfp(DataType::Int16, 2)), (0.25, 0));
        assert_eq!(scale_zero_point(&DType::dfp(DataType::Int16, -1)), (2.0, 0));
        assert_eq!(scale_zero_point(&DType::affine(DataType::Uint8, 0.5, 3)), (0.5, 3));
        assert_eq!(scale_zero_point(&DType::new(DataType::Float16)), (1.0, 0));
    }

    #[test]
    fn every_operator_has_a_host_table() {
        let registry = build_registry();
        for op in [OperatorId::OneHot, OperatorId::SequenceMask, OperatorId::SignalFrame].iter() {
            assert!(registry.kernels(*op, BackendKind::Cpu).is_some());
            assert!(registry.kernels(*op, BackendKind::Evis).is_some());
        }
    }
}
