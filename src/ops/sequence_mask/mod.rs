use crate::{
    error::{Result, VxError},
    kernel::OperatorId,
    ops::expect_io,
    tensor::TensorRef,
};

mod cpu;
mod evis;

pub(super) use cpu::cpu_kernels;
pub(super) use evis::evis_kernels;

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMaskParams {
    pub max_len: usize,
}

pub(crate) fn validate(inputs: &[TensorRef], outputs: &[TensorRef], params: &SequenceMaskParams) -> Result<()> {
    expect_io(OperatorId::SequenceMask, inputs, outputs)?;
    if params.max_len == 0 {
        return Err(VxError::invalid("max_len", "must be positive"));
    }
    let expected = inputs[0].element_num() * params.max_len;
    if outputs[0].element_num() != expected {
        return Err(VxError::invalid(
            "output",
            format!(
                "holds {} elements, {} lengths of {} need {}",
                outputs[0].element_num(),
                inputs[0].element_num(),
                params.max_len,
                expected
            ),
        ));
    }
    Ok(())
}
