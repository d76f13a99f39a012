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
pub struct OneHotParams {
    pub depth: usize,
    pub on_value: f32,
    pub off_value: f32,
    /// Counted from the outermost dim; `-1` appends the depth innermost.
    pub axis: i32,
}

impl OneHotParams {
    pub fn new(depth: usize, axis: i32) -> Self {
        OneHotParams {
            depth,
            on_value: 1.0,
            off_value: 0.0,
            axis,
        }
    }

    pub fn with_values(mut self, on_value: f32, off_value: f32) -> Self {
        self.on_value = on_value;
        self.off_value = off_value;
        self
    }
}

/// Splits the input into `prefix × suffix` around the inserted depth dim.
pub(crate) fn factor(shape: &[usize], axis: i32) -> Result<(usize, usize)> {
    let rank = shape.len();
    let split = match axis {
        -1 => rank,
        a if a >= 0 && (a as usize) <= rank => rank - a as usize,
        a => {
            return Err(VxError::invalid(
                "axis",
                format!("{} is outside [-1, {}]", a, rank),
            ))
        }
    };
    let prefix: usize = shape[..split].iter().product();
    let total: usize = shape.iter().product();
    Ok((prefix, total / prefix.max(1)))
}

pub(crate) fn validate(inputs: &[TensorRef], outputs: &[TensorRef], params: &OneHotParams) -> Result<()> {
    expect_io(OperatorId::OneHot, inputs, outputs)?;
    if params.depth == 0 {
        return Err(VxError::invalid("depth", "must be positive"));
    }
    factor(inputs[0].shape(), params.axis)?;
    let expected = inputs[0].element_num() * params.depth;
    if outputs[0].element_num() != expected {
        return Err(VxError::invalid(
            "output",
            format!(
                "holds {} elements, depth {} needs {}",
                outputs[0].element_num(),
                params.depth,
                expected
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factoring_follows_axis() {
        assert_eq!(factor(&[3], 0).unwrap(), (3, 1));
        assert_eq!(factor(&[4], -1).unwrap(), (4, 1));
        assert_eq!(factor(&[2, 3, 4], -1).unwrap(), (24, 1));
        assert_eq!(factor(&[2, 3, 4], 1).unwrap(), (6, 4));
        assert_eq!(factor(&[2, 3, 4], 3).unwrap(), (1, 24));
        assert!(factor(&[2, 3], 3).is_err());
        assert!(factor(&[2, 3], -2).is_err());
    }
}
