use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    dtype::DataType,
    kernel::{BackendKind, KernelDtype, OperatorId},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VxError {
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error(
        "No {backend:?} kernel for {operator:?} with {input:?} -> {output:?} (image_2d: {image_2d})"
    )]
    UnsupportedDtypeCombination {
        operator: OperatorId,
        backend: BackendKind,
        input: KernelDtype,
        output: KernelDtype,
        image_2d: bool,
    },
    #[error("Shape {shape:?} does not fit rank {max_rank} with extent limit {max_extent}")]
    ShapeNotOptimizable {
        shape: Vec<usize>,
        max_rank: usize,
        max_extent: usize,
    },
    #[error("Backend call {call} failed: {reason}")]
    BackendResourceExhausted { call: &'static str, reason: String },
    #[error("No conversion from {from:?} to {to:?}")]
    UnsupportedConversion { from: DataType, to: DataType },
    #[error("Quantization {quant} cannot be applied to a scalar of {dtype:?}")]
    UnsupportedQuantization { dtype: DataType, quant: &'static str },
    #[error("Type {0:?} has no byte width")]
    UnknownType(DataType),
    #[error("Cannot reshape {from:?} into {to:?}")]
    ElementCountMismatch { from: Vec<usize>, to: Vec<usize> },
    #[error("Axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },
    #[error("Buffer holds {got} bytes but {needed} are required")]
    BufferTooSmall { needed: usize, got: usize },
    #[error("Kernel {kernel} param {index}: {reason}")]
    ParamSlotMismatch {
        kernel: String,
        index: usize,
        reason: String,
    },
    #[error("Kernel {0} has no host executor")]
    NotExecutable(String),
    #[error("Storage of tensor {0} is poisoned")]
    StoragePoisoned(Uuid),
}

pub type Result<T> = std::result::Result<T, VxError>;

impl VxError {
    pub(crate) fn invalid<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        VxError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// A value that saturated at the edge of its storage type during quantization.
///
/// Saturation mirrors what the hardware does, so it is reported next to a
/// successful conversion instead of failing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionOverflow {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub dtype: DataType,
}

impl fmt::Display for ConversionOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saturated to [{}, {}] for {:?}",
            self.value, self.min, self.max, self.dtype
        )
    }
}
