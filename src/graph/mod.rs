use std::{fmt, sync::Arc};

use uuid::Uuid;

use crate::{
    config::DispatchConfig,
    dtype::DataType,
    error::{Result, VxError},
    kernel::{BackendKind, KernelExecutor, KernelLifecycle, OperatorId, ParamSlot},
    tensor::{TensorId, TensorRef},
};

mod host;

pub use host::{HostGraph, HostNode};

pub type NodeId = Uuid;
pub type ScalarId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    I32(i32),
    U32(u32),
    F32(f32),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::I32(_) => DataType::Int32,
            ScalarValue::U32(_) => DataType::Uint32,
            ScalarValue::F32(_) => DataType::Float32,
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        match self {
            ScalarValue::I32(v) => v.to_le_bytes(),
            ScalarValue::U32(v) => v.to_le_bytes(),
            ScalarValue::F32(v) => v.to_le_bytes(),
        }
    }
}

/// An argument as handed to the runtime: tensors directly, scalars by handle.
#[derive(Debug, Clone)]
pub enum NodeParam {
    Tensor(TensorRef),
    Scalar(ScalarId),
}

/// An argument as seen by a kernel once its handles are resolved.
#[derive(Debug, Clone)]
pub enum BoundParam {
    Tensor(TensorRef),
    Scalar(ScalarValue),
}

impl BoundParam {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BoundParam::Tensor(_) => "tensor",
            BoundParam::Scalar(_) => "scalar",
        }
    }
}

fn bound_mismatch(index: usize, expected: &str, got: &BoundParam) -> VxError {
    VxError::ParamSlotMismatch {
        kernel: String::new(),
        index,
        reason: format!("expected {}, got {}", expected, got.kind_name()),
    }
}

fn bound_at(params: &[BoundParam], index: usize) -> Result<&BoundParam> {
    params.get(index).ok_or_else(|| VxError::ParamSlotMismatch {
        kernel: String::new(),
        index,
        reason: "missing".to_string(),
    })
}

/// Positional accessors used by kernel initializers and executors.
pub trait BoundParams {
    fn tensor(&self, index: usize) -> Result<&TensorRef>;
    fn i32(&self, index: usize) -> Result<i32>;
    fn u32(&self, index: usize) -> Result<u32>;
    fn f32(&self, index: usize) -> Result<f32>;
}

impl BoundParams for [BoundParam] {
    fn tensor(&self, index: usize) -> Result<&TensorRef> {
        match bound_at(self, index)? {
            BoundParam::Tensor(t) => Ok(t),
            other => Err(bound_mismatch(index, "tensor", other)),
        }
    }

    fn i32(&self, index: usize) -> Result<i32> {
        match bound_at(self, index)? {
            BoundParam::Scalar(ScalarValue::I32(v)) => Ok(*v),
            other => Err(bound_mismatch(index, "i32 scalar", other)),
        }
    }

    fn u32(&self, index: usize) -> Result<u32> {
        match bound_at(self, index)? {
            BoundParam::Scalar(ScalarValue::U32(v)) => Ok(*v),
            other => Err(bound_mismatch(index, "u32 scalar", other)),
        }
    }

    fn f32(&self, index: usize) -> Result<f32> {
        match bound_at(self, index)? {
            BoundParam::Scalar(ScalarValue::F32(v)) => Ok(*v),
            other => Err(bound_mismatch(index, "f32 scalar", other)),
        }
    }
}

/// Border fill value already encoded in the output's storage width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderConstant {
    U8(u8),
    U16(u16),
    U32(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderMode {
    Undefined,
    Constant(BorderConstant),
}

impl Default for BorderMode {
    fn default() -> Self {
        BorderMode::Undefined
    }
}

/// Everything the runtime needs to instantiate one kernel.
#[derive(Clone)]
pub struct KernelDescriptor {
    pub operator: OperatorId,
    pub backend: BackendKind,
    pub kernel_name: String,
    pub source_name: Option<&'static str>,
    pub slots: &'static [ParamSlot],
    pub lifecycle: Arc<dyn KernelLifecycle>,
    pub executor: Option<Arc<dyn KernelExecutor>>,
}

impl fmt::Debug for KernelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelDescriptor")
            .field("operator", &self.operator)
            .field("backend", &self.backend)
            .field("kernel_name", &self.kernel_name)
            .field("source_name", &self.source_name)
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// The graph runtime a dispatch call creates nodes in.
///
/// Every view and scalar handle created here must be released exactly once.
pub trait GraphRuntime {
    fn config(&self) -> &DispatchConfig;

    fn create_node(&mut self, descriptor: KernelDescriptor) -> Result<NodeId>;

    fn pass_params(&mut self, node: NodeId, params: &[NodeParam]) -> Result<()>;

    fn set_border_mode(&mut self, node: NodeId, mode: BorderMode) -> Result<()>;

    /// Same storage as `tensor`, described by `shape`.
    fn create_tensor_view(&mut self, tensor: &TensorRef, shape: &[usize]) -> Result<TensorRef>;

    fn release_tensor_view(&mut self, view: TensorId);

    fn create_scalar(&mut self, value: ScalarValue) -> Result<ScalarId>;

    fn release_scalar(&mut self, scalar: ScalarId);

    /// Drops a node that was created but never committed.
    fn remove_node(&mut self, node: NodeId);
}
