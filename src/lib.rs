#[macro_use]
extern crate lazy_static;
extern crate ndarray;
extern crate num_traits;
extern crate thiserror;

use std::sync::Arc;

use crossbeam::sync::ShardedLock;

pub mod config;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod ops;
pub mod pack;
pub mod shape;
pub mod tensor;
#[cfg(test)]
mod tests;
pub mod utility;

type ArcLock<T> = Arc<ShardedLock<T>>;

pub use config::DispatchConfig;
pub use dispatch::{dispatch, select_and_dispatch, OpParams};
pub use dtype::{DType, DataType, QuantType};
pub use error::{ConversionOverflow, Result, VxError};
pub use graph::{GraphRuntime, HostGraph, NodeId};
pub use kernel::{BackendKind, KernelDtype, OperatorId, VariantKey};
pub use ops::{OneHotParams, SequenceMaskParams, SignalFrameParams};
pub use tensor::{Tensor, TensorAttr, TensorRef};
