use std::fmt;

use crate::dtype::DataType;

pub mod gpu;
mod lifecycle;
mod registry;

pub use gpu::{align_p2, DpInstruction, DpType, GpuParam, KernelConfig, UniformTable, UniformValue};
pub use lifecycle::{check_bound_params, HostLifecycle, KernelExecutor, KernelLifecycle};
pub use registry::{registry, BackendKernels, Registry, RegistryBuilder};

pub const KERNEL_NAMESPACE: &str = "com.vivantecorp.extension.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Cpu,
    Evis,
    Cl,
    Vx,
    /// Stream processor.
    Sp,
}

impl BackendKind {
    pub fn is_shader(self) -> bool {
        matches!(self, BackendKind::Evis | BackendKind::Cl)
    }

    pub fn prefix(self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Evis => "evis",
            BackendKind::Cl => "cl",
            BackendKind::Vx => "vx",
            BackendKind::Sp => "sp",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorId {
    OneHot,
    SequenceMask,
    SignalFrame,
}

impl OperatorId {
    pub fn name(self) -> &'static str {
        match self {
            OperatorId::OneHot => "one_hot",
            OperatorId::SequenceMask => "sequence_mask",
            OperatorId::SignalFrame => "signal_frame",
        }
    }
}

/// Dtype enumeration used in kernel keys and kernel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum KernelDtype {
    I8 = 0,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
    BF16,
    BOOL8,
    I4,
    U4,
}

impl KernelDtype {
    pub const COUNT: u32 = 15;

    pub const ALL: [KernelDtype; KernelDtype::COUNT as usize] = [
        KernelDtype::I8,
        KernelDtype::I16,
        KernelDtype::I32,
        KernelDtype::I64,
        KernelDtype::U8,
        KernelDtype::U16,
        KernelDtype::U32,
        KernelDtype::U64,
        KernelDtype::F16,
        KernelDtype::F32,
        KernelDtype::F64,
        KernelDtype::BF16,
        KernelDtype::BOOL8,
        KernelDtype::I4,
        KernelDtype::U4,
    ];

    pub fn map(vx_type: DataType) -> KernelDtype {
        match vx_type {
            DataType::Int8 => KernelDtype::I8,
            DataType::Int16 => KernelDtype::I16,
            DataType::Int32 => KernelDtype::I32,
            DataType::Int64 => KernelDtype::I64,
            DataType::Uint8 => KernelDtype::U8,
            DataType::Uint16 => KernelDtype::U16,
            DataType::Uint32 => KernelDtype::U32,
            DataType::Uint64 => KernelDtype::U64,
            DataType::Float16 => KernelDtype::F16,
            DataType::Float32 => KernelDtype::F32,
            DataType::Float64 => KernelDtype::F64,
            DataType::BFloat16 => KernelDtype::BF16,
            DataType::Bool8 => KernelDtype::BOOL8,
            DataType::Int4 => KernelDtype::I4,
            DataType::Uint4 => KernelDtype::U4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelDtype::I8 => "I8",
            KernelDtype::I16 => "I16",
            KernelDtype::I32 => "I32",
            KernelDtype::I64 => "I64",
            KernelDtype::U8 => "U8",
            KernelDtype::U16 => "U16",
            KernelDtype::U32 => "U32",
            KernelDtype::U64 => "U64",
            KernelDtype::F16 => "F16",
            KernelDtype::F32 => "F32",
            KernelDtype::F64 => "F64",
            KernelDtype::BF16 => "BF16",
            KernelDtype::BOOL8 => "BOOL8",
            KernelDtype::I4 => "I4",
            KernelDtype::U4 => "U4",
        }
    }
}

/// Width of one dtype field, derived from the enumeration size.
pub const DTYPE_FIELD_BITS: u32 = u32::BITS - (KernelDtype::COUNT - 1).leading_zeros();
pub const RANK_CLASS_BITS: u32 = 1;
pub const OUTPUT_DTYPE_SHIFT: u32 = RANK_CLASS_BITS;
pub const INPUT_DTYPE_SHIFT: u32 = OUTPUT_DTYPE_SHIFT + DTYPE_FIELD_BITS;

/// `(input << INPUT_DTYPE_SHIFT) | (output << OUTPUT_DTYPE_SHIFT) | image_2d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey(pub u32);

impl VariantKey {
    /// Key of the single variant in host (CPU) tables.
    pub const HOST: VariantKey = VariantKey(u32::MAX);

    pub fn new(input: KernelDtype, output: KernelDtype, image_2d: bool) -> Self {
        VariantKey(
            ((input as u32) << INPUT_DTYPE_SHIFT)
                | ((output as u32) << OUTPUT_DTYPE_SHIFT)
                | image_2d as u32,
        )
    }

    /// Splits a key back into its fields. The host key has none.
    pub fn decode(self) -> Option<(KernelDtype, KernelDtype, bool)> {
        if self == VariantKey::HOST {
            return None;
        }
        let mask = (1 << DTYPE_FIELD_BITS) - 1;
        let input = KernelDtype::ALL.get(((self.0 >> INPUT_DTYPE_SHIFT) & mask) as usize)?;
        let output = KernelDtype::ALL.get(((self.0 >> OUTPUT_DTYPE_SHIFT) & mask) as usize)?;
        Some((*input, *output, self.0 & 1 == 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Tensor,
    Scalar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamState {
    Required,
    Optional,
}

/// One positional argument of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlot {
    pub direction: ParamDirection,
    pub kind: ParamKind,
    pub state: ParamState,
}

impl ParamSlot {
    pub const fn input_tensor() -> Self {
        ParamSlot {
            direction: ParamDirection::Input,
            kind: ParamKind::Tensor,
            state: ParamState::Required,
        }
    }

    pub const fn output_tensor() -> Self {
        ParamSlot {
            direction: ParamDirection::Output,
            kind: ParamKind::Tensor,
            state: ParamState::Required,
        }
    }

    pub const fn scalar() -> Self {
        ParamSlot {
            direction: ParamDirection::Input,
            kind: ParamKind::Scalar,
            state: ParamState::Required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelVariant {
    pub key: VariantKey,
    pub kernel_name: String,
    /// Shader source file, absent for host kernels.
    pub source_name: Option<&'static str>,
}

impl KernelVariant {
    /// `com.vivantecorp.extension.evis.<op>_<IN>to<OUT>[_2D]`
    pub fn shader(
        backend: BackendKind,
        op: OperatorId,
        input: KernelDtype,
        output: KernelDtype,
        image_2d: bool,
        source: &'static str,
    ) -> Self {
        KernelVariant {
            key: VariantKey::new(input, output, image_2d),
            kernel_name: format!(
                "{}{}.{}_{}to{}{}",
                KERNEL_NAMESPACE,
                backend.prefix(),
                op.name(),
                input.name(),
                output.name(),
                if image_2d { "_2D" } else { "" }
            ),
            source_name: Some(source),
        }
    }

    pub fn host(op: OperatorId) -> Self {
        KernelVariant {
            key: VariantKey::HOST,
            kernel_name: format!("{}{}.{}", KERNEL_NAMESPACE, BackendKind::Cpu.prefix(), op.name()),
            source_name: None,
        }
    }
}
