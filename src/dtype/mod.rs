use std::fmt;

use crate::error::{Result, VxError};

mod codec;
mod raw;

pub use codec::{
    affine_to_fp32, bfp16_to_fp32, dfp_to_fp32, dtype_to_float32, float32_to_dtype,
    fp16_to_fp32, fp32_to_affine, fp32_to_bfp16, fp32_to_bfp16_rtne, fp32_to_dfp,
    fp32_to_fp16, integer_convert, rint,
};
pub(crate) use codec::check_convertible;
pub use raw::{
    dtype_convert_float32_to_raw_data, dtype_convert_raw_data, dtype_convert_raw_data_to_float32,
};

/// Storage type tag of a tensor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
    BFloat16,
    Bool8,
    Int4,
    Uint4,
}

impl DataType {
    /// Bytes per element. Sub-byte types have no byte width.
    pub fn bytes(self) -> Result<usize> {
        match self {
            DataType::Int8 | DataType::Uint8 | DataType::Bool8 => Ok(1),
            DataType::Int16 | DataType::Uint16 | DataType::Float16 | DataType::BFloat16 => Ok(2),
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => Ok(4),
            DataType::Int64 | DataType::Uint64 | DataType::Float64 => Ok(8),
            DataType::Int4 | DataType::Uint4 => Err(VxError::UnknownType(self)),
        }
    }

    pub fn bits(self) -> usize {
        match self {
            DataType::Int4 | DataType::Uint4 => 4,
            other => other.bytes().map(|b| b * 8).unwrap_or(0),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Uint8
                | DataType::Uint16
                | DataType::Uint32
                | DataType::Uint64
                | DataType::Bool8
                | DataType::Int4
                | DataType::Uint4
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Int4
                | DataType::Float16
                | DataType::Float32
                | DataType::Float64
                | DataType::BFloat16
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::BFloat16
        )
    }

    /// Value bits excluding the sign bit.
    pub fn bit_width(self) -> Result<u32> {
        let bits = (self.bytes()? * 8) as u32;
        Ok(if self.is_signed() { bits - 1 } else { bits })
    }

    /// Representable `(min, max)` of an integer type. Floats have no clamp range.
    pub fn range(self) -> Option<(f64, f64)> {
        if !self.is_integer() {
            return None;
        }
        let bits = self.bits() as i32;
        if self.is_signed() {
            let half = 2f64.powi(bits - 1);
            Some((-half, half - 1.0))
        } else {
            Some((0.0, 2f64.powi(bits) - 1.0))
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Int8 => "i8",
            DataType::Int16 => "i16",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::Uint8 => "u8",
            DataType::Uint16 => "u16",
            DataType::Uint32 => "u32",
            DataType::Uint64 => "u64",
            DataType::Float16 => "f16",
            DataType::Float32 => "f32",
            DataType::Float64 => "f64",
            DataType::BFloat16 => "bf16",
            DataType::Bool8 => "bool8",
            DataType::Int4 => "i4",
            DataType::Uint4 => "u4",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuantType {
    None,
    /// Dynamic fixed point: `real = stored / 2^fl`.
    Dfp { fl: i8 },
    /// `real = (stored - zero_point) * scale`.
    AffineAsymmetric { scale: f32, zero_point: i32 },
    AffinePerChannel {
        scales: Vec<f32>,
        zero_points: Vec<i32>,
        channel_dim: usize,
    },
}

impl QuantType {
    pub fn name(&self) -> &'static str {
        match self {
            QuantType::None => "none",
            QuantType::Dfp { .. } => "dfp",
            QuantType::AffineAsymmetric { .. } => "affine_asymmetric",
            QuantType::AffinePerChannel { .. } => "affine_per_channel",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DType {
    pub vx_type: DataType,
    pub qnt: QuantType,
}

impl DType {
    pub fn new(vx_type: DataType) -> Self {
        DType {
            vx_type,
            qnt: QuantType::None,
        }
    }

    pub fn dfp(vx_type: DataType, fl: i8) -> Self {
        DType {
            vx_type,
            qnt: QuantType::Dfp { fl },
        }
    }

    pub fn affine(vx_type: DataType, scale: f32, zero_point: i32) -> Self {
        DType {
            vx_type,
            qnt: QuantType::AffineAsymmetric { scale, zero_point },
        }
    }

    pub fn bytes(&self) -> Result<usize> {
        self.vx_type.bytes()
    }
}

impl From<DataType> for DType {
    fn from(vx_type: DataType) -> Self {
        DType::new(vx_type)
    }
}
