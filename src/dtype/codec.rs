use std::convert::TryInto;

use half::{bf16, f16};
use log::warn;

use super::{DType, DataType, QuantType};
use crate::error::{ConversionOverflow, Result, VxError};

/// Round half to even, the rounding mode of the hardware quantizers.
pub fn rint(x: f64) -> f64 {
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    }
}

pub fn fp32_to_fp16(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}

pub fn fp16_to_fp32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Truncating bf16 encoder: keeps the top half of the f32 bit pattern.
pub fn fp32_to_bfp16(value: f32) -> u16 {
    (value.to_bits() >> 16) as u16
}

pub fn fp32_to_bfp16_rtne(value: f32) -> u16 {
    if value.is_nan() {
        return 0x7fc0;
    }
    let bits = value.to_bits();
    let lsb = (bits >> 16) & 1;
    (bits.wrapping_add(0x7fff + lsb) >> 16) as u16
}

pub fn bfp16_to_fp32(bits: u16) -> f32 {
    bf16::from_bits(bits).to_f32()
}

fn saturate(value: f64, dtype: DataType) -> (i32, Option<ConversionOverflow>) {
    let (min, max) = match dtype.range() {
        Some((min, max)) => (min.max(i32::MIN as f64), max.min(i32::MAX as f64)),
        None => (i32::MIN as f64, i32::MAX as f64),
    };
    if value.is_nan() || value < min || value > max {
        let clamped = value.max(min).min(max);
        let overflow = ConversionOverflow {
            value,
            min,
            max,
            dtype,
        };
        (clamped as i32, Some(overflow))
    } else {
        (value as i32, None)
    }
}

fn dfp_quantize(value: f32, fl: i8, dtype: DataType) -> (i32, Option<ConversionOverflow>) {
    let scaled = value * 2f32.powi(fl as i32);
    saturate(rint(scaled as f64), dtype)
}

fn affine_quantize(
    value: f32,
    scale: f32,
    zero_point: i32,
    dtype: DataType,
) -> (i32, Option<ConversionOverflow>) {
    saturate(rint((value / scale) as f64) + zero_point as f64, dtype)
}

/// `rint(value * 2^fl)` clamped to the range of `dtype`.
pub fn fp32_to_dfp(value: f32, fl: i8, dtype: DataType) -> i32 {
    dfp_quantize(value, fl, dtype).0
}

pub fn dfp_to_fp32(value: i32, fl: i8) -> f32 {
    value as f32 * 2f32.powi(-(fl as i32))
}

/// `rint(value / scale) + zero_point` clamped to the range of `dtype`.
pub fn fp32_to_affine(value: f32, scale: f32, zero_point: i32, dtype: DataType) -> i32 {
    affine_quantize(value, scale, zero_point, dtype).0
}

pub fn affine_to_fp32(value: i32, scale: f32, zero_point: i32) -> f32 {
    (value as f32 - zero_point as f32) * scale
}

/// Width conversion between integer storage types, sign-extending signed sources.
pub fn integer_convert(
    src: &[u8],
    src_type: DataType,
    dst: &mut [u8],
    dst_type: DataType,
) -> Result<()> {
    if !src_type.is_integer() || !dst_type.is_integer() {
        return Err(VxError::UnsupportedConversion {
            from: src_type,
            to: dst_type,
        });
    }
    let src_sz = src_type.bytes()?;
    let dst_sz = dst_type.bytes()?;
    check_len(src.len(), src_sz)?;
    check_len(dst.len(), dst_sz)?;

    let mut buffer = if src_type.is_signed() && src[src_sz - 1] & 0x80 != 0 {
        [0xffu8; 8]
    } else {
        [0u8; 8]
    };
    buffer[..src_sz].copy_from_slice(&src[..src_sz]);
    dst[..dst_sz].copy_from_slice(&buffer[..dst_sz]);
    Ok(())
}

fn check_len(got: usize, needed: usize) -> Result<()> {
    if got < needed {
        Err(VxError::BufferTooSmall { needed, got })
    } else {
        Ok(())
    }
}

fn is_quantizable(vx_type: DataType) -> bool {
    matches!(
        vx_type,
        DataType::Int8 | DataType::Bool8 | DataType::Uint8 | DataType::Int16 | DataType::Int32
    )
}

/// Fails when `dtype` cannot take part in an element conversion through f32.
pub(crate) fn check_convertible(dtype: &DType) -> Result<()> {
    match dtype.vx_type {
        DataType::Float32 | DataType::Float16 | DataType::BFloat16 => Ok(()),
        t if is_quantizable(t) => match dtype.qnt {
            QuantType::AffinePerChannel { .. } => Err(VxError::UnsupportedQuantization {
                dtype: t,
                quant: dtype.qnt.name(),
            }),
            _ => Ok(()),
        },
        other => Err(VxError::UnsupportedConversion {
            from: other,
            to: DataType::Float32,
        }),
    }
}

pub fn dtype_to_float32(src: &[u8], dtype: &DType) -> Result<f32> {
    check_convertible(dtype)?;
    check_len(src.len(), dtype.bytes()?)?;
    match dtype.vx_type {
        DataType::Float32 => Ok(f32::from_le_bytes(read_word(src))),
        DataType::Float16 => Ok(fp16_to_fp32(u16::from_le_bytes([src[0], src[1]]))),
        DataType::BFloat16 => Ok(bfp16_to_fp32(u16::from_le_bytes([src[0], src[1]]))),
        vx_type => {
            let mut word = [0u8; 4];
            integer_convert(src, vx_type, &mut word, DataType::Int32)?;
            let value = i32::from_le_bytes(word);
            match dtype.qnt {
                QuantType::Dfp { fl } => Ok(dfp_to_fp32(value, fl)),
                QuantType::AffineAsymmetric { scale, zero_point } => {
                    Ok(affine_to_fp32(value, scale, zero_point))
                }
                QuantType::None => Ok(value as f32),
                QuantType::AffinePerChannel { .. } => Err(VxError::UnsupportedQuantization {
                    dtype: vx_type,
                    quant: dtype.qnt.name(),
                }),
            }
        }
    }
}

fn read_word(src: &[u8]) -> [u8; 4] {
    src[..4].try_into().unwrap_or([0; 4])
}

/// Encodes without logging. Bulk conversions report saturation once per buffer.
pub(crate) fn encode_f32(
    value: f32,
    dst: &mut [u8],
    dtype: &DType,
) -> Result<Option<ConversionOverflow>> {
    check_convertible(dtype)?;
    check_len(dst.len(), dtype.bytes()?)?;
    match dtype.vx_type {
        DataType::Float32 => {
            dst[..4].copy_from_slice(&value.to_le_bytes());
            Ok(None)
        }
        DataType::Float16 => {
            let bits = fp32_to_fp16(value);
            dst[..2].copy_from_slice(&bits.to_le_bytes());
            if value.is_finite() && f16::from_bits(bits).is_infinite() {
                let max = f16::MAX.to_f32() as f64;
                return Ok(Some(ConversionOverflow {
                    value: value as f64,
                    min: -max,
                    max,
                    dtype: DataType::Float16,
                }));
            }
            Ok(None)
        }
        DataType::BFloat16 => {
            dst[..2].copy_from_slice(&fp32_to_bfp16_rtne(value).to_le_bytes());
            Ok(None)
        }
        vx_type => {
            let (stored, overflow) = match dtype.qnt {
                QuantType::Dfp { fl } => dfp_quantize(value, fl, vx_type),
                QuantType::AffineAsymmetric { scale, zero_point } => {
                    affine_quantize(value, scale, zero_point, vx_type)
                }
                QuantType::None => saturate(value.trunc() as f64, vx_type),
                QuantType::AffinePerChannel { .. } => {
                    return Err(VxError::UnsupportedQuantization {
                        dtype: vx_type,
                        quant: dtype.qnt.name(),
                    })
                }
            };
            integer_convert(&stored.to_le_bytes(), DataType::Int32, dst, vx_type)?;
            Ok(overflow)
        }
    }
}

/// Encodes `value` into the storage format of `dtype`, writing `dtype.bytes()` bytes.
///
/// Values outside the representable range saturate and the saturation is returned.
pub fn float32_to_dtype(
    value: f32,
    dst: &mut [u8],
    dtype: &DType,
) -> Result<Option<ConversionOverflow>> {
    let overflow = encode_f32(value, dst, dtype)?;
    if let Some(ref o) = overflow {
        warn!("Conversion overflow: {}", o);
    }
    Ok(overflow)
}
