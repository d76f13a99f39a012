use log::warn;

use super::{
    codec::{check_convertible, encode_f32},
    dtype_to_float32, DType,
};
use crate::{error::Result, tensor::dtype_compare};

fn report_overflows(count: usize, dtype: &DType) {
    if count > 0 {
        warn!(
            "{} element(s) saturated while converting to {}",
            count, dtype.vx_type
        );
    }
}

/// Converts a packed buffer of `src_dtype` elements into `dst_dtype` storage.
///
/// Returns the number of converted elements. An undersized destination is
/// rejected before anything is written and reports zero.
pub fn dtype_convert_raw_data(
    src: &[u8],
    src_dtype: &DType,
    dst: &mut [u8],
    dst_dtype: &DType,
) -> Result<usize> {
    let src_bytes = src_dtype.bytes()?;
    let dst_bytes = dst_dtype.bytes()?;
    let elements = src.len() / src_bytes;
    let needed = elements * dst_bytes;
    if dst.len() < needed {
        warn!(
            "Destination holds {} bytes, {} elements of {} need {}",
            dst.len(),
            elements,
            dst_dtype.vx_type,
            needed
        );
        return Ok(0);
    }
    if dtype_compare(src_dtype, dst_dtype) {
        dst[..needed].copy_from_slice(&src[..needed]);
        return Ok(elements);
    }
    check_convertible(src_dtype)?;
    check_convertible(dst_dtype)?;

    let mut overflows = 0;
    for (s, d) in src
        .chunks_exact(src_bytes)
        .zip(dst.chunks_exact_mut(dst_bytes))
    {
        let value = dtype_to_float32(s, src_dtype)?;
        if encode_f32(value, d, dst_dtype)?.is_some() {
            overflows += 1;
        }
    }
    report_overflows(overflows, dst_dtype);
    Ok(elements)
}

pub fn dtype_convert_raw_data_to_float32(
    src: &[u8],
    src_dtype: &DType,
    dst: &mut [f32],
) -> Result<usize> {
    let src_bytes = src_dtype.bytes()?;
    let elements = src.len() / src_bytes;
    if dst.len() < elements {
        warn!(
            "Float buffer holds {} values, {} needed",
            dst.len(),
            elements
        );
        return Ok(0);
    }
    check_convertible(src_dtype)?;
    for (s, d) in src.chunks_exact(src_bytes).zip(dst.iter_mut()) {
        *d = dtype_to_float32(s, src_dtype)?;
    }
    Ok(elements)
}

pub fn dtype_convert_float32_to_raw_data(
    src: &[f32],
    dst: &mut [u8],
    dst_dtype: &DType,
) -> Result<usize> {
    let dst_bytes = dst_dtype.bytes()?;
    let needed = src.len() * dst_bytes;
    if dst.len() < needed {
        warn!(
            "Destination holds {} bytes, {} elements of {} need {}",
            dst.len(),
            src.len(),
            dst_dtype.vx_type,
            needed
        );
        return Ok(0);
    }
    check_convertible(dst_dtype)?;
    let mut overflows = 0;
    for (s, d) in src.iter().zip(dst.chunks_exact_mut(dst_bytes)) {
        if encode_f32(*s, d, dst_dtype)?.is_some() {
            overflows += 1;
        }
    }
    report_overflows(overflows, dst_dtype);
    Ok(src.len())
}
