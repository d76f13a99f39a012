use super::{DimNum, TensorAttr, TensorRef, MAX_DIM_NUM};
use crate::error::{Result, VxError};

/// Resolves a requested shape against `input_shape`.
///
/// A `-1` entry is inferred from the remaining element count and may appear
/// once. A `0` entry copies the input extent at the same position.
pub fn calc_reshape_shape(input_shape: &[usize], shape: &[i64]) -> Result<Vec<usize>> {
    let total: usize = input_shape.iter().product();
    if shape.is_empty() || shape.len() > MAX_DIM_NUM {
        return Err(VxError::invalid(
            "shape",
            format!("rank {} is out of range", shape.len()),
        ));
    }
    let mut out = Vec::with_capacity(shape.len());
    let mut infer_at = None;
    let mut known = 1usize;
    for (i, &s) in shape.iter().enumerate() {
        let dim = match s {
            -1 => {
                if infer_at.is_some() {
                    return Err(VxError::invalid("shape", "more than one -1 entry"));
                }
                infer_at = Some(i);
                out.push(0);
                continue;
            }
            0 => *input_shape.get(i).ok_or_else(|| {
                VxError::invalid(
                    "shape",
                    format!("0 at position {} but input rank is {}", i, input_shape.len()),
                )
            })?,
            s if s > 0 => s as usize,
            s => {
                return Err(VxError::invalid(
                    "shape",
                    format!("negative extent {}", s),
                ))
            }
        };
        known *= dim;
        out.push(dim);
    }
    let mismatch = || VxError::ElementCountMismatch {
        from: input_shape.to_vec(),
        to: shape.iter().map(|&s| s.max(0) as usize).collect(),
    };
    match infer_at {
        Some(i) => {
            if known == 0 || total % known != 0 {
                return Err(mismatch());
            }
            out[i] = total / known;
        }
        None if known != total => return Err(mismatch()),
        None => {}
    }
    Ok(out)
}

/// A view of `input` under `new_shape`. Storage is shared, never copied.
pub fn reshape_tensor(input: &TensorRef, new_shape: &[usize]) -> Result<TensorRef> {
    let count: usize = new_shape.iter().product();
    if count != input.element_num() {
        return Err(VxError::ElementCountMismatch {
            from: input.shape().to_vec(),
            to: new_shape.to_vec(),
        });
    }
    let attr = TensorAttr {
        shape: new_shape.to_vec(),
        dim_num: DimNum::Fixed(new_shape.len()),
        ..input.attr().clone()
    };
    attr.validate()?;
    Ok(input.alias(attr))
}
