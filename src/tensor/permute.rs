use itertools::Itertools;
use ndarray::{Array, IxDyn};

use super::{reshape_tensor, Tensor, TensorAttr, TensorRef};
use crate::{
    dtype::{dtype_convert_raw_data, DType},
    error::{Result, VxError},
};

fn check_perm(perm: &[usize], rank: usize) -> Result<()> {
    if perm.len() != rank || !perm.iter().copied().sorted().eq(0..rank) {
        return Err(VxError::invalid(
            "perm",
            format!("{:?} is not a permutation of rank {}", perm, rank),
        ));
    }
    Ok(())
}

/// Reorders raw element bytes so that output dim `i` walks input dim `perm[i]`.
fn permute_bytes(bytes: Vec<u8>, shape: &[usize], elem: usize, perm: &[usize]) -> Result<Vec<u8>> {
    let rank = shape.len();
    // ndarray is row-major, so dims go in reversed with the element bytes innermost
    let mut nd_shape: Vec<usize> = shape.iter().rev().copied().collect();
    nd_shape.push(elem);
    let array = Array::from_shape_vec(IxDyn(&nd_shape), bytes)
        .map_err(|e| VxError::invalid("shape", format!("{}", e)))?;
    let mut axes: Vec<usize> = (0..rank).map(|a| rank - 1 - perm[rank - 1 - a]).collect();
    axes.push(rank);
    Ok(array.permuted_axes(IxDyn(&axes)).iter().copied().collect())
}

/// Copies `input` into a new host tensor with permuted axes.
pub fn permute_tensor(input: &TensorRef, perm: &[usize]) -> Result<TensorRef> {
    permute_tensor_as(input, perm, input.dtype())
}

/// Like [`permute_tensor`] but stores the result as `dtype`, converting each element.
pub fn permute_tensor_as(input: &TensorRef, perm: &[usize], dtype: &DType) -> Result<TensorRef> {
    check_perm(perm, input.rank())?;
    input.materialize()?;
    let elem = input.dtype().bytes()?;
    let permuted = permute_bytes(input.read_bytes()?, input.shape(), elem, perm)?;
    let shape: Vec<usize> = perm.iter().map(|&p| input.shape()[p]).collect();
    let attr = TensorAttr::new(&shape, dtype.clone());
    if super::dtype_compare(input.dtype(), dtype) {
        return Tensor::from_bytes(attr, &permuted);
    }
    let mut converted = vec![0u8; attr.size_bytes()];
    dtype_convert_raw_data(&permuted, input.dtype(), &mut converted, dtype)?;
    Tensor::from_bytes(attr, &converted)
}

/// Permutes and then optionally views the result under `shape`.
pub fn transpose_tensor(
    input: &TensorRef,
    perm: &[usize],
    shape: Option<&[usize]>,
) -> Result<TensorRef> {
    let permuted = permute_tensor(input, perm)?;
    match shape {
        Some(shape) => reshape_tensor(&permuted, shape),
        None => Ok(permuted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;

    fn matrix() -> TensorRef {
        // dim 0 is fastest: rows of 3
        Tensor::from_f32(
            TensorAttr::new(&[3, 2], DType::new(DataType::Float32)),
            &[1., 2., 3., 4., 5., 6.],
        )
        .unwrap()
    }

    #[test]
    fn swap_axes_2d() {
        let out = permute_tensor(&matrix(), &[1, 0]).unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(out.read_f32().unwrap(), vec![1., 4., 2., 5., 3., 6.]);
        assert!(!out.shares_storage_with(&matrix()));
    }

    #[test]
    fn identity_perm_copies() {
        let input = matrix();
        let out = permute_tensor(&input, &[0, 1]).unwrap();
        assert_eq!(out.read_f32().unwrap(), input.read_f32().unwrap());
    }

    #[test]
    fn rotate_3d() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let input = Tensor::from_f32(
            TensorAttr::new(&[2, 3, 4], DType::new(DataType::Float32)),
            &values,
        )
        .unwrap();
        let out = permute_tensor(&input, &[2, 0, 1]).unwrap();
        assert_eq!(out.shape(), &[4, 2, 3]);
        let got = out.read_f32().unwrap();
        for k in 0..3 {
            for j in 0..2 {
                for i in 0..4 {
                    // out[i, j, k] = in[j, k, i]
                    let src = j + 2 * k + 6 * i;
                    assert_eq!(got[i + 4 * j + 8 * k], values[src]);
                }
            }
        }
    }

    #[test]
    fn converts_while_permuting() {
        let out = permute_tensor_as(&matrix(), &[1, 0], &DType::dfp(DataType::Int16, 1)).unwrap();
        let raw = out.read_bytes().unwrap();
        assert_eq!(i16::from_le_bytes([raw[2], raw[3]]), 8);
        assert_eq!(out.read_f32().unwrap(), vec![1., 4., 2., 5., 3., 6.]);
    }

    #[test]
    fn transpose_then_reshape() {
        let out = transpose_tensor(&matrix(), &[1, 0], Some(&[6])).unwrap();
        assert_eq!(out.shape(), &[6]);
        assert!(permute_tensor(&matrix(), &[0, 0]).is_err());
        assert!(permute_tensor(&matrix(), &[0]).is_err());
    }
}
