//! Rewrites tensor shapes into ranks and extents a GPU-style backend can address.
//!
//! Every optimizer either returns shapes of at most [`ShapeLimits::max_rank`]
//! dims that all fit within [`ShapeLimits::max_extent`], or fails with
//! `ShapeNotOptimizable`.

use log::debug;
use num::Integer;

use crate::{
    error::{Result, VxError},
    utility::shape_str,
};

mod eltwise;

pub use eltwise::{optimize_eltwise_shape, EltwiseShape};

pub const GPU_TENSOR_MAX_WIDTH: usize = 65536;
pub const GPU_TENSOR_MAX_RANK: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeLimits {
    /// Largest extent one addressing dimension can encode.
    pub max_extent: usize,
    /// Highest rank an optimized shape may have.
    pub max_rank: usize,
}

impl Default for ShapeLimits {
    fn default() -> Self {
        ShapeLimits {
            max_extent: GPU_TENSOR_MAX_WIDTH,
            max_rank: GPU_TENSOR_MAX_RANK,
        }
    }
}

impl ShapeLimits {
    pub(crate) fn not_optimizable(&self, shape: &[usize]) -> VxError {
        VxError::ShapeNotOptimizable {
            shape: shape.to_vec(),
            max_rank: self.max_rank,
            max_extent: self.max_extent,
        }
    }
}

/// Largest divisor of `value` below `limit` that is a multiple of `align`.
pub fn compute_gpu_divisor(value: usize, limit: usize, align: usize) -> Option<usize> {
    if limit < 2 || align == 0 {
        return None;
    }
    (1..=value.min(limit - 1))
        .rev()
        .find(|i| Integer::is_multiple_of(i, &align) && Integer::is_multiple_of(&value, i))
}

/// Appends `size` to `shape` as one dim, or as two when it exceeds the extent limit.
///
/// Returns how many dims were appended. A size of 1 appends nothing.
pub(crate) fn fill_dim(shape: &mut Vec<usize>, size: usize, limits: &ShapeLimits) -> Result<usize> {
    if size == 1 {
        return Ok(0);
    }
    if size < limits.max_extent {
        shape.push(size);
        return Ok(1);
    }
    let split = compute_gpu_divisor(size, limits.max_extent, 1)
        .map(|divisor| (divisor, size / divisor))
        .filter(|&(_, remainder)| remainder <= limits.max_extent && shape.len() < limits.max_rank);
    match split {
        Some((divisor, remainder)) => {
            shape.push(divisor);
            shape.push(remainder);
            Ok(2)
        }
        None => {
            let mut attempted = shape.clone();
            attempted.push(size);
            Err(limits.not_optimizable(&attempted))
        }
    }
}

/// Pads a rank 0 or 1 shape out to rank 2.
pub(crate) fn pad_rank2(shape: &mut Vec<usize>) {
    while shape.len() < 2 {
        shape.push(1);
    }
}

fn check_rank(shape: &[usize], limits: &ShapeLimits) -> Result<()> {
    if shape.len() > limits.max_rank {
        return Err(limits.not_optimizable(shape));
    }
    Ok(())
}

/// Flattens a shape to at most two dims.
pub fn optimize_element_shape(shape: &[usize], limits: &ShapeLimits) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(2);
    fill_dim(&mut out, shape.iter().product(), limits)?;
    pad_rank2(&mut out);
    debug!("element shape {} -> {}", shape_str(shape), shape_str(&out));
    Ok(out)
}

fn check_axes(shape: &[usize], axes: &[usize]) -> Result<()> {
    let first = *axes
        .first()
        .ok_or_else(|| VxError::invalid("axis", "no axis given"))?;
    for (offset, &axis) in axes.iter().enumerate() {
        if axis >= shape.len() {
            return Err(VxError::AxisOutOfRange {
                axis,
                rank: shape.len(),
            });
        }
        if axis != first + offset {
            return Err(VxError::invalid(
                "axis",
                format!("{:?} is not a contiguous ascending run", axes),
            ));
        }
    }
    Ok(())
}

fn inner_axis_outer(shape: &[usize], axes: &[usize]) -> (usize, usize, usize) {
    let first = axes[0];
    let last = axes[axes.len() - 1];
    let inner = shape[..first].iter().product();
    let axis = shape[first..=last].iter().product();
    let outer = shape[last + 1..].iter().product();
    (inner, axis, outer)
}

/// Appends the axis block, keeping a unit dim when it collapses so the axis stays addressable.
fn fill_axis(shape: &mut Vec<usize>, size: usize, limits: &ShapeLimits) -> Result<Vec<usize>> {
    let start = shape.len();
    let dims = fill_dim(shape, size, limits)?;
    if dims == 0 {
        shape.push(1);
        return Ok(vec![start]);
    }
    Ok((start..start + dims).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisShape {
    pub shape: Vec<usize>,
    /// Positions of the original axis block in `shape`.
    pub axes: Vec<usize>,
}

/// Collapses a shape into inner × axis × outer around a contiguous run of axes.
pub fn optimize_tensor_shape(shape: &[usize], axes: &[usize], limits: &ShapeLimits) -> Result<AxisShape> {
    check_axes(shape, axes)?;
    let (inner, axis, outer) = inner_axis_outer(shape, axes);
    let mut out = vec![];
    fill_dim(&mut out, inner, limits)?;
    let new_axes = fill_axis(&mut out, axis, limits)?;
    fill_dim(&mut out, outer, limits)?;
    pad_rank2(&mut out);
    check_rank(&out, limits)?;
    Ok(AxisShape {
        shape: out,
        axes: new_axes,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceShape {
    pub input: Vec<usize>,
    pub output: Vec<usize>,
    pub axes: Vec<usize>,
}

/// Like [`optimize_tensor_shape`], and also collapses the reduced output to inner × outer.
pub fn optimize_reduce_shape(
    shape: &[usize],
    axes: &[usize],
    output_shape: &[usize],
    limits: &ShapeLimits,
) -> Result<ReduceShape> {
    let AxisShape {
        shape: input,
        axes: new_axes,
    } = optimize_tensor_shape(shape, axes, limits)?;
    let (inner, _, outer) = inner_axis_outer(shape, axes);
    if inner * outer != output_shape.iter().product::<usize>() {
        return Err(VxError::ElementCountMismatch {
            from: vec![inner, outer],
            to: output_shape.to_vec(),
        });
    }
    let mut output = vec![];
    fill_dim(&mut output, inner, limits)?;
    fill_dim(&mut output, outer, limits)?;
    pad_rank2(&mut output);
    Ok(ReduceShape {
        input,
        output,
        axes: new_axes,
    })
}

/// Collapses around a single axis. Returns the new shape and the axis position in it.
pub fn optimize_softmax_shape(shape: &[usize], axis: usize, limits: &ShapeLimits) -> Result<(Vec<usize>, usize)> {
    let AxisShape { shape, axes } = optimize_tensor_shape(shape, &[axis], limits)?;
    Ok((shape, axes[0]))
}

/// The first two dims are nonzero and below the extent limit.
pub fn gpu_check_shape(shape: &[usize], limits: &ShapeLimits) -> bool {
    shape
        .iter()
        .take(2)
        .all(|&s| s > 0 && s < limits.max_extent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ShapeLimits {
        ShapeLimits {
            max_extent: 16,
            max_rank: 4,
        }
    }

    #[test]
    fn divisor_search() {
        assert_eq!(compute_gpu_divisor(100, 16, 1), Some(10));
        assert_eq!(compute_gpu_divisor(12, 16, 1), Some(12));
        assert_eq!(compute_gpu_divisor(100, 16, 4), Some(4));
        assert_eq!(compute_gpu_divisor(17, 16, 1), Some(1));
    }

    #[test]
    fn element_shape_fits() {
        let limits = ShapeLimits::default();
        assert_eq!(optimize_element_shape(&[2, 3, 4], &limits).unwrap(), vec![24, 1]);
        assert_eq!(optimize_element_shape(&[1, 1], &limits).unwrap(), vec![1, 1]);
        assert_eq!(optimize_element_shape(&[100], &small()).unwrap(), vec![10, 10]);
    }

    #[test]
    fn prime_sizes_cannot_be_split() {
        match optimize_element_shape(&[17], &small()) {
            Err(VxError::ShapeNotOptimizable { max_extent, .. }) => assert_eq!(max_extent, 16),
            other => panic!("unexpected {:?}", other),
        }
        // the remainder may reach the limit, the divisor stays below it
        assert_eq!(optimize_element_shape(&[240], &small()).unwrap(), vec![15, 16]);
        assert!(optimize_element_shape(&[256], &small()).is_err());
    }

    #[test]
    fn tensor_shape_keeps_axis_addressable() {
        let limits = ShapeLimits::default();
        let out = optimize_tensor_shape(&[2, 3, 1, 5], &[2], &limits).unwrap();
        assert_eq!(out.shape, vec![6, 1, 5]);
        assert_eq!(out.axes, vec![1]);

        let out = optimize_tensor_shape(&[1, 4, 1], &[1], &limits).unwrap();
        assert_eq!(out.shape, vec![4, 1]);
        assert_eq!(out.axes, vec![0]);

        assert!(optimize_tensor_shape(&[2, 3], &[2], &limits).is_err());
        assert!(optimize_tensor_shape(&[2, 3, 4], &[0, 2], &limits).is_err());
    }

    #[test]
    fn failed_split_leaves_shape_untouched() {
        let mut shape = vec![3];
        match fill_dim(&mut shape, 17, &small()) {
            Err(VxError::ShapeNotOptimizable { shape: reported, .. }) => assert_eq!(reported, vec![3, 17]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(shape, vec![3]);
    }

    #[test]
    fn tensor_shape_respects_rank_limit() {
        let limits = ShapeLimits::default();
        // inner and axis both split, leaving no room for the outer dim
        assert!(matches!(
            optimize_tensor_shape(&[70000, 70000, 5], &[1], &limits),
            Err(VxError::ShapeNotOptimizable { max_rank: 4, .. })
        ));
        let roomy = ShapeLimits {
            max_rank: 6,
            ..limits
        };
        let out = optimize_tensor_shape(&[70000, 70000, 5], &[1], &roomy).unwrap();
        assert_eq!(out.shape.len(), 5);
        assert_eq!(out.axes, vec![2, 3]);
    }

    #[test]
    fn softmax_shape() {
        let (shape, axis) = optimize_softmax_shape(&[4, 5, 6, 7], 2, &ShapeLimits::default()).unwrap();
        assert_eq!(shape, vec![20, 6, 7]);
        assert_eq!(axis, 1);
    }

    #[test]
    fn reduce_shape() {
        let out = optimize_reduce_shape(&[4, 5, 6], &[1], &[4, 1, 6], &ShapeLimits::default()).unwrap();
        assert_eq!(out.input, vec![4, 5, 6]);
        assert_eq!(out.output, vec![4, 6]);
        assert_eq!(out.axes, vec![1]);
    }

    #[test]
    fn gpu_shape_check() {
        let limits = ShapeLimits::default();
        assert!(gpu_check_shape(&[65535, 2, 70000], &limits));
        assert!(!gpu_check_shape(&[65536, 1], &limits));
        assert!(!gpu_check_shape(&[3, 0], &limits));
    }
}
