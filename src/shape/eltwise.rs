use log::debug;

use super::{compute_gpu_divisor, ShapeLimits};
use crate::{
    error::{Result, VxError},
    utility::shape_str,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Broadcast {
    Empty,
    None,
    /// `x` is 1 along this dim.
    X,
    /// `y` is 1 along this dim.
    Y,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EltwiseShape {
    pub x: Vec<usize>,
    pub y: Vec<usize>,
    pub output: Vec<usize>,
}

impl EltwiseShape {
    fn rank(&self) -> usize {
        self.output.len()
    }

    fn push(&mut self, x: usize, y: usize, out: usize) {
        self.x.push(x);
        self.y.push(y);
        self.output.push(out);
    }

    /// Appends one merged dim, split in two when the output extent is too wide.
    fn fill(&mut self, sx: usize, sy: usize, limits: &ShapeLimits) -> Result<()> {
        let size = sx.max(sy);
        if size < limits.max_extent {
            self.push(sx, sy, size);
            return Ok(());
        }
        let split = compute_gpu_divisor(size, limits.max_extent, 1)
            .map(|divisor| (divisor, size / divisor))
            .filter(|&(_, remainder)| remainder <= limits.max_extent && self.rank() < limits.max_rank);
        let (divisor, remainder) = match split {
            Some(split) => split,
            None => {
                let mut attempted = self.output.clone();
                attempted.push(size);
                return Err(limits.not_optimizable(&attempted));
            }
        };
        let part = |s: usize| if s > 1 { (divisor, remainder) } else { (1, 1) };
        let (x0, x1) = part(sx);
        let (y0, y1) = part(sy);
        self.push(x0, y0, divisor);
        self.push(x1, y1, remainder);
        Ok(())
    }
}

/// Merges runs of dims that broadcast the same way for a two-operand elementwise kernel.
///
/// Dims of extent 1 in the output are squeezed. Operands shorter than the
/// output are treated as 1 along the missing dims.
pub fn optimize_eltwise_shape(
    shape_x: &[usize],
    shape_y: &[usize],
    shape_output: &[usize],
    limits: &ShapeLimits,
) -> Result<EltwiseShape> {
    let mut out = EltwiseShape::default();
    let mut effective_x = 1;
    let mut effective_y = 1;
    let mut prev = Broadcast::Empty;

    for (i, &size) in shape_output.iter().enumerate() {
        let mut sx = shape_x.get(i).copied().unwrap_or(1);
        let mut sy = shape_y.get(i).copied().unwrap_or(1);
        if size == 1 {
            continue;
        }
        if sx != sy && sx > 1 && sy > 1 {
            return Err(VxError::invalid(
                "shape",
                format!(
                    "{} and {} do not broadcast",
                    shape_str(shape_x),
                    shape_str(shape_y)
                ),
            ));
        }
        let state = if sx == sy {
            Broadcast::None
        } else if sx == 1 {
            Broadcast::X
        } else {
            Broadcast::Y
        };
        match (prev, state) {
            (Broadcast::Empty, _) | (Broadcast::None, Broadcast::None) => {
                effective_x *= sx;
                effective_y *= sy;
            }
            (Broadcast::X, Broadcast::X) => effective_y *= sy,
            (Broadcast::Y, Broadcast::Y) => effective_x *= sx,
            _ => {
                // flush the finished run and start a new one with this dim
                std::mem::swap(&mut sx, &mut effective_x);
                std::mem::swap(&mut sy, &mut effective_y);
                out.fill(sx, sy, limits)?;
            }
        }
        prev = state;
    }
    out.fill(effective_x, effective_y, limits)?;
    if out.rank() > limits.max_rank {
        return Err(limits.not_optimizable(&out.output));
    }
    if out.rank() == 1 {
        out.push(1, 1, 1);
    }
    debug!(
        "eltwise shape {} -> {}",
        shape_str(shape_output),
        shape_str(&out.output)
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_shapes_collapse_to_one_dim() {
        let out = optimize_eltwise_shape(&[2, 3, 4], &[2, 3, 4], &[2, 3, 4], &ShapeLimits::default())
            .unwrap();
        assert_eq!(out.output, vec![24, 1]);
        assert_eq!(out.x, vec![24, 1]);
        assert_eq!(out.y, vec![24, 1]);
    }

    #[test]
    fn broadcast_axis_stays_isolated() {
        let out = optimize_eltwise_shape(&[4, 5, 6], &[4, 1, 6], &[4, 5, 6], &ShapeLimits::default())
            .unwrap();
        assert_eq!(out.output, vec![4, 5, 6]);
        assert_eq!(out.x, vec![4, 5, 6]);
        assert_eq!(out.y, vec![4, 1, 6]);
    }

    #[test]
    fn matching_broadcast_runs_merge() {
        let out = optimize_eltwise_shape(&[2, 3, 4, 5], &[1, 1, 4, 5], &[2, 3, 4, 5], &ShapeLimits::default())
            .unwrap();
        assert_eq!(out.output, vec![6, 20]);
        assert_eq!(out.x, vec![6, 20]);
        assert_eq!(out.y, vec![1, 20]);
    }

    #[test]
    fn shorter_operand_and_unit_dims() {
        let out = optimize_eltwise_shape(&[3, 1, 4], &[3], &[3, 1, 4], &ShapeLimits::default()).unwrap();
        assert_eq!(out.output, vec![3, 4]);
        assert_eq!(out.y, vec![3, 1]);

        let out = optimize_eltwise_shape(&[1, 1], &[1], &[1, 1], &ShapeLimits::default()).unwrap();
        assert_eq!(out.output, vec![1, 1]);
    }

    #[test]
    fn incompatible_shapes_fail() {
        assert!(optimize_eltwise_shape(&[2, 3], &[3, 3], &[3, 3], &ShapeLimits::default()).is_err());
    }

    #[test]
    fn alternating_runs_exceed_rank_limit() {
        let x = [2, 3, 2, 3, 2, 3];
        let y = [2, 1, 2, 1, 2, 1];
        match optimize_eltwise_shape(&x, &y, &x, &ShapeLimits::default()) {
            Err(VxError::ShapeNotOptimizable { shape, max_rank, .. }) => {
                assert_eq!(max_rank, 4);
                assert_eq!(shape, x.to_vec());
            }
            other => panic!("unexpected {:?}", other),
        }

        let limits = ShapeLimits {
            max_rank: 6,
            ..ShapeLimits::default()
        };
        let out = optimize_eltwise_shape(&x, &y, &x, &limits).unwrap();
        assert_eq!(out.output, x.to_vec());
        assert_eq!(out.y, y.to_vec());
    }

    #[test]
    fn wide_dims_are_split() {
        let limits = ShapeLimits {
            max_extent: 16,
            max_rank: 4,
        };
        let out = optimize_eltwise_shape(&[100], &[100], &[100], &limits).unwrap();
        assert_eq!(out.output, vec![10, 10]);
        assert!(optimize_eltwise_shape(&[17], &[17], &[17], &limits).is_err());
    }
}
