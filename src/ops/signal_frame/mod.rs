use crate::{
    error::{Result, VxError},
    kernel::OperatorId,
    ops::{ceil_div, expect_io},
    tensor::TensorRef,
};

mod cpu;
mod evis;

pub(super) use cpu::cpu_kernels;
pub(super) use evis::evis_kernels;

/// Slides a window of `frame_length` samples along `axis`, `frame_step` apart.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalFrameParams {
    pub frame_length: usize,
    pub frame_step: usize,
    pub axis: usize,
    /// Keep frames that run past the end, filling with `pad_val`.
    pub pad_end: bool,
    pub pad_val: f32,
}

impl SignalFrameParams {
    pub fn new(frame_length: usize, frame_step: usize, axis: usize) -> Self {
        SignalFrameParams {
            frame_length,
            frame_step,
            axis,
            pad_end: false,
            pad_val: 0.0,
        }
    }

    pub fn padded(mut self, pad_val: f32) -> Self {
        self.pad_end = true;
        self.pad_val = pad_val;
        self
    }
}

pub(crate) fn num_frames(len: usize, frame_length: usize, frame_step: usize, pad_end: bool) -> usize {
    if pad_end {
        ceil_div(len, frame_step)
    } else if len < frame_length {
        0
    } else {
        (len - frame_length) / frame_step + 1
    }
}

/// `(inner, len, outer)` around `axis`.
pub(crate) fn split_axis(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let inner = shape[..axis].iter().product();
    let outer = shape[axis + 1..].iter().product();
    (inner, shape[axis], outer)
}

/// The framed shape: `axis` becomes `[frame_length, num_frames]`.
pub(crate) fn framed_shape(shape: &[usize], p: &SignalFrameParams) -> Vec<usize> {
    let frames = num_frames(shape[p.axis], p.frame_length, p.frame_step, p.pad_end);
    let mut out = shape[..p.axis].to_vec();
    out.push(p.frame_length);
    out.push(frames);
    out.extend_from_slice(&shape[p.axis + 1..]);
    out
}

pub(crate) fn validate(inputs: &[TensorRef], outputs: &[TensorRef], p: &SignalFrameParams) -> Result<()> {
    expect_io(OperatorId::SignalFrame, inputs, outputs)?;
    let shape = inputs[0].shape();
    if p.axis >= shape.len() {
        return Err(VxError::AxisOutOfRange {
            axis: p.axis,
            rank: shape.len(),
        });
    }
    if p.frame_length == 0 || p.frame_step == 0 {
        return Err(VxError::invalid("frame", "length and step must be positive"));
    }
    let expected = framed_shape(shape, p);
    if expected[p.axis + 1] == 0 {
        return Err(VxError::invalid(
            "frame_length",
            format!("{} exceeds the {} samples on axis {}", p.frame_length, shape[p.axis], p.axis),
        ));
    }
    if outputs[0].shape() != expected.as_slice() {
        return Err(VxError::invalid(
            "output",
            format!("shape {:?}, framing gives {:?}", outputs[0].shape(), expected),
        ));
    }
    Ok(())
}
