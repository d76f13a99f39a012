use crate::{
    dtype::{float32_to_dtype, DType, QuantType},
    error::{Result, VxError},
    graph::{NodeParam, ScalarValue},
    kernel::{ParamKind, ParamSlot, ParamState},
    tensor::TensorRef,
};

mod scope;

pub use scope::DispatchScope;

/// Encodes `value` in `dtype`'s storage format and widens it to 32 bits.
///
/// Signed storage is sign-extended, everything else zero-extended.
/// Kernels read the slot as a signed word, so an `Int8` of -1 packs as `0xffff_ffff`.
pub fn pack_output_scalar(value: f32, dtype: &DType) -> Result<u32> {
    if let QuantType::AffinePerChannel { .. } = dtype.qnt {
        return Err(VxError::UnsupportedQuantization {
            dtype: dtype.vx_type,
            quant: dtype.qnt.name(),
        });
    }
    let bytes = dtype.bytes()?;
    if bytes > 4 {
        return Err(VxError::UnsupportedConversion {
            from: crate::dtype::DataType::Float32,
            to: dtype.vx_type,
        });
    }
    let mut raw = [0u8; 4];
    float32_to_dtype(value, &mut raw[..bytes], dtype)?;
    let signed_int = dtype.vx_type.is_signed() && dtype.vx_type.is_integer();
    let packed = match bytes {
        1 if signed_int => raw[0] as i8 as i32 as u32,
        2 if signed_int => i16::from_le_bytes([raw[0], raw[1]]) as i32 as u32,
        _ => u32::from_le_bytes(raw),
    };
    Ok(packed)
}

/// Builds a node's argument list in slot order.
pub struct ParamPacker<'s, 'g> {
    scope: &'s mut DispatchScope<'g>,
    kernel: String,
    slots: &'static [ParamSlot],
    params: Vec<NodeParam>,
}

impl<'s, 'g> ParamPacker<'s, 'g> {
    pub fn new(scope: &'s mut DispatchScope<'g>, kernel: &str, slots: &'static [ParamSlot]) -> Self {
        ParamPacker {
            scope,
            kernel: kernel.to_string(),
            slots,
            params: Vec::with_capacity(slots.len()),
        }
    }

    fn mismatch(&self, index: usize, reason: String) -> VxError {
        VxError::ParamSlotMismatch {
            kernel: self.kernel.clone(),
            index,
            reason,
        }
    }

    fn expect(&self, kind: ParamKind) -> Result<()> {
        let index = self.params.len();
        match self.slots.get(index) {
            Some(slot) if slot.kind == kind => Ok(()),
            Some(slot) => Err(self.mismatch(
                index,
                format!("slot takes {:?}, packing {:?}", slot.kind, kind),
            )),
            None => Err(self.mismatch(index, "no slot left".to_string())),
        }
    }

    pub fn tensor(&mut self, tensor: &TensorRef) -> Result<&mut Self> {
        self.expect(ParamKind::Tensor)?;
        self.params.push(NodeParam::Tensor(tensor.clone()));
        Ok(self)
    }

    pub fn scalar(&mut self, value: ScalarValue) -> Result<&mut Self> {
        self.expect(ParamKind::Scalar)?;
        let id = self.scope.scalar(value)?;
        self.params.push(NodeParam::Scalar(id));
        Ok(self)
    }

    /// Operator parameters such as axis or depth pass through unconverted.
    pub fn i32(&mut self, value: i32) -> Result<&mut Self> {
        self.scalar(ScalarValue::I32(value))
    }

    pub fn f32(&mut self, value: f32) -> Result<&mut Self> {
        self.scalar(ScalarValue::F32(value))
    }

    /// A constant in the output tensor's quantized domain.
    pub fn output_scalar(&mut self, value: f32, output: &DType) -> Result<&mut Self> {
        let packed = pack_output_scalar(value, output)?;
        self.scalar(ScalarValue::U32(packed))
    }

    /// The argument list, once every required slot is filled.
    pub fn finish(self) -> Result<Vec<NodeParam>> {
        let filled = self.params.len();
        if let Some((index, _)) = self
            .slots
            .iter()
            .enumerate()
            .skip(filled)
            .find(|(_, s)| s.state == ParamState::Required)
        {
            return Err(self.mismatch(index, "required slot left empty".to_string()));
        }
        Ok(self.params)
    }
}
