use std::sync::Arc;

use crossbeam::sync::ShardedLock;

use crate::{
    dtype::{
        dtype_convert_float32_to_raw_data, dtype_convert_raw_data_to_float32, DType, QuantType,
    },
    error::{Result, VxError},
    ArcLock,
};

mod permute;
mod reshape;
mod storage;

pub use permute::{permute_tensor, permute_tensor_as, transpose_tensor};
pub use reshape::{calc_reshape_shape, reshape_tensor};
pub use storage::HostBuffer;

pub const MAX_DIM_NUM: usize = 8;
pub const AFFINE_SCALE_TOLERANCE: f32 = 1e-5;

pub type TensorId = uuid::Uuid;
pub type TensorRef = Arc<Tensor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimNum {
    /// Rank is computed from the inputs at setup time.
    Auto,
    Fixed(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorAttr {
    pub shape: Vec<usize>,
    pub dim_num: DimNum,
    pub dtype: DType,
    pub is_const: bool,
    pub vtl: bool,
}

impl TensorAttr {
    pub fn new(shape: &[usize], dtype: DType) -> Self {
        TensorAttr {
            shape: shape.to_vec(),
            dim_num: DimNum::Fixed(shape.len()),
            dtype,
            is_const: false,
            vtl: false,
        }
    }

    pub fn auto(dtype: DType) -> Self {
        TensorAttr {
            shape: vec![],
            dim_num: DimNum::Auto,
            dtype,
            is_const: false,
            vtl: false,
        }
    }

    pub fn virtual_tensor(mut self) -> Self {
        self.vtl = true;
        self
    }

    pub fn constant(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn rank(&self) -> Option<usize> {
        match self.dim_num {
            DimNum::Auto => None,
            DimNum::Fixed(n) => Some(n),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.rank().is_some()
    }

    /// Rank is set, nonzero and matches a shape of positive extents.
    pub fn validate(&self) -> Result<()> {
        let rank = self
            .rank()
            .ok_or_else(|| VxError::invalid("dim_num", "rank has not been computed"))?;
        if rank == 0 || rank > MAX_DIM_NUM || rank != self.shape.len() {
            return Err(VxError::invalid(
                "dim_num",
                format!("rank {} for shape {:?}", rank, self.shape),
            ));
        }
        if self.shape.iter().any(|&s| s == 0) {
            return Err(VxError::invalid(
                "shape",
                format!("{:?} has an empty dimension", self.shape),
            ));
        }
        Ok(())
    }

    pub fn element_num(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn size_bytes(&self) -> usize {
        tensor_size(&self.shape, &self.dtype)
    }

    pub fn stride(&self) -> (usize, [usize; MAX_DIM_NUM]) {
        stride_size(&self.shape, &self.dtype)
    }
}

/// Row-major strides with dimension 0 fastest. Unused trailing slots hold the total size.
pub fn stride_size(shape: &[usize], dtype: &DType) -> (usize, [usize; MAX_DIM_NUM]) {
    let bits = dtype.vx_type.bits();
    let mut stride = [0usize; MAX_DIM_NUM];
    let rank = shape.len().min(MAX_DIM_NUM);
    if rank == 0 {
        return (0, stride);
    }
    let total = if bits < 8 {
        // sub-byte rows are packed and padded to a whole byte
        stride[0] = 0;
        let row = (shape[0] * bits + 7) / 8;
        if rank > 1 {
            stride[1] = row;
            for i in 2..rank {
                stride[i] = shape[i - 1] * stride[i - 1];
            }
        }
        row * shape[1..rank].iter().product::<usize>()
    } else {
        stride[0] = bits / 8;
        for i in 1..rank {
            stride[i] = shape[i - 1] * stride[i - 1];
        }
        shape[..rank].iter().product::<usize>() * stride[0]
    };
    for s in stride.iter_mut().skip(rank) {
        *s = total;
    }
    (total, stride)
}

pub fn tensor_size(shape: &[usize], dtype: &DType) -> usize {
    stride_size(shape, dtype).0
}

/// Structural equality of two dtypes, with affine scales compared within `1e-5`.
pub fn dtype_compare(a: &DType, b: &DType) -> bool {
    if a.vx_type != b.vx_type {
        return false;
    }
    match (&a.qnt, &b.qnt) {
        (QuantType::None, QuantType::None) => true,
        (QuantType::Dfp { fl: fa }, QuantType::Dfp { fl: fb }) => fa == fb,
        (
            QuantType::AffineAsymmetric {
                scale: sa,
                zero_point: za,
            },
            QuantType::AffineAsymmetric {
                scale: sb,
                zero_point: zb,
            },
        ) => za == zb && (sa - sb).abs() <= AFFINE_SCALE_TOLERANCE,
        (
            QuantType::AffinePerChannel {
                scales: sa,
                zero_points: za,
                channel_dim: ca,
            },
            QuantType::AffinePerChannel {
                scales: sb,
                zero_points: zb,
                channel_dim: cb,
            },
        ) => {
            ca == cb
                && za == zb
                && sa.len() == sb.len()
                && sa
                    .iter()
                    .zip(sb.iter())
                    .all(|(x, y)| (x - y).abs() <= AFFINE_SCALE_TOLERANCE)
        }
        _ => false,
    }
}

/// A tensor owned by a graph. Views created by reshape share `storage`.
pub struct Tensor {
    id: TensorId,
    attr: TensorAttr,
    storage: ArcLock<Option<HostBuffer>>,
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id)
            .field("attr", &self.attr)
            .finish()
    }
}

impl Tensor {
    /// Host tensors get a zeroed buffer. Virtual tensors stay unbacked until materialized.
    pub fn new(attr: TensorAttr) -> Result<TensorRef> {
        attr.validate()?;
        let buffer = if attr.vtl {
            None
        } else {
            Some(HostBuffer::zeroed(attr.size_bytes())?)
        };
        Ok(Arc::new(Tensor {
            id: uuid::Uuid::new_v4(),
            attr,
            storage: Arc::new(ShardedLock::new(buffer)),
        }))
    }

    pub fn from_bytes(attr: TensorAttr, bytes: &[u8]) -> Result<TensorRef> {
        let tensor = Tensor::new(attr)?;
        tensor.write_bytes(bytes)?;
        Ok(tensor)
    }

    /// Quantizes `values` into the tensor's dtype.
    pub fn from_f32(attr: TensorAttr, values: &[f32]) -> Result<TensorRef> {
        let tensor = Tensor::new(attr)?;
        tensor.write_f32(values)?;
        Ok(tensor)
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn attr(&self) -> &TensorAttr {
        &self.attr
    }

    pub fn shape(&self) -> &[usize] {
        &self.attr.shape
    }

    pub fn rank(&self) -> usize {
        self.attr.shape.len()
    }

    pub fn dtype(&self) -> &DType {
        &self.attr.dtype
    }

    pub fn element_num(&self) -> usize {
        self.attr.element_num()
    }

    pub fn has_buffer(&self) -> bool {
        self.storage.read().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn shares_storage_with(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Same storage under another descriptor.
    pub(crate) fn alias(&self, attr: TensorAttr) -> TensorRef {
        Arc::new(Tensor {
            id: uuid::Uuid::new_v4(),
            attr,
            storage: self.storage.clone(),
        })
    }

    /// Gives a virtual tensor a zeroed host buffer shared by all of its views.
    pub fn materialize(&self) -> Result<()> {
        let mut slot = self
            .storage
            .write()
            .map_err(|_| VxError::StoragePoisoned(self.id))?;
        if slot.is_none() {
            *slot = Some(HostBuffer::zeroed(self.attr.size_bytes())?);
        }
        Ok(())
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let slot = self
            .storage
            .read()
            .map_err(|_| VxError::StoragePoisoned(self.id))?;
        match slot.as_ref() {
            Some(buffer) => buffer.to_vec(),
            None => Ok(vec![0; self.attr.size_bytes()]),
        }
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.materialize()?;
        let mut slot = self
            .storage
            .write()
            .map_err(|_| VxError::StoragePoisoned(self.id))?;
        match slot.as_mut() {
            Some(buffer) => buffer.write(bytes),
            None => Err(VxError::StoragePoisoned(self.id)),
        }
    }

    /// Dequantized copy of the tensor data.
    pub fn read_f32(&self) -> Result<Vec<f32>> {
        let bytes = self.read_bytes()?;
        let mut values = vec![0f32; self.element_num()];
        dtype_convert_raw_data_to_float32(&bytes, self.dtype(), &mut values)?;
        Ok(values)
    }

    pub fn write_f32(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.element_num() {
            return Err(VxError::invalid(
                "values",
                format!(
                    "{} values for {} elements",
                    values.len(),
                    self.element_num()
                ),
            ));
        }
        let mut bytes = vec![0u8; self.attr.size_bytes()];
        dtype_convert_float32_to_raw_data(values, &mut bytes, self.dtype())?;
        self.write_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;

    #[test]
    fn element_and_byte_counts() {
        let attr = TensorAttr::new(&[2, 3, 4], DType::new(DataType::Float16));
        assert_eq!(attr.element_num(), 24);
        assert_eq!(attr.size_bytes(), 48);
        assert_eq!(tensor_size(&[5], &DType::new(DataType::Int4)), 3);
    }

    #[test]
    fn strides_fill_unused_dims_with_total() {
        let attr = TensorAttr::new(&[4, 3, 2], DType::new(DataType::Int32));
        let (total, stride) = attr.stride();
        assert_eq!(total, 96);
        assert_eq!(&stride[..3], &[4, 16, 48]);
        assert!(stride[3..].iter().all(|&s| s == 96));
    }

    #[test]
    fn sub_byte_rows_are_padded() {
        let (total, stride) = stride_size(&[3, 2], &DType::new(DataType::Uint4));
        assert_eq!(stride[1], 2);
        assert_eq!(total, 4);
    }

    #[test]
    fn attr_validation() {
        let auto = TensorAttr::auto(DType::new(DataType::Float32));
        assert!(!auto.is_materialized());
        assert!(auto.validate().is_err());
        assert!(TensorAttr::new(&[2, 0], DType::new(DataType::Float32))
            .validate()
            .is_err());
        assert!(TensorAttr::new(&[], DType::new(DataType::Float32))
            .validate()
            .is_err());
    }

    #[test]
    fn dtype_compare_tolerates_small_scale_drift() {
        let a = DType::affine(DataType::Uint8, 0.5, 3);
        assert!(dtype_compare(&a, &DType::affine(DataType::Uint8, 0.500_005, 3)));
        assert!(!dtype_compare(&a, &DType::affine(DataType::Uint8, 0.5, 4)));
        assert!(!dtype_compare(&a, &DType::affine(DataType::Int8, 0.5, 3)));
        assert!(!dtype_compare(&a, &DType::dfp(DataType::Uint8, 3)));
        assert!(dtype_compare(
            &DType::dfp(DataType::Int8, 3),
            &DType::dfp(DataType::Int8, 3)
        ));
    }

    #[test]
    fn virtual_tensors_materialize_on_write() {
        let attr = TensorAttr::new(&[2], DType::new(DataType::Int16)).virtual_tensor();
        let t = Tensor::new(attr).unwrap();
        assert!(!t.has_buffer());
        assert_eq!(t.read_bytes().unwrap(), vec![0; 4]);
        t.write_f32(&[1.0, -2.0]).unwrap();
        assert!(t.has_buffer());
        assert_eq!(t.read_f32().unwrap(), vec![1.0, -2.0]);
    }
}
