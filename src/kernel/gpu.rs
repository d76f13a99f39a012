use std::collections::BTreeMap;

pub const GPU_MAX_DIM: usize = 3;

/// Work dimensions handed to the shader runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuParam {
    pub dim: usize,
    pub global_offset: [usize; GPU_MAX_DIM],
    pub global_scale: [usize; GPU_MAX_DIM],
    pub local_size: [usize; GPU_MAX_DIM],
    pub global_size: [usize; GPU_MAX_DIM],
}

impl GpuParam {
    pub fn new(dim: usize, global_scale: [usize; GPU_MAX_DIM]) -> Self {
        GpuParam {
            dim,
            global_scale,
            ..GpuParam::default()
        }
    }
}

/// Rounds `n` up to a multiple of `align`, which must be a power of two.
pub fn align_p2(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpType {
    Type16,
    Type32,
}

/// Bit-packed dot-product instruction descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpInstruction {
    pub data: [u32; 16],
    pub dp_type: DpType,
}

const POSTSHIFT_MASK: u32 = 0x1f;

impl DpInstruction {
    pub const fn new(data: [u32; 16], dp_type: DpType) -> Self {
        DpInstruction { data, dp_type }
    }

    /// Applies a fixed-point shift.
    ///
    /// Positive shifts go into the post-shift bits of word 7. Negative shifts
    /// scale the constant operands of a 16-bit instruction instead.
    pub fn update_postshift(&mut self, shift: i32) {
        if shift > 0 {
            self.data[7] = (self.data[7] & !POSTSHIFT_MASK) | (shift as u32 & POSTSHIFT_MASK);
        } else if shift < 0 && self.dp_type == DpType::Type16 {
            let multiplier = 1u32 << (-shift).min(15);
            for word in self.data[8..].iter_mut().step_by(2) {
                *word = multiplier;
            }
        }
    }

    pub fn postshift(&self) -> u32 {
        self.data[7] & POSTSHIFT_MASK
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Dp(DpInstruction),
    I32(i32),
    F32(f32),
}

/// Named shader constants, kept in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformTable {
    values: BTreeMap<String, UniformValue>,
}

impl UniformTable {
    pub fn new() -> Self {
        UniformTable::default()
    }

    pub fn set<N: Into<String>>(&mut self, name: N, value: UniformValue) {
        self.values.insert(name.into(), value);
    }

    pub fn set_dp<N: Into<String>>(&mut self, name: N, dp: DpInstruction) {
        self.set(name, UniformValue::Dp(dp));
    }

    pub fn set_i32<N: Into<String>>(&mut self, name: N, value: i32) {
        self.set(name, UniformValue::I32(value));
    }

    pub fn set_f32<N: Into<String>>(&mut self, name: N, value: f32) {
        self.set(name, UniformValue::F32(value));
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// What a kernel initializer produces for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelConfig {
    pub gpu: Option<GpuParam>,
    pub uniforms: UniformTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align_p2(0, 4), 0);
        assert_eq!(align_p2(1, 4), 4);
        assert_eq!(align_p2(8, 4), 8);
        assert_eq!(align_p2(9, 8), 16);
    }

    #[test]
    fn positive_postshift_sets_low_bits() {
        let mut dp = DpInstruction::new([0; 16], DpType::Type16);
        dp.data[7] = 0x0000_0600;
        dp.update_postshift(3);
        assert_eq!(dp.data[7], 0x0000_0603);
        assert_eq!(dp.postshift(), 3);
        dp.update_postshift(0);
        assert_eq!(dp.data[7], 0x0000_0603);
    }

    #[test]
    fn negative_postshift_scales_constants() {
        let mut dp = DpInstruction::new([1; 16], DpType::Type16);
        dp.update_postshift(-2);
        assert_eq!(&dp.data[8..], &[4, 1, 4, 1, 4, 1, 4, 1]);
        let mut dp32 = DpInstruction::new([1; 16], DpType::Type32);
        dp32.update_postshift(-2);
        assert_eq!(dp32.data, [1; 16]);
    }

    #[test]
    fn uniform_table_is_ordered() {
        let mut table = UniformTable::new();
        table.set_i32("depth", 3);
        table.set_f32("alpha", 0.5);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["alpha", "depth"]);
        assert_eq!(table.get("depth"), Some(&UniformValue::I32(3)));
    }
}
