use coaster as co;

use co::prelude::*;

use crate::{
    error::{Result, VxError},
    utility::get_native_backend,
};

fn host_error<E: std::fmt::Debug>(call: &'static str, e: E) -> VxError {
    VxError::BackendResourceExhausted {
        call,
        reason: format!("{:?}", e),
    }
}

/// Host-visible bytes of a tensor, kept in native backend memory.
pub struct HostBuffer {
    data: SharedTensor<u8>,
    len: usize,
}

impl HostBuffer {
    pub fn zeroed(len: usize) -> Result<Self> {
        let dims: &[usize] = &[len.max(1)];
        let mut buffer = HostBuffer {
            data: SharedTensor::new(&dims),
            len,
        };
        buffer.fill(0)?;
        Ok(buffer)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buffer = HostBuffer::zeroed(bytes.len())?;
        buffer.write(bytes)?;
        Ok(buffer)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn fill(&mut self, value: u8) -> Result<()> {
        let native = get_native_backend()?;
        let mem = self
            .data
            .write_only(native.device())
            .map_err(|e| host_error("write_only", e))?;
        for x in mem.as_mut_slice::<u8>().iter_mut() {
            *x = value;
        }
        Ok(())
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.len {
            return Err(VxError::BufferTooSmall {
                needed: self.len,
                got: bytes.len(),
            });
        }
        let native = get_native_backend()?;
        let mem = self
            .data
            .write_only(native.device())
            .map_err(|e| host_error("write_only", e))?;
        mem.as_mut_slice::<u8>()[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let native = get_native_backend()?;
        let mem = self
            .data
            .read(native.device())
            .map_err(|e| host_error("read", e))?;
        Ok(mem.as_slice::<u8>()[..self.len].to_vec())
    }
}
