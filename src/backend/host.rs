//! Host (CPU) memory buffers

use std::sync::{Arc, RwLock};

use crate::error::{out_of_memory, ForgeError, ForgeResult};

/// Shared, zero-initialized host byte buffer
///
/// Cloning shares the bytes. Storages that own a whole direct buffer and
/// storages carved out of a host heap both go through this type.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    bytes: Arc<RwLock<Vec<u8>>>,
    size: usize,
}

impl HostBuffer {
    /// Allocate `size` zeroed bytes, reporting failure instead of aborting.
    pub fn allocate(size: usize) -> ForgeResult<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|e| out_of_memory(size, format!("host allocation failed: {}", e)))?;
        bytes.resize(size, 0);

        Ok(Self {
            bytes: Arc::new(RwLock::new(bytes)),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn check_range(&self, offset: usize, len: usize) -> ForgeResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(ForgeError::InvalidRange {
                offset,
                size: len,
                capacity: self.size,
            }),
        }
    }

    /// Copy `len` bytes starting at `offset` out of the buffer
    pub fn read(&self, offset: usize, len: usize) -> ForgeResult<Vec<u8>> {
        self.check_range(offset, len)?;
        let bytes = self.bytes.read()?;
        Ok(bytes[offset..offset + len].to_vec())
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> ForgeResult<()> {
        self.check_range(offset, data.len())?;
        let mut bytes = self.bytes.write()?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy a range of this buffer into `dst`.
    ///
    /// Source and destination may be the same buffer.
    pub fn copy_to(
        &self,
        src_offset: usize,
        dst: &HostBuffer,
        dst_offset: usize,
        len: usize,
    ) -> ForgeResult<()> {
        self.check_range(src_offset, len)?;
        dst.check_range(dst_offset, len)?;

        if Arc::ptr_eq(&self.bytes, &dst.bytes) {
            let mut bytes = self.bytes.write()?;
            bytes.copy_within(src_offset..src_offset + len, dst_offset);
            return Ok(());
        }

        let src = self.bytes.read()?;
        let mut out = dst.bytes.write()?;
        out[dst_offset..dst_offset + len].copy_from_slice(&src[src_offset..src_offset + len]);
        Ok(())
    }

    /// Whether both handles refer to the same bytes
    pub fn same_buffer(&self, other: &HostBuffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}
