//! Device-resident buffers for the wgpu backend

use std::sync::Arc;

/// Copies and buffer sizes must be multiples of this many bytes.
pub const COPY_ALIGNMENT: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

/// Round `size` up to the copy alignment
pub fn align_copy(size: usize) -> usize {
    size.div_ceil(COPY_ALIGNMENT) * COPY_ALIGNMENT
}

/// Storage buffer on the accelerator
///
/// Usable as a shader storage binding and as both copy source and
/// destination. The allocation may be larger than the requested size because
/// of copy alignment.
#[derive(Debug, Clone)]
pub struct GpuBuffer {
    raw: Arc<wgpu::Buffer>,
}

impl GpuBuffer {
    pub(crate) fn new(raw: wgpu::Buffer) -> Self {
        Self { raw: Arc::new(raw) }
    }

    /// Underlying wgpu buffer, for binding into compute passes
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw
    }

    /// Allocated size in bytes
    pub fn size(&self) -> usize {
        self.raw.size() as usize
    }

    /// Release device memory right away instead of waiting for the last drop
    pub fn destroy(&self) {
        self.raw.destroy();
    }

    pub fn same_buffer(&self, other: &GpuBuffer) -> bool {
        Arc::ptr_eq(&self.raw, &other.raw)
    }
}
