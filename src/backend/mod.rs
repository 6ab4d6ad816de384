//! Memory backends: host byte buffers and, with the `webgpu` feature, wgpu
//! storage buffers

pub mod host;
#[cfg(feature = "webgpu")]
pub mod webgpu;

pub use host::HostBuffer;
#[cfg(feature = "webgpu")]
pub use webgpu::{GpuBuffer, WebGpuContext};

/// Backing allocation of a storage or of a heap
#[derive(Debug, Clone)]
pub enum RawBuffer {
    Host(HostBuffer),
    #[cfg(feature = "webgpu")]
    Gpu(GpuBuffer),
}

impl RawBuffer {
    /// Allocated size in bytes
    pub fn size(&self) -> usize {
        match self {
            RawBuffer::Host(buffer) => buffer.size(),
            #[cfg(feature = "webgpu")]
            RawBuffer::Gpu(buffer) => buffer.size(),
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, RawBuffer::Host(_))
    }

    /// Release the allocation eagerly where the backend supports it.
    ///
    /// Host memory is freed when the last handle drops.
    pub fn destroy(&self) {
        match self {
            RawBuffer::Host(_) => {}
            #[cfg(feature = "webgpu")]
            RawBuffer::Gpu(buffer) => buffer.destroy(),
        }
    }
}
