//! Byte ranges of device memory
//!
//! A [`Storage`] is either a dedicated buffer or a block of one of its
//! device's heaps. Dropping a storage (or calling [`Storage::destroy`])
//! releases its memory exactly once: pooled blocks go back to their heap,
//! dedicated device buffers are destroyed.
//!
//! Storages are not `Clone`. Share one through `Arc<Storage>`, or make an
//! independent copy with [`Storage::deep_clone`].

use std::fmt;
use std::sync::Arc;

use crate::backend::RawBuffer;
#[cfg(feature = "webgpu")]
use crate::backend::webgpu::{align_copy, COPY_ALIGNMENT};
use crate::device::Device;
use crate::dtype::{Dtype, TypedData};
use crate::error::{ForgeError, ForgeResult};
use crate::memory::HeapBlock;

enum Backing {
    Direct(RawBuffer),
    Pooled(HeapBlock<RawBuffer>),
}

impl Backing {
    fn buffer(&self) -> &RawBuffer {
        match self {
            Backing::Direct(buffer) => buffer,
            Backing::Pooled(block) => block.buffer(),
        }
    }
}

/// A byte range on a device
pub struct Storage {
    device: Arc<Device>,
    byte_offset: usize,
    byte_size: usize,
    backing: Option<Backing>,
}

impl Storage {
    pub(crate) fn direct(device: Arc<Device>, buffer: RawBuffer, byte_size: usize) -> ForgeResult<Self> {
        if byte_size > buffer.size() {
            return Err(ForgeError::InvalidRange {
                offset: 0,
                size: byte_size,
                capacity: buffer.size(),
            });
        }
        Ok(Self {
            device,
            byte_offset: 0,
            byte_size,
            backing: Some(Backing::Direct(buffer)),
        })
    }

    pub(crate) fn pooled(
        device: Arc<Device>,
        block: HeapBlock<RawBuffer>,
        byte_size: usize,
    ) -> ForgeResult<Self> {
        if byte_size > block.byte_size() {
            return Err(ForgeError::InvalidRange {
                offset: block.offset(),
                size: byte_size,
                capacity: block.byte_size(),
            });
        }
        Ok(Self {
            device,
            byte_offset: block.offset(),
            byte_size,
            backing: Some(Backing::Pooled(block)),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn device_id(&self) -> &str {
        self.device.id()
    }

    /// Offset of the range within its backing buffer
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Whether the range is a block of a device heap
    pub fn is_pooled(&self) -> bool {
        matches!(self.backing, Some(Backing::Pooled(_)))
    }

    pub fn is_host(&self) -> bool {
        self.buffer().map(RawBuffer::is_host).unwrap_or(false)
    }

    /// Backing buffer, for executors that bind storages into kernels
    pub fn buffer(&self) -> ForgeResult<&RawBuffer> {
        self.backing
            .as_ref()
            .map(Backing::buffer)
            .ok_or_else(|| ForgeError::BackendMismatch("storage already released".to_string()))
    }

    /// Release the storage's memory now.
    pub fn destroy(mut self) -> ForgeResult<()> {
        self.release()
    }

    fn release(&mut self) -> ForgeResult<()> {
        match self.backing.take() {
            None => Ok(()),
            Some(Backing::Direct(buffer)) => {
                buffer.destroy();
                Ok(())
            }
            Some(Backing::Pooled(block)) => block.release(),
        }
    }

    /// Independent copy in a new dedicated buffer on the same device.
    pub fn deep_clone(&self) -> ForgeResult<Storage> {
        let copy = self.device.alloc(self.byte_size)?;

        match (self.buffer()?, copy.buffer()?) {
            (RawBuffer::Host(src), RawBuffer::Host(dst)) => {
                src.copy_to(self.byte_offset, dst, copy.byte_offset, self.byte_size)?;
            }
            #[cfg(feature = "webgpu")]
            (RawBuffer::Gpu(src), RawBuffer::Gpu(dst)) => {
                self.device.gpu_context()?.copy_buffer(
                    src,
                    self.byte_offset,
                    dst,
                    copy.byte_offset,
                    self.byte_size,
                )?;
            }
            #[cfg(feature = "webgpu")]
            _ => {
                return Err(ForgeError::BackendMismatch(
                    "clone source and destination live on different backends".to_string(),
                ))
            }
        }

        Ok(copy)
    }

    /// Host copy of the range viewed as `dtype`.
    ///
    /// Host-backed storages complete without waiting. Accelerator storages
    /// are copied through a staging buffer.
    ///
    /// # Errors
    /// - `MisalignedRange` if the size is not a multiple of the element width
    /// - `DeviceError` if the accelerator readback fails
    pub async fn materialize_async(&self, dtype: Dtype) -> ForgeResult<TypedData> {
        dtype.element_count(self.byte_size)?;

        let bytes = match self.buffer()? {
            RawBuffer::Host(buffer) => buffer.read(self.byte_offset, self.byte_size)?,
            #[cfg(feature = "webgpu")]
            RawBuffer::Gpu(buffer) => {
                self.device
                    .gpu_context()?
                    .read_buffer(buffer, self.byte_offset, self.byte_size)
                    .await?
            }
        };

        tracing::trace!(
            "Materialized {} bytes as {} from device '{}'",
            self.byte_size,
            dtype,
            self.device.id()
        );
        TypedData::from_bytes(dtype, &bytes)
    }

    /// Overwrite bytes starting at `offset` within the range.
    ///
    /// On the accelerator the offset must be 4-byte aligned, and a length
    /// that is not a multiple of 4 is only accepted when the write ends at
    /// the end of the storage (the tail is zero padded).
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> ForgeResult<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.byte_size)
            .ok_or(ForgeError::InvalidRange {
                offset,
                size: bytes.len(),
                capacity: self.byte_size,
            })?;

        let result = match self.buffer()? {
            RawBuffer::Host(buffer) => buffer.write(self.byte_offset + offset, bytes),
            #[cfg(feature = "webgpu")]
            RawBuffer::Gpu(buffer) => {
                let context = self.device.gpu_context()?;
                let target = self.byte_offset + offset;
                if bytes.len() % COPY_ALIGNMENT == 0 {
                    context.write_buffer(buffer, target, bytes)
                } else if end == self.byte_size {
                    let mut padded = bytes.to_vec();
                    padded.resize(align_copy(bytes.len()), 0);
                    context.write_buffer(buffer, target, &padded)
                } else {
                    Err(ForgeError::UnalignedDeviceWrite {
                        offset,
                        len: bytes.len(),
                    })
                }
            }
        };

        if result.is_ok() {
            tracing::trace!("Wrote {} bytes at {}..{} on '{}'", bytes.len(), offset, end, self.device.id());
        }
        result
    }

    /// Overwrite the start of the range with `data`
    pub fn write_data(&self, data: &TypedData) -> ForgeResult<()> {
        self.write_bytes(0, data.as_bytes())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::error!(
                "Failed to release {} byte storage on '{}': {}",
                self.byte_size,
                self.device.id(),
                e
            );
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("device", &self.device.id())
            .field("byte_offset", &self.byte_offset)
            .field("byte_size", &self.byte_size)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}
