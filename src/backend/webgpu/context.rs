//! wgpu device/queue acquisition and buffer transfer primitives

use std::sync::Arc;

use tokio::sync::oneshot;
use wgpu::BufferUsages;

use super::buffer::{align_copy, GpuBuffer, COPY_ALIGNMENT};
use crate::device_error;
use crate::error::{out_of_memory, ForgeError, ForgeResult};

/// Acquired accelerator: device, queue and adapter description
pub struct WebGpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
}

impl WebGpuContext {
    /// Request a high-performance adapter and open a device on it.
    ///
    /// # Errors
    /// - `AdapterUnavailable` if no adapter exists or the device request fails
    pub async fn request() -> ForgeResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ForgeError::AdapterUnavailable(e.to_string()))?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            "WebGPU adapter: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("bufferforge device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| ForgeError::AdapterUnavailable(e.to_string()))?;

        Ok(Self::from_parts(Arc::new(device), Arc::new(queue), adapter_info))
    }

    /// Wrap a device and queue that were opened elsewhere
    pub fn from_parts(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        adapter_info: wgpu::AdapterInfo,
    ) -> Self {
        Self {
            device,
            queue,
            adapter_info,
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Create a storage buffer of at least `byte_size` bytes.
    ///
    /// The allocation is padded to the copy alignment and never empty.
    ///
    /// # Errors
    /// - `OutOfMemory` if the padded size exceeds the device's buffer limit
    pub fn create_storage_buffer(&self, byte_size: usize, label: &str) -> ForgeResult<GpuBuffer> {
        let padded = align_copy(byte_size.max(1));
        let max = self.device.limits().max_buffer_size;
        if padded as u64 > max {
            return Err(out_of_memory(
                byte_size,
                format!("exceeds device buffer limit of {} bytes", max),
            ));
        }

        let raw = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::trace!("Created storage buffer '{}' ({} bytes)", label, padded);
        Ok(GpuBuffer::new(raw))
    }

    /// Queue a host-to-device write. Offset and length must be copy aligned.
    pub fn write_buffer(&self, dst: &GpuBuffer, offset: usize, data: &[u8]) -> ForgeResult<()> {
        if offset % COPY_ALIGNMENT != 0 || data.len() % COPY_ALIGNMENT != 0 {
            return Err(ForgeError::UnalignedDeviceWrite {
                offset,
                len: data.len(),
            });
        }
        Self::check_range(dst, offset, data.len())?;
        self.queue.write_buffer(dst.raw(), offset as u64, data);
        Ok(())
    }

    /// Record and submit a device-to-device copy.
    ///
    /// `size` is padded to the copy alignment; the padded range must still
    /// fit in both buffers.
    pub fn copy_buffer(
        &self,
        src: &GpuBuffer,
        src_offset: usize,
        dst: &GpuBuffer,
        dst_offset: usize,
        size: usize,
    ) -> ForgeResult<()> {
        let padded = align_copy(size);
        if padded == 0 {
            return Ok(());
        }
        if src_offset % COPY_ALIGNMENT != 0 || dst_offset % COPY_ALIGNMENT != 0 {
            return Err(device_error!(
                "copy offsets {} -> {} are not {}-byte aligned",
                src_offset,
                dst_offset,
                COPY_ALIGNMENT
            ));
        }
        Self::check_range(src, src_offset, padded)?;
        Self::check_range(dst, dst_offset, padded)?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bufferforge copy"),
            });
        encoder.copy_buffer_to_buffer(
            src.raw(),
            src_offset as u64,
            dst.raw(),
            dst_offset as u64,
            padded as u64,
        );
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    /// Read `size` bytes at `offset` back to the host.
    ///
    /// Copies the range into a mappable staging buffer, waits for the map to
    /// complete and returns exactly `size` bytes. The staging buffer is
    /// destroyed before returning.
    ///
    /// # Errors
    /// - `DeviceError` if the staging buffer never reaches the mapped state
    pub async fn read_buffer(&self, src: &GpuBuffer, offset: usize, size: usize) -> ForgeResult<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let padded = align_copy(size);
        Self::check_range(src, offset, padded)?;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bufferforge staging"),
            size: padded as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bufferforge readback"),
            });
        encoder.copy_buffer_to_buffer(src.raw(), offset as u64, &staging, 0, padded as u64);
        self.queue.submit([encoder.finish()]);

        let slice = staging.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| device_error!("device poll failed: {:?}", e))?;

        let mapped = rx
            .await
            .map_err(|_| device_error!("staging map callback dropped"))?;
        if let Err(e) = mapped {
            staging.destroy();
            return Err(device_error!("staging buffer map failed: {:?}", e));
        }

        let bytes = {
            let view = slice.get_mapped_range();
            view[..size].to_vec()
        };
        staging.unmap();
        staging.destroy();

        tracing::trace!("Read back {} bytes at offset {}", size, offset);
        Ok(bytes)
    }

    fn check_range(buffer: &GpuBuffer, offset: usize, len: usize) -> ForgeResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= buffer.size() => Ok(()),
            _ => Err(ForgeError::InvalidRange {
                offset,
                size: len,
                capacity: buffer.size(),
            }),
        }
    }
}

impl std::fmt::Debug for WebGpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebGpuContext")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .finish()
    }
}
