//! Compute devices: pooled and direct allocation plus a kernel cache
//!
//! A [`Device`] owns a growing list of buddy heaps. `heap_alloc` serves
//! requests from those heaps, creates new heaps while the total stays under
//! the pool ceiling and otherwise falls back to `alloc`, which creates a
//! dedicated buffer per request.
//!
//! Devices are shared as `Arc<Device>`; every storage keeps its device alive.

pub mod config;
pub mod registry;
pub mod stats;

use std::fmt;
use std::sync::{Arc, Mutex};

pub use config::{DeviceConfig, DEFAULT_POOL_CEILING};
pub use registry::DeviceRegistry;
pub use stats::DeviceStats;

use crate::backend::{HostBuffer, RawBuffer};
#[cfg(feature = "webgpu")]
use crate::backend::WebGpuContext;
use crate::dtype::TypedData;
use crate::error::ForgeResult;
use crate::kernel::{Kernel, KernelBackend, KernelCache, KernelConfigInput, KernelRegistry};
use crate::memory::{BuddyHeap, HeapBlock, SharedHeap};
use crate::storage::Storage;
use stats::AllocationCounters;

/// Device type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Webgpu,
}

impl DeviceKind {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Webgpu => "webgpu",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpu" => Some(DeviceKind::Cpu),
            "webgpu" => Some(DeviceKind::Webgpu),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum DeviceBackend {
    Host,
    #[cfg(feature = "webgpu")]
    Webgpu(Arc<WebGpuContext>),
}

/// A compute device
///
/// # Thread Safety
///
/// The heap list, every heap, the kernel cache and the allocation counters
/// each sit behind their own `Mutex`. Lock order is heap list, then heap,
/// then counters.
pub struct Device {
    id: String,
    kind: DeviceKind,
    backend: DeviceBackend,
    config: DeviceConfig,
    heaps: Mutex<Vec<SharedHeap<RawBuffer>>>,
    kernels: KernelCache,
    counters: Mutex<AllocationCounters>,
}

impl Device {
    fn build(id: &str, kind: DeviceKind, backend: DeviceBackend, config: DeviceConfig) -> Arc<Self> {
        tracing::info!(
            "Device '{}' ready (pooling: {}, heap size: {} bytes, min order: {})",
            id,
            config.pooling_enabled,
            config.heap_size,
            config.min_order
        );
        Arc::new(Self {
            id: id.to_string(),
            kind,
            backend,
            config,
            heaps: Mutex::new(Vec::new()),
            kernels: KernelCache::new(),
            counters: Mutex::new(AllocationCounters::default()),
        })
    }

    /// Host device with default pooling
    pub fn cpu() -> Arc<Self> {
        Self::build("cpu", DeviceKind::Cpu, DeviceBackend::Host, DeviceConfig::host())
    }

    /// Host device with a custom pooling configuration
    pub fn cpu_with_config(config: DeviceConfig) -> ForgeResult<Arc<Self>> {
        config.validate(DeviceKind::Cpu)?;
        Ok(Self::build("cpu", DeviceKind::Cpu, DeviceBackend::Host, config))
    }

    /// WebGPU device over an already acquired context
    #[cfg(feature = "webgpu")]
    pub fn webgpu(context: Arc<WebGpuContext>, config: DeviceConfig) -> ForgeResult<Arc<Self>> {
        config.validate(DeviceKind::Webgpu)?;
        Ok(Self::build(
            "webgpu",
            DeviceKind::Webgpu,
            DeviceBackend::Webgpu(context),
            config,
        ))
    }

    /// Acquire an adapter and open a WebGPU device on it
    #[cfg(feature = "webgpu")]
    pub async fn acquire_webgpu(config: DeviceConfig) -> ForgeResult<Arc<Self>> {
        config.validate(DeviceKind::Webgpu)?;
        let context = WebGpuContext::request().await?;
        Self::webgpu(Arc::new(context), config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_host(&self) -> bool {
        self.kind == DeviceKind::Cpu
    }

    #[cfg(feature = "webgpu")]
    pub fn webgpu_context(&self) -> Option<&Arc<WebGpuContext>> {
        match &self.backend {
            DeviceBackend::Webgpu(context) => Some(context),
            DeviceBackend::Host => None,
        }
    }

    #[cfg(feature = "webgpu")]
    pub(crate) fn gpu_context(&self) -> ForgeResult<&Arc<WebGpuContext>> {
        self.webgpu_context().ok_or_else(|| {
            crate::error::ForgeError::BackendMismatch(format!("device '{}' has no WebGPU context", self.id))
        })
    }

    /// Create a dedicated storage of `byte_size` bytes.
    ///
    /// # Errors
    /// - `OutOfMemory` if the backend cannot provide the buffer
    pub fn alloc(self: &Arc<Self>, byte_size: usize) -> ForgeResult<Storage> {
        let buffer = self.allocate_buffer(byte_size, "bufferforge direct")?;
        self.counters.lock()?.direct_allocations += 1;
        Storage::direct(Arc::clone(self), buffer, byte_size)
    }

    /// Create a storage, preferring a block of one of the device's heaps.
    ///
    /// Heaps are tried in creation order and the first one that can serve the
    /// request wins. When none can, a new heap is created while the pool is
    /// under its ceiling; if that still fails the request becomes a direct
    /// allocation. Requests larger than a heap go direct without creating one.
    ///
    /// # Errors
    /// - `OutOfMemory` if the direct fallback fails as well
    pub fn heap_alloc(self: &Arc<Self>, byte_size: usize) -> ForgeResult<Storage> {
        if !self.config.pooling_enabled {
            return self.alloc(byte_size);
        }

        {
            let mut heaps = self.heaps.lock()?;
            for heap in heaps.iter() {
                if let Some(block) = HeapBlock::allocate(heap, byte_size)? {
                    return self.pooled_storage(block, byte_size);
                }
            }

            let pooled_total = (heaps.len() as u64).saturating_mul(self.config.heap_size as u64);
            if !self.fits_heap(byte_size) {
                tracing::debug!(
                    "Device '{}': {} bytes exceed the {} byte heap size, allocating directly",
                    self.id,
                    byte_size,
                    self.config.heap_size
                );
            } else if pooled_total < self.config.pool_ceiling {
                match self.create_heap(heaps.len()) {
                    Ok(heap) => {
                        heaps.push(Arc::clone(&heap));
                        if let Some(block) = HeapBlock::allocate(&heap, byte_size)? {
                            return self.pooled_storage(block, byte_size);
                        }
                        tracing::debug!(
                            "Device '{}': {} bytes do not fit a fresh {} byte heap",
                            self.id,
                            byte_size,
                            self.config.heap_size
                        );
                    }
                    Err(e) if e.is_out_of_memory() => {
                        tracing::warn!("Device '{}': heap creation failed: {}", self.id, e);
                    }
                    Err(e) => return Err(e),
                }
            } else {
                tracing::warn!(
                    "Device '{}': pool ceiling of {} bytes reached, allocating {} bytes directly",
                    self.id,
                    self.config.pool_ceiling,
                    byte_size
                );
            }
        }

        self.counters.lock()?.heap_fallbacks += 1;
        self.alloc(byte_size)
    }

    /// Whether a block for `byte_size` bytes can come out of one heap
    fn fits_heap(&self, byte_size: usize) -> bool {
        let min_block = 1usize.checked_shl(self.config.min_order).unwrap_or(usize::MAX);
        byte_size
            .checked_next_power_of_two()
            .map(|block| block.max(min_block) <= self.config.heap_size)
            .unwrap_or(false)
    }

    /// Allocate a storage and fill it with `data`
    pub fn storage_from_data(self: &Arc<Self>, data: &TypedData, pooled: bool) -> ForgeResult<Storage> {
        let storage = if pooled {
            self.heap_alloc(data.byte_len())?
        } else {
            self.alloc(data.byte_len())?
        };
        storage.write_bytes(0, data.as_bytes())?;
        Ok(storage)
    }

    /// Kernel `name` configured by `config`, constructed at most once per
    /// canonical key.
    ///
    /// # Errors
    /// - `KernelNotFound` if the registry has no such kernel
    /// - `MissingKernelConfig` if a declared config value is absent
    pub fn get_kernel(
        &self,
        registry: &dyn KernelRegistry,
        name: &str,
        config: &KernelConfigInput,
    ) -> ForgeResult<Arc<Kernel>> {
        let spec = registry.resolve_spec(name)?;
        let normalized = registry.normalize_config(&spec, config)?;
        let key = registry.derive_key(&spec, &normalized);

        self.kernels.get_or_try_insert(name, &key, || {
            let backend = match &self.backend {
                DeviceBackend::Host => KernelBackend::Host,
                #[cfg(feature = "webgpu")]
                DeviceBackend::Webgpu(context) => KernelBackend::Shader(
                    crate::kernel::ShaderKernel::new(Arc::clone(context.device()), &spec, &key),
                ),
            };
            Ok(Kernel::new(key.clone(), Arc::clone(&spec), normalized, &self.id, backend))
        })
    }

    /// Number of heaps created so far
    pub fn heap_count(&self) -> ForgeResult<usize> {
        Ok(self.heaps.lock()?.len())
    }

    pub fn stats(&self) -> ForgeResult<DeviceStats> {
        let heaps = self.heaps.lock()?;
        let mut pooled_bytes = 0;
        let mut pooled_in_use = 0;
        for heap in heaps.iter() {
            let heap = heap.lock()?;
            pooled_bytes += heap.size();
            pooled_in_use += heap.allocated_bytes();
        }
        let counters = *self.counters.lock()?;

        Ok(DeviceStats {
            heaps: heaps.len(),
            pooled_bytes,
            pooled_in_use,
            pooled_allocations: counters.pooled_allocations,
            direct_allocations: counters.direct_allocations,
            heap_fallbacks: counters.heap_fallbacks,
            cached_kernels: self.kernels.len()?,
        })
    }

    fn pooled_storage(self: &Arc<Self>, block: HeapBlock<RawBuffer>, byte_size: usize) -> ForgeResult<Storage> {
        self.counters.lock()?.pooled_allocations += 1;
        Storage::pooled(Arc::clone(self), block, byte_size)
    }

    fn create_heap(&self, index: usize) -> ForgeResult<SharedHeap<RawBuffer>> {
        let size = self.config.heap_size;
        let buffer = self.allocate_buffer(size, "bufferforge heap")?;
        let heap = BuddyHeap::new(buffer, size, self.config.min_order)?;
        tracing::info!(
            "Device '{}' created heap #{} ({} bytes, min order {})",
            self.id,
            index,
            size,
            self.config.min_order
        );
        Ok(Arc::new(Mutex::new(heap)))
    }

    /// Backend primitive behind direct allocations and heap creation
    fn allocate_buffer(&self, byte_size: usize, label: &str) -> ForgeResult<RawBuffer> {
        let buffer = match &self.backend {
            DeviceBackend::Host => RawBuffer::Host(HostBuffer::allocate(byte_size)?),
            #[cfg(feature = "webgpu")]
            DeviceBackend::Webgpu(context) => {
                RawBuffer::Gpu(context.create_storage_buffer(byte_size, label)?)
            }
        };
        tracing::trace!("Device '{}' allocated '{}' ({} bytes)", self.id, label, byte_size);
        Ok(buffer)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .finish()
    }
}
