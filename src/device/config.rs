//! Pooling configuration for a device
//!
//! [`DeviceConfig`] controls whether heap allocations are pooled, how large
//! each heap is, the smallest block order and the total heap budget before
//! requests go straight to direct allocations.

use super::DeviceKind;
use crate::error::{ForgeError, ForgeResult};

/// Total heap bytes a device may own before pooled requests fall back to
/// direct allocations (8 GiB)
pub const DEFAULT_POOL_CEILING: u64 = 8 << 30;

/// Default heap size for the host backend (16 MiB)
pub const DEFAULT_HOST_HEAP_SIZE: usize = 16 << 20;

/// Default heap size for the WebGPU backend (128 MiB)
pub const DEFAULT_WEBGPU_HEAP_SIZE: usize = 128 << 20;

const POOLING_ENV: &str = "BUFFERFORGE_POOLING";
const HEAP_SIZE_ENV: &str = "BUFFERFORGE_HEAP_SIZE";
const MIN_ORDER_ENV: &str = "BUFFERFORGE_MIN_ORDER";

/// Smallest order a WebGPU heap may use: blocks must honour the 4-byte copy alignment
const WEBGPU_MIN_ORDER_FLOOR: u32 = 2;

/// Pooling configuration for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Route `heap_alloc` through buddy heaps
    pub pooling_enabled: bool,

    /// Size of each heap in bytes, must be a power of two
    pub heap_size: usize,

    /// Smallest block order handed out by each heap
    pub min_order: u32,

    /// Total heap bytes before pooled requests go direct
    pub pool_ceiling: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::host()
    }
}

impl DeviceConfig {
    /// Defaults for the host backend
    pub fn host() -> Self {
        DeviceConfig {
            pooling_enabled: true,
            heap_size: DEFAULT_HOST_HEAP_SIZE,
            min_order: 3,
            pool_ceiling: DEFAULT_POOL_CEILING,
        }
    }

    /// Defaults for the WebGPU backend
    pub fn webgpu() -> Self {
        DeviceConfig {
            pooling_enabled: true,
            heap_size: DEFAULT_WEBGPU_HEAP_SIZE,
            min_order: 4,
            pool_ceiling: DEFAULT_POOL_CEILING,
        }
    }

    pub fn for_kind(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Cpu => Self::host(),
            DeviceKind::Webgpu => Self::webgpu(),
        }
    }

    /// Enable or disable pooled allocation
    pub fn with_pooling(mut self, pooling_enabled: bool) -> Self {
        self.pooling_enabled = pooling_enabled;
        self
    }

    /// Set heap size in bytes
    pub fn with_heap_size(mut self, heap_size: usize) -> Self {
        self.heap_size = heap_size;
        self
    }

    /// Set minimum block order
    pub fn with_min_order(mut self, min_order: u32) -> Self {
        self.min_order = min_order;
        self
    }

    /// Set total heap budget in bytes
    pub fn with_pool_ceiling(mut self, pool_ceiling: u64) -> Self {
        self.pool_ceiling = pool_ceiling;
        self
    }

    /// Check the configuration against the backend it will run on.
    ///
    /// # Errors
    /// - `InvalidHeapSize` if `heap_size` is not a power of two
    /// - `InvalidConfiguration` if the smallest block is larger than a heap,
    ///   or a WebGPU heap could hand out blocks below the copy alignment
    pub fn validate(&self, kind: DeviceKind) -> ForgeResult<()> {
        if !self.heap_size.is_power_of_two() {
            return Err(ForgeError::InvalidHeapSize(self.heap_size));
        }
        let heap_order = self.heap_size.trailing_zeros();
        if self.min_order > heap_order {
            return Err(ForgeError::InvalidConfiguration(format!(
                "min_order {} exceeds heap order {} ({} bytes)",
                self.min_order, heap_order, self.heap_size
            )));
        }
        if kind == DeviceKind::Webgpu && self.min_order < WEBGPU_MIN_ORDER_FLOOR {
            return Err(ForgeError::InvalidConfiguration(format!(
                "webgpu min_order must be at least {}, got {}",
                WEBGPU_MIN_ORDER_FLOOR, self.min_order
            )));
        }
        Ok(())
    }

    /// Backend defaults overridden by `BUFFERFORGE_*` variables.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env(kind: DeviceKind) -> Self {
        let mut config = Self::for_kind(kind);

        if let Some(pooling) = read_env(POOLING_ENV, parse_bool) {
            config.pooling_enabled = pooling;
        }
        if let Some(heap_size) = read_env(HEAP_SIZE_ENV, |s| s.parse::<usize>().ok()) {
            config.heap_size = heap_size;
        }
        if let Some(min_order) = read_env(MIN_ORDER_ENV, |s| s.parse::<u32>().ok()) {
            config.min_order = min_order;
        }

        config
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env<T>(name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!("Ignoring unparsable {}={:?}", name, raw);
    }
    parsed
}
