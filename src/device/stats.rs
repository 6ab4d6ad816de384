//! Allocation and cache statistics for a device

use std::fmt;

/// Running allocation counters, updated under the device's stats lock
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AllocationCounters {
    pub pooled_allocations: u64,
    pub direct_allocations: u64,
    pub heap_fallbacks: u64,
}

/// Snapshot of a device's pooling state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStats {
    /// Number of heaps the device owns
    pub heaps: usize,
    /// Total bytes reserved by those heaps
    pub pooled_bytes: usize,
    /// Bytes currently held by live heap blocks
    pub pooled_in_use: usize,
    /// Heap blocks handed out since creation
    pub pooled_allocations: u64,
    /// Direct allocations since creation (including fallbacks)
    pub direct_allocations: u64,
    /// Pooled requests that had to fall back to a direct allocation
    pub heap_fallbacks: u64,
    /// Kernels in the compiled-kernel cache
    pub cached_kernels: usize,
}

impl DeviceStats {
    /// Share of heap bytes currently handed out
    pub fn pool_utilization(&self) -> f64 {
        if self.pooled_bytes == 0 {
            0.0
        } else {
            self.pooled_in_use as f64 / self.pooled_bytes as f64
        }
    }
}

impl fmt::Display for DeviceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceStats {{ heaps: {}, pooled: {}/{} bytes ({:.1}%), pooled allocs: {}, direct allocs: {}, fallbacks: {}, kernels: {} }}",
            self.heaps,
            self.pooled_in_use,
            self.pooled_bytes,
            self.pool_utilization() * 100.0,
            self.pooled_allocations,
            self.direct_allocations,
            self.heap_fallbacks,
            self.cached_kernels
        )
    }
}
