//! Unified error handling for bufferforge
//!
//! This module provides a centralized error type shared by the allocator,
//! device, storage and graph layers. Errors are categorized as:
//! - Config errors (bad heap sizes, misaligned byte ranges)
//! - Resource errors (true out-of-memory after every fallback failed)
//! - Lookup errors (unknown kernels, devices, nodes, missing config values)
//! - Device errors (accelerator buffers that never reach a mapped state)
//! - Internal errors (poisoned locks, executor failures)
//!
//! The buddy allocator never produces an error when it runs out of blocks: it
//! returns `None` so the device can walk its fallback chain.

use std::fmt;

/// Unified error type for bufferforge
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    // ========== Config Errors ==========
    /// Heap size is not an exact power of two
    #[error("heap size must be a power of two, got {0} bytes")]
    InvalidHeapSize(usize),

    /// Byte range cannot be viewed with the requested element width
    #[error("byte size {byte_size} is not divisible by element width {element_size}")]
    MisalignedRange {
        byte_size: usize,
        element_size: usize,
    },

    /// Byte range falls outside of the underlying buffer
    #[error("byte range [{offset}, {offset}+{size}) exceeds buffer of {capacity} bytes")]
    InvalidRange {
        offset: usize,
        size: usize,
        capacity: usize,
    },

    /// Device-side writes must start on a 4-byte boundary
    #[error("unaligned device write at offset {offset} ({len} bytes)")]
    UnalignedDeviceWrite { offset: usize, len: usize },

    /// Invalid device or heap configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== Resource Errors ==========
    /// Every allocation path failed
    #[error("out of memory allocating {requested} bytes: {reason}")]
    OutOfMemory { requested: usize, reason: String },

    // ========== Lookup Errors ==========
    /// Kernel name not present in the registry
    #[error("kernel not found: {0}")]
    KernelNotFound(String),

    /// Config value declared by the kernel spec is absent
    #[error("missing config value for {name} in kernel {kernel}")]
    MissingKernelConfig { kernel: String, name: String },

    /// Parameter declared by the kernel spec is absent
    #[error("missing parameter {name} for kernel {kernel}")]
    MissingKernelParameter { kernel: String, name: String },

    /// No device registered under this id or kind
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Graph node id does not belong to the graph
    #[error("graph node not found: {0}")]
    NodeNotFound(usize),

    /// Operation mixed buffers from different backends
    #[error("backend mismatch: {0}")]
    BackendMismatch(String),

    // ========== Device Errors ==========
    /// Accelerator buffer failed to reach a mapped/readable state
    #[error("device error: {0}")]
    DeviceError(String),

    /// No accelerator adapter or device could be acquired
    #[error("accelerator unavailable: {0}")]
    AdapterUnavailable(String),

    // ========== Internal Errors ==========
    /// Lock poisoned (indicates a panic while holding a heap or cache lock)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// Kernel execution strategy reported a failure
    #[error("kernel execution failed: {0}")]
    ExecutionFailed(String),
}

impl ForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            ForgeError::InvalidHeapSize(_)
            | ForgeError::MisalignedRange { .. }
            | ForgeError::InvalidRange { .. }
            | ForgeError::UnalignedDeviceWrite { .. }
            | ForgeError::InvalidConfiguration(_) => ErrorCategory::Config,

            ForgeError::OutOfMemory { .. } => ErrorCategory::Resource,

            ForgeError::KernelNotFound(_)
            | ForgeError::MissingKernelConfig { .. }
            | ForgeError::MissingKernelParameter { .. }
            | ForgeError::DeviceNotFound(_)
            | ForgeError::NodeNotFound(_)
            | ForgeError::BackendMismatch(_) => ErrorCategory::Lookup,

            ForgeError::DeviceError(_) | ForgeError::AdapterUnavailable(_) => {
                ErrorCategory::Device
            }

            ForgeError::LockPoisoned(_) | ForgeError::ExecutionFailed(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Raised synchronously at the point of misconfiguration
    pub fn is_config_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Config)
    }

    /// True exhaustion: pool, new heap and direct allocation all failed
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, ForgeError::OutOfMemory { .. })
    }

    /// Unknown kernel, device, node or unsupported configuration
    pub fn is_lookup_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Lookup)
    }

    /// Accelerator interaction failed
    pub fn is_device_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Device)
    }
}

/// Error category for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Misconfiguration detected at construction or call time
    Config,
    /// Memory exhausted on every fallback path
    Resource,
    /// Name, id or configuration lookup failed
    Lookup,
    /// Accelerator failure
    Device,
    /// Bug or broken invariant
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Resource => write!(f, "Resource"),
            ErrorCategory::Lookup => write!(f, "Lookup"),
            ErrorCategory::Device => write!(f, "Device"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ForgeError::LockPoisoned(err.to_string())
    }
}

/// Helper type alias for Results using ForgeError
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

/// Create a device error with context
///
/// # Examples
/// ```ignore
/// return Err(device_error!("staging buffer map failed: {:?}", err));
/// ```
#[macro_export]
macro_rules! device_error {
    ($msg:expr) => {
        $crate::error::ForgeError::DeviceError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ForgeError::DeviceError(format!($fmt, $($arg)*))
    };
}

/// Build an out-of-memory error for a request
pub fn out_of_memory(requested: usize, reason: impl Into<String>) -> ForgeError {
    ForgeError::OutOfMemory {
        requested,
        reason: reason.into(),
    }
}
