//! bufferforge - pooled device memory for tensor backends
//!
//! Buddy-heap sub-allocation of host and WebGPU buffers, device-resident
//! storages with async host materialization, per-device kernel caches and a
//! lazy, memoized computation graph.

#![allow(clippy::type_complexity)] // Executor closures spell out their full signature
#![allow(clippy::new_without_default)] // Builders read better with explicit new()

pub mod backend;
pub mod device;
pub mod dtype;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod storage;

pub use backend::RawBuffer;
pub use device::{Device, DeviceConfig, DeviceKind, DeviceRegistry, DeviceStats};
pub use dtype::{Dtype, TypedData};
pub use error::{ErrorCategory, ForgeError, ForgeResult};
pub use graph::{Graph, GraphNode, NodeId};
pub use kernel::{
    Kernel, KernelConfigInput, KernelExecutor, KernelParams, KernelRegistry, KernelSpec,
    SpecRegistry,
};
pub use memory::{Block, BuddyHeap, HeapBlock};
pub use storage::Storage;
