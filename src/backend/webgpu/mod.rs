//! Accelerator backend on top of wgpu
//!
//! Runs on any native wgpu backend (Vulkan, Metal, DX12, GL). All transfers
//! honour wgpu's 4-byte copy alignment.

pub mod buffer;
pub mod context;

pub use buffer::{align_copy, GpuBuffer, COPY_ALIGNMENT};
pub use context::WebGpuContext;
