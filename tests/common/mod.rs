//! Shared fixtures for integration tests
//!
//! The WebGPU device is acquired once for the whole test binary. When no
//! adapter is available the fixture is `None` and GPU tests return early.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{gpu_device, serial};
//!
//! #[tokio::test]
//! #[serial]
//! async fn my_gpu_test() {
//!     let Some(device) = gpu_device() else { return };
//!     // ... test code ...
//! }
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use bufferforge::{Device, DeviceConfig};
use once_cell::sync::Lazy;
pub use serial_test::serial;

/// Heap size for the shared GPU device, kept small for software adapters
pub const GPU_TEST_HEAP_SIZE: usize = 1 << 20;

/// Global WebGPU device, initialized once and shared across tests
#[cfg(feature = "webgpu")]
pub static GPU_DEVICE: Lazy<Option<Arc<Device>>> = Lazy::new(|| {
    // Acquisition is async; run it on its own thread so the fixture can be
    // touched from inside a tokio test.
    let acquired = std::thread::spawn(|| {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| e.to_string())?;
        runtime
            .block_on(Device::acquire_webgpu(
                DeviceConfig::webgpu().with_heap_size(GPU_TEST_HEAP_SIZE),
            ))
            .map_err(|e| e.to_string())
    })
    .join();

    match acquired {
        Ok(Ok(device)) => {
            eprintln!("WebGPU test device initialized: {:?}", device.webgpu_context());
            Some(device)
        }
        Ok(Err(e)) => {
            eprintln!("WARNING: WebGPU not available - skipping GPU tests ({})", e);
            None
        }
        Err(_) => {
            eprintln!("WARNING: WebGPU initialization panicked - skipping GPU tests");
            None
        }
    }
});

/// Shared WebGPU device, or `None` when the host has no adapter
#[cfg(feature = "webgpu")]
pub fn gpu_device() -> Option<Arc<Device>> {
    GPU_DEVICE.clone()
}

#[cfg(not(feature = "webgpu"))]
pub fn gpu_device() -> Option<Arc<Device>> {
    None
}

/// Host device with small heaps and byte-granular blocks
pub fn small_host_device(heap_size: usize) -> Arc<Device> {
    Device::cpu_with_config(
        DeviceConfig::host()
            .with_heap_size(heap_size)
            .with_min_order(0),
    )
    .expect("valid host config")
}

pub fn init_test_logging() {
    bufferforge::logging::init_logging_default();
}
