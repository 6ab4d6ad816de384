//! Registry of available devices
//!
//! The host device is always present under id `"cpu"`. An accelerator is
//! added by [`DeviceRegistry::discover_webgpu`], which is the one place that
//! waits on adapter and device acquisition.

use std::sync::Arc;

use super::{Device, DeviceKind};
use crate::error::{ForgeError, ForgeResult};

#[derive(Debug)]
pub struct DeviceRegistry {
    /// Registration order; the host device is always first
    devices: Vec<Arc<Device>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::with_host(Device::cpu())
    }

    /// Registry whose host device is `cpu`
    pub fn with_host(cpu: Arc<Device>) -> Self {
        Self { devices: vec![cpu] }
    }

    /// Add a device, replacing one registered under the same id
    pub fn register(&mut self, device: Arc<Device>) {
        tracing::info!("Registered device '{}' ({})", device.id(), device.kind());
        match self.devices.iter_mut().find(|d| d.id() == device.id()) {
            Some(slot) => *slot = device,
            None => self.devices.push(device),
        }
    }

    /// Try to acquire a WebGPU device and register it as `"webgpu"`.
    ///
    /// Returns whether an accelerator is now available.
    #[cfg(feature = "webgpu")]
    pub async fn discover_webgpu(&mut self) -> bool {
        if self.devices.iter().any(|d| d.kind() == DeviceKind::Webgpu) {
            return true;
        }

        let config = super::DeviceConfig::from_env(DeviceKind::Webgpu);
        match Device::acquire_webgpu(config).await {
            Ok(device) => {
                self.register(device);
                true
            }
            Err(e) => {
                tracing::info!("WebGPU unavailable, continuing with host only: {}", e);
                false
            }
        }
    }

    /// Look up by id, then by kind name.
    ///
    /// # Errors
    /// - `DeviceNotFound` if neither matches
    pub fn get(&self, id_or_kind: &str) -> ForgeResult<Arc<Device>> {
        if let Some(device) = self.devices.iter().find(|d| d.id() == id_or_kind) {
            return Ok(Arc::clone(device));
        }
        DeviceKind::parse(id_or_kind)
            .and_then(|kind| self.devices.iter().find(|d| d.kind() == kind))
            .cloned()
            .ok_or_else(|| ForgeError::DeviceNotFound(id_or_kind.to_string()))
    }

    /// The accelerator if one is registered, else the host device
    pub fn default_device(&self) -> Arc<Device> {
        self.devices
            .iter()
            .find(|d| d.kind() == DeviceKind::Webgpu)
            .unwrap_or(&self.devices[0])
            .clone()
    }

    pub fn cpu(&self) -> Arc<Device> {
        Arc::clone(&self.devices[0])
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn has_accelerator(&self) -> bool {
        self.devices.iter().any(|d| !d.is_host())
    }
}
