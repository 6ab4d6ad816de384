//! Compute kernels: specs, configuration keys, per-device construction and
//! the executor seam used by the graph
//!
//! A [`Kernel`] is a spec bound to one configuration on one device. Devices
//! cache kernels by their canonical key (see [`spec::derive_key`]); running a
//! kernel is delegated to a [`KernelExecutor`] supplied by the caller.

pub mod cache;
pub mod registry;
pub mod shader;
pub mod spec;

use std::sync::Arc;

pub use cache::KernelCache;
pub use registry::{KernelRegistry, SpecRegistry};
#[cfg(feature = "webgpu")]
pub use shader::ShaderKernel;
pub use spec::{
    derive_key, normalize_config, ConfigValue, KernelBindingSpec, KernelConfig,
    KernelConfigInput, KernelKey, KernelParamSpec, KernelParams, KernelSpec, ParamType,
    ShaderType,
};

use crate::error::{ForgeError, ForgeResult};
use crate::storage::Storage;

/// Backend-specific part of a kernel
#[derive(Debug)]
pub enum KernelBackend {
    /// Generic host kernel; the executor interprets the spec
    Host,
    /// WGSL shader compiled for a wgpu device
    #[cfg(feature = "webgpu")]
    Shader(ShaderKernel),
}

/// A kernel spec bound to a configuration and a device
///
/// Holds the owning device's id, not the device itself, so a device's kernel
/// cache never keeps its device alive.
#[derive(Debug)]
pub struct Kernel {
    key: KernelKey,
    spec: Arc<KernelSpec>,
    config: KernelConfig,
    device_id: String,
    backend: KernelBackend,
}

impl Kernel {
    pub(crate) fn new(
        key: KernelKey,
        spec: Arc<KernelSpec>,
        config: KernelConfig,
        device_id: impl Into<String>,
        backend: KernelBackend,
    ) -> Self {
        Self {
            key,
            spec,
            config,
            device_id: device_id.into(),
            backend,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &Arc<KernelSpec> {
        &self.spec
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Config value by name
    pub fn config_value(&self, name: &str) -> Option<&ConfigValue> {
        self.spec
            .config
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.config.get(i))
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn backend(&self) -> &KernelBackend {
        &self.backend
    }

    /// Parameter values in the order the spec declares them.
    ///
    /// # Errors
    /// - `MissingKernelParameter` if a declared parameter is absent
    pub fn params_in_order(&self, params: &KernelParams) -> ForgeResult<Vec<f64>> {
        self.spec
            .parameters
            .iter()
            .map(|p| {
                params
                    .get(&p.name)
                    .ok_or_else(|| ForgeError::MissingKernelParameter {
                        kernel: self.spec.name.clone(),
                        name: p.name.clone(),
                    })
            })
            .collect()
    }
}

/// Runs kernels on behalf of the graph
///
/// The executor receives the resolved input storages in the node's input
/// order and must return a new storage for the output.
pub trait KernelExecutor: Send + Sync {
    fn run(
        &self,
        kernel: &Kernel,
        inputs: &[Arc<Storage>],
        params: &KernelParams,
        output_shape: &[usize],
    ) -> ForgeResult<Storage>;
}

impl<F> KernelExecutor for F
where
    F: Fn(&Kernel, &[Arc<Storage>], &KernelParams, &[usize]) -> ForgeResult<Storage> + Send + Sync,
{
    fn run(
        &self,
        kernel: &Kernel,
        inputs: &[Arc<Storage>],
        params: &KernelParams,
        output_shape: &[usize],
    ) -> ForgeResult<Storage> {
        self(kernel, inputs, params, output_shape)
    }
}
