//! Name -> kernel spec lookup

use std::collections::HashMap;
use std::sync::Arc;

use super::spec::{self, KernelConfig, KernelConfigInput, KernelKey, KernelSpec};
use crate::error::{ForgeError, ForgeResult};

/// Source of kernel specs for [`crate::device::Device::get_kernel`]
///
/// Only `resolve_spec` is required; normalization and key derivation default
/// to the canonical rules in [`crate::kernel::spec`].
pub trait KernelRegistry: Send + Sync {
    /// # Errors
    /// - `KernelNotFound` for an unknown name
    fn resolve_spec(&self, name: &str) -> ForgeResult<Arc<KernelSpec>>;

    fn normalize_config(&self, spec: &KernelSpec, input: &KernelConfigInput) -> ForgeResult<KernelConfig> {
        spec::normalize_config(spec, input)
    }

    fn derive_key(&self, spec: &KernelSpec, config: &KernelConfig) -> KernelKey {
        spec::derive_key(spec, config)
    }
}

/// In-memory registry of kernel specs
#[derive(Debug, Default, Clone)]
pub struct SpecRegistry {
    specs: HashMap<String, Arc<KernelSpec>>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec under its name, replacing any previous one
    pub fn register(&mut self, spec: KernelSpec) -> &mut Self {
        self.specs.insert(spec.name.clone(), Arc::new(spec));
        self
    }

    pub fn with_spec(mut self, spec: KernelSpec) -> Self {
        self.register(spec);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl KernelRegistry for SpecRegistry {
    fn resolve_spec(&self, name: &str) -> ForgeResult<Arc<KernelSpec>> {
        self.specs
            .get(name)
            .cloned()
            .ok_or_else(|| ForgeError::KernelNotFound(name.to_string()))
    }
}
