//! Per-device cache of constructed kernels
//!
//! Entries are never evicted: a kernel lives as long as its device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Kernel, KernelKey};
use crate::error::ForgeResult;

/// Kernels keyed by `(kernel name, canonical key)`
#[derive(Debug, Default)]
pub struct KernelCache {
    kernels: Mutex<HashMap<(String, KernelKey), Arc<Kernel>>>,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached kernel for `key`, or construct and insert one.
    ///
    /// Construction runs under the cache lock, so concurrent callers asking
    /// for the same key get the same instance.
    pub fn get_or_try_insert<F>(&self, name: &str, key: &str, build: F) -> ForgeResult<Arc<Kernel>>
    where
        F: FnOnce() -> ForgeResult<Kernel>,
    {
        let cache_key = (name.to_string(), key.to_string());
        let mut kernels = self.kernels.lock()?;
        if let Some(kernel) = kernels.get(&cache_key) {
            return Ok(Arc::clone(kernel));
        }

        tracing::debug!("Kernel cache miss: {}", key);
        let kernel = Arc::new(build()?);
        kernels.insert(cache_key, Arc::clone(&kernel));
        Ok(kernel)
    }

    pub fn get(&self, name: &str, key: &str) -> ForgeResult<Option<Arc<Kernel>>> {
        let cache_key = (name.to_string(), key.to_string());
        Ok(self.kernels.lock()?.get(&cache_key).cloned())
    }

    pub fn len(&self) -> ForgeResult<usize> {
        Ok(self.kernels.lock()?.len())
    }
}
