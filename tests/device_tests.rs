//! Device pooling policy, kernel caching and device lookup

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use bufferforge::kernel::{ConfigValue, KernelBackend, ParamType, ShaderType};
use bufferforge::{
    Device, DeviceConfig, DeviceKind, DeviceRegistry, ForgeError, KernelConfigInput, KernelSpec,
    SpecRegistry,
};
use common::{gpu_device, serial, small_host_device};

fn registry() -> SpecRegistry {
    SpecRegistry::new()
        .with_spec(
            KernelSpec::new("scale")
                .with_config("dtype")
                .with_config("unroll")
                .with_parameter("alpha", ParamType::F32)
                .with_input("input", ShaderType::ArrayF32)
                .with_output("output", ShaderType::ArrayF32)
                .with_shader("output[global_id.x] = parameters.alpha * input[global_id.x];"),
        )
        .with_spec(KernelSpec::new("zero").with_output("output", ShaderType::ArrayU32))
}

fn config(pairs: &[(&str, ConfigValue)]) -> KernelConfigInput {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[test]
fn test_pooled_requests_share_first_heap() {
    let device = small_host_device(1024);
    let a = device.heap_alloc(100).unwrap();
    let b = device.heap_alloc(100).unwrap();
    let c = device.heap_alloc(200).unwrap();

    assert!(a.is_pooled() && b.is_pooled() && c.is_pooled());
    assert_eq!(device.heap_count().unwrap(), 1);

    let mut offsets = vec![a.byte_offset(), b.byte_offset(), c.byte_offset()];
    offsets.sort();
    offsets.dedup();
    assert_eq!(offsets.len(), 3);
}

#[test]
fn test_earlier_heap_wins_after_release() {
    let device = small_host_device(64);
    let first = device.heap_alloc(64).unwrap();
    let _second = device.heap_alloc(64).unwrap();
    assert_eq!(device.heap_count().unwrap(), 2);

    drop(first);
    // Only the first heap has room again, and it is tried first.
    let third = device.heap_alloc(32).unwrap();
    assert!(third.is_pooled());
    assert_eq!(third.byte_offset(), 0);
    assert_eq!(device.heap_count().unwrap(), 2);
    assert_eq!(device.stats().unwrap().pooled_in_use, 96);
}

#[test]
fn test_request_larger_than_heap_goes_direct() {
    let device = small_host_device(256);
    let storage = device.heap_alloc(1000).unwrap();
    assert!(!storage.is_pooled());
    assert_eq!(storage.byte_size(), 1000);

    let stats = device.stats().unwrap();
    assert_eq!(stats.heap_fallbacks, 1);
    assert_eq!(stats.pooled_allocations, 0);
    assert_eq!(stats.heaps, 0);
}

#[test]
fn test_oversized_requests_do_not_grow_pool() {
    let device = small_host_device(64);
    let _pooled = device.heap_alloc(32).unwrap();
    for _ in 0..10 {
        assert!(!device.heap_alloc(65).unwrap().is_pooled());
    }
    assert!(device.heap_count().unwrap() <= 1);
    assert_eq!(device.stats().unwrap().pooled_bytes, 64);
}

#[test]
fn test_min_order_larger_than_heap_rejected() {
    let err = Device::cpu_with_config(DeviceConfig::host().with_heap_size(8).with_min_order(5))
        .unwrap_err();
    assert!(matches!(err, ForgeError::InvalidConfiguration(_)));
}

#[test]
fn test_pool_ceiling_stops_heap_growth() {
    let device = Device::cpu_with_config(
        DeviceConfig::host()
            .with_heap_size(128)
            .with_min_order(0)
            .with_pool_ceiling(256),
    )
    .unwrap();

    let storages: Vec<_> = (0..3).map(|_| device.heap_alloc(128).unwrap()).collect();
    assert!(storages[0].is_pooled());
    assert!(storages[1].is_pooled());
    assert!(!storages[2].is_pooled());
    assert_eq!(device.heap_count().unwrap(), 2);
}

#[test]
fn test_disabled_pooling() {
    let device = Device::cpu_with_config(DeviceConfig::host().with_pooling(false)).unwrap();
    let storage = device.heap_alloc(32).unwrap();
    assert!(!storage.is_pooled());
    assert_eq!(device.stats().unwrap().heaps, 0);
}

#[test]
fn test_concurrent_heap_allocations_are_disjoint() {
    let device = small_host_device(1 << 16);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let device = Arc::clone(&device);
            thread::spawn(move || {
                (0..32)
                    .map(|_| device.heap_alloc(64).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let storages: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(storages.len(), 256);
    assert_eq!(device.heap_count().unwrap(), 1);

    let mut offsets: Vec<_> = storages.iter().map(|s| s.byte_offset()).collect();
    offsets.sort();
    offsets.dedup();
    assert_eq!(offsets.len(), 256);

    drop(storages);
    assert_eq!(device.stats().unwrap().pooled_in_use, 0);
}

#[test]
fn test_kernel_cache_ignores_config_order_and_extras() {
    let device = Device::cpu();
    let registry = registry();

    let a = device
        .get_kernel(
            &registry,
            "scale",
            &config(&[("dtype", "float32".into()), ("unroll", 4i64.into())]),
        )
        .unwrap();
    let b = device
        .get_kernel(
            &registry,
            "scale",
            &config(&[
                ("unroll", 4i64.into()),
                ("debug", "on".into()),
                ("dtype", "float32".into()),
            ]),
        )
        .unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.key(), "scale,dtype=float32,unroll=4");
    assert_eq!(a.device_id(), "cpu");
    assert!(matches!(a.backend(), KernelBackend::Host));
    assert_eq!(device.stats().unwrap().cached_kernels, 1);
}

#[test]
fn test_kernel_cache_separates_configs() {
    let device = Device::cpu();
    let registry = registry();

    let f32_kernel = device
        .get_kernel(
            &registry,
            "scale",
            &config(&[("dtype", "float32".into()), ("unroll", 1i64.into())]),
        )
        .unwrap();
    let i32_kernel = device
        .get_kernel(
            &registry,
            "scale",
            &config(&[("dtype", "int32".into()), ("unroll", 1i64.into())]),
        )
        .unwrap();
    let zero = device.get_kernel(&registry, "zero", &HashMap::new()).unwrap();

    assert!(!Arc::ptr_eq(&f32_kernel, &i32_kernel));
    assert_eq!(zero.key(), "zero");
    assert_eq!(device.stats().unwrap().cached_kernels, 3);
}

#[test]
fn test_kernel_cache_keeps_configs_with_separators_apart() {
    let device = Device::cpu();
    let registry = SpecRegistry::new().with_spec(KernelSpec::new("k").with_config("a").with_config("b"));

    let first = device
        .get_kernel(&registry, "k", &config(&[("a", "x,b=y".into()), ("b", "z".into())]))
        .unwrap();
    let second = device
        .get_kernel(&registry, "k", &config(&[("a", "x".into()), ("b", "y,b=z".into())]))
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.config_value("a"), Some(&ConfigValue::from("x")));
    assert_eq!(device.stats().unwrap().cached_kernels, 2);
}

#[test]
fn test_kernel_caches_are_per_device() {
    let registry = registry();
    let input = config(&[("dtype", "uint8".into()), ("unroll", 2i64.into())]);
    let a = Device::cpu().get_kernel(&registry, "scale", &input).unwrap();
    let b = Device::cpu().get_kernel(&registry, "scale", &input).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.key(), b.key());
}

#[test]
fn test_kernel_lookup_errors() {
    let device = Device::cpu();
    let registry = registry();

    let err = device
        .get_kernel(&registry, "missing", &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, ForgeError::KernelNotFound(_)));

    let err = device
        .get_kernel(&registry, "scale", &config(&[("dtype", "float32".into())]))
        .unwrap_err();
    assert!(err.is_lookup_error());
    assert!(matches!(err, ForgeError::MissingKernelConfig { ref name, .. } if name == "unroll"));
    assert_eq!(device.stats().unwrap().cached_kernels, 0);
}

#[test]
fn test_registry_lookup() {
    let registry = DeviceRegistry::new();
    assert_eq!(registry.get("cpu").unwrap().kind(), DeviceKind::Cpu);
    assert!(matches!(
        registry.get("npu"),
        Err(ForgeError::DeviceNotFound(_))
    ));
}

#[cfg(feature = "webgpu")]
#[tokio::test]
#[serial]
async fn test_registry_discovery_matches_availability() {
    let mut registry = DeviceRegistry::new();
    let found = registry.discover_webgpu().await;
    assert_eq!(found, registry.has_accelerator());
    if found {
        assert_eq!(registry.default_device().kind(), DeviceKind::Webgpu);
        assert!(registry.get("webgpu").is_ok());
    } else {
        assert_eq!(registry.default_device().id(), "cpu");
    }
}

#[cfg(feature = "webgpu")]
#[test]
#[serial]
fn test_gpu_kernels_are_shader_backed() {
    let Some(device) = gpu_device() else { return };
    let registry = registry();
    let kernel = device
        .get_kernel(
            &registry,
            "scale",
            &config(&[("dtype", "float32".into()), ("unroll", 1i64.into())]),
        )
        .unwrap();

    assert_eq!(kernel.device_id(), "webgpu");
    match kernel.backend() {
        KernelBackend::Shader(shader) => {
            assert!(shader.source().contains("struct scaleParameters"));
            shader.module();
            assert!(shader.is_compiled());
        }
        other => panic!("expected shader kernel, got {:?}", other),
    }
}

#[cfg(feature = "webgpu")]
#[test]
#[serial]
fn test_gpu_pooling_policy() {
    let Some(device) = gpu_device() else { return };
    let before = device.stats().unwrap();

    let pooled = device.heap_alloc(256).unwrap();
    assert!(pooled.is_pooled());
    assert_eq!(pooled.byte_offset() % 4, 0);

    let oversized = device.heap_alloc(device.config().heap_size + 1).unwrap();
    assert!(!oversized.is_pooled());

    let after = device.stats().unwrap();
    assert_eq!(after.heap_fallbacks, before.heap_fallbacks + 1);
    assert_eq!(after.heaps, before.heaps.max(1));
}

#[cfg(feature = "webgpu")]
#[test]
#[serial]
fn test_gpu_byte_kernel_compiles() {
    let Some(device) = gpu_device() else { return };
    let registry = SpecRegistry::new().with_spec(
        KernelSpec::new("low_bytes")
            .with_input("input", ShaderType::ArrayU8)
            .with_output("output", ShaderType::ArrayU8)
            .with_shader("output[global_id.x] = input[global_id.x] & 0x00ff00ffu;"),
    );
    let kernel = device
        .get_kernel(&registry, "low_bytes", &HashMap::new())
        .unwrap();
    match kernel.backend() {
        KernelBackend::Shader(shader) => {
            shader.module();
            assert!(shader.is_compiled());
        }
        other => panic!("expected shader kernel, got {:?}", other),
    }
}
