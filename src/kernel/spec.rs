//! Kernel descriptions, configuration normalization and cache keys

use std::collections::HashMap;
use std::fmt;

use crate::dtype::Dtype;
use crate::error::{ForgeError, ForgeResult};

/// Type of a shader binding or parameter
///
/// WGSL has no 8-bit integers: `U8` and `ArrayU8` bind as `u32` words with
/// four bytes packed per word, little-endian. Shaders unpack them with
/// `extractBits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    U8,
    I32,
    U32,
    F32,
    ArrayU8,
    ArrayI32,
    ArrayU32,
    ArrayF32,
}

impl ShaderType {
    /// WGSL spelling of the type
    pub fn wgsl(&self) -> &'static str {
        match self {
            ShaderType::U8 => "u32",
            ShaderType::I32 => "i32",
            ShaderType::U32 => "u32",
            ShaderType::F32 => "f32",
            ShaderType::ArrayU8 => "array<u32>",
            ShaderType::ArrayI32 => "array<i32>",
            ShaderType::ArrayU32 => "array<u32>",
            ShaderType::ArrayF32 => "array<f32>",
        }
    }

    /// Element kind for host materialization
    pub fn dtype(&self) -> Dtype {
        match self {
            ShaderType::U8 | ShaderType::ArrayU8 => Dtype::Uint8,
            ShaderType::I32 | ShaderType::ArrayI32 => Dtype::Int32,
            ShaderType::U32 | ShaderType::ArrayU32 => Dtype::Uint32,
            ShaderType::F32 | ShaderType::ArrayF32 => Dtype::Float32,
        }
    }

    pub fn element_byte_size(&self) -> usize {
        self.dtype().byte_size()
    }
}

/// Scalar kernel parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    U32,
    F32,
}

impl ParamType {
    pub fn wgsl(&self) -> &'static str {
        match self {
            ParamType::U32 => "u32",
            ParamType::F32 => "f32",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelParamSpec {
    pub name: String,
    pub param_type: ParamType,
}

/// Input or output binding
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBindingSpec {
    pub name: String,
    pub shader_type: ShaderType,
}

/// Description of a compute kernel
///
/// `config` lists compile-time configuration names; their values become part
/// of the kernel's cache key. `parameters` are per-run scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSpec {
    pub name: String,
    pub config: Vec<String>,
    pub parameters: Vec<KernelParamSpec>,
    pub inputs: Vec<KernelBindingSpec>,
    pub outputs: Vec<KernelBindingSpec>,
    pub workgroup_size: [u32; 3],
    /// Body of the shader entry point
    pub shader: String,
}

impl KernelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        KernelSpec {
            name: name.into(),
            config: Vec::new(),
            parameters: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            workgroup_size: [64, 1, 1],
            shader: String::new(),
        }
    }

    pub fn with_config(mut self, name: impl Into<String>) -> Self {
        self.config.push(name.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.parameters.push(KernelParamSpec {
            name: name.into(),
            param_type,
        });
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, shader_type: ShaderType) -> Self {
        self.inputs.push(KernelBindingSpec {
            name: name.into(),
            shader_type,
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, shader_type: ShaderType) -> Self {
        self.outputs.push(KernelBindingSpec {
            name: name.into(),
            shader_type,
        });
        self
    }

    pub fn with_workgroup_size(mut self, workgroup_size: [u32; 3]) -> Self {
        self.workgroup_size = workgroup_size;
        self
    }

    pub fn with_shader(mut self, shader: impl Into<String>) -> Self {
        self.shader = shader.into();
        self
    }
}

/// A single configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Str(s) => f.write_str(s),
            ConfigValue::Int(i) => write!(f, "{}", i),
            // Integral floats print without a fraction, so 4.0 and 4 share a key.
            ConfigValue::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Str(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<u32> for ConfigValue {
    fn from(i: u32) -> Self {
        ConfigValue::Int(i as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(x: f64) -> Self {
        ConfigValue::Float(x)
    }
}

impl From<Dtype> for ConfigValue {
    fn from(dtype: Dtype) -> Self {
        ConfigValue::Str(dtype.name().to_string())
    }
}

/// Caller-supplied configuration, keyed by name
pub type KernelConfigInput = HashMap<String, ConfigValue>;

/// Configuration values in the order the spec declares them
pub type KernelConfig = Vec<ConfigValue>;

/// Canonical cache key: `"name,c1=v1,c2=v2"`
pub type KernelKey = String;

/// Pick the spec's config values out of `input`, in spec order.
///
/// Names the spec does not declare are ignored.
///
/// # Errors
/// - `MissingKernelConfig` if a declared name is absent
pub fn normalize_config(spec: &KernelSpec, input: &KernelConfigInput) -> ForgeResult<KernelConfig> {
    spec.config
        .iter()
        .map(|name| {
            input
                .get(name)
                .cloned()
                .ok_or_else(|| ForgeError::MissingKernelConfig {
                    kernel: spec.name.clone(),
                    name: name.clone(),
                })
        })
        .collect()
}

/// Canonical key for `spec` under `config`.
///
/// Separators inside values are backslash-escaped, so distinct configs never
/// share a key.
pub fn derive_key(spec: &KernelSpec, config: &KernelConfig) -> KernelKey {
    let mut key = spec.name.clone();
    for (name, value) in spec.config.iter().zip(config) {
        key.push(',');
        key.push_str(name);
        key.push('=');
        for c in value.to_string().chars() {
            if matches!(c, '\\' | ',' | '=') {
                key.push('\\');
            }
            key.push(c);
        }
    }
    key
}

/// Per-run scalar parameters, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelParams {
    values: Vec<(String, f64)>,
}

impl KernelParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing an earlier value of the same name
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> KernelSpec {
        KernelSpec::new("scale")
            .with_config("dtype")
            .with_config("unroll")
            .with_parameter("alpha", ParamType::F32)
    }

    fn input(pairs: &[(&str, ConfigValue)]) -> KernelConfigInput {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_normalize_orders_by_spec() {
        let config = normalize_config(
            &spec(),
            &input(&[("unroll", 4i64.into()), ("dtype", "float32".into())]),
        )
        .unwrap();
        assert_eq!(config, vec![ConfigValue::from("float32"), ConfigValue::Int(4)]);
    }

    #[test]
    fn test_normalize_ignores_extra_names() {
        let config = normalize_config(
            &spec(),
            &input(&[
                ("dtype", "int32".into()),
                ("unroll", 2i64.into()),
                ("verbose", "yes".into()),
            ]),
        )
        .unwrap();
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn test_normalize_missing_name() {
        let err = normalize_config(&spec(), &input(&[("dtype", "int32".into())])).unwrap_err();
        assert!(err.is_lookup_error());
        assert!(matches!(
            err,
            ForgeError::MissingKernelConfig { ref kernel, ref name } if kernel == "scale" && name == "unroll"
        ));
    }

    #[test]
    fn test_derive_key() {
        let spec = spec();
        let config = vec![ConfigValue::from("float32"), ConfigValue::Int(4)];
        assert_eq!(derive_key(&spec, &config), "scale,dtype=float32,unroll=4");

        let bare = KernelSpec::new("copy");
        assert_eq!(derive_key(&bare, &Vec::new()), "copy");
    }

    #[test]
    fn test_separators_in_values_are_escaped() {
        let spec = KernelSpec::new("k").with_config("a").with_config("b");
        let first = derive_key(&spec, &vec!["x,b=y".into(), "z".into()]);
        let second = derive_key(&spec, &vec!["x".into(), "y,b=z".into()]);
        assert_ne!(first, second);
        assert_eq!(first, r"k,a=x\,b\=y,b=z");
        assert_eq!(derive_key(&spec, &vec![r"c:\".into(), "1".into()]), r"k,a=c:\\,b=1");
    }

    #[test]
    fn test_integral_float_matches_int_key() {
        let spec = spec();
        let a = derive_key(&spec, &vec!["f".into(), ConfigValue::Float(4.0)]);
        let b = derive_key(&spec, &vec!["f".into(), ConfigValue::Int(4)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shader_types() {
        assert_eq!(ShaderType::ArrayF32.wgsl(), "array<f32>");
        assert_eq!(ShaderType::ArrayU8.element_byte_size(), 1);
        assert_eq!(ShaderType::ArrayU8.wgsl(), "array<u32>");
        assert_eq!(ShaderType::U8.wgsl(), "u32");
        assert_eq!(ShaderType::I32.dtype(), Dtype::Int32);
        assert_eq!(ParamType::U32.wgsl(), "u32");
    }

    #[test]
    fn test_params_replace_and_order() {
        let params = KernelParams::new()
            .with("beta", 2.0)
            .with("alpha", 1.0)
            .with("beta", 3.0);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("beta"), Some(3.0));
        let names: Vec<_> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["beta", "alpha"]);
        assert_eq!(params.get("gamma"), None);
    }
}
