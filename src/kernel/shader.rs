//! WGSL generation for shader-backed kernels

use super::spec::KernelSpec;

/// Full WGSL module for `spec`.
///
/// Bindings in group 0: inputs (read-only), then outputs (read-write), then
/// the parameters struct when the kernel declares any parameters. The entry
/// point is `main`, with `global_id` in scope for the shader body.
pub fn wgsl_source(spec: &KernelSpec) -> String {
    let mut lines = vec![format!("// {} kernel", spec.name)];

    if !spec.parameters.is_empty() {
        lines.push(format!("struct {}Parameters {{", spec.name));
        for param in &spec.parameters {
            lines.push(format!("    {}: {},", param.name, param.param_type.wgsl()));
        }
        lines.push("}".to_string());
    }

    let mut binding = 0;
    for input in &spec.inputs {
        lines.push(format!(
            "@group(0) @binding({}) var<storage, read> {}: {};",
            binding,
            input.name,
            input.shader_type.wgsl()
        ));
        binding += 1;
    }
    for output in &spec.outputs {
        lines.push(format!(
            "@group(0) @binding({}) var<storage, read_write> {}: {};",
            binding,
            output.name,
            output.shader_type.wgsl()
        ));
        binding += 1;
    }
    if !spec.parameters.is_empty() {
        lines.push(format!(
            "@group(0) @binding({}) var<storage, read> parameters: {}Parameters;",
            binding, spec.name
        ));
    }

    let [x, y, z] = spec.workgroup_size;
    lines.push(format!("@compute @workgroup_size({}, {}, {})", x, y, z));
    lines.push("fn main(@builtin(global_invocation_id) global_id : vec3u) {".to_string());
    lines.push(format!("    {}", spec.shader.trim()));
    lines.push("}".to_string());

    lines.join("\n")
}

/// Shader-backed kernel state for the wgpu backend
#[cfg(feature = "webgpu")]
pub struct ShaderKernel {
    device: std::sync::Arc<wgpu::Device>,
    label: String,
    source: String,
    module: once_cell::sync::OnceCell<wgpu::ShaderModule>,
}

#[cfg(feature = "webgpu")]
impl ShaderKernel {
    pub(crate) fn new(device: std::sync::Arc<wgpu::Device>, spec: &KernelSpec, label: &str) -> Self {
        Self {
            device,
            label: label.to_string(),
            source: wgsl_source(spec),
            module: once_cell::sync::OnceCell::new(),
        }
    }

    /// Generated WGSL
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled module, built on first use
    pub fn module(&self) -> &wgpu::ShaderModule {
        self.module.get_or_init(|| {
            tracing::debug!("Compiling shader module: {}", self.label);
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&self.label),
                source: wgpu::ShaderSource::Wgsl(self.source.as_str().into()),
            })
        })
    }

    pub fn is_compiled(&self) -> bool {
        self.module.get().is_some()
    }

    pub fn device(&self) -> &std::sync::Arc<wgpu::Device> {
        &self.device
    }
}

#[cfg(feature = "webgpu")]
impl std::fmt::Debug for ShaderKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderKernel")
            .field("label", &self.label)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}
