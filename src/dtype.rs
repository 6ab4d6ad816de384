//! Element kinds and host-readable typed views of storage bytes

use std::fmt;

use crate::error::{ForgeError, ForgeResult};

/// Element kind used when interpreting raw storage bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dtype {
    Uint8,
    Int32,
    Uint32,
    #[default]
    Float32,
}

impl Dtype {
    /// Width of one element in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            Dtype::Uint8 => 1,
            Dtype::Int32 | Dtype::Uint32 | Dtype::Float32 => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dtype::Uint8 => "uint8",
            Dtype::Int32 => "int32",
            Dtype::Uint32 => "uint32",
            Dtype::Float32 => "float32",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uint8" => Some(Dtype::Uint8),
            "int32" => Some(Dtype::Int32),
            "uint32" => Some(Dtype::Uint32),
            "float32" => Some(Dtype::Float32),
            _ => None,
        }
    }

    /// Number of elements covering `byte_size` bytes.
    ///
    /// Fails with a config error when the range is not evenly divisible.
    pub fn element_count(&self, byte_size: usize) -> ForgeResult<usize> {
        let width = self.byte_size();
        if byte_size % width != 0 {
            return Err(ForgeError::MisalignedRange {
                byte_size,
                element_size: width,
            });
        }
        Ok(byte_size / width)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed host copy of a storage byte range
#[derive(Debug, Clone, PartialEq)]
pub enum TypedData {
    U8(Vec<u8>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl TypedData {
    /// Interpret little-endian bytes as elements of `dtype`.
    ///
    /// The bytes need not be aligned for the element type.
    pub fn from_bytes(dtype: Dtype, bytes: &[u8]) -> ForgeResult<Self> {
        dtype.element_count(bytes.len())?;
        Ok(match dtype {
            Dtype::Uint8 => TypedData::U8(bytes.to_vec()),
            Dtype::Int32 => TypedData::I32(bytemuck::pod_collect_to_vec(bytes)),
            Dtype::Uint32 => TypedData::U32(bytemuck::pod_collect_to_vec(bytes)),
            Dtype::Float32 => TypedData::F32(bytemuck::pod_collect_to_vec(bytes)),
        })
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            TypedData::U8(_) => Dtype::Uint8,
            TypedData::I32(_) => Dtype::Int32,
            TypedData::U32(_) => Dtype::Uint32,
            TypedData::F32(_) => Dtype::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedData::U8(v) => v.len(),
            TypedData::I32(v) => v.len(),
            TypedData::U32(v) => v.len(),
            TypedData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype().byte_size()
    }

    /// Raw bytes of the elements
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TypedData::U8(v) => v,
            TypedData::I32(v) => bytemuck::cast_slice(v),
            TypedData::U32(v) => bytemuck::cast_slice(v),
            TypedData::F32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Elements widened to f64, handy for comparisons in callers
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            TypedData::U8(v) => v.iter().map(|&x| x as f64).collect(),
            TypedData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            TypedData::U32(v) => v.iter().map(|&x| x as f64).collect(),
            TypedData::F32(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

impl From<Vec<u8>> for TypedData {
    fn from(v: Vec<u8>) -> Self {
        TypedData::U8(v)
    }
}

impl From<Vec<i32>> for TypedData {
    fn from(v: Vec<i32>) -> Self {
        TypedData::I32(v)
    }
}

impl From<Vec<u32>> for TypedData {
    fn from(v: Vec<u32>) -> Self {
        TypedData::U32(v)
    }
}

impl From<Vec<f32>> for TypedData {
    fn from(v: Vec<f32>) -> Self {
        TypedData::F32(v)
    }
}
