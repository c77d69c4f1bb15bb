//! Uniform Layout Registry types.
//!
//! Every code snippet declares the ordered list of uniform slots it reads.
//! The declaration is the contract between the block emitters (who write
//! values through the gatherer) and the shader generator (who emits the
//! matching WGSL struct).

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Shading-language type of a uniform slot.
///
/// `Half*` types are packed as IEEE 754 binary16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlType {
    Float,
    Float2,
    Float3,
    Float4,
    Float2x2,
    Float3x3,
    Float4x4,
    Half,
    Half2,
    Half3,
    Half4,
    Half3x3,
    Half4x4,
    Int,
    Int2,
    Int3,
    Int4,
}

impl SlType {
    /// Number of matrix columns (1 for scalars and vectors).
    #[must_use]
    pub const fn columns(self) -> usize {
        match self {
            Self::Float2x2 => 2,
            Self::Float3x3 | Self::Half3x3 => 3,
            Self::Float4x4 | Self::Half4x4 => 4,
            _ => 1,
        }
    }

    /// Number of scalar components in one column.
    #[must_use]
    pub const fn rows(self) -> usize {
        match self {
            Self::Float | Self::Half | Self::Int => 1,
            Self::Float2 | Self::Half2 | Self::Int2 | Self::Float2x2 => 2,
            Self::Float3 | Self::Half3 | Self::Int3 | Self::Float3x3 | Self::Half3x3 => 3,
            Self::Float4 | Self::Half4 | Self::Int4 | Self::Float4x4 | Self::Half4x4 => 4,
        }
    }

    #[must_use]
    pub const fn is_half(self) -> bool {
        matches!(
            self,
            Self::Half | Self::Half2 | Self::Half3 | Self::Half4 | Self::Half3x3 | Self::Half4x4
        )
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Int2 | Self::Int3 | Self::Int4)
    }

    /// Size of one scalar component in the GPU payload.
    #[must_use]
    pub const fn scalar_size(self) -> usize {
        if self.is_half() { 2 } else { 4 }
    }

    /// Unpadded byte size of one column.
    #[must_use]
    pub const fn column_size(self) -> usize {
        self.rows() * self.scalar_size()
    }

    /// Natural alignment of one column (vec3 aligns like vec4).
    #[must_use]
    pub const fn column_alignment(self) -> usize {
        let rows = if self.rows() == 3 { 4 } else { self.rows() };
        rows * self.scalar_size()
    }

    /// Tightly packed size of one value on the CPU side (4-byte scalars).
    #[must_use]
    pub const fn cpu_size(self) -> usize {
        self.rows() * self.columns() * 4
    }

    /// Full-precision equivalent of a half type.
    #[must_use]
    pub const fn to_full_precision(self) -> Self {
        match self {
            Self::Half => Self::Float,
            Self::Half2 => Self::Float2,
            Self::Half3 => Self::Float3,
            Self::Half4 => Self::Float4,
            Self::Half3x3 => Self::Float3x3,
            Self::Half4x4 => Self::Float4x4,
            other => other,
        }
    }

    /// Half-precision equivalent of a float type. Integer and already-half
    /// types map to themselves.
    #[must_use]
    pub const fn to_half_precision(self) -> Self {
        match self {
            Self::Float => Self::Half,
            Self::Float2 => Self::Half2,
            Self::Float3 => Self::Half3,
            Self::Float4 => Self::Half4,
            Self::Float3x3 => Self::Half3x3,
            Self::Float4x4 => Self::Half4x4,
            other => other,
        }
    }

    /// WGSL spelling of the type.
    #[must_use]
    pub const fn wgsl_name(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Float2 => "vec2<f32>",
            Self::Float3 => "vec3<f32>",
            Self::Float4 => "vec4<f32>",
            Self::Float2x2 => "mat2x2<f32>",
            Self::Float3x3 => "mat3x3<f32>",
            Self::Float4x4 => "mat4x4<f32>",
            Self::Half => "f16",
            Self::Half2 => "vec2<f16>",
            Self::Half3 => "vec3<f16>",
            Self::Half4 => "vec4<f16>",
            Self::Half3x3 => "mat3x3<f16>",
            Self::Half4x4 => "mat4x4<f16>",
            Self::Int => "i32",
            Self::Int2 => "vec2<i32>",
            Self::Int3 => "vec3<i32>",
            Self::Int4 => "vec4<i32>",
        }
    }
}

impl fmt::Display for SlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_name())
    }
}

/// Array count of a uniform that is not an array.
pub const NON_ARRAY: u32 = 0;

/// One declared uniform slot of a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uniform {
    pub name: Cow<'static, str>,
    pub ty: SlType,
    /// Array length, or [`NON_ARRAY`].
    pub count: u32,
}

impl Uniform {
    #[must_use]
    pub const fn new(name: &'static str, ty: SlType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
            count: NON_ARRAY,
        }
    }

    #[must_use]
    pub const fn array(name: &'static str, ty: SlType, count: u32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
            count,
        }
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.count != NON_ARRAY
    }

    /// WGSL struct member declaration, e.g. `colors: array<vec4<f32>, 4>`.
    #[must_use]
    pub fn wgsl_member(&self) -> String {
        if self.is_array() {
            format!("{}: array<{}, {}>", self.name, self.ty, self.count)
        } else {
            format!("{}: {}", self.name, self.ty)
        }
    }
}
