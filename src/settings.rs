//! Shading Settings
//!
//! Configuration shared by key building and uniform gathering.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_shading::settings::{ShadingSettings, UniformLayout};
//!
//! // Default: std140 packing, validation in debug builds
//! let settings = ShadingSettings::default();
//!
//! // Storage-buffer style packing without validation
//! let settings = ShadingSettings {
//!     uniform_layout: UniformLayout::Std430,
//!     validate_uniforms: false,
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::uniform::SlType;

// ---------------------------------------------------------------------------
// UniformLayout
// ---------------------------------------------------------------------------

/// Memory layout rules applied by the gatherer when packing uniforms.
///
/// | Rule                     | `Std140`        | `Std430`          |
/// |--------------------------|-----------------|-------------------|
/// | Array element stride     | rounded to 16   | natural alignment |
/// | Matrix column stride     | rounded to 16   | natural alignment |
/// | Scalar / vector alignment| natural         | natural           |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UniformLayout {
    /// Uniform-buffer layout (WGSL `var<uniform>`).
    #[default]
    Std140,
    /// Storage-buffer layout (WGSL `var<storage>`).
    Std430,
}

impl UniformLayout {
    /// Alignment of a single (non-array) value of `ty`.
    #[must_use]
    pub fn alignment(self, ty: SlType) -> usize {
        let column_align = ty.column_alignment();
        if ty.columns() > 1 && self == Self::Std140 {
            column_align.max(16)
        } else {
            column_align
        }
    }

    /// Distance in bytes between consecutive matrix columns.
    #[must_use]
    pub fn column_stride(self, ty: SlType) -> usize {
        let natural = ty.column_size().next_multiple_of(ty.column_alignment());
        match self {
            Self::Std140 if ty.columns() > 1 => natural.next_multiple_of(16),
            _ => natural,
        }
    }

    /// Size in bytes of a single (non-array) value of `ty`.
    #[must_use]
    pub fn size(self, ty: SlType) -> usize {
        if ty.columns() > 1 {
            self.column_stride(ty) * ty.columns()
        } else {
            ty.column_size()
        }
    }

    /// Distance in bytes between consecutive array elements of `ty`.
    #[must_use]
    pub fn array_stride(self, ty: SlType) -> usize {
        let stride = self.size(ty).next_multiple_of(self.alignment(ty));
        match self {
            Self::Std140 => stride.next_multiple_of(16),
            Self::Std430 => stride,
        }
    }
}

// ---------------------------------------------------------------------------
// ShadingSettings
// ---------------------------------------------------------------------------

/// Settings for one gatherer / key-building context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadingSettings {
    /// Packing rules for the uniform payload.
    pub uniform_layout: UniformLayout,
    /// Check every uniform write against the snippet's declared layout.
    ///
    /// A mismatch panics. Enabled by default in debug builds.
    pub validate_uniforms: bool,
}

impl Default for ShadingSettings {
    fn default() -> Self {
        Self {
            uniform_layout: UniformLayout::default(),
            validate_uniforms: cfg!(debug_assertions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_rounds_arrays_and_columns() {
        let l = UniformLayout::Std140;
        assert_eq!(l.array_stride(SlType::Float), 16);
        assert_eq!(l.array_stride(SlType::Float4), 16);
        assert_eq!(l.size(SlType::Float3x3), 48);
        assert_eq!(l.size(SlType::Half3x3), 48);
        assert_eq!(l.size(SlType::Float4x4), 64);
    }

    #[test]
    fn std430_uses_natural_alignment() {
        let l = UniformLayout::Std430;
        assert_eq!(l.array_stride(SlType::Float), 4);
        assert_eq!(l.array_stride(SlType::Half), 2);
        assert_eq!(l.size(SlType::Float3x3), 48);
        assert_eq!(l.size(SlType::Half3x3), 24);
        assert_eq!(l.size(SlType::Half4x4), 32);
        assert_eq!(l.alignment(SlType::Float3), 16);
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = ShadingSettings {
            uniform_layout: UniformLayout::Std430,
            validate_uniforms: true,
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: ShadingSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }
}
