//! Blend modes.

use serde::{Deserialize, Serialize};

/// Compositing operator applied between a source and a destination color.
///
/// Discriminants are stable: they are written into uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum BlendMode {
    Clear,
    Src,
    Dst,
    #[default]
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcATop,
    DstATop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub const LAST_COEFF_MODE: Self = Self::Screen;
    pub const LAST_SEPARABLE_MODE: Self = Self::Multiply;
    pub const LAST: Self = Self::Luminosity;

    pub const ALL: [Self; 29] = [
        Self::Clear,
        Self::Src,
        Self::Dst,
        Self::SrcOver,
        Self::DstOver,
        Self::SrcIn,
        Self::DstIn,
        Self::SrcOut,
        Self::DstOut,
        Self::SrcATop,
        Self::DstATop,
        Self::Xor,
        Self::Plus,
        Self::Modulate,
        Self::Screen,
        Self::Overlay,
        Self::Darken,
        Self::Lighten,
        Self::ColorDodge,
        Self::ColorBurn,
        Self::HardLight,
        Self::SoftLight,
        Self::Difference,
        Self::Exclusion,
        Self::Multiply,
        Self::Hue,
        Self::Saturation,
        Self::Color,
        Self::Luminosity,
    ];

    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Modes in the inclusive range `start..=end` (empty if inverted).
    #[must_use]
    pub fn range(start: Self, end: Self) -> &'static [Self] {
        let (s, e) = (start as usize, end as usize);
        if s > e { &[] } else { &Self::ALL[s..=e] }
    }

    /// Porter-Duff coefficients `[k0, k1, k2, k3]` such that
    /// `result = src * (k0 + k2 * dst.a) + dst * (k1 + k3 * src.a)`,
    /// or `None` if the mode cannot be expressed that way.
    #[must_use]
    pub const fn porter_duff_coefficients(self) -> Option<[f32; 4]> {
        Some(match self {
            Self::Clear => [0.0, 0.0, 0.0, 0.0],
            Self::Src => [1.0, 0.0, 0.0, 0.0],
            Self::Dst => [0.0, 1.0, 0.0, 0.0],
            Self::SrcOver => [1.0, 1.0, 0.0, -1.0],
            Self::DstOver => [1.0, 1.0, -1.0, 0.0],
            Self::SrcIn => [0.0, 0.0, 1.0, 0.0],
            Self::DstIn => [0.0, 0.0, 0.0, 1.0],
            Self::SrcOut => [1.0, 0.0, -1.0, 0.0],
            Self::DstOut => [0.0, 1.0, 0.0, -1.0],
            Self::SrcATop => [0.0, 1.0, 1.0, -1.0],
            Self::DstATop => [1.0, 0.0, -1.0, 1.0],
            Self::Xor => [1.0, 1.0, -1.0, -1.0],
            Self::Plus => [1.0, 1.0, 0.0, 0.0],
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Src => "Src",
            Self::Dst => "Dst",
            Self::SrcOver => "SrcOver",
            Self::DstOver => "DstOver",
            Self::SrcIn => "SrcIn",
            Self::DstIn => "DstIn",
            Self::SrcOut => "SrcOut",
            Self::DstOut => "DstOut",
            Self::SrcATop => "SrcATop",
            Self::DstATop => "DstATop",
            Self::Xor => "Xor",
            Self::Plus => "Plus",
            Self::Modulate => "Modulate",
            Self::Screen => "Screen",
            Self::Overlay => "Overlay",
            Self::Darken => "Darken",
            Self::Lighten => "Lighten",
            Self::ColorDodge => "ColorDodge",
            Self::ColorBurn => "ColorBurn",
            Self::HardLight => "HardLight",
            Self::SoftLight => "SoftLight",
            Self::Difference => "Difference",
            Self::Exclusion => "Exclusion",
            Self::Multiply => "Multiply",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::Color => "Color",
            Self::Luminosity => "Luminosity",
        }
    }
}

/// Named groups of blend modes for precompilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendModeGroup {
    /// `Clear ..= Screen`
    PorterDuff,
    /// `Overlay ..= Multiply`
    Advanced,
    /// `Hue ..= Luminosity`
    ColorAware,
    All,
}

impl BlendModeGroup {
    #[must_use]
    pub fn modes(self) -> &'static [BlendMode] {
        match self {
            Self::PorterDuff => BlendMode::range(BlendMode::Clear, BlendMode::LAST_COEFF_MODE),
            Self::Advanced => BlendMode::range(BlendMode::Overlay, BlendMode::LAST_SEPARABLE_MODE),
            Self::ColorAware => BlendMode::range(BlendMode::Hue, BlendMode::LAST),
            Self::All => &BlendMode::ALL,
        }
    }
}
