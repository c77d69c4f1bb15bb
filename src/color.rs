//! Colors, color spaces and color-space transform steps.
//!
//! Only the parts needed to produce block uniforms live here: the transfer
//! function coefficients, the gamut matrix, and the flag set describing
//! which conversion steps a shader has to run.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Unpremultiplied RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color4f {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4f {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub fn premul(self) -> PmColor4f {
        PmColor4f::new(self.r * self.a, self.g * self.a, self.b * self.a, self.a)
    }
}

/// Premultiplied RGBA color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
pub struct PmColor4f {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl PmColor4f {
    /// Opaque red, drawn in place of effects that cannot be rendered.
    pub const ERROR: Self = Self::new(1.0, 0.0, 0.0, 1.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    #[must_use]
    pub fn from_vec4(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlphaType {
    Opaque,
    #[default]
    Premul,
    Unpremul,
}

/// Parametric transfer function: `x < d ? c*x + f : (a*x + b)^g + e`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferFunction {
    pub g: f32,
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

/// Classification written into shader uniforms alongside the coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TransferFunctionType {
    Invalid = 0,
    SrgbIsh = 1,
}

impl TransferFunction {
    pub const SRGB: Self = Self {
        g: 2.4,
        a: 1.0 / 1.055,
        b: 0.055 / 1.055,
        c: 1.0 / 12.92,
        d: 0.04045,
        e: 0.0,
        f: 0.0,
    };

    pub const SRGB_INVERSE: Self = Self {
        g: 1.0 / 2.4,
        a: 1.137_119,
        b: 0.0,
        c: 12.92,
        d: 0.003_130_8,
        e: -0.055,
        f: 0.0,
    };

    pub const LINEAR: Self = Self {
        g: 1.0,
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 0.0,
        f: 0.0,
    };

    #[must_use]
    pub fn is_linear(&self) -> bool {
        *self == Self::LINEAR
    }

    #[must_use]
    pub fn kind(&self) -> TransferFunctionType {
        TransferFunctionType::SrgbIsh
    }

    /// The seven coefficients in `g, a, b, c, d, e, f` order.
    #[must_use]
    pub fn coefficients(&self) -> [f32; 7] {
        [self.g, self.a, self.b, self.c, self.d, self.e, self.f]
    }

    #[must_use]
    pub fn eval(&self, x: f32) -> f32 {
        let sign = x.signum();
        let x = x.abs();
        let y = if x < self.d {
            self.c * x + self.f
        } else {
            (self.a * x + self.b).powf(self.g) + self.e
        };
        sign * y
    }
}

/// A named RGB color space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    #[default]
    Srgb,
    SrgbLinear,
    DisplayP3,
}

const SRGB_TO_XYZ_D50: Mat3 = Mat3::from_cols(
    Vec3::new(0.436_065_7, 0.222_488_4, 0.013_916_0),
    Vec3::new(0.385_147_1, 0.716_873_2, 0.097_076_4),
    Vec3::new(0.143_066_4, 0.060_607_9, 0.714_096_1),
);

const DISPLAY_P3_TO_XYZ_D50: Mat3 = Mat3::from_cols(
    Vec3::new(0.515_102, 0.241_182, -0.001_049_4),
    Vec3::new(0.291_965, 0.692_236, 0.041_881_8),
    Vec3::new(0.157_153, 0.066_581_9, 0.784_378),
);

impl ColorSpace {
    /// Encoded → linear.
    #[must_use]
    pub fn transfer_fn(self) -> TransferFunction {
        match self {
            Self::Srgb | Self::DisplayP3 => TransferFunction::SRGB,
            Self::SrgbLinear => TransferFunction::LINEAR,
        }
    }

    /// Linear → encoded.
    #[must_use]
    pub fn inverse_transfer_fn(self) -> TransferFunction {
        match self {
            Self::Srgb | Self::DisplayP3 => TransferFunction::SRGB_INVERSE,
            Self::SrgbLinear => TransferFunction::LINEAR,
        }
    }

    #[must_use]
    pub fn to_xyz_d50(self) -> Mat3 {
        match self {
            Self::Srgb | Self::SrgbLinear => SRGB_TO_XYZ_D50,
            Self::DisplayP3 => DISPLAY_P3_TO_XYZ_D50,
        }
    }

    #[must_use]
    pub fn gamma_is_linear(self) -> bool {
        self.transfer_fn().is_linear()
    }

    #[must_use]
    pub fn same_gamut(self, other: Self) -> bool {
        self.to_xyz_d50() == other.to_xyz_d50()
    }
}

/// Color type information of a draw destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorInfo {
    pub color_space: ColorSpace,
    pub alpha_type: AlphaType,
}

impl ColorInfo {
    #[must_use]
    pub const fn new(color_space: ColorSpace, alpha_type: AlphaType) -> Self {
        Self {
            color_space,
            alpha_type,
        }
    }
}

bitflags! {
    /// Steps a color-space conversion has to run, in order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct XformFlags: u32 {
        const UNPREMUL        = 1 << 0;
        const LINEARIZE       = 1 << 1;
        const GAMUT_TRANSFORM = 1 << 2;
        const ENCODE          = 1 << 3;
        const PREMUL          = 1 << 4;
    }
}

/// The conversion from one (color space, alpha type) to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSpaceXformSteps {
    pub flags: XformFlags,
    pub src_tf: TransferFunction,
    pub dst_tf_inv: TransferFunction,
    pub src_to_dst: Mat3,
}

impl Default for ColorSpaceXformSteps {
    /// The identity conversion.
    fn default() -> Self {
        Self {
            flags: XformFlags::empty(),
            src_tf: TransferFunction::LINEAR,
            dst_tf_inv: TransferFunction::LINEAR,
            src_to_dst: Mat3::IDENTITY,
        }
    }
}

impl ColorSpaceXformSteps {
    #[must_use]
    pub fn new(src: ColorSpace, src_at: AlphaType, dst: ColorSpace, dst_at: AlphaType) -> Self {
        let mut flags = XformFlags::empty();
        flags.set(XformFlags::UNPREMUL, src_at == AlphaType::Premul);
        flags.set(XformFlags::LINEARIZE, !src.gamma_is_linear());
        flags.set(XformFlags::GAMUT_TRANSFORM, !src.same_gamut(dst));
        flags.set(XformFlags::ENCODE, !dst.gamma_is_linear());
        flags.set(
            XformFlags::PREMUL,
            src_at != AlphaType::Opaque && dst_at == AlphaType::Premul,
        );

        // Linearize then re-encode with the same curve is a no-op.
        if !flags.contains(XformFlags::GAMUT_TRANSFORM)
            && src.transfer_fn() == dst.transfer_fn()
        {
            flags.remove(XformFlags::LINEARIZE | XformFlags::ENCODE);
        }

        // Unpremul then premul with nothing in between is a no-op.
        if !flags.intersects(XformFlags::LINEARIZE | XformFlags::GAMUT_TRANSFORM | XformFlags::ENCODE)
            && flags.contains(XformFlags::UNPREMUL | XformFlags::PREMUL)
        {
            flags.remove(XformFlags::UNPREMUL | XformFlags::PREMUL);
        }

        let src_to_dst = if flags.contains(XformFlags::GAMUT_TRANSFORM) {
            dst.to_xyz_d50().inverse() * src.to_xyz_d50()
        } else {
            Mat3::IDENTITY
        };

        Self {
            flags,
            src_tf: src.transfer_fn(),
            dst_tf_inv: dst.inverse_transfer_fn(),
            src_to_dst,
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.flags.is_empty()
    }

    /// Runs the conversion on one color.
    #[must_use]
    pub fn apply(&self, color: Vec4) -> Vec4 {
        let mut rgb = color.truncate();
        let a = color.w;
        if self.flags.contains(XformFlags::UNPREMUL) && a != 0.0 {
            rgb /= a;
        }
        if self.flags.contains(XformFlags::LINEARIZE) {
            rgb = Vec3::new(
                self.src_tf.eval(rgb.x),
                self.src_tf.eval(rgb.y),
                self.src_tf.eval(rgb.z),
            );
        }
        if self.flags.contains(XformFlags::GAMUT_TRANSFORM) {
            rgb = self.src_to_dst * rgb;
        }
        if self.flags.contains(XformFlags::ENCODE) {
            rgb = Vec3::new(
                self.dst_tf_inv.eval(rgb.x),
                self.dst_tf_inv.eval(rgb.y),
                self.dst_tf_inv.eval(rgb.z),
            );
        }
        if self.flags.contains(XformFlags::PREMUL) {
            rgb *= a;
        }
        rgb.extend(a)
    }
}

/// Maps an unpremultiplied sRGB color into the destination color space,
/// premultiplied.
#[must_use]
pub fn map_color(color: Color4f, dst: ColorSpace) -> PmColor4f {
    let steps = ColorSpaceXformSteps::new(ColorSpace::Srgb, AlphaType::Unpremul, dst, AlphaType::Premul);
    PmColor4f::from_vec4(steps.apply(Vec4::new(color.r, color.g, color.b, color.a)))
}
