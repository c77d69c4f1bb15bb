//! Effect model
//!
//! The closed set of shaders, color filters and blenders a paint is made of.
//! Each enum is dispatched exhaustively by the block emitters in
//! [`crate::emit`]; there is no open-ended trait object in the tree.
//!
//! ```rust,ignore
//! use myth_shading::effects::{PaintParams, Shader, ColorFilter};
//!
//! let paint = PaintParams::new()
//!     .with_shader(Shader::solid(Color4f::WHITE).with_local_matrix(Mat4::IDENTITY))
//!     .with_color_filter(ColorFilter::blend(BlendMode::Multiply, Color4f::BLACK))
//!     .with_dither(true);
//! ```

use std::sync::Arc;

use glam::{IVec2, Mat4, Vec2, Vec4};

use crate::blend::BlendMode;
use crate::color::{AlphaType, Color4f, ColorSpace, ColorInfo};
use crate::errors::{Result, ShadingError};
use crate::runtime_effect::{ChildType, RuntimeEffect};
use crate::texture::{Bitmap, BitmapFormat, ReadSwizzle, SamplingOptions, TextureProxy, TileMode, TileModePair};

// ─── Shaders ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Shader {
    /// Unpremultiplied sRGB color.
    SolidColor(Color4f),
    Gradient(GradientShader),
    Image(ImageShader),
    LocalMatrix { matrix: Mat4, shader: Box<Shader> },
    /// Children in emission order: `src`, `dst`, `blender`.
    Blend { blender: Box<Blender>, src: Box<Shader>, dst: Box<Shader> },
    ColorFilter { shader: Box<Shader>, filter: Box<ColorFilter> },
    /// Clamps sample coordinates to `subset` (`left, top, right, bottom`).
    CoordClamp { subset: Vec4, shader: Box<Shader> },
    PerlinNoise(PerlinNoiseShader),
    Runtime(RuntimeEffectInstance),
}

impl Shader {
    #[must_use]
    pub fn solid(color: Color4f) -> Self {
        Self::SolidColor(color)
    }

    #[must_use]
    pub fn blend(mode: BlendMode, src: Shader, dst: Shader) -> Self {
        Self::Blend {
            blender: Box::new(Blender::Mode(mode)),
            src: Box::new(src),
            dst: Box::new(dst),
        }
    }

    #[must_use]
    pub fn with_local_matrix(self, matrix: Mat4) -> Self {
        Self::LocalMatrix {
            matrix,
            shader: Box::new(self),
        }
    }

    #[must_use]
    pub fn with_color_filter(self, filter: ColorFilter) -> Self {
        Self::ColorFilter {
            shader: Box::new(self),
            filter: Box::new(filter),
        }
    }

    #[must_use]
    pub fn with_coord_clamp(self, subset: Vec4) -> Self {
        Self::CoordClamp {
            subset,
            shader: Box::new(self),
        }
    }
}

// ─── Gradients ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GradientType {
    Linear,
    Radial,
    Sweep,
    Conical,
}

impl GradientType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "LinearGradient",
            Self::Radial => "RadialGradient",
            Self::Sweep => "SweepGradient",
            Self::Conical => "ConicalGradient",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientGeometry {
    Linear { start: Vec2, end: Vec2 },
    Radial { center: Vec2, radius: f32 },
    Sweep { center: Vec2, bias: f32, scale: f32 },
    Conical { start: Vec2, end: Vec2, start_radius: f32, end_radius: f32 },
}

impl GradientGeometry {
    #[must_use]
    pub const fn kind(&self) -> GradientType {
        match self {
            Self::Linear { .. } => GradientType::Linear,
            Self::Radial { .. } => GradientType::Radial,
            Self::Sweep { .. } => GradientType::Sweep,
            Self::Conical { .. } => GradientType::Conical,
        }
    }
}

/// Color space colors are interpolated in. Discriminants are written into
/// the `colorSpace` uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum InterpolationColorSpace {
    #[default]
    Destination = 0,
    SrgbLinear = 1,
    Lab = 2,
    OkLab = 3,
    Lch = 4,
    OkLch = 5,
    Srgb = 6,
    Hsl = 7,
    Hwb = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interpolation {
    pub color_space: InterpolationColorSpace,
    pub in_premul: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientShader {
    pub geometry: GradientGeometry,
    pub colors: Vec<Color4f>,
    /// Stop positions; evenly spaced when `None`.
    pub offsets: Option<Vec<f32>>,
    pub tile_mode: TileMode,
    pub interpolation: Interpolation,
}

impl GradientShader {
    #[must_use]
    pub fn new(geometry: GradientGeometry, colors: Vec<Color4f>) -> Self {
        Self {
            geometry,
            colors,
            offsets: None,
            tile_mode: TileMode::Clamp,
            interpolation: Interpolation::default(),
        }
    }

    #[must_use]
    pub fn with_offsets(mut self, offsets: Vec<f32>) -> Self {
        self.offsets = Some(offsets);
        self
    }

    #[must_use]
    pub fn with_tile_mode(mut self, tile_mode: TileMode) -> Self {
        self.tile_mode = tile_mode;
        self
    }

    #[must_use]
    pub fn num_stops(&self) -> usize {
        self.colors.len()
    }
}

// ─── Images ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ImageShader {
    /// The uploaded image; `None` when it could not be made resident.
    pub texture: Option<TextureProxy>,
    pub sampling: SamplingOptions,
    pub tile_modes: TileModePair,
    /// `left, top, right, bottom`; the whole image when `None`.
    pub subset: Option<Vec4>,
    pub read_swizzle: ReadSwizzle,
    pub color_info: ColorInfo,
}

impl ImageShader {
    #[must_use]
    pub fn new(texture: Option<TextureProxy>, sampling: SamplingOptions, tile_modes: TileModePair) -> Self {
        Self {
            texture,
            sampling,
            tile_modes,
            subset: None,
            read_swizzle: ReadSwizzle::default(),
            color_info: ColorInfo::default(),
        }
    }
}

// ─── Perlin Noise ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PerlinNoiseType {
    FractalNoise = 0,
    Turbulence = 1,
}

const NOISE_BLOCK_SIZE: usize = 256;

/// Classic Perlin noise with its two lookup tables precomputed from the seed.
#[derive(Debug, Clone)]
pub struct PerlinNoiseShader {
    pub noise_type: PerlinNoiseType,
    pub base_frequency: Vec2,
    pub num_octaves: i32,
    /// Tile size to stitch to, if any.
    pub tile_size: Option<Vec2>,
    permutations: Bitmap,
    noise: Bitmap,
}

impl PerlinNoiseShader {
    #[must_use]
    pub fn new(noise_type: PerlinNoiseType, base_frequency: Vec2, num_octaves: i32, seed: f32) -> Self {
        let (permutations, noise) = perlin_tables(seed);
        Self {
            noise_type,
            base_frequency,
            num_octaves,
            tile_size: None,
            permutations,
            noise,
        }
    }

    #[must_use]
    pub fn with_tile_size(mut self, tile_size: Vec2) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    #[must_use]
    pub fn stitch_data(&self) -> Vec2 {
        self.tile_size
            .map_or(Vec2::ZERO, |size| (size * self.base_frequency).round())
    }

    #[must_use]
    pub fn permutations(&self) -> &Bitmap {
        &self.permutations
    }

    #[must_use]
    pub fn noise(&self) -> &Bitmap {
        &self.noise
    }
}

/// Park–Miller minimal standard generator.
struct NoiseRandom(i32);

impl NoiseRandom {
    const M: i32 = i32::MAX;
    const A: i32 = 16807;
    const Q: i32 = 127_773;
    const R: i32 = 2836;

    fn new(seed: f32) -> Self {
        let mut seed = seed.round() as i32;
        if seed <= 0 {
            seed = -(seed % (Self::M - 1)) + 1;
        }
        Self(seed.min(Self::M - 1))
    }

    fn next(&mut self) -> i32 {
        let mut result = Self::A * (self.0 % Self::Q) - Self::R * (self.0 / Self::Q);
        if result <= 0 {
            result += Self::M;
        }
        self.0 = result;
        result
    }
}

/// Permutation table (256×1 alpha) and gradient table (256×4, two 16-bit
/// components per texel).
fn perlin_tables(seed: f32) -> (Bitmap, Bitmap) {
    let mut random = NoiseRandom::new(seed);
    let mut gradients = [[Vec2::ZERO; NOISE_BLOCK_SIZE]; 4];
    for channel in &mut gradients {
        for g in channel.iter_mut() {
            let mut component = || {
                let r = random.next() % (2 * NOISE_BLOCK_SIZE as i32);
                (r - NOISE_BLOCK_SIZE as i32) as f32 / NOISE_BLOCK_SIZE as f32
            };
            let v = Vec2::new(component(), component());
            *g = v.try_normalize().unwrap_or(Vec2::X);
        }
    }

    let mut lattice: Vec<u8> = (0..=255).collect();
    for i in (1..NOISE_BLOCK_SIZE).rev() {
        let j = (random.next() % NOISE_BLOCK_SIZE as i32) as usize;
        lattice.swap(i, j);
    }

    let mut noise = Vec::with_capacity(NOISE_BLOCK_SIZE * 4 * 4);
    for channel in &gradients {
        for g in channel {
            for c in [g.x, g.y] {
                let packed = ((c * 0.5 + 0.5) * f32::from(u16::MAX)).round() as u16;
                noise.extend_from_slice(&packed.to_le_bytes());
            }
        }
    }

    (
        Bitmap::from_parts(NOISE_BLOCK_SIZE as u32, 1, BitmapFormat::Alpha8, lattice),
        Bitmap::from_parts(NOISE_BLOCK_SIZE as u32, 4, BitmapFormat::Rgba8, noise),
    )
}

// ─── Color Filters ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatrixDomain {
    #[default]
    Rgba,
    Hsla,
}

#[derive(Debug, Clone)]
pub enum ColorFilter {
    /// Passes the input through unchanged.
    Noop,
    /// Blends a constant (unpremultiplied sRGB) color over the input.
    Blend { mode: BlendMode, color: Color4f },
    /// Row-major 4×5 color matrix.
    Matrix { matrix: [f32; 20], domain: MatrixDomain },
    /// Applies `inner`, then `outer`.
    Compose { outer: Box<ColorFilter>, inner: Box<ColorFilter> },
    Gaussian,
    Table(Bitmap),
    ColorSpaceXform { src: ColorSpace, dst: ColorSpace },
    /// Runs `child` in a working color space/alpha type; `None` fields keep
    /// the destination's.
    WorkingFormat {
        child: Box<ColorFilter>,
        color_space: Option<ColorSpace>,
        alpha_type: Option<AlphaType>,
    },
    Runtime(RuntimeEffectInstance),
}

impl ColorFilter {
    #[must_use]
    pub fn blend(mode: BlendMode, color: Color4f) -> Self {
        Self::Blend { mode, color }
    }

    #[must_use]
    pub fn matrix(matrix: [f32; 20]) -> Self {
        Self::Matrix {
            matrix,
            domain: MatrixDomain::Rgba,
        }
    }

    #[must_use]
    pub fn hsla_matrix(matrix: [f32; 20]) -> Self {
        Self::Matrix {
            matrix,
            domain: MatrixDomain::Hsla,
        }
    }

    #[must_use]
    pub fn compose(outer: ColorFilter, inner: ColorFilter) -> Self {
        Self::Compose {
            outer: Box::new(outer),
            inner: Box::new(inner),
        }
    }

    /// Per-channel lookup tables in A, R, G, B order.
    #[must_use]
    pub fn table(tables: &[[u8; 256]; 4]) -> Self {
        Self::Table(Bitmap::color_table(tables))
    }

    #[must_use]
    pub fn working_format(child: ColorFilter, color_space: Option<ColorSpace>, alpha_type: Option<AlphaType>) -> Self {
        Self::WorkingFormat {
            child: Box::new(child),
            color_space,
            alpha_type,
        }
    }
}

// ─── Blenders ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Blender {
    Mode(BlendMode),
    Runtime(RuntimeEffectInstance),
}

impl Default for Blender {
    fn default() -> Self {
        Self::Mode(BlendMode::SrcOver)
    }
}

impl From<BlendMode> for Blender {
    fn from(mode: BlendMode) -> Self {
        Self::Mode(mode)
    }
}

// ─── Runtime Effect Instances ─────────────────────────────────────────────────

/// A child bound to a runtime effect slot. `None` passes the input through.
#[derive(Debug, Clone)]
pub enum RuntimeChild {
    Shader(Option<Box<Shader>>),
    ColorFilter(Option<Box<ColorFilter>>),
    Blender(Option<Box<Blender>>),
}

impl RuntimeChild {
    fn empty(ty: ChildType) -> Self {
        match ty {
            ChildType::Shader => Self::Shader(None),
            ChildType::ColorFilter => Self::ColorFilter(None),
            ChildType::Blender => Self::Blender(None),
        }
    }

    fn child_type(&self) -> ChildType {
        match self {
            Self::Shader(_) => ChildType::Shader,
            Self::ColorFilter(_) => ChildType::ColorFilter,
            Self::Blender(_) => ChildType::Blender,
        }
    }
}

/// A runtime program together with its uniform values and children.
///
/// Uniform values never affect the key; only the program does.
#[derive(Debug, Clone)]
pub struct RuntimeEffectInstance {
    effect: Arc<RuntimeEffect>,
    uniforms: Vec<u8>,
    children: Vec<RuntimeChild>,
}

impl RuntimeEffectInstance {
    /// Zeroed uniforms and pass-through children.
    #[must_use]
    pub fn new(effect: Arc<RuntimeEffect>) -> Self {
        let uniforms = vec![0; effect.uniform_size()];
        let children = effect.children().iter().map(|&ty| RuntimeChild::empty(ty)).collect();
        Self {
            effect,
            uniforms,
            children,
        }
    }

    /// Sets a uniform from tightly packed 4-byte scalars.
    pub fn set_uniform<T: bytemuck::Pod>(&mut self, name: &str, value: &[T]) -> Result<()> {
        let Some(uniform) = self.effect.uniforms().iter().find(|u| u.name == name) else {
            return Err(ShadingError::UnknownUniform {
                effect: self.effect.name().to_owned(),
                name: name.to_owned(),
            });
        };
        let bytes: &[u8] = bytemuck::cast_slice(value);
        if bytes.len() != uniform.cpu_size() {
            return Err(ShadingError::UniformSizeMismatch {
                name: name.to_owned(),
                expected: uniform.cpu_size(),
                actual: bytes.len(),
            });
        }
        self.uniforms[uniform.offset..uniform.offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn with_uniform<T: bytemuck::Pod>(mut self, name: &str, value: &[T]) -> Result<Self> {
        self.set_uniform(name, value)?;
        Ok(self)
    }

    pub fn set_child(&mut self, index: usize, child: RuntimeChild) -> Result<()> {
        let Some(&declared) = self.effect.children().get(index) else {
            return Err(ShadingError::InvalidChildSlot {
                slot: index,
                num_slots: self.children.len(),
            });
        };
        if declared != child.child_type() {
            return Err(ShadingError::ChildTypeMismatch { index });
        }
        self.children[index] = child;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn effect(&self) -> &Arc<RuntimeEffect> {
        &self.effect
    }

    #[inline]
    #[must_use]
    pub fn uniform_data(&self) -> &[u8] {
        &self.uniforms
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[RuntimeChild] {
        &self.children
    }
}

// ─── Paint ────────────────────────────────────────────────────────────────────

/// How the final blend obtains the destination color.
#[derive(Debug, Clone)]
pub enum DstRead {
    /// Sample a copy of the destination; `offset` maps device to copy space.
    Sample { texture: TextureProxy, offset: IVec2 },
    /// Framebuffer fetch.
    Fetch,
}

/// A complete paint: color source, filtering and blending.
#[derive(Debug, Clone, Default)]
pub struct PaintParams {
    /// Used when there is no shader.
    pub color: Color4f,
    pub shader: Option<Shader>,
    /// Blends the primitive's own color with the shader output.
    pub primitive_blender: Option<Blender>,
    pub color_filter: Option<ColorFilter>,
    /// `None` blends with `SrcOver`.
    pub blender: Option<Blender>,
    pub dither: bool,
    pub dst_read: Option<DstRead>,
}

impl PaintParams {
    #[must_use]
    pub fn new() -> Self {
        Self {
            color: Color4f::BLACK,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: Color4f) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub fn with_shader(mut self, shader: Shader) -> Self {
        self.shader = Some(shader);
        self
    }

    #[must_use]
    pub fn with_primitive_blender(mut self, blender: impl Into<Blender>) -> Self {
        self.primitive_blender = Some(blender.into());
        self
    }

    #[must_use]
    pub fn with_color_filter(mut self, filter: ColorFilter) -> Self {
        self.color_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_blender(mut self, blender: impl Into<Blender>) -> Self {
        self.blender = Some(blender.into());
        self
    }

    #[must_use]
    pub fn with_dither(mut self, dither: bool) -> Self {
        self.dither = dither;
        self
    }

    #[must_use]
    pub fn with_dst_read(mut self, dst_read: DstRead) -> Self {
        self.dst_read = Some(dst_read);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_effect::RuntimeEffectKind;
    use crate::uniform::SlType;

    fn effect() -> Arc<RuntimeEffect> {
        RuntimeEffect::builder(RuntimeEffectKind::Shader, "src")
            .uniform("tint", SlType::Float4)
            .uniform("amount", SlType::Float)
            .child(ChildType::ColorFilter)
            .build()
    }

    #[test]
    fn runtime_uniforms_land_at_their_offsets() {
        let mut inst = RuntimeEffectInstance::new(effect());
        inst.set_uniform("amount", &[0.25f32]).unwrap();
        let amount: f32 = bytemuck::pod_read_unaligned(&inst.uniform_data()[16..20]);
        assert_eq!(amount, 0.25);
    }

    #[test]
    fn runtime_uniform_errors() {
        let mut inst = RuntimeEffectInstance::new(effect());
        assert!(matches!(
            inst.set_uniform("missing", &[0.0f32]),
            Err(ShadingError::UnknownUniform { .. })
        ));
        assert!(matches!(
            inst.set_uniform("tint", &[0.0f32]),
            Err(ShadingError::UniformSizeMismatch { expected: 16, actual: 4, .. })
        ));
    }

    #[test]
    fn runtime_child_kind_is_checked() {
        let mut inst = RuntimeEffectInstance::new(effect());
        assert!(matches!(
            inst.set_child(0, RuntimeChild::Shader(None)),
            Err(ShadingError::ChildTypeMismatch { index: 0 })
        ));
        assert!(inst.set_child(0, RuntimeChild::ColorFilter(Some(Box::new(ColorFilter::Gaussian)))).is_ok());
        assert!(matches!(
            inst.set_child(1, RuntimeChild::Shader(None)),
            Err(ShadingError::InvalidChildSlot { slot: 1, num_slots: 1 })
        ));
    }

    #[test]
    fn perlin_tables_are_deterministic() {
        let a = PerlinNoiseShader::new(PerlinNoiseType::Turbulence, Vec2::splat(0.05), 2, 3.0);
        let b = PerlinNoiseShader::new(PerlinNoiseType::Turbulence, Vec2::splat(0.05), 2, 3.0);
        assert_eq!(a.permutations().content_hash(), b.permutations().content_hash());
        assert_eq!(a.noise().content_hash(), b.noise().content_hash());
        assert_eq!(a.noise().pixels().len(), 256 * 4 * 4);

        let mut lattice = a.permutations().pixels().to_vec();
        lattice.sort_unstable();
        assert!(lattice.iter().enumerate().all(|(i, &v)| v as usize == i));
    }

    #[test]
    fn stitch_data_scales_tile_by_frequency() {
        let shader = PerlinNoiseShader::new(PerlinNoiseType::FractalNoise, Vec2::new(0.5, 0.25), 1, 1.0)
            .with_tile_size(Vec2::new(64.0, 64.0));
        assert_eq!(shader.stitch_data(), Vec2::new(32.0, 16.0));
    }
}
