//! Pipeline Data Gatherer
//!
//! Accumulates the uniform payload and texture bindings of one paint, in the
//! same order the key builder visits blocks.
//!
//! # Packing
//!
//! Values are packed into one buffer following the configured
//! [`UniformLayout`]. `Half*` types are stored as binary16. The gatherer does
//! not know about block structure; emitters call it in lockstep with
//! `begin_block`.
//!
//! # Validation
//!
//! With [`ShadingSettings::validate_uniforms`] enabled, each block's writes are
//! wrapped in [`PipelineDataGatherer::validated`], which checks every write
//! against the snippet's declared slot list (type and array count) and that
//! no declared slot is left unwritten. A mismatch panics.

use std::sync::Arc;

use bytemuck::Pod;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use half::f16;
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

use crate::color::PmColor4f;
use crate::settings::{ShadingSettings, UniformLayout};
use crate::texture::{SamplerDesc, SamplingOptions, TextureProxy, TileModePair};
use crate::uniform::{NON_ARRAY, SlType, Uniform};

// ─── Uniform Values ───────────────────────────────────────────────────────────

/// A CPU value that maps onto one shading-language type.
///
/// The value's memory must be its column-major components as 4-byte scalars.
pub trait UniformValue: Pod {
    const TYPE: SlType;
}

macro_rules! impl_uniform_value {
    ($($ty:ty => $sl:ident),* $(,)?) => {
        $(impl UniformValue for $ty {
            const TYPE: SlType = SlType::$sl;
        })*
    };
}

impl_uniform_value! {
    f32 => Float,
    Vec2 => Float2,
    Vec3 => Float3,
    Vec4 => Float4,
    [f32; 4] => Float4,
    PmColor4f => Float4,
    Mat3 => Float3x3,
    Mat4 => Float4x4,
    i32 => Int,
    [i32; 2] => Int2,
    [i32; 4] => Int4,
}

// ─── Output ───────────────────────────────────────────────────────────────────

/// One texture/sampler binding, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub sampler: SamplerDesc,
    pub texture: TextureProxy,
}

/// Everything a paint needs at draw time besides its pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineData {
    pub uniforms: Vec<u8>,
    pub textures: Vec<TextureBinding>,
}

impl PipelineData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty() && self.textures.is_empty()
    }

    /// xxh3-64 of the uniform bytes, for deduplicating uniform blocks.
    #[must_use]
    pub fn uniform_hash(&self) -> u64 {
        xxh3_64(&self.uniforms)
    }
}

// ─── Gatherer ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Expectations {
    uniforms: Arc<[Uniform]>,
    next: usize,
}

/// Parallel data channel of one key-building pass.
#[derive(Debug)]
pub struct PipelineDataGatherer {
    settings: ShadingSettings,
    uniforms: Vec<u8>,
    textures: Vec<TextureBinding>,
    expected: Option<Expectations>,
}

impl Default for PipelineDataGatherer {
    fn default() -> Self {
        Self::new(ShadingSettings::default())
    }
}

impl PipelineDataGatherer {
    #[must_use]
    pub fn new(settings: ShadingSettings) -> Self {
        Self {
            settings,
            uniforms: Vec::with_capacity(256),
            textures: Vec::new(),
            expected: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ShadingSettings {
        &self.settings
    }

    /// Bytes written so far (including alignment padding).
    #[inline]
    #[must_use]
    pub fn uniform_len(&self) -> usize {
        self.uniforms.len()
    }

    #[inline]
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Runs `f` with its writes checked against `uniforms`.
    ///
    /// No-op wrapper when validation is disabled.
    pub fn validated<R>(&mut self, uniforms: &Arc<[Uniform]>, f: impl FnOnce(&mut Self) -> R) -> R {
        if !self.settings.validate_uniforms {
            return f(self);
        }

        assert!(
            self.expected.is_none(),
            "Nested uniform validation scopes are not allowed"
        );
        self.expected = Some(Expectations {
            uniforms: Arc::clone(uniforms),
            next: 0,
        });
        let result = f(self);
        if let Some(exp) = self.expected.take() {
            assert!(
                exp.next == exp.uniforms.len(),
                "Uniform '{}' was declared but never written",
                exp.uniforms[exp.next].name
            );
        }
        result
    }

    fn check(&mut self, ty: SlType, count: u32) {
        let Some(exp) = self.expected.as_mut() else {
            return;
        };
        let Some(declared) = exp.uniforms.get(exp.next) else {
            panic!("Unexpected uniform write of type {ty}: all declared uniforms already written");
        };
        assert!(
            declared.ty == ty && declared.count == count,
            "Uniform '{}' declared as {}[{}], written as {ty}[{count}]",
            declared.name,
            declared.ty,
            declared.count
        );
        exp.next += 1;
    }

    // ── Typed Writes ─────────────────────────────────────────────────────────

    pub fn write<T: UniformValue>(&mut self, value: T) {
        self.write_words(T::TYPE, NON_ARRAY, bytemuck::cast_slice(std::slice::from_ref(&value)));
    }

    pub fn write_array<T: UniformValue>(&mut self, values: &[T]) {
        self.write_words(T::TYPE, values.len() as u32, bytemuck::cast_slice(values));
    }

    /// Writes a float value as its half-precision type.
    pub fn write_half<T: UniformValue>(&mut self, value: T) {
        let ty = T::TYPE.to_half_precision();
        debug_assert!(ty.is_half(), "{} has no half-precision form", T::TYPE);
        self.write_words(ty, NON_ARRAY, bytemuck::cast_slice(std::slice::from_ref(&value)));
    }

    pub fn write_half_array<T: UniformValue>(&mut self, values: &[T]) {
        let ty = T::TYPE.to_half_precision();
        debug_assert!(ty.is_half(), "{} has no half-precision form", T::TYPE);
        self.write_words(ty, values.len() as u32, bytemuck::cast_slice(values));
    }

    /// Writes tightly packed 4-byte scalars (`f32` for float and half types,
    /// `i32` for integer types), as stored by runtime effects.
    pub fn write_raw(&mut self, ty: SlType, count: u32, bytes: &[u8]) {
        let words: SmallVec<[u32; 16]> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        self.write_words(ty, count, &words);
    }

    /// Packs `count.max(1)` values of `ty` whose scalars are in `words`.
    fn write_words(&mut self, ty: SlType, count: u32, words: &[u32]) {
        self.check(ty, count);

        let layout = self.settings.uniform_layout;
        let is_array = count != NON_ARRAY;
        let elements = count.max(1) as usize;
        let rows = ty.rows();
        let columns = ty.columns();
        assert_eq!(
            words.len(),
            elements * rows * columns,
            "Uniform data size does not match {ty}[{count}]"
        );

        let alignment = match layout {
            UniformLayout::Std140 if is_array => layout.alignment(ty).max(16),
            _ => layout.alignment(ty),
        };
        let stride = if is_array { layout.array_stride(ty) } else { layout.size(ty) };
        let column_stride = layout.column_stride(ty);

        self.pad_to(self.uniforms.len().next_multiple_of(alignment));
        for (e, element) in words.chunks_exact(rows * columns).enumerate() {
            let start = self.uniforms.len();
            debug_assert_eq!(start % alignment, 0, "element {e} misaligned");
            for (c, column) in element.chunks_exact(rows).enumerate() {
                self.pad_to(start + c * column_stride);
                for &w in column {
                    self.push_scalar(ty, w);
                }
            }
            self.pad_to(start + stride);
        }
    }

    #[inline]
    fn push_scalar(&mut self, ty: SlType, word: u32) {
        if ty.is_half() {
            let h = f16::from_f32(f32::from_bits(word));
            self.uniforms.extend_from_slice(&h.to_le_bytes());
        } else {
            self.uniforms.extend_from_slice(&word.to_le_bytes());
        }
    }

    #[inline]
    fn pad_to(&mut self, len: usize) {
        if self.uniforms.len() < len {
            self.uniforms.resize(len, 0);
        }
    }

    // ── Resources ────────────────────────────────────────────────────────────

    pub fn add(&mut self, sampling: &SamplingOptions, tile_modes: TileModePair, texture: TextureProxy) {
        self.textures.push(TextureBinding {
            sampler: SamplerDesc::new(sampling, tile_modes),
            texture,
        });
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Takes the gathered data (uniforms padded to 16 bytes) and resets.
    pub fn finish(&mut self) -> PipelineData {
        self.expected = None;
        let len = self.uniforms.len().next_multiple_of(16);
        self.pad_to(len);
        PipelineData {
            uniforms: std::mem::take(&mut self.uniforms),
            textures: std::mem::take(&mut self.textures),
        }
    }

    pub fn reset(&mut self) {
        self.uniforms.clear();
        self.textures.clear();
        self.expected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gatherer(layout: UniformLayout) -> PipelineDataGatherer {
        PipelineDataGatherer::new(ShadingSettings {
            uniform_layout: layout,
            validate_uniforms: true,
        })
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytemuck::pod_collect_to_vec(bytes)
    }

    #[test]
    fn std140_array_elements_are_16_byte_aligned() {
        let mut g = gatherer(UniformLayout::Std140);
        g.write(1.0f32);
        g.write_array(&[2.0f32, 3.0]);
        let data = g.finish();
        assert_eq!(data.uniforms.len(), 48);
        let f = floats(&data.uniforms);
        assert_eq!(f[0], 1.0);
        assert_eq!(f[4], 2.0);
        assert_eq!(f[8], 3.0);
    }

    #[test]
    fn std430_scalar_arrays_are_packed() {
        let mut g = gatherer(UniformLayout::Std430);
        g.write(1.0f32);
        g.write_array(&[2.0f32, 3.0]);
        assert_eq!(g.uniform_len(), 12);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut g = gatherer(UniformLayout::Std140);
        g.write(Mat3::IDENTITY);
        let f = floats(&g.finish().uniforms);
        assert_eq!(f.len(), 12);
        assert_eq!(&f[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&f[4..8], &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn halves_pack_as_binary16() {
        let mut g = gatherer(UniformLayout::Std430);
        g.write_half(Vec4::new(1.0, 0.5, 0.0, -2.0));
        let data = g.finish();
        let halves: Vec<f16> = bytemuck::pod_collect_to_vec(&data.uniforms[..8]);
        assert_eq!(halves[1], f16::from_f32(0.5));
        assert_eq!(halves[3], f16::from_f32(-2.0));
    }

    #[test]
    fn validated_accepts_matching_writes() {
        let declared: Arc<[Uniform]> = vec![
            Uniform::new("color", SlType::Float4),
            Uniform::new("mode", SlType::Int),
        ]
        .into();
        let mut g = gatherer(UniformLayout::Std140);
        g.validated(&declared, |g| {
            g.write(Vec4::ONE);
            g.write(3i32);
        });
        assert_eq!(g.uniform_len(), 20);
    }

    #[test]
    #[should_panic(expected = "declared as")]
    fn validated_rejects_wrong_type() {
        let declared: Arc<[Uniform]> = vec![Uniform::new("color", SlType::Float4)].into();
        let mut g = gatherer(UniformLayout::Std140);
        g.validated(&declared, |g| g.write(1.0f32));
    }

    #[test]
    #[should_panic(expected = "never written")]
    fn validated_rejects_missing_write() {
        let declared: Arc<[Uniform]> = vec![Uniform::new("color", SlType::Float4)].into();
        let mut g = gatherer(UniformLayout::Std140);
        g.validated(&declared, |_| {});
    }

    #[test]
    fn uniform_hash_tracks_content() {
        let mut a = gatherer(UniformLayout::Std140);
        let mut b = gatherer(UniformLayout::Std140);
        a.write(Vec4::ONE);
        b.write(Vec4::ONE);
        assert_eq!(a.finish().uniform_hash(), b.finish().uniform_hash());
    }
}
