//! Texture handles, sampling state and the lookup-texture provider seam.
//!
//! Texture creation itself belongs to the GPU layer. Block emitters only
//! need (a) a cheap, cloneable handle to put into the binding table and
//! (b) a way to ask for a cached texture built from CPU-side lookup data.
//! The [`TextureProvider`] trait is that seam; [`TextureCache`] is the
//! in-process implementation used when no GPU is attached.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

// ─── Sampling ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum TileMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
    Decal,
}

impl From<TileMode> for wgpu::AddressMode {
    fn from(tm: TileMode) -> Self {
        match tm {
            TileMode::Clamp => wgpu::AddressMode::ClampToEdge,
            TileMode::Repeat => wgpu::AddressMode::Repeat,
            TileMode::Mirror => wgpu::AddressMode::MirrorRepeat,
            TileMode::Decal => wgpu::AddressMode::ClampToBorder,
        }
    }
}

/// Horizontal and vertical tile modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileModePair {
    pub x: TileMode,
    pub y: TileMode,
}

impl TileModePair {
    pub const CLAMP: Self = Self::new(TileMode::Clamp, TileMode::Clamp);
    pub const REPEAT: Self = Self::new(TileMode::Repeat, TileMode::Repeat);

    #[must_use]
    pub const fn new(x: TileMode, y: TileMode) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

impl From<FilterMode> for wgpu::FilterMode {
    fn from(f: FilterMode) -> Self {
        match f {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MipmapMode {
    #[default]
    None,
    Nearest,
    Linear,
}

/// Bicubic resampler parameters (Mitchell-Netravali family).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CubicResampler {
    pub b: f32,
    pub c: f32,
}

impl CubicResampler {
    pub const MITCHELL: Self = Self { b: 1.0 / 3.0, c: 1.0 / 3.0 };
    pub const CATMULL_ROM: Self = Self { b: 0.0, c: 0.5 };

    /// Polynomial coefficient matrix evaluated by the image shader.
    #[must_use]
    pub fn coefficient_matrix(self) -> glam::Mat4 {
        let (b, c) = (self.b, self.c);
        glam::Mat4::from_cols_array(&[
            b / 6.0,
            -b / 3.0 + 1.0,
            b / 6.0,
            0.0,
            -b / 2.0 - c,
            0.0,
            b / 2.0 + c,
            0.0,
            b / 2.0 + 2.0 * c,
            2.0 * b + c - 3.0,
            3.0 - 5.0 * b / 2.0 - 2.0 * c,
            -c,
            -b / 6.0 - c,
            2.0 - 3.0 * b / 2.0 - c,
            3.0 * b / 2.0 + c - 2.0,
            b / 6.0 + c,
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub filter: FilterMode,
    pub mipmap: MipmapMode,
    pub cubic: Option<CubicResampler>,
}

impl SamplingOptions {
    pub const NEAREST: Self = Self {
        filter: FilterMode::Nearest,
        mipmap: MipmapMode::None,
        cubic: None,
    };

    pub const LINEAR: Self = Self {
        filter: FilterMode::Linear,
        mipmap: MipmapMode::None,
        cubic: None,
    };

    #[must_use]
    pub const fn cubic(resampler: CubicResampler) -> Self {
        Self {
            filter: FilterMode::Nearest,
            mipmap: MipmapMode::None,
            cubic: Some(resampler),
        }
    }

    #[must_use]
    pub fn use_cubic(&self) -> bool {
        self.cubic.is_some()
    }
}

/// Sampler state recorded next to each bound texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub mipmap: MipmapMode,
    pub tile_modes: TileModePair,
}

impl SamplerDesc {
    #[must_use]
    pub fn new(sampling: &SamplingOptions, tile_modes: TileModePair) -> Self {
        // Cubic filtering is done in the shader from nearest taps.
        let filter = if sampling.use_cubic() {
            FilterMode::Nearest
        } else {
            sampling.filter
        };
        Self {
            filter,
            mipmap: sampling.mipmap,
            tile_modes,
        }
    }

    /// The `wgpu` sampler descriptor for this state.
    #[must_use]
    pub fn to_wgpu<'a>(&self, label: Option<&'a str>) -> wgpu::SamplerDescriptor<'a> {
        let mipmap_filter = match self.mipmap {
            MipmapMode::None | MipmapMode::Nearest => wgpu::MipmapFilterMode::Nearest,
            MipmapMode::Linear => wgpu::MipmapFilterMode::Linear,
        };
        let lod_max_clamp = if self.mipmap == MipmapMode::None { 0.0 } else { 32.0 };
        wgpu::SamplerDescriptor {
            label,
            address_mode_u: self.tile_modes.x.into(),
            address_mode_v: self.tile_modes.y.into(),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: self.filter.into(),
            min_filter: self.filter.into(),
            mipmap_filter,
            lod_max_clamp,
            border_color: (self.tile_modes.x == TileMode::Decal
                || self.tile_modes.y == TileMode::Decal)
                .then_some(wgpu::SamplerBorderColor::TransparentBlack),
            ..Default::default()
        }
    }
}

/// Channel swizzle applied when reading an image texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum ReadSwizzle {
    #[default]
    Rgba,
    Rgb1,
    Rrrr,
    Rrr1,
    Bgra,
    ZeroZeroZeroR,
}

// ─── CPU Lookup Data ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitmapFormat {
    Alpha8,
    Rgba8,
    RgbaF16,
}

impl BitmapFormat {
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Alpha8 => 1,
            Self::Rgba8 => 4,
            Self::RgbaF16 => 8,
        }
    }
}

/// Immutable CPU pixels used to build lookup textures.
///
/// Content-addressed: two bitmaps with the same dimensions, format and
/// pixels share a [`Bitmap::content_hash`].
#[derive(Debug, Clone)]
pub struct Bitmap {
    width: u32,
    height: u32,
    format: BitmapFormat,
    pixels: Arc<[u8]>,
    content_hash: u64,
}

impl Bitmap {
    /// Returns `None` if `pixels` does not match the dimensions.
    #[must_use]
    pub fn new(width: u32, height: u32, format: BitmapFormat, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        (pixels.len() == expected).then(|| Self::from_parts(width, height, format, pixels))
    }

    /// Callers guarantee `pixels` matches the dimensions.
    pub(crate) fn from_parts(width: u32, height: u32, format: BitmapFormat, pixels: Vec<u8>) -> Self {
        let mut hashed = Vec::with_capacity(pixels.len() + 9);
        hashed.extend_from_slice(&width.to_le_bytes());
        hashed.extend_from_slice(&height.to_le_bytes());
        hashed.push(format as u8);
        hashed.extend_from_slice(&pixels);
        Self {
            width,
            height,
            format,
            pixels: pixels.into(),
            content_hash: xxh3_64(&hashed),
        }
    }

    /// 8×8 ordered-dither (Bayer) matrix, values centered in each 1/64 step.
    #[must_use]
    pub fn dither_lut() -> Self {
        const BAYER: [[u8; 8]; 8] = [
            [0, 32, 8, 40, 2, 34, 10, 42],
            [48, 16, 56, 24, 50, 18, 58, 26],
            [12, 44, 4, 36, 14, 46, 6, 38],
            [60, 28, 52, 20, 62, 30, 54, 22],
            [3, 35, 11, 43, 1, 33, 9, 41],
            [51, 19, 59, 27, 49, 17, 57, 25],
            [15, 47, 7, 39, 13, 45, 5, 37],
            [63, 31, 55, 23, 61, 29, 53, 21],
        ];
        let pixels = BAYER.iter().flatten().map(|&v| v * 4 + 2).collect();
        Self::from_parts(8, 8, BitmapFormat::Alpha8, pixels)
    }

    /// 256×4 alpha table, one row per channel in A, R, G, B order.
    #[must_use]
    pub fn color_table(tables: &[[u8; 256]; 4]) -> Self {
        let pixels = tables.iter().flatten().copied().collect();
        Self::from_parts(256, 4, BitmapFormat::Alpha8, pixels)
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> BitmapFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }
}

// ─── Texture Handles ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct TextureProxyInner {
    id: u32,
    width: u32,
    height: u32,
    label: String,
}

/// Shared handle to a GPU texture owned by the resource layer.
///
/// Equality is identity of the underlying texture.
#[derive(Debug, Clone)]
pub struct TextureProxy(Arc<TextureProxyInner>);

impl TextureProxy {
    #[must_use]
    pub fn new(id: u32, width: u32, height: u32, label: impl Into<String>) -> Self {
        Self(Arc::new(TextureProxyInner {
            id,
            width,
            height,
            label: label.into(),
        }))
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.0.id
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.0.label
    }
}

impl PartialEq for TextureProxy {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TextureProxy {}

/// Source of cached lookup textures.
///
/// Returning `None` signals an acquisition failure; emitters fall back to a
/// pass-through or error-color block and never abort the build.
pub trait TextureProvider: Send + Sync {
    fn find_or_create_cached(&self, bitmap: &Bitmap, label: &str) -> Option<TextureProxy>;
}

/// In-process texture cache keyed by bitmap content.
///
/// Optionally bounded: once `budget` distinct textures exist, further
/// creations fail (cached lookups still succeed).
#[derive(Debug)]
pub struct TextureCache {
    cache: Mutex<FxHashMap<u64, TextureProxy>>,
    next_id: AtomicU32,
    budget: Option<usize>,
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(FxHashMap::default()),
            next_id: AtomicU32::new(1),
            budget: None,
        }
    }

    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TextureProvider for TextureCache {
    fn find_or_create_cached(&self, bitmap: &Bitmap, label: &str) -> Option<TextureProxy> {
        let mut cache = self.cache.lock();
        if let Some(proxy) = cache.get(&bitmap.content_hash()) {
            return Some(proxy.clone());
        }
        if self.budget.is_some_and(|budget| cache.len() >= budget) {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let proxy = TextureProxy::new(id, bitmap.width(), bitmap.height(), label);
        log::debug!(
            "Created lookup texture '{label}' ({}x{}) id={id}",
            bitmap.width(),
            bitmap.height()
        );
        cache.insert(bitmap.content_hash(), proxy.clone());
        Some(proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_rejects_wrong_pixel_count() {
        assert!(Bitmap::new(2, 2, BitmapFormat::Rgba8, vec![0; 15]).is_none());
        assert!(Bitmap::new(2, 2, BitmapFormat::Rgba8, vec![0; 16]).is_some());
    }

    #[test]
    fn cache_reuses_identical_content() {
        let cache = TextureCache::new();
        let a = cache.find_or_create_cached(&Bitmap::dither_lut(), "lut").unwrap();
        let b = cache.find_or_create_cached(&Bitmap::dither_lut(), "lut").unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_budget_fails_creation() {
        let cache = TextureCache::with_budget(0);
        assert!(cache.find_or_create_cached(&Bitmap::dither_lut(), "lut").is_none());
    }

    #[test]
    fn decal_maps_to_border_sampler() {
        let desc = SamplerDesc::new(
            &SamplingOptions::LINEAR,
            TileModePair::new(TileMode::Decal, TileMode::Repeat),
        );
        let wgpu_desc = desc.to_wgpu(Some("test"));
        assert_eq!(wgpu_desc.address_mode_u, wgpu::AddressMode::ClampToBorder);
        assert_eq!(wgpu_desc.address_mode_v, wgpu::AddressMode::Repeat);
        assert_eq!(
            wgpu_desc.border_color,
            Some(wgpu::SamplerBorderColor::TransparentBlack)
        );
    }
}
