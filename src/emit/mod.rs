//! Block Emitters
//!
//! Translate effect instances into key blocks and, when a gatherer is
//! present, the matching uniform and texture data.
//!
//! # Modes
//!
//! Every emitter takes an `Option<&mut PipelineDataGatherer>`:
//!
//! - `Some`: concrete build. Uniforms are written before each block is
//!   opened, in the same preorder the key records.
//! - `None`: structure only. The key is identical in shape; no data is
//!   produced and no textures are requested. The combination builder uses
//!   this mode.
//!
//! # Fallbacks
//!
//! Emitters never abort a build. When a lookup texture cannot be obtained
//! the block degrades to a pass-through (`PriorOutput`) or an opaque error
//! color (`SolidColor`), and a warning is logged.
//!
//! # Module Layout
//!
//! - [`blocks`]: one function per built-in snippet
//! - [`gradient`]: gradient stop storage and snippet selection
//! - [`shaders`], [`color_filters`], [`blenders`]: exhaustive dispatch over
//!   the effect enums

pub mod blenders;
pub mod blocks;
pub mod color_filters;
pub mod gradient;
pub mod shaders;

use std::fmt;

use crate::color::ColorInfo;
use crate::dictionary::{ShaderCodeDictionary, UniquePaintParamsId};
use crate::effects::{Blender, DstRead, PaintParams, RuntimeChild, RuntimeEffectInstance};
use crate::errors::Result;
use crate::gatherer::{PipelineData, PipelineDataGatherer};
use crate::key::{PaintParamsKey, PaintParamsKeyBuilder};
use crate::settings::ShadingSettings;
use crate::texture::{Bitmap, TextureProvider, TextureProxy};

pub use blenders::{add_blender_to_key, add_color_blend_block, add_dst_blend_block, add_primitive_blend_block};
pub use color_filters::add_color_filter_to_key;
pub use shaders::add_shader_to_key;

/// Dither amplitude for 8-bit destinations.
pub const DITHER_RANGE_8BIT: f32 = 1.0 / 255.0;

// ─── Key Context ──────────────────────────────────────────────────────────────

/// Shared, read-only state of one key-building pass.
#[derive(Clone, Copy)]
pub struct KeyContext<'a> {
    dict: &'a ShaderCodeDictionary,
    textures: Option<&'a dyn TextureProvider>,
    dst_color_info: ColorInfo,
}

impl<'a> KeyContext<'a> {
    #[must_use]
    pub fn new(dict: &'a ShaderCodeDictionary, dst_color_info: ColorInfo) -> Self {
        Self {
            dict,
            textures: None,
            dst_color_info,
        }
    }

    /// Attaches the source of lookup textures. Without one, every lookup
    /// texture request fails and the emitters fall back.
    #[must_use]
    pub fn with_textures(mut self, textures: &'a dyn TextureProvider) -> Self {
        self.textures = Some(textures);
        self
    }

    #[inline]
    #[must_use]
    pub fn dict(&self) -> &'a ShaderCodeDictionary {
        self.dict
    }

    #[inline]
    #[must_use]
    pub fn dst_color_info(&self) -> ColorInfo {
        self.dst_color_info
    }

    pub(crate) fn find_or_create_cached(&self, bitmap: &Bitmap, label: &str) -> Option<TextureProxy> {
        self.textures?.find_or_create_cached(bitmap, label)
    }
}

impl fmt::Debug for KeyContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyContext")
            .field("dst_color_info", &self.dst_color_info)
            .field("has_textures", &self.textures.is_some())
            .finish_non_exhaustive()
    }
}

// ─── Runtime Effects ──────────────────────────────────────────────────────────

/// Runtime block followed by its children; unbound children pass the
/// input through.
pub fn add_runtime_effect_to_key(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    mut gatherer: Option<&mut PipelineDataGatherer>,
    instance: &RuntimeEffectInstance,
) {
    blocks::begin_runtime_effect(ctx, builder, gatherer.as_deref_mut(), instance);
    for child in instance.children() {
        match child {
            RuntimeChild::Shader(Some(shader)) => {
                add_shader_to_key(ctx, builder, gatherer.as_deref_mut(), shader);
            }
            RuntimeChild::ColorFilter(Some(filter)) => {
                add_color_filter_to_key(ctx, builder, gatherer.as_deref_mut(), filter);
            }
            RuntimeChild::Blender(Some(blender)) => {
                add_blender_to_key(ctx, builder, gatherer.as_deref_mut(), blender);
            }
            RuntimeChild::Shader(None) | RuntimeChild::ColorFilter(None) | RuntimeChild::Blender(None) => {
                blocks::add_prior_output(ctx, builder, gatherer.as_deref_mut());
            }
        }
    }
    builder.end_block();
}

// ─── Paints ───────────────────────────────────────────────────────────────────

/// Emits the root blocks of a paint:
///
/// 1. the destination read, if requested
/// 2. the shader, or the paint color
/// 3. the primitive-color blend, if any
/// 4. the color filter, if any
/// 5. dithering, if enabled
/// 6. the final blend (against the read destination when there is one)
pub fn add_paint_to_key(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    mut gatherer: Option<&mut PipelineDataGatherer>,
    paint: &PaintParams,
) {
    match &paint.dst_read {
        Some(DstRead::Sample { texture, offset }) => {
            blocks::add_dst_read_sample(ctx, builder, gatherer.as_deref_mut(), texture, *offset);
        }
        Some(DstRead::Fetch) => blocks::add_dst_read_fetch(ctx, builder, gatherer.as_deref_mut()),
        None => {}
    }

    match &paint.shader {
        Some(shader) => add_shader_to_key(ctx, builder, gatherer.as_deref_mut(), shader),
        None => shaders::add_solid_color_to_key(ctx, builder, gatherer.as_deref_mut(), paint.color),
    }

    if let Some(blender) = &paint.primitive_blender {
        add_primitive_blend_block(ctx, builder, gatherer.as_deref_mut(), blender);
    }

    if let Some(filter) = &paint.color_filter {
        add_color_filter_to_key(ctx, builder, gatherer.as_deref_mut(), filter);
    }

    if paint.dither {
        blocks::add_dither(ctx, builder, gatherer.as_deref_mut(), DITHER_RANGE_8BIT);
    }

    let default_blender = Blender::default();
    let blender = paint.blender.as_ref().unwrap_or(&default_blender);
    if paint.dst_read.is_some() {
        add_dst_blend_block(ctx, builder, gatherer, blender);
    } else {
        add_blender_to_key(ctx, builder, gatherer, blender);
    }
}

impl PaintParams {
    /// Emits this paint and finishes the key.
    pub fn to_key(
        &self,
        ctx: &KeyContext<'_>,
        builder: &mut PaintParamsKeyBuilder<'_>,
        gatherer: Option<&mut PipelineDataGatherer>,
    ) -> Result<PaintParamsKey> {
        add_paint_to_key(ctx, builder, gatherer, self);
        builder.finish()
    }
}

/// One-shot concrete build: canonical ID plus the gathered data.
pub fn build_paint(
    ctx: &KeyContext<'_>,
    settings: ShadingSettings,
    paint: &PaintParams,
) -> Result<(UniquePaintParamsId, PipelineData)> {
    let mut builder = PaintParamsKeyBuilder::new(ctx.dict());
    let mut gatherer = PipelineDataGatherer::new(settings);
    let key = paint.to_key(ctx, &mut builder, Some(&mut gatherer))?;
    let id = ctx.dict().find_or_create(&key);
    Ok((id, gatherer.finish()))
}
