//! Blender dispatch and the blend-shader composites built on it.
//!
//! A blend shader's children are `src`, `dst`, then the blender:
//!
//! | Composite        | src            | dst              |
//! |------------------|----------------|------------------|
//! | color blend      | solid color    | prior output     |
//! | dst blend        | prior output   | destination      |
//! | primitive blend  | prior output   | primitive color  |

use crate::blend::BlendMode;
use crate::color::PmColor4f;
use crate::effects::Blender;
use crate::gatherer::PipelineDataGatherer;
use crate::key::PaintParamsKeyBuilder;

use super::{KeyContext, add_runtime_effect_to_key, blocks};

/// Porter-Duff modes become coefficient blenders; the rest are evaluated by
/// mode index.
pub fn add_blend_mode_to_key(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    mode: BlendMode,
) {
    match mode.porter_duff_coefficients() {
        Some(coeffs) => blocks::add_coeff_blender(ctx, builder, gatherer, coeffs),
        None => blocks::add_blend_mode_blender(ctx, builder, gatherer, mode),
    }
}

pub fn add_blender_to_key(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    blender: &Blender,
) {
    match blender {
        Blender::Mode(mode) => add_blend_mode_to_key(ctx, builder, gatherer, *mode),
        Blender::Runtime(instance) => add_runtime_effect_to_key(ctx, builder, gatherer, instance),
    }
}

/// Blends a constant color over the prior output. Always evaluated by mode
/// index, never with coefficients.
pub fn add_color_blend_block(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    mut gatherer: Option<&mut PipelineDataGatherer>,
    mode: BlendMode,
    color: PmColor4f,
) {
    blocks::begin_blend_shader(ctx, builder, gatherer.as_deref_mut());
    blocks::add_solid_color(ctx, builder, gatherer.as_deref_mut(), color);
    blocks::add_prior_output(ctx, builder, gatherer.as_deref_mut());
    blocks::add_blend_mode_blender(ctx, builder, gatherer, mode);
    builder.end_block();
}

/// Blends the prior output with the destination read earlier in the key.
pub fn add_dst_blend_block(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    mut gatherer: Option<&mut PipelineDataGatherer>,
    blender: &Blender,
) {
    blocks::begin_blend_shader(ctx, builder, gatherer.as_deref_mut());
    blocks::add_prior_output(ctx, builder, gatherer.as_deref_mut());
    blocks::add_dst_color(ctx, builder, gatherer.as_deref_mut());
    add_blender_to_key(ctx, builder, gatherer, blender);
    builder.end_block();
}

/// Blends the prior output with the primitive's own color.
pub fn add_primitive_blend_block(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    mut gatherer: Option<&mut PipelineDataGatherer>,
    blender: &Blender,
) {
    blocks::begin_blend_shader(ctx, builder, gatherer.as_deref_mut());
    blocks::add_prior_output(ctx, builder, gatherer.as_deref_mut());
    blocks::add_primitive_color(ctx, builder, gatherer.as_deref_mut());
    add_blender_to_key(ctx, builder, gatherer, blender);
    builder.end_block();
}
