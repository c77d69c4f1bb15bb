//! Shader dispatch.

use crate::color::{Color4f, map_color};
use crate::effects::Shader;
use crate::gatherer::PipelineDataGatherer;
use crate::key::PaintParamsKeyBuilder;

use super::blenders::add_blender_to_key;
use super::color_filters::add_color_filter_to_key;
use super::gradient::{GradientData, add_gradient};
use super::{KeyContext, add_runtime_effect_to_key, blocks};

/// Emits `shader` and its subtree in preorder.
pub fn add_shader_to_key(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    mut gatherer: Option<&mut PipelineDataGatherer>,
    shader: &Shader,
) {
    match shader {
        Shader::SolidColor(color) => add_solid_color_to_key(ctx, builder, gatherer, *color),
        Shader::Gradient(gradient) => {
            if gradient.colors.is_empty() {
                log::debug!("Gradient without stops; drawing transparent");
                add_solid_color_to_key(ctx, builder, gatherer, Color4f::TRANSPARENT);
            } else {
                add_gradient(ctx, builder, gatherer, &GradientData::new(gradient));
            }
        }
        Shader::Image(image) => blocks::add_image(ctx, builder, gatherer, image),
        Shader::LocalMatrix { matrix, shader } => {
            blocks::begin_local_matrix(ctx, builder, gatherer.as_deref_mut(), matrix);
            add_shader_to_key(ctx, builder, gatherer, shader);
            builder.end_block();
        }
        Shader::Blend { blender, src, dst } => {
            blocks::begin_blend_shader(ctx, builder, gatherer.as_deref_mut());
            add_shader_to_key(ctx, builder, gatherer.as_deref_mut(), src);
            add_shader_to_key(ctx, builder, gatherer.as_deref_mut(), dst);
            add_blender_to_key(ctx, builder, gatherer, blender);
            builder.end_block();
        }
        Shader::ColorFilter { shader, filter } => {
            blocks::begin_color_filter_shader(ctx, builder, gatherer.as_deref_mut());
            add_shader_to_key(ctx, builder, gatherer.as_deref_mut(), shader);
            add_color_filter_to_key(ctx, builder, gatherer, filter);
            builder.end_block();
        }
        Shader::CoordClamp { subset, shader } => {
            blocks::begin_coord_clamp(ctx, builder, gatherer.as_deref_mut(), *subset);
            add_shader_to_key(ctx, builder, gatherer, shader);
            builder.end_block();
        }
        Shader::PerlinNoise(noise) => blocks::add_perlin_noise(ctx, builder, gatherer, noise),
        Shader::Runtime(instance) => add_runtime_effect_to_key(ctx, builder, gatherer, instance),
    }
}

/// Solid color converted from unpremultiplied sRGB to the destination.
pub fn add_solid_color_to_key(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    color: Color4f,
) {
    let color = map_color(color, ctx.dst_color_info().color_space);
    blocks::add_solid_color(ctx, builder, gatherer, color);
}
