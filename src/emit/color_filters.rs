//! Color filter dispatch.

use crate::color::{AlphaType, ColorSpaceXformSteps, map_color};
use crate::effects::ColorFilter;
use crate::gatherer::PipelineDataGatherer;
use crate::key::PaintParamsKeyBuilder;

use super::blenders::add_color_blend_block;
use super::{KeyContext, add_runtime_effect_to_key, blocks};

/// Emits `filter` and its subtree in preorder. Filters operate on
/// premultiplied colors in the destination color space.
pub fn add_color_filter_to_key(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    mut gatherer: Option<&mut PipelineDataGatherer>,
    filter: &ColorFilter,
) {
    match filter {
        ColorFilter::Noop => blocks::add_prior_output(ctx, builder, gatherer),
        ColorFilter::Blend { mode, color } => {
            let color = map_color(*color, ctx.dst_color_info().color_space);
            add_color_blend_block(ctx, builder, gatherer, *mode, color);
        }
        ColorFilter::Matrix { matrix, domain } => {
            blocks::add_matrix_color_filter(ctx, builder, gatherer, matrix, *domain);
        }
        ColorFilter::Compose { outer, inner } => {
            blocks::begin_compose_color_filter(ctx, builder, gatherer.as_deref_mut());
            add_color_filter_to_key(ctx, builder, gatherer.as_deref_mut(), inner);
            add_color_filter_to_key(ctx, builder, gatherer, outer);
            builder.end_block();
        }
        ColorFilter::Gaussian => blocks::add_gaussian_color_filter(ctx, builder, gatherer),
        ColorFilter::Table(table) => blocks::add_table_color_filter(ctx, builder, gatherer, table),
        ColorFilter::ColorSpaceXform { src, dst } => {
            let steps = ColorSpaceXformSteps::new(*src, AlphaType::Premul, *dst, AlphaType::Premul);
            blocks::add_color_space_xform(ctx, builder, gatherer, &steps);
        }
        ColorFilter::WorkingFormat {
            child,
            color_space,
            alpha_type,
        } => {
            let dst = ctx.dst_color_info();
            let working_cs = color_space.unwrap_or(dst.color_space);
            let working_at = alpha_type.unwrap_or(dst.alpha_type);
            let to_working = ColorSpaceXformSteps::new(dst.color_space, AlphaType::Premul, working_cs, working_at);
            let from_working = ColorSpaceXformSteps::new(working_cs, working_at, dst.color_space, AlphaType::Premul);

            // compose(compose(to_working, child), from_working)
            blocks::begin_compose_color_filter(ctx, builder, gatherer.as_deref_mut());
            blocks::begin_compose_color_filter(ctx, builder, gatherer.as_deref_mut());
            blocks::add_color_space_xform(ctx, builder, gatherer.as_deref_mut(), &to_working);
            add_color_filter_to_key(ctx, builder, gatherer.as_deref_mut(), child);
            builder.end_block();
            blocks::add_color_space_xform(ctx, builder, gatherer, &from_working);
            builder.end_block();
        }
        ColorFilter::Runtime(instance) => add_runtime_effect_to_key(ctx, builder, gatherer, instance),
    }
}
