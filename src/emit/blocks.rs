//! Per-snippet block emission.
//!
//! `add_*` functions emit a complete leaf block. `begin_*` functions open a
//! block whose children the caller emits before calling `end_block`.

use glam::{IVec2, Mat3, Mat4, Vec2, Vec4};

use crate::blend::BlendMode;
use crate::color::{ColorSpaceXformSteps, PmColor4f, TransferFunctionType, XformFlags};
use crate::dictionary::{BuiltInCodeSnippetId, SnippetId};
use crate::effects::{ImageShader, MatrixDomain, PerlinNoiseShader, RuntimeEffectInstance};
use crate::gatherer::PipelineDataGatherer;
use crate::key::PaintParamsKeyBuilder;
use crate::texture::{Bitmap, SamplingOptions, TextureProxy, TileMode, TileModePair};

use super::KeyContext;

/// Writes `id`'s uniforms (validated) when gathering, then opens the block.
pub(crate) fn begin_built_in(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    id: BuiltInCodeSnippetId,
    write: impl FnOnce(&mut PipelineDataGatherer),
) {
    if let Some(gatherer) = gatherer {
        gatherer.validated(&ctx.dict().built_in_snippet(id).uniforms, write);
    }
    builder.begin_block(id);
}

fn add_built_in(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    id: BuiltInCodeSnippetId,
    write: impl FnOnce(&mut PipelineDataGatherer),
) {
    begin_built_in(ctx, builder, gatherer, id, write);
    builder.end_block();
}

// ─── Inputs ───────────────────────────────────────────────────────────────────

/// Pass-through of the color computed so far.
pub fn add_prior_output(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::PriorOutput, |_| {});
}

pub fn add_solid_color(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    color: PmColor4f,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::SolidColorShader, |g| {
        g.write(color);
    });
}

pub fn add_dst_color(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::DstColor, |_| {});
}

pub fn add_primitive_color(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::PrimitiveColor, |_| {});
}

/// Reads the destination from a copy; `offset` is the copy's origin in
/// device space.
pub fn add_dst_read_sample(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    texture: &TextureProxy,
    offset: IVec2,
) {
    let gatherer = gatherer.map(|g| {
        g.add(&SamplingOptions::NEAREST, TileModePair::CLAMP, texture.clone());
        g
    });
    let (w, h) = texture.dimensions();
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::DstReadSample, |g| {
        g.write(Vec4::new(
            offset.x as f32,
            offset.y as f32,
            1.0 / w.max(1) as f32,
            1.0 / h.max(1) as f32,
        ));
    });
}

pub fn add_dst_read_fetch(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::DstReadFetch, |_| {});
}

// ─── Shaders ──────────────────────────────────────────────────────────────────

/// Opens a local-matrix block. The uniform is the inverse of `matrix`, or
/// identity when `matrix` is singular.
pub fn begin_local_matrix(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    matrix: &Mat4,
) {
    begin_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::LocalMatrixShader, |g| {
        let det = matrix.determinant();
        let inverse = if det != 0.0 && det.is_finite() {
            matrix.inverse()
        } else {
            log::warn!("Local matrix is not invertible; using identity");
            Mat4::IDENTITY
        };
        g.write(inverse);
    });
}

/// Image block, or the error color when gathering without a texture.
pub fn add_image(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    image: &ImageShader,
) {
    let Some(gatherer) = gatherer else {
        builder.add_block(BuiltInCodeSnippetId::ImageShader);
        return;
    };
    let Some(texture) = &image.texture else {
        log::warn!("Image shader has no texture; drawing error color");
        add_solid_color(ctx, builder, Some(gatherer), PmColor4f::ERROR);
        return;
    };

    gatherer.add(&image.sampling, image.tile_modes, texture.clone());

    let (w, h) = texture.dimensions();
    let subset = image.subset.unwrap_or(Vec4::new(0.0, 0.0, w as f32, h as f32));
    let dst = ctx.dst_color_info();
    let steps = ColorSpaceXformSteps::new(
        image.color_info.color_space,
        image.color_info.alpha_type,
        dst.color_space,
        dst.alpha_type,
    );
    add_built_in(ctx, builder, Some(gatherer), BuiltInCodeSnippetId::ImageShader, |g| {
        g.write(Vec2::new(w as f32, h as f32));
        g.write(subset);
        g.write(image.tile_modes.x as i32);
        g.write(image.tile_modes.y as i32);
        g.write(image.sampling.filter as i32);
        g.write(i32::from(image.sampling.use_cubic()));
        let cubic = image.sampling.cubic.map_or(Mat4::IDENTITY, |c| c.coefficient_matrix());
        g.write_half(cubic);
        g.write(image.read_swizzle as i32);
        write_color_space_uniforms(g, &steps);
    });
}

pub fn begin_coord_clamp(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    subset: Vec4,
) {
    begin_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::CoordClampShader, |g| {
        g.write(subset);
    });
}

/// Ordered dithering with the 8×8 Bayer LUT. Falls back to pass-through
/// when the LUT texture is unavailable.
pub fn add_dither(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    range: f32,
) {
    let Some(gatherer) = gatherer else {
        builder.add_block(BuiltInCodeSnippetId::DitherShader);
        return;
    };
    let Some(lut) = ctx.find_or_create_cached(&Bitmap::dither_lut(), "DitherLUT") else {
        log::warn!("Couldn't create dither shader's LUT");
        add_prior_output(ctx, builder, Some(gatherer));
        return;
    };

    gatherer.add(&SamplingOptions::NEAREST, TileModePair::REPEAT, lut);
    add_built_in(ctx, builder, Some(gatherer), BuiltInCodeSnippetId::DitherShader, |g| {
        g.write_half(range);
    });
}

/// Perlin noise; the error color when its lookup textures are unavailable.
pub fn add_perlin_noise(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    noise: &PerlinNoiseShader,
) {
    let Some(gatherer) = gatherer else {
        builder.add_block(BuiltInCodeSnippetId::PerlinNoiseShader);
        return;
    };
    let permutations = ctx.find_or_create_cached(noise.permutations(), "PerlinNoisePermutations");
    let tables = ctx.find_or_create_cached(noise.noise(), "PerlinNoiseTable");
    let (Some(permutations), Some(tables)) = (permutations, tables) else {
        log::warn!("Couldn't create perlin noise lookup textures");
        add_solid_color(ctx, builder, Some(gatherer), PmColor4f::ERROR);
        return;
    };

    let repeat_x = TileModePair::new(TileMode::Repeat, TileMode::Clamp);
    gatherer.add(&SamplingOptions::NEAREST, repeat_x, permutations);
    gatherer.add(&SamplingOptions::NEAREST, repeat_x, tables);
    add_built_in(ctx, builder, Some(gatherer), BuiltInCodeSnippetId::PerlinNoiseShader, |g| {
        g.write(noise.base_frequency);
        g.write(noise.stitch_data());
        g.write(noise.noise_type as i32);
        g.write(noise.num_octaves);
        g.write(i32::from(noise.tile_size.is_some()));
    });
}

/// Opens a blend shader; children are `src`, `dst`, then the blender.
pub fn begin_blend_shader(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    begin_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::BlendShader, |_| {});
}

/// Opens a color-filtered shader; children are the shader, then the filter.
pub fn begin_color_filter_shader(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    begin_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::ColorFilterShader, |_| {});
}

// ─── Blenders ─────────────────────────────────────────────────────────────────

pub fn add_blend_mode_blender(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    mode: BlendMode,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::BlendModeBlender, |g| {
        g.write(mode.as_i32());
    });
}

pub fn add_coeff_blender(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    coeffs: [f32; 4],
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::CoeffBlender, |g| {
        g.write_half(coeffs);
    });
}

// ─── Color Filters ────────────────────────────────────────────────────────────

/// Row-major 4×5 matrix: the 4×4 part and the translation column.
pub fn add_matrix_color_filter(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    matrix: &[f32; 20],
    domain: MatrixDomain,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::MatrixColorFilter, |g| {
        let row = |r: usize| Vec4::new(matrix[r * 5], matrix[r * 5 + 1], matrix[r * 5 + 2], matrix[r * 5 + 3]);
        let m = Mat4::from_cols(row(0), row(1), row(2), row(3)).transpose();
        let translate = Vec4::new(matrix[4], matrix[9], matrix[14], matrix[19]);
        g.write(m);
        g.write(translate);
        g.write(i32::from(domain == MatrixDomain::Hsla));
    });
}

/// Opens a compose filter; children are `inner`, then `outer`.
pub fn begin_compose_color_filter(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    begin_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::ComposeColorFilter, |_| {});
}

pub fn add_gaussian_color_filter(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::GaussianColorFilter, |_| {});
}

/// Table lookup. Falls back to pass-through when the table texture is
/// unavailable.
pub fn add_table_color_filter(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    table: &Bitmap,
) {
    let Some(gatherer) = gatherer else {
        builder.add_block(BuiltInCodeSnippetId::TableColorFilter);
        return;
    };
    let Some(texture) = ctx.find_or_create_cached(table, "ColorTable") else {
        log::warn!("Couldn't create TableColorFilter's table");
        add_prior_output(ctx, builder, Some(gatherer));
        return;
    };

    gatherer.add(&SamplingOptions::NEAREST, TileModePair::CLAMP, texture);
    add_built_in(ctx, builder, Some(gatherer), BuiltInCodeSnippetId::TableColorFilter, |_| {});
}

pub fn add_color_space_xform(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    steps: &ColorSpaceXformSteps,
) {
    add_built_in(ctx, builder, gatherer, BuiltInCodeSnippetId::ColorSpaceXformColorFilter, |g| {
        write_color_space_uniforms(g, steps);
    });
}

/// flags, source curve, gamut matrix, destination curve. Unused curves are
/// written as `Invalid` with zero coefficients.
fn write_color_space_uniforms(g: &mut PipelineDataGatherer, steps: &ColorSpaceXformSteps) {
    const EMPTY_CURVE: [f32; 7] = [0.0; 7];

    g.write(steps.flags.bits() as i32);

    if steps.flags.contains(XformFlags::LINEARIZE) {
        g.write(steps.src_tf.kind() as i32);
        g.write_half_array(&steps.src_tf.coefficients()[..]);
    } else {
        g.write(TransferFunctionType::Invalid as i32);
        g.write_half_array(&EMPTY_CURVE[..]);
    }

    let gamut = if steps.flags.contains(XformFlags::GAMUT_TRANSFORM) {
        steps.src_to_dst
    } else {
        Mat3::IDENTITY
    };
    g.write_half(gamut);

    if steps.flags.contains(XformFlags::ENCODE) {
        g.write(steps.dst_tf_inv.kind() as i32);
        g.write_half_array(&steps.dst_tf_inv.coefficients()[..]);
    } else {
        g.write(TransferFunctionType::Invalid as i32);
        g.write_half_array(&EMPTY_CURVE[..]);
    }
}

// ─── Runtime Effects ──────────────────────────────────────────────────────────

/// Interns the program, writes its uniforms and opens its block.
pub fn begin_runtime_effect(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    instance: &RuntimeEffectInstance,
) -> SnippetId {
    let effect = instance.effect();
    let id = ctx.dict().find_or_create_runtime_effect_snippet(effect);

    if let Some(gatherer) = gatherer {
        let snippet = ctx.dict().snippet(id);
        let data = instance.uniform_data();
        gatherer.validated(&snippet.uniforms, |g| {
            for uniform in effect.uniforms() {
                let bytes = &data[uniform.offset..uniform.offset + uniform.cpu_size()];
                g.write_raw(uniform.ty, uniform.count, bytes);
            }
        });
    }

    builder.begin_block(id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorInfo;
    use crate::dictionary::ShaderCodeDictionary;
    use crate::settings::{ShadingSettings, UniformLayout};

    fn gatherer() -> PipelineDataGatherer {
        PipelineDataGatherer::new(ShadingSettings {
            uniform_layout: UniformLayout::Std140,
            validate_uniforms: true,
        })
    }

    #[test]
    fn singular_local_matrix_writes_identity() {
        let dict = ShaderCodeDictionary::new();
        let ctx = KeyContext::new(&dict, ColorInfo::default());
        let mut builder = PaintParamsKeyBuilder::new(&dict);
        let mut g = gatherer();

        begin_local_matrix(&ctx, &mut builder, Some(&mut g), &Mat4::ZERO);
        add_prior_output(&ctx, &mut builder, Some(&mut g));
        builder.end_block();
        builder.finish().unwrap();

        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&g.finish().uniforms);
        assert_eq!(&floats[..16], &Mat4::IDENTITY.to_cols_array());
    }

    #[test]
    fn dither_without_textures_is_pass_through() {
        let dict = ShaderCodeDictionary::new();
        let ctx = KeyContext::new(&dict, ColorInfo::default());
        let mut builder = PaintParamsKeyBuilder::new(&dict);
        let mut g = gatherer();

        add_dither(&ctx, &mut builder, Some(&mut g), 1.0 / 255.0);
        let key = builder.finish().unwrap();
        assert_eq!(key.as_slice(), &[BuiltInCodeSnippetId::PriorOutput as u32]);
        assert_eq!(g.texture_count(), 0);
    }

    #[test]
    fn color_space_block_fills_declared_layout() {
        let dict = ShaderCodeDictionary::new();
        let ctx = KeyContext::new(&dict, ColorInfo::default());
        let mut builder = PaintParamsKeyBuilder::new(&dict);
        let mut g = gatherer();

        let steps = ColorSpaceXformSteps::new(
            crate::color::ColorSpace::Srgb,
            crate::color::AlphaType::Premul,
            crate::color::ColorSpace::DisplayP3,
            crate::color::AlphaType::Premul,
        );
        add_color_space_xform(&ctx, &mut builder, Some(&mut g), &steps);
        assert!(builder.finish().is_ok());
        assert!(g.uniform_len() > 0);
    }
}
