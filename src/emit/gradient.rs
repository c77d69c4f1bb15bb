//! Gradient stop storage and snippet selection.
//!
//! Up to four stops use the `*Gradient4` snippets, up to eight the
//! `*Gradient8` snippets; both keep colors and offsets inline in the
//! uniforms. Larger gradients are stored in a two-row `RgbaF16` texture
//! (row 0 colors, row 1 offsets) read by the `*GradientTexture` snippets.

use glam::{Vec2, Vec4};
use half::f16;

use crate::color::PmColor4f;
use crate::dictionary::{BuiltInCodeSnippetId, NUM_INTERNAL_STORAGE_STOPS};
use crate::effects::{GradientGeometry, GradientShader, GradientType, Interpolation};
use crate::gatherer::PipelineDataGatherer;
use crate::key::PaintParamsKeyBuilder;
use crate::texture::{Bitmap, BitmapFormat, SamplingOptions, TileMode, TileModePair};

use super::KeyContext;
use super::blocks::{add_solid_color, begin_built_in};

/// The snippet drawing a `kind` gradient with `num_stops` stops.
#[must_use]
pub const fn gradient_snippet_id(kind: GradientType, num_stops: usize) -> BuiltInCodeSnippetId {
    use BuiltInCodeSnippetId as B;

    let bucket = if num_stops <= 4 {
        0
    } else if num_stops <= NUM_INTERNAL_STORAGE_STOPS {
        1
    } else {
        2
    };
    match (kind, bucket) {
        (GradientType::Linear, 0) => B::LinearGradientShader4,
        (GradientType::Linear, 1) => B::LinearGradientShader8,
        (GradientType::Linear, _) => B::LinearGradientShaderTexture,
        (GradientType::Radial, 0) => B::RadialGradientShader4,
        (GradientType::Radial, 1) => B::RadialGradientShader8,
        (GradientType::Radial, _) => B::RadialGradientShaderTexture,
        (GradientType::Sweep, 0) => B::SweepGradientShader4,
        (GradientType::Sweep, 1) => B::SweepGradientShader8,
        (GradientType::Sweep, _) => B::SweepGradientShaderTexture,
        (GradientType::Conical, 0) => B::ConicalGradientShader4,
        (GradientType::Conical, 1) => B::ConicalGradientShader8,
        (GradientType::Conical, _) => B::ConicalGradientShaderTexture,
    }
}

/// Resolved uniform data of one gradient.
#[derive(Debug, Clone)]
pub struct GradientData {
    geometry: GradientGeometry,
    num_stops: usize,
    /// Padded to the snippet's inline capacity by repeating the last stop.
    colors: [Vec4; NUM_INTERNAL_STORAGE_STOPS],
    offsets: [f32; NUM_INTERNAL_STORAGE_STOPS],
    /// Set for texture-backed gradients.
    lut: Option<Bitmap>,
    tile_mode: TileMode,
    interpolation: Interpolation,
}

impl GradientData {
    /// Resolves `shader`'s stops. `shader` must have at least one color.
    #[must_use]
    pub fn new(shader: &GradientShader) -> Self {
        let n = shader.colors.len();
        debug_assert!(n > 0, "gradient without stops");

        let offset = |i: usize| match &shader.offsets {
            Some(offsets) => offsets.get(i).copied().unwrap_or(1.0),
            None if n > 1 => i as f32 / (n - 1) as f32,
            None => 0.0,
        };
        let in_premul = shader.interpolation.in_premul;
        let color = |i: usize| {
            let c = shader.colors[i];
            if in_premul {
                c.premul().to_vec4()
            } else {
                Vec4::new(c.r, c.g, c.b, c.a)
            }
        };

        let mut data = Self::structure_only(shader.geometry.kind(), n);
        data.geometry = shader.geometry;
        data.tile_mode = shader.tile_mode;
        data.interpolation = shader.interpolation;

        if n <= NUM_INTERNAL_STORAGE_STOPS {
            for i in 0..NUM_INTERNAL_STORAGE_STOPS {
                let src = i.min(n.saturating_sub(1));
                data.colors[i] = color(src);
                data.offsets[i] = offset(src);
            }
        } else {
            let mut pixels = Vec::with_capacity(n * 2 * 8);
            let texel = |pixels: &mut Vec<u8>, v: Vec4| {
                for c in v.to_array() {
                    pixels.extend_from_slice(&f16::from_f32(c).to_le_bytes());
                }
            };
            for i in 0..n {
                texel(&mut pixels, color(i));
            }
            for i in 0..n {
                texel(&mut pixels, Vec4::new(offset(i), 0.0, 0.0, 0.0));
            }
            data.lut = Bitmap::new(n as u32, 2, BitmapFormat::RgbaF16, pixels);
        }
        data
    }

    /// Zeroed data carrying only what selects the snippet.
    #[must_use]
    pub fn structure_only(kind: GradientType, num_stops: usize) -> Self {
        Self {
            geometry: nominal_geometry(kind),
            num_stops,
            colors: [Vec4::ZERO; NUM_INTERNAL_STORAGE_STOPS],
            offsets: [0.0; NUM_INTERNAL_STORAGE_STOPS],
            lut: None,
            tile_mode: TileMode::Clamp,
            interpolation: Interpolation::default(),
        }
    }

    #[must_use]
    pub fn num_stops(&self) -> usize {
        self.num_stops
    }

    #[must_use]
    pub fn snippet_id(&self) -> BuiltInCodeSnippetId {
        gradient_snippet_id(self.geometry.kind(), self.num_stops)
    }

    #[must_use]
    pub fn colors(&self) -> &[Vec4] {
        &self.colors
    }

    #[must_use]
    pub fn offsets(&self) -> &[f32] {
        &self.offsets
    }

    fn write_uniforms(&self, g: &mut PipelineDataGatherer) {
        // Preamble
        if self.num_stops <= 4 {
            g.write_array(&self.colors[..4]);
            g.write(Vec4::from_slice(&self.offsets[..4]));
        } else if self.num_stops <= NUM_INTERNAL_STORAGE_STOPS {
            g.write_array(&self.colors[..]);
            g.write_array(&[
                Vec4::from_slice(&self.offsets[..4]),
                Vec4::from_slice(&self.offsets[4..]),
            ]);
        }

        match self.geometry {
            GradientGeometry::Linear { start, end } => {
                g.write(start);
                g.write(end);
            }
            GradientGeometry::Radial { center, radius } => {
                g.write(center);
                g.write(radius);
            }
            GradientGeometry::Sweep { center, bias, scale } => {
                g.write(center);
                g.write(bias);
                g.write(scale);
            }
            GradientGeometry::Conical {
                start,
                end,
                start_radius,
                end_radius,
            } => {
                g.write(start);
                g.write(end);
                g.write(start_radius);
                g.write(end_radius);
            }
        }

        // Postamble
        if self.num_stops > NUM_INTERNAL_STORAGE_STOPS {
            g.write(self.num_stops as i32);
        }
        g.write(self.tile_mode as i32);
        g.write(self.interpolation.color_space as i32);
        g.write(i32::from(self.interpolation.in_premul));
    }
}

/// Emits a gradient block. Texture-backed gradients whose texture cannot be
/// created draw the error color.
pub fn add_gradient(
    ctx: &KeyContext<'_>,
    builder: &mut PaintParamsKeyBuilder<'_>,
    gatherer: Option<&mut PipelineDataGatherer>,
    data: &GradientData,
) {
    let id = data.snippet_id();
    let Some(gatherer) = gatherer else {
        builder.add_block(id);
        return;
    };

    if data.num_stops > NUM_INTERNAL_STORAGE_STOPS {
        let proxy = data
            .lut
            .as_ref()
            .and_then(|lut| ctx.find_or_create_cached(lut, "GradientColorsAndOffsets"));
        let Some(proxy) = proxy else {
            log::warn!("Couldn't create GradientShader's color and offset texture");
            add_solid_color(ctx, builder, Some(gatherer), PmColor4f::ERROR);
            return;
        };
        gatherer.add(&SamplingOptions::NEAREST, TileModePair::CLAMP, proxy);
    }

    begin_built_in(ctx, builder, Some(gatherer), id, |g| data.write_uniforms(g));
    builder.end_block();
}

fn nominal_geometry(kind: GradientType) -> GradientGeometry {
    match kind {
        GradientType::Linear => GradientGeometry::Linear {
            start: Vec2::ZERO,
            end: Vec2::X,
        },
        GradientType::Radial => GradientGeometry::Radial {
            center: Vec2::ZERO,
            radius: 1.0,
        },
        GradientType::Sweep => GradientGeometry::Sweep {
            center: Vec2::ZERO,
            bias: 0.0,
            scale: 1.0,
        },
        GradientType::Conical => GradientGeometry::Conical {
            start: Vec2::ZERO,
            end: Vec2::X,
            start_radius: 0.0,
            end_radius: 1.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color4f;

    fn shader(n: usize) -> GradientShader {
        let colors = (0..n).map(|i| Color4f::new(i as f32, 0.0, 0.0, 1.0)).collect();
        GradientShader::new(nominal_geometry(GradientType::Linear), colors)
    }

    #[test]
    fn stop_count_boundaries_select_storage() {
        use BuiltInCodeSnippetId as B;
        let kind = GradientType::Linear;
        assert_eq!(gradient_snippet_id(kind, 4), B::LinearGradientShader4);
        assert_eq!(gradient_snippet_id(kind, 5), B::LinearGradientShader8);
        assert_eq!(gradient_snippet_id(kind, 8), B::LinearGradientShader8);
        assert_eq!(gradient_snippet_id(kind, 9), B::LinearGradientShaderTexture);
    }

    #[test]
    fn inline_storage_repeats_last_stop() {
        let data = GradientData::new(&shader(3));
        assert_eq!(data.offsets()[..3], [0.0, 0.5, 1.0]);
        for i in 3..NUM_INTERNAL_STORAGE_STOPS {
            assert_eq!(data.colors()[i], data.colors()[2]);
            assert_eq!(data.offsets()[i], 1.0);
        }
    }

    #[test]
    fn large_gradients_build_a_lut() {
        let data = GradientData::new(&shader(12));
        let lut = data.lut.as_ref().unwrap();
        assert_eq!((lut.width(), lut.height()), (12, 2));
        assert_eq!(lut.format(), BitmapFormat::RgbaF16);
    }

    #[test]
    fn single_stop_has_zero_offset() {
        let data = GradientData::new(&shader(1));
        assert!(data.offsets().iter().all(|&o| o == 0.0));
    }
}
