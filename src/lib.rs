//! # Myth Shading
//!
//! Pipeline keys, uniform gathering and precompilation for paint shading
//! graphs.
//!
//! A paint (color source, color filters, blending) is lowered into a tree of
//! code-snippet *blocks*. The tree is serialized into a [`PaintParamsKey`]
//! and interned by the [`ShaderCodeDictionary`] into a small
//! [`UniquePaintParamsId`] usable as a pipeline-cache key. Alongside the key,
//! a [`PipelineDataGatherer`] collects the uniform bytes and texture
//! bindings the pipeline needs, in the same order.
//!
//! The [`CombinationBuilder`] describes whole families of paints and
//! enumerates their IDs without gathering data, for ahead-of-time pipeline
//! compilation.
//!
//! ```rust,ignore
//! use myth_shading::*;
//!
//! let dict = ShaderCodeDictionary::new();
//! let ctx = KeyContext::new(&dict, ColorInfo::default());
//! let paint = PaintParams::new().with_color(Color4f::WHITE).with_dither(true);
//! let (id, data) = build_paint(&ctx, ShadingSettings::default(), &paint)?;
//! ```

pub mod blend;
pub mod color;
pub mod combination;
pub mod dictionary;
pub mod effects;
pub mod emit;
pub mod errors;
pub mod gatherer;
pub mod key;
pub mod precompile;
pub mod runtime_effect;
pub mod settings;
pub mod texture;
pub mod uniform;

pub use blend::{BlendMode, BlendModeGroup};
pub use color::{AlphaType, Color4f, ColorInfo, ColorSpace, PmColor4f};
pub use combination::{CombinationBuilder, ShaderOption, ShaderOptionHandle, ShaderOptionKind};
pub use dictionary::{BuiltInCodeSnippetId, ShaderCodeDictionary, ShaderSnippet, SnippetId, UniquePaintParamsId};
pub use effects::{
    Blender, ColorFilter, DstRead, GradientGeometry, GradientShader, GradientType, ImageShader, PaintParams,
    PerlinNoiseShader, RuntimeChild, RuntimeEffectInstance, Shader,
};
pub use emit::{KeyContext, add_paint_to_key, build_paint};
pub use errors::{Result, ShadingError};
pub use gatherer::{PipelineData, PipelineDataGatherer, TextureBinding};
pub use key::{Block, PaintParamsKey, PaintParamsKeyBuilder};
pub use precompile::PrecompileConfig;
pub use runtime_effect::{ChildType, RuntimeEffect, RuntimeEffectKind};
pub use settings::{ShadingSettings, UniformLayout};
pub use texture::{Bitmap, SamplingOptions, TextureCache, TextureProvider, TextureProxy, TileMode, TileModePair};
pub use uniform::{SlType, Uniform};
