//! Precompilation Config
//!
//! A declarative, serde-backed description of the paints to precompile. The
//! document mirrors the [`CombinationBuilder`] option API one-to-one.
//!
//! ```json
//! {
//!   "blend_modes": [
//!     { "mode": "SrcOver" },
//!     { "range": { "start": "Clear", "end": "Screen" } },
//!     { "group": "Advanced" }
//!   ],
//!   "shaders": [
//!     { "kind": "LinearGradient", "stops": [2, 12] },
//!     { "kind": "Image", "tile_modes": [{ "x": "Repeat", "y": "Clamp" }] },
//!     { "kind": "LocalMatrix", "children": [[{ "kind": "SolidColor" }]] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::blend::{BlendMode, BlendModeGroup};
use crate::combination::{CombinationBuilder, ShaderOption, ShaderOptionHandle, ShaderOptionKind};
use crate::effects::GradientType;
use crate::errors::Result;
use crate::texture::TileModePair;

/// One entry of the blend dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendChoiceConfig {
    Mode(BlendMode),
    Range { start: BlendMode, end: BlendMode },
    Group(BlendModeGroup),
}

/// Built-in shader kinds a config may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderKindConfig {
    SolidColor,
    LinearGradient,
    RadialGradient,
    SweepGradient,
    ConicalGradient,
    Image,
    LocalMatrix,
    CoordClamp,
    PerlinNoise,
    BlendShader,
}

impl From<ShaderKindConfig> for ShaderOptionKind {
    fn from(kind: ShaderKindConfig) -> Self {
        match kind {
            ShaderKindConfig::SolidColor => Self::SolidColor,
            ShaderKindConfig::LinearGradient => Self::Gradient(GradientType::Linear),
            ShaderKindConfig::RadialGradient => Self::Gradient(GradientType::Radial),
            ShaderKindConfig::SweepGradient => Self::Gradient(GradientType::Sweep),
            ShaderKindConfig::ConicalGradient => Self::Gradient(GradientType::Conical),
            ShaderKindConfig::Image => Self::Image,
            ShaderKindConfig::LocalMatrix => Self::LocalMatrix,
            ShaderKindConfig::CoordClamp => Self::CoordClamp,
            ShaderKindConfig::PerlinNoise => Self::PerlinNoise,
            ShaderKindConfig::BlendShader => Self::BlendShader,
        }
    }
}

/// One shader option and, per child slot, its alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderOptionConfig {
    pub kind: ShaderKindConfig,
    /// Inclusive `[min, max]` stop range for gradients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stops: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tile_modes: Vec<TileModePair>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blend_modes: Vec<BlendMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Vec<ShaderOptionConfig>>,
}

impl ShaderOptionConfig {
    fn to_option(&self) -> ShaderOption {
        let mut option = ShaderOption::new(self.kind.into())
            .with_tile_modes(&self.tile_modes)
            .with_blend_modes(&self.blend_modes);
        if let Some([min, max]) = self.stops {
            option = option.with_stop_range(min, max);
        }
        option
    }

    fn apply_children(&self, builder: &mut CombinationBuilder<'_>, handle: ShaderOptionHandle) -> Result<()> {
        for (slot, alternatives) in self.children.iter().enumerate() {
            for child in alternatives {
                let child_handle = builder.add_child_option(handle, slot, child.to_option())?;
                child.apply_children(builder, child_handle)?;
            }
        }
        Ok(())
    }
}

/// Complete precompilation document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecompileConfig {
    #[serde(default)]
    pub blend_modes: Vec<BlendChoiceConfig>,
    #[serde(default)]
    pub shaders: Vec<ShaderOptionConfig>,
}

impl PrecompileConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Adds every choice and option to `builder`. Stops at the first invalid
    /// option; earlier additions remain.
    pub fn apply(&self, builder: &mut CombinationBuilder<'_>) -> Result<()> {
        for choice in &self.blend_modes {
            match *choice {
                BlendChoiceConfig::Mode(mode) => builder.add_blend_mode(mode),
                BlendChoiceConfig::Range { start, end } => builder.add_blend_mode_range(start, end),
                BlendChoiceConfig::Group(group) => builder.add_blend_mode_group(group),
            }
        }
        for shader in &self.shaders {
            let handle = builder.add_option(shader.to_option())?;
            shader.apply_children(builder, handle)?;
        }
        log::debug!(
            "Applied precompile config: {} blend choice(s), {} shader option(s)",
            self.blend_modes.len(),
            self.shaders.len()
        );
        Ok(())
    }
}
