//! Shader Code Dictionary
//!
//! Interning table for code snippets and paint keys.
//!
//! # Snippet IDs
//!
//! Built-in snippets occupy the fixed range `0..BuiltInCodeSnippetId::COUNT`;
//! their IDs never change. Runtime-authored programs are registered lazily
//! and receive IDs after the built-in range. Two programs with the same
//! source text and uniform/child layout share one ID.
//!
//! # Paint IDs
//!
//! [`ShaderCodeDictionary::find_or_create`] interns a complete
//! [`PaintParamsKey`] and returns its [`UniquePaintParamsId`], the cache key
//! handed to the pipeline cache.
//!
//! # Concurrency
//!
//! Both tables are read-mostly. Lookups take a shared lock; registration
//! re-checks under the exclusive lock so that racing callers all observe the
//! single winning ID. All mappings are append-only.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::key::PaintParamsKey;
use crate::runtime_effect::RuntimeEffect;
use crate::uniform::{SlType, Uniform};

// ─── IDs ──────────────────────────────────────────────────────────────────────

/// Identifier of a code snippet (built-in or runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnippetId(pub(crate) u32);

impl SnippetId {
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn is_built_in(self) -> bool {
        (self.0 as usize) < BuiltInCodeSnippetId::COUNT
    }
}

impl From<BuiltInCodeSnippetId> for SnippetId {
    #[inline]
    fn from(id: BuiltInCodeSnippetId) -> Self {
        Self(id as u32)
    }
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical ID of a complete paint key. `0` is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniquePaintParamsId(u32);

impl UniquePaintParamsId {
    pub const INVALID: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

// ─── Built-in Snippets ────────────────────────────────────────────────────────

/// The fixed catalogue of built-in code snippets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum BuiltInCodeSnippetId {
    Error,
    PriorOutput,

    // Shaders
    SolidColorShader,
    LinearGradientShader4,
    LinearGradientShader8,
    LinearGradientShaderTexture,
    RadialGradientShader4,
    RadialGradientShader8,
    RadialGradientShaderTexture,
    SweepGradientShader4,
    SweepGradientShader8,
    SweepGradientShaderTexture,
    ConicalGradientShader4,
    ConicalGradientShader8,
    ConicalGradientShaderTexture,
    LocalMatrixShader,
    ImageShader,
    CoordClampShader,
    DitherShader,
    PerlinNoiseShader,
    BlendShader,

    // Blenders
    BlendModeBlender,
    CoeffBlender,

    // Blend inputs
    DstColor,
    PrimitiveColor,
    DstReadSample,
    DstReadFetch,

    // Color filters
    ColorFilterShader,
    MatrixColorFilter,
    ComposeColorFilter,
    GaussianColorFilter,
    TableColorFilter,
    ColorSpaceXformColorFilter,
}

impl BuiltInCodeSnippetId {
    pub const LAST: Self = Self::ColorSpaceXformColorFilter;
    pub const COUNT: usize = Self::LAST as usize + 1;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Error,
        Self::PriorOutput,
        Self::SolidColorShader,
        Self::LinearGradientShader4,
        Self::LinearGradientShader8,
        Self::LinearGradientShaderTexture,
        Self::RadialGradientShader4,
        Self::RadialGradientShader8,
        Self::RadialGradientShaderTexture,
        Self::SweepGradientShader4,
        Self::SweepGradientShader8,
        Self::SweepGradientShaderTexture,
        Self::ConicalGradientShader4,
        Self::ConicalGradientShader8,
        Self::ConicalGradientShaderTexture,
        Self::LocalMatrixShader,
        Self::ImageShader,
        Self::CoordClampShader,
        Self::DitherShader,
        Self::PerlinNoiseShader,
        Self::BlendShader,
        Self::BlendModeBlender,
        Self::CoeffBlender,
        Self::DstColor,
        Self::PrimitiveColor,
        Self::DstReadSample,
        Self::DstReadFetch,
        Self::ColorFilterShader,
        Self::MatrixColorFilter,
        Self::ComposeColorFilter,
        Self::GaussianColorFilter,
        Self::TableColorFilter,
        Self::ColorSpaceXformColorFilter,
    ];

    #[inline]
    #[must_use]
    pub fn id(self) -> SnippetId {
        self.into()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::PriorOutput => "PriorOutput",
            Self::SolidColorShader => "SolidColor",
            Self::LinearGradientShader4 => "LinearGradient4",
            Self::LinearGradientShader8 => "LinearGradient8",
            Self::LinearGradientShaderTexture => "LinearGradientTexture",
            Self::RadialGradientShader4 => "RadialGradient4",
            Self::RadialGradientShader8 => "RadialGradient8",
            Self::RadialGradientShaderTexture => "RadialGradientTexture",
            Self::SweepGradientShader4 => "SweepGradient4",
            Self::SweepGradientShader8 => "SweepGradient8",
            Self::SweepGradientShaderTexture => "SweepGradientTexture",
            Self::ConicalGradientShader4 => "ConicalGradient4",
            Self::ConicalGradientShader8 => "ConicalGradient8",
            Self::ConicalGradientShaderTexture => "ConicalGradientTexture",
            Self::LocalMatrixShader => "LocalMatrixShader",
            Self::ImageShader => "ImageShader",
            Self::CoordClampShader => "CoordClampShader",
            Self::DitherShader => "Dither",
            Self::PerlinNoiseShader => "PerlinNoiseShader",
            Self::BlendShader => "BlendShader",
            Self::BlendModeBlender => "BlendModeBlender",
            Self::CoeffBlender => "CoeffBlender",
            Self::DstColor => "DstColor",
            Self::PrimitiveColor => "PrimitiveColor",
            Self::DstReadSample => "DstReadSample",
            Self::DstReadFetch => "DstReadFetch",
            Self::ColorFilterShader => "ColorFilterShader",
            Self::MatrixColorFilter => "MatrixColorFilter",
            Self::ComposeColorFilter => "ComposeColorFilter",
            Self::GaussianColorFilter => "GaussianColorFilter",
            Self::TableColorFilter => "TableColorFilter",
            Self::ColorSpaceXformColorFilter => "ColorSpaceTransform",
        }
    }

    #[must_use]
    pub const fn num_children(self) -> usize {
        match self {
            Self::LocalMatrixShader | Self::CoordClampShader => 1,
            Self::ColorFilterShader | Self::ComposeColorFilter => 2,
            Self::BlendShader => 3,
            _ => 0,
        }
    }

    /// Number of texture/sampler bindings the snippet consumes.
    #[must_use]
    pub const fn num_textures(self) -> usize {
        match self {
            Self::LinearGradientShaderTexture
            | Self::RadialGradientShaderTexture
            | Self::SweepGradientShaderTexture
            | Self::ConicalGradientShaderTexture
            | Self::ImageShader
            | Self::DitherShader
            | Self::DstReadSample
            | Self::TableColorFilter => 1,
            Self::PerlinNoiseShader => 2,
            _ => 0,
        }
    }

    #[must_use]
    pub fn uniforms(self) -> Vec<Uniform> {
        use SlType::{Float, Float2, Float4, Float4x4, Half, Half4, Int};

        match self {
            Self::SolidColorShader => vec![Uniform::new("color", Float4)],
            Self::LinearGradientShader4 | Self::LinearGradientShader8 | Self::LinearGradientShaderTexture => {
                gradient_uniforms(self, &[("point0", Float2), ("point1", Float2)])
            }
            Self::RadialGradientShader4 | Self::RadialGradientShader8 | Self::RadialGradientShaderTexture => {
                gradient_uniforms(self, &[("center", Float2), ("radius", Float)])
            }
            Self::SweepGradientShader4 | Self::SweepGradientShader8 | Self::SweepGradientShaderTexture => {
                gradient_uniforms(self, &[("center", Float2), ("bias", Float), ("scale", Float)])
            }
            Self::ConicalGradientShader4 | Self::ConicalGradientShader8 | Self::ConicalGradientShaderTexture => {
                gradient_uniforms(
                    self,
                    &[("point0", Float2), ("point1", Float2), ("radius0", Float), ("radius1", Float)],
                )
            }
            Self::LocalMatrixShader => vec![Uniform::new("localMatrix", Float4x4)],
            Self::ImageShader => {
                let mut uniforms = vec![
                    Uniform::new("imgSize", Float2),
                    Uniform::new("subset", Float4),
                    Uniform::new("tilemodeX", Int),
                    Uniform::new("tilemodeY", Int),
                    Uniform::new("filterMode", Int),
                    Uniform::new("useCubic", Int),
                    Uniform::new("cubicCoeffs", SlType::Half4x4),
                    Uniform::new("readSwizzle", Int),
                ];
                uniforms.extend(color_space_uniforms());
                uniforms
            }
            Self::CoordClampShader => vec![Uniform::new("subset", Float4)],
            Self::DitherShader => vec![Uniform::new("range", Half)],
            Self::PerlinNoiseShader => vec![
                Uniform::new("baseFrequency", Float2),
                Uniform::new("stitchData", Float2),
                Uniform::new("noiseType", Int),
                Uniform::new("numOctaves", Int),
                Uniform::new("stitching", Int),
            ],
            Self::BlendModeBlender => vec![Uniform::new("blendMode", Int)],
            Self::CoeffBlender => vec![Uniform::new("coeffs", Half4)],
            Self::DstReadSample => vec![Uniform::new("dstTextureCoords", Float4)],
            Self::MatrixColorFilter => vec![
                Uniform::new("matrix", Float4x4),
                Uniform::new("translate", Float4),
                Uniform::new("inHSLA", Int),
            ],
            Self::ColorSpaceXformColorFilter => color_space_uniforms(),
            Self::Error
            | Self::PriorOutput
            | Self::BlendShader
            | Self::DstColor
            | Self::PrimitiveColor
            | Self::DstReadFetch
            | Self::ColorFilterShader
            | Self::ComposeColorFilter
            | Self::GaussianColorFilter
            | Self::TableColorFilter => Vec::new(),
        }
    }
}

/// Maximum stop count stored inline in gradient uniforms.
pub const NUM_INTERNAL_STORAGE_STOPS: usize = 8;

/// `colors`/`offsets` preamble, geometry, then the shared postamble.
fn gradient_uniforms(id: BuiltInCodeSnippetId, geometry: &[(&'static str, SlType)]) -> Vec<Uniform> {
    use BuiltInCodeSnippetId as B;

    let mut uniforms = Vec::with_capacity(geometry.len() + 6);
    match id {
        B::LinearGradientShader4 | B::RadialGradientShader4 | B::SweepGradientShader4 | B::ConicalGradientShader4 => {
            uniforms.push(Uniform::array("colors", SlType::Float4, 4));
            uniforms.push(Uniform::new("offsets", SlType::Float4));
        }
        B::LinearGradientShader8 | B::RadialGradientShader8 | B::SweepGradientShader8 | B::ConicalGradientShader8 => {
            uniforms.push(Uniform::array("colors", SlType::Float4, 8));
            uniforms.push(Uniform::array("offsets", SlType::Float4, 2));
        }
        _ => {}
    }
    uniforms.extend(geometry.iter().map(|&(name, ty)| Uniform::new(name, ty)));
    if id.num_textures() > 0 {
        uniforms.push(Uniform::new("numStops", SlType::Int));
    }
    uniforms.push(Uniform::new("tilemode", SlType::Int));
    uniforms.push(Uniform::new("colorSpace", SlType::Int));
    uniforms.push(Uniform::new("doUnPremul", SlType::Int));
    uniforms
}

fn color_space_uniforms() -> Vec<Uniform> {
    vec![
        Uniform::new("csXformFlags", SlType::Int),
        Uniform::new("csXformSrcKind", SlType::Int),
        Uniform::array("csXformSrcCoeffs", SlType::Half, 7),
        Uniform::new("csXformGamutTransform", SlType::Half3x3),
        Uniform::new("csXformDstKind", SlType::Int),
        Uniform::array("csXformDstCoeffs", SlType::Half, 7),
    ]
}

// ─── Snippet Descriptor ───────────────────────────────────────────────────────

/// Immutable description of one code snippet.
#[derive(Debug)]
pub struct ShaderSnippet {
    pub id: SnippetId,
    pub name: Cow<'static, str>,
    pub uniforms: Arc<[Uniform]>,
    pub num_children: usize,
    pub num_textures: usize,
    /// Set for runtime snippets.
    pub runtime_effect: Option<Arc<RuntimeEffect>>,
}

impl ShaderSnippet {
    fn built_in(id: BuiltInCodeSnippetId) -> Self {
        Self {
            id: id.id(),
            name: Cow::Borrowed(id.name()),
            uniforms: id.uniforms().into(),
            num_children: id.num_children(),
            num_textures: id.num_textures(),
            runtime_effect: None,
        }
    }

    #[must_use]
    pub fn is_runtime(&self) -> bool {
        self.runtime_effect.is_some()
    }

    /// WGSL struct declaring this snippet's uniforms.
    #[must_use]
    pub fn uniform_struct_wgsl(&self, struct_name: &str) -> String {
        let mut code = format!("struct {struct_name} {{\n");
        for uniform in self.uniforms.iter() {
            code.push_str("    ");
            code.push_str(&uniform.wgsl_member());
            code.push_str(",\n");
        }
        code.push_str("};\n");
        code
    }
}

// ─── Dictionary ───────────────────────────────────────────────────────────────

/// Hashes by the program's structural hash, compares structurally.
#[derive(Debug, Clone)]
struct RuntimeEffectKey(Arc<RuntimeEffect>);

impl PartialEq for RuntimeEffectKey {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl Eq for RuntimeEffectKey {}

impl Hash for RuntimeEffectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.structural_hash().hash(state);
    }
}

#[derive(Debug, Default)]
struct RuntimeSnippets {
    entries: Vec<Arc<ShaderSnippet>>,
    lookup: FxHashMap<RuntimeEffectKey, SnippetId>,
}

#[derive(Debug, Default)]
struct PaintKeyTable {
    keys: Vec<PaintParamsKey>,
    lookup: FxHashMap<PaintParamsKey, UniquePaintParamsId>,
}

/// Central snippet and paint-key interning table.
///
/// Shared across build contexts (`&self` API, internally synchronized).
#[derive(Debug)]
pub struct ShaderCodeDictionary {
    built_in: Vec<Arc<ShaderSnippet>>,
    runtime: RwLock<RuntimeSnippets>,
    paint_keys: RwLock<PaintKeyTable>,
}

impl Default for ShaderCodeDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCodeDictionary {
    #[must_use]
    pub fn new() -> Self {
        let built_in = BuiltInCodeSnippetId::ALL
            .iter()
            .map(|&id| Arc::new(ShaderSnippet::built_in(id)))
            .collect();
        Self {
            built_in,
            runtime: RwLock::new(RuntimeSnippets::default()),
            paint_keys: RwLock::new(PaintKeyTable::default()),
        }
    }

    // ── Snippets ─────────────────────────────────────────────────────────────

    /// ID of a built-in snippet. O(1), total.
    #[inline]
    #[must_use]
    pub fn built_in_id(&self, id: BuiltInCodeSnippetId) -> SnippetId {
        id.id()
    }

    /// Interns a runtime program, returning the existing ID for a
    /// structurally equal program.
    pub fn find_or_create_runtime_effect_snippet(&self, effect: &Arc<RuntimeEffect>) -> SnippetId {
        let key = RuntimeEffectKey(Arc::clone(effect));
        if let Some(&id) = self.runtime.read().lookup.get(&key) {
            return id;
        }

        let mut runtime = self.runtime.write();
        // Another caller may have registered it between the two locks.
        if let Some(&id) = runtime.lookup.get(&key) {
            return id;
        }

        let id = SnippetId((BuiltInCodeSnippetId::COUNT + runtime.entries.len()) as u32);
        let snippet = ShaderSnippet {
            id,
            name: Cow::Owned(effect.name().to_owned()),
            uniforms: effect.snippet_uniforms().into(),
            num_children: effect.children().len(),
            num_textures: 0,
            runtime_effect: Some(Arc::clone(effect)),
        };
        log::debug!(
            "Registered runtime snippet '{}' as {id} ({} uniform(s), {} child slot(s))",
            effect.name(),
            effect.uniforms().len(),
            effect.children().len()
        );
        runtime.entries.push(Arc::new(snippet));
        runtime.lookup.insert(key, id);
        id
    }

    #[must_use]
    pub fn is_valid_id(&self, id: SnippetId) -> bool {
        id.is_built_in()
            || (id.0 as usize - BuiltInCodeSnippetId::COUNT) < self.runtime.read().entries.len()
    }

    /// Snippet descriptor, or `None` for an ID that was never registered.
    #[must_use]
    pub fn get_entry(&self, id: SnippetId) -> Option<Arc<ShaderSnippet>> {
        let index = id.0 as usize;
        if index < BuiltInCodeSnippetId::COUNT {
            return Some(Arc::clone(&self.built_in[index]));
        }
        self.runtime
            .read()
            .entries
            .get(index - BuiltInCodeSnippetId::COUNT)
            .cloned()
    }

    /// Snippet descriptor. **Panics** if the ID was never registered.
    #[must_use]
    pub fn snippet(&self, id: SnippetId) -> Arc<ShaderSnippet> {
        self.get_entry(id)
            .unwrap_or_else(|| panic!("Unknown code snippet ID {id}"))
    }

    /// Built-in snippet descriptor, lock-free.
    #[inline]
    #[must_use]
    pub fn built_in_snippet(&self, id: BuiltInCodeSnippetId) -> &ShaderSnippet {
        &self.built_in[id as usize]
    }

    /// Declared uniform slots of a snippet. **Panics** on unknown IDs.
    #[must_use]
    pub fn uniforms(&self, id: SnippetId) -> Arc<[Uniform]> {
        Arc::clone(&self.snippet(id).uniforms)
    }

    #[must_use]
    pub fn num_runtime_snippets(&self) -> usize {
        self.runtime.read().entries.len()
    }

    // ── Paint Keys ───────────────────────────────────────────────────────────

    /// Interns a finished paint key. Equal keys always map to the same ID.
    pub fn find_or_create(&self, key: &PaintParamsKey) -> UniquePaintParamsId {
        if let Some(&id) = self.paint_keys.read().lookup.get(key) {
            return id;
        }

        let mut table = self.paint_keys.write();
        if let Some(&id) = table.lookup.get(key) {
            return id;
        }

        table.keys.push(key.clone());
        let id = UniquePaintParamsId(table.keys.len() as u32);
        table.lookup.insert(key.clone(), id);
        log::debug!("Interned paint key #{} ({} word(s))", id.0, key.len());
        id
    }

    /// The key an ID was interned from.
    #[must_use]
    pub fn lookup(&self, id: UniquePaintParamsId) -> Option<PaintParamsKey> {
        if !id.is_valid() {
            return None;
        }
        self.paint_keys.read().keys.get(id.0 as usize - 1).cloned()
    }

    #[must_use]
    pub fn num_paint_keys(&self) -> usize {
        self.paint_keys.read().keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_effect::{ChildType, RuntimeEffectKind};

    #[test]
    fn built_in_ids_match_catalogue_order() {
        let dict = ShaderCodeDictionary::new();
        for (i, id) in BuiltInCodeSnippetId::ALL.iter().enumerate() {
            assert_eq!(dict.built_in_id(*id).as_u32() as usize, i);
            assert_eq!(dict.snippet(id.id()).name, id.name());
        }
    }

    #[test]
    fn gradient_layouts_differ_by_storage() {
        let four = BuiltInCodeSnippetId::LinearGradientShader4.uniforms();
        let eight = BuiltInCodeSnippetId::LinearGradientShader8.uniforms();
        let tex = BuiltInCodeSnippetId::LinearGradientShaderTexture.uniforms();
        assert_eq!(four[0].count, 4);
        assert_eq!(eight[0].count, 8);
        assert_eq!(eight[1].count, 2);
        assert!(tex.iter().any(|u| u.name == "numStops"));
        assert!(!four.iter().any(|u| u.name == "numStops"));
    }

    #[test]
    fn runtime_snippets_follow_built_ins() {
        let dict = ShaderCodeDictionary::new();
        let effect = RuntimeEffect::builder(RuntimeEffectKind::Shader, "a")
            .child(ChildType::Shader)
            .build();
        let id = dict.find_or_create_runtime_effect_snippet(&effect);
        assert_eq!(id.as_u32() as usize, BuiltInCodeSnippetId::COUNT);
        assert!(!id.is_built_in());
        assert_eq!(dict.snippet(id).num_children, 1);
        assert!(dict.snippet(id).is_runtime());
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let dict = ShaderCodeDictionary::new();
        let bogus = SnippetId(BuiltInCodeSnippetId::COUNT as u32 + 7);
        assert!(dict.get_entry(bogus).is_none());
        assert!(!dict.is_valid_id(bogus));
    }

    #[test]
    #[should_panic(expected = "Unknown code snippet ID")]
    fn snippet_panics_on_unknown_id() {
        let dict = ShaderCodeDictionary::new();
        let _ = dict.snippet(SnippetId(9999));
    }

    #[test]
    fn uniform_struct_lists_members() {
        let dict = ShaderCodeDictionary::new();
        let wgsl = dict
            .built_in_snippet(BuiltInCodeSnippetId::SolidColorShader)
            .uniform_struct_wgsl("SolidColor");
        assert!(wgsl.contains("color: vec4<f32>"));
    }
}
