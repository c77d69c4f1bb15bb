//! Combination Builder
//!
//! Describes a *space* of paints for ahead-of-time pipeline compilation and
//! enumerates it.
//!
//! # Model
//!
//! A combination is one blend choice paired with one shader configuration.
//! Shader options live in a [`SlotMap`] arena and are addressed through
//! [`ShaderOptionHandle`]s; child-bearing options (local matrix, coord
//! clamp, blend shaders, runtime shaders) own one list of alternative
//! options per child slot.
//!
//! ```text
//! total = blend_choices × Σ top-level options
//! option = own parameter choices × Π over slots (Σ alternatives in slot)
//! ```
//!
//! Empty dimensions count once and use a default: `SrcOver` for the blend
//! set, `SolidColor` for the shader list and for empty slots of built-in
//! composites. Empty slots of runtime shaders and runtime blenders emit
//! `PriorOutput`, the same block an unbound child of a concrete runtime
//! effect produces.
//!
//! Counts are computed with checked arithmetic; a tree whose count does not
//! fit in a `u64` is rejected with [`ShadingError::TooManyCombinations`].
//!
//! # Runtime Effects
//!
//! Runtime shader options must name a [`RuntimeEffectKind::Shader`] program
//! and runtime blend choices a [`RuntimeEffectKind::Blender`] program. Only
//! slots declared as [`ChildType::Shader`] accept child options; the other
//! slots always emit `PriorOutput`.
//!
//! # Handles
//!
//! [`CombinationBuilder::reset`] clears the arena and bumps an epoch. Every
//! handle carries the epoch it was created in, so a handle that outlives a
//! reset is rejected with [`ShadingError::StaleOption`].

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::ops::RangeInclusive;

use glam::{Mat4, Vec4};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::blend::{BlendMode, BlendModeGroup};
use crate::color::{ColorInfo, PmColor4f};
use crate::dictionary::{BuiltInCodeSnippetId, NUM_INTERNAL_STORAGE_STOPS, ShaderCodeDictionary, SnippetId, UniquePaintParamsId};
use crate::effects::GradientType;
use crate::emit::KeyContext;
use crate::emit::blenders::add_blend_mode_to_key;
use crate::emit::blocks;
use crate::emit::gradient::{GradientData, add_gradient};
use crate::errors::{Result, ShadingError};
use crate::key::PaintParamsKeyBuilder;
use crate::runtime_effect::{ChildType, RuntimeEffectKind};
use crate::texture::TileModePair;

new_key_type! {
    struct OptionKey;
}

/// Generation-tagged reference to an option in a [`CombinationBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderOptionHandle {
    key: OptionKey,
    epoch: u32,
}

// ─── Option Description ───────────────────────────────────────────────────────

/// Shader kinds that can take part in precompilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderOptionKind {
    SolidColor,
    Gradient(GradientType),
    Image,
    /// One child slot.
    LocalMatrix,
    /// One child slot.
    CoordClamp,
    PerlinNoise,
    /// Two child slots (`src`, `dst`) plus a blend-mode list.
    BlendShader,
    /// A registered runtime shader; one slot per declared child.
    Runtime(SnippetId),
}

impl ShaderOptionKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SolidColor => "SolidColor",
            Self::Gradient(kind) => kind.name(),
            Self::Image => "Image",
            Self::LocalMatrix => "LocalMatrix",
            Self::CoordClamp => "CoordClamp",
            Self::PerlinNoise => "PerlinNoise",
            Self::BlendShader => "BlendShader",
            Self::Runtime(_) => "Runtime",
        }
    }

    fn num_slots(self, dict: &ShaderCodeDictionary) -> usize {
        match self {
            Self::LocalMatrix | Self::CoordClamp => 1,
            Self::BlendShader => 2,
            Self::Runtime(id) => dict.get_entry(id).map_or(0, |s| s.num_children),
            Self::SolidColor | Self::Gradient(_) | Self::Image | Self::PerlinNoise => 0,
        }
    }
}

/// One shader option and its parameter ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderOption {
    pub kind: ShaderOptionKind,
    /// Gradients only. Defaults to `1..=4`.
    pub stops: Option<RangeInclusive<u32>>,
    /// Images only. Defaults to clamp on both axes.
    pub tile_modes: Vec<TileModePair>,
    /// Blend shaders only. Defaults to `SrcOver`.
    pub blend_modes: Vec<BlendMode>,
}

impl ShaderOption {
    #[must_use]
    pub fn new(kind: ShaderOptionKind) -> Self {
        Self {
            kind,
            stops: None,
            tile_modes: Vec::new(),
            blend_modes: Vec::new(),
        }
    }

    #[must_use]
    pub fn gradient(kind: GradientType, min_stops: u32, max_stops: u32) -> Self {
        Self::new(ShaderOptionKind::Gradient(kind)).with_stop_range(min_stops, max_stops)
    }

    #[must_use]
    pub fn image(tile_modes: &[TileModePair]) -> Self {
        Self::new(ShaderOptionKind::Image).with_tile_modes(tile_modes)
    }

    #[must_use]
    pub fn blend_shader(modes: &[BlendMode]) -> Self {
        Self::new(ShaderOptionKind::BlendShader).with_blend_modes(modes)
    }

    #[must_use]
    pub fn with_stop_range(mut self, min: u32, max: u32) -> Self {
        self.stops = Some(min..=max);
        self
    }

    #[must_use]
    pub fn with_tile_modes(mut self, tile_modes: &[TileModePair]) -> Self {
        self.tile_modes = tile_modes.to_vec();
        self
    }

    #[must_use]
    pub fn with_blend_modes(mut self, modes: &[BlendMode]) -> Self {
        self.blend_modes = modes.to_vec();
        self
    }
}

// ─── Arena Node ───────────────────────────────────────────────────────────────

/// Gradient storage class: ≤4, ≤8, texture.
const STOP_BUCKETS: [u32; 3] = [4, NUM_INTERNAL_STORAGE_STOPS as u32, NUM_INTERNAL_STORAGE_STOPS as u32 + 1];

fn stop_bucket(stops: u32) -> usize {
    STOP_BUCKETS.iter().position(|&limit| stops <= limit).unwrap_or(STOP_BUCKETS.len() - 1)
}

/// Validated parameter choices of one node.
#[derive(Debug, Clone)]
enum Params {
    None,
    /// Representative stop counts, one per bucket touched.
    Stops(SmallVec<[u32; 3]>),
    TileModes(Vec<TileModePair>),
    BlendModes(Vec<BlendMode>),
}

impl Params {
    fn count(&self) -> u64 {
        match self {
            Self::None => 1,
            Self::Stops(stops) => stops.len() as u64,
            Self::TileModes(modes) => modes.len() as u64,
            Self::BlendModes(modes) => modes.len() as u64,
        }
    }
}

#[derive(Debug)]
struct OptionNode {
    kind: ShaderOptionKind,
    params: Params,
    slots: Vec<Vec<OptionKey>>,
}

/// An entry of the blend dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BlendChoice {
    Mode(BlendMode),
    Runtime(SnippetId),
}

// ─── Builder ──────────────────────────────────────────────────────────────────

/// Arena-backed option tree plus the blend-choice set.
///
/// Not safe for concurrent mutation; enumeration takes `&self`.
pub struct CombinationBuilder<'d> {
    dict: &'d ShaderCodeDictionary,
    arena: SlotMap<OptionKey, OptionNode>,
    roots: Vec<OptionKey>,
    blend_choices: BTreeSet<BlendChoice>,
    epoch: u32,
}

impl<'d> CombinationBuilder<'d> {
    #[must_use]
    pub fn new(dict: &'d ShaderCodeDictionary) -> Self {
        Self {
            dict,
            arena: SlotMap::with_key(),
            roots: Vec::new(),
            blend_choices: BTreeSet::new(),
            epoch: 0,
        }
    }

    // ========================================================================
    // Blend Dimension
    // ========================================================================

    pub fn add_blend_mode(&mut self, mode: BlendMode) {
        self.blend_choices.insert(BlendChoice::Mode(mode));
    }

    /// Adds every mode in `start..=end`.
    pub fn add_blend_mode_range(&mut self, start: BlendMode, end: BlendMode) {
        for &mode in BlendMode::range(start, end) {
            self.add_blend_mode(mode);
        }
    }

    pub fn add_blend_mode_group(&mut self, group: BlendModeGroup) {
        for &mode in group.modes() {
            self.add_blend_mode(mode);
        }
    }

    /// Adds a runtime blender previously registered with the dictionary.
    pub fn add_runtime_blender(&mut self, id: SnippetId) -> Result<()> {
        self.check_runtime_kind(id, RuntimeEffectKind::Blender)?;
        self.blend_choices.insert(BlendChoice::Runtime(id));
        Ok(())
    }

    // ========================================================================
    // Shader Options
    // ========================================================================

    /// Appends a top-level shader option.
    pub fn add_option(&mut self, option: ShaderOption) -> Result<ShaderOptionHandle> {
        let key = self.insert(option)?;
        self.roots.push(key);
        Ok(self.handle(key))
    }

    pub fn add_gradient_option(&mut self, kind: GradientType, min_stops: u32, max_stops: u32) -> Result<ShaderOptionHandle> {
        self.add_option(ShaderOption::gradient(kind, min_stops, max_stops))
    }

    pub fn add_image_option(&mut self, tile_modes: &[TileModePair]) -> Result<ShaderOptionHandle> {
        self.add_option(ShaderOption::image(tile_modes))
    }

    pub fn add_blend_shader_option(&mut self, modes: &[BlendMode]) -> Result<ShaderOptionHandle> {
        self.add_option(ShaderOption::blend_shader(modes))
    }

    /// Adds an alternative for child slot `slot` of `parent`.
    pub fn add_child_option(
        &mut self,
        parent: ShaderOptionHandle,
        slot: usize,
        option: ShaderOption,
    ) -> Result<ShaderOptionHandle> {
        let parent_key = self.resolve(parent)?;
        let num_slots = self.arena[parent_key].slots.len();
        if slot >= num_slots {
            return Err(ShadingError::InvalidChildSlot { slot, num_slots });
        }
        if let ShaderOptionKind::Runtime(id) = self.arena[parent_key].kind
            && let Some(effect) = self.dict.get_entry(id).and_then(|s| s.runtime_effect.clone())
            && effect.children().get(slot) != Some(&ChildType::Shader)
        {
            return Err(ShadingError::ChildTypeMismatch { index: slot });
        }
        let key = self.insert(option)?;
        self.arena[parent_key].slots[slot].push(key);
        Ok(self.handle(key))
    }

    pub fn add_child_gradient_option(
        &mut self,
        parent: ShaderOptionHandle,
        slot: usize,
        kind: GradientType,
        min_stops: u32,
        max_stops: u32,
    ) -> Result<ShaderOptionHandle> {
        self.add_child_option(parent, slot, ShaderOption::gradient(kind, min_stops, max_stops))
    }

    pub fn add_child_image_option(
        &mut self,
        parent: ShaderOptionHandle,
        slot: usize,
        tile_modes: &[TileModePair],
    ) -> Result<ShaderOptionHandle> {
        self.add_child_option(parent, slot, ShaderOption::image(tile_modes))
    }

    /// Discards every option and blend choice. Outstanding handles become
    /// stale.
    pub fn reset(&mut self) {
        self.arena.clear();
        self.roots.clear();
        self.blend_choices.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    #[inline]
    #[must_use]
    pub fn num_options(&self) -> usize {
        self.arena.len()
    }

    fn handle(&self, key: OptionKey) -> ShaderOptionHandle {
        ShaderOptionHandle { key, epoch: self.epoch }
    }

    fn resolve(&self, handle: ShaderOptionHandle) -> Result<OptionKey> {
        if handle.epoch != self.epoch || !self.arena.contains_key(handle.key) {
            return Err(ShadingError::StaleOption);
        }
        Ok(handle.key)
    }

    /// `id` must be a registered runtime program of kind `expected`.
    fn check_runtime_kind(&self, id: SnippetId, expected: RuntimeEffectKind) -> Result<()> {
        let Some(effect) = self.dict.get_entry(id).and_then(|s| s.runtime_effect.clone()) else {
            return Err(ShadingError::UnknownSnippet(id.as_u32()));
        };
        if effect.kind() != expected {
            return Err(ShadingError::RuntimeEffectKindMismatch {
                id: id.as_u32(),
                expected,
                actual: effect.kind(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, option: ShaderOption) -> Result<OptionKey> {
        let kind = option.kind;
        let is_gradient = matches!(kind, ShaderOptionKind::Gradient(_));

        if option.stops.is_some() && !is_gradient {
            return Err(ShadingError::NotAGradient(kind.name()));
        }
        if !option.tile_modes.is_empty() && kind != ShaderOptionKind::Image {
            return Err(ShadingError::UnsupportedOption(kind.name()));
        }
        if !option.blend_modes.is_empty() && kind != ShaderOptionKind::BlendShader {
            return Err(ShadingError::UnsupportedOption(kind.name()));
        }
        if let ShaderOptionKind::Runtime(id) = kind {
            self.check_runtime_kind(id, RuntimeEffectKind::Shader)?;
        }

        let params = match kind {
            ShaderOptionKind::Gradient(_) => {
                let stops = option.stops.unwrap_or(1..=4);
                let (min, max) = (*stops.start(), *stops.end());
                if min == 0 || min > max {
                    return Err(ShadingError::InvalidStopRange { min, max });
                }
                let buckets = stop_bucket(min)..=stop_bucket(max);
                Params::Stops(buckets.map(|b| STOP_BUCKETS[b]).collect())
            }
            ShaderOptionKind::Image if option.tile_modes.is_empty() => Params::TileModes(vec![TileModePair::CLAMP]),
            ShaderOptionKind::Image => Params::TileModes(option.tile_modes),
            ShaderOptionKind::BlendShader if option.blend_modes.is_empty() => {
                Params::BlendModes(vec![BlendMode::SrcOver])
            }
            ShaderOptionKind::BlendShader => Params::BlendModes(option.blend_modes),
            _ => Params::None,
        };

        let slots = vec![Vec::new(); kind.num_slots(self.dict)];
        Ok(self.arena.insert(OptionNode { kind, params, slots }))
    }

    // ========================================================================
    // Counting
    // ========================================================================

    fn num_blend_choices(&self) -> u64 {
        self.blend_choices.len().max(1) as u64
    }

    fn option_combinations(&self, key: OptionKey) -> Result<u64> {
        let node = &self.arena[key];
        node.slots.iter().try_fold(node.params.count(), |acc, slot| {
            acc.checked_mul(self.slot_combinations(slot)?)
                .ok_or(ShadingError::TooManyCombinations)
        })
    }

    fn slot_combinations(&self, slot: &[OptionKey]) -> Result<u64> {
        if slot.is_empty() {
            return Ok(1);
        }
        slot.iter().try_fold(0u64, |acc, &k| {
            acc.checked_add(self.option_combinations(k)?)
                .ok_or(ShadingError::TooManyCombinations)
        })
    }

    fn shader_combinations(&self) -> Result<u64> {
        self.slot_combinations(&self.roots)
    }

    /// Number of combinations [`build_combinations`](Self::build_combinations)
    /// will report. Linear in the number of options.
    pub fn num_combinations(&self) -> Result<u64> {
        self.num_blend_choices()
            .checked_mul(self.shader_combinations()?)
            .ok_or(ShadingError::TooManyCombinations)
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Emits every combination in order (blend choices outermost, then
    /// shader options depth-first) and reports each canonical ID. Duplicate
    /// IDs are reported as-is. Nothing is emitted when the count overflows.
    pub fn build_combinations(&self, mut callback: impl FnMut(UniquePaintParamsId)) -> Result<()> {
        self.num_combinations()?;
        let ctx = KeyContext::new(self.dict, ColorInfo::default());
        let mut builder = PaintParamsKeyBuilder::new(self.dict);

        let blends: SmallVec<[BlendChoice; 1]> = if self.blend_choices.is_empty() {
            SmallVec::from_elem(BlendChoice::Mode(BlendMode::SrcOver), 1)
        } else {
            self.blend_choices.iter().copied().collect()
        };
        let num_shaders = self.shader_combinations()?;

        for blend in &blends {
            for index in 0..num_shaders {
                self.emit_slot(&ctx, &mut builder, &self.roots, index, false)?;
                self.emit_blend_choice(&ctx, &mut builder, *blend);

                let key = builder.finish()?;
                let id = self.dict.find_or_create(&key);
                log::trace!("combination {blend:?}/{index} -> {id:?}: {key}");
                callback(id);
            }
        }
        Ok(())
    }

    /// Emits alternative `index` of a slot; `pass_through` selects the
    /// empty-slot default.
    fn emit_slot(
        &self,
        ctx: &KeyContext<'_>,
        builder: &mut PaintParamsKeyBuilder<'_>,
        slot: &[OptionKey],
        mut index: u64,
        pass_through: bool,
    ) -> Result<()> {
        if slot.is_empty() {
            if pass_through {
                blocks::add_prior_output(ctx, builder, None);
            } else {
                blocks::add_solid_color(ctx, builder, None, PmColor4f::default());
            }
            return Ok(());
        }
        for &key in slot {
            let count = self.option_combinations(key)?;
            if index < count {
                return self.emit_option(ctx, builder, key, index);
            }
            index -= count;
        }
        unreachable!("combination index out of range");
    }

    /// Decodes `index` as mixed radix: own parameter first, then each slot.
    fn emit_option(
        &self,
        ctx: &KeyContext<'_>,
        builder: &mut PaintParamsKeyBuilder<'_>,
        key: OptionKey,
        index: u64,
    ) -> Result<()> {
        let node = &self.arena[key];
        let own_count = node.params.count();
        let own = (index % own_count) as usize;
        let mut rest = index / own_count;

        let mut slot_indices: SmallVec<[u64; 2]> = SmallVec::with_capacity(node.slots.len());
        for slot in &node.slots {
            let n = self.slot_combinations(slot)?;
            slot_indices.push(rest % n);
            rest /= n;
        }

        match (node.kind, &node.params) {
            (ShaderOptionKind::SolidColor, _) => {
                blocks::add_solid_color(ctx, builder, None, PmColor4f::default());
            }
            (ShaderOptionKind::Gradient(kind), Params::Stops(stops)) => {
                add_gradient(ctx, builder, None, &GradientData::structure_only(kind, stops[own] as usize));
            }
            (ShaderOptionKind::Gradient(kind), _) => {
                add_gradient(ctx, builder, None, &GradientData::structure_only(kind, 4));
            }
            (ShaderOptionKind::Image, _) => {
                builder.add_block(BuiltInCodeSnippetId::ImageShader);
            }
            (ShaderOptionKind::LocalMatrix, _) => {
                blocks::begin_local_matrix(ctx, builder, None, &Mat4::IDENTITY);
                self.emit_children(ctx, builder, node, &slot_indices, false)?;
                builder.end_block();
            }
            (ShaderOptionKind::CoordClamp, _) => {
                blocks::begin_coord_clamp(ctx, builder, None, Vec4::ZERO);
                self.emit_children(ctx, builder, node, &slot_indices, false)?;
                builder.end_block();
            }
            (ShaderOptionKind::PerlinNoise, _) => {
                builder.add_block(BuiltInCodeSnippetId::PerlinNoiseShader);
            }
            (ShaderOptionKind::BlendShader, params) => {
                let mode = match params {
                    Params::BlendModes(modes) => modes[own],
                    _ => BlendMode::SrcOver,
                };
                blocks::begin_blend_shader(ctx, builder, None);
                self.emit_children(ctx, builder, node, &slot_indices, false)?;
                add_blend_mode_to_key(ctx, builder, None, mode);
                builder.end_block();
            }
            (ShaderOptionKind::Runtime(id), _) => {
                builder.begin_block(id);
                self.emit_children(ctx, builder, node, &slot_indices, true)?;
                builder.end_block();
            }
        }
        Ok(())
    }

    fn emit_children(
        &self,
        ctx: &KeyContext<'_>,
        builder: &mut PaintParamsKeyBuilder<'_>,
        node: &OptionNode,
        slot_indices: &[u64],
        pass_through: bool,
    ) -> Result<()> {
        for (slot, &i) in node.slots.iter().zip(slot_indices) {
            self.emit_slot(ctx, builder, slot, i, pass_through)?;
        }
        Ok(())
    }

    fn emit_blend_choice(&self, ctx: &KeyContext<'_>, builder: &mut PaintParamsKeyBuilder<'_>, choice: BlendChoice) {
        match choice {
            BlendChoice::Mode(mode) => add_blend_mode_to_key(ctx, builder, None, mode),
            BlendChoice::Runtime(id) => {
                builder.begin_block(id);
                let children = self.dict.get_entry(id).map_or(0, |s| s.num_children);
                for _ in 0..children {
                    blocks::add_prior_output(ctx, builder, None);
                }
                builder.end_block();
            }
        }
    }

    // ========================================================================
    // Debug
    // ========================================================================

    /// Indented description of the blend set and option tree.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Blend choices ({}):", self.num_blend_choices());
        if self.blend_choices.is_empty() {
            let _ = writeln!(out, "  SrcOver (default)");
        }
        for choice in &self.blend_choices {
            match choice {
                BlendChoice::Mode(mode) => {
                    let _ = writeln!(out, "  {}", mode.name());
                }
                BlendChoice::Runtime(id) => {
                    let _ = writeln!(out, "  Runtime [{id}]");
                }
            }
        }
        let _ = writeln!(out, "Shader options ({}):", count_label(self.shader_combinations()));
        for &key in &self.roots {
            self.dump_option(key, 1, &mut out);
        }
        log::debug!("{out}");
        out
    }

    fn dump_option(&self, key: OptionKey, depth: usize, out: &mut String) {
        let node = &self.arena[key];
        let _ = write!(out, "{:indent$}{}", "", node.kind.name(), indent = depth * 2);
        match &node.params {
            Params::None => {}
            Params::Stops(stops) => {
                let _ = write!(out, " stops{stops:?}");
            }
            Params::TileModes(modes) => {
                let _ = write!(out, " tile_modes x{}", modes.len());
            }
            Params::BlendModes(modes) => {
                let names: Vec<_> = modes.iter().map(|m| m.name()).collect();
                let _ = write!(out, " modes[{}]", names.join(", "));
            }
        }
        let _ = writeln!(out, " ({})", count_label(self.option_combinations(key)));
        for (i, slot) in node.slots.iter().enumerate() {
            let _ = writeln!(out, "{:indent$}slot {i}:", "", indent = depth * 2 + 2);
            for &child in slot {
                self.dump_option(child, depth + 2, out);
            }
        }
    }
}

fn count_label(count: Result<u64>) -> String {
    count.map_or_else(|_| String::from("overflow"), |n| n.to_string())
}

impl fmt::Debug for CombinationBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinationBuilder")
            .field("options", &self.arena.len())
            .field("blend_choices", &self.blend_choices.len())
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
