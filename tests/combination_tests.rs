//! Combination Builder Tests
//!
//! Tests for:
//! - num_combinations: blend × shader products, child-slot multiplication
//! - build_combinations: callback count, ordering, duplicate reporting
//! - Counting overflow: rejected instead of wrapping
//! - Handles: stale after reset, invalid slots
//! - Runtime blenders and runtime shader options: program kind, child slot types
//! - PrecompileConfig round trip

use std::collections::HashSet;

use myth_shading::dictionary::BuiltInCodeSnippetId as B;
use myth_shading::{
    BlendMode, BlendModeGroup, ChildType, CombinationBuilder, GradientType, PrecompileConfig, RuntimeEffect,
    RuntimeEffectKind, ShaderCodeDictionary, ShaderOption, ShaderOptionKind, ShadingError, TileMode, TileModePair,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn collect(builder: &CombinationBuilder<'_>) -> anyhow::Result<Vec<myth_shading::UniquePaintParamsId>> {
    let mut ids = Vec::new();
    builder.build_combinations(|id| ids.push(id))?;
    Ok(ids)
}

// ============================================================================
// Counting
// ============================================================================

#[test]
fn blend_modes_times_shader_options() -> anyhow::Result<()> {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);

    builder.add_blend_mode(BlendMode::SrcOver);
    builder.add_blend_mode(BlendMode::Multiply);
    builder.add_blend_mode(BlendMode::Screen);
    builder.add_option(ShaderOption::new(ShaderOptionKind::SolidColor))?;
    builder.add_option(ShaderOption::new(ShaderOptionKind::PerlinNoise))?;

    assert_eq!(builder.num_combinations()?, 3 * 2);
    assert_eq!(collect(&builder)?.len(), 6);
    Ok(())
}

#[test]
fn duplicate_blend_modes_count_once() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);

    builder.add_blend_mode(BlendMode::Xor);
    builder.add_blend_mode_range(BlendMode::Clear, BlendMode::Xor);
    assert_eq!(builder.num_combinations()?, 12);

    builder.add_blend_mode_group(BlendModeGroup::All);
    assert_eq!(builder.num_combinations()?, BlendMode::ALL.len() as u64);
    Ok(())
}

#[test]
fn child_slot_multiplies_its_option() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);

    builder.add_option(ShaderOption::new(ShaderOptionKind::SolidColor))?;
    let lm = builder.add_option(ShaderOption::new(ShaderOptionKind::LocalMatrix))?;
    assert_eq!(builder.num_combinations()?, 2);

    builder.add_child_option(lm, 0, ShaderOption::new(ShaderOptionKind::SolidColor))?;
    builder.add_child_gradient_option(lm, 0, GradientType::Conical, 1, 8)?;
    builder.add_child_image_option(
        lm,
        0,
        &[
            TileModePair::CLAMP,
            TileModePair::new(TileMode::Repeat, TileMode::Mirror),
        ],
    )?;
    // SolidColor + LocalMatrix × (1 + 2 + 2)
    assert_eq!(builder.num_combinations()?, 1 + 5);
    assert_eq!(collect(&builder)?.len(), 6);
    Ok(())
}

#[test]
fn blend_shader_slots_and_modes_multiply() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);

    let blend = builder.add_blend_shader_option(&[BlendMode::SrcOver, BlendMode::Darken])?;
    builder.add_child_option(blend, 0, ShaderOption::new(ShaderOptionKind::SolidColor))?;
    builder.add_child_option(blend, 0, ShaderOption::new(ShaderOptionKind::PerlinNoise))?;
    builder.add_child_gradient_option(blend, 1, GradientType::Sweep, 2, 9)?;

    // 2 modes × 2 src × 3 dst buckets
    assert_eq!(builder.num_combinations()?, 12);

    let ids = collect(&builder)?;
    assert_eq!(ids.len(), 12);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 12);
    Ok(())
}

/// Blend shader with every mode whose children nest `depth` more levels.
fn nested_blend_shaders(
    builder: &mut CombinationBuilder<'_>,
    parent: Option<myth_shading::ShaderOptionHandle>,
    slot: usize,
    depth: usize,
) -> anyhow::Result<()> {
    let option = ShaderOption::blend_shader(BlendModeGroup::All.modes());
    let handle = match parent {
        Some(parent) => builder.add_child_option(parent, slot, option)?,
        None => builder.add_option(option)?,
    };
    if depth > 0 {
        nested_blend_shaders(builder, Some(handle), 0, depth - 1)?;
        nested_blend_shaders(builder, Some(handle), 1, depth - 1)?;
    }
    Ok(())
}

#[test]
fn nested_blend_shaders_count_exactly() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);
    builder.add_blend_mode_group(BlendModeGroup::All);
    nested_blend_shaders(&mut builder, None, 0, 2)?;

    // 7 options: 29 × (29 × 29²)² shader combinations
    assert_eq!(builder.num_options(), 7);
    assert_eq!(builder.num_combinations()?, 29u64.pow(8));
    Ok(())
}

#[test]
fn overflowing_count_is_rejected() -> anyhow::Result<()> {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);
    builder.add_blend_mode_group(BlendModeGroup::All);
    nested_blend_shaders(&mut builder, None, 0, 3)?;

    // 15 options: 29^15 shader combinations
    assert_eq!(builder.num_options(), 15);
    assert!(matches!(builder.num_combinations(), Err(ShadingError::TooManyCombinations)));

    let mut reported = 0;
    let result = builder.build_combinations(|_| reported += 1);
    assert!(matches!(result, Err(ShadingError::TooManyCombinations)));
    assert_eq!(reported, 0);
    assert!(builder.dump().contains("overflow"));
    Ok(())
}

// ============================================================================
// Enumeration
// ============================================================================

#[test]
fn duplicates_are_reported_not_suppressed() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);
    builder.add_image_option(&[TileModePair::CLAMP, TileModePair::REPEAT])?;

    let ids = collect(&builder)?;
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    Ok(())
}

#[test]
fn blend_choices_are_the_outer_loop() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);
    builder.add_blend_mode(BlendMode::Src);
    builder.add_blend_mode(BlendMode::Hue);
    builder.add_gradient_option(GradientType::Linear, 1, 6)?;

    let ids = collect(&builder)?;
    let keys: Vec<_> = ids.iter().map(|&id| dict.lookup(id).expect("interned")).collect();

    let last = |i: usize| *keys[i].as_slice().last().expect("non-empty key");
    assert_eq!(last(0), B::CoeffBlender as u32);
    assert_eq!(last(1), B::CoeffBlender as u32);
    assert_eq!(last(2), B::BlendModeBlender as u32);
    assert_eq!(keys[0].as_slice()[0], B::LinearGradientShader4 as u32);
    assert_eq!(keys[1].as_slice()[0], B::LinearGradientShader8 as u32);
    Ok(())
}

#[test]
fn enumerated_ids_match_concrete_paints() -> anyhow::Result<()> {
    use myth_shading::{Color4f, ColorInfo, KeyContext, PaintParams, Shader, ShadingSettings, build_paint};

    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);
    let lm = builder.add_option(ShaderOption::new(ShaderOptionKind::LocalMatrix))?;
    builder.add_child_option(lm, 0, ShaderOption::new(ShaderOptionKind::SolidColor))?;
    builder.add_blend_mode(BlendMode::Plus);
    let ids = collect(&builder)?;

    let ctx = KeyContext::new(&dict, ColorInfo::default());
    let paint = PaintParams::new()
        .with_shader(Shader::solid(Color4f::WHITE).with_local_matrix(glam::Mat4::IDENTITY))
        .with_blender(BlendMode::Plus);
    let (id, _) = build_paint(&ctx, ShadingSettings::default(), &paint)?;

    assert_eq!(ids, vec![id]);
    Ok(())
}

// ============================================================================
// Handles
// ============================================================================

#[test]
fn reset_makes_handles_stale() -> anyhow::Result<()> {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);

    let lm = builder.add_option(ShaderOption::new(ShaderOptionKind::LocalMatrix))?;
    builder.add_blend_mode(BlendMode::Multiply);
    builder.reset();

    assert_eq!(builder.num_options(), 0);
    assert_eq!(builder.num_combinations()?, 1);
    assert!(matches!(
        builder.add_child_option(lm, 0, ShaderOption::new(ShaderOptionKind::SolidColor)),
        Err(ShadingError::StaleOption)
    ));

    // A fresh option reusing the arena slot still rejects the old handle.
    let fresh = builder.add_option(ShaderOption::new(ShaderOptionKind::CoordClamp))?;
    assert_ne!(fresh, lm);
    assert!(matches!(
        builder.add_child_option(lm, 0, ShaderOption::new(ShaderOptionKind::SolidColor)),
        Err(ShadingError::StaleOption)
    ));
    assert!(builder.add_child_option(fresh, 0, ShaderOption::new(ShaderOptionKind::SolidColor)).is_ok());
    Ok(())
}

#[test]
fn out_of_range_slot_is_rejected() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);
    let blend = builder.add_blend_shader_option(&[])?;

    assert!(matches!(
        builder.add_child_option(blend, 2, ShaderOption::new(ShaderOptionKind::SolidColor)),
        Err(ShadingError::InvalidChildSlot { slot: 2, num_slots: 2 })
    ));
    Ok(())
}

// ============================================================================
// Runtime Effects
// ============================================================================

#[test]
fn runtime_blenders_join_the_blend_dimension() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let blender = RuntimeEffect::builder(RuntimeEffectKind::Blender, "fn blend() {}").build();
    let id = dict.find_or_create_runtime_effect_snippet(&blender);

    let mut builder = CombinationBuilder::new(&dict);
    builder.add_blend_mode(BlendMode::SrcOver);
    builder.add_runtime_blender(id)?;
    assert!(matches!(
        builder.add_runtime_blender(B::CoeffBlender.id()),
        Err(ShadingError::UnknownSnippet(_))
    ));
    assert_eq!(builder.num_combinations()?, 2);

    let ids = collect(&builder)?;
    let key = dict.lookup(ids[1]).expect("interned");
    assert_eq!(*key.as_slice().last().expect("non-empty key"), id.as_u32());
    Ok(())
}

#[test]
fn runtime_shader_children_default_to_pass_through() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let effect = RuntimeEffect::builder(RuntimeEffectKind::Shader, "fn main() {}")
        .child(ChildType::Shader)
        .child(ChildType::ColorFilter)
        .build();
    let id = dict.find_or_create_runtime_effect_snippet(&effect);

    let mut builder = CombinationBuilder::new(&dict);
    let runtime = builder.add_option(ShaderOption::new(ShaderOptionKind::Runtime(id)))?;
    builder.add_child_option(runtime, 0, ShaderOption::new(ShaderOptionKind::SolidColor))?;

    let ids = collect(&builder)?;
    let key = dict.lookup(ids[0]).expect("interned");
    assert_eq!(
        key.as_slice(),
        &[
            id.as_u32(),
            B::SolidColorShader as u32,
            B::PriorOutput as u32,
            B::CoeffBlender as u32,
        ]
    );
    Ok(())
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn config_round_trips_and_applies() -> anyhow::Result<()> {
    let json = r#"{
        "blend_modes": [{ "group": "ColorAware" }],
        "shaders": [
            { "kind": "BlendShader", "blend_modes": ["Src", "Overlay"],
              "children": [[{ "kind": "SolidColor" }], [{ "kind": "RadialGradient", "stops": [1, 4] }]] }
        ]
    }"#;
    let config = PrecompileConfig::from_json(json)?;
    assert_eq!(PrecompileConfig::from_json(&config.to_json()?)?, config);

    let dict = ShaderCodeDictionary::new();
    let mut builder = CombinationBuilder::new(&dict);
    config.apply(&mut builder)?;
    assert_eq!(builder.num_combinations()?, 4 * 2);
    assert!(builder.dump().contains("BlendShader modes[Src, Overlay]"));
    Ok(())
}

#[test]
fn runtime_programs_must_match_their_role() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let filter = RuntimeEffect::builder(RuntimeEffectKind::ColorFilter, "fn filter() {}")
        .child(ChildType::ColorFilter)
        .build();
    let shader = RuntimeEffect::builder(RuntimeEffectKind::Shader, "fn main() {}").build();
    let filter_id = dict.find_or_create_runtime_effect_snippet(&filter);
    let shader_id = dict.find_or_create_runtime_effect_snippet(&shader);

    let mut builder = CombinationBuilder::new(&dict);
    assert!(matches!(
        builder.add_runtime_blender(filter_id),
        Err(ShadingError::RuntimeEffectKindMismatch {
            expected: RuntimeEffectKind::Blender,
            actual: RuntimeEffectKind::ColorFilter,
            ..
        })
    ));
    assert!(matches!(
        builder.add_runtime_blender(shader_id),
        Err(ShadingError::RuntimeEffectKindMismatch { .. })
    ));
    assert!(matches!(
        builder.add_option(ShaderOption::new(ShaderOptionKind::Runtime(filter_id))),
        Err(ShadingError::RuntimeEffectKindMismatch {
            expected: RuntimeEffectKind::Shader,
            actual: RuntimeEffectKind::ColorFilter,
            ..
        })
    ));

    assert_eq!(builder.num_options(), 0);
    assert_eq!(builder.num_combinations()?, 1);
    Ok(())
}

#[test]
fn shader_options_only_fill_shader_slots() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let effect = RuntimeEffect::builder(RuntimeEffectKind::Shader, "fn main() {}")
        .child(ChildType::ColorFilter)
        .child(ChildType::Shader)
        .child(ChildType::Blender)
        .build();
    let id = dict.find_or_create_runtime_effect_snippet(&effect);

    let mut builder = CombinationBuilder::new(&dict);
    let runtime = builder.add_option(ShaderOption::new(ShaderOptionKind::Runtime(id)))?;

    assert!(matches!(
        builder.add_child_gradient_option(runtime, 0, GradientType::Linear, 1, 4),
        Err(ShadingError::ChildTypeMismatch { index: 0 })
    ));
    assert!(matches!(
        builder.add_child_option(runtime, 2, ShaderOption::new(ShaderOptionKind::SolidColor)),
        Err(ShadingError::ChildTypeMismatch { index: 2 })
    ));
    builder.add_child_gradient_option(runtime, 1, GradientType::Linear, 1, 4)?;

    let ids = collect(&builder)?;
    let key = dict.lookup(ids[0]).expect("interned");
    assert_eq!(
        key.as_slice(),
        &[
            id.as_u32(),
            B::PriorOutput as u32,
            B::LinearGradientShader4 as u32,
            B::PriorOutput as u32,
            B::CoeffBlender as u32,
        ]
    );
    Ok(())
}
