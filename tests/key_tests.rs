//! Key Builder and Dictionary Tests
//!
//! Tests for:
//! - PaintParamsKeyBuilder: preorder encoding, nesting contract, reuse after finish
//! - PaintParamsKey: block decoding and dump
//! - ShaderCodeDictionary: paint-key interning, runtime-effect deduplication,
//!   concurrent registration

use std::sync::Arc;

use myth_shading::dictionary::BuiltInCodeSnippetId as B;
use myth_shading::{
    BlendMode, ChildType, Color4f, ColorFilter, ColorInfo, KeyContext, PaintParams, PaintParamsKeyBuilder,
    RuntimeEffect, RuntimeEffectInstance, RuntimeEffectKind, Shader, ShaderCodeDictionary, ShadingError,
    ShadingSettings, SlType, build_paint,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ids(blocks: &[B]) -> Vec<u32> {
    blocks.iter().map(|&b| b as u32).collect()
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn nested_blocks_encode_in_preorder() -> anyhow::Result<()> {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let mut builder = PaintParamsKeyBuilder::new(&dict);

    builder.begin_block(B::BlendShader);
    builder.add_block(B::SolidColorShader);
    builder.begin_block(B::LocalMatrixShader);
    builder.add_block(B::ImageShader);
    builder.end_block();
    builder.add_block(B::CoeffBlender);
    builder.end_block();

    let key = builder.finish()?;
    assert_eq!(
        key.as_slice(),
        ids(&[
            B::BlendShader,
            B::SolidColorShader,
            B::LocalMatrixShader,
            B::ImageShader,
            B::CoeffBlender
        ])
    );

    let roots = key.blocks(&dict)?;
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].children.len(), 3);
    assert_eq!(roots[0].children[1].children[0].id, B::ImageShader.id());

    let dump = key.dump(&dict);
    assert!(dump.starts_with("BlendShader"));
    assert!(dump.contains("\n    ImageShader"));
    Ok(())
}

#[test]
fn builder_is_reusable_after_finish() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let mut builder = PaintParamsKeyBuilder::new(&dict);

    builder.add_block(B::PriorOutput);
    let first = builder.finish()?;
    builder.add_block(B::DstColor);
    let second = builder.finish()?;

    assert_eq!(first.as_slice(), ids(&[B::PriorOutput]));
    assert_eq!(second.as_slice(), ids(&[B::DstColor]));
    Ok(())
}

// ============================================================================
// Nesting Contract
// ============================================================================

#[test]
fn unclosed_block_is_reported() {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let mut builder = PaintParamsKeyBuilder::new(&dict);

    builder.begin_block(B::LocalMatrixShader);
    builder.add_block(B::SolidColorShader);

    assert!(matches!(builder.finish(), Err(ShadingError::UnbalancedBlocks { open: 1 })));
}

#[test]
fn extra_end_block_is_reported() {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let mut builder = PaintParamsKeyBuilder::new(&dict);

    builder.add_block(B::SolidColorShader);
    builder.end_block();

    assert!(matches!(builder.finish(), Err(ShadingError::UnmatchedEndBlock)));
}

#[test]
fn wrong_child_count_is_reported() {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let mut builder = PaintParamsKeyBuilder::new(&dict);

    builder.begin_block(B::BlendShader);
    builder.add_block(B::SolidColorShader);
    builder.end_block();

    match builder.finish() {
        Err(ShadingError::ChildCountMismatch { expected, actual, .. }) => {
            assert_eq!((expected, actual), (3, 1));
        }
        other => panic!("expected ChildCountMismatch, got {other:?}"),
    }
}

#[test]
fn empty_key_is_an_error() {
    let dict = ShaderCodeDictionary::new();
    let mut builder = PaintParamsKeyBuilder::new(&dict);
    assert!(matches!(builder.finish(), Err(ShadingError::EmptyKey)));
}

// ============================================================================
// Interning
// ============================================================================

#[test]
fn structurally_identical_paints_share_an_id() -> anyhow::Result<()> {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let ctx = KeyContext::new(&dict, ColorInfo::default());
    let settings = ShadingSettings::default();

    let make = || {
        PaintParams::new()
            .with_shader(Shader::solid(Color4f::WHITE))
            .with_color_filter(ColorFilter::blend(BlendMode::Multiply, Color4f::new(0.2, 0.4, 0.6, 1.0)))
    };
    let (a, data_a) = build_paint(&ctx, settings, &make())?;
    let (b, data_b) = build_paint(&ctx, settings, &make())?;

    assert_eq!(a, b);
    assert_eq!(data_a.uniforms, data_b.uniforms);
    assert_eq!(dict.num_paint_keys(), 1);
    Ok(())
}

#[test]
fn uniform_values_do_not_change_the_id() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let ctx = KeyContext::new(&dict, ColorInfo::default());
    let settings = ShadingSettings::default();

    let red = PaintParams::new().with_shader(Shader::solid(Color4f::new(1.0, 0.0, 0.0, 1.0)));
    let blue = PaintParams::new().with_shader(Shader::solid(Color4f::new(0.0, 0.0, 1.0, 1.0)));
    let (a, data_a) = build_paint(&ctx, settings, &red)?;
    let (b, data_b) = build_paint(&ctx, settings, &blue)?;

    assert_eq!(a, b);
    assert_ne!(data_a.uniform_hash(), data_b.uniform_hash());
    Ok(())
}

#[test]
fn interned_ids_round_trip_to_keys() -> anyhow::Result<()> {
    let dict = ShaderCodeDictionary::new();
    let ctx = KeyContext::new(&dict, ColorInfo::default());
    let (id, _) = build_paint(&ctx, ShadingSettings::default(), &PaintParams::new())?;

    let key = dict.lookup(id).expect("interned key");
    assert_eq!(key.as_slice(), ids(&[B::SolidColorShader, B::CoeffBlender]));
    Ok(())
}

// ============================================================================
// Runtime Effects
// ============================================================================

fn tint_effect(source: &str) -> Arc<RuntimeEffect> {
    RuntimeEffect::builder(RuntimeEffectKind::Shader, source)
        .name("tint")
        .uniform("tint", SlType::Float4)
        .uniform("strength", SlType::Half)
        .child(ChildType::Shader)
        .build()
}

#[test]
fn identical_programs_share_a_snippet() {
    let dict = ShaderCodeDictionary::new();
    let a = dict.find_or_create_runtime_effect_snippet(&tint_effect("fn main() {}"));
    let b = dict.find_or_create_runtime_effect_snippet(&tint_effect("fn main() {}"));
    let c = dict.find_or_create_runtime_effect_snippet(&tint_effect("fn main() { discard; }"));

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(!a.is_built_in());
    assert_eq!(dict.num_runtime_snippets(), 2);
    assert_eq!(dict.snippet(a).num_children, 1);
}

#[test]
fn runtime_uniform_values_do_not_change_the_id() -> anyhow::Result<()> {
    init_logger();
    let dict = ShaderCodeDictionary::new();
    let ctx = KeyContext::new(&dict, ColorInfo::default());
    let settings = ShadingSettings::default();

    let paint = |strength: f32| -> anyhow::Result<PaintParams> {
        let instance = RuntimeEffectInstance::new(tint_effect("fn main() {}"))
            .with_uniform("tint", &[1.0f32, 0.5, 0.25, 1.0])?
            .with_uniform("strength", &[strength])?;
        Ok(PaintParams::new().with_shader(Shader::Runtime(instance)))
    };
    let (a, data_a) = build_paint(&ctx, settings, &paint(0.25)?)?;
    let (b, data_b) = build_paint(&ctx, settings, &paint(0.75)?)?;

    assert_eq!(a, b);
    assert_ne!(data_a.uniforms, data_b.uniforms);

    // The unbound child passes the input through.
    let key = dict.lookup(a).expect("interned key");
    assert_eq!(key.as_slice()[1], B::PriorOutput as u32);
    Ok(())
}

#[test]
fn runtime_effects_are_recorded_on_the_builder() {
    let dict = ShaderCodeDictionary::new();
    let ctx = KeyContext::new(&dict, ColorInfo::default());
    let mut builder = PaintParamsKeyBuilder::new(&dict);

    let instance = RuntimeEffectInstance::new(tint_effect("fn main() {}"));
    myth_shading::emit::add_runtime_effect_to_key(&ctx, &mut builder, None, &instance);

    assert_eq!(builder.referenced_runtime_effects().len(), 1);
    assert!(builder.finish().is_ok());
}

#[test]
fn concurrent_registration_has_a_single_winner() {
    let dict = ShaderCodeDictionary::new();
    let shared = &dict;
    let ids: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(move || shared.find_or_create_runtime_effect_snippet(&tint_effect("shared"))))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(dict.num_runtime_snippets(), 1);
}
