//! Runtime-authored shader programs.
//!
//! A [`RuntimeEffect`] is the *program*: source text plus its declared
//! uniform and child layout. Uniform *values* live with the effect instance
//! (see `effects::RuntimeEffectInstance`) and do not participate in identity, so
//! every instance of the same program shares one code snippet.

use std::borrow::Cow;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use xxhash_rust::xxh3::Xxh3;

use crate::uniform::{NON_ARRAY, SlType, Uniform};

/// What a runtime program computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeEffectKind {
    Shader,
    ColorFilter,
    Blender,
}

/// Kind of a child slot declared by a runtime program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildType {
    Shader,
    ColorFilter,
    Blender,
}

/// One uniform declared by a runtime program.
///
/// `offset` locates the value inside the tightly packed CPU uniform data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeUniform {
    pub name: String,
    pub ty: SlType,
    pub count: u32,
    pub offset: usize,
}

impl RuntimeUniform {
    /// Byte size of this uniform in the CPU uniform data.
    #[must_use]
    pub fn cpu_size(&self) -> usize {
        self.ty.cpu_size() * self.count.max(1) as usize
    }
}

/// An immutable runtime-authored program.
#[derive(Debug)]
pub struct RuntimeEffect {
    kind: RuntimeEffectKind,
    name: String,
    source: String,
    uniforms: Vec<RuntimeUniform>,
    children: Vec<ChildType>,
    uniform_size: usize,
    hash: u128,
}

impl RuntimeEffect {
    #[must_use]
    pub fn builder(kind: RuntimeEffectKind, source: impl Into<String>) -> RuntimeEffectBuilder {
        RuntimeEffectBuilder {
            kind,
            name: String::from("RuntimeEffect"),
            source: source.into(),
            uniforms: Vec::new(),
            children: Vec::new(),
            offset: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> RuntimeEffectKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn uniforms(&self) -> &[RuntimeUniform] {
        &self.uniforms
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[ChildType] {
        &self.children
    }

    /// Total size of the tightly packed CPU uniform data.
    #[inline]
    #[must_use]
    pub fn uniform_size(&self) -> usize {
        self.uniform_size
    }

    /// xxh3-128 over the source text and the uniform/child layout.
    #[inline]
    #[must_use]
    pub fn structural_hash(&self) -> u128 {
        self.hash
    }

    /// Uniform slot list of the snippet generated for this program.
    #[must_use]
    pub fn snippet_uniforms(&self) -> Vec<Uniform> {
        self.uniforms
            .iter()
            .map(|u| Uniform {
                name: Cow::Owned(u.name.clone()),
                ty: u.ty,
                count: u.count,
            })
            .collect()
    }
}

impl PartialEq for RuntimeEffect {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.kind == other.kind
            && self.source == other.source
            && self.uniforms == other.uniforms
            && self.children == other.children
    }
}

impl Eq for RuntimeEffect {}

impl Hash for RuntimeEffect {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// Declares the layout of a [`RuntimeEffect`].
#[derive(Debug)]
pub struct RuntimeEffectBuilder {
    kind: RuntimeEffectKind,
    name: String,
    source: String,
    uniforms: Vec<RuntimeUniform>,
    children: Vec<ChildType>,
    offset: usize,
}

impl RuntimeEffectBuilder {
    /// Debug name; not part of the program's identity.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn uniform(self, name: impl Into<String>, ty: SlType) -> Self {
        self.push_uniform(name.into(), ty, NON_ARRAY)
    }

    #[must_use]
    pub fn uniform_array(self, name: impl Into<String>, ty: SlType, count: u32) -> Self {
        self.push_uniform(name.into(), ty, count)
    }

    #[must_use]
    pub fn child(mut self, ty: ChildType) -> Self {
        self.children.push(ty);
        self
    }

    fn push_uniform(mut self, name: String, ty: SlType, count: u32) -> Self {
        // Runtime programs store half-precision uniforms as f32 on the CPU.
        let uniform = RuntimeUniform {
            name,
            ty,
            count,
            offset: self.offset,
        };
        self.offset += uniform.cpu_size();
        self.uniforms.push(uniform);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<RuntimeEffect> {
        let mut hasher = Xxh3::new();
        hasher.update(&[self.kind as u8]);
        hasher.update(self.source.as_bytes());
        for u in &self.uniforms {
            hasher.update(u.name.as_bytes());
            hasher.update(&[0]);
            hasher.update(&(u.ty as u32).to_le_bytes());
            hasher.update(&u.count.to_le_bytes());
        }
        for child in &self.children {
            hasher.update(&[*child as u8]);
        }
        let hash = hasher.digest128();

        Arc::new(RuntimeEffect {
            kind: self.kind,
            name: self.name,
            source: self.source,
            uniforms: self.uniforms,
            children: self.children,
            uniform_size: self.offset,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tint() -> Arc<RuntimeEffect> {
        RuntimeEffect::builder(RuntimeEffectKind::ColorFilter, "fn main(c: vec4f) -> vec4f { return c * tint; }")
            .uniform("tint", SlType::Float4)
            .uniform("strength", SlType::Float)
            .build()
    }

    #[test]
    fn offsets_are_tightly_packed() {
        let effect = tint();
        assert_eq!(effect.uniforms()[0].offset, 0);
        assert_eq!(effect.uniforms()[1].offset, 16);
        assert_eq!(effect.uniform_size(), 20);
    }

    #[test]
    fn identity_is_structural() {
        assert_eq!(*tint(), *tint());
        assert_eq!(tint().structural_hash(), tint().structural_hash());

        let other = RuntimeEffect::builder(RuntimeEffectKind::ColorFilter, "fn main(c: vec4f) -> vec4f { return c; }")
            .uniform("tint", SlType::Float4)
            .uniform("strength", SlType::Float)
            .build();
        assert_ne!(*tint(), *other);
    }

    #[test]
    fn debug_name_does_not_affect_identity() {
        let a = RuntimeEffect::builder(RuntimeEffectKind::Shader, "src").name("a").build();
        let b = RuntimeEffect::builder(RuntimeEffectKind::Shader, "src").name("b").build();
        assert_eq!(*a, *b);
    }
}
