//! Key Builder
//!
//! Serializes a tree of code-snippet blocks into a flat [`PaintParamsKey`].
//!
//! # Encoding
//!
//! The key is the preorder walk of the block tree: each block contributes its
//! snippet ID, immediately followed by the encodings of its children in
//! emission order. Child counts are not stored; they are implied by each
//! snippet's declaration, which makes the encoding unambiguous and lets
//! [`PaintParamsKey::blocks`] rebuild the tree.
//!
//! ```text
//! BlendShader( SolidColor, LocalMatrix(Image), CoeffBlender )
//!   → [BlendShader, SolidColor, LocalMatrix, Image, CoeffBlender]
//! ```
//!
//! # Contract
//!
//! Every `begin_block` needs a matching `end_block`, and each block must be
//! closed with exactly as many children as its snippet declares. A violation
//! poisons the builder: it is logged and reported by [`PaintParamsKeyBuilder::finish`].

use std::fmt::{self, Write as _};

use smallvec::SmallVec;

use crate::dictionary::{ShaderCodeDictionary, SnippetId};
use crate::errors::{Result, ShadingError};

// ─── Key ──────────────────────────────────────────────────────────────────────

/// Immutable flattened encoding of one block tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PaintParamsKey(Vec<u32>);

impl PaintParamsKey {
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the key back into its root blocks.
    pub fn blocks(&self, dict: &ShaderCodeDictionary) -> Result<Vec<Block>> {
        let mut cursor = 0;
        let mut roots = Vec::new();
        while cursor < self.0.len() {
            roots.push(Self::decode(&self.0, &mut cursor, dict)?);
        }
        Ok(roots)
    }

    fn decode(data: &[u32], cursor: &mut usize, dict: &ShaderCodeDictionary) -> Result<Block> {
        let Some(&raw) = data.get(*cursor) else {
            return Err(ShadingError::UnbalancedBlocks { open: 1 });
        };
        *cursor += 1;

        let id = SnippetId(raw);
        let snippet = dict.get_entry(id).ok_or(ShadingError::UnknownSnippet(raw))?;
        let mut children = Vec::with_capacity(snippet.num_children);
        for _ in 0..snippet.num_children {
            children.push(Self::decode(data, cursor, dict)?);
        }
        Ok(Block { id, children })
    }

    /// Human-readable indented rendering of the block tree.
    #[must_use]
    pub fn dump(&self, dict: &ShaderCodeDictionary) -> String {
        match self.blocks(dict) {
            Ok(roots) => {
                let mut out = String::new();
                for root in &roots {
                    root.dump_into(dict, 0, &mut out);
                }
                out
            }
            Err(e) => format!("<malformed key {:?}: {e}>", self.0),
        }
    }
}

impl fmt::Display for PaintParamsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// One decoded node of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: SnippetId,
    pub children: Vec<Block>,
}

impl Block {
    fn dump_into(&self, dict: &ShaderCodeDictionary, depth: usize, out: &mut String) {
        let name = dict
            .get_entry(self.id)
            .map_or_else(|| String::from("<unknown>"), |s| s.name.to_string());
        let _ = writeln!(out, "{:indent$}{name} [{}]", "", self.id, indent = depth * 2);
        for child in &self.children {
            child.dump_into(dict, depth + 1, out);
        }
    }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Frame {
    id: SnippetId,
    expected_children: usize,
    actual_children: usize,
}

/// Assembles one [`PaintParamsKey`].
///
/// Sequential and non-reentrant. After [`finish`](Self::finish) the builder
/// is empty and may be reused for the next key.
pub struct PaintParamsKeyBuilder<'d> {
    dict: &'d ShaderCodeDictionary,
    data: Vec<u32>,
    stack: SmallVec<[Frame; 8]>,
    runtime_effects: SmallVec<[SnippetId; 4]>,
    error: Option<ShadingError>,
}

impl<'d> PaintParamsKeyBuilder<'d> {
    #[must_use]
    pub fn new(dict: &'d ShaderCodeDictionary) -> Self {
        Self {
            dict,
            data: Vec::with_capacity(16),
            stack: SmallVec::new(),
            runtime_effects: SmallVec::new(),
            error: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn dictionary(&self) -> &'d ShaderCodeDictionary {
        self.dict
    }

    /// Opens a block as a child of the current block, or as a new root.
    pub fn begin_block(&mut self, id: impl Into<SnippetId>) {
        let id = id.into();
        let Some(snippet) = self.dict.get_entry(id) else {
            self.poison(ShadingError::UnknownSnippet(id.as_u32()));
            return;
        };

        if snippet.is_runtime() && !self.runtime_effects.contains(&id) {
            self.runtime_effects.push(id);
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.actual_children += 1;
        }
        self.stack.push(Frame {
            id,
            expected_children: snippet.num_children,
            actual_children: 0,
        });
        self.data.push(id.as_u32());
    }

    /// Closes the innermost open block.
    pub fn end_block(&mut self) {
        let Some(frame) = self.stack.pop() else {
            self.poison(ShadingError::UnmatchedEndBlock);
            return;
        };
        if frame.expected_children != frame.actual_children {
            let snippet = self
                .dict
                .get_entry(frame.id)
                .map_or_else(|| frame.id.to_string(), |s| s.name.to_string());
            self.poison(ShadingError::ChildCountMismatch {
                snippet,
                expected: frame.expected_children,
                actual: frame.actual_children,
            });
        }
    }

    /// A block with no children.
    pub fn add_block(&mut self, id: impl Into<SnippetId>) {
        self.begin_block(id);
        self.end_block();
    }

    /// Number of currently open blocks.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.error.is_some()
    }

    /// Runtime snippets referenced so far, in first-use order.
    #[must_use]
    pub fn referenced_runtime_effects(&self) -> &[SnippetId] {
        &self.runtime_effects
    }

    fn poison(&mut self, error: ShadingError) {
        log::error!("Paint key contract violation: {error}");
        // The first violation is the interesting one.
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Flattens the emitted blocks into a key and resets the builder.
    pub fn finish(&mut self) -> Result<PaintParamsKey> {
        let data = std::mem::take(&mut self.data);
        let open = self.stack.len();
        self.stack.clear();
        self.runtime_effects.clear();

        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if open > 0 {
            log::error!("Paint key finished with {open} open block(s)");
            return Err(ShadingError::UnbalancedBlocks { open });
        }
        if data.is_empty() {
            return Err(ShadingError::EmptyKey);
        }
        Ok(PaintParamsKey(data))
    }
}

impl fmt::Debug for PaintParamsKeyBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaintParamsKeyBuilder")
            .field("data", &self.data)
            .field("depth", &self.stack.len())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::BuiltInCodeSnippetId as B;

    #[test]
    fn preorder_encoding() {
        let dict = ShaderCodeDictionary::new();
        let mut b = PaintParamsKeyBuilder::new(&dict);
        b.begin_block(B::LocalMatrixShader);
        b.add_block(B::SolidColorShader);
        b.end_block();
        b.add_block(B::CoeffBlender);
        let key = b.finish().unwrap();
        assert_eq!(
            key.as_slice(),
            &[
                B::LocalMatrixShader as u32,
                B::SolidColorShader as u32,
                B::CoeffBlender as u32
            ]
        );
    }

    #[test]
    fn unmatched_end_poisons() {
        let dict = ShaderCodeDictionary::new();
        let mut b = PaintParamsKeyBuilder::new(&dict);
        b.add_block(B::SolidColorShader);
        b.end_block();
        assert!(b.is_poisoned());
        assert!(matches!(b.finish(), Err(ShadingError::UnmatchedEndBlock)));
    }

    #[test]
    fn missing_child_is_reported() {
        let dict = ShaderCodeDictionary::new();
        let mut b = PaintParamsKeyBuilder::new(&dict);
        b.begin_block(B::LocalMatrixShader);
        b.end_block();
        assert!(matches!(
            b.finish(),
            Err(ShadingError::ChildCountMismatch { expected: 1, actual: 0, .. })
        ));
    }

    #[test]
    fn builder_is_reusable_after_finish() {
        let dict = ShaderCodeDictionary::new();
        let mut b = PaintParamsKeyBuilder::new(&dict);
        b.begin_block(B::SolidColorShader);
        assert!(matches!(b.finish(), Err(ShadingError::UnbalancedBlocks { open: 1 })));
        b.add_block(B::PriorOutput);
        assert_eq!(b.finish().unwrap().as_slice(), &[B::PriorOutput as u32]);
    }

    #[test]
    fn blocks_rebuilds_tree() {
        let dict = ShaderCodeDictionary::new();
        let mut b = PaintParamsKeyBuilder::new(&dict);
        b.begin_block(B::ComposeColorFilter);
        b.add_block(B::PriorOutput);
        b.add_block(B::GaussianColorFilter);
        b.end_block();
        let key = b.finish().unwrap();

        let roots = key.blocks(&dict).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].children.len(), 2);
        assert_eq!(roots[0].children[1].id, B::GaussianColorFilter.id());
        assert!(key.dump(&dict).contains("  GaussianColorFilter"));
    }
}
