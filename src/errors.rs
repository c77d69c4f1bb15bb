//! Error Types
//!
//! This module defines the error types used throughout the shading core.
//!
//! # Overview
//!
//! The main error type [`ShadingError`] covers the recoverable failure modes:
//! - Key construction contract violations (reported by `finish()`)
//! - Stale or malformed combination-option handles
//! - Invalid precompilation configuration
//!
//! Uniform-layout mismatches detected by the gatherer's validation mode are
//! *not* represented here: they are fatal and panic immediately.
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_shading::errors::Result;
//!
//! fn build() -> Result<()> {
//!     let key = builder.finish()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::runtime_effect::RuntimeEffectKind;

/// The main error type for the shading core.
#[derive(Error, Debug)]
pub enum ShadingError {
    // ========================================================================
    // Key Builder Errors
    // ========================================================================
    /// `finish()` was called while blocks were still open.
    #[error("Unbalanced block nesting: {open} block(s) still open")]
    UnbalancedBlocks {
        /// Number of `begin_block` calls without a matching `end_block`.
        open: usize,
    },

    /// `end_block()` was called with no open block.
    #[error("end_block() called without a matching begin_block()")]
    UnmatchedEndBlock,

    /// A block was closed with a different number of children than its
    /// snippet declares.
    #[error("Snippet '{snippet}' expects {expected} child block(s), got {actual}")]
    ChildCountMismatch {
        /// Name of the offending snippet
        snippet: String,
        /// Child count declared by the snippet
        expected: usize,
        /// Child count actually emitted
        actual: usize,
    },

    /// A key with no root blocks was finished.
    #[error("Paint key is empty")]
    EmptyKey,

    /// A snippet ID that was never registered with the dictionary.
    #[error("Unknown code snippet ID: {0}")]
    UnknownSnippet(u32),

    // ========================================================================
    // Runtime Effect Errors
    // ========================================================================
    /// A uniform name not declared by the runtime program.
    #[error("Runtime effect '{effect}' declares no uniform named '{name}'")]
    UnknownUniform {
        /// Debug name of the program
        effect: String,
        /// Requested uniform
        name: String,
    },

    /// Uniform data whose size differs from the declared uniform.
    #[error("Uniform '{name}' expects {expected} byte(s), got {actual}")]
    UniformSizeMismatch {
        /// Uniform name
        name: String,
        /// Declared CPU size
        expected: usize,
        /// Supplied size
        actual: usize,
    },

    /// A child effect whose kind differs from the declared child slot.
    #[error("Runtime effect child {index} has the wrong kind")]
    ChildTypeMismatch {
        /// Child slot index
        index: usize,
    },

    /// A runtime program used where a different kind of program is required.
    #[error("Runtime effect {id} is a {actual:?} program, expected {expected:?}")]
    RuntimeEffectKindMismatch {
        /// Snippet ID of the program
        id: u32,
        /// Kind required by the caller
        expected: RuntimeEffectKind,
        /// Kind the program was built as
        actual: RuntimeEffectKind,
    },

    // ========================================================================
    // Combination Builder Errors
    // ========================================================================
    /// A combination option handle was used after `reset()`.
    #[error("Combination option handle is stale (builder was reset)")]
    StaleOption,

    /// A child slot index outside the option's child slots.
    #[error("Child slot {slot} out of range (option has {num_slots} slot(s))")]
    InvalidChildSlot {
        /// Requested slot
        slot: usize,
        /// Number of child slots of the option
        num_slots: usize,
    },

    /// The option tree describes more combinations than fit in a `u64`.
    #[error("Combination count overflows u64")]
    TooManyCombinations,

    /// An inverted or empty gradient stop range.
    #[error("Invalid gradient stop range: {min}..={max}")]
    InvalidStopRange {
        /// Lower bound
        min: u32,
        /// Upper bound
        max: u32,
    },

    /// A stop range was supplied for a shader type that is not a gradient.
    #[error("Shader type {0} is not a gradient")]
    NotAGradient(&'static str),

    /// Option parameters that do not apply to the given shader type.
    #[error("Option parameters not supported for shader type {0}")]
    UnsupportedOption(&'static str),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Precompilation config parsing error.
    #[error("Precompile config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Alias for `Result<T, ShadingError>`.
pub type Result<T> = std::result::Result<T, ShadingError>;
