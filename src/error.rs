//! Reader-level error taxonomy.
//!
//! The parser reports grammar-level failures through `anyhow` with source
//! highlights attached; everything the reader itself can reject is one of
//! the variants below so callers can match on the failure class.

use thiserror::Error;

/// Errors surfaced by the USDA reader and the stage reconstruction pass.
#[derive(Error, Debug)]
pub enum Error {
    /// The input is not parseable USDA.
    #[error("[USDA] malformed input: {0}")]
    MalformedInput(String),

    /// A prim name violated the naming rules (empty, contains `/` or `.`).
    #[error("[USDA] invalid prim name: `{0}`")]
    InvalidName(String),

    /// A metadata key carried a value of the wrong type.
    #[error("[USDA] metadata `{key}` expects {expected}, got {got}")]
    InvalidMetadataType {
        key: &'static str,
        expected: &'static str,
        got: String,
    },

    /// A list-valued metadata key carried an unsupported list-edit qualifier.
    #[error("[USDA] list-edit qualifier `{qual}` is not allowed for `{key}`")]
    InvalidListEditQualifier { key: &'static str, qual: String },

    /// A token-valued metadata key carried a token outside its closed set.
    #[error("[USDA] unknown token `{token}` for `{key}`")]
    UnknownEnumToken { key: &'static str, token: String },

    /// The declared prim type is not in the supported schema set and the
    /// `Model` fallback is disabled.
    #[error("[USDA] unknown prim type `{0}`")]
    UnknownPrimType(String),

    /// A per-schema reconstructor rejected the prim's properties.
    #[error("[USDA] failed to reconstruct {type_name} prim `{name}`: {message}")]
    SchemaReconstructFailed {
        type_name: &'static str,
        name: String,
        message: String,
    },

    /// An intermediate-store index was out of range. Internal invariant.
    #[error("[USDA] prim index {index} out of range (store size {size})")]
    IndexOutOfRange { index: i64, size: usize },

    /// The same prim index appeared in more than one variant.
    #[error("[USDA] prim index {0} is referenced by multiple variants")]
    DuplicateVariantChild(i64),

    /// A configured limit (nesting, token/string length, memory) was hit.
    #[error("[USDA] resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// An operation was called in a state that does not support it, e.g.
    /// `get_as_layer` after the PrimSpec store was consumed.
    #[error("[USDA] {0}")]
    StateViolation(&'static str),
}

impl Error {
    /// Wraps a parser-level failure, flattening the anyhow context chain.
    pub(crate) fn from_parse(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(e) => e,
            Err(other) => Error::MalformedInput(format!("{other:#}")),
        }
    }
}
