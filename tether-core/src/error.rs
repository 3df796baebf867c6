//! Error types shared by the observing core, bindings and models.

use thiserror::Error;

/// Errors raised synchronously by the core APIs.
///
/// None of these are swallowed internally; they always reach the caller
/// of the operation that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed input to a core API.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A key path was empty or contained an empty segment.
    #[error("Empty key path")]
    EmptyKeyPath,

    /// A write was rejected because the value does not match the
    /// declared schema type.
    #[error("Invalid type for {key}")]
    TypeValidation {
        /// Key whose declared type rejected the value.
        key: String,
    },

    /// A model with this name has already been defined.
    #[error("Model already defined: {0}")]
    DuplicateModel(String),

    /// No model with this name has been defined.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The model does not declare the requested key.
    #[error("Unknown key {key} for model {model}")]
    UnknownKey {
        /// Model name.
        model: String,
        /// Requested key.
        key: String,
    },

    /// A write was attempted through a read-only path.
    #[error("Key is not mutable: {0}")]
    ImmutableKey(String),

    /// An abstract operation was called without an implementation.
    #[error("Not implemented: {0}")]
    Unimplemented(&'static str),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Advisory validation outcome produced by a key's validator hook.
///
/// This is a plain value handed back to UI code, not something the set
/// path ever raises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Key that failed validation.
    pub key: String,
    /// Human readable description.
    pub description: String,
}

impl ValidationFailure {
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.description)
    }
}
