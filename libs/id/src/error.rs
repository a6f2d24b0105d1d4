//! Error types for identity parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating a Run identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The key string is empty.
    #[error("run key cannot be empty")]
    Empty,

    /// The key is missing the `/` separator.
    #[error("run key missing '/' separator between namespace and name")]
    MissingSeparator,

    /// The namespace portion is not a valid DNS-1123 label.
    #[error("invalid namespace '{value}': {reason}")]
    InvalidNamespace { value: String, reason: &'static str },

    /// The name portion is not a valid DNS-1123 subdomain.
    #[error("invalid name '{value}': {reason}")]
    InvalidName { value: String, reason: &'static str },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error concerns the namespace portion.
    pub fn is_namespace_error(&self) -> bool {
        matches!(self, IdError::InvalidNamespace { .. })
    }
}
