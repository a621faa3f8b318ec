//! Color error types

use thiserror::Error;

/// Raised when a piece of text is not a color this crate understands.
///
/// Callers substituting colors into stylesheet text are expected to recover
/// from this locally and keep the original literal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    /// Input was empty or whitespace only
    #[error("Empty color value")]
    Empty,

    /// Input did not match any supported color syntax
    #[error("Unrecognized color syntax: {0:?}")]
    Unrecognized(String),
}

/// Result type for color parsing
pub type Result<T> = std::result::Result<T, ColorParseError>;
