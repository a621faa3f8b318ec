//! Engine error types

use nocturne_theme::ThemeEngine;
use thiserror::Error;

/// Failures surfaced to the caller of the dynamic theme engine.
///
/// Everything else (unparsable colors, variable cycles, inaccessible sheets,
/// invalid tree operations inside the engine) is logged and recovered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine '{}' is not implemented by the dynamic theme", .0.name())]
    UnsupportedEngine(ThemeEngine),
}

pub type Result<T> = std::result::Result<T, EngineError>;
