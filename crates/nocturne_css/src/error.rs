//! Error and diagnostic types for the CSS layer

use std::fmt;

use thiserror::Error;

/// Severity level for parse diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A construct could not be parsed and was dropped
    Error,
    /// Parsing recovered but something was skipped or repaired
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Diagnostic produced while parsing stylesheet text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub severity: Severity,
    pub message: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Input near the failure, truncated
    pub fragment: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CSS {}: line {}, column {}: {}",
            self.severity, self.line, self.column, self.message
        )?;
        if !self.fragment.is_empty() {
            write!(f, "\n  Near: \"{}\"", self.fragment)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    /// Build a diagnostic located at `remaining` inside `original`
    pub(crate) fn at(
        severity: Severity,
        message: impl Into<String>,
        original: &str,
        remaining: &str,
    ) -> Self {
        let (line, column, fragment) = calculate_position(original, remaining);
        Self {
            severity,
            message: message.into(),
            line,
            column,
            fragment,
        }
    }
}

/// Calculate line and column of `fragment`, a suffix of `original`
fn calculate_position(original: &str, fragment: &str) -> (usize, usize, String) {
    let offset = original.len().saturating_sub(fragment.len());
    let consumed = original.get(..offset).unwrap_or("");

    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rfind('\n')
        .map(|pos| offset - pos)
        .unwrap_or(offset + 1);

    let preview: String = fragment.chars().take(30).collect();
    (line, column, preview)
}

/// A selector list that does not follow selector grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,

    #[error("Invalid selector {selector:?} near {near:?}")]
    Invalid { selector: String, near: String },
}

/// Variable resolution left some names unexpanded
///
/// Names on a reference cycle, or still referencing others when the pass
/// cap was hit. Non-fatal: the listed variables keep their reference text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Variable resolution stopped after {passes} passes; unresolved: {}", .names.join(", "))]
pub struct VariableCycleExceeded {
    pub passes: usize,
    pub names: Vec<String>,
}
