//! Nocturne CSS Layer
//!
//! Text-level CSS handling for the dark theme engine:
//!
//! - [`parse_stylesheet`]: rule tree with diagnostics, tolerant of real-world CSS
//! - [`parse_declarations`]: inline `style` attribute contents
//! - [`split_rules`]: top-level rule texts, as a CSSOM rule list holds them
//! - [`validate_selector`]: selector list grammar check
//! - [`VariableResolver`]: custom property expansion to closed form

pub mod error;
pub mod selector;
pub mod stylesheet;
pub mod variables;

pub use error::{ParseError, SelectorError, Severity, VariableCycleExceeded};
pub use selector::validate_selector;
pub use stylesheet::{
    parse_declarations, parse_stylesheet, split_rules, AtBlockRule, CssParseResult, CssRule,
    Declaration, GroupRule, StyleRule, Stylesheet,
};
pub use variables::{
    extract_variables, has_var_reference, referenced_names, replace_variables, resolve,
    var_references, ResolveReport, VarReference, VariableMap, VariableResolver,
    MAX_RESOLVE_PASSES,
};
