//! Nocturne Color System
//!
//! The leaf crate of the dark theme engine. It owns everything that is a
//! pure function of a filter configuration:
//!
//! - [`Rgba`]: color values and CSS color text parsing
//! - [`FilterConfig`] / [`DynamicThemeFix`]: the engine's inbound data contracts
//! - [`ColorMatrix`]: the affine transform derived from a filter
//! - [`ColorModifier`]: memoized `(color text, filter) -> color text`
//! - [`css_filter_value`] and the SVG matrix serializers
//!
//! # Example
//!
//! ```rust
//! use nocturne_theme::{ColorModifier, FilterConfig};
//!
//! let mut modifier = ColorModifier::new();
//! let white = modifier.transform("#000", &FilterConfig::dark()).unwrap();
//! assert_eq!(white, "rgb(255, 255, 255)");
//! ```

pub mod color;
pub mod css_filter;
pub mod error;
pub mod filter;
pub mod matrix;
pub mod modify;

pub use color::{is_named_color, Rgba};
pub use css_filter::{css_filter_value, svg_filter_matrix_value, svg_reverse_filter_matrix_value};
pub use error::{ColorParseError, Result};
pub use filter::{DynamicThemeFix, FilterConfig, FilterMode, MatrixKey, ThemeEngine};
pub use matrix::ColorMatrix;
pub use modify::ColorModifier;
