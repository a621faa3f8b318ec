//! CSS and SVG filter values derived from a [`FilterConfig`]

use crate::filter::{FilterConfig, FilterMode};
use crate::matrix::ColorMatrix;

/// Value for a CSS `filter:` declaration, `None` when every term is neutral
pub fn css_filter_value(config: &FilterConfig) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();

    if config.mode == FilterMode::Dark {
        terms.push("invert(100%) hue-rotate(180deg)".to_string());
    }
    if config.brightness != 100 {
        terms.push(format!("brightness({}%)", config.brightness));
    }
    if config.contrast != 100 {
        terms.push(format!("contrast({}%)", config.contrast));
    }
    if config.grayscale != 0 {
        terms.push(format!("grayscale({}%)", config.grayscale));
    }
    if config.sepia != 0 {
        terms.push(format!("sepia({}%)", config.sepia));
    }

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// `feColorMatrix` values for the full filter
pub fn svg_filter_matrix_value(config: &FilterConfig) -> String {
    ColorMatrix::from_filter(config).to_svg_values()
}

/// `feColorMatrix` values that undo the dark-mode inversion
pub fn svg_reverse_filter_matrix_value() -> String {
    ColorMatrix::reverse().to_svg_values()
}
