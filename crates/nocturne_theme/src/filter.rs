//! Filter configuration and per-site fixes
//!
//! These are the two inbound data contracts of the engine. Both are plain
//! immutable values: a settings change replaces the whole [`FilterConfig`].

use serde::{Deserialize, Serialize};

/// Light or dark output scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Light,
    #[default]
    Dark,
}

/// Which theme generator should handle a configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThemeEngine {
    CssFilter,
    SvgFilter,
    StaticTheme,
    #[default]
    DynamicTheme,
}

impl ThemeEngine {
    pub fn name(&self) -> &'static str {
        match self {
            ThemeEngine::CssFilter => "cssFilter",
            ThemeEngine::SvgFilter => "svgFilter",
            ThemeEngine::StaticTheme => "staticTheme",
            ThemeEngine::DynamicTheme => "dynamicTheme",
        }
    }
}

fn default_percent() -> u16 {
    100
}

/// User-chosen dark mode parameters
///
/// Percentages are in `0..=100` for grayscale and sepia. Brightness and
/// contrast default to 100 (no change) and may exceed it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    #[serde(default = "default_percent")]
    pub brightness: u16,
    #[serde(default = "default_percent")]
    pub contrast: u16,
    pub grayscale: u16,
    pub sepia: u16,
    pub engine: ThemeEngine,
    /// Raw CSS appended verbatim to the override element
    pub stylesheet: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::dark()
    }
}

impl FilterConfig {
    /// Dark mode with neutral adjustments
    pub fn dark() -> Self {
        Self {
            mode: FilterMode::Dark,
            brightness: 100,
            contrast: 100,
            grayscale: 0,
            sepia: 0,
            engine: ThemeEngine::DynamicTheme,
            stylesheet: None,
        }
    }

    /// Light mode with neutral adjustments
    pub fn light() -> Self {
        Self {
            mode: FilterMode::Light,
            ..Self::dark()
        }
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_brightness(mut self, brightness: u16) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn with_contrast(mut self, contrast: u16) -> Self {
        self.contrast = contrast;
        self
    }

    pub fn with_grayscale(mut self, grayscale: u16) -> Self {
        self.grayscale = grayscale;
        self
    }

    pub fn with_sepia(mut self, sepia: u16) -> Self {
        self.sepia = sepia;
        self
    }

    pub fn with_engine(mut self, engine: ThemeEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn is_dark(&self) -> bool {
        self.mode == FilterMode::Dark
    }

    /// The fields that affect color output, used as a cache key
    pub fn matrix_key(&self) -> MatrixKey {
        MatrixKey {
            mode: self.mode,
            brightness: self.brightness,
            contrast: self.contrast,
            grayscale: self.grayscale,
            sepia: self.sepia,
        }
    }
}

/// Numeric tuple of the filter fields that determine a color matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatrixKey {
    pub mode: FilterMode,
    pub brightness: u16,
    pub contrast: u16,
    pub grayscale: u16,
    pub sepia: u16,
}

/// Per-site override payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicThemeFix {
    /// Raw CSS that may contain `${color}` placeholders
    pub css: String,
    /// Selectors whose elements are force-inverted in dark mode
    pub invert: Vec<String>,
}

impl DynamicThemeFix {
    pub fn new(css: impl Into<String>, invert: Vec<String>) -> Self {
        Self {
            css: css.into(),
            invert,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.css.trim().is_empty() && self.invert.is_empty()
    }
}
