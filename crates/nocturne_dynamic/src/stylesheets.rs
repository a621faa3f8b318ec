//! Generated stylesheet text for the singleton override elements

use std::sync::OnceLock;

use nocturne_css::validate_selector;
use nocturne_theme::{css_filter_value, ColorModifier, DynamicThemeFix, FilterConfig, Rgba};
use regex::{Captures, Regex};
use tracing::warn;

fn color(modifier: &mut ColorModifier, filter: &FilterConfig, rgb: [u8; 3]) -> String {
    let [r, g, b] = rgb;
    modifier
        .transform_rgba(Rgba::rgb(r, g, b), filter)
        .to_string()
}

/// Dark page background shown until real overrides are rendered.
///
/// The strict form covers every descendant of `<body>`; the relaxed form only
/// direct children, for use while external sheets load.
pub fn fallback_style(modifier: &mut ColorModifier, filter: &FilterConfig, strict: bool) -> String {
    let targets = if strict { "body *" } else { "body > *" };
    [
        format!("html, body, {} {{", targets),
        format!(
            "    background-color: {} !important;",
            color(modifier, filter, [255, 255, 255])
        ),
        format!(
            "    border-color: {} !important;",
            color(modifier, filter, [64, 64, 64])
        ),
        format!("    color: {} !important;", color(modifier, filter, [0, 0, 0])),
        "}".to_string(),
    ]
    .join("\n")
}

/// Transformed browser defaults
pub fn user_agent_style(modifier: &mut ColorModifier, filter: &FilterConfig, is_iframe: bool) -> String {
    let background = color(modifier, filter, [255, 255, 255]);
    let text = color(modifier, filter, [0, 0, 0]);
    let mut lines: Vec<String> = Vec::new();

    if !is_iframe {
        lines.push("html {".into());
        lines.push(format!("    background-color: {} !important;", background));
        lines.push("}".into());
    }
    lines.push(format!(
        "{}input, textarea, select, button {{",
        if is_iframe { "" } else { "html, body, " }
    ));
    lines.push(format!("    background-color: {};", background));
    lines.push("}".into());

    lines.push("html, body, input, textarea, select, button {".into());
    lines.push(format!(
        "    border-color: {};",
        color(modifier, filter, [76, 76, 76])
    ));
    lines.push(format!("    color: {};", text));
    lines.push("}".into());

    lines.push("a {".into());
    lines.push(format!("    color: {};", color(modifier, filter, [0, 64, 255])));
    lines.push("}".into());

    lines.push("table {".into());
    lines.push(format!(
        "    border-color: {};",
        color(modifier, filter, [128, 128, 128])
    ));
    lines.push("}".into());

    lines.push("::placeholder {".into());
    lines.push(format!(
        "    color: {};",
        color(modifier, filter, [169, 169, 169])
    ));
    lines.push("}".into());

    let selection_bg = color(modifier, filter, [0, 96, 212]);
    let selection_fg = color(modifier, filter, [255, 255, 255]);
    for selection in ["::selection", "::-moz-selection"] {
        lines.push(format!("{} {{", selection));
        lines.push(format!("    background-color: {};", selection_bg));
        lines.push(format!("    color: {};", selection_fg));
        lines.push("}".into());
    }

    lines.push("input:-webkit-autofill,".into());
    lines.push("textarea:-webkit-autofill,".into());
    lines.push("select:-webkit-autofill {".into());
    lines.push(format!(
        "    background-color: {} !important;",
        color(modifier, filter, [250, 255, 189])
    ));
    lines.push(format!("    color: {} !important;", text));
    lines.push("}".into());

    lines.join("\n")
}

/// `selectors { filter: ... !important; }` for forced-invert selectors.
///
/// Empty outside dark mode or when no selector survives validation.
pub fn invert_style(fix: &DynamicThemeFix, filter: &FilterConfig) -> String {
    if !filter.is_dark() || fix.invert.is_empty() {
        return String::new();
    }

    let selectors: Vec<&str> = fix
        .invert
        .iter()
        .map(|s| s.trim())
        .filter(|selector| match validate_selector(selector) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "skipping invert selector");
                false
            }
        })
        .collect();
    if selectors.is_empty() {
        return String::new();
    }

    let adjusted = filter
        .clone()
        .with_contrast(filter.contrast.saturating_sub(10).min(100));
    let Some(value) = css_filter_value(&adjusted) else {
        return String::new();
    };
    format!(
        "{} {{\n    filter: {} !important;\n}}",
        selectors.join(", "),
        value
    )
}

fn template_regex() -> Option<&'static Regex> {
    static TEMPLATE: OnceLock<Option<Regex>> = OnceLock::new();
    TEMPLATE
        .get_or_init(|| Regex::new(r"\$\{(.+?)\}").ok())
        .as_ref()
}

/// Replace `${color}` placeholders with transformed colors.
///
/// Placeholders that do not parse keep their inner text.
pub fn replace_css_templates(css: &str, modifier: &mut ColorModifier, filter: &FilterConfig) -> String {
    let Some(template) = template_regex() else {
        return css.to_string();
    };
    template
        .replace_all(css, |caps: &Captures<'_>| {
            let raw = caps[1].trim();
            match modifier.transform(raw, filter) {
                Ok(value) => value,
                Err(err) => {
                    warn!(%err, template = raw, "unable to transform template color");
                    raw.to_string()
                }
            }
        })
        .into_owned()
}

/// Fix CSS with templates expanded, then the filter's raw stylesheet
pub fn override_style(fix: &DynamicThemeFix, modifier: &mut ColorModifier, filter: &FilterConfig) -> String {
    let mut css = if fix.css.trim().is_empty() {
        String::new()
    } else {
        replace_css_templates(&fix.css, modifier, filter)
    };
    if let Some(extra) = filter.stylesheet.as_deref().filter(|s| !s.trim().is_empty()) {
        if !css.is_empty() {
            css.push('\n');
        }
        css.push_str(extra);
    }
    css
}
