//! Running the engine over a synthetic page

use anyhow::{Context, Result};
use nocturne_dom::Document;
use nocturne_dynamic::{DynamicTheme, OverrideKind};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::config::NocturneConfig;

/// Frames to run before giving up on a quiet page
const MAX_FRAMES: usize = 8;

/// One stylesheet given to the page
#[derive(Debug, Clone)]
pub struct SourceSheet {
    pub name: String,
    pub css: String,
}

impl SourceSheet {
    pub fn read(path: PathBuf) -> Result<Self> {
        let css = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self {
            name: path.display().to_string(),
            css,
        })
    }
}

/// Everything the engine wrote, in document order
#[derive(Debug, Default, Serialize)]
pub struct RenderOutput {
    /// `(class, css)` of each singleton override
    pub overrides: Vec<(String, String)>,
    /// `(source name, css)` of each managed override
    pub sheets: Vec<(String, String)>,
    /// `(style attribute, style attribute)` before and after
    pub inline: Vec<(String, String)>,
}

impl RenderOutput {
    /// Human-readable listing with one section per element
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let sections = self
            .overrides
            .iter()
            .map(|(class, css)| (format!(".{class}"), css))
            .chain(self.sheets.iter().map(|(name, css)| (name.clone(), css)));
        for (title, css) in sections {
            if css.is_empty() {
                continue;
            }
            out.push_str(&format!("/* {title} */\n{css}\n\n"));
        }
        for (before, after) in &self.inline {
            out.push_str(&format!("/* style=\"{before}\" */\n{after}\n\n"));
        }
        out
    }
}

/// Put the sheets on a fresh page, apply the theme and collect the result
pub fn render(config: &NocturneConfig, sheets: &[SourceSheet]) -> Result<RenderOutput> {
    let mut doc = Document::new();
    let head = doc.head().context("synthetic page has no head")?;
    let body = doc.body().context("synthetic page has no body")?;

    let mut sources = Vec::new();
    for sheet in sheets {
        let style = doc.create_element("style");
        doc.set_text_content(style, &sheet.css)?;
        doc.append_child(head, style)?;
        sources.push((sheet.name.clone(), style));
    }
    let mut inline = Vec::new();
    for text in &config.render.inline {
        let div = doc.create_element("div");
        doc.set_attribute(div, "style", text)?;
        doc.append_child(body, div)?;
        inline.push((text.clone(), div));
    }

    let mut theme = DynamicTheme::new();
    theme.apply(
        &mut doc,
        config.filter.clone(),
        config.fix.clone(),
        config.render.iframe,
    )?;
    let mut frames = 0;
    while theme.needs_frame() && frames < MAX_FRAMES {
        theme.frame(&mut doc);
        frames += 1;
    }
    tracing::debug!(frames, managers = theme.manager_count(), "page settled");

    let mut output = RenderOutput::default();
    for kind in OverrideKind::ALL {
        if let Some(node) = doc.elements_by_class(kind.class_name()).first() {
            output
                .overrides
                .push((kind.class_name().to_string(), doc.text_content(*node)));
        }
    }
    for (name, style) in sources {
        let css = theme
            .sync_element(style)
            .map(|sync| doc.text_content(sync))
            .unwrap_or_default();
        output.sheets.push((name, css));
    }
    for (before, div) in inline {
        let after = doc.get_attribute(div, "style").unwrap_or_default().to_string();
        output.inline.push((before, after));
    }

    theme.remove(&mut doc);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocturne_theme::FilterConfig;

    fn sheet(name: &str, css: &str) -> SourceSheet {
        SourceSheet {
            name: name.to_string(),
            css: css.to_string(),
        }
    }

    #[test]
    fn test_render_sheets() {
        let config = NocturneConfig::default();
        let output = render(
            &config,
            &[
                sheet("site.css", "body { color: black; }"),
                sheet("vars.css", ":root { --ink: black; } p { color: var(--ink); }"),
            ],
        )
        .unwrap();

        assert_eq!(output.overrides.len(), 6);
        assert_eq!(
            output.sheets[0],
            (
                "site.css".to_string(),
                "body { color: rgb(255, 255, 255); }".to_string()
            )
        );
        assert!(output.sheets[1].1.contains("p { color: rgb(255, 255, 255); }"));

        let text = output.to_text();
        assert!(text.contains("/* site.css */\nbody { color: rgb(255, 255, 255); }"));
        assert!(text.contains("/* .darkreader--user-agent */"));
        assert!(!text.contains("/* .darkreader--text */"));
    }

    #[test]
    fn test_render_inline_styles() {
        let mut config = NocturneConfig::default();
        config.render.inline.push("color: black".to_string());
        let output = render(&config, &[]).unwrap();
        assert_eq!(
            output.inline,
            vec![(
                "color: black".to_string(),
                "color: black; --darkreader-inline-color: rgb(255, 255, 255)".to_string()
            )]
        );
    }

    #[test]
    fn test_other_engine_fails() {
        let config = NocturneConfig {
            filter: FilterConfig::dark().with_engine(nocturne_theme::ThemeEngine::CssFilter),
            ..NocturneConfig::default()
        };
        let err = render(&config, &[]).unwrap_err();
        assert!(err.to_string().contains("cssFilter"));
    }
}
