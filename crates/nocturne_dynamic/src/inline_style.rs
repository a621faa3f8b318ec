//! Inline style overrides
//!
//! Colors set through `style`, `bgcolor`, `color`, `fill` and `stroke`
//! attributes cannot be reached by stylesheet rules directly. Each such
//! element gets a `--darkreader-inline-*` custom property holding the
//! transformed color plus a `data-darkreader-inline-*` marker; the singleton
//! inline override element then maps every marker back onto its property.

use indexmap::IndexSet;
use nocturne_css::{parse_declarations, Declaration};
use nocturne_dom::{Document, MutationKind, NodeId, ObserveOptions, ObserverId, Result};
use nocturne_theme::{ColorModifier, FilterConfig};
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::overrides::is_engine_element;

/// Attributes that carry inline colors
pub const INLINE_STYLE_ATTRS: [&str; 5] = ["style", "fill", "stroke", "bgcolor", "color"];

const CUSTOM_PROP_PREFIX: &str = "--darkreader-inline-";

/// One overridable CSS property
struct InlineOverride {
    css_prop: &'static str,
    custom_prop: &'static str,
    data_attr: &'static str,
}

static OVERRIDES: [InlineOverride; 12] = [
    InlineOverride {
        css_prop: "background-color",
        custom_prop: "--darkreader-inline-bgcolor",
        data_attr: "data-darkreader-inline-bgcolor",
    },
    InlineOverride {
        css_prop: "background-image",
        custom_prop: "--darkreader-inline-bgimage",
        data_attr: "data-darkreader-inline-bgimage",
    },
    InlineOverride {
        css_prop: "border-color",
        custom_prop: "--darkreader-inline-border",
        data_attr: "data-darkreader-inline-border",
    },
    InlineOverride {
        css_prop: "border-bottom-color",
        custom_prop: "--darkreader-inline-border-bottom",
        data_attr: "data-darkreader-inline-border-bottom",
    },
    InlineOverride {
        css_prop: "border-left-color",
        custom_prop: "--darkreader-inline-border-left",
        data_attr: "data-darkreader-inline-border-left",
    },
    InlineOverride {
        css_prop: "border-right-color",
        custom_prop: "--darkreader-inline-border-right",
        data_attr: "data-darkreader-inline-border-right",
    },
    InlineOverride {
        css_prop: "border-top-color",
        custom_prop: "--darkreader-inline-border-top",
        data_attr: "data-darkreader-inline-border-top",
    },
    InlineOverride {
        css_prop: "box-shadow",
        custom_prop: "--darkreader-inline-boxshadow",
        data_attr: "data-darkreader-inline-boxshadow",
    },
    InlineOverride {
        css_prop: "color",
        custom_prop: "--darkreader-inline-color",
        data_attr: "data-darkreader-inline-color",
    },
    InlineOverride {
        css_prop: "fill",
        custom_prop: "--darkreader-inline-fill",
        data_attr: "data-darkreader-inline-fill",
    },
    InlineOverride {
        css_prop: "stroke",
        custom_prop: "--darkreader-inline-stroke",
        data_attr: "data-darkreader-inline-stroke",
    },
    InlineOverride {
        css_prop: "outline-color",
        custom_prop: "--darkreader-inline-outline",
        data_attr: "data-darkreader-inline-outline",
    },
];

fn find_override(css_prop: &str) -> Option<&'static InlineOverride> {
    OVERRIDES.iter().find(|o| o.css_prop == css_prop)
}

/// Text of the singleton inline override element
pub fn inline_override_style() -> String {
    OVERRIDES
        .iter()
        .map(|o| {
            format!(
                "[{}] {{\n  {}: var({}) !important;\n}}",
                o.data_attr, o.css_prop, o.custom_prop
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn has_inline_attrs(doc: &Document, node: NodeId) -> bool {
    INLINE_STYLE_ATTRS.iter().any(|attr| doc.has_attribute(node, attr))
}

/// Connected elements carrying any inline color attribute
pub fn inline_elements(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.is_element(n) && !is_engine_element(doc, n) && has_inline_attrs(doc, n))
        .collect()
}

/// Bare 3 or 6 digit hex as used by legacy `bgcolor="fff"`
fn fix_legacy_hex(value: &str) -> String {
    let is_bare_hex = matches!(value.len(), 3 | 6) && value.bytes().all(|b| b.is_ascii_hexdigit());
    if is_bare_hex {
        format!("#{}", value)
    } else {
        value.to_string()
    }
}

/// Host-owned declarations of a `style` attribute
fn host_declarations(doc: &Document, node: NodeId) -> Vec<Declaration> {
    doc.get_attribute(node, "style")
        .map(parse_declarations)
        .unwrap_or_default()
        .into_iter()
        .filter(|d| !d.name.starts_with(CUSTOM_PROP_PREFIX))
        .collect()
}

fn serialize_declarations(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn signature(doc: &Document, node: NodeId) -> String {
    INLINE_STYLE_ATTRS
        .iter()
        .map(|attr| doc.get_attribute(node, attr).unwrap_or("\u{0}"))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Watches inline color attributes anywhere in the document
pub struct InlineStyleWatcher {
    observer: ObserverId,
}

impl InlineStyleWatcher {
    pub fn new(doc: &mut Document) -> Option<Self> {
        let observer = doc.create_observer();
        let options = ObserveOptions::child_list()
            .with_subtree()
            .with_attribute_filter(INLINE_STYLE_ATTRS);
        if let Err(err) = doc.observe(observer, doc.root(), options) {
            warn!(%err, "unable to watch inline styles");
            doc.drop_observer(observer);
            return None;
        }
        Some(Self { observer })
    }

    /// Elements whose inline colors may have changed, in record order
    pub fn take_elements(&mut self, doc: &mut Document) -> Vec<NodeId> {
        let mut elements: IndexSet<NodeId> = IndexSet::new();
        for record in doc.take_records(self.observer) {
            match &record.kind {
                MutationKind::Attributes { .. } => {
                    elements.insert(record.target);
                }
                MutationKind::ChildList { added, .. } => {
                    for &node in added {
                        elements.extend(
                            std::iter::once(node)
                                .chain(doc.descendants(node))
                                .filter(|&n| doc.is_element(n) && has_inline_attrs(doc, n)),
                        );
                    }
                }
                MutationKind::CharacterData { .. } => {}
            }
        }
        elements
            .into_iter()
            .filter(|&n| doc.is_connected(n) && !is_engine_element(doc, n))
            .collect()
    }

    pub fn stop(self, doc: &mut Document) {
        doc.drop_observer(self.observer);
    }
}

/// The page's own `style` text and the text written over it
struct StyleRecord {
    original: Option<String>,
    written: String,
}

/// Applies and remembers per-element inline overrides
#[derive(Default)]
pub struct InlineStyleOverrides {
    signatures: FxHashMap<NodeId, String>,
    records: FxHashMap<NodeId, StyleRecord>,
}

impl InlineStyleOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Forget last-seen signatures so the next pass rewrites everything.
    ///
    /// Original `style` texts are kept for [`Self::restore_all`].
    pub fn clear(&mut self) {
        self.signatures.clear();
    }

    /// Write the custom properties and markers for one element.
    ///
    /// Elements whose inline attributes are unchanged since the last call,
    /// including the engine's own writes, are skipped.
    pub fn override_element(
        &mut self,
        doc: &mut Document,
        node: NodeId,
        filter: &FilterConfig,
        modifier: &mut ColorModifier,
    ) -> Result<()> {
        if self.signatures.get(&node).is_some_and(|s| *s == signature(doc, node)) {
            return Ok(());
        }

        let mut values: Vec<(&'static InlineOverride, String)> = Vec::new();
        let mut set = |css_prop: &str, value: &str, values: &mut Vec<(&'static InlineOverride, String)>| {
            let Some(entry) = find_override(css_prop) else {
                return;
            };
            let modified = modifier.modify_value(value, filter);
            if modified == value {
                return;
            }
            values.retain(|(o, _)| o.css_prop != entry.css_prop);
            values.push((entry, modified));
        };

        if let Some(value) = doc.get_attribute(node, "bgcolor").map(fix_legacy_hex) {
            set("background-color", &value, &mut values);
        }
        if let Some(value) = doc.get_attribute(node, "color").map(fix_legacy_hex) {
            set("color", &value, &mut values);
        }
        if let Some(value) = doc.get_attribute(node, "fill").map(str::to_string) {
            set("fill", &value, &mut values);
        }
        if let Some(value) = doc.get_attribute(node, "stroke").map(str::to_string) {
            set("stroke", &value, &mut values);
        }

        let host = host_declarations(doc, node);
        for decl in &host {
            if decl.name == "background-image" && decl.value.contains("url") {
                continue;
            }
            set(&decl.name, &decl.value, &mut values);
        }

        let mut style = host.clone();
        style.extend(
            values
                .iter()
                .map(|(o, value)| Declaration::new(o.custom_prop, value.clone(), false)),
        );
        let style_text = serialize_declarations(&style);
        let current = doc.get_attribute(node, "style").map(str::to_string);
        if current.as_deref().unwrap_or("") != style_text
            && !(style_text.is_empty() && current.is_none())
        {
            doc.set_attribute(node, "style", &style_text)?;
            self.remember_style(node, current, style_text, &host);
        }

        for entry in &OVERRIDES {
            let wanted = values.iter().any(|(o, _)| o.css_prop == entry.css_prop);
            match (wanted, doc.has_attribute(node, entry.data_attr)) {
                (true, false) => doc.set_attribute(node, entry.data_attr, "")?,
                (false, true) => doc.remove_attribute(node, entry.data_attr)?,
                _ => {}
            }
        }

        trace!(?node, overrides = values.len(), "inline style overridden");
        self.signatures.insert(node, signature(doc, node));
        Ok(())
    }

    /// Track what the page had before `written` replaced `previous`
    fn remember_style(
        &mut self,
        node: NodeId,
        previous: Option<String>,
        written: String,
        host: &[Declaration],
    ) {
        if let Some(record) = self.records.get_mut(&node) {
            if previous.as_deref() == Some(record.written.as_str()) {
                record.written = written;
                return;
            }
        }
        // The page rewrote the attribute since our last write
        let original = match previous {
            Some(text) if text.contains(CUSTOM_PROP_PREFIX) => {
                Some(serialize_declarations(host))
            }
            other => other,
        };
        self.records.insert(node, StyleRecord { original, written });
    }

    /// Take every override back off the page.
    ///
    /// A `style` attribute still holding the last written text gets the
    /// page's original text back, or is removed when there was none.
    pub fn restore_all(&mut self, doc: &mut Document) -> Result<()> {
        let mut records = std::mem::take(&mut self.records);
        let mut nodes: Vec<NodeId> = self.signatures.drain().map(|(node, _)| node).collect();
        let unsigned: Vec<NodeId> = records
            .keys()
            .copied()
            .filter(|node| !nodes.contains(node))
            .collect();
        nodes.extend(unsigned);

        for node in nodes {
            let record = records.remove(&node);
            if !doc.contains_node(node) {
                continue;
            }
            for entry in &OVERRIDES {
                doc.remove_attribute(node, entry.data_attr)?;
            }

            let current = doc.get_attribute(node, "style").map(str::to_string);
            match (record, current) {
                (Some(record), Some(current)) if current == record.written => {
                    match record.original {
                        Some(text) => doc.set_attribute(node, "style", &text)?,
                        None => doc.remove_attribute(node, "style")?,
                    }
                }
                (_, Some(current)) if current.contains(CUSTOM_PROP_PREFIX) => {
                    let text = serialize_declarations(&host_declarations(doc, node));
                    doc.set_attribute(node, "style", &text)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_in_body(doc: &mut Document, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let body = doc.body().unwrap();
        let el = doc.create_element(tag);
        for (name, value) in attrs {
            doc.set_attribute(el, name, value).unwrap();
        }
        doc.append_child(body, el).unwrap();
        el
    }

    #[test]
    fn test_override_style_text() {
        let css = inline_override_style();
        assert!(css.starts_with(
            "[data-darkreader-inline-bgcolor] {\n  background-color: var(--darkreader-inline-bgcolor) !important;\n}"
        ));
        assert_eq!(css.matches("!important").count(), OVERRIDES.len());
    }

    #[test]
    fn test_style_attribute_override() {
        let mut doc = Document::new();
        let div = element_in_body(&mut doc, "div", &[("style", "color: black; margin: 0")]);
        let mut overrides = InlineStyleOverrides::new();
        let mut modifier = ColorModifier::new();

        overrides
            .override_element(&mut doc, div, &FilterConfig::dark(), &mut modifier)
            .unwrap();
        assert_eq!(
            doc.get_attribute(div, "style"),
            Some("color: black; margin: 0; --darkreader-inline-color: rgb(255, 255, 255)")
        );
        assert!(doc.has_attribute(div, "data-darkreader-inline-color"));
        assert!(!doc.has_attribute(div, "data-darkreader-inline-bgcolor"));
    }

    #[test]
    fn test_legacy_attributes() {
        let mut doc = Document::new();
        let td = element_in_body(&mut doc, "td", &[("bgcolor", "fff"), ("color", "inherit")]);
        let mut overrides = InlineStyleOverrides::new();
        let mut modifier = ColorModifier::new();

        overrides
            .override_element(&mut doc, td, &FilterConfig::dark(), &mut modifier)
            .unwrap();
        assert_eq!(
            doc.get_attribute(td, "style"),
            Some("--darkreader-inline-bgcolor: rgb(0, 0, 0)")
        );
        assert!(doc.has_attribute(td, "data-darkreader-inline-bgcolor"));
        assert!(!doc.has_attribute(td, "data-darkreader-inline-color"));
    }

    #[test]
    fn test_own_writes_do_not_retrigger() {
        let mut doc = Document::new();
        let mut watcher = InlineStyleWatcher::new(&mut doc).unwrap();
        let div = element_in_body(&mut doc, "div", &[("style", "background-color: white")]);
        let mut overrides = InlineStyleOverrides::new();
        let mut modifier = ColorModifier::new();
        let filter = FilterConfig::dark();

        let changed = watcher.take_elements(&mut doc);
        assert_eq!(changed, vec![div]);
        overrides
            .override_element(&mut doc, div, &filter, &mut modifier)
            .unwrap();

        let observer = doc.create_observer();
        doc.observe(observer, div, ObserveOptions::attributes()).unwrap();
        for node in watcher.take_elements(&mut doc) {
            overrides
                .override_element(&mut doc, node, &filter, &mut modifier)
                .unwrap();
        }
        assert!(doc.take_records(observer).is_empty());
    }

    #[test]
    fn test_removed_color_drops_marker() {
        let mut doc = Document::new();
        let div = element_in_body(&mut doc, "div", &[("style", "color: black")]);
        let mut overrides = InlineStyleOverrides::new();
        let mut modifier = ColorModifier::new();
        let filter = FilterConfig::dark();
        overrides
            .override_element(&mut doc, div, &filter, &mut modifier)
            .unwrap();

        doc.set_attribute(div, "style", "margin: 0").unwrap();
        overrides
            .override_element(&mut doc, div, &filter, &mut modifier)
            .unwrap();
        assert_eq!(doc.get_attribute(div, "style"), Some("margin: 0"));
        assert!(!doc.has_attribute(div, "data-darkreader-inline-color"));
    }

    #[test]
    fn test_restore_all() {
        let mut doc = Document::new();
        let svg = element_in_body(&mut doc, "rect", &[("fill", "red"), ("stroke", "#000")]);
        let mut overrides = InlineStyleOverrides::new();
        let mut modifier = ColorModifier::new();
        overrides
            .override_element(&mut doc, svg, &FilterConfig::dark(), &mut modifier)
            .unwrap();
        assert!(doc.has_attribute(svg, "data-darkreader-inline-fill"));
        assert!(doc.has_attribute(svg, "data-darkreader-inline-stroke"));
        assert_eq!(inline_elements(&doc), vec![svg]);

        overrides.restore_all(&mut doc).unwrap();
        assert!(overrides.is_empty());
        assert!(!doc.has_attribute(svg, "data-darkreader-inline-fill"));
        assert_eq!(doc.get_attribute(svg, "style"), None);
        assert_eq!(doc.get_attribute(svg, "fill"), Some("red"));
    }

    #[test]
    fn test_restore_puts_back_original_text() {
        let mut doc = Document::new();
        let table = element_in_body(&mut doc, "table", &[("bgcolor", "white")]);
        let div = element_in_body(&mut doc, "div", &[("style", "color:black;margin:0")]);
        let mut overrides = InlineStyleOverrides::new();
        let mut modifier = ColorModifier::new();
        for node in [table, div] {
            overrides
                .override_element(&mut doc, node, &FilterConfig::dark(), &mut modifier)
                .unwrap();
        }
        assert!(doc.has_attribute(table, "style"));
        assert_ne!(doc.get_attribute(div, "style"), Some("color:black;margin:0"));

        overrides.clear();
        overrides
            .override_element(&mut doc, div, &FilterConfig::dark(), &mut modifier)
            .unwrap();

        overrides.restore_all(&mut doc).unwrap();
        assert_eq!(doc.get_attribute(table, "style"), None);
        assert_eq!(doc.get_attribute(table, "bgcolor"), Some("white"));
        assert_eq!(doc.get_attribute(div, "style"), Some("color:black;margin:0"));
    }

    #[test]
    fn test_restore_keeps_page_rewrites() {
        let mut doc = Document::new();
        let div = element_in_body(&mut doc, "div", &[("style", "color: black")]);
        let mut overrides = InlineStyleOverrides::new();
        let mut modifier = ColorModifier::new();
        overrides
            .override_element(&mut doc, div, &FilterConfig::dark(), &mut modifier)
            .unwrap();

        doc.set_attribute(div, "style", "color: white; --darkreader-inline-color: rgb(0, 0, 0)")
            .unwrap();
        overrides.restore_all(&mut doc).unwrap();
        assert_eq!(doc.get_attribute(div, "style"), Some("color: white"));
    }
}
