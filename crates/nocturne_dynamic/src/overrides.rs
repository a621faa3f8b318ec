//! Singleton override elements
//!
//! Six `<style class="darkreader darkreader--{kind}">` elements live in
//! `<head>`: the fallback first, then user-agent, text, invert and inline
//! directly after it, and the fix override as the last child. Each one has a
//! position watcher.

use nocturne_dom::{Document, NodeId, Result};
use tracing::debug;

use crate::position::{PositionCheck, PositionWatcher};

/// Class shared by every element the engine injects
pub const ENGINE_CLASS: &str = "darkreader";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverrideKind {
    Fallback,
    UserAgent,
    Text,
    Invert,
    Inline,
    Override,
}

impl OverrideKind {
    /// Document order
    pub const ALL: [OverrideKind; 6] = [
        OverrideKind::Fallback,
        OverrideKind::UserAgent,
        OverrideKind::Text,
        OverrideKind::Invert,
        OverrideKind::Inline,
        OverrideKind::Override,
    ];

    pub fn class_name(&self) -> &'static str {
        match self {
            OverrideKind::Fallback => "darkreader--fallback",
            OverrideKind::UserAgent => "darkreader--user-agent",
            OverrideKind::Text => "darkreader--text",
            OverrideKind::Invert => "darkreader--invert",
            OverrideKind::Inline => "darkreader--inline",
            OverrideKind::Override => "darkreader--override",
        }
    }

    fn index(&self) -> usize {
        match self {
            OverrideKind::Fallback => 0,
            OverrideKind::UserAgent => 1,
            OverrideKind::Text => 2,
            OverrideKind::Invert => 3,
            OverrideKind::Inline => 4,
            OverrideKind::Override => 5,
        }
    }
}

/// Texts for one full set of overrides
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverrideTexts {
    pub fallback: String,
    pub user_agent: String,
    pub text: String,
    pub invert: String,
    pub inline: String,
    pub fix: String,
}

impl OverrideTexts {
    fn get(&self, kind: OverrideKind) -> &str {
        match kind {
            OverrideKind::Fallback => &self.fallback,
            OverrideKind::UserAgent => &self.user_agent,
            OverrideKind::Text => &self.text,
            OverrideKind::Invert => &self.invert,
            OverrideKind::Inline => &self.inline,
            OverrideKind::Override => &self.fix,
        }
    }
}

/// Create a `<style>` marked as one of the engine's own
pub fn create_engine_style(doc: &mut Document, modifier_class: &str) -> Result<NodeId> {
    let style = doc.create_element("style");
    doc.set_attribute(style, "class", &format!("{} {}", ENGINE_CLASS, modifier_class))?;
    doc.set_attribute(style, "media", "screen")?;
    Ok(style)
}

/// Whether `node` was injected by the engine
pub fn is_engine_element(doc: &Document, node: NodeId) -> bool {
    doc.has_class(node, ENGINE_CLASS)
}

/// Owner of the six singleton elements
#[derive(Default)]
pub struct StaticOverrides {
    elements: [Option<NodeId>; 6],
    watchers: Vec<PositionWatcher>,
}

impl StaticOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, kind: OverrideKind) -> Option<NodeId> {
        self.elements[kind.index()]
    }

    /// Find the live element for `kind`, or create a detached one
    fn create_or_update(&mut self, doc: &mut Document, kind: OverrideKind) -> Result<NodeId> {
        let existing = self
            .element(kind)
            .filter(|&id| doc.contains_node(id))
            .or_else(|| doc.elements_by_class(kind.class_name()).into_iter().next());
        let id = match existing {
            Some(id) => id,
            None => create_engine_style(doc, kind.class_name())?,
        };
        self.elements[kind.index()] = Some(id);
        Ok(id)
    }

    fn set_text(doc: &mut Document, id: NodeId, text: &str) -> Result<()> {
        if doc.text_content(id) != text {
            doc.replace_text(id, text)?;
        }
        Ok(())
    }

    /// No `<head>` yet: the fallback goes straight under `<html>`
    pub fn install_fallback_only(&mut self, doc: &mut Document, css: &str) -> Result<()> {
        let id = self.create_or_update(doc, OverrideKind::Fallback)?;
        Self::set_text(doc, id, css)?;
        if doc.parent(id).is_none() {
            if let Some(html) = doc.document_element() {
                doc.append_child(html, id)?;
            }
        }
        debug!("fallback installed before head");
        Ok(())
    }

    /// Create or refresh all six elements inside `head` and watch them
    pub fn install(&mut self, doc: &mut Document, head: NodeId, texts: &OverrideTexts) -> Result<()> {
        self.stop_watching(doc);

        let mut previous: Option<NodeId> = None;
        for kind in OverrideKind::ALL {
            let id = self.create_or_update(doc, kind)?;
            Self::set_text(doc, id, texts.get(kind))?;

            match (kind, previous) {
                (OverrideKind::Override, _) => {
                    if doc.parent(id) != Some(head) || doc.next_sibling(id).is_some() {
                        doc.append_child(head, id)?;
                    }
                }
                (_, None) => {
                    if doc.parent(id) != Some(head) || doc.previous_sibling(id).is_some() {
                        let first = doc.first_child(head);
                        doc.insert_before(head, id, first)?;
                    }
                }
                (_, Some(prev)) => {
                    if doc.parent(id) != Some(head) || doc.previous_sibling(id) != Some(prev) {
                        doc.insert_after(id, prev)?;
                    }
                }
            }
            previous = Some(id);
        }

        for kind in OverrideKind::ALL {
            let Some(id) = self.element(kind) else {
                continue;
            };
            let last = kind == OverrideKind::Override;
            if let Some(watcher) = PositionWatcher::new(doc, id, last) {
                self.watchers.push(watcher);
            }
        }
        Ok(())
    }

    /// Replace one element's text in place
    pub fn update_text(&mut self, doc: &mut Document, kind: OverrideKind, text: &str) -> Result<()> {
        match self.element(kind).filter(|&id| doc.contains_node(id)) {
            Some(id) => Self::set_text(doc, id, text),
            None => Ok(()),
        }
    }

    /// Fallback text, if the element exists
    pub fn fallback_text(&self, doc: &Document) -> Option<String> {
        self.element(OverrideKind::Fallback)
            .filter(|&id| doc.contains_node(id))
            .map(|id| doc.text_content(id))
    }

    /// Empty the fallback once real overrides are in place
    pub fn clean_fallback(&mut self, doc: &mut Document) -> Result<()> {
        debug!("cleaning fallback style");
        self.update_text(doc, OverrideKind::Fallback, "")
    }

    /// Run every position watcher; returns how many restored their node
    pub fn check_positions(&mut self, doc: &mut Document) -> usize {
        self.watchers
            .iter_mut()
            .map(|w| w.check(doc))
            .filter(|check| *check == PositionCheck::Restored)
            .count()
    }

    pub fn stop_watching(&mut self, doc: &mut Document) {
        for mut watcher in self.watchers.drain(..) {
            watcher.stop(doc);
        }
    }

    /// Detach the fallback, wherever it is
    pub fn remove_fallback(&mut self, doc: &mut Document) -> Result<()> {
        self.remove_kind(doc, OverrideKind::Fallback)
    }

    /// Detach every element except the fallback
    pub fn remove_others(&mut self, doc: &mut Document) -> Result<()> {
        for kind in &OverrideKind::ALL[1..] {
            self.remove_kind(doc, *kind)?;
        }
        Ok(())
    }

    fn remove_kind(&mut self, doc: &mut Document, kind: OverrideKind) -> Result<()> {
        if let Some(id) = self.elements[kind.index()].take() {
            if doc.parent(id).is_some() {
                doc.remove(id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts() -> OverrideTexts {
        OverrideTexts {
            fallback: "fallback".into(),
            user_agent: "ua".into(),
            text: String::new(),
            invert: String::new(),
            inline: "inline".into(),
            fix: "fix".into(),
        }
    }

    fn head_classes(doc: &Document) -> Vec<String> {
        let head = doc.head().unwrap();
        doc.children(head)
            .iter()
            .map(|&c| doc.get_attribute(c, "class").unwrap_or("").to_string())
            .collect()
    }

    #[test]
    fn test_install_order() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let page_style = doc.create_element("style");
        doc.append_child(head, page_style).unwrap();

        let mut overrides = StaticOverrides::new();
        overrides.install(&mut doc, head, &texts()).unwrap();

        let classes = head_classes(&doc);
        assert_eq!(classes.len(), 7);
        for (i, kind) in OverrideKind::ALL[..5].iter().enumerate() {
            assert_eq!(classes[i], format!("darkreader {}", kind.class_name()));
        }
        assert_eq!(classes[5], "");
        assert_eq!(classes[6], "darkreader darkreader--override");
        assert_eq!(
            doc.get_attribute(overrides.element(OverrideKind::Inline).unwrap(), "media"),
            Some("screen")
        );
    }

    #[test]
    fn test_reinstall_reuses_elements() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let mut overrides = StaticOverrides::new();
        overrides.install(&mut doc, head, &texts()).unwrap();
        overrides.install(&mut doc, head, &texts()).unwrap();
        assert_eq!(doc.elements_by_class(ENGINE_CLASS).len(), 6);
    }

    #[test]
    fn test_fallback_moves_into_head() {
        let mut doc = Document::without_head();
        let mut overrides = StaticOverrides::new();
        overrides.install_fallback_only(&mut doc, "fallback").unwrap();
        let html = doc.document_element().unwrap();
        let fallback = overrides.element(OverrideKind::Fallback).unwrap();
        assert_eq!(doc.parent(fallback), Some(html));

        let head = doc.create_element("head");
        doc.insert_before(html, head, None).unwrap();
        overrides.install(&mut doc, head, &texts()).unwrap();
        assert_eq!(doc.first_child(head), Some(fallback));
        assert_eq!(doc.elements_by_class(ENGINE_CLASS).len(), 6);
    }

    #[test]
    fn test_watchers_restore_and_remove() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let mut overrides = StaticOverrides::new();
        overrides.install(&mut doc, head, &texts()).unwrap();

        let invert = overrides.element(OverrideKind::Invert).unwrap();
        doc.remove(invert).unwrap();
        assert!(overrides.check_positions(&mut doc) >= 1);
        assert_eq!(doc.parent(invert), Some(head));

        overrides.clean_fallback(&mut doc).unwrap();
        assert_eq!(overrides.fallback_text(&doc).as_deref(), Some(""));

        overrides.stop_watching(&mut doc);
        overrides.remove_others(&mut doc).unwrap();
        overrides.remove_fallback(&mut doc).unwrap();
        assert!(doc.elements_by_class(ENGINE_CLASS).is_empty());
    }
}
