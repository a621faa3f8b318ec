//! Headless document
//!
//! A [`Document`] is a slotmap arena of nodes with one document node at the
//! root. Nodes are never freed: a removed node is simply detached and can be
//! inserted again, which is what page scripts moving elements around do.
//!
//! Every tree mutation queues [`MutationRecord`]s for the observers whose
//! registrations cover it. CSSOM edits ([`Document::insert_rule`],
//! [`Document::delete_rule`]) deliberately do not, matching browsers; they
//! only bump the sheet revision.

use std::collections::VecDeque;

use nocturne_css::split_rules;
use slotmap::SlotMap;
use smallvec::smallvec;
use tracing::trace;

use crate::error::{DomError, Result};
use crate::events::{DocumentEvent, ListenerId, ReadyState};
use crate::mutation::{MutationKind, MutationRecord, NodeList, ObserveOptions, Observer, ObserverId};
use crate::node::{ElementData, Node, NodeData, NodeId};
use crate::sheet::{Sheet, SheetState};

/// Headless DOM with CSSOM sheet state and mutation observers
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    observers: SlotMap<ObserverId, Observer>,
    listeners: SlotMap<ListenerId, VecDeque<DocumentEvent>>,
    hidden: bool,
    ready_state: ReadyState,
    next_revision: u64,
    /// `<style>` elements with this class get no sheet
    sheetless_class: Option<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Loaded document with `<html>`, `<head>` and `<body>`
    pub fn new() -> Self {
        let mut doc = Self::empty(ReadyState::Complete);
        let html = doc.attach_new(doc.root, "html");
        doc.attach_new(html, "head");
        doc.attach_new(html, "body");
        doc
    }

    /// Document still being parsed: only `<html>` exists
    pub fn without_head() -> Self {
        let mut doc = Self::empty(ReadyState::Loading);
        doc.attach_new(doc.root, "html");
        doc
    }

    fn empty(ready_state: ReadyState) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodeData::Document));
        Self {
            nodes,
            root,
            observers: SlotMap::with_key(),
            listeners: SlotMap::with_key(),
            hidden: false,
            ready_state,
            next_revision: 0,
            sheetless_class: None,
        }
    }

    /// Construction-time append, before anyone can observe
    fn attach_new(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.create_element(tag);
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(id);
        }
        id
    }

    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    // ========================================================================
    // Node access
    // ========================================================================

    /// The document node
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// `<html>`
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    /// First `<head>` child of `<html>`
    pub fn head(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|&c| self.tag_name(c) == Some("head"))
    }

    /// First `<body>` child of `<html>`
    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|&c| self.tag_name(c) == Some("body"))
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.nodes.get(id).and_then(Node::element)
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData> {
        match self.nodes.get_mut(id) {
            Some(node) => node.element_mut().ok_or(DomError::NotAnElement(id)),
            None => Err(DomError::UnknownNode(id)),
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_element)
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn index_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|&c| c == id)?;
        Some((parent, index))
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Attached to the document node
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(self.root, id)
    }

    /// Descendants of `id` in document order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Connected elements with this tag, in document order
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.tag_name(id) == Some(tag.as_str()))
            .collect()
    }

    /// Connected elements carrying this class, in document order
    pub fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.has_class(id, class))
            .collect()
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)
            .and_then(|e| e.attributes.get(&name.to_ascii_lowercase()))
            .map(String::as_str)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_class(class))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let old_value = self
            .element_mut(id)?
            .attributes
            .insert(name.clone(), value.to_string());
        self.queue_record(
            id,
            MutationKind::Attributes {
                name: name.clone(),
                old_value,
            },
        );
        self.attribute_changed(id, &name);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let old_value = self.element_mut(id)?.attributes.shift_remove(&name);
        if old_value.is_some() {
            self.queue_record(
                id,
                MutationKind::Attributes {
                    name: name.clone(),
                    old_value,
                },
            );
            self.attribute_changed(id, &name);
        }
        Ok(())
    }

    /// Append a class token if missing
    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let value = match self.get_attribute(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attribute(id, "class", &value)
    }

    // ========================================================================
    // Tree mutation
    // ========================================================================

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes
            .insert(Node::new(NodeData::Element(ElementData::new(tag))))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.nodes.insert(Node::new(NodeData::Text(text.to_string())))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference` (or last when `None`).
    /// A child that already has a parent is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        let parent_node = self.nodes.get(parent).ok_or(DomError::UnknownNode(parent))?;
        if parent_node.is_text() {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        let child_node = self.nodes.get(child).ok_or(DomError::UnknownNode(child))?;
        if matches!(child_node.data, NodeData::Document) || self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    child: reference,
                });
            }
            if reference == child {
                return Ok(());
            }
        }

        self.detach(child);

        let index = match reference {
            Some(reference) => self
                .children(parent)
                .iter()
                .position(|&c| c == reference)
                .unwrap_or(self.children(parent).len()),
            None => self.children(parent).len(),
        };
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.insert(index, child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }

        self.queue_record(
            parent,
            MutationKind::ChildList {
                added: smallvec![child],
                removed: NodeList::new(),
            },
        );
        self.children_changed(parent);
        Ok(())
    }

    /// Insert `node` right after `reference` in the same parent
    pub fn insert_after(&mut self, node: NodeId, reference: NodeId) -> Result<()> {
        let parent = self
            .parent(reference)
            .ok_or(DomError::HierarchyRequest {
                parent: reference,
                child: node,
            })?;
        let next = self.next_sibling(reference);
        if next == Some(node) {
            return Ok(());
        }
        self.insert_before(parent, node, next)
    }

    /// Detach `id` from its parent; no-op for detached nodes
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(DomError::UnknownNode(id));
        }
        self.detach(id);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        let Some((parent, index)) = self.index_in_parent(id) else {
            return;
        };
        // Queue while still attached so subtree observers above see it
        self.queue_record(
            parent,
            MutationKind::ChildList {
                added: NodeList::new(),
                removed: smallvec![id],
            },
        );
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.remove(index);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = None;
        }
        self.children_changed(parent);
    }

    // ========================================================================
    // Text
    // ========================================================================

    /// Concatenated text of `id` and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        match self.nodes.get(id).map(|n| &n.data) {
            Some(NodeData::Text(text)) => text.clone(),
            Some(_) => self
                .descendants(id)
                .into_iter()
                .filter_map(|d| match self.nodes.get(d).map(|n| &n.data) {
                    Some(NodeData::Text(text)) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            None => String::new(),
        }
    }

    /// Replace all children with a single text node (none for empty text)
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<()> {
        if self.nodes.get(id).is_some_and(Node::is_text) {
            return self.set_text_data(id, text);
        }
        if !self.nodes.contains_key(id) {
            return Err(DomError::UnknownNode(id));
        }

        let removed: NodeList = self.children(id).iter().copied().collect();
        for &child in &removed {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = None;
            }
        }
        let mut added = NodeList::new();
        if !text.is_empty() {
            added.push(self.create_text(text));
        }
        for &child in &added {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = Some(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = added.to_vec();
        }

        if !removed.is_empty() || !added.is_empty() {
            self.queue_record(id, MutationKind::ChildList { added, removed });
        }
        self.children_changed(id);
        Ok(())
    }

    /// Set the text of an element, rewriting a lone text child in place.
    ///
    /// Same result as [`Self::set_text_content`], but repeated writes do not
    /// allocate a fresh text node each time.
    pub fn replace_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        let lone_text = match self.children(id) {
            [child] if self.nodes.get(*child).is_some_and(Node::is_text) => Some(*child),
            _ => None,
        };
        match lone_text {
            Some(child) if !text.is_empty() => self.set_text_data(child, text),
            _ => self.set_text_content(id, text),
        }
    }

    /// Change the data of a text node
    pub fn set_text_data(&mut self, id: NodeId, text: &str) -> Result<()> {
        let old_value = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Text(data)) => std::mem::replace(data, text.to_string()),
            Some(_) => return Err(DomError::HierarchyRequest { parent: id, child: id }),
            None => return Err(DomError::UnknownNode(id)),
        };
        self.queue_record(id, MutationKind::CharacterData { old_value });
        if let Some(parent) = self.parent(id) {
            self.children_changed(parent);
        }
        Ok(())
    }

    // ========================================================================
    // Style sheets
    // ========================================================================

    pub fn sheet(&self, id: NodeId) -> Option<&Sheet> {
        self.element(id).and_then(|e| e.sheet.as_ref())
    }

    /// Whether a `<link>` is a stylesheet link (`rel` contains `stylesheet`)
    pub fn is_stylesheet_link(&self, id: NodeId) -> bool {
        self.tag_name(id) == Some("link")
            && self.get_attribute(id, "rel").is_some_and(|rel| {
                rel.split_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            })
    }

    /// `<link>` elements whose sheet is still downloading
    pub fn pending_loads(&self) -> Vec<NodeId> {
        self.elements_by_tag("link")
            .into_iter()
            .filter(|&id| self.sheet(id).is_some_and(Sheet::is_loading))
            .collect()
    }

    fn sheet_mut(&mut self, id: NodeId) -> Result<&mut Sheet> {
        self.element_mut(id)?
            .sheet
            .as_mut()
            .ok_or(DomError::NoStyleSheet(id))
    }

    /// Finish loading a stylesheet link with the downloaded text
    pub fn complete_load(&mut self, link: NodeId, css: &str) -> Result<()> {
        let revision = self.bump_revision();
        *self.sheet_mut(link)? = Sheet::loaded(split_rules(css), revision);
        trace!(?link, "sheet loaded");
        self.dispatch(DocumentEvent::Load(link));
        Ok(())
    }

    /// Fail a stylesheet link download
    pub fn fail_load(&mut self, link: NodeId) -> Result<()> {
        let revision = self.bump_revision();
        let sheet = self.sheet_mut(link)?;
        sheet.state = SheetState::Failed;
        sheet.rules.clear();
        sheet.revision = revision;
        self.dispatch(DocumentEvent::Error(link));
        Ok(())
    }

    /// Finish loading a cross-origin link whose rules cannot be read
    pub fn block_cross_origin(&mut self, link: NodeId) -> Result<()> {
        let revision = self.bump_revision();
        let sheet = self.sheet_mut(link)?;
        sheet.state = SheetState::Blocked;
        sheet.rules.clear();
        sheet.revision = revision;
        self.dispatch(DocumentEvent::Load(link));
        Ok(())
    }

    fn editable_sheet(&mut self, id: NodeId) -> Result<&mut Sheet> {
        let sheet = self.sheet_mut(id)?;
        match sheet.state {
            SheetState::Loaded => Ok(sheet),
            SheetState::Loading | SheetState::Failed | SheetState::Blocked => {
                Err(DomError::InaccessibleStyleSheet(id))
            }
        }
    }

    /// CSSOM `insertRule`: no mutation records
    pub fn insert_rule(&mut self, id: NodeId, rule: &str, index: usize) -> Result<usize> {
        let revision = self.bump_revision();
        let sheet = self.editable_sheet(id)?;
        let len = sheet.rules.len();
        if index > len {
            return Err(DomError::RuleIndex { index, len });
        }
        sheet.rules.insert(index, rule.trim().to_string());
        sheet.revision = revision;
        Ok(index)
    }

    /// CSSOM `deleteRule`: no mutation records
    pub fn delete_rule(&mut self, id: NodeId, index: usize) -> Result<()> {
        let revision = self.bump_revision();
        let sheet = self.editable_sheet(id)?;
        let len = sheet.rules.len();
        if index >= len {
            return Err(DomError::RuleIndex { index, len });
        }
        sheet.rules.remove(index);
        sheet.revision = revision;
        Ok(())
    }

    /// Stop deriving sheets for `<style>` elements carrying `class`.
    ///
    /// For elements whose rules nobody reads back, such as generated
    /// overrides. Existing sheets are dropped on the next text change.
    pub fn set_sheetless_class(&mut self, class: Option<&str>) {
        self.sheetless_class = class.map(str::to_string);
    }

    fn is_sheetless(&self, id: NodeId) -> bool {
        self.sheetless_class
            .as_deref()
            .is_some_and(|class| self.has_class(id, class))
    }

    fn children_changed(&mut self, id: NodeId) {
        if self.tag_name(id) != Some("style") {
            return;
        }
        if self.is_sheetless(id) {
            if let Ok(element) = self.element_mut(id) {
                element.sheet = None;
            }
            return;
        }
        let rules = split_rules(&self.text_content(id));
        let revision = self.bump_revision();
        if let Ok(element) = self.element_mut(id) {
            element.sheet = Some(Sheet::loaded(rules, revision));
        }
    }

    fn attribute_changed(&mut self, id: NodeId, name: &str) {
        if self.tag_name(id) != Some("link") || !matches!(name, "rel" | "href") {
            return;
        }
        let wants_sheet = self.is_stylesheet_link(id) && self.has_attribute(id, "href");
        let revision = self.bump_revision();
        if let Ok(element) = self.element_mut(id) {
            element.sheet = wants_sheet.then(|| Sheet::loading(revision));
        }
    }

    // ========================================================================
    // Mutation observers
    // ========================================================================

    pub fn create_observer(&mut self) -> ObserverId {
        self.observers.insert(Observer::default())
    }

    /// Register (or re-register with new options) `target` on an observer
    pub fn observe(
        &mut self,
        observer: ObserverId,
        target: NodeId,
        options: ObserveOptions,
    ) -> Result<()> {
        if !self.nodes.contains_key(target) {
            return Err(DomError::UnknownNode(target));
        }
        if let Some(entry) = self.observers.get_mut(observer) {
            match entry.registrations.iter_mut().find(|(t, _)| *t == target) {
                Some(existing) => existing.1 = options,
                None => entry.registrations.push((target, options)),
            }
        }
        Ok(())
    }

    /// Drain queued records
    pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        self.observers
            .get_mut(observer)
            .map(|o| std::mem::take(&mut o.records))
            .unwrap_or_default()
    }

    pub fn has_records(&self, observer: ObserverId) -> bool {
        self.observers
            .get(observer)
            .is_some_and(|o| !o.records.is_empty())
    }

    /// Stop observing everything and drop queued records
    pub fn disconnect(&mut self, observer: ObserverId) {
        if let Some(entry) = self.observers.get_mut(observer) {
            entry.registrations.clear();
            entry.records.clear();
        }
    }

    /// Disconnect and free the observer
    pub fn drop_observer(&mut self, observer: ObserverId) {
        self.observers.remove(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn queue_record(&mut self, target: NodeId, kind: MutationKind) {
        let mut ancestors: Vec<NodeId> = Vec::new();
        let mut current = Some(target);
        while let Some(id) = current {
            ancestors.push(id);
            current = self.parent(id);
        }

        for (_, observer) in self.observers.iter_mut() {
            let interested = observer.registrations.iter().any(|(node, options)| {
                (*node == target || (options.subtree && ancestors.contains(node)))
                    && options.accepts(&kind)
            });
            if interested {
                observer.records.push(MutationRecord {
                    target,
                    kind: kind.clone(),
                });
            }
        }
    }

    // ========================================================================
    // Document events and flags
    // ========================================================================

    /// Start queueing document events
    pub fn listen(&mut self) -> ListenerId {
        self.listeners.insert(VecDeque::new())
    }

    pub fn take_events(&mut self, listener: ListenerId) -> Vec<DocumentEvent> {
        self.listeners
            .get_mut(listener)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn unlisten(&mut self, listener: ListenerId) {
        self.listeners.remove(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn dispatch(&mut self, event: DocumentEvent) {
        for (_, queue) in self.listeners.iter_mut() {
            queue.push_back(event.clone());
        }
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        if self.hidden != hidden {
            self.hidden = hidden;
            self.dispatch(DocumentEvent::VisibilityChange { hidden });
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        if self.ready_state != state {
            self.ready_state = state;
            self.dispatch(DocumentEvent::ReadyStateChange(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style_with(doc: &mut Document, css: &str) -> NodeId {
        let style = doc.create_element("style");
        doc.set_text_content(style, css).unwrap();
        style
    }

    #[test]
    fn test_skeletons() {
        let doc = Document::new();
        let html = doc.document_element().unwrap();
        assert_eq!(doc.tag_name(html), Some("html"));
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
        assert_eq!(doc.ready_state(), ReadyState::Complete);

        let pre = Document::without_head();
        assert!(pre.head().is_none());
        assert_eq!(pre.ready_state(), ReadyState::Loading);
    }

    #[test]
    fn test_insert_move_and_siblings() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let a = doc.create_element("meta");
        let b = doc.create_element("title");
        doc.append_child(head, a).unwrap();
        doc.append_child(head, b).unwrap();
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.previous_sibling(b), Some(a));

        doc.insert_before(head, b, Some(a)).unwrap();
        assert_eq!(doc.children(head), &[b, a]);

        doc.insert_after(b, a).unwrap();
        assert_eq!(doc.children(head), &[a, b]);

        assert_eq!(
            doc.insert_before(a, head, None),
            Err(DomError::HierarchyRequest { parent: a, child: head })
        );
    }

    #[test]
    fn test_style_sheet_follows_text() {
        let mut doc = Document::new();
        let style = style_with(&mut doc, "a { color: red } b { color: blue }");
        let first = doc.sheet(style).unwrap().revision();
        assert_eq!(doc.sheet(style).unwrap().rules().unwrap().len(), 2);

        let text = doc.first_child(style).unwrap();
        doc.set_text_data(text, "a { color: red }").unwrap();
        let sheet = doc.sheet(style).unwrap();
        assert_eq!(sheet.rules().unwrap(), &["a { color: red }".to_string()]);
        assert!(sheet.revision() > first);
    }

    #[test]
    fn test_replace_text_reuses_text_node() {
        let mut doc = Document::new();
        let style = style_with(&mut doc, "a { color: red }");
        let text = doc.first_child(style).unwrap();

        doc.replace_text(style, "b { color: blue }").unwrap();
        assert_eq!(doc.children(style), &[text]);
        assert_eq!(doc.text_content(style), "b { color: blue }");
        assert_eq!(
            doc.sheet(style).unwrap().rules().unwrap(),
            &["b { color: blue }".to_string()]
        );

        doc.replace_text(style, "").unwrap();
        assert!(doc.children(style).is_empty());
        doc.replace_text(style, "c { color: green }").unwrap();
        assert_eq!(doc.children(style).len(), 1);
    }

    #[test]
    fn test_sheetless_class_skips_sheet() {
        let mut doc = Document::new();
        doc.set_sheetless_class(Some("generated"));
        let style = doc.create_element("style");
        doc.set_attribute(style, "class", "generated").unwrap();
        doc.replace_text(style, "a { color: red }").unwrap();
        assert!(doc.sheet(style).is_none());
        assert_eq!(doc.text_content(style), "a { color: red }");

        let plain = style_with(&mut doc, "a { color: red }");
        assert!(doc.sheet(plain).is_some());

        doc.set_sheetless_class(None);
        doc.replace_text(style, "b { color: blue }").unwrap();
        assert!(doc.sheet(style).is_some());
    }

    #[test]
    fn test_cssom_edits_bump_revision_without_records() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let style = style_with(&mut doc, "a { color: red }");
        doc.append_child(head, style).unwrap();

        let observer = doc.create_observer();
        doc.observe(
            observer,
            doc.root(),
            ObserveOptions::child_list().with_subtree().with_character_data(),
        )
        .unwrap();

        let before = doc.sheet(style).unwrap().revision();
        doc.insert_rule(style, "b { color: blue }", 1).unwrap();
        doc.delete_rule(style, 0).unwrap();
        assert!(doc.take_records(observer).is_empty());
        let sheet = doc.sheet(style).unwrap();
        assert!(sheet.revision() > before);
        assert_eq!(sheet.rules().unwrap(), &["b { color: blue }".to_string()]);
        assert_eq!(
            doc.delete_rule(style, 5),
            Err(DomError::RuleIndex { index: 5, len: 1 })
        );
    }

    #[test]
    fn test_link_load_lifecycle() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let listener = doc.listen();
        let link = doc.create_element("link");
        doc.set_attribute(link, "rel", "stylesheet").unwrap();
        doc.set_attribute(link, "href", "a.css").unwrap();
        doc.append_child(head, link).unwrap();

        assert!(doc.sheet(link).unwrap().is_loading());
        assert_eq!(doc.pending_loads(), vec![link]);
        assert!(doc.sheet(link).unwrap().rules().is_none());

        doc.complete_load(link, "body { color: black }").unwrap();
        assert_eq!(doc.sheet(link).unwrap().rules().unwrap().len(), 1);
        assert_eq!(doc.take_events(listener), vec![DocumentEvent::Load(link)]);

        doc.set_attribute(link, "href", "b.css").unwrap();
        assert!(doc.sheet(link).unwrap().is_loading(), "new href starts a new load");
        doc.block_cross_origin(link).unwrap();
        assert_eq!(doc.sheet(link).unwrap().state(), SheetState::Blocked);
        assert!(doc.sheet(link).unwrap().rules().is_none());
        assert_eq!(
            doc.insert_rule(link, "a {}", 0),
            Err(DomError::InaccessibleStyleSheet(link))
        );
    }

    #[test]
    fn test_observer_scoping_and_filters() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let body = doc.body().unwrap();

        let head_only = doc.create_observer();
        doc.observe(head_only, head, ObserveOptions::child_list()).unwrap();
        let subtree = doc.create_observer();
        doc.observe(
            subtree,
            doc.root(),
            ObserveOptions::child_list()
                .with_subtree()
                .with_attribute_filter(["style"]),
        )
        .unwrap();

        let div = doc.create_element("div");
        doc.append_child(body, div).unwrap();
        doc.set_attribute(div, "style", "color: red").unwrap();
        doc.set_attribute(div, "id", "x").unwrap();
        let style = doc.create_element("style");
        doc.append_child(head, style).unwrap();
        doc.remove(style).unwrap();

        let head_records = doc.take_records(head_only);
        assert_eq!(head_records.len(), 2);
        assert_eq!(head_records[0].added_nodes(), &[style]);
        assert_eq!(head_records[1].removed_nodes(), &[style]);

        let all = doc.take_records(subtree);
        assert_eq!(all.len(), 4, "div added, style attr, style added, style removed");
        assert_eq!(all[1].attribute_name(), Some("style"));

        doc.disconnect(subtree);
        doc.append_child(body, style).unwrap();
        assert!(doc.take_records(subtree).is_empty());
    }

    #[test]
    fn test_removed_subtree_is_disconnected() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let outer = doc.create_element("div");
        let inner = doc.create_element("span");
        doc.append_child(body, outer).unwrap();
        doc.append_child(outer, inner).unwrap();
        assert!(doc.is_connected(inner));
        doc.remove(outer).unwrap();
        assert!(!doc.is_connected(inner));
        assert_eq!(doc.elements_by_tag("span"), Vec::<NodeId>::new());
    }

    #[test]
    fn test_flags_dispatch_only_on_change() {
        let mut doc = Document::without_head();
        let listener = doc.listen();
        doc.set_hidden(false);
        doc.set_hidden(true);
        doc.set_ready_state(ReadyState::Interactive);
        assert_eq!(
            doc.take_events(listener),
            vec![
                DocumentEvent::VisibilityChange { hidden: true },
                DocumentEvent::ReadyStateChange(ReadyState::Interactive)
            ]
        );
    }
}
