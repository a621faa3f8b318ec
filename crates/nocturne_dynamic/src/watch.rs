//! Document Watcher
//!
//! Turns raw mutation records into batched notifications:
//!
//! - [`StyleWatcher`]: stylesheet topology (`created`, `updated`, `removed`,
//!   `moved`)
//! - [`HeadWaiter`]: one-shot wait for `<head>` on a document still parsing
//!
//! Elements injected by the engine never show up in a batch; they are
//! filtered out by their marker class rather than by pausing observation.

use indexmap::IndexSet;
use nocturne_dom::{Document, MutationKind, NodeId, ObserveOptions, ObserverId};
use tracing::{debug, warn};

use crate::overrides::is_engine_element;
use crate::style_manager::{manageable_styles, should_manage_style};

/// Attributes that can change whether or how a stylesheet applies
const STYLE_ATTRIBUTES: [&str; 4] = ["rel", "href", "media", "disabled"];

/// One batch of stylesheet topology changes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyleChanges {
    pub created: Vec<NodeId>,
    pub updated: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    /// Removed and re-inserted within the batch
    pub moved: Vec<NodeId>,
}

impl StyleChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.moved.is_empty()
    }
}

fn is_style_element(doc: &Document, node: NodeId) -> bool {
    matches!(doc.tag_name(node), Some("style" | "link")) && !is_engine_element(doc, node)
}

/// Watches the whole document for stylesheets coming and going
pub struct StyleWatcher {
    observer: ObserverId,
}

impl StyleWatcher {
    pub fn new(doc: &mut Document) -> Option<Self> {
        let observer = doc.create_observer();
        let options = ObserveOptions::child_list()
            .with_subtree()
            .with_attribute_filter(STYLE_ATTRIBUTES);
        if let Err(err) = doc.observe(observer, doc.root(), options) {
            warn!(%err, "unable to watch for style changes");
            doc.drop_observer(observer);
            return None;
        }
        Some(Self { observer })
    }

    /// Drain and classify everything observed since the last call
    pub fn take_changes(&mut self, doc: &mut Document) -> StyleChanges {
        let records = doc.take_records(self.observer);
        if records.is_empty() {
            return StyleChanges::default();
        }

        let mut created: IndexSet<NodeId> = IndexSet::new();
        let mut removed: IndexSet<NodeId> = IndexSet::new();
        let mut updated: IndexSet<NodeId> = IndexSet::new();

        for record in &records {
            match &record.kind {
                MutationKind::ChildList { added, removed: gone } => {
                    for &node in added {
                        created.extend(manageable_styles(doc, node));
                    }
                    for &node in gone {
                        removed.extend(manageable_styles(doc, node));
                    }
                }
                MutationKind::Attributes { .. } => {
                    let target = record.target;
                    if should_manage_style(doc, target) {
                        updated.insert(target);
                    } else if is_style_element(doc, target) {
                        // Disqualified, e.g. switched to print media
                        removed.insert(target);
                    }
                }
                MutationKind::CharacterData { .. } => {}
            }
        }

        let mut changes = StyleChanges::default();
        for &node in &created {
            let connected = doc.is_connected(node);
            if removed.shift_remove(&node) {
                if connected {
                    changes.moved.push(node);
                }
            } else if connected {
                changes.created.push(node);
            }
        }
        changes.removed = removed
            .into_iter()
            .filter(|&node| !doc.is_connected(node) || !should_manage_style(doc, node))
            .collect();
        changes.updated = updated
            .into_iter()
            .filter(|&node| {
                doc.is_connected(node)
                    && !changes.created.contains(&node)
                    && !changes.moved.contains(&node)
            })
            .collect();

        if !changes.is_empty() {
            debug!(
                created = changes.created.len(),
                updated = changes.updated.len(),
                removed = changes.removed.len(),
                moved = changes.moved.len(),
                "style changes"
            );
        }
        changes
    }

    pub fn stop(self, doc: &mut Document) {
        doc.drop_observer(self.observer);
    }
}

/// Revocable wait for `<head>` to appear
pub struct HeadWaiter {
    observer: ObserverId,
}

impl HeadWaiter {
    pub fn new(doc: &mut Document) -> Option<Self> {
        let observer = doc.create_observer();
        let options = ObserveOptions::child_list().with_subtree();
        if let Err(err) = doc.observe(observer, doc.root(), options) {
            warn!(%err, "unable to wait for head");
            doc.drop_observer(observer);
            return None;
        }
        Some(Self { observer })
    }

    /// `<head>` once a mutation has brought it in
    pub fn poll(&mut self, doc: &mut Document) -> Option<NodeId> {
        if doc.take_records(self.observer).is_empty() {
            return None;
        }
        doc.head()
    }

    pub fn cancel(self, doc: &mut Document) {
        doc.drop_observer(self.observer);
    }
}
