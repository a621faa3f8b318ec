//! Node position watcher
//!
//! Keeps one of the engine's own elements where it was put. The watcher
//! observes the element's parent and, when the element has been removed or
//! displaced, re-inserts it. A script that keeps moving the element wins
//! eventually: too many restorations in a short window stop the watcher.

use std::time::{Duration, Instant};

use nocturne_dom::{Document, NodeId, ObserveOptions, ObserverId};
use tracing::{debug, warn};

/// Restorations allowed per window before giving up
pub const MAX_RESTORE_ATTEMPTS: u32 = 10;

/// Window over which restorations are counted
pub const RESTORE_WINDOW: Duration = Duration::from_secs(10);

/// Where the watched node belongs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Immediately after this sibling, or first child for `None`
    After(Option<NodeId>),
    /// Last child of the parent
    LastChild,
}

/// Result of a position check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionCheck {
    InPlace,
    Restored,
    Stopped,
}

pub struct PositionWatcher {
    node: NodeId,
    parent: NodeId,
    anchor: Anchor,
    observer: ObserverId,
    attempts: u32,
    window_start: Option<Instant>,
    stopped: bool,
}

impl PositionWatcher {
    /// Watch `node` at its current position. `last` anchors it as the last
    /// child instead of after its current previous sibling.
    pub fn new(doc: &mut Document, node: NodeId, last: bool) -> Option<Self> {
        let Some(parent) = doc.parent(node) else {
            warn!(?node, "unable to watch node position: parent not found");
            return None;
        };
        let anchor = if last {
            Anchor::LastChild
        } else {
            Anchor::After(doc.previous_sibling(node))
        };
        let observer = doc.create_observer();
        if let Err(err) = doc.observe(observer, parent, ObserveOptions::child_list()) {
            warn!(%err, "unable to observe node parent");
            doc.drop_observer(observer);
            return None;
        }

        Some(Self {
            node,
            parent,
            anchor,
            observer,
            attempts: 0,
            window_start: None,
            stopped: false,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn is_displaced(&self, doc: &Document) -> bool {
        if doc.parent(self.node) != Some(self.parent) {
            return true;
        }
        match self.anchor {
            Anchor::After(prev) => doc.previous_sibling(self.node) != prev,
            Anchor::LastChild => doc.next_sibling(self.node).is_some(),
        }
    }

    /// Drain parent mutations and restore the node if it drifted
    pub fn check(&mut self, doc: &mut Document) -> PositionCheck {
        if self.stopped {
            return PositionCheck::Stopped;
        }
        if doc.take_records(self.observer).is_empty() || !self.is_displaced(doc) {
            return PositionCheck::InPlace;
        }

        self.attempts += 1;
        let now = Instant::now();
        match self.window_start {
            None => self.window_start = Some(now),
            Some(start) if self.attempts > MAX_RESTORE_ATTEMPTS => {
                if now.duration_since(start) < RESTORE_WINDOW {
                    warn!(
                        node = ?self.node,
                        attempts = self.attempts,
                        "node position watcher stopped: a page script keeps moving the node"
                    );
                    self.stop(doc);
                    return PositionCheck::Stopped;
                }
                self.window_start = Some(now);
                self.attempts = 1;
            }
            Some(_) => {}
        }

        let reference = match self.anchor {
            Anchor::After(Some(prev)) => {
                if doc.parent(prev) != Some(self.parent) {
                    warn!(node = ?self.node, "unable to restore node position: sibling was removed");
                    self.stop(doc);
                    return PositionCheck::Stopped;
                }
                doc.next_sibling(prev)
            }
            Anchor::After(None) => doc.first_child(self.parent),
            Anchor::LastChild => None,
        };

        let result = if reference == Some(self.node) {
            Ok(())
        } else {
            doc.insert_before(self.parent, self.node, reference)
        };
        match result {
            Ok(()) => {
                debug!(node = ?self.node, "restored node position");
                // Our own insertion is not a displacement
                doc.take_records(self.observer);
                PositionCheck::Restored
            }
            Err(err) => {
                warn!(%err, node = ?self.node, "failed to restore node position");
                self.stop(doc);
                PositionCheck::Stopped
            }
        }
    }

    /// Release the observer
    pub fn stop(&mut self, doc: &mut Document) {
        if !self.stopped {
            self.stopped = true;
            doc.drop_observer(self.observer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_with(doc: &mut Document, tags: &[&str]) -> Vec<NodeId> {
        let head = doc.head().unwrap();
        tags.iter()
            .map(|tag| {
                let el = doc.create_element(tag);
                doc.append_child(head, el).unwrap();
                el
            })
            .collect()
    }

    #[test]
    fn test_restores_removed_node_after_sibling() {
        let mut doc = Document::new();
        let nodes = head_with(&mut doc, &["meta", "style", "title"]);
        let mut watcher = PositionWatcher::new(&mut doc, nodes[1], false).unwrap();
        assert_eq!(watcher.anchor(), Anchor::After(Some(nodes[0])));

        assert_eq!(watcher.check(&mut doc), PositionCheck::InPlace);
        doc.remove(nodes[1]).unwrap();
        assert_eq!(watcher.check(&mut doc), PositionCheck::Restored);
        assert_eq!(doc.next_sibling(nodes[0]), Some(nodes[1]));
        assert_eq!(watcher.check(&mut doc), PositionCheck::InPlace);
    }

    #[test]
    fn test_last_child_anchor_moves_back_to_end() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let nodes = head_with(&mut doc, &["style"]);
        let mut watcher = PositionWatcher::new(&mut doc, nodes[0], true).unwrap();

        let late = doc.create_element("link");
        doc.append_child(head, late).unwrap();
        assert_eq!(watcher.check(&mut doc), PositionCheck::Restored);
        assert_eq!(doc.last_child(head), Some(nodes[0]));
    }

    #[test]
    fn test_removed_anchor_stops_watcher() {
        let mut doc = Document::new();
        let nodes = head_with(&mut doc, &["meta", "style"]);
        let mut watcher = PositionWatcher::new(&mut doc, nodes[1], false).unwrap();
        doc.remove(nodes[0]).unwrap();
        assert_eq!(watcher.check(&mut doc), PositionCheck::Stopped);
        assert!(watcher.is_stopped());
    }

    #[test]
    fn test_gives_up_after_repeated_conflicts() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let nodes = head_with(&mut doc, &["style"]);
        let mut watcher = PositionWatcher::new(&mut doc, nodes[0], false).unwrap();

        for _ in 0..MAX_RESTORE_ATTEMPTS {
            doc.append_child(body, nodes[0]).unwrap();
            assert_eq!(watcher.check(&mut doc), PositionCheck::Restored);
        }
        doc.append_child(body, nodes[0]).unwrap();
        assert_eq!(watcher.check(&mut doc), PositionCheck::Stopped);
        assert_eq!(doc.parent(nodes[0]), Some(body));
    }
}
