//! Mutation observation
//!
//! Records are queued synchronously when the tree changes and stay queued
//! until the owner drains them with
//! [`Document::take_records`](crate::Document::take_records). Nothing is
//! delivered through callbacks, so the owner decides when a batch is handled.

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::node::NodeId;

new_key_type! {
    /// Handle to a mutation observer registered on a document
    pub struct ObserverId;
}

/// What an observer registration listens for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub attributes: bool,
    /// Restrict attribute records to these (lowercase) names
    pub attribute_filter: Option<Vec<String>>,
    pub character_data: bool,
    /// Also observe every descendant of the target
    pub subtree: bool,
}

impl ObserveOptions {
    /// Child additions and removals
    pub fn child_list() -> Self {
        Self {
            child_list: true,
            ..Self::default()
        }
    }

    /// Attribute changes only
    pub fn attributes() -> Self {
        Self {
            attributes: true,
            ..Self::default()
        }
    }

    pub fn with_subtree(mut self) -> Self {
        self.subtree = true;
        self
    }

    pub fn with_attributes(mut self) -> Self {
        self.attributes = true;
        self
    }

    pub fn with_attribute_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attributes = true;
        self.attribute_filter = Some(
            names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    pub fn with_character_data(mut self) -> Self {
        self.character_data = true;
        self
    }

    pub(crate) fn accepts(&self, kind: &MutationKind) -> bool {
        match kind {
            MutationKind::ChildList { .. } => self.child_list,
            MutationKind::CharacterData { .. } => self.character_data,
            MutationKind::Attributes { name, .. } => {
                self.attributes
                    && self
                        .attribute_filter
                        .as_ref()
                        .map_or(true, |filter| filter.iter().any(|f| f == name))
            }
        }
    }
}

/// Node lists in child list records are almost always a single node
pub type NodeList = SmallVec<[NodeId; 1]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    ChildList { added: NodeList, removed: NodeList },
    Attributes { name: String, old_value: Option<String> },
    CharacterData { old_value: String },
}

/// One change to the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent for child list changes, element for attributes, text node for
    /// character data
    pub target: NodeId,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn added_nodes(&self) -> &[NodeId] {
        match &self.kind {
            MutationKind::ChildList { added, .. } => added,
            _ => &[],
        }
    }

    pub fn removed_nodes(&self) -> &[NodeId] {
        match &self.kind {
            MutationKind::ChildList { removed, .. } => removed,
            _ => &[],
        }
    }

    pub fn attribute_name(&self) -> Option<&str> {
        match &self.kind {
            MutationKind::Attributes { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Observer {
    pub registrations: Vec<(NodeId, ObserveOptions)>,
    pub records: Vec<MutationRecord>,
}
