//! Document-level events

use slotmap::new_key_type;

use crate::node::NodeId;

new_key_type! {
    /// Handle to an event listener queue
    pub struct ListenerId;
}

/// `document.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// Interactive or complete
    pub fn is_page_loaded(&self) -> bool {
        matches!(self, ReadyState::Interactive | ReadyState::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// An external sheet finished loading (also fired for blocked sheets)
    Load(NodeId),
    /// An external sheet failed to load
    Error(NodeId),
    VisibilityChange { hidden: bool },
    ReadyStateChange(ReadyState),
}
