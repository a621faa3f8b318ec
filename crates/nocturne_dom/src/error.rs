//! Document error types

use thiserror::Error;

use crate::node::NodeId;

/// Invalid operation on the document tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("Node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    /// Inserting would create a cycle or put a node somewhere it cannot live
    #[error("Cannot insert {child:?} into {parent:?}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("Node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("Element {0:?} has no style sheet")]
    NoStyleSheet(NodeId),

    /// Rule list of a cross-origin sheet cannot be read or edited
    #[error("Style sheet of {0:?} is not accessible")]
    InaccessibleStyleSheet(NodeId),

    #[error("Rule index {index} out of range for a sheet with {len} rules")]
    RuleIndex { index: usize, len: usize },
}

/// Result type for document operations
pub type Result<T> = std::result::Result<T, DomError>;
