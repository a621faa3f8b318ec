//! Nocturne Host Document
//!
//! A deterministic, single-threaded stand-in for the browser environment the
//! dark theme engine runs in:
//!
//! - a node arena with elements, attributes and text ([`Document`])
//! - CSSOM sheet state for `<style>` and stylesheet `<link>` elements,
//!   including loading, failed and cross-origin states ([`Sheet`])
//! - mutation observers whose records queue up until drained
//!   ([`ObserveOptions`], [`MutationRecord`])
//! - document events for loads, visibility and ready state ([`DocumentEvent`])
//!
//! # Example
//!
//! ```rust
//! use nocturne_dom::{Document, ObserveOptions};
//!
//! let mut doc = Document::new();
//! let head = doc.head().unwrap();
//! let observer = doc.create_observer();
//! doc.observe(observer, head, ObserveOptions::child_list()).unwrap();
//!
//! let style = doc.create_element("style");
//! doc.set_text_content(style, "body { color: black }").unwrap();
//! doc.append_child(head, style).unwrap();
//!
//! assert_eq!(doc.take_records(observer).len(), 1);
//! assert_eq!(doc.sheet(style).unwrap().rules().unwrap().len(), 1);
//! ```

pub mod document;
pub mod error;
pub mod events;
pub mod mutation;
pub mod node;
pub mod sheet;

pub use document::Document;
pub use error::{DomError, Result};
pub use events::{DocumentEvent, ListenerId, ReadyState};
pub use mutation::{MutationKind, MutationRecord, NodeList, ObserveOptions, ObserverId};
pub use node::{ElementData, Node, NodeData, NodeId};
pub use sheet::{Sheet, SheetState};
