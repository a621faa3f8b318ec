//! Nocturne Dynamic Theme
//!
//! Live dark-mode rewriting of a page's stylesheets. The engine installs a
//! fixed set of singleton override elements, keeps one managed override next
//! to every page stylesheet, and follows the document as it changes:
//!
//! - [`DynamicTheme`]: the orchestrator and its lifecycle
//! - [`StyleManager`]: one page stylesheet and its managed override
//! - [`StaticOverrides`]: fallback, user-agent, text, invert, inline and fix
//!   elements kept in place by position watchers
//! - [`StyleWatcher`]: stylesheet topology changes in batches
//! - [`InlineStyleOverrides`]: colors from `style`, `bgcolor` and friends
//!
//! # Example
//!
//! ```rust
//! use nocturne_dom::Document;
//! use nocturne_dynamic::DynamicTheme;
//! use nocturne_theme::{DynamicThemeFix, FilterConfig};
//!
//! let mut doc = Document::new();
//! let head = doc.head().unwrap();
//! let style = doc.create_element("style");
//! doc.set_text_content(style, "body { color: black; }").unwrap();
//! doc.append_child(head, style).unwrap();
//!
//! let mut theme = DynamicTheme::new();
//! theme
//!     .apply(&mut doc, FilterConfig::dark(), DynamicThemeFix::default(), false)
//!     .unwrap();
//! let sync = theme.sync_element(style).unwrap();
//! assert_eq!(doc.text_content(sync), "body { color: rgb(255, 255, 255); }");
//!
//! theme.remove(&mut doc);
//! assert!(doc.elements_by_class("darkreader").is_empty());
//! ```

pub mod engine;
pub mod error;
pub mod inline_style;
pub mod lifecycle;
pub mod meta_theme_color;
pub mod overrides;
pub mod position;
pub mod scheduler;
pub mod style_manager;
pub mod stylesheets;
pub mod variables;
pub mod watch;

pub use engine::{AfterRender, DynamicTheme};
pub use error::{EngineError, Result};
pub use inline_style::{InlineStyleOverrides, InlineStyleWatcher};
pub use lifecycle::{LifecycleEvent, StateMachine, ThemeState};
pub use meta_theme_color::MetaThemeColor;
pub use overrides::{OverrideKind, StaticOverrides, ENGINE_CLASS};
pub use position::{PositionCheck, PositionWatcher};
pub use scheduler::RenderScheduler;
pub use style_manager::{ManagerEvent, StyleDetails, StyleManager, SYNC_CLASS};
pub use watch::{HeadWaiter, StyleChanges, StyleWatcher};
