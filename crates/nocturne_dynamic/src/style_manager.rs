//! Style Manager
//!
//! One [`StyleManager`] per managed `<style>` or stylesheet `<link>`. It reads
//! the source's rule list, renders a color-transformed copy into a sibling
//! `<style class="darkreader darkreader--sync">` and watches the source for
//! changes. Managers never render on their own initiative: they report
//! [`ManagerEvent`]s to the orchestrator, which decides when to render.

use std::sync::mpsc::Sender;

use nocturne_css::{
    extract_variables, parse_stylesheet, referenced_names, CssRule, GroupRule, StyleRule,
    VariableResolver,
};
use nocturne_dom::{Document, NodeId, ObserveOptions, ObserverId, Result, SheetState};
use nocturne_theme::{ColorModifier, FilterConfig};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use crate::overrides::{create_engine_style, is_engine_element};
use crate::position::{PositionCheck, PositionWatcher};

/// Class of the managed override element
pub const SYNC_CLASS: &str = "darkreader--sync";

/// A managed source moved more often than this is left where it is
const MAX_MOVE_COUNT: u32 = 10;

/// Facts a manager reports upward
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Source content changed; the manager wants a render
    Update(NodeId),
    /// Rules are not available yet
    LoadingStart(NodeId),
    LoadingEnd(NodeId),
}

/// What a manager knows about its rules right now
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StyleDetails {
    Ready {
        /// Custom properties declared by the rules, later declarations win
        declared: Vec<(String, String)>,
        /// Custom property names referenced through `var()`
        referenced: Vec<String>,
    },
    /// Waiting for an external sheet
    Loading,
    /// No rule list to work with (failed download, link without href)
    Unavailable,
}

impl StyleDetails {
    /// Whether a variable resolution pass may be needed
    pub fn has_variables(&self) -> bool {
        match self {
            StyleDetails::Ready { declared, .. } => !declared.is_empty(),
            StyleDetails::Loading | StyleDetails::Unavailable => false,
        }
    }
}

/// Whether `node` is a stylesheet the engine should take over.
///
/// `<style>` elements and stylesheet links qualify, unless injected by the
/// engine itself or restricted to print media.
pub fn should_manage_style(doc: &Document, node: NodeId) -> bool {
    let is_style_source = match doc.tag_name(node) {
        Some("style") => true,
        Some("link") => doc.is_stylesheet_link(node),
        _ => false,
    };
    is_style_source
        && !is_engine_element(doc, node)
        && !doc
            .get_attribute(node, "media")
            .is_some_and(|media| media.trim().eq_ignore_ascii_case("print"))
}

/// `node` and its descendants that qualify, in document order
pub fn manageable_styles(doc: &Document, node: NodeId) -> Vec<NodeId> {
    std::iter::once(node)
        .chain(doc.descendants(node))
        .filter(|&n| should_manage_style(doc, n))
        .collect()
}

const MODIFIABLE_PROPERTIES: &[&str] = &[
    "background",
    "background-image",
    "border",
    "border-top",
    "border-right",
    "border-bottom",
    "border-left",
    "border-block",
    "border-block-start",
    "border-block-end",
    "border-inline",
    "border-inline-start",
    "border-inline-end",
    "box-shadow",
    "column-rule",
    "fill",
    "outline",
    "stroke",
    "text-decoration",
    "text-shadow",
];

const COLOR_KEYWORD_PROPERTIES: &[&str] = &[
    "color-scheme",
    "color-adjust",
    "print-color-adjust",
    "-webkit-print-color-adjust",
    "forced-color-adjust",
    "color-interpolation",
    "color-interpolation-filters",
    "color-rendering",
];

/// Declarations whose values may carry colors
pub fn is_modifiable_property(name: &str) -> bool {
    name.starts_with("--")
        || (name.contains("color") && !COLOR_KEYWORD_PROPERTIES.contains(&name))
        || MODIFIABLE_PROPERTIES.contains(&name)
}

fn render_style_rule(
    rule: &StyleRule,
    filter: &FilterConfig,
    variables: &VariableResolver,
    modifier: &mut ColorModifier,
) -> Option<StyleRule> {
    let declarations: Vec<_> = rule
        .declarations
        .iter()
        .filter(|decl| is_modifiable_property(&decl.name))
        .filter_map(|decl| {
            // Each declaration keeps its own value; the map only expands references
            let value = variables.substitute(&decl.value);
            let modified = modifier.modify_value(&value, filter);
            (modified != decl.value).then(|| {
                let mut out = decl.clone();
                out.value = modified;
                out
            })
        })
        .collect();

    (!declarations.is_empty()).then(|| StyleRule {
        selector: rule.selector.clone(),
        declarations,
    })
}

/// Transformed copy of one rule, `None` when nothing in it changes
pub fn render_rule(
    rule: &CssRule,
    filter: &FilterConfig,
    variables: &VariableResolver,
    modifier: &mut ColorModifier,
) -> Option<CssRule> {
    match rule {
        CssRule::Style(style) => {
            render_style_rule(style, filter, variables, modifier).map(CssRule::Style)
        }
        CssRule::Group(group) => {
            let rules: Vec<CssRule> = group
                .rules
                .iter()
                .filter_map(|r| render_rule(r, filter, variables, modifier))
                .collect();
            (!rules.is_empty()).then(|| {
                CssRule::Group(GroupRule {
                    name: group.name.clone(),
                    prelude: group.prelude.clone(),
                    rules,
                })
            })
        }
        CssRule::AtBlock(_) | CssRule::Statement(_) => None,
    }
}

fn visit_style_rules<'a>(rules: &'a [CssRule], f: &mut impl FnMut(&'a StyleRule)) {
    for rule in rules {
        match rule {
            CssRule::Style(style) => f(style),
            CssRule::Group(group) => visit_style_rules(&group.rules, f),
            CssRule::AtBlock(_) | CssRule::Statement(_) => {}
        }
    }
}

pub struct StyleManager {
    source: NodeId,
    sync: Option<NodeId>,
    sync_watcher: Option<PositionWatcher>,
    observer: Option<ObserverId>,
    /// Parsed rules keyed by rule text
    parsed: FxHashMap<String, Vec<CssRule>>,
    last_output: Option<String>,
    seen_revision: Option<u64>,
    is_loading: bool,
    load_failed: bool,
    move_count: u32,
    notifier: Sender<ManagerEvent>,
}

impl StyleManager {
    pub fn new(doc: &Document, source: NodeId, notifier: Sender<ManagerEvent>) -> Self {
        // A previous engine instance may have left its sync element behind
        let mut sync = None;
        let mut next = doc.next_sibling(source);
        while let Some(sibling) = next.filter(|&n| is_engine_element(doc, n)) {
            if doc.has_class(sibling, SYNC_CLASS) {
                sync = Some(sibling);
                break;
            }
            next = doc.next_sibling(sibling);
        }

        Self {
            source,
            sync,
            sync_watcher: None,
            observer: None,
            parsed: FxHashMap::default(),
            last_output: None,
            seen_revision: None,
            is_loading: false,
            load_failed: false,
            move_count: 0,
            notifier,
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    /// The managed override element, once rendered
    pub fn sync_element(&self) -> Option<NodeId> {
        self.sync
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_watching(&self) -> bool {
        self.observer.is_some()
    }

    fn notify(&self, event: ManagerEvent) {
        if self.notifier.send(event).is_err() {
            trace!(?event, "manager event dropped: orchestrator is gone");
        }
    }

    /// Rule texts when readable; `Some(&[])` for blocked sheets
    fn rule_texts<'d>(&self, doc: &'d Document) -> Option<&'d [String]> {
        match doc.sheet(self.source) {
            Some(sheet) => match sheet.state() {
                SheetState::Loaded => sheet.rules(),
                SheetState::Blocked => Some(&[]),
                SheetState::Loading | SheetState::Failed => None,
            },
            // An empty `<style>` has no sheet yet
            None if doc.tag_name(self.source) == Some("style") => Some(&[]),
            None => None,
        }
    }

    fn parsed_rules(&mut self, text: &str) -> &[CssRule] {
        self.parsed
            .entry(text.to_string())
            .or_insert_with(|| {
                let result = parse_stylesheet(text);
                result.log_diagnostics();
                result.stylesheet.rules
            })
            .as_slice()
    }

    /// Variables declared and referenced by the rules.
    ///
    /// Starting to wait for a loading sheet reports
    /// [`ManagerEvent::LoadingStart`] once.
    pub fn details(&mut self, doc: &Document) -> StyleDetails {
        let state = doc.sheet(self.source).map(|s| s.state());
        if state == Some(SheetState::Blocked) && self.seen_revision.is_none() {
            warn!(source = ?self.source, "cross-origin stylesheet rules are not accessible");
        }

        let Some(texts) = self.rule_texts(doc) else {
            if state == Some(SheetState::Loading) && !self.is_loading && !self.load_failed {
                self.is_loading = true;
                self.notify(ManagerEvent::LoadingStart(self.source));
                return StyleDetails::Loading;
            }
            return if self.is_loading {
                StyleDetails::Loading
            } else {
                StyleDetails::Unavailable
            };
        };

        let texts = texts.to_vec();
        let mut declarations = Vec::new();
        let mut referenced: Vec<String> = Vec::new();
        let mut seen = FxHashSet::default();
        for text in &texts {
            let rules = self.parsed_rules(text);
            visit_style_rules(rules, &mut |rule| {
                for decl in &rule.declarations {
                    declarations.push(decl.clone());
                    for name in referenced_names(&decl.value) {
                        if seen.insert(name.clone()) {
                            referenced.push(name);
                        }
                    }
                }
            });
        }

        StyleDetails::Ready {
            declared: extract_variables(&declarations),
            referenced,
        }
    }

    /// Write the transformed rules into the sync element.
    ///
    /// The element is only touched when the generated text differs from the
    /// last write.
    pub fn render(
        &mut self,
        doc: &mut Document,
        filter: &FilterConfig,
        variables: &VariableResolver,
        modifier: &mut ColorModifier,
    ) -> Result<()> {
        if !doc.is_connected(self.source) {
            return Ok(());
        }
        let Some(texts) = self.rule_texts(doc) else {
            return Ok(());
        };
        let texts = texts.to_vec();
        let revision = doc.sheet(self.source).map(|s| s.revision());

        let mut output: Vec<String> = Vec::new();
        for text in &texts {
            let rules = self.parsed_rules(text);
            for rule in rules {
                if let Some(rendered) = render_rule(rule, filter, variables, modifier) {
                    output.push(rendered.to_string());
                }
            }
        }
        let keep: FxHashSet<&str> = texts.iter().map(String::as_str).collect();
        self.parsed.retain(|text, _| keep.contains(text.as_str()));
        self.seen_revision = revision;

        let css = output.join("\n");
        if css.is_empty() && self.sync.filter(|&id| doc.contains_node(id)).is_none() {
            // Nothing to override yet: no element either
            self.last_output = Some(css);
            return Ok(());
        }
        let sync = self.insert_sync(doc)?;
        if self.last_output.as_deref() != Some(css.as_str()) || doc.text_content(sync) != css {
            trace!(source = ?self.source, rules = output.len(), "writing managed override");
            doc.replace_text(sync, &css)?;
            self.last_output = Some(css);
        }
        Ok(())
    }

    /// Ensure the sync element sits right after the source
    fn insert_sync(&mut self, doc: &mut Document) -> Result<NodeId> {
        let sync = match self.sync.filter(|&id| doc.contains_node(id)) {
            Some(id) => id,
            None => {
                let id = create_engine_style(doc, SYNC_CLASS)?;
                self.sync = Some(id);
                id
            }
        };
        if doc.previous_sibling(sync) != Some(self.source) {
            doc.insert_after(sync, self.source)?;
            if let Some(mut watcher) = self.sync_watcher.take() {
                watcher.stop(doc);
            }
        }
        if self.sync_watcher.as_ref().map_or(true, PositionWatcher::is_stopped) {
            self.sync_watcher = PositionWatcher::new(doc, sync, false);
        }
        Ok(sync)
    }

    /// Start observing the source element
    pub fn watch(&mut self, doc: &mut Document) -> Result<()> {
        if self.observer.is_some() {
            return Ok(());
        }
        let observer = doc.create_observer();
        let options = ObserveOptions::child_list()
            .with_attributes()
            .with_character_data()
            .with_subtree();
        if let Err(err) = doc.observe(observer, self.source, options) {
            doc.drop_observer(observer);
            return Err(err);
        }
        self.observer = Some(observer);
        if self.seen_revision.is_none() {
            self.seen_revision = doc.sheet(self.source).map(|s| s.revision());
        }
        Ok(())
    }

    /// Drain source mutations; returns whether an update was requested
    pub fn check_for_changes(&mut self, doc: &mut Document) -> bool {
        let Some(observer) = self.observer else {
            return false;
        };
        if doc.take_records(observer).is_empty() {
            return false;
        }
        let revision = doc.sheet(self.source).map(|s| s.revision());
        if revision != self.seen_revision {
            // A new href starts a new download
            self.load_failed = false;
        }
        self.notify(ManagerEvent::Update(self.source));
        true
    }

    /// Compare the sheet revision against the last render, catching CSSOM
    /// edits that produce no mutation records
    pub fn check_sheet_revision(&mut self, doc: &Document) -> bool {
        if self.observer.is_none() {
            return false;
        }
        let revision = doc.sheet(self.source).map(|s| s.revision());
        if revision == self.seen_revision {
            return false;
        }
        debug!(source = ?self.source, "sheet rules changed");
        self.seen_revision = revision;
        self.load_failed = false;
        self.notify(ManagerEvent::Update(self.source));
        true
    }

    /// Keep the sync element next to the source
    pub fn check_position(&mut self, doc: &mut Document) -> PositionCheck {
        match self.sync_watcher.as_mut() {
            Some(watcher) => watcher.check(doc),
            None => PositionCheck::InPlace,
        }
    }

    /// The external sheet arrived
    pub fn on_load(&mut self) {
        if self.is_loading {
            self.is_loading = false;
            self.notify(ManagerEvent::LoadingEnd(self.source));
        }
        self.notify(ManagerEvent::Update(self.source));
    }

    /// The external sheet failed to download
    pub fn on_error(&mut self) {
        warn!(source = ?self.source, "stylesheet failed to load");
        self.load_failed = true;
        if self.is_loading {
            self.is_loading = false;
            self.notify(ManagerEvent::LoadingEnd(self.source));
        }
    }

    /// The source was moved: put the sync element back after it
    pub fn restore(&mut self, doc: &mut Document) -> Result<()> {
        let Some(sync) = self.sync.filter(|&id| doc.contains_node(id)) else {
            return Ok(());
        };
        self.move_count += 1;
        if self.move_count > MAX_MOVE_COUNT {
            warn!(source = ?self.source, "style sheet was moved multiple times");
            return Ok(());
        }
        debug!(source = ?self.source, "restoring managed override");
        if let Some(mut watcher) = self.sync_watcher.take() {
            watcher.stop(doc);
        }
        doc.insert_after(sync, self.source)?;
        self.sync_watcher = PositionWatcher::new(doc, sync, false);
        Ok(())
    }

    /// Stop watching without touching the rendered output
    pub fn pause(&mut self, doc: &mut Document) {
        if let Some(observer) = self.observer.take() {
            doc.drop_observer(observer);
        }
        if let Some(mut watcher) = self.sync_watcher.take() {
            watcher.stop(doc);
        }
    }

    /// Drop memoized rule state; the next render rewrites the output
    pub fn clear_cache(&mut self) {
        self.parsed.clear();
        self.last_output = None;
    }

    /// Stop watching, remove the sync element and drop cached state
    pub fn destroy(&mut self, doc: &mut Document) -> Result<()> {
        self.pause(doc);
        if let Some(sync) = self.sync.take() {
            if doc.parent(sync).is_some() {
                doc.remove(sync)?;
            }
        }
        self.clear_cache();
        self.seen_revision = None;
        if self.is_loading {
            self.is_loading = false;
            self.notify(ManagerEvent::LoadingEnd(self.source));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{channel, Receiver};

    use super::*;

    fn style_in_head(doc: &mut Document, css: &str) -> NodeId {
        let head = doc.head().unwrap();
        let style = doc.create_element("style");
        doc.set_text_content(style, css).unwrap();
        doc.append_child(head, style).unwrap();
        style
    }

    fn manager(doc: &Document, source: NodeId) -> (StyleManager, Receiver<ManagerEvent>) {
        let (tx, rx) = channel();
        (StyleManager::new(doc, source, tx), rx)
    }

    fn render(doc: &mut Document, manager: &mut StyleManager, variables: &VariableResolver) -> String {
        let mut modifier = ColorModifier::new();
        manager
            .render(doc, &FilterConfig::dark(), variables, &mut modifier)
            .unwrap();
        doc.text_content(manager.sync_element().unwrap())
    }

    #[test]
    fn test_should_manage_style() {
        let mut doc = Document::new();
        let style = style_in_head(&mut doc, "");
        assert!(should_manage_style(&doc, style));

        let link = doc.create_element("link");
        doc.set_attribute(link, "rel", "icon").unwrap();
        assert!(!should_manage_style(&doc, link));
        doc.set_attribute(link, "rel", "Stylesheet").unwrap();
        assert!(should_manage_style(&doc, link));
        doc.set_attribute(link, "media", "print").unwrap();
        assert!(!should_manage_style(&doc, link));

        let own = create_engine_style(&mut doc, SYNC_CLASS).unwrap();
        assert!(!should_manage_style(&doc, own));
        assert!(!should_manage_style(&doc, doc.body().unwrap()));
    }

    #[test]
    fn test_modifiable_properties() {
        assert!(is_modifiable_property("color"));
        assert!(is_modifiable_property("background-color"));
        assert!(is_modifiable_property("border-left"));
        assert!(is_modifiable_property("--brand"));
        assert!(!is_modifiable_property("color-scheme"));
        assert!(!is_modifiable_property("margin"));
    }

    #[test]
    fn test_render_inverts_colors() {
        let mut doc = Document::new();
        let style = style_in_head(
            &mut doc,
            "body { color: #000; margin: 0 } @media screen { a { background: white url(x.png) } } @font-face { font-family: X }",
        );
        let (mut manager, _rx) = manager(&doc, style);
        let css = render(&mut doc, &mut manager, &VariableResolver::new());
        assert_eq!(
            css,
            "body { color: rgb(255, 255, 255); }\n@media screen { a { background: rgb(0, 0, 0) url(x.png); } }"
        );

        let sync = manager.sync_element().unwrap();
        assert_eq!(doc.next_sibling(style), Some(sync));
        assert_eq!(doc.get_attribute(sync, "class"), Some("darkreader darkreader--sync"));
    }

    #[test]
    fn test_render_is_stable() {
        let mut doc = Document::new();
        let style = style_in_head(&mut doc, "p { color: red !important }");
        let (mut manager, _rx) = manager(&doc, style);
        let first = render(&mut doc, &mut manager, &VariableResolver::new());
        assert!(first.contains("!important"));

        let head = doc.head().unwrap();
        let observer = doc.create_observer();
        doc.observe(observer, head, ObserveOptions::child_list().with_subtree())
            .unwrap();
        let second = render(&mut doc, &mut manager, &VariableResolver::new());
        assert_eq!(first, second);
        assert!(doc.take_records(observer).is_empty(), "no rewrite for identical output");
    }

    #[test]
    fn test_details_and_variables() {
        let mut doc = Document::new();
        let style = style_in_head(
            &mut doc,
            ":root { --base: #fff; --bg: var(--base) } body { background-color: var(--bg); color: var(--missing, black) }",
        );
        let (mut manager, _rx) = manager(&doc, style);

        let details = manager.details(&doc);
        let StyleDetails::Ready { declared, referenced } = details.clone() else {
            panic!("expected ready details, got {:?}", details);
        };
        assert!(details.has_variables());
        assert_eq!(declared.len(), 2);
        assert_eq!(referenced, vec!["--base", "--bg", "--missing"]);

        let mut variables = VariableResolver::new();
        variables.merge_and_resolve(declared);
        let css = render(&mut doc, &mut manager, &variables);
        assert!(css.contains("--base: rgb(0, 0, 0);"), "{}", css);
        assert!(css.contains("--bg: rgb(0, 0, 0);"), "{}", css);
        assert!(css.contains("background-color: rgb(0, 0, 0);"), "{}", css);
        assert!(css.contains("color: rgb(255, 255, 255);"), "{}", css);
    }

    #[test]
    fn test_link_loading_lifecycle() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let link = doc.create_element("link");
        doc.set_attribute(link, "rel", "stylesheet").unwrap();
        doc.set_attribute(link, "href", "/site.css").unwrap();
        doc.append_child(head, link).unwrap();

        let (mut manager, rx) = manager(&doc, link);
        assert_eq!(manager.details(&doc), StyleDetails::Loading);
        assert_eq!(manager.details(&doc), StyleDetails::Loading);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![ManagerEvent::LoadingStart(link)]);

        doc.complete_load(link, "a { color: black }").unwrap();
        manager.on_load();
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![ManagerEvent::LoadingEnd(link), ManagerEvent::Update(link)]
        );
        assert!(matches!(manager.details(&doc), StyleDetails::Ready { .. }));
    }

    #[test]
    fn test_failed_and_blocked_links() {
        let mut doc = Document::new();
        let head = doc.head().unwrap();
        let link = doc.create_element("link");
        doc.set_attribute(link, "rel", "stylesheet").unwrap();
        doc.set_attribute(link, "href", "https://cdn.example/a.css").unwrap();
        doc.append_child(head, link).unwrap();

        let (mut manager, rx) = manager(&doc, link);
        manager.details(&doc);
        doc.fail_load(link).unwrap();
        manager.on_error();
        assert_eq!(manager.details(&doc), StyleDetails::Unavailable);
        assert!(!manager.is_loading());
        assert_eq!(rx.try_iter().count(), 2);

        doc.block_cross_origin(link).unwrap();
        assert_eq!(
            manager.details(&doc),
            StyleDetails::Ready {
                declared: Vec::new(),
                referenced: Vec::new()
            }
        );
    }

    #[test]
    fn test_watch_reports_changes() {
        let mut doc = Document::new();
        let style = style_in_head(&mut doc, "a { color: black }");
        let (mut manager, rx) = manager(&doc, style);
        render(&mut doc, &mut manager, &VariableResolver::new());
        manager.watch(&mut doc).unwrap();
        assert!(!manager.check_for_changes(&mut doc));

        doc.set_text_content(style, "a { color: white }").unwrap();
        assert!(manager.check_for_changes(&mut doc));
        assert_eq!(rx.try_recv(), Ok(ManagerEvent::Update(style)));

        render(&mut doc, &mut manager, &VariableResolver::new());
        doc.insert_rule(style, "b { color: red }", 1).unwrap();
        assert!(!manager.check_for_changes(&mut doc), "CSSOM edits are silent");
        assert!(manager.check_sheet_revision(&doc));
        assert!(!manager.check_sheet_revision(&doc));
    }

    #[test]
    fn test_destroy_removes_sync() {
        let mut doc = Document::new();
        let style = style_in_head(&mut doc, "a { color: black }");
        let (mut manager, _rx) = manager(&doc, style);
        render(&mut doc, &mut manager, &VariableResolver::new());
        manager.watch(&mut doc).unwrap();
        let sync = manager.sync_element().unwrap();

        manager.destroy(&mut doc).unwrap();
        assert!(doc.parent(sync).is_none());
        assert!(!manager.is_watching());
        assert!(manager.sync_element().is_none());
    }

    #[test]
    fn test_sync_position_restored() {
        let mut doc = Document::new();
        let style = style_in_head(&mut doc, "a { color: black }");
        let (mut manager, _rx) = manager(&doc, style);
        render(&mut doc, &mut manager, &VariableResolver::new());
        let sync = manager.sync_element().unwrap();

        doc.remove(sync).unwrap();
        assert_eq!(manager.check_position(&mut doc), PositionCheck::Restored);
        assert_eq!(doc.next_sibling(style), Some(sync));
    }
}
