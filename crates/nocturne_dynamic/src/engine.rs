//! Dynamic theme orchestrator
//!
//! [`DynamicTheme`] owns everything the engine installs into a document and
//! drives it from a single thread:
//!
//! - [`DynamicTheme::apply`] installs the singleton overrides and, once
//!   `<head>` exists and the page is visible, one [`StyleManager`] per page
//!   stylesheet
//! - [`DynamicTheme::process`] reacts to whatever the document recorded since
//!   the last call (new or removed stylesheets, loads, visibility changes)
//! - [`DynamicTheme::frame`] additionally flushes the coalesced full render
//! - [`DynamicTheme::remove`] reverts every visible trace
//!
//! The host calls `process`/`frame` from its own loop; nothing here blocks or
//! spawns.

use std::sync::mpsc::{self, Receiver, Sender};

use indexmap::IndexMap;
use nocturne_css::VariableResolver;
use nocturne_dom::{Document, DocumentEvent, ListenerId, NodeId};
use nocturne_theme::{ColorModifier, DynamicThemeFix, FilterConfig, ThemeEngine};
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::inline_style::{
    inline_elements, inline_override_style, InlineStyleOverrides, InlineStyleWatcher,
};
use crate::lifecycle::{theme_lifecycle, LifecycleEvent, StateMachine, ThemeState};
use crate::meta_theme_color::MetaThemeColor;
use crate::overrides::{OverrideKind, OverrideTexts, StaticOverrides, ENGINE_CLASS};
use crate::scheduler::RenderScheduler;
use crate::style_manager::{should_manage_style, ManagerEvent, StyleDetails, StyleManager};
use crate::stylesheets::{fallback_style, invert_style, override_style, user_agent_style};
use crate::variables::element_variables;
use crate::watch::{HeadWaiter, StyleChanges, StyleWatcher};

/// Work queued behind the next full render
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterRender {
    /// Drop the fallback once nothing is loading
    CleanFallback,
}

fn log_dom_error(result: nocturne_dom::Result<()>, what: &str) {
    if let Err(err) = result {
        warn!(%err, "{what} failed");
    }
}

/// The dynamic dark theme for one document
pub struct DynamicTheme {
    lifecycle: StateMachine<ThemeState, LifecycleEvent>,
    filter: Option<FilterConfig>,
    fix: DynamicThemeFix,
    is_iframe: bool,

    modifier: ColorModifier,
    variables: VariableResolver,
    managers: IndexMap<NodeId, StyleManager>,
    /// Managers whose sheet load is holding the fallback
    loading: FxHashSet<NodeId>,
    did_document_show_up: bool,

    overrides: StaticOverrides,
    inline_overrides: InlineStyleOverrides,
    meta_theme_color: MetaThemeColor,
    scheduler: RenderScheduler<AfterRender>,

    style_watcher: Option<StyleWatcher>,
    inline_watcher: Option<InlineStyleWatcher>,
    head_waiter: Option<HeadWaiter>,
    waiting_for_visibility: bool,
    events: Option<ListenerId>,

    notifier: Sender<ManagerEvent>,
    updates: Receiver<ManagerEvent>,
}

impl Default for DynamicTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicTheme {
    pub fn new() -> Self {
        let (notifier, updates) = mpsc::channel();
        Self {
            lifecycle: theme_lifecycle(),
            filter: None,
            fix: DynamicThemeFix::default(),
            is_iframe: false,
            modifier: ColorModifier::new(),
            variables: VariableResolver::new(),
            managers: IndexMap::new(),
            loading: FxHashSet::default(),
            did_document_show_up: false,
            overrides: StaticOverrides::new(),
            inline_overrides: InlineStyleOverrides::new(),
            meta_theme_color: MetaThemeColor::new(),
            scheduler: RenderScheduler::new(),
            style_watcher: None,
            inline_watcher: None,
            head_waiter: None,
            waiting_for_visibility: false,
            events: None,
            notifier,
            updates,
        }
    }

    pub fn state(&self) -> ThemeState {
        self.lifecycle.current_state()
    }

    pub fn filter(&self) -> Option<&FilterConfig> {
        self.filter.as_ref()
    }

    pub fn variables(&self) -> &VariableResolver {
        &self.variables
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    pub fn is_managed(&self, node: NodeId) -> bool {
        self.managers.contains_key(&node)
    }

    /// Managed override element rendered for `source`
    pub fn sync_element(&self, source: NodeId) -> Option<NodeId> {
        self.managers.get(&source).and_then(StyleManager::sync_element)
    }

    /// Whether a coalesced render is waiting for [`DynamicTheme::frame`]
    pub fn needs_frame(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Apply or re-apply the theme.
    ///
    /// Fails before touching the document when `filter` selects another
    /// engine. Calling it again while active re-renders everything with the
    /// new settings.
    pub fn apply(
        &mut self,
        doc: &mut Document,
        filter: FilterConfig,
        fix: DynamicThemeFix,
        is_iframe: bool,
    ) -> Result<()> {
        if filter.engine != ThemeEngine::DynamicTheme {
            return Err(EngineError::UnsupportedEngine(filter.engine));
        }

        let previous = self.lifecycle.current_state();
        self.filter = Some(filter);
        self.fix = fix;
        self.is_iframe = is_iframe;
        doc.set_sheetless_class(Some(ENGINE_CLASS));
        if self.events.is_none() {
            self.events = Some(doc.listen());
        }
        self.lifecycle.send(LifecycleEvent::Apply);

        match previous {
            ThemeState::DynamicActive => {
                debug!(managers = self.managers.len(), "re-applying dynamic theme");
                self.scheduler.cancel();
                self.install_static_overrides(doc);
                self.inline_overrides.clear();
                self.override_inline_styles(doc);
                self.render_all(doc);
                self.clean_fallback_when_idle(doc);
                self.change_meta_theme_color(doc);
            }
            ThemeState::StaticOverridesReady if self.head_waiter.is_some() => {
                self.install_fallback_only(doc);
            }
            ThemeState::StaticOverridesReady => {
                self.install_static_overrides(doc);
            }
            ThemeState::Uninitialized | ThemeState::TornDown => {
                info!(iframe = is_iframe, "applying dynamic theme");
                self.did_document_show_up = !doc.hidden();
                if doc.head().is_some() {
                    self.create_theme_and_watch(doc);
                } else {
                    debug!("no head yet, installing fallback only");
                    self.install_fallback_only(doc);
                    self.head_waiter = HeadWaiter::new(doc);
                }
            }
        }
        Ok(())
    }

    /// Revert every visible trace of the theme. Safe to call repeatedly.
    pub fn remove(&mut self, doc: &mut Document) {
        if !self.is_applied() {
            return;
        }
        info!("removing dynamic theme");
        self.scheduler.cancel();
        if let Some(waiter) = self.head_waiter.take() {
            waiter.cancel(doc);
        }
        self.waiting_for_visibility = false;
        self.stop_watching(doc);

        log_dom_error(self.overrides.remove_fallback(doc), "removing fallback");
        log_dom_error(self.meta_theme_color.restore(doc), "restoring meta theme color");
        log_dom_error(self.overrides.remove_others(doc), "removing overrides");
        for (_, mut manager) in self.managers.drain(..) {
            log_dom_error(manager.destroy(doc), "destroying style manager");
        }
        // Anything a previous instance left behind
        for leftover in doc.elements_by_class(ENGINE_CLASS) {
            log_dom_error(doc.remove(leftover), "removing leftover override");
        }
        log_dom_error(self.inline_overrides.restore_all(doc), "restoring inline styles");

        self.modifier.clear();
        self.variables.clear();
        self.loading.clear();
        while self.updates.try_recv().is_ok() {}
        doc.set_sheetless_class(None);
        self.lifecycle.send(LifecycleEvent::Remove);
    }

    /// Drop memoized colors and parsed rules without touching the document
    pub fn clear_caches(&mut self) {
        self.modifier.clear();
        for manager in self.managers.values_mut() {
            manager.clear_cache();
        }
        self.inline_overrides.clear();
    }

    /// React to everything the document recorded since the last call
    pub fn process(&mut self, doc: &mut Document) {
        if !self.is_applied() {
            return;
        }

        if let Some(waiter) = self.head_waiter.as_mut() {
            if waiter.poll(doc).is_some() {
                if let Some(waiter) = self.head_waiter.take() {
                    waiter.cancel(doc);
                }
                debug!("head appeared");
                self.create_theme_and_watch(doc);
            }
        }

        self.process_events(doc);

        if let Some(watcher) = self.style_watcher.as_mut() {
            let changes = watcher.take_changes(doc);
            if !changes.is_empty() {
                self.handle_style_changes(doc, changes);
            }
        }

        self.overrides.check_positions(doc);
        for manager in self.managers.values_mut() {
            manager.check_position(doc);
        }

        self.process_inline_styles(doc);

        for manager in self.managers.values_mut() {
            manager.check_for_changes(doc);
        }

        if let Some(filter) = self.filter.as_ref() {
            log_dom_error(
                self.meta_theme_color.process(doc, filter, &mut self.modifier),
                "changing meta theme color",
            );
        }

        self.drain_manager_events(doc);
    }

    /// [`DynamicTheme::process`] plus sheet polling and the coalesced render
    pub fn frame(&mut self, doc: &mut Document) {
        self.process(doc);
        if !self.lifecycle.is_in(ThemeState::DynamicActive) {
            return;
        }
        // CSSOM edits produce no mutation records
        for manager in self.managers.values_mut() {
            manager.check_sheet_revision(doc);
        }
        self.drain_manager_events(doc);

        if let Some(actions) = self.scheduler.take() {
            self.render_all(doc);
            for action in actions {
                match action {
                    AfterRender::CleanFallback => {
                        if self.loading.is_empty() {
                            self.clean_fallback(doc);
                        }
                    }
                }
            }
        }
    }

    fn is_applied(&self) -> bool {
        self.lifecycle.is_in(ThemeState::StaticOverridesReady)
            || self.lifecycle.is_in(ThemeState::DynamicActive)
    }

    fn install_fallback_only(&mut self, doc: &mut Document) {
        let Some(filter) = self.filter.as_ref() else {
            return;
        };
        let css = fallback_style(&mut self.modifier, filter, true);
        log_dom_error(self.overrides.install_fallback_only(doc, &css), "installing fallback");
    }

    fn install_static_overrides(&mut self, doc: &mut Document) {
        let (Some(filter), Some(head)) = (self.filter.as_ref(), doc.head()) else {
            return;
        };
        let texts = OverrideTexts {
            fallback: fallback_style(&mut self.modifier, filter, true),
            user_agent: user_agent_style(&mut self.modifier, filter, self.is_iframe),
            text: String::new(),
            invert: invert_style(&self.fix, filter),
            inline: inline_override_style(),
            fix: override_style(&self.fix, &mut self.modifier, filter),
        };
        log_dom_error(self.overrides.install(doc, head, &texts), "installing overrides");
    }

    fn create_theme_and_watch(&mut self, doc: &mut Document) {
        self.install_static_overrides(doc);
        if doc.hidden() {
            debug!("document hidden, deferring dynamic theme");
            self.waiting_for_visibility = true;
        } else {
            self.activate(doc);
        }
    }

    fn activate(&mut self, doc: &mut Document) {
        self.lifecycle.send(LifecycleEvent::Activate);
        self.create_dynamic_style_overrides(doc);
        self.watch_for_updates(doc);
        self.change_meta_theme_color(doc);
    }

    fn create_dynamic_style_overrides(&mut self, doc: &mut Document) {
        self.scheduler.cancel();
        self.update_root_variables(doc);
        let styles: Vec<NodeId> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|&node| should_manage_style(doc, node) && !self.managers.contains_key(&node))
            .collect();
        debug!(styles = styles.len(), "creating style managers");
        self.adopt_styles(doc, &styles, true);
        self.override_inline_styles(doc);
    }

    fn watch_for_updates(&mut self, doc: &mut Document) {
        if self.style_watcher.is_none() {
            self.style_watcher = StyleWatcher::new(doc);
        }
        if self.inline_watcher.is_none() {
            self.inline_watcher = InlineStyleWatcher::new(doc);
        }
    }

    fn stop_watching(&mut self, doc: &mut Document) {
        if let Some(watcher) = self.style_watcher.take() {
            watcher.stop(doc);
        }
        if let Some(watcher) = self.inline_watcher.take() {
            watcher.stop(doc);
        }
        if let Some(listener) = self.events.take() {
            doc.unlisten(listener);
        }
        self.overrides.stop_watching(doc);
        self.meta_theme_color.stop(doc);
        for manager in self.managers.values_mut() {
            manager.pause(doc);
        }
    }

    /// Create, render and watch managers for new stylesheets.
    ///
    /// Newly declared variables can change any managed sheet, so in that case
    /// the render is deferred to a full render on the next frame.
    fn adopt_styles(&mut self, doc: &mut Document, styles: &[NodeId], clean_fallback: bool) {
        let mut declared = Vec::new();
        for &node in styles {
            let mut manager = StyleManager::new(doc, node, self.notifier.clone());
            if let StyleDetails::Ready { declared: vars, .. } = manager.details(doc) {
                declared.extend(vars);
            }
            self.managers.insert(node, manager);
        }
        // Loading sheets must be known before deciding on the fallback
        self.drain_manager_events(doc);

        let report = self.variables.merge_and_resolve(declared);
        if let Some(cycle) = &report.cycle {
            warn!(%cycle, "variable resolution stopped early");
        }
        if report.is_unchanged() {
            for &node in styles {
                self.render_manager(doc, node);
            }
            if clean_fallback && self.loading.is_empty() {
                self.clean_fallback(doc);
            }
        } else {
            debug!(added = report.added.len(), changed = report.changed.len(), "variables changed");
            self.scheduler
                .request(clean_fallback.then_some(AfterRender::CleanFallback));
        }

        for &node in styles {
            if let Some(manager) = self.managers.get_mut(&node) {
                log_dom_error(manager.watch(doc), "watching stylesheet");
            }
        }
    }

    fn handle_style_changes(&mut self, doc: &mut Document, changes: StyleChanges) {
        for node in changes.removed {
            self.remove_manager(doc, node);
        }
        for node in changes.moved {
            if let Some(manager) = self.managers.get_mut(&node) {
                log_dom_error(manager.restore(doc), "restoring moved override");
            }
        }
        let fresh: Vec<NodeId> = changes
            .created
            .into_iter()
            .chain(changes.updated)
            .filter(|node| !self.managers.contains_key(node))
            .collect();
        if !fresh.is_empty() {
            self.adopt_styles(doc, &fresh, false);
        }
    }

    fn remove_manager(&mut self, doc: &mut Document, node: NodeId) {
        if let Some(mut manager) = self.managers.shift_remove(&node) {
            debug!(source = ?node, "stylesheet gone, removing its override");
            log_dom_error(manager.destroy(doc), "destroying style manager");
        }
    }

    fn render_manager(&mut self, doc: &mut Document, node: NodeId) {
        let (Some(filter), Some(manager)) = (self.filter.as_ref(), self.managers.get_mut(&node))
        else {
            return;
        };
        log_dom_error(
            manager.render(doc, filter, &self.variables, &mut self.modifier),
            "rendering stylesheet",
        );
    }

    fn render_all(&mut self, doc: &mut Document) {
        let Some(filter) = self.filter.as_ref() else {
            return;
        };
        for manager in self.managers.values_mut() {
            log_dom_error(
                manager.render(doc, filter, &self.variables, &mut self.modifier),
                "rendering stylesheet",
            );
        }
    }

    fn update_root_variables(&mut self, doc: &Document) -> bool {
        let Some(root) = doc.document_element() else {
            return false;
        };
        let report = self.variables.merge_and_resolve(element_variables(doc, root));
        !report.is_unchanged()
    }

    fn override_inline_styles(&mut self, doc: &mut Document) {
        let Some(filter) = self.filter.as_ref() else {
            return;
        };
        for node in inline_elements(doc) {
            log_dom_error(
                self.inline_overrides
                    .override_element(doc, node, filter, &mut self.modifier),
                "overriding inline style",
            );
        }
    }

    fn process_inline_styles(&mut self, doc: &mut Document) {
        let Some(watcher) = self.inline_watcher.as_mut() else {
            return;
        };
        let elements = watcher.take_elements(doc);
        if elements.is_empty() {
            return;
        }
        let root = doc.document_element();
        if let Some(filter) = self.filter.as_ref() {
            for &node in &elements {
                log_dom_error(
                    self.inline_overrides
                        .override_element(doc, node, filter, &mut self.modifier),
                    "overriding inline style",
                );
            }
        }
        if root.is_some_and(|root| elements.contains(&root)) && self.update_root_variables(doc) {
            self.scheduler.request(None);
        }
    }

    fn change_meta_theme_color(&mut self, doc: &mut Document) {
        let Some(filter) = self.filter.as_ref() else {
            return;
        };
        log_dom_error(
            self.meta_theme_color
                .change_when_available(doc, filter, &mut self.modifier),
            "changing meta theme color",
        );
    }

    fn process_events(&mut self, doc: &mut Document) {
        let Some(listener) = self.events else {
            return;
        };
        for event in doc.take_events(listener) {
            match event {
                DocumentEvent::VisibilityChange { hidden: false } => {
                    self.did_document_show_up = true;
                    if self.waiting_for_visibility {
                        self.waiting_for_visibility = false;
                        debug!("document visible, activating");
                        self.activate(doc);
                    }
                }
                DocumentEvent::VisibilityChange { hidden: true } => {}
                DocumentEvent::ReadyStateChange(state) => {
                    if state.is_page_loaded() && self.lifecycle.is_in(ThemeState::DynamicActive) {
                        self.clean_fallback_when_idle(doc);
                    }
                }
                DocumentEvent::Load(node) => {
                    if let Some(manager) = self.managers.get_mut(&node) {
                        manager.on_load();
                    }
                }
                DocumentEvent::Error(node) => {
                    if let Some(manager) = self.managers.get_mut(&node) {
                        manager.on_error();
                    }
                }
            }
        }
    }

    fn drain_manager_events(&mut self, doc: &mut Document) {
        while let Ok(event) = self.updates.try_recv() {
            match event {
                ManagerEvent::LoadingStart(node) => self.on_loading_start(doc, node),
                ManagerEvent::LoadingEnd(node) => self.on_loading_end(doc, node),
                ManagerEvent::Update(node) => self.on_manager_update(doc, node),
            }
        }
    }

    fn on_manager_update(&mut self, doc: &mut Document, node: NodeId) {
        let Some(manager) = self.managers.get_mut(&node) else {
            return;
        };
        let StyleDetails::Ready { declared, .. } = manager.details(doc) else {
            return;
        };
        if !declared.is_empty() && !self.variables.merge_and_resolve(declared).is_unchanged() {
            self.scheduler.request(None);
            return;
        }
        self.render_manager(doc, node);
    }

    fn on_loading_start(&mut self, doc: &mut Document, node: NodeId) {
        if doc.ready_state().is_page_loaded() && self.did_document_show_up {
            return;
        }
        self.loading.insert(node);
        if self.overrides.fallback_text(doc).is_some_and(|text| text.is_empty()) {
            if let Some(filter) = self.filter.as_ref() {
                let css = fallback_style(&mut self.modifier, filter, false);
                log_dom_error(
                    self.overrides.update_text(doc, OverrideKind::Fallback, &css),
                    "restoring fallback",
                );
            }
        }
    }

    fn on_loading_end(&mut self, doc: &mut Document, node: NodeId) {
        self.loading.remove(&node);
        if self.loading.is_empty() && doc.ready_state().is_page_loaded() {
            self.clean_fallback(doc);
        }
    }

    fn clean_fallback_when_idle(&mut self, doc: &mut Document) {
        if self.loading.is_empty() {
            self.clean_fallback(doc);
        }
    }

    fn clean_fallback(&mut self, doc: &mut Document) {
        log_dom_error(self.overrides.clean_fallback(doc), "cleaning fallback");
    }
}
