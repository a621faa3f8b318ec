//! `<meta name="theme-color">` adaptation

use nocturne_dom::{Document, NodeId, ObserveOptions, ObserverId, Result};
use nocturne_theme::{ColorModifier, FilterConfig};
use tracing::{debug, warn};

const META_THEME_COLOR_NAME: &str = "theme-color";

fn is_theme_color_meta(doc: &Document, node: NodeId) -> bool {
    doc.tag_name(node) == Some("meta")
        && doc
            .get_attribute(node, "name")
            .is_some_and(|name| name.eq_ignore_ascii_case(META_THEME_COLOR_NAME))
}

fn find_meta(doc: &Document) -> Option<NodeId> {
    doc.elements_by_tag("meta")
        .into_iter()
        .find(|&n| is_theme_color_meta(doc, n))
}

/// Transforms the page's theme color and restores it on teardown
#[derive(Default)]
pub struct MetaThemeColor {
    original: Option<String>,
    observer: Option<ObserverId>,
}

impl MetaThemeColor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content the page declared before any transform
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    pub fn is_waiting(&self) -> bool {
        self.observer.is_some()
    }

    fn change(
        &mut self,
        doc: &mut Document,
        meta: NodeId,
        filter: &FilterConfig,
        modifier: &mut ColorModifier,
    ) -> Result<()> {
        if self.original.is_none() {
            self.original = doc.get_attribute(meta, "content").map(str::to_string);
        }
        let Some(original) = self.original.as_deref() else {
            return Ok(());
        };
        match modifier.transform(original.trim(), filter) {
            Ok(color) => doc.set_attribute(meta, "content", &color),
            Err(err) => {
                warn!(%err, content = original, "unable to transform meta theme color");
                Ok(())
            }
        }
    }

    /// Transform the meta now, or wait for it to be added to `<head>`
    pub fn change_when_available(
        &mut self,
        doc: &mut Document,
        filter: &FilterConfig,
        modifier: &mut ColorModifier,
    ) -> Result<()> {
        if let Some(meta) = find_meta(doc) {
            self.stop(doc);
            return self.change(doc, meta, filter, modifier);
        }
        if self.observer.is_some() {
            return Ok(());
        }
        let Some(head) = doc.head() else {
            return Ok(());
        };
        let observer = doc.create_observer();
        if let Err(err) = doc.observe(observer, head, ObserveOptions::child_list()) {
            doc.drop_observer(observer);
            return Err(err);
        }
        debug!("waiting for meta theme color");
        self.observer = Some(observer);
        Ok(())
    }

    /// Handle head mutations while waiting
    pub fn process(
        &mut self,
        doc: &mut Document,
        filter: &FilterConfig,
        modifier: &mut ColorModifier,
    ) -> Result<()> {
        let Some(observer) = self.observer else {
            return Ok(());
        };
        let added = doc
            .take_records(observer)
            .iter()
            .flat_map(|record| record.added_nodes().to_vec())
            .find(|&node| is_theme_color_meta(doc, node));
        if let Some(meta) = added {
            self.stop(doc);
            self.change(doc, meta, filter, modifier)?;
        }
        Ok(())
    }

    pub fn stop(&mut self, doc: &mut Document) {
        if let Some(observer) = self.observer.take() {
            doc.drop_observer(observer);
        }
    }

    /// Stop waiting and put the page's own value back
    pub fn restore(&mut self, doc: &mut Document) -> Result<()> {
        self.stop(doc);
        if let (Some(meta), Some(original)) = (find_meta(doc), self.original.take()) {
            doc.set_attribute(meta, "content", &original)?;
        }
        Ok(())
    }
}
