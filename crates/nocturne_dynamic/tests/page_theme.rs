//! Whole-page behavior of the dynamic theme against a host document

use nocturne_dom::{Document, NodeId, ObserveOptions, ReadyState};
use nocturne_dynamic::{
    DynamicTheme, EngineError, OverrideKind, ThemeState, ENGINE_CLASS, SYNC_CLASS,
};
use nocturne_theme::{DynamicThemeFix, FilterConfig, ThemeEngine};

fn style_in(doc: &mut Document, parent: NodeId, css: &str) -> NodeId {
    let style = doc.create_element("style");
    doc.set_text_content(style, css).unwrap();
    doc.append_child(parent, style).unwrap();
    style
}

fn head_style(doc: &mut Document, css: &str) -> NodeId {
    let head = doc.head().unwrap();
    style_in(doc, head, css)
}

fn applied(doc: &mut Document, fix: DynamicThemeFix) -> DynamicTheme {
    let mut theme = DynamicTheme::new();
    theme.apply(doc, FilterConfig::dark(), fix, false).unwrap();
    theme
}

fn override_text(doc: &Document, kind: OverrideKind) -> String {
    let nodes = doc.elements_by_class(kind.class_name());
    assert_eq!(nodes.len(), 1, "{} should be a singleton", kind.class_name());
    doc.text_content(nodes[0])
}

#[test]
fn black_text_turns_light() {
    let mut doc = Document::new();
    let style = head_style(&mut doc, "p { color: black; }");
    let theme = applied(&mut doc, DynamicThemeFix::default());

    let sync = theme.sync_element(style).unwrap();
    assert!(doc.has_class(sync, SYNC_CLASS));
    assert_eq!(doc.text_content(sync), "p { color: rgb(255, 255, 255); }");
}

#[test]
fn static_overrides_are_ordered_in_head() {
    let mut doc = Document::new();
    let page = head_style(&mut doc, "p { color: black; }");
    let theme = applied(&mut doc, DynamicThemeFix::default());

    let head = doc.head().unwrap();
    let children = doc.children(head).to_vec();
    let classes: Vec<&str> = [
        OverrideKind::Fallback,
        OverrideKind::UserAgent,
        OverrideKind::Text,
        OverrideKind::Invert,
        OverrideKind::Inline,
    ]
    .iter()
    .map(|kind| kind.class_name())
    .collect();
    for (child, class) in children.iter().zip(&classes) {
        assert!(doc.has_class(*child, class));
        assert_eq!(doc.get_attribute(*child, "media"), Some("screen"));
    }
    assert_eq!(children[5], page);
    assert_eq!(Some(children[6]), theme.sync_element(page));
    assert!(doc.has_class(children[7], OverrideKind::Override.class_name()));
    assert_eq!(children.len(), 8);
}

#[test]
fn invert_block_only_in_dark_mode() {
    let fix = DynamicThemeFix::new("", vec![".logo".to_string(), "img.icon".to_string()]);
    let mut doc = Document::new();
    let mut theme = applied(&mut doc, fix.clone());

    let invert = override_text(&doc, OverrideKind::Invert);
    assert!(invert.starts_with(".logo, img.icon {\n    filter: invert(100%) hue-rotate(180deg)"));
    assert!(invert.ends_with("!important;\n}"));

    theme.apply(&mut doc, FilterConfig::light(), fix, false).unwrap();
    assert_eq!(override_text(&doc, OverrideKind::Invert), "");
}

#[test]
fn fix_css_templates_and_user_stylesheet() {
    let mut filter = FilterConfig::dark();
    filter.stylesheet = Some(".user { outline: none; }".to_string());
    let fix = DynamicThemeFix::new(".banner { color: ${black}; }", Vec::new());

    let mut doc = Document::new();
    let mut theme = DynamicTheme::new();
    theme.apply(&mut doc, filter, fix, false).unwrap();
    assert_eq!(
        override_text(&doc, OverrideKind::Override),
        ".banner { color: rgb(255, 255, 255); }\n.user { outline: none; }"
    );
}

#[test]
fn variables_render_after_a_frame() {
    let mut doc = Document::new();
    let style = head_style(
        &mut doc,
        ":root { --bg: white; --base: var(--bg); } body { background-color: var(--base); }",
    );
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    assert!(theme.needs_frame());
    assert_eq!(theme.variables().get("--base"), Some("white"));

    theme.frame(&mut doc);
    assert!(!theme.needs_frame());
    let sync = theme.sync_element(style).unwrap();
    assert!(doc
        .text_content(sync)
        .contains("body { background-color: rgb(0, 0, 0); }"));
}

#[test]
fn nested_variable_resolves_to_transformed_color() {
    let mut doc = Document::new();
    let style = head_style(
        &mut doc,
        ":root { --base: #fff; --bg: var(--base); }\n.dark { --bg: #000; }",
    );
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    theme.frame(&mut doc);

    let sync = theme.sync_element(style).unwrap();
    assert_eq!(
        doc.text_content(sync),
        ":root { --base: rgb(0, 0, 0); --bg: rgb(0, 0, 0); }\n.dark { --bg: rgb(255, 255, 255); }"
    );
}

#[test]
fn cyclic_variables_render_as_declared() {
    let mut doc = Document::new();
    let style = head_style(
        &mut doc,
        ":root{--a: var(--b) red; --b: var(--a)} p{color: var(--a)}",
    );
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    theme.frame(&mut doc);

    assert_eq!(theme.variables().get("--a"), Some("var(--b) red"));
    let sync = theme.sync_element(style).unwrap();
    let text = doc.text_content(sync);
    assert!(text.contains("--a: var(--b) rgb(255, 85, 85);"), "{text}");
    assert!(text.len() < 256, "sync output grew to {} bytes", text.len());

    theme.frame(&mut doc);
    assert_eq!(doc.text_content(sync), text);
}

#[test]
fn root_inline_variables_reach_other_sheets() {
    let mut doc = Document::new();
    let html = doc.document_element().unwrap();
    let style = head_style(&mut doc, "main { color: var(--ink); }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    theme.frame(&mut doc);

    doc.set_attribute(html, "style", "--ink: black").unwrap();
    theme.frame(&mut doc);
    assert_eq!(theme.variables().get("--ink"), Some("black"));
    let sync = theme.sync_element(style).unwrap();
    assert_eq!(doc.text_content(sync), "main { color: rgb(255, 255, 255); }");
}

#[test]
fn reapply_with_same_settings_changes_nothing() {
    let mut doc = Document::new();
    let style = head_style(&mut doc, "a { color: black; background: white; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    theme.frame(&mut doc);
    let sync = theme.sync_element(style).unwrap();
    let before = doc.text_content(sync);

    let observer = doc.create_observer();
    let options = ObserveOptions::child_list().with_character_data().with_subtree();
    doc.observe(observer, sync, options).unwrap();
    theme
        .apply(&mut doc, FilterConfig::dark(), DynamicThemeFix::default(), false)
        .unwrap();
    theme.frame(&mut doc);

    assert_eq!(doc.text_content(sync), before);
    assert!(doc.take_records(observer).is_empty());
}

#[test]
fn remove_then_reapply_leaves_one_of_each_override() {
    let mut doc = Document::new();
    head_style(&mut doc, "p { color: black; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());

    theme.remove(&mut doc);
    assert!(doc.elements_by_class(ENGINE_CLASS).is_empty());
    theme
        .apply(&mut doc, FilterConfig::dark(), DynamicThemeFix::default(), false)
        .unwrap();

    for kind in OverrideKind::ALL {
        assert_eq!(doc.elements_by_class(kind.class_name()).len(), 1);
    }
    assert_eq!(doc.elements_by_class(SYNC_CLASS).len(), 1);
    assert_eq!(doc.elements_by_class(ENGINE_CLASS).len(), 7);
}

#[test]
fn removed_stylesheet_loses_its_override_within_a_frame() {
    let mut doc = Document::new();
    let style = head_style(&mut doc, "p { color: black; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    let sync = theme.sync_element(style).unwrap();

    doc.remove(style).unwrap();
    theme.frame(&mut doc);
    assert!(!theme.is_managed(style));
    assert!(!doc.is_connected(sync));
    assert!(doc.elements_by_class(SYNC_CLASS).is_empty());
}

#[test]
fn added_stylesheet_is_managed() {
    let mut doc = Document::new();
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    let body = doc.body().unwrap();
    let style = style_in(&mut doc, body, "div { border-color: black; }");

    theme.frame(&mut doc);
    let sync = theme.sync_element(style).unwrap();
    assert_eq!(doc.next_sibling(style), Some(sync));
    assert_eq!(doc.text_content(sync), "div { border-color: rgb(255, 255, 255); }");
}

#[test]
fn moved_stylesheet_keeps_its_override_next_to_it() {
    let mut doc = Document::new();
    let style = head_style(&mut doc, "p { color: black; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    let sync = theme.sync_element(style).unwrap();

    let body = doc.body().unwrap();
    doc.append_child(body, style).unwrap();
    theme.frame(&mut doc);
    assert!(theme.is_managed(style));
    assert_eq!(theme.sync_element(style), Some(sync));
    assert_eq!(doc.next_sibling(style), Some(sync));
}

#[test]
fn edited_stylesheet_is_rerendered() {
    let mut doc = Document::new();
    let style = head_style(&mut doc, "p { color: black; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());

    doc.set_text_content(style, "p { color: white; }").unwrap();
    theme.frame(&mut doc);
    let sync = theme.sync_element(style).unwrap();
    assert_eq!(doc.text_content(sync), "p { color: rgb(0, 0, 0); }");

    doc.insert_rule(style, "h1 { color: black; }", 1).unwrap();
    theme.frame(&mut doc);
    assert_eq!(
        doc.text_content(sync),
        "p { color: rgb(0, 0, 0); }\nh1 { color: rgb(255, 255, 255); }"
    );
}

#[test]
fn rerenders_rewrite_the_same_text_node() {
    let mut doc = Document::new();
    let style = head_style(&mut doc, "p { color: black; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    let sync = theme.sync_element(style).unwrap();
    let text = doc.first_child(sync).unwrap();
    assert!(doc.sheet(sync).is_none());
    assert!(doc.sheet(style).is_some());

    for css in ["p { color: white; }", "p { color: black; }", "p { color: red; }"] {
        doc.set_text_content(style, css).unwrap();
        theme.frame(&mut doc);
        assert_eq!(doc.children(sync), &[text]);
    }
    assert!(doc.text_content(sync).starts_with("p { color: rgb("));
    assert!(doc.sheet(sync).is_none());

    theme.remove(&mut doc);
    let plain = head_style(&mut doc, "a { color: red; }");
    assert!(doc.sheet(plain).is_some());
}

#[test]
fn waits_for_head() {
    let mut doc = Document::without_head();
    let html = doc.document_element().unwrap();
    let mut theme = applied(&mut doc, DynamicThemeFix::default());

    assert_eq!(theme.state(), ThemeState::StaticOverridesReady);
    let fallback = doc.elements_by_class(OverrideKind::Fallback.class_name());
    assert_eq!(fallback.len(), 1);
    assert_eq!(doc.parent(fallback[0]), Some(html));
    assert_eq!(doc.elements_by_class(ENGINE_CLASS).len(), 1);

    let head = doc.create_element("head");
    let first = doc.first_child(html);
    doc.insert_before(html, head, first).unwrap();
    let style = style_in(&mut doc, head, "p { color: black; }");
    theme.process(&mut doc);

    assert_eq!(theme.state(), ThemeState::DynamicActive);
    assert_eq!(doc.parent(fallback[0]), Some(head));
    assert!(theme.is_managed(style));
    for kind in OverrideKind::ALL {
        assert_eq!(doc.elements_by_class(kind.class_name()).len(), 1);
    }
}

#[test]
fn waits_for_visibility() {
    let mut doc = Document::new();
    doc.set_hidden(true);
    let style = head_style(&mut doc, "p { color: black; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());

    assert_eq!(theme.state(), ThemeState::StaticOverridesReady);
    assert_eq!(theme.manager_count(), 0);
    assert_eq!(doc.elements_by_class(ENGINE_CLASS).len(), 6);

    theme.process(&mut doc);
    assert_eq!(theme.state(), ThemeState::StaticOverridesReady);

    doc.set_hidden(false);
    theme.process(&mut doc);
    assert_eq!(theme.state(), ThemeState::DynamicActive);
    assert!(theme.sync_element(style).is_some());
}

#[test]
fn loaded_page_drops_fallback_while_link_loads() {
    let mut doc = Document::new();
    let head = doc.head().unwrap();
    let link = doc.create_element("link");
    doc.set_attribute(link, "rel", "stylesheet").unwrap();
    doc.set_attribute(link, "href", "late.css").unwrap();
    doc.append_child(head, link).unwrap();
    let mut theme = applied(&mut doc, DynamicThemeFix::default());

    assert_eq!(override_text(&doc, OverrideKind::Fallback), "");
    assert_eq!(theme.sync_element(link), None);

    doc.complete_load(link, "body { background-color: white; }").unwrap();
    theme.frame(&mut doc);
    let sync = theme.sync_element(link).unwrap();
    assert_eq!(doc.text_content(sync), "body { background-color: rgb(0, 0, 0); }");
}

#[test]
fn parsing_page_keeps_fallback_until_loaded() {
    let mut doc = Document::new();
    doc.set_ready_state(ReadyState::Loading);
    let head = doc.head().unwrap();
    let link = doc.create_element("link");
    doc.set_attribute(link, "rel", "stylesheet").unwrap();
    doc.set_attribute(link, "href", "broken.css").unwrap();
    doc.append_child(head, link).unwrap();
    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    assert!(!override_text(&doc, OverrideKind::Fallback).is_empty());

    doc.fail_load(link).unwrap();
    doc.set_ready_state(ReadyState::Interactive);
    theme.frame(&mut doc);
    assert_eq!(override_text(&doc, OverrideKind::Fallback), "");
    assert!(theme.is_managed(link));
}

#[test]
fn inline_styles_and_meta_are_restored() {
    let mut doc = Document::new();
    let head = doc.head().unwrap();
    let meta = doc.create_element("meta");
    doc.set_attribute(meta, "name", "theme-color").unwrap();
    doc.set_attribute(meta, "content", "#ffffff").unwrap();
    doc.append_child(head, meta).unwrap();
    let body = doc.body().unwrap();
    let div = doc.create_element("div");
    doc.set_attribute(div, "style", "background-color: white").unwrap();
    doc.append_child(body, div).unwrap();

    let mut theme = applied(&mut doc, DynamicThemeFix::default());
    assert_eq!(doc.get_attribute(meta, "content"), Some("rgb(0, 0, 0)"));
    assert_eq!(
        doc.get_attribute(div, "style"),
        Some("background-color: white; --darkreader-inline-bgcolor: rgb(0, 0, 0)")
    );
    assert!(doc.has_attribute(div, "data-darkreader-inline-bgcolor"));

    theme.remove(&mut doc);
    assert_eq!(doc.get_attribute(meta, "content"), Some("#ffffff"));
    assert_eq!(doc.get_attribute(div, "style"), Some("background-color: white"));
    assert!(!doc.has_attribute(div, "data-darkreader-inline-bgcolor"));
}

#[test]
fn other_engines_are_rejected() {
    let mut doc = Document::new();
    let mut filter = FilterConfig::dark();
    filter.engine = ThemeEngine::SvgFilter;

    let mut theme = DynamicTheme::new();
    let err = theme
        .apply(&mut doc, filter, DynamicThemeFix::default(), false)
        .unwrap_err();
    assert_eq!(err, EngineError::UnsupportedEngine(ThemeEngine::SvgFilter));
    assert_eq!(err.to_string(), "engine 'svgFilter' is not implemented by the dynamic theme");
    assert!(doc.elements_by_class(ENGINE_CLASS).is_empty());
}

#[test]
fn removal_is_idempotent_and_final() {
    let mut doc = Document::new();
    let style = head_style(&mut doc, "p { color: black; }");
    let mut theme = applied(&mut doc, DynamicThemeFix::default());

    theme.remove(&mut doc);
    theme.remove(&mut doc);
    assert_eq!(theme.state(), ThemeState::TornDown);

    doc.set_text_content(style, "p { color: white; }").unwrap();
    let body = doc.body().unwrap();
    style_in(&mut doc, body, "h1 { color: black; }");
    theme.frame(&mut doc);
    assert!(doc.elements_by_class(ENGINE_CLASS).is_empty());
    assert_eq!(doc.observer_count(), 0);
}
