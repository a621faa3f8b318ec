//! Custom properties declared inline on an element

use nocturne_css::{extract_variables, parse_declarations, Declaration};
use nocturne_dom::{Document, NodeId};

/// Prefix of the engine's own inline custom properties
const ENGINE_PROPERTY_PREFIX: &str = "--darkreader";

/// `--name: value` pairs from an element's `style` attribute, skipping the
/// engine's own inline properties
pub fn element_variables(doc: &Document, node: NodeId) -> Vec<(String, String)> {
    let declarations: Vec<Declaration> = doc
        .get_attribute(node, "style")
        .map(parse_declarations)
        .unwrap_or_default()
        .into_iter()
        .filter(|d| !d.name.starts_with(ENGINE_PROPERTY_PREFIX))
        .collect();
    extract_variables(&declarations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_variables() {
        let mut doc = Document::new();
        let html = doc.document_element().unwrap();
        assert!(element_variables(&doc, html).is_empty());

        doc.set_attribute(
            html,
            "style",
            "--base: #fff; color: red; --accent: var(--base); --darkreader-inline-color: red; --base: #eee",
        )
        .unwrap();
        assert_eq!(
            element_variables(&doc, html),
            vec![
                ("--base".to_string(), "#eee".to_string()),
                ("--accent".to_string(), "var(--base)".to_string()),
            ]
        );
    }
}
