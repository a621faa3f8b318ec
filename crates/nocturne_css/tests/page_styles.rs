//! Parsing behavior on stylesheet text shaped like real pages

use nocturne_css::{
    parse_stylesheet, split_rules, validate_selector, CssRule, Stylesheet, VariableResolver,
};

const FRAMEWORK_CSS: &str = r#"
:root {
    --brand: #0d6efd;
    --brand-text: var(--brand);
    --surface: var(--body-bg, #fff);
}
/* buttons */
.btn-primary { color: #fff; background-color: var(--brand); border: 1px solid var(--brand) }
.btn-primary:hover{background-color:#0b5ed7!important}
@media (prefers-reduced-motion: reduce) { .btn { transition: none } }
@font-face { font-family: "Inter"; src: url("inter.woff2") format("woff2") }
"#;

#[test]
fn framework_stylesheet_parses_cleanly() {
    let result = parse_stylesheet(FRAMEWORK_CSS);
    assert!(
        !result.has_errors(),
        "unexpected errors: {:?}",
        result.errors
    );
    assert_eq!(result.stylesheet.rules.len(), 5, "root, two buttons, media, font-face");

    let mut important = Vec::new();
    result.stylesheet.for_each_style_rule(|rule| {
        for decl in &rule.declarations {
            if decl.important {
                important.push((rule.selector.clone(), decl.value.clone()));
            }
        }
    });
    assert_eq!(
        important,
        vec![(".btn-primary:hover".to_string(), "#0b5ed7".to_string())]
    );
}

#[test]
fn root_variables_resolve_through_fallbacks() {
    let sheet = Stylesheet::parse(FRAMEWORK_CSS);
    let CssRule::Style(root) = &sheet.rules[0] else {
        panic!("first rule should be :root");
    };

    let mut resolver = VariableResolver::new();
    let report = resolver.merge_and_resolve(nocturne_css::extract_variables(&root.declarations));
    assert_eq!(report.added.len(), 3);
    assert!(report.cycle.is_none());
    assert_eq!(resolver.get("--brand-text"), Some("#0d6efd"));
    assert_eq!(resolver.get("--surface"), Some("#fff"), "unknown --body-bg falls back");
}

#[test]
fn split_rules_matches_parsed_rule_count() {
    let texts = split_rules(FRAMEWORK_CSS);
    let parsed = parse_stylesheet(FRAMEWORK_CSS).stylesheet;
    assert_eq!(texts.len(), parsed.rules.len());
    for text in &texts {
        let reparsed = parse_stylesheet(text);
        assert_eq!(reparsed.stylesheet.rules.len(), 1, "{text}");
    }
}

#[test]
fn generated_selectors_validate() {
    let sheet = Stylesheet::parse(FRAMEWORK_CSS);
    sheet.for_each_style_rule(|rule| {
        assert!(
            validate_selector(&rule.selector).is_ok(),
            "{} should validate",
            rule.selector
        );
    });
}
