//! Stylesheet parser
//!
//! Parses arbitrary page CSS into a rule tree that keeps every selector and
//! declaration value as written, so it can be re-serialized after values are
//! rewritten. Unknown at-rules and properties are preserved rather than
//! rejected; the engine only needs to find and rewrite colors.
//!
//! Parsing never fails as a whole. Malformed constructs are skipped and
//! reported through [`CssParseResult::errors`], and parsing resumes at the
//! next rule boundary.
//!
//! # Example
//!
//! ```rust
//! use nocturne_css::{parse_stylesheet, CssRule};
//!
//! let result = parse_stylesheet("body { color: #000 } @media print { a { color: red } }");
//! assert!(result.errors.is_empty());
//! assert_eq!(result.stylesheet.rules.len(), 2);
//! assert!(matches!(result.stylesheet.rules[1], CssRule::Group(_)));
//! ```

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{char, multispace1},
    combinator::value,
    error::{ParseError as NomParseError, VerboseError},
    multi::many0,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use tracing::debug;

use crate::error::{ParseError, Severity};

/// Custom parser result type using VerboseError for better diagnostics
type ParseResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

/// At-rules whose block contains nested rules rather than declarations
const GROUP_AT_RULES: &[&str] = &[
    "media",
    "supports",
    "document",
    "-moz-document",
    "layer",
    "container",
    "scope",
    "keyframes",
    "-webkit-keyframes",
    "-moz-keyframes",
];

// ============================================================================
// Rule tree
// ============================================================================

/// A single `name: value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value: impl Into<String>, important: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            important,
        }
    }

    /// `--name` custom property
    pub fn is_custom_property(&self) -> bool {
        self.name.starts_with("--")
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)?;
        if self.important {
            write!(f, " !important")?;
        }
        Ok(())
    }
}

/// `selector { declarations }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

/// Conditional or keyframe block holding nested rules (`@media`, `@supports`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRule {
    /// At-keyword without `@`, lowercased
    pub name: String,
    pub prelude: String,
    pub rules: Vec<CssRule>,
}

/// At-rule with a declaration block (`@font-face`, `@page`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtBlockRule {
    pub name: String,
    pub prelude: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    Style(StyleRule),
    Group(GroupRule),
    AtBlock(AtBlockRule),
    /// Block-less at-rule such as `@import url(a.css);`, kept verbatim
    Statement(String),
}

fn write_declarations(f: &mut fmt::Formatter<'_>, declarations: &[Declaration]) -> fmt::Result {
    write!(f, "{{")?;
    for decl in declarations {
        write!(f, " {};", decl)?;
    }
    write!(f, " }}")
}

fn write_at_prelude(f: &mut fmt::Formatter<'_>, name: &str, prelude: &str) -> fmt::Result {
    if prelude.is_empty() {
        write!(f, "@{} ", name)
    } else {
        write!(f, "@{} {} ", name, prelude)
    }
}

impl fmt::Display for StyleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.selector)?;
        write_declarations(f, &self.declarations)
    }
}

impl fmt::Display for GroupRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_at_prelude(f, &self.name, &self.prelude)?;
        write!(f, "{{")?;
        for rule in &self.rules {
            write!(f, " {}", rule)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for AtBlockRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_at_prelude(f, &self.name, &self.prelude)?;
        write_declarations(f, &self.declarations)
    }
}

impl fmt::Display for CssRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CssRule::Style(rule) => write!(f, "{}", rule),
            CssRule::Group(rule) => write!(f, "{}", rule),
            CssRule::AtBlock(rule) => write!(f, "{}", rule),
            CssRule::Statement(text) => write!(f, "{}", text),
        }
    }
}

/// Parsed stylesheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse, logging diagnostics at debug level
    pub fn parse(css: &str) -> Self {
        let result = parse_stylesheet(css);
        result.log_diagnostics();
        result.stylesheet
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Visit every style rule, including those nested in group rules
    pub fn for_each_style_rule(&self, mut f: impl FnMut(&StyleRule)) {
        fn walk(rules: &[CssRule], f: &mut impl FnMut(&StyleRule)) {
            for rule in rules {
                match rule {
                    CssRule::Style(style) => f(style),
                    CssRule::Group(group) => walk(&group.rules, f),
                    CssRule::AtBlock(_) | CssRule::Statement(_) => {}
                }
            }
        }
        walk(&self.rules, &mut f);
    }
}

impl fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", rule)?;
        }
        Ok(())
    }
}

/// Result of parsing CSS with error collection
#[derive(Debug, Clone)]
pub struct CssParseResult {
    /// The parsed stylesheet (partial if errors occurred)
    pub stylesheet: Stylesheet,
    /// All errors and warnings collected during parsing
    pub errors: Vec<ParseError>,
}

impl CssParseResult {
    /// Check if parsing had any errors (not just warnings)
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Warning)
    }

    /// Log all errors and warnings via tracing
    pub fn log_diagnostics(&self) {
        for err in &self.errors {
            debug!(
                severity = %err.severity,
                line = err.line,
                column = err.column,
                message = %err.message,
                "CSS parse diagnostic"
            );
        }
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Parse a stylesheet, collecting diagnostics
pub fn parse_stylesheet(css: &str) -> CssParseResult {
    let mut errors = Vec::new();
    let rules = parse_rule_list(css, css, &mut errors);
    CssParseResult {
        stylesheet: Stylesheet { rules },
        errors,
    }
}

/// Parse a declaration list such as the contents of a `style` attribute
pub fn parse_declarations(text: &str) -> Vec<Declaration> {
    let mut errors = Vec::new();
    let declarations = parse_declaration_list(text, text, &mut errors);
    for err in &errors {
        debug!(message = %err.message, column = err.column, "inline declaration skipped");
    }
    declarations
}

/// Split stylesheet text into the source text of each top-level rule
///
/// This is what a CSSOM rule list holds: one entry per rule, comments and
/// stray tokens between rules dropped.
pub fn split_rules(css: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = skip_ws(css);

    while !remaining.is_empty() {
        let end = if remaining.starts_with('}') {
            remaining = skip_ws(&remaining[1..]);
            continue;
        } else {
            match find_top_level(remaining, b"{;") {
                Some(pos) if remaining.as_bytes()[pos] == b';' => pos + 1,
                Some(pos) => matching_brace(remaining, pos).map_or(remaining.len(), |c| c + 1),
                None => remaining.len(),
            }
        };

        let text = remaining[..end].trim();
        if !text.is_empty() && text != ";" {
            out.push(text.to_string());
        }
        remaining = skip_ws(&remaining[end..]);
    }

    out
}

// ============================================================================
// Parsers
// ============================================================================

/// Parse whitespace and comments
fn ws<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, (), E> {
    value(
        (),
        many0(alt((value((), multispace1), value((), parse_comment)))),
    )(input)
}

/// Parse a block comment /* ... */
fn parse_comment<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    delimited(tag("/*"), take_until("*/"), tag("*/"))(input)
}

/// Parse an identifier (alphanumeric, hyphen, underscore)
fn identifier<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    take_while1(|c: char| c.is_alphanumeric() || c == '-' || c == '_')(input)
}

/// `@name`
fn at_keyword(input: &str) -> ParseResult<&str> {
    preceded(char('@'), identifier)(input)
}

/// `name :` at the start of a declaration
fn declaration_head(input: &str) -> ParseResult<&str> {
    delimited(ws, terminated(identifier, tuple((ws, char(':')))), ws)(input)
}

fn skip_ws(input: &str) -> &str {
    match ws::<VerboseError<&str>>(input) {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

/// Slice of `original` starting where `part` starts
fn suffix<'a>(original: &'a str, part: &str) -> &'a str {
    let offset = (part.as_ptr() as usize).saturating_sub(original.as_ptr() as usize);
    original.get(offset..).unwrap_or("")
}

fn parse_rule_list(original: &str, input: &str, errors: &mut Vec<ParseError>) -> Vec<CssRule> {
    let mut rules = Vec::new();
    let mut remaining = skip_ws(input);

    while !remaining.is_empty() {
        if remaining.starts_with("/*") {
            errors.push(ParseError::at(
                Severity::Warning,
                "Unterminated comment",
                original,
                suffix(original, remaining),
            ));
            break;
        }

        if let Some(rest) = remaining.strip_prefix('}') {
            errors.push(ParseError::at(
                Severity::Warning,
                "Unmatched '}'",
                original,
                suffix(original, remaining),
            ));
            remaining = skip_ws(rest);
            continue;
        }

        if let Some(rest) = remaining
            .strip_prefix("<!--")
            .or_else(|| remaining.strip_prefix("-->"))
        {
            remaining = skip_ws(rest);
            continue;
        }

        let (rest, rule) = if remaining.starts_with('@') {
            parse_at_rule(original, remaining, errors)
        } else {
            parse_style_rule(original, remaining, errors)
        };
        if let Some(rule) = rule {
            rules.push(rule);
        }
        remaining = skip_ws(rest);
    }

    rules
}

/// Split `input` at the block opened at `open`, returning (body, rest)
fn block_body<'a>(
    original: &str,
    input: &'a str,
    open: usize,
    errors: &mut Vec<ParseError>,
) -> (&'a str, &'a str) {
    match matching_brace(input, open) {
        Some(close) => (&input[open + 1..close], &input[close + 1..]),
        None => {
            errors.push(ParseError::at(
                Severity::Warning,
                "Unterminated block",
                original,
                suffix(original, &input[open..]),
            ));
            (&input[open + 1..], "")
        }
    }
}

fn parse_at_rule<'a>(
    original: &str,
    input: &'a str,
    errors: &mut Vec<ParseError>,
) -> (&'a str, Option<CssRule>) {
    let (after_name, name) = match at_keyword(input) {
        Ok(parsed) => parsed,
        Err(_) => {
            errors.push(ParseError::at(
                Severity::Error,
                "Expected at-rule name after '@'",
                original,
                suffix(original, input),
            ));
            return (skip_past_rule(input), None);
        }
    };
    let name = name.to_ascii_lowercase();

    let Some(pos) = find_top_level(after_name, b";{}") else {
        // `@import url(x.css)` at end of input without `;`
        return ("", Some(CssRule::Statement(input.trim().to_string())));
    };

    match after_name.as_bytes()[pos] {
        b';' => {
            let consumed = input.len() - after_name.len() + pos + 1;
            (
                &input[consumed..],
                Some(CssRule::Statement(input[..consumed].trim().to_string())),
            )
        }
        b'}' => {
            let consumed = input.len() - after_name.len() + pos;
            errors.push(ParseError::at(
                Severity::Error,
                format!("Malformed @{} rule", name),
                original,
                suffix(original, input),
            ));
            (&input[consumed..], None)
        }
        _ => {
            let prelude = after_name[..pos].trim().to_string();
            let (body, rest) = block_body(original, after_name, pos, errors);
            let rule = if GROUP_AT_RULES.contains(&name.as_str()) {
                CssRule::Group(GroupRule {
                    name,
                    prelude,
                    rules: parse_rule_list(original, body, errors),
                })
            } else {
                CssRule::AtBlock(AtBlockRule {
                    name,
                    prelude,
                    declarations: parse_declaration_list(original, body, errors),
                })
            };
            (rest, Some(rule))
        }
    }
}

fn parse_style_rule<'a>(
    original: &str,
    input: &'a str,
    errors: &mut Vec<ParseError>,
) -> (&'a str, Option<CssRule>) {
    let Some(pos) = find_top_level(input, b"{;}") else {
        errors.push(ParseError::at(
            Severity::Error,
            "Expected '{' after selector",
            original,
            suffix(original, input),
        ));
        return ("", None);
    };

    match input.as_bytes()[pos] {
        b'{' => {
            let selector = input[..pos].trim();
            let (body, rest) = block_body(original, input, pos, errors);
            if selector.is_empty() {
                errors.push(ParseError::at(
                    Severity::Error,
                    "Rule without selector",
                    original,
                    suffix(original, input),
                ));
                return (rest, None);
            }
            let declarations = parse_declaration_list(original, body, errors);
            (
                rest,
                Some(CssRule::Style(StyleRule {
                    selector: collapse_whitespace(selector),
                    declarations,
                })),
            )
        }
        b';' => {
            errors.push(ParseError::at(
                Severity::Error,
                "Unexpected ';' outside of a block",
                original,
                suffix(original, input),
            ));
            (&input[pos + 1..], None)
        }
        _ => {
            errors.push(ParseError::at(
                Severity::Error,
                "Unexpected '}' after selector",
                original,
                suffix(original, input),
            ));
            (&input[pos..], None)
        }
    }
}

/// Skip to the end of whatever rule starts at `input`
fn skip_past_rule(input: &str) -> &str {
    match find_top_level(input, b";{") {
        Some(pos) if input.as_bytes()[pos] == b';' => &input[pos + 1..],
        Some(pos) => matching_brace(input, pos).map_or("", |close| &input[close + 1..]),
        None => "",
    }
}

fn parse_declaration_list(
    original: &str,
    body: &str,
    errors: &mut Vec<ParseError>,
) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    for segment in split_top_level(body, b';') {
        let trimmed = skip_ws(segment).trim_end();
        if trimmed.is_empty() {
            continue;
        }

        if find_top_level(trimmed, b"{").is_some() {
            errors.push(ParseError::at(
                Severity::Warning,
                "Nested block inside declarations skipped",
                original,
                suffix(original, trimmed),
            ));
            continue;
        }

        let Ok((raw_value, name)) = declaration_head(trimmed) else {
            errors.push(ParseError::at(
                Severity::Warning,
                "Invalid declaration",
                original,
                suffix(original, trimmed),
            ));
            continue;
        };

        let (value, important) = split_important(&strip_comments(raw_value));
        let custom = name.starts_with("--");
        if value.is_empty() && !custom {
            errors.push(ParseError::at(
                Severity::Warning,
                format!("Empty value for '{}'", name),
                original,
                suffix(original, trimmed),
            ));
            continue;
        }

        let name = if custom {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        };
        declarations.push(Declaration {
            name,
            value,
            important,
        });
    }

    declarations
}

/// Separate a trailing `!important` from a value
fn split_important(value: &str) -> (String, bool) {
    let trimmed = value.trim();
    if let Some(bang) = trimmed.rfind('!') {
        let flag = trimmed[bang + 1..].trim();
        if flag.eq_ignore_ascii_case("important") {
            return (trimmed[..bang].trim_end().to_string(), true);
        }
    }
    (trimmed.to_string(), false)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove `/* */` comments outside of strings
fn strip_comments(text: &str) -> String {
    if !text.contains("/*") {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut copied = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                out.push_str(&text[copied..i]);
                i = text[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 2);
                copied = i;
            }
            _ => i += 1,
        }
    }
    out.push_str(&text[copied.min(text.len())..]);
    out
}

// ============================================================================
// Scanning helpers
// ============================================================================

/// Index one past the closing quote of the string starting at `start`
pub(crate) fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index past a comment starting at `start`, if one starts there
fn skip_comment(s: &str, start: usize) -> Option<usize> {
    if s.as_bytes().get(start + 1) != Some(&b'*') {
        return None;
    }
    Some(
        s[start + 2..]
            .find("*/")
            .map_or(s.len(), |end| start + 2 + end + 2),
    )
}

/// First byte from `targets` outside strings, comments, parentheses and brackets
pub(crate) fn find_top_level(s: &str, targets: &[u8]) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'\\' => {
                i += 2;
                continue;
            }
            b'/' => {
                if let Some(end) = skip_comment(s, i) {
                    i = end;
                    continue;
                }
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 && targets.contains(&b) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Index of the `}` closing the `{` at `open`
pub(crate) fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'\\' => {
                i += 2;
                continue;
            }
            b'/' => {
                if let Some(end) = skip_comment(s, i) {
                    i = end;
                    continue;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on `sep` at nesting depth zero (parentheses, brackets and braces)
pub(crate) fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'\\' => {
                i += 2;
                continue;
            }
            b'/' => {
                if let Some(end) = skip_comment(s, i) {
                    i = end;
                    continue;
                }
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if b == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start <= bytes.len() {
        parts.push(s.get(start..).unwrap_or(""));
    }
    parts
}
