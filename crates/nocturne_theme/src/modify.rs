//! Color Transform Engine
//!
//! [`ColorModifier`] maps `(color text, filter)` to transformed color text and
//! memoizes every step: parsed colors by raw text, matrices by
//! [`MatrixKey`], and final output by `(raw text, MatrixKey)`.

use std::num::NonZeroUsize;

use lru::LruCache;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::color::{is_named_color, Rgba};
use crate::error::Result;
use crate::filter::{FilterConfig, MatrixKey};
use crate::matrix::ColorMatrix;

/// Maximum number of memoized transform results
const MODIFICATION_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(4095);

/// Maximum number of memoized parsed colors
const PARSE_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(1023);

/// Memoized color transformer
pub struct ColorModifier {
    modified: LruCache<(String, MatrixKey), String>,
    parsed: LruCache<String, Rgba>,
    matrices: FxHashMap<MatrixKey, ColorMatrix>,
}

impl Default for ColorModifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorModifier {
    pub fn new() -> Self {
        Self {
            modified: LruCache::new(MODIFICATION_CACHE_CAPACITY),
            parsed: LruCache::new(PARSE_CACHE_CAPACITY),
            matrices: FxHashMap::default(),
        }
    }

    /// Parse a color, consulting the parse cache first
    pub fn parse_color(&mut self, raw: &str) -> Result<Rgba> {
        if let Some(color) = self.parsed.get(raw) {
            return Ok(*color);
        }
        let color = Rgba::parse(raw)?;
        self.parsed.put(raw.to_string(), color);
        Ok(color)
    }

    /// Matrix for a filter, built once per distinct [`MatrixKey`]
    pub fn matrix(&mut self, filter: &FilterConfig) -> &ColorMatrix {
        self.matrices
            .entry(filter.matrix_key())
            .or_insert_with(|| ColorMatrix::from_filter(filter))
    }

    /// Transform a single color literal
    pub fn transform(&mut self, raw: &str, filter: &FilterConfig) -> Result<String> {
        let key = (raw.to_string(), filter.matrix_key());
        if let Some(out) = self.modified.get(&key) {
            return Ok(out.clone());
        }

        let color = self.parse_color(raw)?;
        let out = self.matrix(filter).apply(color).to_string();
        self.modified.put(key, out.clone());
        Ok(out)
    }

    /// Transform a parsed color without touching the text caches
    pub fn transform_rgba(&mut self, color: Rgba, filter: &FilterConfig) -> Rgba {
        self.matrix(filter).apply(color)
    }

    /// Rewrite every color literal inside a declaration value.
    ///
    /// Strings, `url()` and `var()` are copied verbatim. Literals that fail to
    /// parse are kept as written.
    pub fn modify_value(&mut self, value: &str, filter: &FilterConfig) -> String {
        let mut out = String::with_capacity(value.len());
        let bytes = value.as_bytes();
        let mut i = 0;

        while i < value.len() {
            let c = bytes[i];
            match c {
                b'"' | b'\'' => {
                    let end = string_end(value, i);
                    out.push_str(&value[i..end]);
                    i = end;
                }
                b'#' => {
                    let end = i + 1 + value[i + 1..]
                        .bytes()
                        .take_while(|b| b.is_ascii_alphanumeric())
                        .count();
                    let literal = &value[i..end];
                    out.push_str(&self.transform_or_keep(literal, filter));
                    i = end;
                }
                _ if is_word_byte(c) => {
                    let end = i + value[i..].bytes().take_while(|b| is_word_byte(*b)).count();
                    let word = &value[i..end];
                    if bytes.get(end) == Some(&b'(') {
                        let close = matching_paren(value, end);
                        let name = word.to_ascii_lowercase();
                        let inner_end = if close > end + 1 && bytes.get(close - 1) == Some(&b')') {
                            close - 1
                        } else {
                            close
                        };
                        match name.as_str() {
                            "rgb" | "rgba" | "hsl" | "hsla" => {
                                out.push_str(&self.transform_or_keep(&value[i..close], filter));
                            }
                            "url" | "var" | "env" => out.push_str(&value[i..close]),
                            _ => {
                                out.push_str(word);
                                out.push('(');
                                let inner = self.modify_value(&value[end + 1..inner_end], filter);
                                out.push_str(&inner);
                                if inner_end < close {
                                    out.push(')');
                                }
                            }
                        }
                        i = close;
                    } else {
                        if is_named_color(word) {
                            out.push_str(&self.transform_or_keep(word, filter));
                        } else {
                            out.push_str(word);
                        }
                        i = end;
                    }
                }
                _ => {
                    let ch_len = value[i..].chars().next().map_or(1, char::len_utf8);
                    out.push_str(&value[i..i + ch_len]);
                    i += ch_len;
                }
            }
        }

        out
    }

    fn transform_or_keep(&mut self, literal: &str, filter: &FilterConfig) -> String {
        match self.transform(literal, filter) {
            Ok(out) => out,
            Err(err) => {
                debug!(literal, %err, "keeping unparsable color literal");
                literal.to_string()
            }
        }
    }

    /// Number of memoized transform results
    pub fn cached_len(&self) -> usize {
        self.modified.len()
    }

    /// Drop every memoized value
    pub fn clear(&mut self) {
        self.modified.clear();
        self.parsed.clear();
        self.matrices.clear();
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b >= 0x80
}

/// Index one past the closing quote (or end of input)
fn string_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index one past the `)` matching the `(` at `open` (or end of input)
fn matching_paren(s: &str, open: usize) -> usize {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = string_end(s, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}
