//! CSS Variable Resolver
//!
//! Custom properties are collected into a [`VariableResolver`] keyed by name.
//! Each merge re-expands every value to a closed form: `var(--x)` references
//! are substituted with the current value of `--x`, pass after pass, until no
//! value changes or [`MAX_RESOLVE_PASSES`] is hit. References to unknown
//! variables take their fallback when one is given and are otherwise left as
//! written.
//!
//! Variables on a reference cycle keep their declared text and are never
//! substituted, so a `var()` pointing at one stays as written.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::VariableCycleExceeded;
use crate::stylesheet::{find_top_level, skip_string};

/// Substitution passes per resolve before giving up on a cycle
pub const MAX_RESOLVE_PASSES: usize = 16;

/// Values growing past this length stop being expanded
const MAX_VALUE_LEN: usize = 64 * 1024;

/// Mapping from custom property name to value
pub type VariableMap = FxHashMap<String, String>;

/// One `var(...)` occurrence inside a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarReference<'a> {
    /// Byte range of the whole `var(...)` expression
    pub start: usize,
    pub end: usize,
    pub name: &'a str,
    pub fallback: Option<&'a str>,
}

/// Find top-level `var()` expressions in a value
pub fn var_references(value: &str) -> SmallVec<[VarReference<'_>; 4]> {
    let bytes = value.as_bytes();
    let mut refs = SmallVec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'v' | b'V'
                if value
                    .get(i..i + 4)
                    .is_some_and(|s| s.eq_ignore_ascii_case("var("))
                    && (i == 0 || !is_name_byte(bytes[i - 1])) =>
            {
                let args_start = i + 4;
                let Some(close) = closing_paren(value, args_start) else {
                    break;
                };
                let args = &value[args_start..close];
                let (name, fallback) = match find_top_level(args, b",") {
                    Some(comma) => (args[..comma].trim(), Some(args[comma + 1..].trim())),
                    None => (args.trim(), None),
                };
                refs.push(VarReference {
                    start: i,
                    end: close + 1,
                    name,
                    fallback,
                });
                i = close + 1;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    refs
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Index of the `)` closing a parenthesis opened just before `from`
fn closing_paren(value: &str, from: usize) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Every variable name referenced by a value, including inside fallbacks
pub fn referenced_names(value: &str) -> Vec<String> {
    let mut names = Vec::new();
    collect_names(value, &mut names);
    names
}

fn collect_names(value: &str, out: &mut Vec<String>) {
    for reference in var_references(value) {
        if !out.iter().any(|n| n == reference.name) {
            out.push(reference.name.to_string());
        }
        if let Some(fallback) = reference.fallback {
            collect_names(fallback, out);
        }
    }
}

/// Whether a value contains any `var()` reference
pub fn has_var_reference(value: &str) -> bool {
    !var_references(value).is_empty()
}

/// One substitution pass over `value`.
///
/// Known names are replaced by `lookup`, unknown ones by their fallback
/// (substituted recursively), and the rest are copied through.
pub fn replace_variables<'a>(value: &str, lookup: &impl Fn(&str) -> Option<&'a str>) -> String {
    let refs = var_references(value);
    if refs.is_empty() {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut copied = 0;
    for reference in refs {
        out.push_str(&value[copied..reference.start]);
        match (lookup(reference.name), reference.fallback) {
            (Some(found), _) => out.push_str(found),
            (None, Some(fallback)) => out.push_str(&replace_variables(fallback, lookup)),
            (None, None) => out.push_str(&value[reference.start..reference.end]),
        }
        copied = reference.end;
    }
    out.push_str(&value[copied..]);
    out
}

/// Outcome of [`VariableResolver::merge_and_resolve`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Names seen for the first time
    pub added: Vec<String>,
    /// Known names whose declared value changed
    pub changed: Vec<String>,
    /// Set when resolution stopped before a fixed point
    pub cycle: Option<VariableCycleExceeded>,
}

impl ResolveReport {
    /// Nothing new: callers can skip re-rendering
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty()
    }
}

/// Holds declared custom properties and their closed-form expansions
#[derive(Debug, Clone, Default)]
pub struct VariableResolver {
    declared: VariableMap,
    resolved: VariableMap,
    /// Names left unexpanded by the last resolve
    unresolved: FxHashSet<String>,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed-form value of a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.resolved.get(name).map(String::as_str)
    }

    /// Value as declared, before expansion
    pub fn declared(&self, name: &str) -> Option<&str> {
        self.declared.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    /// Resolved map, for callers that need the whole picture
    pub fn resolved(&self) -> &VariableMap {
        &self.resolved
    }

    /// Insert `entries` and re-resolve when anything actually changed
    pub fn merge_and_resolve<I, K, V>(&mut self, entries: I) -> ResolveReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut report = ResolveReport::default();
        for (name, value) in entries {
            let name = name.into();
            let value = value.into();
            match self.declared.insert(name.clone(), value.clone()) {
                Some(previous) if previous == value => {}
                Some(_) => report.changed.push(name),
                None => report.added.push(name),
            }
        }

        if report.is_unchanged() {
            return report;
        }

        debug!(
            added = report.added.len(),
            changed = report.changed.len(),
            "resolving custom properties"
        );
        let (resolved, cycle) = resolve(&self.declared);
        self.resolved = resolved;
        self.unresolved = cycle
            .iter()
            .flat_map(|c| c.names.iter().cloned())
            .collect();
        report.cycle = cycle;
        report
    }

    /// Substitute resolved variables into an arbitrary value
    pub fn substitute(&self, value: &str) -> String {
        if !has_var_reference(value) {
            return value.to_string();
        }
        replace_variables(value, &|name: &str| {
            if self.unresolved.contains(name) {
                None
            } else {
                self.get(name)
            }
        })
    }

    pub fn clear(&mut self) {
        self.declared.clear();
        self.resolved.clear();
        self.unresolved.clear();
    }
}

/// Expand every value in `map` to closed form.
///
/// Variables on a reference cycle are left as declared and are not
/// substituted into other values. Returns the expanded map and, when a cycle
/// exists or the pass cap was hit, the variables left unexpanded.
pub fn resolve(map: &VariableMap) -> (VariableMap, Option<VariableCycleExceeded>) {
    let cyclic = cyclic_names(map);

    let mut current = map.clone();
    let mut passes = 0;

    while passes < MAX_RESOLVE_PASSES {
        passes += 1;
        let mut next = VariableMap::default();
        let mut changed = false;

        for (name, value) in &current {
            let expanded = if cyclic.contains(name)
                || value.len() > MAX_VALUE_LEN
                || !has_var_reference(value)
            {
                value.clone()
            } else {
                let snapshot = &current;
                replace_variables(value, &|n: &str| {
                    if cyclic.contains(n) {
                        None
                    } else {
                        snapshot.get(n).map(String::as_str)
                    }
                })
            };
            changed |= expanded != *value;
            next.insert(name.clone(), expanded);
        }

        current = next;
        if !changed {
            break;
        }
    }

    let mut stuck: Vec<String> = current
        .iter()
        .filter(|(name, value)| {
            cyclic.contains(name.as_str())
                || referenced_names(value)
                    .iter()
                    .any(|n| !cyclic.contains(n) && current.contains_key(n))
        })
        .map(|(name, _)| name.clone())
        .collect();

    if stuck.is_empty() {
        return (current, None);
    }

    stuck.sort();
    let cycle = VariableCycleExceeded {
        passes,
        names: stuck,
    };
    warn!(%cycle, "custom property cycle");
    (current, Some(cycle))
}

/// Names that can reach themselves through `var()` references.
///
/// Tarjan's strongly connected components, run with an explicit stack so
/// long reference chains cannot overflow.
fn cyclic_names(map: &VariableMap) -> FxHashSet<String> {
    const UNVISITED: usize = usize::MAX;

    let names: Vec<&str> = map.keys().map(String::as_str).collect();
    let index_of: FxHashMap<&str, usize> =
        names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let edges: Vec<Vec<usize>> = names
        .iter()
        .map(|n| {
            map.get(*n)
                .map(|value| {
                    referenced_names(value)
                        .iter()
                        .filter_map(|r| index_of.get(r.as_str()).copied())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let count = names.len();
    let mut index = vec![UNVISITED; count];
    let mut low = vec![0; count];
    let mut on_stack = vec![false; count];
    let mut stack = Vec::new();
    let mut next_index = 0;
    let mut cyclic = FxHashSet::default();

    for root in 0..count {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut work = vec![(root, 0usize)];

        while let Some(&(node, edge)) = work.last() {
            if let Some(&target) = edges[node].get(edge) {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                if index[target] == UNVISITED {
                    index[target] = next_index;
                    low[target] = next_index;
                    next_index += 1;
                    stack.push(target);
                    on_stack[target] = true;
                    work.push((target, 0));
                } else if on_stack[target] {
                    low[node] = low[node].min(index[target]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] != index[node] {
                continue;
            }
            let mut component = Vec::new();
            while let Some(member) = stack.pop() {
                on_stack[member] = false;
                component.push(member);
                if member == node {
                    break;
                }
            }
            if component.len() > 1 || edges[node].contains(&node) {
                cyclic.extend(component.into_iter().map(|i| names[i].to_string()));
            }
        }
    }

    if !cyclic.is_empty() {
        debug!(count = cyclic.len(), "custom properties on a reference cycle");
    }
    cyclic
}

/// Custom property declarations from a declaration list
pub fn extract_variables<'a>(
    declarations: impl IntoIterator<Item = &'a crate::Declaration>,
) -> Vec<(String, String)> {
    let mut seen = FxHashSet::default();
    let mut out: Vec<(String, String)> = Vec::new();
    for decl in declarations {
        if !decl.is_custom_property() {
            continue;
        }
        if seen.insert(decl.name.clone()) {
            out.push((decl.name.clone(), decl.value.clone()));
        } else if let Some(entry) = out.iter_mut().find(|(n, _)| *n == decl.name) {
            // Later declarations win
            entry.1 = decl.value.clone();
        }
    }
    out
}
