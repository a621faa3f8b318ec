//! CSSOM sheet state

/// Load state of a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetState {
    /// Rules are available
    Loaded,
    /// External sheet still downloading; no rules yet
    Loading,
    /// Download failed
    Failed,
    /// Cross-origin sheet: loaded, but rule enumeration is denied
    Blocked,
}

/// Rule list attached to a `<style>` or `<link>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub(crate) state: SheetState,
    pub(crate) rules: Vec<String>,
    pub(crate) revision: u64,
}

impl Sheet {
    pub(crate) fn loaded(rules: Vec<String>, revision: u64) -> Self {
        Self {
            state: SheetState::Loaded,
            rules,
            revision,
        }
    }

    pub(crate) fn loading(revision: u64) -> Self {
        Self {
            state: SheetState::Loading,
            rules: Vec::new(),
            revision,
        }
    }

    pub fn state(&self) -> SheetState {
        self.state
    }

    /// Rule texts, or `None` while loading, after a failure, or when blocked
    pub fn rules(&self) -> Option<&[String]> {
        match self.state {
            SheetState::Loaded => Some(&self.rules),
            SheetState::Loading | SheetState::Failed | SheetState::Blocked => None,
        }
    }

    /// Bumped on every change to the rule list or load state
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_loading(&self) -> bool {
        self.state == SheetState::Loading
    }

    /// Full text of the rule list
    pub fn css_text(&self) -> Option<String> {
        self.rules().map(|rules| rules.join("\n"))
    }
}
