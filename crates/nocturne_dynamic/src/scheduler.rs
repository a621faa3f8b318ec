//! Render Scheduler
//!
//! Throttle with trailing-edge semantics over one shared render pass. Any
//! number of [`RenderScheduler::request`] calls before the next frame collapse
//! into a single render; completion actions attached to those requests run
//! once, after that render.

use smallvec::SmallVec;

/// Pending full render plus the actions to run after it
pub struct RenderScheduler<A> {
    pending: bool,
    after: SmallVec<[A; 2]>,
    coalesced: u32,
}

impl<A> Default for RenderScheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> RenderScheduler<A> {
    pub fn new() -> Self {
        Self {
            pending: false,
            after: SmallVec::new(),
            coalesced: 0,
        }
    }

    /// Schedule a render, optionally with an action for after it executes
    pub fn request(&mut self, after: Option<A>) {
        if self.pending {
            self.coalesced += 1;
        }
        self.pending = true;
        if let Some(action) = after {
            self.after.push(action);
        }
    }

    /// Drop a pending render and its actions
    pub fn cancel(&mut self) {
        self.pending = false;
        self.after.clear();
        self.coalesced = 0;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Requests absorbed into the pending render
    pub fn coalesced(&self) -> u32 {
        self.coalesced
    }

    /// Frame boundary: if a render is pending, clear it and hand back the
    /// post-render actions. The caller renders, then runs them.
    pub fn take(&mut self) -> Option<Vec<A>> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        self.coalesced = 0;
        Some(self.after.drain(..).collect())
    }
}
