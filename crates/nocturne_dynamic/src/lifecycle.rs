//! Engine lifecycle state machine
//!
//! A small flat state machine: transitions are `(from, event) -> to` triples,
//! events with no matching transition are ignored, and every transition taken
//! is recorded in a history for debugging.

use std::fmt::Debug;

use tracing::debug;

/// Engine lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThemeState {
    Uninitialized,
    /// Singleton overrides exist; waiting for `<head>` or visibility
    StaticOverridesReady,
    /// Style managers and watchers are running
    DynamicActive,
    TornDown,
}

/// Inputs that move the engine between states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Apply,
    /// `<head>` exists and the document is visible
    Activate,
    Remove,
}

/// A transition in the state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition<S, E> {
    pub from_state: S,
    pub event: E,
    pub to_state: S,
}

/// Builder for creating state machines
pub struct StateMachineBuilder<S, E> {
    initial_state: S,
    transitions: Vec<Transition<S, E>>,
}

impl<S: Copy + PartialEq + Debug, E: Copy + PartialEq + Debug> StateMachineBuilder<S, E> {
    pub fn new(initial_state: S) -> Self {
        Self {
            initial_state,
            transitions: Vec::new(),
        }
    }

    /// Add a simple transition (from, event, to)
    pub fn on(mut self, from: S, event: E, to: S) -> Self {
        self.transitions.push(Transition {
            from_state: from,
            event,
            to_state: to,
        });
        self
    }

    /// Add the same transition from several states
    pub fn on_any(mut self, from: &[S], event: E, to: S) -> Self {
        for &state in from {
            self = self.on(state, event, to);
        }
        self
    }

    pub fn build(self) -> StateMachine<S, E> {
        StateMachine {
            current_state: self.initial_state,
            transitions: self.transitions,
            history: Vec::new(),
        }
    }
}

/// A state machine instance
pub struct StateMachine<S, E> {
    current_state: S,
    transitions: Vec<Transition<S, E>>,
    /// History of state transitions (for debugging)
    history: Vec<(S, E, S)>,
}

impl<S: Copy + PartialEq + Debug, E: Copy + PartialEq + Debug> StateMachine<S, E> {
    pub fn builder(initial_state: S) -> StateMachineBuilder<S, E> {
        StateMachineBuilder::new(initial_state)
    }

    pub fn current_state(&self) -> S {
        self.current_state
    }

    pub fn is_in(&self, state: S) -> bool {
        self.current_state == state
    }

    pub fn history(&self) -> &[(S, E, S)] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Check if an event can trigger a transition from current state
    pub fn can_send(&self, event: E) -> bool {
        let current = self.current_state;
        self.transitions
            .iter()
            .any(|t| t.from_state == current && t.event == event)
    }

    /// Send an event, returning the (possibly unchanged) current state
    pub fn send(&mut self, event: E) -> S {
        let current = self.current_state;
        let Some(to_state) = self
            .transitions
            .iter()
            .find(|t| t.from_state == current && t.event == event)
            .map(|t| t.to_state)
        else {
            debug!(?current, ?event, "ignored lifecycle event");
            return current;
        };

        self.current_state = to_state;
        self.history.push((current, event, to_state));
        to_state
    }
}

/// The dynamic theme lifecycle.
///
/// Re-applying while active is a self-transition; removal is accepted from
/// every state so teardown stays idempotent.
pub fn theme_lifecycle() -> StateMachine<ThemeState, LifecycleEvent> {
    use LifecycleEvent::*;
    use ThemeState::*;

    StateMachine::builder(Uninitialized)
        .on(Uninitialized, Apply, StaticOverridesReady)
        .on(TornDown, Apply, StaticOverridesReady)
        .on(StaticOverridesReady, Apply, StaticOverridesReady)
        .on(StaticOverridesReady, Activate, DynamicActive)
        .on(DynamicActive, Apply, DynamicActive)
        .on_any(
            &[Uninitialized, StaticOverridesReady, DynamicActive, TornDown],
            Remove,
            TornDown,
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut fsm = theme_lifecycle();
        assert!(fsm.is_in(ThemeState::Uninitialized));
        assert_eq!(fsm.send(LifecycleEvent::Apply), ThemeState::StaticOverridesReady);
        assert_eq!(fsm.send(LifecycleEvent::Activate), ThemeState::DynamicActive);
        assert_eq!(fsm.send(LifecycleEvent::Apply), ThemeState::DynamicActive);
        assert_eq!(fsm.send(LifecycleEvent::Remove), ThemeState::TornDown);
        assert_eq!(fsm.history().len(), 4);
    }

    #[test]
    fn test_activate_requires_static_overrides() {
        let mut fsm = theme_lifecycle();
        assert!(!fsm.can_send(LifecycleEvent::Activate));
        assert_eq!(fsm.send(LifecycleEvent::Activate), ThemeState::Uninitialized);
        assert!(fsm.history().is_empty());
    }

    #[test]
    fn test_remove_is_idempotent_and_reapply_works() {
        let mut fsm = theme_lifecycle();
        fsm.send(LifecycleEvent::Apply);
        assert_eq!(fsm.send(LifecycleEvent::Remove), ThemeState::TornDown);
        assert_eq!(fsm.send(LifecycleEvent::Remove), ThemeState::TornDown);
        assert_eq!(fsm.send(LifecycleEvent::Apply), ThemeState::StaticOverridesReady);

        fsm.clear_history();
        assert!(fsm.history().is_empty());
    }
}
