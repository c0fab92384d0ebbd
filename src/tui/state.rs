//! Shared view state
//!
//! The single piece of mutable UI state. Only the orchestrator mutates it,
//! one input event at a time, so the invariants below (one modal at a time,
//! single-flight turns) hold without any locking.

use thiserror::Error;

use crate::kube::ResourceKind;

/// Modal input surfaces; at most one is ever open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modal {
    #[default]
    None,
    CommandBar,
    FilterBar,
    Help,
}

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    /// A turn is already in flight; concurrent submissions are rejected,
    /// not queued.
    #[error("a copilot turn is already running")]
    AlreadyRunning,
}

/// Current resource view, filter, modal, and turn-guard state.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub resource_kind: ResourceKind,
    pub namespace: String,
    pub filter_text: String,
    pub active_modal: Modal,
    pub copilot_visible: bool,
    pub turn_in_flight: bool,
}

impl ViewState {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            resource_kind: ResourceKind::Pods,
            namespace: namespace.into(),
            filter_text: String::new(),
            active_modal: Modal::None,
            copilot_visible: true,
            turn_in_flight: false,
        }
    }

    pub fn set_resource_kind(&mut self, kind: ResourceKind) {
        self.resource_kind = kind;
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    /// Non-empty text narrows row rendering; empty clears the filter.
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter_text = filter.into();
    }

    /// Opens a modal, closing whichever one was open.
    pub fn open_modal(&mut self, modal: Modal) {
        self.active_modal = modal;
    }

    pub fn close_modal(&mut self) {
        self.active_modal = Modal::None;
    }

    pub fn set_copilot_visible(&mut self, visible: bool) {
        self.copilot_visible = visible;
    }

    /// Claims the single-flight turn slot.
    pub fn begin_turn(&mut self) -> Result<(), StateError> {
        if self.turn_in_flight {
            return Err(StateError::AlreadyRunning);
        }
        self.turn_in_flight = true;
        Ok(())
    }

    /// Releases the turn slot; idempotent.
    pub fn end_turn(&mut self) {
        self.turn_in_flight = false;
    }

    /// Case-insensitive any-cell substring match against the active filter.
    pub fn row_matches(&self, row: &[String]) -> bool {
        if self.filter_text.is_empty() {
            return true;
        }
        let needle = self.filter_text.to_lowercase();
        row.iter()
            .any(|cell| cell.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ViewState {
        ViewState::new("default")
    }

    #[test]
    fn test_modals_are_mutually_exclusive() {
        let mut state = state();
        state.open_modal(Modal::CommandBar);
        assert_eq!(state.active_modal, Modal::CommandBar);
        state.open_modal(Modal::Help);
        assert_eq!(state.active_modal, Modal::Help);
        state.close_modal();
        assert_eq!(state.active_modal, Modal::None);
    }

    #[test]
    fn test_begin_turn_is_single_flight() {
        let mut state = state();
        assert!(state.begin_turn().is_ok());
        assert_eq!(state.begin_turn(), Err(StateError::AlreadyRunning));
        assert!(state.turn_in_flight);
    }

    #[test]
    fn test_end_turn_is_idempotent() {
        let mut state = state();
        state.begin_turn().unwrap();
        state.end_turn();
        state.end_turn();
        assert!(!state.turn_in_flight);
        assert!(state.begin_turn().is_ok());
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let state = state();
        assert!(state.row_matches(&["web-0".to_string(), "Running".to_string()]));
        assert!(state.row_matches(&[]));
    }

    #[test]
    fn test_filter_matches_any_cell_case_insensitive() {
        let mut state = state();
        state.set_filter("RUN");
        let row = vec!["web-0".to_string(), "Running".to_string()];
        assert!(state.row_matches(&row));
        state.set_filter("web");
        assert!(state.row_matches(&row));
        state.set_filter("crashloop");
        assert!(!state.row_matches(&row));
        state.set_filter("");
        assert!(state.row_matches(&row));
    }
}
