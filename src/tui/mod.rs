//! Terminal user interface: view state, command routing, orchestration,
//! and rendering

pub mod app;
pub mod commands;
pub mod state;
pub mod ui;

pub use app::{App, ChatMessage, Focus, LogEntry, LogLevel, SelectionAction, SideEffect};
pub use commands::{route, Action};
pub use state::{Modal, StateError, ViewState};
