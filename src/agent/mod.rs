//! Copilot agent: typed events, the turn engine, and the transport seam

pub mod claude;
pub mod events;
pub mod transport;
pub mod turn;

pub use claude::ClaudeTransport;
pub use events::AgentEvent;
pub use transport::{classify, ContentBlock, Transport, TransportMessage, TurnOptions};
pub use turn::{TurnConfig, TurnEngine, KUBECTL_TOOL};
