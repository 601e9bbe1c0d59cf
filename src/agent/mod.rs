//! Agent connectivity
//!
//! The coordinator talks to the remote agent only through the
//! [`AgentTransport`] and [`TransportConnector`] traits. The WebSocket
//! implementation is a thin adapter: JSON control frames out, JSON events and
//! binary speech in.

pub mod messages;
pub mod models;
pub mod transport;
pub mod websocket;

pub use messages::{AgentSettings, ClientMessage, Role};
pub use models::{ListenModel, ModelSelection, SpeechModel, ThinkModel};
pub use transport::{AgentConnection, AgentEvent, AgentTransport, TransportConnector};
pub use websocket::{WebSocketConnector, WebSocketTransport, DEFAULT_AGENT_URL};
