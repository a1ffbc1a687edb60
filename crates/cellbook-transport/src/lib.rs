//! Resilient transport to the notebook execution backend.
//!
//! Provides:
//! - Wire protocol (JSON envelopes)
//! - `Transport` - reconnecting duplex channel over an injected socket
//! - WebSocket connector (feature: websocket)

pub mod client;
pub mod connection;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use client::Transport;
pub use connection::{ConnectionState, Connector, Socket, TransportConfig, TransportError};
pub use protocol::{ExecuteEnvelope, ProtocolError, ResultEnvelope, ResultPayload};
