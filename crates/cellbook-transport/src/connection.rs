//! Connection lifecycle types and the injectable socket boundary.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Default reconnect delay after a non-deliberate close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Connection lifecycle state of a transport instance.
///
/// Driven solely by socket events and the reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket open and no attempt in flight.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open and frames flow.
    Connected,
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Socket error: {0}")]
    Socket(String),
    #[error("Connection closed")]
    Closed,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Delay between reconnect attempts.
    ///
    /// The delay is constant and retries continue indefinitely; there is
    /// no backoff or retry cap. Known limitation.
    pub reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// An open message-oriented duplex socket.
///
/// Implementations carry JSON text frames; framing and keepalive are
/// their concern, not the transport's.
#[async_trait]
pub trait Socket: Send {
    /// Send one text frame.
    ///
    /// # Errors
    /// Returns error if the connection is no longer usable.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the socket deliberately.
    async fn close(&mut self);
}

/// Factory for sockets, injected into the transport.
///
/// Abstracting the socket keeps the reconnect machinery testable against
/// a fake event source.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Socket type produced by this connector.
    type Socket: Socket;

    /// Open a new socket to the backend.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established.
    async fn connect(&self) -> Result<Self::Socket, TransportError>;
}
