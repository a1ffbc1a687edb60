//! Reconnecting transport over an injected socket.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Notify, mpsc, watch};

use crate::connection::{ConnectionState, Connector, Socket, TransportConfig};
use crate::protocol::{ExecuteEnvelope, ResultEnvelope};

type Handler = Box<dyn Fn(ResultEnvelope) + Send + Sync>;

/// Reconnecting duplex channel to the execution backend.
///
/// Owns the connection lifecycle only: it reconnects after any
/// non-deliberate close, decodes inbound frames, and hands valid
/// envelopes to the registered handler. It holds no outbound queue;
/// `send` while not connected is a silent drop and callers must not
/// assume delivery without an application-level acknowledgment.
pub struct Transport<C: Connector> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: Connector> {
    connector: C,
    config: TransportConfig,
    state: watch::Sender<ConnectionState>,
    handler: Mutex<Option<Handler>>,
    /// Writer into the live socket, installed per connection.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Set by `disconnect` to suppress the reconnect that would
    /// otherwise follow a close.
    closing: AtomicBool,
    close_notify: Notify,
    /// Guards against a second connection task.
    running: AtomicBool,
}

impl<C: Connector> Transport<C> {
    /// Create a transport with the default configuration.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, TransportConfig::default())
    }

    /// Create a transport with an explicit configuration.
    #[must_use]
    pub fn with_config(connector: C, config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                state,
                handler: Mutex::new(None),
                outbound: Mutex::new(None),
                closing: AtomicBool::new(false),
                close_notify: Notify::new(),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Start the connection task. Idempotent: a no-op while already
    /// connecting or connected.
    ///
    /// Issued while a deliberate close is still tearing down, the
    /// connect intent wins: the pending close is cancelled and the
    /// connection task keeps going.
    pub fn connect(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            if self.inner.closing.swap(false, Ordering::SeqCst) {
                self.inner.close_notify.notify_one();
            }
            return;
        }
        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.state.send_replace(ConnectionState::Connecting);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run().await;
        });
    }

    /// Send an execution request if connected.
    ///
    /// Dropped silently when not connected; the coordinator owns any
    /// re-submission logic.
    pub fn send(&self, envelope: &ExecuteEnvelope) {
        if *self.inner.state.borrow() != ConnectionState::Connected {
            tracing::debug!(request_id = %envelope.request_id, "not connected, dropping outbound request");
            return;
        }
        let frame = envelope.encode();
        let delivered = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok());
        if !delivered {
            tracing::debug!(request_id = %envelope.request_id, "socket gone, dropping outbound request");
        }
    }

    /// Register the inbound message handler.
    ///
    /// Exactly one handler is active; registering again replaces it.
    pub fn on_message(&self, handler: impl Fn(ResultEnvelope) + Send + Sync + 'static) {
        *self
            .inner
            .handler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Box::new(handler));
    }

    /// Close deliberately and suppress the automatic reconnect.
    ///
    /// Also cancels a pending reconnect attempt.
    pub fn disconnect(&self) {
        if !self.inner.running.load(Ordering::SeqCst) {
            return;
        }
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.close_notify.notify_one();
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }
}

impl<C: Connector> Inner<C> {
    async fn run(self: Arc<Self>) {
        loop {
            self.connect_loop().await;
            self.running.store(false, Ordering::SeqCst);
            // A connect may have cancelled the close after the loop's
            // last check; reclaim the task instead of losing the intent.
            if self.closing.load(Ordering::SeqCst)
                || self.running.swap(true, Ordering::SeqCst)
            {
                break;
            }
            self.state.send_replace(ConnectionState::Connecting);
        }
    }

    /// Connect, serve, and reconnect until a deliberate close.
    async fn connect_loop(&self) {
        loop {
            match self.connector.connect().await {
                Ok(mut socket) => {
                    if self.closing.load(Ordering::SeqCst) {
                        // Disconnected while the attempt was in flight.
                        socket.close().await;
                        self.state.send_replace(ConnectionState::Disconnected);
                        break;
                    }
                    tracing::debug!("transport connected");
                    self.state.send_replace(ConnectionState::Connected);
                    self.serve(socket).await;
                    self.state.send_replace(ConnectionState::Disconnected);
                }
                Err(e) => {
                    tracing::warn!("connection attempt failed: {e}");
                    self.state.send_replace(ConnectionState::Disconnected);
                }
            }

            if self.closing.load(Ordering::SeqCst) {
                break;
            }

            tracing::debug!(delay = ?self.config.reconnect_delay, "scheduling reconnect");
            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                () = self.close_notify.notified() => {}
            }
            if self.closing.load(Ordering::SeqCst) {
                break;
            }
            self.state.send_replace(ConnectionState::Connecting);
        }
    }

    /// Pump one live socket until it closes, errors, or a deliberate
    /// disconnect arrives.
    async fn serve(&self, mut socket: C::Socket) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.install_writer(Some(tx));

        loop {
            tokio::select! {
                () = self.close_notify.notified() => {
                    // A stale permit from an old disconnect is ignored.
                    if self.closing.load(Ordering::SeqCst) {
                        socket.close().await;
                        break;
                    }
                }
                outgoing = rx.recv() => {
                    let Some(frame) = outgoing else { break };
                    if let Err(e) = socket.send(frame).await {
                        tracing::warn!("send failed: {e}");
                        break;
                    }
                }
                inbound = socket.recv() => {
                    match inbound {
                        Some(Ok(frame)) => self.dispatch(&frame),
                        Some(Err(e)) => {
                            tracing::warn!("socket error: {e}");
                            break;
                        }
                        None => {
                            tracing::debug!("connection closed by peer");
                            break;
                        }
                    }
                }
            }
        }

        self.install_writer(None);
    }

    fn install_writer(&self, tx: Option<mpsc::UnboundedSender<String>>) {
        *self
            .outbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = tx;
    }

    /// Decode and deliver one inbound frame. Malformed frames are
    /// dropped and logged; they do not close the connection.
    fn dispatch(&self, frame: &str) {
        match ResultEnvelope::decode(frame) {
            Ok(envelope) => {
                let handler = self
                    .handler
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(handler) = handler.as_ref() {
                    handler(envelope);
                } else {
                    tracing::debug!(request_id = %envelope.request_id, "no handler registered, dropping message");
                }
            }
            Err(e) => tracing::warn!("dropping malformed message: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use cellbook_core::Language;
    use uuid::Uuid;

    use super::*;
    use crate::connection::TransportError;
    use crate::protocol::ResultPayload;

    /// Channel-backed socket driven entirely by the test.
    struct FakeSocket {
        inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
        outbound: mpsc::UnboundedSender<String>,
    }

    /// Test-side handle to a `FakeSocket`.
    struct Peer {
        inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
        outbound: mpsc::UnboundedReceiver<String>,
    }

    fn socket_pair() -> (FakeSocket, Peer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            FakeSocket {
                inbound: in_rx,
                outbound: out_tx,
            },
            Peer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    #[async_trait]
    impl Socket for FakeSocket {
        async fn send(&mut self, frame: String) -> Result<(), TransportError> {
            self.outbound.send(frame).map_err(|_| TransportError::Closed)
        }

        async fn recv(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await
        }

        async fn close(&mut self) {
            self.inbound.close();
        }
    }

    /// Hands out pre-queued sockets; waits when the queue is empty.
    struct FakeConnector {
        queue: tokio::sync::Mutex<VecDeque<Result<FakeSocket, TransportError>>>,
    }

    impl FakeConnector {
        fn new(sockets: Vec<Result<FakeSocket, TransportError>>) -> Self {
            Self {
                queue: tokio::sync::Mutex::new(sockets.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Socket = FakeSocket;

        async fn connect(&self) -> Result<FakeSocket, TransportError> {
            loop {
                if let Some(next) = self.queue.lock().await.pop_front() {
                    return next;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    fn envelope() -> ExecuteEnvelope {
        ExecuteEnvelope {
            request_id: Uuid::new_v4(),
            code: "int main() { return 0; }".to_string(),
            language: Language::C,
            stdin: None,
        }
    }

    async fn wait_for(transport: &Transport<FakeConnector>, target: ConnectionState) {
        let mut rx = transport.watch_state();
        rx.wait_for(|s| *s == target).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let (socket, _peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![Ok(socket)]));

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;

        // A second connect while connected must not open another socket.
        transport.connect();
        tokio::task::yield_now().await;
        assert_eq!(transport.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_round_trips_when_connected() {
        let (socket, mut peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![Ok(socket)]));

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;

        let request = envelope();
        transport.send(&request);

        let frame = peer.outbound.recv().await.unwrap();
        let sent: ExecuteEnvelope = serde_json::from_str(&frame).unwrap();
        assert_eq!(sent, request);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_is_dropped() {
        let (socket, mut peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![Ok(socket)]));

        // Not connected yet: silent drop, no panic.
        transport.send(&envelope());

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;
        tokio::task::yield_now().await;
        assert!(peer.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_unexpected_close() {
        let (first, first_peer) = socket_pair();
        let (second, _second_peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![Ok(first), Ok(second)]));

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;

        // Peer drops the connection.
        drop(first_peer);
        wait_for(&transport, ConnectionState::Disconnected).await;

        // After the fixed delay the transport comes back on its own.
        wait_for(&transport, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_retry_indefinitely() {
        let (socket, _peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![
            Err(TransportError::Connect("refused".to_string())),
            Err(TransportError::Connect("refused".to_string())),
            Ok(socket),
        ]));

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_suppresses_reconnect() {
        let (first, _first_peer) = socket_pair();
        let (second, _second_peer) = socket_pair();
        let connector = FakeConnector::new(vec![Ok(first), Ok(second)]);
        let transport = Transport::new(connector);

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;

        transport.disconnect();
        wait_for(&transport, ConnectionState::Disconnected).await;

        // Well past the reconnect delay: still down, second socket unused.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(
            transport.inner.connector.queue.lock().await.len(),
            1,
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_cancels_pending_disconnect() {
        let (first, _first_peer) = socket_pair();
        let (second, _second_peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![Ok(first), Ok(second)]));

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;

        // A connect issued while the deliberate close is still being
        // torn down must win over it.
        transport.disconnect();
        transport.connect();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.state(), ConnectionState::Connected);

        // And a connect after the close fully lands comes back up.
        transport.disconnect();
        wait_for(&transport, ConnectionState::Disconnected).await;
        tokio::task::yield_now().await;
        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_inbound_is_dropped_without_closing() {
        let (socket, peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![Ok(socket)]));

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        transport.on_message(move |envelope| {
            let _ = seen_tx.send(envelope);
        });

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;

        peer.inbound.send(Ok("{\"garbage\":true}".to_string())).unwrap();
        let request_id = Uuid::new_v4();
        peer.inbound
            .send(Ok(format!(
                r#"{{"requestId":"{request_id}","kind":"pending"}}"#
            )))
            .unwrap();

        let delivered = seen_rx.recv().await.unwrap();
        assert_eq!(delivered.request_id, request_id);
        assert_eq!(delivered.payload, ResultPayload::Pending);
        assert_eq!(transport.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_message_replaces_handler() {
        let (socket, peer) = socket_pair();
        let transport = Transport::new(FakeConnector::new(vec![Ok(socket)]));

        let (first_tx, mut first_rx) = mpsc::unbounded_channel::<ResultEnvelope>();
        transport.on_message(move |envelope| {
            let _ = first_tx.send(envelope);
        });
        let (second_tx, mut second_rx) = mpsc::unbounded_channel::<ResultEnvelope>();
        transport.on_message(move |envelope| {
            let _ = second_tx.send(envelope);
        });

        transport.connect();
        wait_for(&transport, ConnectionState::Connected).await;

        peer.inbound
            .send(Ok(format!(
                r#"{{"requestId":"{}","kind":"pending"}}"#,
                Uuid::new_v4()
            )))
            .unwrap();

        assert!(second_rx.recv().await.is_some());
        assert!(first_rx.try_recv().is_err());
    }
}
