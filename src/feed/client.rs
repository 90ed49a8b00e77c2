//! Reconnecting realtime feed client.
//!
//! A [`FeedClient`] spawns one background worker that owns the connection.
//! The worker is the only place transport events are handled, so open,
//! message, error, close and timer steps for one client never overlap. It
//! reconnects with capped exponential backoff and gives up after the
//! configured number of consecutive failures, leaving the client idle in
//! [`ConnectionState::Disconnected`].
//!
//! Nothing here fails outward: transport and decode problems are logged and
//! only show up through the connection state and latest-message watches.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, info, warn};

use crate::config::ApiContext;
use crate::feed::machine::{ConnectionState, ReconnectMachine};
use crate::feed::transport::{FeedConnection, FeedTransport, Frame, WsTransport};
use crate::retry::{with_optional_timeout, ReconnectPolicy};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback invoked once per decoded inbound message, in arrival order.
pub type Subscriber = Box<dyn FnMut(&Value) + Send + 'static>;

/// Tuning for a [`FeedClient`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FeedOptions {
    /// Backoff schedule and attempt ceiling.
    pub reconnect: ReconnectPolicy,
    /// Limit on a single connect attempt. `None` relies on the transport's
    /// own failure signaling.
    pub connect_timeout: Option<Duration>,
}

/// Errors observed by the feed worker. They are logged, never returned.
#[derive(Debug, Error)]
pub enum FeedClientError {
    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connect attempt did not finish in time.
    #[error("connect attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Transport contract error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Builder for [`FeedClient`].
pub struct FeedClientBuilder {
    endpoint: String,
    options: FeedOptions,
    subscriber: Option<Subscriber>,
}

impl FeedClientBuilder {
    /// Starts a builder for an explicit feed endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim().to_string(),
            options: FeedOptions::default(),
            subscriber: None,
        }
    }

    pub fn with_options(mut self, options: FeedOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers the message subscriber.
    ///
    /// The callback runs on the feed worker while the client's delivery lock
    /// is held; it must not call [`FeedClient::dispose`] on its own client.
    pub fn on_message<F>(mut self, subscriber: F) -> Self
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.subscriber = Some(Box::new(subscriber));
        self
    }

    /// Spawns the client over a websocket. Requires a tokio runtime.
    pub fn spawn(self) -> FeedClient {
        self.spawn_with_transport(WsTransport)
    }

    /// Spawns the client over a custom transport.
    pub fn spawn_with_transport<T: FeedTransport>(self, transport: T) -> FeedClient {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (connected_tx, _) = watch::channel(false);
        let (latest_tx, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            gate: Mutex::new(Gate {
                disposed: false,
                subscriber: self.subscriber,
            }),
            state_tx,
            connected_tx,
            latest_tx,
        });

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(feed_worker(
            self.endpoint.clone(),
            transport,
            self.options,
            Arc::clone(&shared),
            outbound_rx,
            shutdown_rx,
        ));

        FeedClient {
            endpoint: self.endpoint,
            shared,
            outbound_tx,
            shutdown_tx,
            worker: Some(worker),
        }
    }
}

/// Best-effort live connection to the dashboard feed.
///
/// Dropping the client disposes it.
pub struct FeedClient {
    endpoint: String,
    shared: Arc<Shared>,
    outbound_tx: mpsc::UnboundedSender<String>,
    shutdown_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl FeedClient {
    /// Starts a builder targeting the context's stream endpoint.
    pub fn builder(context: &ApiContext) -> FeedClientBuilder {
        FeedClientBuilder::new(context.stream_endpoint())
    }

    /// Connects to the context's stream endpoint with default options.
    pub fn spawn<F>(context: &ApiContext, subscriber: F) -> Self
    where
        F: FnMut(&Value) + Send + 'static,
    {
        Self::builder(context).on_message(subscriber).spawn()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.connected_tx.borrow()
    }

    /// Most recent successfully decoded message.
    pub fn latest_message(&self) -> Option<Value> {
        self.shared.latest_tx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Connectivity flag; changes only on connect/disconnect edges.
    ///
    /// Consumers poll the equivalent REST endpoint while this is `false`.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.shared.connected_tx.subscribe()
    }

    /// Latest message as a watch. Intermediate values may be skipped by slow
    /// readers; use the subscriber callback to see every message.
    pub fn watch_latest(&self) -> watch::Receiver<Option<Value>> {
        self.shared.latest_tx.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Serializes `message` and hands it to the open connection.
    ///
    /// Returns `false` without sending when the client is not connected or
    /// the message cannot be serialized. Nothing is queued for later.
    pub fn send<T>(&self, message: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        if !self.is_connected() {
            debug!(event = "feed_send_dropped", reason = "not_connected");
            return false;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                warn!(event = "feed_send_dropped", reason = "serialize", error = %err);
                return false;
            }
        };

        self.outbound_tx.send(text).is_ok()
    }

    /// Cancels any pending reconnect and closes the connection.
    ///
    /// No subscriber call or state change is observed once this returns.
    /// Calling it again is a no-op.
    pub fn dispose(&self) {
        if self.shared.dispose() {
            let _ = self.shutdown_tx.send(true);
            debug!(event = "feed_disposed", endpoint = %self.endpoint);
        }
    }

    /// Disposes the client and waits for the worker to close the connection.
    pub async fn close(mut self) {
        self.dispose();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct Gate {
    disposed: bool,
    subscriber: Option<Subscriber>,
}

/// State shared between a client handle and its worker.
///
/// Every outward-visible effect goes through `gate`, which is how `dispose`
/// fences off later callbacks.
struct Shared {
    gate: Mutex<Gate>,
    state_tx: watch::Sender<ConnectionState>,
    connected_tx: watch::Sender<bool>,
    latest_tx: watch::Sender<Option<Value>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_state(&self, state: ConnectionState) {
        let gate = self.lock();
        if gate.disposed {
            return;
        }
        self.set_state(state);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        let connected = state.is_connected();
        self.connected_tx.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    fn deliver(&self, message: Value) {
        let mut gate = self.lock();
        if gate.disposed {
            return;
        }
        self.latest_tx.send_replace(Some(message.clone()));
        if let Some(subscriber) = gate.subscriber.as_mut() {
            subscriber(&message);
        }
    }

    /// Returns `true` on the first call only.
    fn dispose(&self) -> bool {
        let mut gate = self.lock();
        if gate.disposed {
            return false;
        }
        gate.disposed = true;
        gate.subscriber = None;
        self.set_state(ConnectionState::Disconnected);
        true
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.deliver(message),
            Err(err) => {
                let err = FeedClientError::from(err);
                warn!(
                    event = "feed_message_malformed",
                    error = %err,
                    bytes = text.len()
                );
            }
        }
    }
}

enum ConnectionOutcome {
    Shutdown,
    Closed,
    Failed(FeedClientError),
}

async fn feed_worker<T: FeedTransport>(
    url: String,
    transport: T,
    options: FeedOptions,
    shared: Arc<Shared>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut machine = ReconnectMachine::new(options.reconnect);

    loop {
        machine.on_connect();
        shared.publish_state(machine.state());
        debug!(event = "feed_connecting", url = %url, attempts = machine.attempts());

        let attempt = with_optional_timeout(options.connect_timeout, transport.connect(&url));
        let outcome = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown_rx) => return,
            outcome = attempt => outcome,
        };

        let connected = match outcome {
            Ok(Ok(connection)) => Some(connection),
            Ok(Err(err)) => {
                warn!(event = "feed_connect_failed", url = %url, error = %err);
                None
            }
            Err(_) => {
                let err = FeedClientError::ConnectTimeout(
                    options.connect_timeout.unwrap_or_default(),
                );
                warn!(event = "feed_connect_failed", url = %url, error = %err);
                None
            }
        };

        match connected {
            Some(mut connection) => {
                machine.on_open();
                // Sends that raced the connect were made while not connected.
                while outbound_rx.try_recv().is_ok() {}
                shared.publish_state(machine.state());
                info!(event = "feed_connected", url = %url);

                match run_connection(&mut connection, &shared, &mut outbound_rx, &mut shutdown_rx)
                    .await
                {
                    ConnectionOutcome::Shutdown => {
                        let _ = tokio::time::timeout(CLOSE_TIMEOUT, connection.close()).await;
                        return;
                    }
                    ConnectionOutcome::Closed => {
                        info!(event = "feed_disconnected", url = %url);
                    }
                    ConnectionOutcome::Failed(err) => {
                        machine.on_error();
                        warn!(event = "feed_connection_error", url = %url, error = %err);
                    }
                }
            }
            None => machine.on_error(),
        }

        let Some(delay) = machine.on_close() else {
            shared.publish_state(machine.state());
            warn!(
                event = "feed_reconnect_exhausted",
                url = %url,
                attempts = machine.attempts()
            );
            shutdown_requested(&mut shutdown_rx).await;
            return;
        };
        shared.publish_state(machine.state());
        debug!(
            event = "feed_reconnect_scheduled",
            attempt = machine.attempts(),
            delay_ms = delay.as_millis() as u64
        );

        if !wait_for_retry(delay, &mut outbound_rx, &mut shutdown_rx).await {
            return;
        }
    }
}

async fn run_connection<C: FeedConnection>(
    connection: &mut C,
    shared: &Shared,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnectionOutcome {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown_rx) => return ConnectionOutcome::Shutdown,
            maybe_outbound = outbound_rx.recv() => {
                match maybe_outbound {
                    Some(text) => {
                        if let Err(err) = connection.send_text(text).await {
                            return ConnectionOutcome::Failed(err);
                        }
                    }
                    None => return ConnectionOutcome::Shutdown,
                }
            }
            maybe_inbound = connection.recv() => {
                match maybe_inbound {
                    Some(Ok(Frame::Text(text))) => shared.handle_text(&text),
                    Some(Ok(Frame::Undecodable)) => {
                        let err = FeedClientError::Protocol("non-utf8 binary frame".to_string());
                        warn!(event = "feed_message_malformed", error = %err);
                    }
                    Some(Ok(Frame::Close)) | None => return ConnectionOutcome::Closed,
                    Some(Err(err)) => return ConnectionOutcome::Failed(err),
                }
            }
        }
    }
}

/// Sleeps out the backoff delay, discarding anything sent meanwhile.
///
/// Returns `false` when the client was disposed.
async fn wait_for_retry(
    delay: Duration,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown_rx) => return false,
            _ = &mut sleep => return true,
            maybe_message = outbound_rx.recv() => {
                match maybe_message {
                    Some(_) => debug!(event = "feed_send_dropped", reason = "reconnecting"),
                    None => return false,
                }
            }
        }
    }
}

async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::{FeedClient, FeedClientBuilder, FeedClientError, FeedOptions};
    use crate::config::ApiContext;
    use crate::feed::machine::ConnectionState;
    use crate::feed::proto::ClientMessage;
    use crate::feed::transport::{FeedConnection, FeedTransport, Frame};
    use crate::retry::ReconnectPolicy;

    const ENDPOINT: &str = "ws://scripted.test/ws";

    enum Script {
        Refuse,
        Accept(ScriptedConnection),
        Hang,
    }

    struct ScriptedConnection {
        inbound: mpsc::UnboundedReceiver<Frame>,
        outbound: mpsc::UnboundedSender<String>,
    }

    /// Test side of a scripted connection.
    struct Peer {
        inbound: mpsc::UnboundedSender<Frame>,
        outbound: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        fn text(&self, text: &str) {
            self.inbound
                .send(Frame::Text(text.to_string()))
                .expect("connection alive");
        }
    }

    fn scripted_pair() -> (ScriptedConnection, Peer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            ScriptedConnection {
                inbound: inbound_rx,
                outbound: outbound_tx,
            },
            Peer {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }

    impl FeedConnection for ScriptedConnection {
        async fn recv(&mut self) -> Option<Result<Frame, FeedClientError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn send_text(&mut self, text: String) -> Result<(), FeedClientError> {
            self.outbound
                .send(text)
                .map_err(|_| FeedClientError::Protocol("peer gone".to_string()))
        }

        async fn close(&mut self) {
            self.inbound.close();
        }
    }

    #[derive(Default)]
    struct ScriptState {
        scripts: VecDeque<Script>,
        connects: Vec<Instant>,
    }

    /// Plays back connect outcomes in order, refusing once the script runs out.
    #[derive(Clone, Default)]
    struct ScriptedTransport {
        state: Arc<Mutex<ScriptState>>,
    }

    impl ScriptedTransport {
        fn push(&self, script: Script) {
            self.state.lock().expect("lock").scripts.push_back(script);
        }

        fn connect_times(&self) -> Vec<Instant> {
            self.state.lock().expect("lock").connects.clone()
        }

        fn connect_count(&self) -> usize {
            self.state.lock().expect("lock").connects.len()
        }
    }

    impl FeedTransport for ScriptedTransport {
        type Connection = ScriptedConnection;

        fn connect(
            &self,
            _url: &str,
        ) -> impl Future<Output = Result<Self::Connection, FeedClientError>> + Send {
            let script = {
                let mut state = self.state.lock().expect("lock");
                state.connects.push(Instant::now());
                state.scripts.pop_front().unwrap_or(Script::Refuse)
            };
            async move {
                match script {
                    Script::Refuse => Err(FeedClientError::Protocol("connection refused".to_string())),
                    Script::Accept(connection) => Ok(connection),
                    Script::Hang => std::future::pending().await,
                }
            }
        }
    }

    fn gaps_ms(times: &[Instant]) -> Vec<u64> {
        times
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
            .collect()
    }

    fn assert_gaps(actual: &[u64], expected: &[u64]) {
        assert!(actual.len() >= expected.len(), "gaps {actual:?} vs {expected:?}");
        for (gap, want) in actual.iter().zip(expected) {
            assert!(
                *gap >= *want && *gap < *want + 10,
                "gaps {actual:?} vs {expected:?}"
            );
        }
    }

    fn spawn(transport: &ScriptedTransport) -> FeedClient {
        FeedClientBuilder::new(ENDPOINT).spawn_with_transport(transport.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connects_back_off_until_the_ceiling() {
        let transport = ScriptedTransport::default();
        let client = spawn(&transport);

        tokio::time::sleep(Duration::from_secs(3_600)).await;

        let times = transport.connect_times();
        assert_eq!(times.len(), 11, "initial attempt plus ten reconnects");
        assert_gaps(
            &gaps_ms(&times),
            &[1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000, 30_000, 30_000],
        );
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());

        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_the_backoff() {
        let transport = ScriptedTransport::default();
        let (connection, peer) = scripted_pair();
        transport.push(Script::Refuse);
        transport.push(Script::Accept(connection));
        drop(peer);

        let client = spawn(&transport);
        tokio::time::sleep(Duration::from_secs(3_600)).await;

        let times = transport.connect_times();
        assert_eq!(times.len(), 12);
        assert_gaps(&gaps_ms(&times), &[1_000, 1_000, 2_000, 4_000]);

        client.close().await;
    }

    #[tokio::test]
    async fn delivers_in_order_and_skips_malformed_frames() {
        let transport = ScriptedTransport::default();
        let (connection, peer) = scripted_pair();
        transport.push(Script::Accept(connection));

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Value>();
        let client = FeedClientBuilder::new(ENDPOINT)
            .on_message(move |message| {
                let _ = seen_tx.send(message.clone());
            })
            .spawn_with_transport(transport.clone());

        peer.text(r#"{"seq":1}"#);
        peer.text("{not json");
        peer.inbound.send(Frame::Undecodable).expect("alive");
        peer.text(r#"{"seq":3}"#);

        assert_eq!(seen_rx.recv().await, Some(json!({"seq": 1})));
        assert_eq!(seen_rx.recv().await, Some(json!({"seq": 3})));
        assert!(seen_rx.try_recv().is_err());
        assert_eq!(client.latest_message(), Some(json!({"seq": 3})));
        assert!(client.is_connected());
        assert_eq!(transport.connect_count(), 1);

        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn send_is_dropped_unless_connected() {
        let transport = ScriptedTransport::default();
        transport.push(Script::Hang);
        let client = spawn(&transport);

        assert!(!client.send(&json!({"type": "ping"})));

        let mut state = client.watch_state();
        state
            .wait_for(|state| *state == ConnectionState::Connecting)
            .await
            .expect("worker alive");
        assert!(!client.send(&json!({"type": "ping"})));

        client.close().await;
    }

    #[tokio::test]
    async fn send_while_connected_writes_one_frame() {
        let transport = ScriptedTransport::default();
        let (connection, mut peer) = scripted_pair();
        transport.push(Script::Accept(connection));
        let client = spawn(&transport);

        let mut connected = client.watch_connected();
        connected.wait_for(|up| *up).await.expect("worker alive");

        assert!(client.send(&ClientMessage::Ping {
            client_time_ms: Some(1)
        }));
        let frame = peer.outbound.recv().await.expect("frame written");
        assert_eq!(
            serde_json::from_str::<Value>(&frame).expect("json frame"),
            json!({"type": "ping", "client_time_ms": 1})
        );
        assert!(peer.outbound.try_recv().is_err());

        drop(peer.inbound);
        connected.wait_for(|up| !*up).await.expect("worker alive");
        assert!(!client.send(&json!({"type": "ping"})));

        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_twice_cancels_the_pending_reconnect() {
        let transport = ScriptedTransport::default();
        let client = spawn(&transport);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.connect_count(), 1);

        client.dispose();
        client.dispose();
        assert!(client.is_disposed());

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.close().await;
    }

    #[tokio::test]
    async fn dispose_closes_the_connection_and_silences_the_subscriber() {
        let transport = ScriptedTransport::default();
        let (connection, mut peer) = scripted_pair();
        transport.push(Script::Accept(connection));

        let calls = Arc::new(Mutex::new(0usize));
        let client = FeedClientBuilder::new(ENDPOINT)
            .on_message({
                let calls = Arc::clone(&calls);
                move |_| *calls.lock().expect("lock") += 1
            })
            .spawn_with_transport(transport.clone());

        let mut connected = client.watch_connected();
        connected.wait_for(|up| *up).await.expect("worker alive");

        client.dispose();
        assert!(!client.is_connected());
        let _ = peer.inbound.send(Frame::Text(r#"{"late":true}"#.to_string()));

        assert!(peer.outbound.recv().await.is_none(), "connection dropped");
        client.close().await;
        assert_eq!(*calls.lock().expect("lock"), 0);
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_after_natural_close_is_safe() {
        let transport = ScriptedTransport::default();
        let (connection, peer) = scripted_pair();
        transport.push(Script::Accept(connection));
        let client = spawn(&transport);

        let mut connected = client.watch_connected();
        connected.wait_for(|up| *up).await.expect("worker alive");
        drop(peer);
        connected.wait_for(|up| !*up).await.expect("worker alive");

        client.dispose();
        client.dispose();
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(transport.connect_count(), 1);
        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_client_stops_reconnects() {
        let transport = ScriptedTransport::default();
        drop(spawn(&transport));

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert!(transport.connect_count() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_counts_as_a_failed_attempt() {
        let transport = ScriptedTransport::default();
        let (connection, _peer) = scripted_pair();
        transport.push(Script::Hang);
        transport.push(Script::Accept(connection));

        let client = FeedClientBuilder::new(ENDPOINT)
            .with_options(FeedOptions {
                reconnect: ReconnectPolicy::default(),
                connect_timeout: Some(Duration::from_secs(5)),
            })
            .spawn_with_transport(transport.clone());

        let mut connected = client.watch_connected();
        connected.wait_for(|up| *up).await.expect("worker alive");
        assert_gaps(&gaps_ms(&transport.connect_times()), &[6_000]);

        client.close().await;
    }

    #[tokio::test]
    async fn builder_uses_context_stream_endpoint() {
        let context = ApiContext::new("https://api.example.com").expect("context");
        let transport = ScriptedTransport::default();
        transport.push(Script::Hang);
        let client = FeedClient::builder(&context).spawn_with_transport(transport);
        assert_eq!(client.endpoint(), "wss://api.example.com/ws");
        client.close().await;
    }
}
