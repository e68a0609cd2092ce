//! Long-lived duplex session with the controller.
//!
//! `connect` dials the endpoint recorded at pairing time and keeps the link
//! alive until shutdown is requested or the pairing is gone. Each connection
//! runs an inbound reader, a status heartbeat and a liveness check against the
//! paired descriptor, plus a writer that owns the socket's send half. The
//! first of them to decide the connection is over closes a shared
//! [`DoneGate`]; the others observe it and stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use screenlink_config::ClientConfig;
use screenlink_core::{LifecycleEvent, LinkError, Observers};
use screenlink_infra::{PairedDescriptor, PairedSessionStore};
use screenlink_security::{is_encrypted_envelope, unwrap_envelope, wrap_envelope};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::commands::{CommandDispatcher, Responder};
use crate::gate::{DoneGate, StopReason};
use crate::protocol::{self, CommandResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub status_interval: Duration,
    pub liveness_interval: Duration,
    /// How long `disconnect` waits for the controller's close acknowledgement.
    pub disconnect_grace: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(30),
            liveness_interval: Duration::from_secs(5),
            disconnect_grace: Duration::from_secs(1),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl LinkSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            status_interval: config.status_update_interval,
            liveness_interval: config.liveness_interval,
            disconnect_grace: config.disconnect_grace,
            ..Self::default()
        }
    }
}

/// Why `connect` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkExit {
    Shutdown,
    /// The paired descriptor is gone; the caller should go back to pairing.
    Unpaired,
}

struct Connection {
    endpoint: String,
    outbound: mpsc::UnboundedSender<WsMessage>,
    gate: DoneGate,
    /// `None` on a legacy plaintext session.
    session_key: Option<String>,
}

impl Connection {
    fn send(&self, message: &Value) -> Result<(), LinkError> {
        let wire = match &self.session_key {
            Some(key) => wrap_envelope(message, key)?.to_value(),
            None => message.clone(),
        };
        self.outbound
            .send(WsMessage::Text(wire.to_string().into()))
            .map_err(|_| LinkError::NotConnected)
    }

    fn decode(&self, text: &str) -> Result<Value, LinkError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| LinkError::Protocol(format!("malformed message: {e}")))?;
        match &self.session_key {
            Some(key) => {
                if !is_encrypted_envelope(&value) {
                    return Err(LinkError::Protocol(
                        "plaintext message on an encrypted session".into(),
                    ));
                }
                Ok(unwrap_envelope(&value, key)?)
            }
            None if is_encrypted_envelope(&value) => Err(LinkError::Protocol(
                "encrypted message on a session without a key".into(),
            )),
            None => Ok(value),
        }
    }
}

impl Responder for Connection {
    fn respond(&self, response: CommandResponse) -> Result<(), LinkError> {
        self.send(&response.to_message())
    }
}

fn stop_reason(e: &LinkError) -> StopReason {
    match e {
        _ if e.invalidates_pairing() => StopReason::ProtocolViolation,
        LinkError::Transport(_) => StopReason::TransportClosed,
        _ => StopReason::WriteFailed,
    }
}

/// What `connect` does once a connection has ended; `None` means reconnect.
fn exit_after(reason: StopReason) -> Option<LinkExit> {
    if reason.invalidates_pairing() || reason == StopReason::DescriptorRemoved {
        Some(LinkExit::Unpaired)
    } else {
        None
    }
}

async fn dial(endpoint: &str) -> Result<WsStream, LinkError> {
    let (ws, _) = connect_async(endpoint)
        .await
        .map_err(|e| LinkError::Dial(e.to_string()))?;
    Ok(ws)
}

pub struct SessionManager {
    settings: LinkSettings,
    store: PairedSessionStore,
    dispatcher: Arc<CommandDispatcher>,
    observers: Observers,
    shutdown_requested: AtomicBool,
    shutdown: CancellationToken,
    active: Mutex<Option<Arc<Connection>>>,
}

impl SessionManager {
    pub fn new(
        settings: LinkSettings,
        store: PairedSessionStore,
        dispatcher: Arc<CommandDispatcher>,
        observers: Observers,
    ) -> Self {
        Self {
            settings,
            store,
            dispatcher,
            observers,
            shutdown_requested: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            active: Mutex::new(None),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs the reconnect loop against `endpoint`. The descriptor is reloaded
    /// before every dial so a reset or deactivation is noticed.
    pub async fn connect(self: &Arc<Self>, endpoint: &str) -> LinkExit {
        let mut backoff = Backoff::new(self.settings.initial_backoff, self.settings.max_backoff, 2);

        loop {
            if self.is_shutdown_requested() {
                return LinkExit::Shutdown;
            }

            let descriptor = match self.load_descriptor().await {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => {
                    info!("[Link] No paired descriptor, leaving session loop");
                    return LinkExit::Unpaired;
                }
                Err(e) => {
                    warn!(error = %e, "[Link] Paired descriptor unreadable, discarding it");
                    self.discard_descriptor().await;
                    return LinkExit::Unpaired;
                }
            };

            info!(endpoint, encrypted = descriptor.is_encrypted(), "[Link] Dialing controller");
            let ws = match dial(endpoint).await {
                Ok(ws) => ws,
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(endpoint, error = %e, ?delay, "[Link] Dial failed, retrying");
                    if !self.pause(delay).await {
                        return LinkExit::Shutdown;
                    }
                    continue;
                }
            };
            backoff.reset();

            let reason = self.run_connection(ws, endpoint, &descriptor).await;
            if self.is_shutdown_requested() {
                return LinkExit::Shutdown;
            }
            if let Some(exit) = exit_after(reason) {
                return exit;
            }

            let delay = backoff.next_delay();
            info!(%reason, ?delay, "[Link] Connection ended, reconnecting");
            if !self.pause(delay).await {
                return LinkExit::Shutdown;
            }
        }
    }

    /// Closes the active connection, optionally announcing it to the
    /// controller first. The reconnect loop decides what happens next.
    pub async fn disconnect(&self, send_notice: bool) {
        let conn = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(conn) = conn else {
            debug!("[Link] Disconnect requested with no active connection");
            return;
        };

        if send_notice && !conn.gate.is_closed() {
            let notice = protocol::disconnect_notice(self.dispatcher.status().client_id());
            if let Err(e) = conn.send(&notice) {
                warn!(error = %e, "[Link] Could not send disconnect notice");
            }
        }

        let close = WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        }));
        let _ = conn.outbound.send(close);

        // The inbound reader closes the gate when the acknowledgement arrives.
        if tokio::time::timeout(self.settings.disconnect_grace, conn.gate.closed())
            .await
            .is_err()
        {
            debug!("[Link] No close acknowledgement within grace period");
        }
        conn.gate.close(StopReason::LocalDisconnect);
        info!(endpoint = %conn.endpoint, "[Link] Disconnected");
    }

    /// Stops the reconnect loop for good.
    pub async fn shutdown(&self, send_notice: bool) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
        self.disconnect(send_notice).await;
    }

    /// Sleeps for `delay`; false if shutdown interrupted the wait.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }

    async fn load_descriptor(&self) -> Result<Option<PairedDescriptor>, LinkError> {
        Ok(self.store.load().await?)
    }

    async fn discard_descriptor(&self) {
        match self.store.delete().await.map_err(LinkError::from) {
            Ok(true) => info!(path = %self.store.path().display(), "[Link] Paired descriptor deleted"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "[Link] Failed to delete paired descriptor"),
        }
    }

    async fn run_connection(
        self: &Arc<Self>,
        ws: WsStream,
        endpoint: &str,
        descriptor: &PairedDescriptor,
    ) -> StopReason {
        let (sink, source) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let session_key = Some(descriptor.session_key.clone()).filter(|k| !k.is_empty());
        if session_key.is_none() {
            warn!("[Link] Paired without a session key, messages travel in plaintext");
        }

        let conn = Arc::new(Connection {
            endpoint: endpoint.to_string(),
            outbound: tx,
            gate: DoneGate::new(),
            session_key,
        });
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn.clone());
        if self.is_shutdown_requested() {
            conn.gate.close(StopReason::LocalDisconnect);
        }

        info!(endpoint, "[Link] Connected");
        self.observers.emit(LifecycleEvent::ConnectionStarted {
            endpoint: endpoint.to_string(),
        });

        let tasks = [
            tokio::spawn(write_loop(
                sink,
                rx,
                conn.gate.clone(),
                self.settings.disconnect_grace,
            )),
            tokio::spawn(self.clone().inbound_loop(conn.clone(), source)),
            tokio::spawn(self.clone().heartbeat_loop(conn.clone())),
            tokio::spawn(self.clone().liveness_loop(conn.clone())),
        ];

        conn.gate.closed().await;
        let reason = conn.gate.reason().unwrap_or(StopReason::TransportClosed);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "[Link] Connection task failed");
            }
        }

        if reason.invalidates_pairing() {
            warn!(%reason, "[Link] Pairing invalidated");
            self.discard_descriptor().await;
        }

        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, &conn)) {
                *active = None;
            }
        }

        info!(endpoint, %reason, "[Link] Connection closed");
        self.observers.emit(LifecycleEvent::ConnectionStopped {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        });
        reason
    }

    async fn inbound_loop(self: Arc<Self>, conn: Arc<Connection>, mut source: WsSource) {
        loop {
            let next = tokio::select! {
                _ = conn.gate.closed() => break,
                next = source.next() => next,
            };

            match next {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(reason) = self.handle_text(&conn, text.as_str()).await {
                        conn.gate.close(reason);
                        break;
                    }
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    warn!("[Link] Unexpected binary frame");
                    conn.gate.close(StopReason::ProtocolViolation);
                    break;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "[Link] Controller closed the connection");
                    conn.gate.close(StopReason::TransportClosed);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let e = LinkError::Transport(e.to_string());
                    warn!(error = %e, "[Link] Read failed");
                    conn.gate.close(stop_reason(&e));
                    break;
                }
                None => {
                    conn.gate.close(StopReason::TransportClosed);
                    break;
                }
            }
        }
    }

    /// Returns the reason to end the connection, if this message ends it.
    /// Commands run on their own task so a slow one never stalls the reader.
    async fn handle_text(&self, conn: &Arc<Connection>, text: &str) -> Option<StopReason> {
        let message = match conn.decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "[Link] Rejecting inbound message");
                return Some(StopReason::ProtocolViolation);
            }
        };

        match protocol::message_type(&message) {
            Some(protocol::PING) => conn.send(&protocol::pong()).err().map(|e| stop_reason(&e)),
            Some(protocol::COMMAND) => {
                let dispatcher = self.dispatcher.clone();
                let conn = conn.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.dispatch(&message, conn.as_ref()).await {
                        if conn.gate.is_closed() {
                            debug!(error = %e, "[Link] Command finished after connection closed");
                        } else {
                            warn!(error = %e, "[Link] Could not queue command response");
                            conn.gate.close(stop_reason(&e));
                        }
                    }
                });
                None
            }
            Some(protocol::DEACTIVATED) => {
                info!("[Link] Controller deactivated this device");
                Some(StopReason::Deactivated)
            }
            Some(protocol::ERROR) => {
                let detail = message.get("message").and_then(Value::as_str).unwrap_or("");
                warn!(detail, "[Link] Controller reported an error");
                None
            }
            other => {
                debug!(kind = ?other, "[Link] Ignoring message");
                None
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, conn: Arc<Connection>) {
        // The first tick completes immediately, so status goes out on connect.
        let mut ticker = tokio::time::interval(self.settings.status_interval);
        loop {
            tokio::select! {
                _ = conn.gate.closed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = conn.send(&self.dispatcher.status().message()) {
                        warn!(error = %e, "[Link] Status heartbeat failed");
                        conn.gate.close(stop_reason(&e));
                        break;
                    }
                }
            }
        }
    }

    async fn liveness_loop(self: Arc<Self>, conn: Arc<Connection>) {
        let mut ticker = tokio::time::interval(self.settings.liveness_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = conn.gate.closed() => break,
                _ = ticker.tick() => {
                    if !self.store.exists().await {
                        info!("[Link] Paired descriptor removed, closing connection");
                        conn.gate.close(StopReason::DescriptorRemoved);
                        break;
                    }
                }
            }
        }
    }
}

/// Owns the send half. Queued messages are flushed before the gate is honored.
async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    gate: DoneGate,
    grace: Duration,
) {
    loop {
        tokio::select! {
            biased;
            next = outbound.recv() => {
                let Some(message) = next else { break };
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "[Link] Write failed");
                    gate.close(StopReason::WriteFailed);
                    break;
                }
            }
            _ = gate.closed() => break,
        }
    }
    if tokio::time::timeout(grace, sink.close()).await.is_err() {
        debug!("[Link] Socket close timed out");
    }
}
