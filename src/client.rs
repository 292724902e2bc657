use crate::{
    service::{events::ServerEvent, registry::EventRegistry},
    state::{
        connection::{ConnectionStatus, DisconnectReason, ReconnectPolicy},
        token::TokenStore,
        AckResult, RequestId, State,
    },
};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Query parameter carrying the bearer token.
pub const AUTHORIZATION_PARAM: &str = "authorization";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Error type for the connection manager.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Generated when the socket url cannot be parsed.
    #[error("invalid socket url `{0}`")]
    InvalidUrl(String),
    /// Generated when every automatic reconnect attempt failed.
    #[error("gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),
}

/// Options of the realtime connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Socket endpoint, e.g. `ws://127.0.0.1:8080/`.
    pub url: String,
    /// Consecutive automatic reconnect attempts before giving up.
    pub reconnection_attempts: u32,
    /// Fixed delay between automatic reconnect attempts.
    pub reconnection_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/".into(),
            reconnection_attempts: 5,
            reconnection_delay: Duration::from_millis(1000),
        }
    }
}

/// Acknowledgement sent back by the server for a request with an id.
#[derive(Debug, Deserialize)]
struct AckFrame {
    id: RequestId,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Connection manager that owns the single realtime connection of a
/// session.
pub struct Client {
    /// State shared with the emitting services.
    state: Arc<State>,
    /// Listeners of inbound server events.
    registry: Arc<EventRegistry>,
    /// Endpoint with the authorization captured at creation.
    url: Url,
    options: ConnectOptions,
}

impl Client {
    /// Creates a new connection manager.
    ///
    /// The token is read from `tokens` once, here. Rotating it afterwards
    /// has no effect on this client.
    pub fn new(
        options: ConnectOptions,
        tokens: &dyn TokenStore,
        registry: Arc<EventRegistry>,
    ) -> Result<Self, ClientError> {
        let url = connection_url(&options.url, tokens.token().as_deref())?;
        Ok(Self {
            state: Arc::new(State::new()),
            registry,
            url,
            options,
        })
    }

    /// Returns the endpoint used to connect, authorization included.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the registry inbound events are dispatched to.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Returns the shared connection state.
    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    /// Returns `true` while the connection is established.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Returns a receiver notified on every status change.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.state.subscribe_status()
    }

    /// Waits until the connection is established. Returns `false` if the
    /// client was dropped first.
    pub async fn wait_until_connected(&self) -> bool {
        let mut status = self.status();
        loop {
            if *status.borrow_and_update() == ConnectionStatus::Connected {
                return true;
            }
            if status.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Sends an event without acknowledgement.
    ///
    /// Silently returns `false` when not connected.
    pub async fn emit<T: Serialize>(&self, event: &str, payload: &T) -> bool {
        if !self.is_connected() {
            tracing::debug!(event, "Dropping event while disconnected");
            return false;
        }
        let frame = match encode_frame(None, event, payload) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(event, error = ?err, "Error encoding outgoing event");
                return false;
            }
        };
        match self.state.send(frame).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(event, error = %err, "Dropping event");
                false
            }
        }
    }

    /// Sends an event that the server acknowledges.
    ///
    /// Returns `None` when not connected. The receiver errors if the
    /// connection ends before the acknowledgement arrives.
    pub async fn request<T: Serialize>(
        &self,
        event: &str,
        payload: &T,
    ) -> Option<oneshot::Receiver<AckResult>> {
        if !self.is_connected() {
            tracing::debug!(event, "Dropping request while disconnected");
            return None;
        }
        let id = self.state.new_request_id();
        let frame = match encode_frame(Some(id), event, payload) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(event, error = ?err, "Error encoding outgoing request");
                return None;
            }
        };
        let (tx, rx) = oneshot::channel();
        self.state.add_pending(id, tx).await;
        if let Err(err) = self.state.send(frame).await {
            tracing::debug!(event, error = %err, "Dropping request");
            self.state.remove_pending(id).await;
            return None;
        }
        Some(rx)
    }

    /// Keeps the connection alive until `shutdown` fires.
    ///
    /// A server-initiated close is followed by an explicit reconnect right
    /// away. Transport failures and connect errors are retried after the
    /// configured delay, up to the configured number of consecutive
    /// attempts.
    #[tracing::instrument(name = "Running realtime connection", skip_all, fields(endpoint = %endpoint(&self.url)))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), ClientError> {
        let mut failures: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            self.state.set_status(ConnectionStatus::Connecting);
            let connected = tokio::select! {
                res = tokio_tungstenite::connect_async(self.url.as_str()) => res,
                _ = shutdown.changed() => {
                    self.state.set_status(ConnectionStatus::Disconnected);
                    return Ok(());
                }
            };

            match connected {
                Ok((socket, _)) => {
                    failures = 0;
                    let reason = self.handle_connection(socket, &mut shutdown).await;
                    match reason.reconnect_policy() {
                        ReconnectPolicy::Explicit => {
                            tracing::info!(reason = %reason, "Reconnecting");
                            continue;
                        }
                        ReconnectPolicy::Never => return Ok(()),
                        ReconnectPolicy::Automatic => {}
                    }
                }
                Err(err) => {
                    self.state.set_status(ConnectionStatus::Disconnected);
                    tracing::error!(error = ?err, "connect_error");
                }
            }

            failures += 1;
            if failures > self.options.reconnection_attempts {
                tracing::error!(
                    attempts = self.options.reconnection_attempts,
                    "Giving up reconnecting"
                );
                return Err(ClientError::ReconnectExhausted(
                    self.options.reconnection_attempts,
                ));
            }
            tracing::info!(
                attempt = failures,
                delay_ms = self.options.reconnection_delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.options.reconnection_delay) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    /// Handles an open connection until it ends, returning why it ended.
    ///
    /// Heartbeat frames are answered by tungstenite itself.
    #[tracing::instrument(name = "Handling connection", skip_all)]
    async fn handle_connection(
        self: &Arc<Self>,
        socket: Socket,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DisconnectReason {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel::<String>();
        let mut internal_rx = UnboundedReceiverStream::new(internal_rx);

        self.state.attach_outbound(internal_tx).await;
        self.state.set_status(ConnectionStatus::Connected);
        tracing::info!("connect");

        let self_c = self.clone();
        let mut receive_task = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(txt)) => self_c.handle_incoming_message(txt).await,
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(frame = ?frame, "Close frame received");
                        return DisconnectReason::ServerDisconnect;
                    }
                    // Ignore messages that are not text
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = ?err, "Error while reading from websocket");
                        return DisconnectReason::TransportError;
                    }
                }
            }
            DisconnectReason::TransportClose
        });

        let mut send_task = tokio::spawn(async move {
            while let Some(msg) = internal_rx.next().await {
                if let Err(err) = ws_tx.send(Message::Text(msg)).await {
                    tracing::error!(error = ?err, "Error while sending message to websocket");
                    return DisconnectReason::TransportError;
                }
            }
            // Outbound channel detached locally
            let _ = ws_tx.send(Message::Close(None)).await;
            DisconnectReason::ClientDisconnect
        });

        let reason = tokio::select! {
            res = &mut receive_task => res.unwrap_or(DisconnectReason::TransportError),
            res = &mut send_task => res.unwrap_or(DisconnectReason::TransportError),
            _ = shutdown.changed() => {
                self.state.detach_outbound().await;
                let _ = (&mut send_task).await;
                DisconnectReason::ClientDisconnect
            }
        };
        receive_task.abort();
        send_task.abort();

        // Perform any operation needed after connection closed
        self.state.set_status(ConnectionStatus::Disconnected);
        self.state.detach_outbound().await;
        let dropped = self.state.drop_pending().await;
        tracing::warn!(reason = %reason, dropped_acks = dropped, "disconnect");
        reason
    }

    /// Handle incoming text message.
    #[tracing::instrument(name = "Handling incoming message", skip_all, fields(method))]
    async fn handle_incoming_message(&self, msg: String) {
        let frame: Value = match serde_json::from_str(&msg) {
            Ok(frame) => frame,
            Err(err) => {
                return tracing::warn!(frame = %msg, error = ?err, "Error decoding incoming message")
            }
        };
        if frame.get("method").is_some() {
            match json_rpc2::from_str(&msg) {
                Ok(req) => self.handle_rpc_notification(&req),
                Err(err) => tracing::warn!(
                    frame = %msg,
                    error = ?err,
                    "Error decoding incoming message as json-rpc"
                ),
            }
        } else {
            match serde_json::from_value::<AckFrame>(frame) {
                Ok(ack) => self.handle_rpc_response(ack).await,
                Err(err) => tracing::warn!(
                    frame = %msg,
                    error = ?err,
                    "Error decoding incoming acknowledgement"
                ),
            }
        }
    }

    /// Decodes a server event and fans it out to the registry.
    fn handle_rpc_notification(&self, req: &json_rpc2::Request) {
        tracing::Span::current().record("method", req.method());
        let params: Value = req.deserialize().unwrap_or(Value::Null);
        match ServerEvent::decode_named(req.method(), params) {
            Ok(event) => {
                let listeners = self.registry.dispatch(&event);
                tracing::debug!(listeners, "Dispatched server event");
            }
            Err(err) => tracing::warn!(error = %err, "Dropping server event"),
        }
    }

    /// Resolves the request waiting for this acknowledgement.
    async fn handle_rpc_response(&self, ack: AckFrame) {
        let result = match ack.error {
            Some(error) => Err(error),
            None => Ok(ack.result.unwrap_or(Value::Null)),
        };
        if !self.state.resolve_pending(ack.id, result).await {
            tracing::debug!(id = ack.id, "Acknowledgement without pending request");
        }
    }
}

/// Builds the socket url with the bearer token as query parameter.
fn connection_url(base: &str, token: Option<&str>) -> Result<Url, ClientError> {
    let mut url = Url::parse(base).map_err(|_| ClientError::InvalidUrl(base.to_string()))?;
    if let Some(token) = token {
        url.query_pairs_mut()
            .append_pair(AUTHORIZATION_PARAM, &format!("Bearer {token}"));
    }
    Ok(url)
}

/// Url without query, safe to log.
fn endpoint(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

fn encode_frame<T: Serialize>(
    id: Option<RequestId>,
    event: &str,
    payload: &T,
) -> Result<String, serde_json::Error> {
    let params = serde_json::to_value(payload)?;
    let request = json_rpc2::Request::new(id.map(Value::from), event.to_string(), Some(params));
    serde_json::to_string(&request)
}
