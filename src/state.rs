//! State module.
//!
//! This module contains the state shared between the connection manager and
//! the services that emit through it, plus the different types used to
//! represent messages, routes and responsibilities.

#[cfg(feature = "client")]
use self::connection::ConnectionStatus;
#[cfg(feature = "client")]
use serde_json::Value;
#[cfg(feature = "client")]
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};
#[cfg(feature = "client")]
use thiserror::Error;
#[cfg(feature = "client")]
use tokio::sync::{mpsc::UnboundedSender, oneshot, watch, Mutex, RwLock};

pub mod connection;
pub mod message;
#[cfg(feature = "client")]
pub mod responsibility;
pub mod route;
pub mod token;

/// Identifier of an acknowledged request.
pub type RequestId = u64;

/// Outcome of an acknowledged request: the response `result` or its `error`.
#[cfg(feature = "client")]
pub type AckResult = Result<Value, Value>;

/// Error type for state operations.
#[derive(Debug, Error)]
#[cfg(feature = "client")]
pub enum StateError {
    /// Generated when sending while the connection is not established.
    #[error("connection is not established")]
    NotConnected,
    /// Generated when the send task is gone.
    #[error("outbound channel closed")]
    ChannelClosed,
}

/// Shared state of the realtime connection.
#[derive(Debug)]
#[cfg(feature = "client")]
pub struct State {
    /// Connection status, observable by consumers.
    status: watch::Sender<ConnectionStatus>,
    /// Feeds the send task of the live connection.
    outbound: RwLock<Option<UnboundedSender<String>>>,
    /// Requests waiting for an acknowledgement, mapped by request id.
    pending: Mutex<HashMap<RequestId, oneshot::Sender<AckResult>>>,
    next_request_id: AtomicU64,
}

#[cfg(feature = "client")]
impl State {
    /// Returns a new, disconnected state.
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            status,
            outbound: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Returns the current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Returns `true` while the connection is established.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Returns a receiver notified on every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    /// Installs the sender of a freshly opened connection.
    pub(crate) async fn attach_outbound(&self, tx: UnboundedSender<String>) {
        *self.outbound.write().await = Some(tx);
    }

    /// Drops the sender so the send task drains and finishes.
    pub(crate) async fn detach_outbound(&self) {
        self.outbound.write().await.take();
    }

    /// Queues a frame for the live connection.
    pub async fn send(&self, frame: String) -> Result<(), StateError> {
        if !self.is_connected() {
            return Err(StateError::NotConnected);
        }
        let outbound = self.outbound.read().await;
        let tx = outbound.as_ref().ok_or(StateError::NotConnected)?;
        tx.send(frame).map_err(|_| StateError::ChannelClosed)
    }

    /// Returns a new request id, unique for the lifetime of the state.
    pub fn new_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a request waiting for an acknowledgement.
    pub async fn add_pending(&self, id: RequestId, tx: oneshot::Sender<AckResult>) {
        self.pending.lock().await.insert(id, tx);
    }

    /// Forgets a pending request without resolving it.
    pub async fn remove_pending(&self, id: RequestId) {
        self.pending.lock().await.remove(&id);
    }

    /// Resolves a pending request, returning `false` if nobody was waiting.
    pub async fn resolve_pending(&self, id: RequestId, result: AckResult) -> bool {
        let Some(tx) = self.pending.lock().await.remove(&id) else {
            return false;
        };
        tx.send(result).is_ok()
    }

    /// Drops every pending request; their receivers observe a closed
    /// channel.
    pub async fn drop_pending(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}

#[cfg(feature = "client")]
impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
