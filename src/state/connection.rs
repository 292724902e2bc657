//! Connection state
//!
//! Lifecycle of the realtime connection and the reconnect decision taken
//! after each disconnect.

use strum::Display;

/// Status of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ConnectionStatus {
    #[default]
    #[strum(serialize = "disconnected")]
    Disconnected,
    #[strum(serialize = "connecting")]
    Connecting,
    #[strum(serialize = "connected")]
    Connected,
}

/// Why a connection ended.
///
/// Display names follow the reasons reported by socket clients so logs
/// read the same on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DisconnectReason {
    /// The server closed the connection on purpose.
    #[strum(serialize = "io server disconnect")]
    ServerDisconnect,
    /// The connection was closed locally.
    #[strum(serialize = "io client disconnect")]
    ClientDisconnect,
    /// The stream ended without a close handshake.
    #[strum(serialize = "transport close")]
    TransportClose,
    /// Reading from or writing to the stream failed.
    #[strum(serialize = "transport error")]
    TransportError,
}

/// What the connection manager does after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect right away, with a fresh attempt budget.
    Explicit,
    /// Leave it to the bounded automatic retry loop.
    Automatic,
    /// Stay disconnected.
    Never,
}

impl DisconnectReason {
    /// Returns the reconnect policy for this reason.
    ///
    /// A server-initiated close is never retried automatically, so the
    /// manager issues an explicit reconnect for it.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self {
            DisconnectReason::ServerDisconnect => ReconnectPolicy::Explicit,
            DisconnectReason::ClientDisconnect => ReconnectPolicy::Never,
            DisconnectReason::TransportClose | DisconnectReason::TransportError => {
                ReconnectPolicy::Automatic
            }
        }
    }
}
