//! # Mailroom realtime
//!
//! Realtime layer of the mailroom dashboard: the persistent connection to
//! the mail backend, the chat and room emitters, the fan-out of pushed
//! events to any number of listeners, toast decisions for inbound messages
//! and the polled notification badge.
//!
//! # Implementation notes
//!
//! * The connection is a websocket carrying [json-rpc](https://www.jsonrpc.org/specification)
//!   frames: the method is the event name, the params its payload.
//! * Sending while disconnected is a silent no-op; nothing in this crate
//!   treats a network failure as fatal.
//! * Unread counts come from polling only, pushed messages only drive
//!   toasts.
//! * Everything that needs the async runtime sits behind the `client`
//!   feature, enabled by default.

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod configuration;
#[cfg(feature = "client")]
pub mod telemetry;

pub mod service;
pub mod state;
