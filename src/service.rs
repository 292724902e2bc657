//! Services built on top of the realtime connection.
//!
//! * [`events`] and [`registry`] describe and fan out what the server pushes.
//! * [`room_service`] and [`chat_service`] emit requests to the server.
//! * [`notification`] turns pushed messages into toasts.
//! * [`badge_service`] polls the unread counts behind the badge.

#[cfg(feature = "client")]
pub mod badge_service;
pub mod chat_service;
pub mod events;
#[cfg(feature = "client")]
pub mod notification;
pub mod registry;
pub mod room_service;
