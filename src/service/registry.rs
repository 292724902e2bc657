//! # Event subscription registry
//!
//! Lets any number of consumers listen to the same server event without
//! clobbering each other. Every registration yields a [`Subscription`]
//! handle; the listener lives exactly as long as the handle.

use super::events::{ClientChats, EventKind, RoomMembers, RoomUser, ServerError, ServerEvent};
use crate::state::message::{InboundMessage, UserId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use uuid::Uuid;

/// Unique ID of a subscription.
pub type SubscriptionId = Uuid;

type Listener = Arc<dyn Fn(&ServerEvent) + Send + Sync>;
type ListenerMap = Mutex<HashMap<EventKind, Vec<(SubscriptionId, Listener)>>>;

/// Registry of event listeners, keyed by event kind.
#[derive(Default)]
pub struct EventRegistry {
    listeners: Arc<ListenerMap>,
}

/// Handle of a registered listener.
///
/// Dropping the handle, or calling [`Subscription::unsubscribe`], removes
/// exactly that listener.
#[must_use = "dropping a subscription removes its listener"]
pub struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    listeners: Weak<ListenerMap>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            kind,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Listens to room member lists.
    pub fn on_room_members<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RoomMembers) + Send + Sync + 'static,
    {
        self.on(EventKind::RoomMembers, move |event| {
            if let ServerEvent::RoomMembers(room) = event {
                callback(room)
            }
        })
    }

    /// Listens to users joining a room.
    pub fn on_user_joined<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RoomUser) + Send + Sync + 'static,
    {
        self.on(EventKind::UserJoined, move |event| {
            if let ServerEvent::UserJoined(user) = event {
                callback(user)
            }
        })
    }

    /// Listens to users leaving a room.
    pub fn on_user_left<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RoomUser) + Send + Sync + 'static,
    {
        self.on(EventKind::UserLeft, move |event| {
            if let ServerEvent::UserLeft(user) = event {
                callback(user)
            }
        })
    }

    /// Listens to client chat messages; batches arrive as one call.
    pub fn on_new_message_to_chat<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[InboundMessage]) + Send + Sync + 'static,
    {
        self.on(EventKind::NewMessageToChat, move |event| {
            if let ServerEvent::NewMessageToChat(messages) = event {
                callback(messages.as_slice())
            }
        })
    }

    /// Listens to room messages; batches arrive as one call.
    pub fn on_created_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[InboundMessage]) + Send + Sync + 'static,
    {
        self.on(EventKind::CreatedMessage, move |event| {
            if let ServerEvent::CreatedMessage(messages) = event {
                callback(messages.as_slice())
            }
        })
    }

    /// Listens to client chat histories.
    pub fn on_client_chats<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ClientChats) + Send + Sync + 'static,
    {
        self.on(EventKind::ClientChats, move |event| {
            if let ServerEvent::ClientChats(chats) = event {
                callback(chats)
            }
        })
    }

    /// Listens to the list of online users.
    pub fn on_online_users<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[UserId]) + Send + Sync + 'static,
    {
        self.on(EventKind::OnlineUsers, move |event| {
            if let ServerEvent::OnlineUsers(users) = event {
                callback(users.as_slice())
            }
        })
    }

    /// Listens to errors reported by the server.
    pub fn on_errors<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ServerError) + Send + Sync + 'static,
    {
        self.on(EventKind::Errors, move |event| {
            if let ServerEvent::Errors(error) = event {
                callback(error)
            }
        })
    }

    /// Delivers an event to every listener of its kind and returns how many
    /// were invoked.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe. No order is promised between listeners.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Returns the number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventRegistry")
            .field("kinds", &listeners.len())
            .field("listeners", &listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl Subscription {
    /// Returns the subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the event kind this subscription listens to.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Removes the listener.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = listeners.get_mut(&self.kind) {
            entries.retain(|(id, _)| *id != self.id);
            if entries.is_empty() {
                listeners.remove(&self.kind);
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
