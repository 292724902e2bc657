//! # Notification service
//!
//! Decides whether an inbound chat message surfaces a toast. Toasts are
//! suppressed while the user is inside the chat section; elsewhere a
//! message is shown unless its id is among the most recently shown ones.

use super::registry::{EventRegistry, Subscription};
use crate::state::{
    message::{InboundMessage, MailId, MessageId, Reference, UserId},
    route::CurrentRoute,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::mpsc::UnboundedSender;

/// Default chat section prefix.
pub const DEFAULT_CHAT_ROUTE: &str = "/chat";

/// User-visible notification for an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    /// Id of the message the toast was raised for.
    pub message_id: MessageId,
    /// Sender full name.
    pub title: String,
    /// Message text.
    pub body: String,
    /// Sender user id, when the server sends one.
    pub sender_id: Option<UserId>,
    /// Mail domain, absent for client chats.
    pub reference: Option<Reference>,
    /// Mail thread, absent for client chats.
    pub mail_id: Option<MailId>,
}

impl From<&InboundMessage> for Toast {
    fn from(message: &InboundMessage) -> Self {
        Self {
            message_id: message.id.clone(),
            title: message.sender_fullname.clone(),
            body: message.payload.clone(),
            sender_id: message.sender_id,
            reference: message.reference,
            mail_id: message.mail_id,
        }
    }
}

/// Whether toasts may currently be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMode {
    /// The user is inside the chat section.
    Suppressed,
    /// The user is elsewhere.
    Active,
}

/// Notification service owning the window of recently shown ids.
#[derive(Debug)]
pub struct NotificationService {
    route: CurrentRoute,
    chat_route: String,
    /// Capacity of `shown`, at least 1.
    window: usize,
    /// Most recently shown ids, oldest first.
    shown: Mutex<VecDeque<MessageId>>,
    toasts: UnboundedSender<Toast>,
}

impl NotificationService {
    /// Creates a new notification service.
    ///
    /// With a `window` of 1 only an immediate repeat of the last shown id is
    /// suppressed; a larger window remembers that many ids.
    pub fn new(
        route: CurrentRoute,
        chat_route: impl Into<String>,
        window: usize,
        toasts: UnboundedSender<Toast>,
    ) -> Self {
        let window = window.max(1);
        Self {
            route,
            chat_route: chat_route.into(),
            window,
            shown: Mutex::new(VecDeque::with_capacity(window)),
            toasts,
        }
    }

    /// Returns the current mode, derived from the route on every call.
    pub fn mode(&self) -> NotificationMode {
        if self.route.is_within(&self.chat_route) {
            NotificationMode::Suppressed
        } else {
            NotificationMode::Active
        }
    }

    /// Handles one inbound message, returning the toast if one was emitted.
    #[tracing::instrument(name = "Handling inbound message", skip_all, fields(message_id = %message.id))]
    pub fn handle(&self, message: &InboundMessage) -> Option<Toast> {
        if self.mode() == NotificationMode::Suppressed {
            tracing::debug!("Toast suppressed inside chat section");
            return None;
        }
        {
            let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
            if shown.contains(&message.id) {
                tracing::debug!("Toast already shown");
                return None;
            }
            shown.push_back(message.id.clone());
            while shown.len() > self.window {
                shown.pop_front();
            }
        }

        let toast = Toast::from(message);
        if self.toasts.send(toast.clone()).is_err() {
            tracing::debug!("Toast receiver dropped");
        }
        Some(toast)
    }

    /// Handles messages delivered together, in order.
    pub fn handle_batch(&self, messages: &[InboundMessage]) -> Vec<Toast> {
        messages
            .iter()
            .filter_map(|message| self.handle(message))
            .collect()
    }

    /// Returns the id of the last toast shown, if any.
    pub fn last_shown(&self) -> Option<MessageId> {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Listens to client chat and room messages. The service stops
    /// receiving them once the returned subscriptions are dropped.
    #[must_use = "dropping the subscriptions removes the listeners"]
    pub fn subscribe(self: &Arc<Self>, registry: &EventRegistry) -> Vec<Subscription> {
        let chat = self.clone();
        let room = self.clone();
        vec![
            registry.on_new_message_to_chat(move |messages| {
                chat.handle_batch(messages);
            }),
            registry.on_created_message(move |messages| {
                room.handle_batch(messages);
            }),
        ]
    }
}
