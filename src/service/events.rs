//! # Server events
//!
//! Catalogue of the events pushed by the server over the realtime
//! connection, and their typed payloads.

use crate::state::message::{InboundMessage, MailId, Member, Reference, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

/// Error type for decoding inbound events.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("invalid payload for event `{event}`: {source}")]
    InvalidPayload {
        event: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Events the server pushes to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum EventKind {
    #[strum(serialize = "roomMembers")]
    RoomMembers,
    #[strum(serialize = "userJoined")]
    UserJoined,
    #[strum(serialize = "userLeft")]
    UserLeft,
    #[strum(serialize = "newMessageToChat")]
    NewMessageToChat,
    #[strum(serialize = "createdMessage")]
    CreatedMessage,
    #[strum(serialize = "clientChats")]
    ClientChats,
    #[strum(serialize = "onlineUsers")]
    OnlineUsers,
    #[strum(serialize = "errors")]
    Errors,
}

/// Members of a mail room.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RoomMembers {
    pub reference: Option<Reference>,
    pub mail_id: Option<MailId>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// User entering or leaving a mail room.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoomUser {
    #[serde(alias = "id")]
    pub user_id: UserId,
    #[serde(default)]
    pub fullname: String,
    pub reference: Option<Reference>,
    pub mail_id: Option<MailId>,
}

/// History of a one-to-one chat with a client.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ClientChats {
    pub client_id: Option<UserId>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

/// Error reported by the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

/// Event received from the server, with its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    RoomMembers(RoomMembers),
    UserJoined(RoomUser),
    UserLeft(RoomUser),
    /// One or more client chat messages delivered together.
    NewMessageToChat(Vec<InboundMessage>),
    /// One or more room messages delivered together.
    CreatedMessage(Vec<InboundMessage>),
    ClientChats(ClientChats),
    OnlineUsers(Vec<UserId>),
    Errors(ServerError),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MembersPayload {
    Bare(Vec<Member>),
    Scoped(RoomMembers),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClientChatsPayload {
    Bare(Vec<InboundMessage>),
    Scoped(ClientChats),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Text(String),
    Detailed(ServerError),
}

impl ServerEvent {
    /// Decodes the payload of a named event.
    pub fn decode(kind: EventKind, params: Value) -> Result<Self, EventError> {
        let invalid = |source: serde_json::Error| EventError::InvalidPayload {
            event: kind,
            source,
        };
        let event = match kind {
            EventKind::RoomMembers => {
                match serde_json::from_value(params).map_err(invalid)? {
                    MembersPayload::Bare(members) => ServerEvent::RoomMembers(RoomMembers {
                        members,
                        ..Default::default()
                    }),
                    MembersPayload::Scoped(room) => ServerEvent::RoomMembers(room),
                }
            }
            EventKind::UserJoined => {
                ServerEvent::UserJoined(serde_json::from_value(params).map_err(invalid)?)
            }
            EventKind::UserLeft => {
                ServerEvent::UserLeft(serde_json::from_value(params).map_err(invalid)?)
            }
            EventKind::NewMessageToChat => {
                let messages: OneOrMany<InboundMessage> =
                    serde_json::from_value(params).map_err(invalid)?;
                ServerEvent::NewMessageToChat(messages.into())
            }
            EventKind::CreatedMessage => {
                let messages: OneOrMany<InboundMessage> =
                    serde_json::from_value(params).map_err(invalid)?;
                ServerEvent::CreatedMessage(messages.into())
            }
            EventKind::ClientChats => match serde_json::from_value(params).map_err(invalid)? {
                ClientChatsPayload::Bare(messages) => ServerEvent::ClientChats(ClientChats {
                    client_id: None,
                    messages,
                }),
                ClientChatsPayload::Scoped(chats) => ServerEvent::ClientChats(chats),
            },
            EventKind::OnlineUsers => {
                ServerEvent::OnlineUsers(serde_json::from_value(params).map_err(invalid)?)
            }
            EventKind::Errors => match serde_json::from_value(params).map_err(invalid)? {
                ErrorPayload::Text(message) => ServerEvent::Errors(ServerError {
                    message,
                    code: None,
                }),
                ErrorPayload::Detailed(error) => ServerEvent::Errors(error),
            },
        };
        Ok(event)
    }

    /// Decodes an event from its wire name.
    pub fn decode_named(name: &str, params: Value) -> Result<Self, EventError> {
        let kind: EventKind = name
            .parse()
            .map_err(|_| EventError::UnknownEvent(name.to_string()))?;
        Self::decode(kind, params)
    }

    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::RoomMembers(_) => EventKind::RoomMembers,
            ServerEvent::UserJoined(_) => EventKind::UserJoined,
            ServerEvent::UserLeft(_) => EventKind::UserLeft,
            ServerEvent::NewMessageToChat(_) => EventKind::NewMessageToChat,
            ServerEvent::CreatedMessage(_) => EventKind::CreatedMessage,
            ServerEvent::ClientChats(_) => EventKind::ClientChats,
            ServerEvent::OnlineUsers(_) => EventKind::OnlineUsers,
            ServerEvent::Errors(_) => EventKind::Errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn event_names_round_trip_through_kind() {
        for kind in EventKind::iter() {
            assert_eq!(kind.to_string().parse::<EventKind>().unwrap(), kind);
        }
        assert_eq!(EventKind::NewMessageToChat.to_string(), "newMessageToChat");
    }

    #[test]
    fn decodes_single_message_and_batches() {
        let single = ServerEvent::decode_named(
            "createdMessage",
            json!({ "id": 1, "payload": "hi", "reference": "internal", "mail_id": 9 }),
        )
        .unwrap();
        let ServerEvent::CreatedMessage(messages) = single else {
            panic!("unexpected event");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].reference, Some(Reference::Internal));

        let batch = ServerEvent::decode(
            EventKind::NewMessageToChat,
            json!([{ "id": "a" }, { "id": "b" }]),
        )
        .unwrap();
        assert_eq!(batch.kind(), EventKind::NewMessageToChat);
        let ServerEvent::NewMessageToChat(messages) = batch else {
            panic!("unexpected event");
        };
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn decodes_room_members_in_both_shapes() {
        let bare = ServerEvent::decode(
            EventKind::RoomMembers,
            json!([{ "id": 1, "fullname": "Jane Doe" }]),
        )
        .unwrap();
        let ServerEvent::RoomMembers(room) = bare else {
            panic!("unexpected event");
        };
        assert_eq!(room.members.len(), 1);
        assert_eq!(room.mail_id, None);

        let scoped = ServerEvent::decode(
            EventKind::RoomMembers,
            json!({ "reference": "external", "mail_id": 4, "members": [] }),
        )
        .unwrap();
        let ServerEvent::RoomMembers(room) = scoped else {
            panic!("unexpected event");
        };
        assert_eq!(room.reference, Some(Reference::External));
    }

    #[test]
    fn decodes_errors_from_text() {
        let event = ServerEvent::decode(EventKind::Errors, json!("forbidden")).unwrap();
        assert_eq!(
            event,
            ServerEvent::Errors(ServerError {
                message: "forbidden".into(),
                code: None
            })
        );
    }

    #[test]
    fn rejects_unknown_events_and_bad_payloads() {
        assert!(matches!(
            ServerEvent::decode_named("somethingElse", json!({})),
            Err(EventError::UnknownEvent(name)) if name == "somethingElse"
        ));
        assert!(matches!(
            ServerEvent::decode(EventKind::OnlineUsers, json!({ "users": "nope" })),
            Err(EventError::InvalidPayload { event: EventKind::OnlineUsers, .. })
        ));
    }
}
