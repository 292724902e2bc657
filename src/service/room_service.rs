//! # Room service
//!
//! Emitters scoped to a mail room: joining it, reading its members and
//! posting to it. Every emitter is a guarded send that reports whether the
//! frame left, never an error.

use crate::state::message::{FileId, MailId, Reference, UserId};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[cfg(feature = "client")]
use crate::client::Client;
#[cfg(feature = "client")]
use std::sync::Arc;

/// Available room methods.
#[derive(Debug, Display, EnumString)]
pub enum RoomMethod {
    #[strum(serialize = "roomMessages")]
    RoomMessages,
    #[strum(serialize = "getRoomMembers")]
    GetRoomMembers,
    #[strum(serialize = "newMessageToRoom")]
    NewMessageToRoom,
}

/// Room addressed by mail domain and mail id.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RoomRequest {
    pub reference: Reference,
    pub mail_id: MailId,
}

/// Message posted to a mail room.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewRoomMessage {
    pub payload: String,
    pub reference: Reference,
    pub mail_id: MailId,
    /// Members mentioned by the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_ids: Option<Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<FileId>>,
}

/// Room service that maps room operations to events on the connection.
#[cfg(feature = "client")]
pub struct RoomService {
    client: Arc<Client>,
}

#[cfg(feature = "client")]
impl RoomService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Joins the room of a mail and asks for its messages.
    #[tracing::instrument(name = "Requesting room messages", skip_all, fields(reference = %reference, mail_id = mail_id))]
    pub async fn emit_room_messages(&self, reference: Reference, mail_id: MailId) -> bool {
        let request = RoomRequest { reference, mail_id };
        self.client
            .emit(&RoomMethod::RoomMessages.to_string(), &request)
            .await
    }

    /// Posts a message to a room.
    #[tracing::instrument(name = "Posting room message", skip_all, fields(reference = %message.reference, mail_id = message.mail_id))]
    pub async fn emit_new_message_to_room(&self, message: &NewRoomMessage) -> bool {
        self.client
            .emit(&RoomMethod::NewMessageToRoom.to_string(), message)
            .await
    }

    /// Asks for the members of a room; they arrive as `roomMembers`.
    #[tracing::instrument(name = "Requesting room members", skip_all, fields(reference = %reference, mail_id = mail_id))]
    pub async fn emit_get_room_members(&self, reference: Reference, mail_id: MailId) -> bool {
        let request = RoomRequest { reference, mail_id };
        self.client
            .emit(&RoomMethod::GetRoomMembers.to_string(), &request)
            .await
    }
}
