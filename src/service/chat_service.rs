//! # Chat service
//!
//! Emitters for one-to-one client chats. Sending a message is the only
//! acknowledged operation of the connection.

use crate::state::message::{FileId, MessageId, UserId};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[cfg(feature = "client")]
use crate::client::Client;
#[cfg(feature = "client")]
use serde_json::Value;
#[cfg(feature = "client")]
use std::sync::Arc;

/// Available chat methods.
#[derive(Debug, Display, EnumString)]
pub enum ChatMethod {
    #[strum(serialize = "getClientChat")]
    GetClientChat,
    #[strum(serialize = "newMessageToChat")]
    NewMessageToChat,
}

/// Client chat history request. Messages arrive as `clientChats`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GetClientChatRequest {
    pub client_id: UserId,
    /// Only return messages older than this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<MessageId>,
}

/// Message sent to a client chat.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewChatMessage {
    pub receiver_id: UserId,
    pub payload: String,
    pub replied_to_id: Option<MessageId>,
    #[serde(default)]
    pub file_ids: Vec<FileId>,
}

/// Chat service that maps chat operations to events on the connection.
#[cfg(feature = "client")]
pub struct ChatService {
    client: Arc<Client>,
}

#[cfg(feature = "client")]
impl ChatService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Asks for the chat history with a client.
    #[tracing::instrument(name = "Requesting client chat", skip_all, fields(client_id = client_id))]
    pub async fn emit_get_client_chat(&self, client_id: UserId, last_id: Option<MessageId>) -> bool {
        let request = GetClientChatRequest { client_id, last_id };
        self.client
            .emit(&ChatMethod::GetClientChat.to_string(), &request)
            .await
    }

    /// Sends a chat message and waits for the server acknowledgement.
    ///
    /// Resolves to `false` when disconnected, when the connection drops
    /// before the acknowledgement, or when the server reports a failure.
    #[tracing::instrument(name = "Sending chat message", skip_all, fields(receiver_id = message.receiver_id))]
    pub async fn send_message(&self, message: &NewChatMessage) -> bool {
        let Some(ack) = self
            .client
            .request(&ChatMethod::NewMessageToChat.to_string(), message)
            .await
        else {
            return false;
        };
        match ack.await {
            Ok(Ok(result)) => acknowledged(&result),
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "Chat message rejected");
                false
            }
            Err(_) => {
                tracing::warn!("Connection closed before acknowledgement");
                false
            }
        }
    }
}

/// Reads the success flag of an acknowledgement, either a bare boolean or
/// `{"success": bool}`.
#[cfg(feature = "client")]
fn acknowledged(result: &Value) -> bool {
    match result {
        Value::Bool(success) => *success,
        Value::Object(fields) => fields
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        _ => false,
    }
}
