//! Message state
//!
//! Chat messages, room members and the identifiers that scope them.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

/// Identifier of a user (sender, receiver or room member).
pub type UserId = i64;
/// Identifier of a mail thread, internal or external.
pub type MailId = i64;
/// Identifier of an uploaded file attached to a message.
pub type FileId = i64;

/// Mail domain a room or message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display, EnumString)]
pub enum Reference {
    /// Internal mail.
    #[serde(rename = "internal")]
    #[strum(serialize = "internal")]
    Internal,
    /// External mail.
    #[serde(rename = "external")]
    #[strum(serialize = "external")]
    External,
}

/// Unique identifier of an inbound message.
///
/// The backend sends either strings or numbers; both are kept as text so
/// that `"42"` and `42` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "RawMessageId")]
pub struct MessageId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMessageId {
    Text(String),
    Number(i64),
}

impl From<RawMessageId> for MessageId {
    fn from(raw: RawMessageId) -> Self {
        match raw {
            RawMessageId::Text(text) => Self(text),
            RawMessageId::Number(number) => Self(number.to_string()),
        }
    }
}

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// File attached to a message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileRef {
    pub id: FileId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Message pushed by the server, either in a mail room or a client chat.
///
/// Immutable once received; `id` is the uniqueness key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundMessage {
    pub id: MessageId,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub sender_fullname: String,
    pub sender_id: Option<UserId>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    /// Absent for client chats, which are not tied to a mail thread.
    pub reference: Option<Reference>,
    pub mail_id: Option<MailId>,
}

/// Member of a mail room.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub id: UserId,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub online: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn message_id_accepts_numbers_and_strings() {
        let from_number: MessageId = serde_json::from_value(json!(42)).unwrap();
        let from_text: MessageId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(serde_json::to_value(&from_number).unwrap(), json!("42"));
    }

    #[test]
    fn inbound_message_tolerates_missing_optional_fields() {
        let message: InboundMessage = serde_json::from_value(json!({
            "id": "a",
            "payload": "hello",
            "sender_fullname": "Jane Doe",
            "sender_id": 3
        }))
        .unwrap();
        assert_eq!(message.id.as_str(), "a");
        assert!(message.files.is_empty());
        assert_eq!(message.reference, None);
        assert_eq!(message.mail_id, None);
    }

    #[test]
    fn reference_names() {
        assert_eq!(Reference::from_str("internal").unwrap(), Reference::Internal);
        assert_eq!(Reference::External.to_string(), "external");
        assert_eq!(
            serde_json::to_value(Reference::Internal).unwrap(),
            json!("internal")
        );
    }
}
