use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Attachment, Message, NewMessage, ParticipantId};

// -- Messages --

/// JSON layout of a message stored at `messages/{channel_id}/{message_id}`.
/// The message id is the record's key and never appears in the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender: String,
    #[serde(default)]
    pub content: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(rename = "fileType", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl From<&NewMessage> for MessageRecord {
    fn from(msg: &NewMessage) -> Self {
        Self {
            sender: msg.sender.as_str().to_string(),
            content: msg.content.clone(),
            timestamp: msg.timestamp,
            file: msg.attachment.as_ref().map(|a| a.url.clone()),
            file_type: msg.attachment.as_ref().map(|a| a.kind.as_str().to_string()),
        }
    }
}

impl MessageRecord {
    /// Convert a stored record into a delivered message.
    ///
    /// Records written by older clients may carry a `fileType` outside the
    /// supported kinds; the text survives and only the attachment is dropped.
    pub fn into_message(self, id: String) -> Message {
        let attachment = match (self.file, self.file_type) {
            (Some(url), Some(kind)) => match kind.parse() {
                Ok(kind) => Some(Attachment { url, kind }),
                Err(e) => {
                    warn!("Dropping attachment on message '{}': {}", id, e);
                    None
                }
            },
            (Some(_), None) => {
                warn!("Dropping attachment without fileType on message '{}'", id);
                None
            }
            _ => None,
        };

        Message {
            id,
            sender: ParticipantId::new(self.sender),
            content: self.content,
            timestamp: self.timestamp,
            attachment,
        }
    }
}

// -- Store --

/// Response body of a push (POST) to the REST store.
#[derive(Debug, Deserialize)]
pub struct PushResponse {
    pub name: String,
}

/// Body of a `put` or `patch` server-sent event from the REST store.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEventBody {
    pub path: String,
    pub data: serde_json::Value,
}

// -- Uploads --

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub secure_url: Option<String>,
    pub error: Option<UploadErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct UploadErrorBody {
    pub message: String,
}
