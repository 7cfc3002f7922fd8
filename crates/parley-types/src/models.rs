use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Participants --

/// Stable participant identifier handed out by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Directory entry stored under `student_list/{participant_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "imageUrl", default)]
    pub image_url: String,
}

// -- Attachments --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media kind: {0}")]
pub struct UnknownMediaKind(pub String);

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [Self::Image, Self::Audio, Self::Video, Self::Document];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Guess the kind from a file name's extension.
    ///
    /// Covers the formats the attachment picker offers: any common image,
    /// audio or video container, plus `.pdf`, `.doc`, `.docx` and `.zip`
    /// as documents.
    pub fn infer(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();

        let kind = match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "svg" | "heic" => Self::Image,
            "mp3" | "wav" | "ogg" | "m4a" | "aac" | "flac" => Self::Audio,
            "mp4" | "webm" | "mov" | "mkv" | "avi" => Self::Video,
            "pdf" | "doc" | "docx" | "zip" => Self::Document,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownMediaKind(s.to_string()))
    }
}

/// Reference to media already hosted by the upload service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub kind: MediaKind,
}

// -- Messages --

/// A message that has not been written yet. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: ParticipantId,
    pub content: String,
    /// Creation instant in milliseconds since the Unix epoch, set by the client.
    pub timestamp: i64,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    pub fn text(sender: ParticipantId, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender,
            content: content.into(),
            timestamp,
            attachment: None,
        }
    }

    /// True when there is neither visible text nor an attachment to send.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty() && self.attachment.is_none()
    }

    pub fn into_message(self, id: impl Into<String>) -> Message {
        Message {
            id: id.into(),
            sender: self.sender,
            content: self.content,
            timestamp: self.timestamp,
            attachment: self.attachment,
        }
    }
}

/// A message as delivered by the store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Store key; byte order of keys follows insertion order.
    pub id: String,
    pub sender: ParticipantId,
    pub content: String,
    pub timestamp: i64,
    pub attachment: Option<Attachment>,
}

impl Message {
    /// `None` if the timestamp is outside the range chrono can represent.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}
