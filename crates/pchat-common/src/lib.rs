//! Shared wire types for pchat
//!
//! Everything here crosses the HTTP boundary between `pchat-server` and
//! `pchat-client`. Timestamps are server-clock milliseconds since the epoch.

use serde::{Deserialize, Serialize};

pub type ConversationId = String;
pub type UserId = String;
pub type Timestamp = i64;

/// Current wall clock in the same unit the server assigns to messages.
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Im,
    Room,
}

/// Body of a message. Text and media are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    /// Reference to media stored elsewhere (upload storage is not ours)
    Media(String),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(s) | Payload::Media(s) => s.trim().is_empty(),
        }
    }
}

/// The part of a user's profile that may be shown to other users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub user_id: UserId,
    pub username: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub timestamp: Timestamp,
    pub payload: Payload,
    pub user: PublicProfile,
}

impl Message {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(&self.conversation_id, self.timestamp, &self.user_id)
    }
}

/// Identity of a displayed message: `(conversation, timestamp, author)`.
///
/// For a pending echo the timestamp is provisional until the server
/// acknowledges the post.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub conversation_id: ConversationId,
    pub timestamp: Timestamp,
    pub author_id: UserId,
}

impl MessageKey {
    pub fn new(conversation_id: &str, timestamp: Timestamp, author_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            timestamp,
            author_id: author_id.to_string(),
        }
    }

    pub fn with_timestamp(&self, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// One entry of the directory summary call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub title: String,
    pub partner_id: Option<UserId>,
    #[serde(default)]
    pub checkpoint: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRoom {
    pub conversation_id: ConversationId,
    pub title: String,
    pub participant_count: usize,
}

// --- Request bodies ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartImRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub room_name: String,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRequest {
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRequest {
    pub conversation_id: ConversationId,
    pub checkpoint: Timestamp,
}

// --- Response bodies ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRef {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub status: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimestampResponse {
    pub timestamp: Timestamp,
}

/// Answer of the presence lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSeen {
    pub user_id: UserId,
    pub name: String,
    pub last_seen: Timestamp,
}
