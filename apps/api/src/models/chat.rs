use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One immutable row of the chat log. Rows are append-only: written once per
/// user question (with the assistant answer) or once per explicit "new chat"
/// action, and never mutated afterwards.
///
/// `created_at` is kept as a raw string because legacy rows predate schema
/// enforcement and may carry malformed timestamps; the clusterer normalizes
/// them instead of failing. Rows written by this service are always RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatLogEntry {
    pub id: String,
    pub user_id: String,
    pub doc_id: String,
    pub doc_name: String,
    pub doc_type: String,
    pub question: String,
    pub answer: String,
    pub chat_session_id: Option<String>,
    pub created_at: String,
}

/// A reconstructed conversation. Derived on every read from the current set
/// of chat log rows; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_key: String,
    pub doc_id: String,
    pub doc_name: String,
    pub doc_type: String,
    /// Timestamp of the earliest row in the session (the sentinel row when
    /// one anchors it).
    pub created_at: String,
    pub message_count: usize,
    /// Question text of the chronologically latest message, or "New chat"
    /// for a session with no messages yet.
    pub last_message: String,
    /// Non-sentinel rows ascending by (created_at, id).
    pub messages: Vec<ChatLogEntry>,
}

/// The list-view shape: a `Session` without its transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_key: String,
    pub doc_id: String,
    pub doc_name: String,
    pub doc_type: String,
    pub created_at: String,
    pub message_count: usize,
    pub last_message: String,
}

impl Session {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_key: self.session_key.clone(),
            doc_id: self.doc_id.clone(),
            doc_name: self.doc_name.clone(),
            doc_type: self.doc_type.clone(),
            created_at: self.created_at.clone(),
            message_count: self.message_count,
            last_message: self.last_message.clone(),
        }
    }
}
