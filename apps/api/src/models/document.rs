use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered document. The text arrives already extracted upstream; this
/// service never parses PDF/Word bytes itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// "pdf" | "docx" | "article"
    pub doc_type: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Listing shape: document metadata without the (potentially large) text.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentMeta {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub doc_type: String,
    pub created_at: DateTime<Utc>,
}
