//! Chat log persistence — the append-only store behind session
//! reconstruction.
//!
//! `AppState` holds an `Arc<dyn ChatLogStore>`; the clusterer itself never
//! touches storage, it runs over whatever snapshot a handler fetched.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::models::chat::ChatLogEntry;

/// Append-only chat log. Rows are written once and never mutated; the only
/// destructive operation is user-initiated bulk deletion by id.
#[async_trait]
pub trait ChatLogStore: Send + Sync {
    /// All rows owned by one user, in no particular order.
    async fn fetch_by_user(&self, user_id: &str) -> Result<Vec<ChatLogEntry>>;

    /// All rows discussing one document, in no particular order.
    async fn fetch_by_document(&self, doc_id: &str) -> Result<Vec<ChatLogEntry>>;

    /// Inserts one row. Called once per answered question and once per
    /// explicit "new chat" action (the sentinel row).
    async fn append(&self, entry: &ChatLogEntry) -> Result<()>;

    /// Deletes the given rows, scoped to their owner. Sessions are derived on
    /// read, so no session fixup follows a delete. Returns the rows removed.
    async fn delete_by_ids(&self, user_id: &str, ids: &[String]) -> Result<u64>;
}

/// Postgres-backed store over the `chat_log` table.
pub struct PgChatLogStore {
    pool: PgPool,
}

impl PgChatLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatLogStore for PgChatLogStore {
    async fn fetch_by_user(&self, user_id: &str) -> Result<Vec<ChatLogEntry>> {
        Ok(
            sqlx::query_as::<_, ChatLogEntry>("SELECT * FROM chat_log WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn fetch_by_document(&self, doc_id: &str) -> Result<Vec<ChatLogEntry>> {
        Ok(
            sqlx::query_as::<_, ChatLogEntry>("SELECT * FROM chat_log WHERE doc_id = $1")
                .bind(doc_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn append(&self, entry: &ChatLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_log
                (id, user_id, doc_id, doc_name, doc_type, question, answer,
                 chat_session_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.doc_id)
        .bind(&entry.doc_name)
        .bind(&entry.doc_type)
        .bind(&entry.question)
        .bind(&entry.answer)
        .bind(&entry.chat_session_id)
        .bind(&entry.created_at)
        .execute(&self.pool)
        .await?;

        info!("Appended chat log entry {} for user {}", entry.id, entry.user_id);
        Ok(())
    }

    async fn delete_by_ids(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_log WHERE user_id = $1 AND id = ANY($2)")
            .bind(user_id)
            .bind(ids)
            .execute(&self.pool)
            .await?;

        info!(
            "Deleted {} chat log entries for user {}",
            result.rows_affected(),
            user_id
        );
        Ok(result.rows_affected())
    }
}
