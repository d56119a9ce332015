pub mod handlers;
pub mod storage;

use anyhow::Result;
use sqlx::PgPool;

use crate::models::document::DocumentRow;

/// Looks up one document by id. Callers apply their own ownership filter.
pub async fn get_document(pool: &PgPool, doc_id: &str) -> Result<Option<DocumentRow>> {
    Ok(
        sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
            .bind(doc_id)
            .fetch_optional(pool)
            .await?,
    )
}
