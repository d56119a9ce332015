use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::documents::{get_document, storage::put_document_snapshot};
use crate::errors::AppError;
use crate::models::document::{DocumentMeta, DocumentRow};
use crate::sessions::handlers::UserIdQuery;
use crate::state::AppState;

const ALLOWED_DOC_TYPES: [&str; 3] = ["pdf", "docx", "article"];

/// POST /api/v1/documents
///
/// Registers a document whose text was extracted upstream. Multipart fields:
/// `user_id`, `name`, `doc_type`, and `file` (UTF-8 text). No PDF/Word
/// parsing happens here.
pub async fn handle_upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DocumentMeta>, AppError> {
    let mut user_id: Option<String> = None;
    let mut name: Option<String> = None;
    let mut doc_type: Option<String> = None;
    let mut text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("user_id") => user_id = Some(read_text_field(field, "user_id").await?),
            Some("name") => name = Some(read_text_field(field, "name").await?),
            Some("doc_type") => doc_type = Some(read_text_field(field, "doc_type").await?),
            Some("file") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("unreadable file field: {e}")))?;
                text = Some(String::from_utf8(data.to_vec()).map_err(|_| {
                    AppError::Validation("file must be UTF-8 text".to_string())
                })?);
            }
            _ => {}
        }
    }

    let user_id = user_id.ok_or_else(|| missing("user_id"))?;
    let name = name.ok_or_else(|| missing("name"))?;
    let doc_type = doc_type.ok_or_else(|| missing("doc_type"))?;
    let text = text.ok_or_else(|| missing("file"))?;

    if !ALLOWED_DOC_TYPES.contains(&doc_type.as_str()) {
        return Err(AppError::Validation(format!(
            "doc_type must be one of {:?}",
            ALLOWED_DOC_TYPES
        )));
    }
    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "document text must not be empty".to_string(),
        ));
    }

    let doc = DocumentRow {
        id: Uuid::new_v4().to_string(),
        user_id,
        name,
        doc_type,
        text,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO documents (id, user_id, name, doc_type, text, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.user_id)
    .bind(&doc.name)
    .bind(&doc.doc_type)
    .bind(&doc.text)
    .bind(doc.created_at)
    .execute(&state.db)
    .await?;

    put_document_snapshot(&state.s3, &state.config.s3_bucket, &doc.user_id, &doc.id, &doc.text)
        .await
        .map_err(|e| AppError::S3(e.to_string()))?;

    Ok(Json(DocumentMeta {
        id: doc.id,
        user_id: doc.user_id,
        name: doc.name,
        doc_type: doc.doc_type,
        created_at: doc.created_at,
    }))
}

/// GET /api/v1/documents
pub async fn handle_list_documents(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<DocumentMeta>>, AppError> {
    let docs = sqlx::query_as::<_, DocumentMeta>(
        r#"
        SELECT id, user_id, name, doc_type, created_at
        FROM documents
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(&params.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(docs))
}

/// GET /api/v1/documents/:id
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<DocumentRow>, AppError> {
    let doc = get_document(&state.db, &id)
        .await?
        .filter(|d| d.user_id == params.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))?;
    Ok(Json(doc))
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("unreadable field '{name}': {e}")))
}

fn missing(name: &str) -> AppError {
    AppError::Validation(format!("missing multipart field '{name}'"))
}
