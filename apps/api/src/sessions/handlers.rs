use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::get_document;
use crate::errors::AppError;
use crate::models::chat::{ChatLogEntry, Session, SessionSummary};
use crate::sessions::clusterer::{
    get_session_messages, group_into_sessions, ClusterError, NEW_SESSION_SENTINEL, SENTINEL_ANSWER,
};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: String,
}

/// Maps clusterer failures onto HTTP semantics. A stale or fabricated session
/// key must read as "conversation not found", never as a generic 500.
fn cluster_error(err: ClusterError) -> AppError {
    match err {
        ClusterError::NotFound(_) => AppError::NotFound("Conversation not found".to_string()),
        ClusterError::InvalidInput(msg) => AppError::Validation(msg),
    }
}

/// GET /api/v1/chat-sessions
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let entries = state.chat_store.fetch_by_user(&params.user_id).await?;
    let sessions = group_into_sessions(&entries, &state.cluster).map_err(cluster_error)?;
    Ok(Json(sessions.iter().map(Session::summary).collect()))
}

/// GET /api/v1/chat-sessions/:session_key/messages
pub async fn handle_get_session_messages(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Session>, AppError> {
    let entries = state.chat_store.fetch_by_user(&params.user_id).await?;
    let session =
        get_session_messages(&session_key, &entries, &state.cluster).map_err(cluster_error)?;
    Ok(Json(session))
}

#[derive(Deserialize)]
pub struct NewSessionRequest {
    pub user_id: String,
    pub doc_id: String,
}

#[derive(Serialize)]
pub struct NewSessionResponse {
    pub session_key: String,
}

/// POST /api/v1/chat-sessions
///
/// Appends a sentinel row carrying a fresh session id. The sentinel anchors
/// the session's identity and start time; it never shows up as a message.
pub async fn handle_new_session(
    State(state): State<AppState>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, AppError> {
    let doc = get_document(&state.db, &req.doc_id)
        .await?
        .filter(|d| d.user_id == req.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Document {} not found", req.doc_id)))?;

    let session_key = Uuid::new_v4().to_string();
    let sentinel = ChatLogEntry {
        id: Uuid::new_v4().to_string(),
        user_id: req.user_id,
        doc_id: doc.id,
        doc_name: doc.name,
        doc_type: doc.doc_type,
        question: NEW_SESSION_SENTINEL.to_string(),
        answer: SENTINEL_ANSWER.to_string(),
        chat_session_id: Some(session_key.clone()),
        created_at: Utc::now().to_rfc3339(),
    };
    state.chat_store.append(&sentinel).await?;

    Ok(Json(NewSessionResponse { session_key }))
}

#[derive(Deserialize)]
pub struct DeleteEntriesRequest {
    pub user_id: String,
    pub ids: Vec<String>,
}

#[derive(Serialize)]
pub struct DeleteEntriesResponse {
    pub deleted: u64,
}

/// DELETE /api/v1/chat-log
pub async fn handle_delete_entries(
    State(state): State<AppState>,
    Json(req): Json<DeleteEntriesRequest>,
) -> Result<Json<DeleteEntriesResponse>, AppError> {
    if req.ids.is_empty() {
        return Err(AppError::Validation("ids must not be empty".to_string()));
    }
    let deleted = state
        .chat_store
        .delete_by_ids(&req.user_id, &req.ids)
        .await?;
    Ok(Json(DeleteEntriesResponse { deleted }))
}
