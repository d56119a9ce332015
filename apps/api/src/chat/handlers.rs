use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::prompts::{build_chat_prompt, DOC_CHAT_SYSTEM};
use crate::documents::get_document;
use crate::errors::AppError;
use crate::models::chat::ChatLogEntry;
use crate::llm_client::LlmError;
use crate::sessions::clusterer::{get_session_messages, ClusterError, NEW_SESSION_SENTINEL};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub doc_id: String,
    pub question: String,
    /// Absent for one-off questions outside an explicit session; such rows
    /// are grouped later by the time-proximity fallback.
    pub chat_session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub entry_id: String,
    pub answer: String,
}

/// POST /api/v1/chat
///
/// Answers one question about one document and appends the exchange to the
/// chat log. The session view is derived later; nothing session-shaped is
/// written here beyond the optional `chat_session_id` passthrough.
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("question must not be empty".to_string()));
    }
    if question == NEW_SESSION_SENTINEL {
        return Err(AppError::Validation(
            "question uses a reserved marker value".to_string(),
        ));
    }

    let doc = get_document(&state.db, &req.doc_id)
        .await?
        .filter(|d| d.user_id == req.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Document {} not found", req.doc_id)))?;

    // Prior transcript for the prompt. A session id that matches no anchor is
    // a stale link and surfaces as NotFound rather than silently answering
    // without context.
    let history = match &req.chat_session_id {
        Some(session_key) => {
            let entries = state.chat_store.fetch_by_document(&req.doc_id).await?;
            let session = get_session_messages(session_key, &entries, &state.cluster)
                .map_err(|err| match err {
                    ClusterError::NotFound(_) => {
                        AppError::NotFound("Conversation not found".to_string())
                    }
                    ClusterError::InvalidInput(msg) => AppError::Validation(msg),
                })?;
            session.messages
        }
        None => Vec::new(),
    };

    let prompt = build_chat_prompt(&doc.text, &history, question);
    let response = state
        .llm
        .call(&prompt, DOC_CHAT_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;
    let answer = response
        .text()
        .ok_or(LlmError::EmptyContent)
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let entry = ChatLogEntry {
        id: Uuid::new_v4().to_string(),
        user_id: req.user_id,
        doc_id: doc.id,
        doc_name: doc.name,
        doc_type: doc.doc_type,
        question: question.to_string(),
        answer: answer.clone(),
        chat_session_id: req.chat_session_id,
        created_at: Utc::now().to_rfc3339(),
    };
    state.chat_store.append(&entry).await?;

    Ok(Json(ChatResponse {
        entry_id: entry.id,
        answer,
    }))
}
