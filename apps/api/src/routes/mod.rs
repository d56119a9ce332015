pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::chat::handlers as chat_handlers;
use crate::documents::handlers as document_handlers;
use crate::sessions::handlers as session_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Documents
        .route(
            "/api/v1/documents",
            post(document_handlers::handle_upload_document)
                .get(document_handlers::handle_list_documents),
        )
        .route(
            "/api/v1/documents/:id",
            get(document_handlers::handle_get_document),
        )
        // Chat sessions (derived views over the chat log)
        .route(
            "/api/v1/chat-sessions",
            post(session_handlers::handle_new_session).get(session_handlers::handle_list_sessions),
        )
        .route(
            "/api/v1/chat-sessions/:session_key/messages",
            get(session_handlers::handle_get_session_messages),
        )
        // Chat
        .route("/api/v1/chat", post(chat_handlers::handle_chat))
        .route("/api/v1/chat-log", delete(session_handlers::handle_delete_entries))
        .with_state(state)
}
