use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::sessions::clusterer::ClusterConfig;
use crate::sessions::store::ChatLogStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// Append-only chat log behind a trait object so the storage backend can
    /// be swapped without touching the handlers or the clusterer.
    pub chat_store: Arc<dyn ChatLogStore>,
    /// Clustering knobs for session reconstruction (window from
    /// SESSION_WINDOW_SECS).
    pub cluster: ClusterConfig,
}
