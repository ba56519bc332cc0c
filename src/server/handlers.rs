//! HTTP handlers for the knowledge API.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::api::{
    guide, ConfirmQuery, DeleteResponse, HealthResponse, RecentQuery, RetrieveQuery,
    ShareResponse,
};
use super::error::ApiError;
use crate::config::DEFAULT_LIMIT;
use crate::store::{FeatureSummary, HealthReport, KnowledgeEntry, KnowledgeStore, NewEntry};

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The knowledge store.
    pub store: KnowledgeStore,
    /// Limit used by `/retrieve` when the request gives none.
    pub default_limit: usize,
}

impl AppState {
    /// Create new app state with the default retrieve limit.
    #[must_use]
    pub fn new(store: KnowledgeStore) -> Self {
        Self {
            store,
            default_limit: DEFAULT_LIMIT,
        }
    }

    /// Set the default retrieve limit (builder pattern).
    #[must_use]
    pub fn with_default_limit(mut self, default_limit: usize) -> Self {
        self.default_limit = default_limit;
        self
    }
}

/// GET / - Usage guide for agents.
pub async fn get_guide() -> Json<serde_json::Value> {
    Json(guide())
}

/// POST /share - Record a new knowledge entry.
pub async fn post_share(
    State(state): State<AppState>,
    payload: Result<Json<NewEntry>, JsonRejection>,
) -> Result<Json<ShareResponse>, ApiError> {
    let Json(entry) = payload?;
    entry.validate()?;
    let stored = state.store.insert(entry).await?;
    Ok(Json(stored.into()))
}

/// GET /retrieve - Entries matching optional filters, newest first.
pub async fn get_retrieve(
    State(state): State<AppState>,
    query: Result<Query<RetrieveQuery>, QueryRejection>,
) -> Result<Json<Vec<KnowledgeEntry>>, ApiError> {
    let Query(query) = query?;
    let limit = query.effective_limit(state.default_limit);
    let entries = state.store.query(&query.filter(), limit).await?;
    Ok(Json(entries))
}

/// GET /recent - Entries from the last N hours across all features.
pub async fn get_recent(
    State(state): State<AppState>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<Vec<KnowledgeEntry>>, ApiError> {
    let Query(query) = query?;
    let entries = state
        .store
        .query_recent(query.window(), query.effective_limit())
        .await?;
    tracing::debug!(
        hours = query.effective_hours(),
        count = entries.len(),
        "Served recent entries"
    );
    Ok(Json(entries))
}

/// GET /features - Every feature with its statistics.
pub async fn get_features(
    State(state): State<AppState>,
) -> Result<Json<Vec<FeatureSummary>>, ApiError> {
    Ok(Json(state.store.list_features().await?))
}

/// DELETE /delete/all - Clear the store. Requires `?confirm=true`.
pub async fn delete_all(
    State(state): State<AppState>,
    query: Result<Query<ConfirmQuery>, QueryRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Query(query) = query?;
    let deletion = state.store.delete_all(query.confirm).await?;
    Ok(Json(deletion.into()))
}

/// DELETE /delete/{id} - Remove a single entry.
pub async fn delete_entry(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Path(id) = id?;
    state.store.delete_by_id(id).await?;
    Ok(Json(DeleteResponse::entry(id)))
}

/// DELETE /delete/feature/{feature} - Remove a feature's entries. Requires `?confirm=true`.
pub async fn delete_feature(
    State(state): State<AppState>,
    feature: Result<Path<String>, PathRejection>,
    query: Result<Query<ConfirmQuery>, QueryRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Path(feature) = feature?;
    let Query(query) = query?;
    let deletion = state
        .store
        .delete_by_feature(&feature, query.confirm)
        .await?;
    Ok(Json(deletion.into()))
}

/// GET /health - Store statistics, or 503 when the store cannot be read.
pub async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.health().await {
        HealthReport::Healthy(stats) => {
            let path = state.store.path().map(|p| p.display().to_string());
            (StatusCode::OK, Json(HealthResponse::healthy(stats, path)))
        }
        HealthReport::Unhealthy { error } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::unhealthy(error)),
        ),
    }
}
