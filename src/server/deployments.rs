//! Deployment history handler

use super::AppState;
use crate::core::PipelineReport;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub repository: Option<String>,
    pub limit: Option<usize>,
}

/// GET /deployments
/// Recent finished deployments, newest first
pub async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<PipelineReport>> {
    let reporter = state.scheduler.reporter();
    let reports = match query.repository.as_deref() {
        Some(repository) => reporter
            .recent(None)
            .await
            .into_iter()
            .filter(|r| r.repository == repository)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect(),
        None => reporter.recent(query.limit).await,
    };
    Json(reports)
}
