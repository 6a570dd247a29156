//! Webhook HTTP server
//!
//! Accepts push notifications, verifies and normalizes them, then hands
//! matching repositories to the deployment scheduler without waiting for
//! the pipeline.

pub mod deployments;
pub mod error;
pub mod health;
pub mod webhook;

use crate::{core::WebhookConfig, execution::DeploymentScheduler, trigger::RepoDispatch};
use axum::{
    routing::{get, post},
    Router,
};
use error::ApiError;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiResult;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Webhook secret; `None` disables verification
    pub secret: Option<Arc<str>>,
    pub dispatch: RepoDispatch,
    pub scheduler: DeploymentScheduler,
}

impl AppState {
    pub fn new(secret: Option<&str>, dispatch: RepoDispatch, scheduler: DeploymentScheduler) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
            dispatch,
            scheduler,
        }
    }
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhook", post(webhook::receive))
        .route("/webhook/{provider}", post(webhook::receive_for))
        .route("/deployments", get(deployments::list_deployments))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

/// Bind `host:port` and serve until `shutdown` resolves
pub async fn serve<F>(config: &WebhookConfig, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Webhook server listening on {}", listener.local_addr()?);
    if state.secret.is_none() {
        info!("No webhook secret configured, signatures are not checked");
    }

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
