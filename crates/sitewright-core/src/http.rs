//! HTTP surface: `GET /health` and `POST /webhook`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::coordinator::{BuildCoordinator, TriggerSource};
use crate::webhook::{self, WebhookDecision, SIGNATURE_HEADER};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<BuildCoordinator>,
    secret: Arc<str>,
    branch_ref: Arc<str>,
}

impl AppState {
    pub fn new(coordinator: Arc<BuildCoordinator>, secret: &str, branch_ref: &str) -> Self {
        Self {
            coordinator,
            secret: secret.into(),
            branch_ref: branch_ref.into(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub last_commit: String,
}

/// Largest webhook payload accepted; GitHub caps push payloads at 25 MB.
pub const MAX_WEBHOOK_BODY: usize = 25 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(receive_webhook))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY))
        .with_state(state)
}

async fn health(State(app): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        last_commit: app.coordinator.state().last_commit(),
    })
}

async fn receive_webhook(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match webhook::evaluate(&app.secret, signature, &body, &app.branch_ref) {
        WebhookDecision::Unauthorized => {
            warn!("webhook signature verification failed");
            StatusCode::UNAUTHORIZED
        }
        WebhookDecision::Ignored => {
            info!("webhook received but branch doesn't match, skipping build");
            StatusCode::NO_CONTENT
        }
        WebhookDecision::Accepted => {
            info!("received webhook request, triggering build");
            app.coordinator.trigger(TriggerSource::Webhook);
            StatusCode::ACCEPTED
        }
    }
}
