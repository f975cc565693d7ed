//! Status endpoint

use axum::{Json, extract::State as AxumState};
use serde::Serialize;

use crate::SharedState;
use crate::receiver::HandlerCounts;

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub version: String,
    pub started_at: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct WebhookStatus {
    pub path: String,
    pub secrets: usize,
    pub handlers: HandlerCounts,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub server: ServerStatus,
    pub webhook: WebhookStatus,
}

/// GET /status - server uptime and what the gate is listening for
pub async fn status(AxumState(state): AxumState<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        server: ServerStatus {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: state.started_at.to_rfc3339(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        },
        webhook: WebhookStatus {
            path: state.config.path.clone(),
            secrets: state.config.secrets().len(),
            handlers: state.receiver.handler_counts(),
        },
    })
}
