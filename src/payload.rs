//! Reading and parsing the delivery body

use axum::body::{Body, Bytes};
use axum::http::StatusCode;

use crate::error::{ERROR_PREFIX, HandlerError};

/// GitHub caps webhook payloads at 25 MB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// The body exactly as received, plus its parsed JSON.
///
/// Signatures are checked against `raw`; handlers see `json`.
#[derive(Debug, Clone)]
pub struct Payload {
    pub raw: Bytes,
    pub json: serde_json::Value,
}

/// Buffers the request body (up to `limit` bytes) and parses it as JSON.
pub async fn get_payload(body: Body, limit: usize) -> Result<Payload, HandlerError> {
    let raw = axum::body::to_bytes(body, limit).await.map_err(|e| {
        HandlerError::with_status(
            StatusCode::BAD_REQUEST,
            format!("{} Failed to read request body: {}", ERROR_PREFIX, e),
        )
    })?;

    let json = serde_json::from_slice(&raw).map_err(|_| {
        HandlerError::with_status(
            StatusCode::BAD_REQUEST,
            format!("{} Invalid JSON", ERROR_PREFIX),
        )
    })?;

    Ok(Payload { raw, json })
}
