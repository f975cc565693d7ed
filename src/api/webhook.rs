//! axum entry points for the delivery gate

use axum::{
    extract::{Request, State as AxumState},
    middleware::Next,
    response::Response,
};

use crate::SharedState;
use crate::gate::{Fallthrough, dispatch};

/// Middleware for `axum::middleware::from_fn_with_state`.
///
/// Deliveries are answered here; every other request continues down the
/// router.
pub async fn webhook_middleware(
    AxumState(state): AxumState<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    dispatch(state, request, Fallthrough::Delegate(next)).await
}

/// Standalone handler (e.g. as a router fallback): non-deliveries get 404.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    request: Request,
) -> Response {
    dispatch(state, request, Fallthrough::Terminate).await
}
