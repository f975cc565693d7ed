//! The delivery gate: one inbound request in, exactly one response out

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::SharedState;
use crate::deadline::{DeadlineGuard, RESPONSE_DEADLINE, ResponseSlot};
use crate::error::{AggregateError, HandlerError, ReceiveError};
use crate::event::WebhookEvent;
use crate::headers::{DeliveryIdentity, missing_headers, missing_headers_error};
use crate::payload::get_payload;

/// What to do with requests that are not webhook deliveries.
pub enum Fallthrough {
    /// Embedded in a larger router: hand the request on.
    Delegate(Next),
    /// Standalone: answer 404.
    Terminate,
}

/// How one delivery ended. Each variant renders exactly one response.
#[derive(Debug)]
pub enum DispatchOutcome {
    NotAWebhook,
    MissingHeaders(HandlerError),
    InvalidHeaders(HandlerError),
    VerificationFailed(AggregateError),
    HandledOk,
    HandledWithError(AggregateError),
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        match self {
            DispatchOutcome::NotAWebhook => (StatusCode::NOT_FOUND, "Not found").into_response(),
            DispatchOutcome::MissingHeaders(e) | DispatchOutcome::InvalidHeaders(e) => {
                (e.status.unwrap_or(StatusCode::BAD_REQUEST), e.message).into_response()
            }
            DispatchOutcome::HandledOk => (StatusCode::OK, "ok\n").into_response(),
            // Status from the first error only; the body lists all of them.
            DispatchOutcome::VerificationFailed(e) | DispatchOutcome::HandledWithError(e) => {
                (e.status(), e.to_string()).into_response()
            }
        }
    }
}

/// GitHub only ever POSTs deliveries; the query string is ignored.
pub fn is_webhook(request: &Request, path: &str) -> bool {
    request.method() == Method::POST && request.uri().path() == path
}

/// Routes one request through recognition, header checks and
/// verify-and-dispatch, answering 202 if the work outlives the deadline.
pub async fn dispatch(state: SharedState, request: Request, fallthrough: Fallthrough) -> Response {
    if !is_webhook(&request, &state.config.path) {
        return match fallthrough {
            Fallthrough::Delegate(next) => next.run(request).await,
            Fallthrough::Terminate => {
                debug!("ignored: {} {}", request.method(), request.uri());
                DispatchOutcome::NotAWebhook.into_response()
            }
        };
    }

    let missing = missing_headers(request.headers());
    if !missing.is_empty() {
        let error = missing_headers_error(&missing);
        state.receiver.report_error(&error.clone().into()).await;
        return DispatchOutcome::MissingHeaders(error).into_response();
    }

    let extracted = DeliveryIdentity::from_headers(request.headers());
    let identity = match extracted {
        Ok(identity) => identity,
        Err(error) => {
            state.receiver.report_error(&error.clone().into()).await;
            return DispatchOutcome::InvalidHeaders(error).into_response();
        }
    };

    debug!(
        event = %identity.event,
        id = %identity.id,
        "{} event received (id: {})",
        identity.event,
        identity.id
    );

    let (slot, response) = ResponseSlot::channel();
    let deadline = DeadlineGuard::arm(RESPONSE_DEADLINE, slot.clone());
    let body = request.into_body();

    // Runs detached so the work finishes even after the deadline answered.
    tokio::spawn(async move {
        let id = identity.id.clone();
        let outcome = verify_and_dispatch(&state, identity, body).await;
        if !finish(&slot, deadline, outcome) {
            debug!(id = %id, "Response already sent, discarding outcome");
        }
    });

    match response.await {
        Ok(response) => response,
        Err(_) => {
            error!("Delivery task ended without a response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn verify_and_dispatch(
    state: &SharedState,
    identity: DeliveryIdentity,
    body: Body,
) -> DispatchOutcome {
    let payload = match get_payload(body, state.config.max_body_bytes).await {
        Ok(payload) => payload,
        Err(e) => return DispatchOutcome::VerificationFailed(e.into()),
    };

    let event = WebhookEvent::new(identity.id, identity.event, payload.json);
    match state
        .receiver
        .verify_and_receive(
            &state.config.secrets(),
            event,
            &payload.raw,
            &identity.signature,
        )
        .await
    {
        Ok(()) => DispatchOutcome::HandledOk,
        Err(ReceiveError::Signature(e)) => DispatchOutcome::VerificationFailed(e),
        Err(ReceiveError::Handlers(e)) => DispatchOutcome::HandledWithError(e),
    }
}

/// Stops the deadline timer and writes `outcome`, unless the timer already
/// answered. Returns whether `outcome` was the response sent.
fn finish(slot: &ResponseSlot, deadline: DeadlineGuard, outcome: DispatchOutcome) -> bool {
    deadline.cancel();
    slot.respond(outcome.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::to_bytes;

    async fn render(outcome: DispatchOutcome) -> (StatusCode, String) {
        let response = outcome.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_render_fixed_bodies() {
        assert_eq!(
            render(DispatchOutcome::NotAWebhook).await,
            (StatusCode::NOT_FOUND, "Not found".to_string())
        );
        assert_eq!(
            render(DispatchOutcome::HandledOk).await,
            (StatusCode::OK, "ok\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_render_missing_headers() {
        let error = missing_headers_error(&["x-github-event"]);
        assert_eq!(
            render(DispatchOutcome::MissingHeaders(error)).await,
            (
                StatusCode::BAD_REQUEST,
                "[webhook-gate] Required headers missing: x-github-event".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_render_uses_first_error_status_only() {
        let error = AggregateError::new(
            HandlerError::with_status(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable"),
            vec![HandlerError::new("also broken")],
        );
        assert_eq!(
            render(DispatchOutcome::HandledWithError(error)).await,
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable\nalso broken".to_string()
            )
        );

        let error = AggregateError::new(
            HandlerError::new("no status"),
            vec![HandlerError::with_status(StatusCode::UNPROCESSABLE_ENTITY, "ignored status")],
        );
        assert_eq!(
            render(DispatchOutcome::VerificationFailed(error)).await.0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_outcome_is_discarded_after_deadline() {
        let (slot, rx) = ResponseSlot::channel();
        let deadline = DeadlineGuard::arm(RESPONSE_DEADLINE, slot.clone());
        tokio::time::sleep(RESPONSE_DEADLINE + Duration::from_secs(1)).await;

        let late = AggregateError::from(HandlerError::with_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            "finished too late",
        ));
        assert!(!finish(&slot, deadline, DispatchOutcome::HandledWithError(late)));

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "still processing\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_before_deadline_is_written() {
        let (slot, rx) = ResponseSlot::channel();
        let deadline = DeadlineGuard::arm(RESPONSE_DEADLINE, slot.clone());

        assert!(finish(&slot, deadline, DispatchOutcome::HandledOk));
        assert_eq!(rx.await.unwrap().status(), StatusCode::OK);

        // The cancelled timer never writes a second response.
        tokio::time::sleep(RESPONSE_DEADLINE * 2).await;
        assert!(!slot.respond(StatusCode::INTERNAL_SERVER_ERROR.into_response()));
    }

    #[test]
    fn test_is_webhook() {
        let post = |uri: &str| {
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };
        assert!(is_webhook(&post("/api/github/webhooks"), "/api/github/webhooks"));
        assert!(is_webhook(&post("/api/github/webhooks?x=1"), "/api/github/webhooks"));
        assert!(!is_webhook(&post("/api/github/webhooks/"), "/api/github/webhooks"));
        assert!(!is_webhook(&post("/other"), "/api/github/webhooks"));

        let get = Request::builder()
            .method(Method::GET)
            .uri("/api/github/webhooks")
            .body(Body::empty())
            .unwrap();
        assert!(!is_webhook(&get, "/api/github/webhooks"));
    }
}
