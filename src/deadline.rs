//! One response per request, with a fallback once the deadline passes

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// GitHub drops the connection after 10 seconds; answer before that.
pub const RESPONSE_DEADLINE: Duration = Duration::from_secs(9);

pub const STILL_PROCESSING_BODY: &str = "still processing\n";

/// Write-once response sink shared between the deadline timer and the
/// processing task.
pub struct ResponseSlot {
    sender: Mutex<Option<oneshot::Sender<Response>>>,
}

impl ResponseSlot {
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Sends `response` if nothing has been sent yet.
    ///
    /// Returns `false` when the slot was already used or the receiving side
    /// is gone; the response is dropped in both cases.
    pub fn respond(&self, response: Response) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    fn is_used(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// One-shot timer that answers 202 if processing runs past the deadline.
///
/// The timer is a detached tokio task, so it never holds the runtime open.
/// Cancelling (or dropping) the guard aborts it.
pub struct DeadlineGuard {
    handle: JoinHandle<()>,
}

impl DeadlineGuard {
    pub fn arm(after: Duration, slot: Arc<ResponseSlot>) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if slot.respond(still_processing()) {
                debug!(?after, "Deadline reached, answered 202");
            }
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn still_processing() -> Response {
    (StatusCode::ACCEPTED, STILL_PROCESSING_BODY).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_accepts_only_first_response() {
        let (slot, rx) = ResponseSlot::channel();
        assert!(!slot.is_used());
        assert!(slot.respond(StatusCode::OK.into_response()));
        assert!(slot.is_used());
        assert!(!slot.respond(StatusCode::INTERNAL_SERVER_ERROR.into_response()));

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_respond_after_receiver_dropped() {
        let (slot, rx) = ResponseSlot::channel();
        drop(rx);
        assert!(!slot.respond(StatusCode::OK.into_response()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_once() {
        let (slot, rx) = ResponseSlot::channel();
        let _guard = DeadlineGuard::arm(RESPONSE_DEADLINE, slot.clone());

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        // Late completion must not write again.
        assert!(!slot.respond(StatusCode::OK.into_response()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_deadline_never_fires() {
        let (slot, mut rx) = ResponseSlot::channel();
        let guard = DeadlineGuard::arm(RESPONSE_DEADLINE, slot.clone());
        guard.cancel();

        tokio::time::sleep(RESPONSE_DEADLINE * 2).await;
        assert!(!slot.is_used());
        assert!(rx.try_recv().is_err());
    }
}
