//! Event handler registry: verifies deliveries and fans them out to handlers

use std::collections::HashMap;
use std::future::Future;

use axum::http::StatusCode;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{
    AggregateError, ERROR_PREFIX, GateError, HandlerError, ReceiveError, Result,
};
use crate::event::{EventName, WebhookEvent};
use crate::signature::verify_any;

/// Registration key that matches every event.
pub const WILDCARD: &str = "*";

pub type HandlerFuture = BoxFuture<'static, std::result::Result<(), HandlerError>>;
type EventHandlerFn = Box<dyn Fn(WebhookEvent) -> HandlerFuture + Send + Sync>;
type ErrorHandlerFn = Box<dyn Fn(AggregateError) -> HandlerFuture + Send + Sync>;

/// Registered handlers, keyed by `<event>` or `<event>.<action>`.
///
/// Built once before serving and read-only afterwards.
#[derive(Default)]
pub struct EventReceiver {
    handlers: HashMap<String, Vec<EventHandlerFn>>,
    any_handlers: Vec<EventHandlerFn>,
    error_handlers: Vec<ErrorHandlerFn>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HandlerCounts {
    pub keys: usize,
    pub handlers: usize,
    pub any_handlers: usize,
    pub error_handlers: usize,
}

impl EventReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `key`, e.g. `push` or `issues.opened`.
    pub fn on<F, Fut>(&mut self, key: &str, handler: F) -> Result<()>
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        validate_key(key)?;
        self.handlers
            .entry(key.to_string())
            .or_default()
            .push(Box::new(move |event| handler(event).boxed()));
        Ok(())
    }

    /// Registers `handler` for every event.
    pub fn on_any<F, Fut>(&mut self, handler: F)
    where
        F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.any_handlers
            .push(Box::new(move |event| handler(event).boxed()));
    }

    /// Registers an error-channel handler. Its own failures are logged, never raised.
    pub fn on_error<F, Fut>(&mut self, handler: F)
    where
        F: Fn(AggregateError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        self.error_handlers
            .push(Box::new(move |error| handler(error).boxed()));
    }

    pub fn handler_counts(&self) -> HandlerCounts {
        HandlerCounts {
            keys: self.handlers.len(),
            handlers: self.handlers.values().map(Vec::len).sum(),
            any_handlers: self.any_handlers.len(),
            error_handlers: self.error_handlers.len(),
        }
    }

    /// Runs every handler matching the event and waits for all of them.
    ///
    /// Failures are collected in registration order (event, then
    /// event.action, then wildcard handlers) and sent to the error channel
    /// before being returned.
    pub async fn receive(&self, event: WebhookEvent) -> std::result::Result<(), AggregateError> {
        let mut matching: Vec<&EventHandlerFn> = Vec::new();
        if let Some(handlers) = self.handlers.get(event.name.as_str()) {
            matching.extend(handlers);
        }
        if let Some(action) = event.action() {
            let key = format!("{}.{}", event.name, action);
            if let Some(handlers) = self.handlers.get(&key) {
                matching.extend(handlers);
            }
        }
        matching.extend(&self.any_handlers);

        debug!(
            event = %event.name,
            id = %event.id,
            handlers = matching.len(),
            "Dispatching event"
        );

        let results = join_all(matching.iter().map(|handler| handler(event.clone()))).await;
        let errors: Vec<HandlerError> = results.into_iter().filter_map(|r| r.err()).collect();

        match AggregateError::from_errors(errors) {
            None => Ok(()),
            Some(error) => {
                let error = error.with_event(event);
                self.report_error(&error).await;
                Err(error)
            }
        }
    }

    /// Hands `error` to every error handler. Never fails.
    pub async fn report_error(&self, error: &AggregateError) {
        let results = join_all(
            self.error_handlers
                .iter()
                .map(|handler| handler(error.clone())),
        )
        .await;

        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "Error handler failed");
            }
        }
    }

    /// Checks the signature against any of `secrets`, then dispatches.
    pub async fn verify_and_receive<S: AsRef<str>>(
        &self,
        secrets: &[S],
        event: WebhookEvent,
        raw_payload: &[u8],
        signature: &str,
    ) -> std::result::Result<(), ReceiveError> {
        if !verify_any(secrets, raw_payload, signature) {
            warn!(event = %event.name, id = %event.id, "Signature verification failed");
            let error = AggregateError::from(HandlerError::with_status(
                StatusCode::BAD_REQUEST,
                format!(
                    "{} signature does not match event payload and secret",
                    ERROR_PREFIX
                ),
            ))
            .with_event(event);
            self.report_error(&error).await;
            return Err(ReceiveError::Signature(error));
        }

        self.receive(event).await.map_err(ReceiveError::Handlers)
    }
}

fn validate_key(key: &str) -> Result<()> {
    match key {
        WILDCARD => {
            return Err(GateError::InvalidRegistration(
                "use on_any() to listen to all events".to_string(),
            ));
        }
        "error" => {
            return Err(GateError::InvalidRegistration(
                "use on_error() to listen to errors".to_string(),
            ));
        }
        _ => {}
    }

    let name = match key.split_once('.') {
        Some((name, action)) => {
            if action.is_empty() {
                return Err(GateError::InvalidRegistration(format!(
                    "empty action in \"{}\"",
                    key
                )));
            }
            name
        }
        None => key,
    };
    name.parse::<EventName>().map(|_| ())
}
