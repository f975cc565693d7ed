use std::fmt;
use std::io;

use axum::http::StatusCode;

use crate::event::WebhookEvent;

/// Prefix carried by every error message the gate renders to a client.
pub const ERROR_PREFIX: &str = "[webhook-gate]";

/// Custom error type for webhook_gate setup and configuration
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown webhook event name: {0}")]
    UnknownEvent(String),

    #[error("Invalid handler registration: {0}")]
    InvalidRegistration(String),

    #[error("Logging setup failed: {0}")]
    LoggingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Helper type for Results that use GateError
pub type Result<T> = std::result::Result<T, GateError>;

/// A single failure raised while verifying or handling a delivery.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub status: Option<StatusCode>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// Non-empty, ordered collection of failures for one delivery.
///
/// Only the first entry decides the response status; the rendered body lists
/// every entry, one per line.
#[derive(Debug, Clone)]
pub struct AggregateError {
    first: HandlerError,
    rest: Vec<HandlerError>,
    event: Option<WebhookEvent>,
}

impl AggregateError {
    pub fn new(first: HandlerError, rest: Vec<HandlerError>) -> Self {
        Self {
            first,
            rest,
            event: None,
        }
    }

    /// Returns `None` for an empty list.
    pub fn from_errors(errors: Vec<HandlerError>) -> Option<Self> {
        let mut iter = errors.into_iter();
        let first = iter.next()?;
        Some(Self::new(first, iter.collect()))
    }

    pub fn with_event(mut self, event: WebhookEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn first(&self) -> &HandlerError {
        &self.first
    }

    pub fn errors(&self) -> impl Iterator<Item = &HandlerError> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The delivery this error belongs to, when it got far enough to have one.
    pub fn event(&self) -> Option<&WebhookEvent> {
        self.event.as_ref()
    }

    /// Status of the first entry, or 500 when it carries none.
    pub fn status(&self) -> StatusCode {
        self.first().status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<HandlerError> for AggregateError {
    fn from(error: HandlerError) -> Self {
        Self::new(error, Vec::new())
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.errors().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Why `verify_and_receive` did not complete cleanly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReceiveError {
    #[error("{0}")]
    Signature(AggregateError),

    #[error("{0}")]
    Handlers(AggregateError),
}

impl ReceiveError {
    pub fn into_aggregate(self) -> AggregateError {
        match self {
            ReceiveError::Signature(e) | ReceiveError::Handlers(e) => e,
        }
    }
}
