//! HTTP handlers

pub mod stats;
pub mod webhook;

pub use stats::status;
pub use webhook::{handle_webhook, webhook_middleware};
