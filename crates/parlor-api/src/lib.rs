//! REST surface: identity resolution, auth middleware, notification and
//! direct message history handlers.

pub mod auth;
pub mod history;
pub mod middleware;
pub mod notifications;

use axum::http::StatusCode;
use tracing::error;

pub(crate) type HandlerError = (StatusCode, &'static str);

pub(crate) fn internal(e: anyhow::Error) -> HandlerError {
    error!("Request failed: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}
