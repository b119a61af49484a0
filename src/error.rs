//! # error
//!
//! Error types at the two boundaries that need them:
//!
//! - [`EngineError`]: what the position state machine reports upward.
//! - [`AppError`]: what the ops API returns.  Axum's `IntoResponse` impl
//!   turns it into a `{ "ok": false, "error": ... }` JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ValidationError;
use crate::engine::router::RouteError;
use crate::models::TradeStatus;

// ─── EngineError ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Every venue refused (or none enabled).  The position is unchanged
    /// unless the action was the entry.
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A transition was asked of a position that cannot take it.
    #[error("position {position_id} is {status:?}; {action} ignored")]
    Consistency {
        position_id: Uuid,
        status:      TradeStatus,
        action:      &'static str,
    },
}

// ─── AppError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Intake queue full or engine shutting down.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg)  => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg)    => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
