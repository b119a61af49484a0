//! # routes::alerts
//!
//! | Method | Path          | Description                                   |
//! |--------|---------------|-----------------------------------------------|
//! | POST   | `/api/alerts` | Validate an alert and queue it for execution  |
//!
//! The handler only enqueues.  Risk checks and order routing happen on the
//! intake task, so the response is `202 Accepted`, not a trade result.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::info;

use crate::engine::IntakeError;
use crate::error::AppError;
use crate::models::Alert;
use crate::state::SharedState;

/// POST /api/alerts
pub async fn submit_alert(
    State(state): State<SharedState>,
    Json(alert): Json<Alert>,
) -> Result<impl IntoResponse, AppError> {
    if !alert.is_well_formed() {
        return Err(AppError::BadRequest(format!(
            "alert {} must satisfy target2 > target1 > price > stop",
            alert.alert_id
        )));
    }

    let alert_id = alert.alert_id;
    state.alerts.submit(alert).map_err(|e| match e {
        IntakeError::QueueFull => AppError::Unavailable("alert queue is full, retry later".into()),
        IntakeError::Closed    => AppError::Unavailable("alert intake is shut down".into()),
    })?;

    info!(alert_id, "📨 Alert queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok":       true,
            "alert_id": alert_id,
            "message":  "Alert queued for execution",
        })),
    ))
}
