//! # routes::control
//!
//! Operator switches: the risk kill switch, per-venue enable, and the
//! auto-trading master switch.
//!
//! | Method | Path                         | Description                     |
//! |--------|------------------------------|---------------------------------|
//! | POST   | `/api/risk/kill`             | Trip the kill switch            |
//! | POST   | `/api/risk/rearm`            | Clear it, reset failure count   |
//! | GET    | `/api/risk/status`           | Gate state + limits             |
//! | GET    | `/api/venues`                | Enabled venues, paper account   |
//! | POST   | `/api/venues/:venue`         | `{ "enabled": bool }`           |
//! | POST   | `/api/auto-trading`          | `{ "enabled": bool }`           |

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::models::VenueKind;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct KillBody {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ToggleBody {
    pub enabled: bool,
}

// ─── Kill Switch ──────────────────────────────────────────────────────────────

/// POST /api/risk/kill, body is optional
pub async fn kill_switch_on(
    State(state): State<SharedState>,
    body: Option<Json<KillBody>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "Manual kill via API".to_string());
    state.risk.kill(&reason).await;

    Json(json!({ "ok": true, "killed": true, "reason": reason }))
}

/// POST /api/risk/rearm
pub async fn kill_switch_off(State(state): State<SharedState>) -> impl IntoResponse {
    state.risk.rearm().await;
    Json(json!({ "ok": true, "killed": false }))
}

/// GET /api/risk/status
pub async fn get_risk_status(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.risk.status().await;
    Json(json!({ "ok": true, "risk": status }))
}

// ─── Venues ───────────────────────────────────────────────────────────────────

/// GET /api/venues
pub async fn get_venues(State(state): State<SharedState>) -> impl IntoResponse {
    let router = state.executor.router();
    let paper_account = match &state.paper {
        Some(paper) => {
            let account = paper.account().await;
            Some(json!({
                "win_rate":      account.win_rate(),
                "account":       account,
                "net_quantity":  paper.net_quantity().await,
                "resting_stops": paper.resting_stop_count().await,
            }))
        }
        None => None,
    };

    Json(json!({
        "ok":            true,
        "enabled":       router.enabled_venues(),
        "price":         router.current_price().await,
        "market_open":   router.is_market_open().await,
        "paper_account": paper_account,
        "auto_trading":  state.executor.auto_trading(),
    }))
}

/// POST /api/venues/:venue, `paper` or `live`
pub async fn set_venue(
    State(state): State<SharedState>,
    Path(venue): Path<String>,
    Json(body): Json<ToggleBody>,
) -> Result<impl IntoResponse, AppError> {
    let kind = match venue.to_ascii_lowercase().as_str() {
        "paper" => VenueKind::Paper,
        "live"  => VenueKind::Live,
        other   => return Err(AppError::BadRequest(format!("unknown venue '{other}'"))),
    };

    let router = state.executor.router();
    if !router.set_enabled(kind, body.enabled) {
        return Err(AppError::NotFound(format!("venue {kind} is not registered")));
    }

    Ok(Json(json!({
        "ok":      true,
        "venue":   kind,
        "enabled": body.enabled,
        "active":  router.enabled_venues(),
    })))
}

/// POST /api/auto-trading
pub async fn set_auto_trading(
    State(state): State<SharedState>,
    Json(body): Json<ToggleBody>,
) -> impl IntoResponse {
    state.executor.set_auto_trading(body.enabled);
    Json(json!({ "ok": true, "auto_trading": body.enabled }))
}
