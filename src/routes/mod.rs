//! Ops API over the in-process engine.  No UI; JSON in, JSON out.

pub mod alerts;
pub mod control;
pub mod monitor;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{require_api_key, HEALTH_PATH};
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Intake ────────────────────────────────────────────────────────────
        .route("/api/alerts",          post(alerts::submit_alert))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/ws/monitor",          get(monitor::ws_monitor))
        .route("/api/positions",       get(monitor::get_positions))
        .route("/api/pnl",             get(monitor::get_pnl))
        .route(HEALTH_PATH,            get(monitor::health))
        // ── Control ───────────────────────────────────────────────────────────
        .route("/api/risk/kill",       post(control::kill_switch_on))
        .route("/api/risk/rearm",      post(control::kill_switch_off))
        .route("/api/risk/status",     get(control::get_risk_status))
        .route("/api/venues",          get(control::get_venues))
        .route("/api/venues/:venue",   post(control::set_venue))
        .route("/api/auto-trading",    post(control::set_auto_trading))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
