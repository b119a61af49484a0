//! # routes::monitor
//!
//! Read-only views over the engine, plus the live event stream.
//!
//! | Method    | Path             | Description                              |
//! |-----------|------------------|------------------------------------------|
//! | GET (WS)  | `/ws/monitor`    | Lifecycle events as JSON text frames     |
//! | GET       | `/api/positions` | Active positions                         |
//! | GET       | `/api/pnl`       | Daily P&L and trade count                |
//! | GET       | `/api/health`    | Liveness, no auth                        |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// Upgrades and streams every [`crate::events::PositionEvent`].
pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.events.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── Snapshot on connect ───────────────────────────────────────────────────
    let snapshot = json!({
        "event":             "SNAPSHOT",
        "positions":         state.executor.active_positions().await,
        "daily_pnl":         state.executor.daily_pnl().await,
        "daily_trade_count": state.executor.daily_trade_count().await,
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST ─────────────────────────────────────────────────────────────────────

/// GET /api/positions
pub async fn get_positions(State(state): State<SharedState>) -> impl IntoResponse {
    let positions = state.executor.active_positions().await;
    Json(json!({
        "ok":        true,
        "count":     positions.len(),
        "positions": positions,
    }))
}

/// GET /api/pnl
pub async fn get_pnl(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":                true,
        "daily_pnl":         state.executor.daily_pnl().await,
        "daily_trade_count": state.executor.daily_trade_count().await,
    }))
}

/// GET /api/health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":             true,
        "uptime_secs":    (Utc::now() - state.started_at).num_seconds(),
        "monitoring":     state.executor.is_monitoring().await,
        "queue_capacity": state.alerts.capacity(),
    }))
}
