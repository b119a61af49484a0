//! # state
//!
//! Shared state handed to every Axum handler.  Everything in here is built
//! once in `main` and passed down; there are no globals.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::{AlertSender, TradeExecutor};
use crate::events::EventBus;
use crate::risk::RiskManager;
use crate::venues::PaperVenue;

#[derive(Clone)]
pub struct AppState {
    // ── Engine ────────────────────────────────────────────────────────────────
    pub executor: Arc<TradeExecutor>,
    /// Producer side of the bounded alert queue.
    pub alerts:   AlertSender,

    // ── Risk Management ───────────────────────────────────────────────────────
    /// Concrete gate, for the kill switch and status endpoints.
    pub risk: Arc<RiskManager>,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    pub events: EventBus,

    /// Present when the paper venue is registered; exposes its account.
    pub paper: Option<Arc<PaperVenue>>,

    /// `None` = dev mode, no `X-API-Key` required.
    pub api_key:    Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;
