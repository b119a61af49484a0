//! # events
//!
//! [`PositionEvent`]: every lifecycle event the engine publishes.
//!
//! Events go out on a `tokio::sync::broadcast::Sender<String>` as
//! pre-serialized JSON, which keeps subscribers (the `/ws/monitor` socket, an
//! external notifier) free of `Clone` bounds on the payload.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::TradePosition;

/// Capacity of the broadcast ring.  Slow subscribers see `Lagged`.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionEvent {
    /// Entry accepted by at least one venue.
    EntrySubmitted { position: Box<TradePosition> },

    /// Fill price known; the monitor owns the position.
    EntryFilled { position: Box<TradePosition> },

    /// Entry refused by every enabled venue, position is ERROR.
    EntryFailed { position: Box<TradePosition>, reason: String },

    Target1Hit { position: Box<TradePosition> },

    Target2Hit { position: Box<TradePosition> },

    StoppedOut { position: Box<TradePosition> },

    /// Pre-trade gate refused the alert.
    RiskBlocked { alert_id: u64, reason: String },

    /// An action went through on some venues but not all.
    VenueDegraded {
        position_id: Uuid,
        action:      String,
        failures:    Vec<String>,
    },
}

impl PositionEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

// ─── EventBus ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<String>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Fire and forget.  No subscribers is not an error.
    pub fn publish(&self, event: &PositionEvent) {
        let _ = self.tx.send(event.to_json());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
