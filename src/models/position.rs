//! # models::position
//!
//! [`TradePosition`]: the mutable aggregate for one alert's trade, from the
//! PENDING entry through partial exit to the final close.
//!
//! This module holds state and small derived queries only.  Every transition
//! is driven from `engine::lifecycle`; nothing here talks to a venue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Alert, OrderHandle};

// ─── TradeStatus ──────────────────────────────────────────────────────────────

/// Where the trade is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Created from an alert, nothing sent yet.
    Pending,
    /// Entry accepted by at least one venue.
    EntrySubmitted,
    /// Entry fill price known, the monitor owns the position from here.
    EntryFilled,
    /// Half exited at target 1, stop at breakeven.
    Target1Hit,
    Target2Hit,
    StoppedOut,
    Cancelled,
    /// Entry rejected by every enabled venue.
    Error,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Target2Hit
                | TradeStatus::StoppedOut
                | TradeStatus::Cancelled
                | TradeStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending        => "PENDING",
            TradeStatus::EntrySubmitted => "ENTRY_SUBMITTED",
            TradeStatus::EntryFilled    => "ENTRY_FILLED",
            TradeStatus::Target1Hit     => "TARGET1_HIT",
            TradeStatus::Target2Hit     => "TARGET2_HIT",
            TradeStatus::StoppedOut     => "STOPPED_OUT",
            TradeStatus::Cancelled      => "CANCELLED",
            TradeStatus::Error          => "ERROR",
        }
    }
}

// ─── PositionStatus ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// Full size on.
    Full,
    /// Half exited after target 1.
    Half,
    Closed,
}

// ─── VenueOrders ──────────────────────────────────────────────────────────────

/// Order handles per logical action.  Each list holds one handle per venue
/// that accepted the action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueOrders {
    pub entry:   Vec<OrderHandle>,
    pub stop:    Vec<OrderHandle>,
    pub target1: Vec<OrderHandle>,
    pub target2: Vec<OrderHandle>,
    /// Market exit sent when the stop level was crossed.
    pub stop_exit: Vec<OrderHandle>,
}

// ─── TradePosition ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePosition {
    pub id:        Uuid,
    pub alert_id:  u64,
    pub size_code: String,

    // ── Price ladder ──────────────────────────────────────────────────────────
    /// Alert entry price (the plan, not the fill).
    pub entry_price:   f64,
    /// Current protective level, moves to `entry_fill_price` after target 1.
    pub stop_price:    f64,
    pub target1_price: f64,
    pub target2_price: f64,

    // ── Quantity ──────────────────────────────────────────────────────────────
    pub full_quantity:    u32,
    pub current_quantity: u32,

    pub position_status: PositionStatus,
    pub trade_status:    TradeStatus,

    pub orders: VenueOrders,

    // ── Fills ─────────────────────────────────────────────────────────────────
    pub entry_fill_price:   Option<f64>,
    pub target1_fill_price: Option<f64>,
    pub target2_fill_price: Option<f64>,
    pub stop_fill_price:    Option<f64>,

    pub realized_pnl: f64,

    /// Most recent venue failure, kept for the snapshot / dashboard.
    pub last_error: Option<String>,

    // ── Transition timestamps ─────────────────────────────────────────────────
    pub created_at:         DateTime<Utc>,
    pub entry_submitted_at: Option<DateTime<Utc>>,
    pub entry_filled_at:    Option<DateTime<Utc>>,
    pub target1_fill_time:  Option<DateTime<Utc>>,
    pub target2_fill_time:  Option<DateTime<Utc>>,
    pub stop_fill_time:     Option<DateTime<Utc>>,
    pub closed_at:          Option<DateTime<Utc>>,
    pub updated_at:         DateTime<Utc>,
}

impl TradePosition {
    /// Fresh PENDING position for `alert`, sized at `quantity` contracts.
    pub fn from_alert(alert: &Alert, quantity: u32) -> Self {
        let now = Utc::now();
        Self {
            id:               Uuid::new_v4(),
            alert_id:         alert.alert_id,
            size_code:        alert.size.clone(),
            entry_price:      alert.price,
            stop_price:       alert.stop,
            target1_price:    alert.target1,
            target2_price:    alert.target2,
            full_quantity:    quantity,
            current_quantity: quantity,
            position_status:  PositionStatus::Full,
            trade_status:     TradeStatus::Pending,
            orders:           VenueOrders::default(),
            entry_fill_price:   None,
            target1_fill_price: None,
            target2_fill_price: None,
            stop_fill_price:    None,
            realized_pnl:       0.0,
            last_error:         None,
            created_at:         now,
            entry_submitted_at: None,
            entry_filled_at:    None,
            target1_fill_time:  None,
            target2_fill_time:  None,
            stop_fill_time:     None,
            closed_at:          None,
            updated_at:         now,
        }
    }

    /// Contracts sold at target 1: half, rounded down, never less than one.
    #[inline]
    pub fn half_quantity(&self) -> u32 {
        half_quantity(self.full_quantity)
    }

    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        self.trade_status.is_terminal() || self.position_status == PositionStatus::Closed
    }

    /// The monitor should evaluate this position against the price.
    pub fn is_monitorable(&self) -> bool {
        matches!(
            self.trade_status,
            TradeStatus::EntryFilled | TradeStatus::Target1Hit
        ) && self.current_quantity > 0
            && self.position_status != PositionStatus::Closed
    }

    /// Mark-to-market P&L of the open remainder.
    pub fn unrealized_pnl(&self, price: f64, tick_value: f64) -> f64 {
        match self.entry_fill_price {
            Some(fill) => (price - fill) * self.current_quantity as f64 * tick_value,
            None => 0.0,
        }
    }

    #[inline]
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// `max(1, floor(full / 2))`.
#[inline]
pub fn half_quantity(full_quantity: u32) -> u32 {
    (full_quantity / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_alert() -> Alert {
        Alert {
            alert_id:  7,
            source_id: "test".into(),
            price:     6326.0,
            stop:      6316.0,
            target1:   6333.0,
            target2:   6338.0,
            size:      "B".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_half_quantity_boundaries() {
        assert_eq!(half_quantity(1), 1);
        assert_eq!(half_quantity(2), 1);
        assert_eq!(half_quantity(3), 1);
        assert_eq!(half_quantity(4), 2);
        assert_eq!(half_quantity(5), 2);
    }

    #[test]
    fn test_from_alert_starts_pending_and_full() {
        let pos = TradePosition::from_alert(&make_alert(), 2);
        assert_eq!(pos.trade_status, TradeStatus::Pending);
        assert_eq!(pos.position_status, PositionStatus::Full);
        assert_eq!(pos.current_quantity, 2);
        assert_eq!(pos.stop_price, 6316.0);
        assert!(!pos.is_monitorable());
        assert!(!pos.is_terminal());
    }

    #[test]
    fn test_monitorable_only_after_fill() {
        let mut pos = TradePosition::from_alert(&make_alert(), 2);
        pos.trade_status = TradeStatus::EntrySubmitted;
        assert!(!pos.is_monitorable());

        pos.trade_status = TradeStatus::EntryFilled;
        assert!(pos.is_monitorable());

        pos.current_quantity = 0;
        assert!(!pos.is_monitorable());
    }

    #[test]
    fn test_unrealized_pnl_uses_fill() {
        let mut pos = TradePosition::from_alert(&make_alert(), 2);
        assert_eq!(pos.unrealized_pnl(6330.0, 1.25), 0.0);

        pos.entry_fill_price = Some(6326.0);
        assert_eq!(pos.unrealized_pnl(6330.0, 1.25), 4.0 * 2.0 * 1.25);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&TradeStatus::Target1Hit).unwrap();
        assert_eq!(json, "\"TARGET1_HIT\"");
    }
}
