//! # models::order
//!
//! Order-side vocabulary shared by venues, the router and positions:
//! [`OrderSide`], [`OrderType`], [`VenueKind`] and [`OrderHandle`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── OrderSide ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy  => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── OrderType ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Stop,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Stop   => "STOP",
        }
    }
}

// ─── VenueKind ────────────────────────────────────────────────────────────────

/// Where an order was sent.  Registration order in the router is
/// Paper → Live, which is also the order fill prices are read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VenueKind {
    Paper,
    Live,
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueKind::Paper => "PAPER",
            VenueKind::Live  => "LIVE",
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── OrderHandle ──────────────────────────────────────────────────────────────

/// A venue's acknowledgement of one order.
///
/// A logical action sent to two venues yields two handles; positions keep all
/// of them so cancels can be routed back to the venue that owns each order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub venue:        VenueKind,
    /// Venue-native order id (no prefix).
    pub order_id:     String,
    pub side:         OrderSide,
    pub quantity:     u32,
    pub order_type:   OrderType,
    /// Trigger price for stop orders.
    pub stop_price:   Option<f64>,
    /// Fill price reported by the venue, if the order filled on submission.
    pub fill_price:   Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

impl OrderHandle {
    /// Venue-prefixed id, e.g. `PAPER_1000` or `LIVE_8842`.
    pub fn display_id(&self) -> String {
        format!("{}_{}", self.venue.as_str(), self.order_id)
    }
}

/// Joins handle ids the way they are shown in logs: `PAPER_1000,LIVE_8842`.
pub fn join_ids(handles: &[OrderHandle]) -> String {
    handles
        .iter()
        .map(OrderHandle::display_id)
        .collect::<Vec<_>>()
        .join(",")
}
