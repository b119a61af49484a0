//! # venues
//!
//! [`OrderVenue`]: the capability every execution destination implements.
//!
//! ```text
//!   OrderRouter ──┬──▶ PaperVenue   (synthetic balance + slippage)
//!                 └──▶ LiveVenue    (HTTP broker bridge)
//! ```
//!
//! Venue failures are returned as [`VenueError`] values; the router turns them
//! into per-venue failure records.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{OrderHandle, OrderSide, VenueKind};

pub mod live;
pub mod paper;

#[cfg(test)]
pub(crate) mod testing;

pub use live::LiveVenue;
pub use paper::PaperVenue;

// ─── VenueError ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    /// Network / transport failure, or the venue returned garbage.
    #[error("venue unreachable: {0}")]
    Unreachable(String),

    #[error("insufficient margin: required {required:.2}, available {available:.2}")]
    InsufficientMargin { required: f64, available: f64 },

    #[error("market closed")]
    MarketClosed,

    /// The venue understood the order and refused it.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// No answer within the router's per-call bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(u32),
}

// ─── OrderVenue ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait OrderVenue: Send + Sync {
    fn kind(&self) -> VenueKind;

    async fn place_market_order(
        &self,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderHandle, VenueError>;

    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        stop_price: f64,
    ) -> Result<OrderHandle, VenueError>;

    /// `true` if the venue confirmed the cancel.
    async fn cancel_order(&self, handle: &OrderHandle) -> bool;

    /// Latest tradable price, `None` when the feed is unavailable.
    async fn current_price(&self) -> Option<f64>;

    async fn account_balance(&self) -> Result<f64, VenueError>;

    async fn is_market_open(&self) -> bool;

    /// Market quote taken from another venue's feed.  Venues that price
    /// their own fills ignore it.
    async fn observe_price(&self, _price: f64) {}
}
