//! # engine::router
//!
//! **Order Router**: fans one logical order action out to every enabled venue
//! at once and reconciles the answers.
//!
//! ```text
//!  dispatch(action)
//!     ├─ PAPER ── timeout(10s) ─┐
//!     └─ LIVE  ── timeout(10s) ─┴─▶ join_all ─▶ OrderConfirmation | RouteError
//! ```
//!
//! ## Partial-failure policy
//! - 2 venues, 1 succeeds → `Ok`, `is_partial() == true`, failure logged
//! - 1 venue, it fails    → `Err(AllVenuesFailed)`
//! - 0 venues             → `Err(NoVenuesEnabled)`
//!
//! Before a market order goes to more than one venue the router refreshes
//! the quote, so a simulated venue fills at the same market the live one sees.
//!
//! Each call dispatches exactly once.  Retries belong to the caller (the
//! monitor re-evaluates next tick) or inside a venue implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{order::join_ids, OrderHandle, OrderSide, VenueKind};
use crate::venues::{OrderVenue, VenueError};

// ─── OrderAction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderAction {
    Market { side: OrderSide, quantity: u32 },
    Stop   { side: OrderSide, quantity: u32, stop_price: f64 },
}

impl OrderAction {
    async fn send(&self, venue: &dyn OrderVenue) -> Result<OrderHandle, VenueError> {
        match *self {
            OrderAction::Market { side, quantity } => venue.place_market_order(side, quantity).await,
            OrderAction::Stop { side, quantity, stop_price } => {
                venue.place_stop_order(side, quantity, stop_price).await
            }
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderAction::Market { side, quantity } => write!(f, "MARKET {side} {quantity}"),
            OrderAction::Stop { side, quantity, stop_price } => {
                write!(f, "STOP {side} {quantity} @ {stop_price}")
            }
        }
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct VenueFailure {
    pub venue: VenueKind,
    pub error: VenueError,
}

impl std::fmt::Display for VenueFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.venue, self.error)
    }
}

fn summarize(failures: &[VenueFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Outcome of a dispatch where at least one venue accepted the action.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub action:   OrderAction,
    /// One handle per accepting venue, in venue registration order.
    pub handles:  Vec<OrderHandle>,
    pub failures: Vec<VenueFailure>,
}

impl OrderConfirmation {
    /// Some enabled venue failed while another accepted.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// First venue-reported fill price (paper before live).
    pub fn fill_price(&self) -> Option<f64> {
        self.handles.iter().find_map(|h| h.fill_price)
    }

    pub fn venues(&self) -> Vec<VenueKind> {
        self.handles.iter().map(|h| h.venue).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("no venues enabled")]
    NoVenuesEnabled,

    #[error("{action} failed on every venue: {}", summarize(.failures))]
    AllVenuesFailed { action: String, failures: Vec<VenueFailure> },
}

// ─── OrderRouter ──────────────────────────────────────────────────────────────

struct VenueSlot {
    venue:   Arc<dyn OrderVenue>,
    enabled: AtomicBool,
}

pub struct OrderRouter {
    slots:   Vec<VenueSlot>,
    timeout: Duration,
}

impl OrderRouter {
    pub fn new(timeout: Duration) -> Self {
        Self { slots: Vec::new(), timeout }
    }

    /// Registers a venue.  Register paper before live.
    pub fn with_venue(mut self, venue: Arc<dyn OrderVenue>, enabled: bool) -> Self {
        self.slots.push(VenueSlot { venue, enabled: AtomicBool::new(enabled) });
        self
    }

    fn active(&self) -> Vec<Arc<dyn OrderVenue>> {
        self.slots
            .iter()
            .filter(|s| s.enabled.load(Ordering::Acquire))
            .map(|s| Arc::clone(&s.venue))
            .collect()
    }

    /// Preferred venue for quotes and account data: live if enabled, else paper.
    fn preferred(&self) -> Vec<Arc<dyn OrderVenue>> {
        let mut active = self.active();
        active.sort_by_key(|v| match v.kind() {
            VenueKind::Live  => 0,
            VenueKind::Paper => 1,
        });
        active
    }

    pub fn enabled_venues(&self) -> Vec<VenueKind> {
        self.active().iter().map(|v| v.kind()).collect()
    }

    /// Toggles a registered venue.  Returns `false` if none of that kind exists.
    pub fn set_enabled(&self, kind: VenueKind, enabled: bool) -> bool {
        let mut found = false;
        for slot in self.slots.iter().filter(|s| s.venue.kind() == kind) {
            slot.enabled.store(enabled, Ordering::Release);
            found = true;
        }
        if found {
            info!(venue = %kind, enabled, "🔀 Venue toggled");
        }
        found
    }

    // ─── Dispatch ─────────────────────────────────────────────────────────────

    pub async fn dispatch(&self, action: OrderAction) -> Result<OrderConfirmation, RouteError> {
        let venues = self.active();
        if venues.is_empty() {
            warn!(%action, "❌ No venues enabled — order not sent");
            return Err(RouteError::NoVenuesEnabled);
        }

        let bound = self.timeout;
        // Simulated venues fill at their mark, so refresh it first.
        if matches!(action, OrderAction::Market { .. })
            && venues.len() > 1
            && tokio::time::timeout(bound, self.current_price()).await.is_err()
        {
            debug!(%action, "Quote refresh timed out before dispatch");
        }

        let results = join_all(venues.iter().map(|venue| {
            let venue = Arc::clone(venue);
            async move {
                let kind = venue.kind();
                let result = match tokio::time::timeout(bound, action.send(venue.as_ref())).await {
                    Ok(result) => result,
                    Err(_) => Err(VenueError::Timeout(bound)),
                };
                (kind, result)
            }
        }))
        .await;

        let mut handles  = Vec::new();
        let mut failures = Vec::new();
        for (venue, result) in results {
            match result {
                Ok(handle) => handles.push(handle),
                Err(error) => failures.push(VenueFailure { venue, error }),
            }
        }

        if handles.is_empty() {
            warn!(%action, failures = %summarize(&failures), "❌ Order failed on every venue");
            return Err(RouteError::AllVenuesFailed { action: action.to_string(), failures });
        }

        if !failures.is_empty() {
            warn!(
                %action,
                accepted = %join_ids(&handles),
                failures = %summarize(&failures),
                "⚠️ Partial venue failure — proceeding degraded"
            );
        } else {
            debug!(%action, orders = %join_ids(&handles), "Order accepted");
        }

        Ok(OrderConfirmation { action, handles, failures })
    }

    /// Cancels each handle on the venue that owns it.  Returns how many
    /// venues confirmed.
    pub async fn cancel(&self, handles: &[OrderHandle]) -> usize {
        let bound = self.timeout;
        let cancels = handles.iter().filter_map(|handle| {
            let slot = self.slots.iter().find(|s| s.venue.kind() == handle.venue)?;
            let venue = Arc::clone(&slot.venue);
            Some(async move {
                match tokio::time::timeout(bound, venue.cancel_order(handle)).await {
                    Ok(done) => done,
                    Err(_) => {
                        warn!(order = %handle.display_id(), "Cancel timed out");
                        false
                    }
                }
            })
        });

        join_all(cancels).await.into_iter().filter(|done| *done).count()
    }

    // ─── Market Data ──────────────────────────────────────────────────────────

    /// Live quote when the live venue is enabled and answering, else paper.
    ///
    /// The quote is handed to every lower-priority venue through
    /// [`OrderVenue::observe_price`], which keeps the paper mark on the live
    /// market.
    pub async fn current_price(&self) -> Option<f64> {
        let venues = self.preferred();
        for (i, venue) in venues.iter().enumerate() {
            if let Some(price) = venue.current_price().await {
                for follower in &venues[i + 1..] {
                    follower.observe_price(price).await;
                }
                return Some(price);
            }
        }
        None
    }

    pub async fn account_balance(&self) -> Option<f64> {
        for venue in self.preferred() {
            match venue.account_balance().await {
                Ok(balance) => return Some(balance),
                Err(e) => debug!(venue = %venue.kind(), error = %e, "Balance unavailable"),
            }
        }
        None
    }

    pub async fn is_market_open(&self) -> bool {
        match self.preferred().first() {
            Some(venue) => venue.is_market_open().await,
            None => false,
        }
    }
}
