//! # engine::lifecycle
//!
//! **Position State Machine**: every transition a [`TradePosition`] goes
//! through, and the orders each one sends.
//!
//! ```text
//!  PENDING ──submit_entry──▶ ENTRY_SUBMITTED ──on_entry_filled──▶ ENTRY_FILLED
//!     │                                                              │
//!     └─ all venues fail ─▶ ERROR          price ≥ T1 ─▶ TARGET1_HIT (HALF, stop → BE)
//!                                                              │
//!                               price ≥ T2 ─▶ TARGET2_HIT (CLOSED)
//!                               price ≤ stop ─▶ STOPPED_OUT (CLOSED)
//! ```
//!
//! ## Rules
//! - Target 1 sells `max(1, full / 2)` and moves the stop to the entry fill.
//! - A failed exit leaves the position exactly as it was; the price
//!   condition still holds next tick, so the monitor simply tries again.
//! - One P&L computation per exit, at the first venue-reported fill
//!   (paper before live), else the tick price that triggered it.
//!
//! The machine works on a `&mut TradePosition` the caller owns.  It never
//! touches the ledger; registration and removal belong to the executor and
//! the monitor.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{SizeMapping, MIN_CONTRACTS};
use crate::engine::router::{OrderAction, OrderConfirmation, OrderRouter, VenueFailure};
use crate::error::EngineError;
use crate::models::{order::join_ids, Alert, OrderSide, PositionStatus, TradePosition, TradeStatus};

// ─── Tick Outcome ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Target1,
    Target2,
    Stop,
}

impl Exit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exit::Target1 => "TARGET1",
            Exit::Target2 => "TARGET2",
            Exit::Stop    => "STOP",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Price inside the band, nothing to do.
    Hold,
    /// Not in a monitored status (not yet filled, or already terminal).
    Skipped,
    /// Evaluated a CLOSED position.  Logged; no orders sent.
    Ignored(EngineError),
    /// The exit went through.  `degraded` lists venues that refused it.
    Exited { exit: Exit, degraded: Vec<VenueFailure> },
    /// The exit failed everywhere; position unchanged.
    Failed { exit: Exit, error: EngineError },
}

impl TickOutcome {
    pub fn is_transition(&self) -> bool {
        matches!(self, TickOutcome::Exited { .. })
    }
}

// ─── PositionStateMachine ─────────────────────────────────────────────────────

pub struct PositionStateMachine {
    router:       Arc<OrderRouter>,
    size_mapping: SizeMapping,
    tick_value:   f64,
}

impl PositionStateMachine {
    pub fn new(router: Arc<OrderRouter>, size_mapping: SizeMapping, tick_value: f64) -> Self {
        Self { router, size_mapping, tick_value }
    }

    pub fn router(&self) -> &Arc<OrderRouter> {
        &self.router
    }

    /// Contracts for the alert's size letter.  Unknown letters fall back to
    /// the minimum size.
    pub fn resolve_quantity(&self, alert: &Alert) -> u32 {
        match self.size_mapping.resolve(&alert.size) {
            Ok(qty) => qty,
            Err(e) => {
                warn!(
                    alert_id = alert.alert_id,
                    error    = %e,
                    fallback = MIN_CONTRACTS,
                    "⚠️ Size letter not mapped — using minimum size"
                );
                MIN_CONTRACTS
            }
        }
    }

    pub fn create_from_alert(&self, alert: &Alert) -> TradePosition {
        let position = TradePosition::from_alert(alert, self.resolve_quantity(alert));
        info!(
            position_id = %position.id,
            alert_id    = alert.alert_id,
            quantity    = position.full_quantity,
            entry       = alert.price,
            stop        = alert.stop,
            t1          = alert.target1,
            t2          = alert.target2,
            risk_pts    = alert.risk_points(),
            "📝 Position created"
        );
        position
    }

    // ─── Entry ────────────────────────────────────────────────────────────────

    /// BUY `full_quantity` at market on every enabled venue.
    ///
    /// Any acceptance → ENTRY_SUBMITTED.  Rejection everywhere → terminal
    /// ERROR and the route error is returned.
    pub async fn submit_entry(
        &self,
        position: &mut TradePosition,
    ) -> Result<OrderConfirmation, EngineError> {
        expect_status(position, TradeStatus::Pending, "submit_entry")?;

        let action = OrderAction::Market { side: OrderSide::Buy, quantity: position.full_quantity };
        match self.router.dispatch(action).await {
            Ok(conf) => {
                let now = Utc::now();
                position.orders.entry       = conf.handles.clone();
                position.trade_status       = TradeStatus::EntrySubmitted;
                position.entry_submitted_at = Some(now);
                position.last_error         = degraded_note(&conf);
                position.touch();

                info!(
                    position_id = %position.id,
                    orders      = %join_ids(&conf.handles),
                    partial     = conf.is_partial(),
                    "📤 ENTRY SUBMITTED"
                );
                Ok(conf)
            }
            Err(e) => {
                position.trade_status = TradeStatus::Error;
                position.last_error   = Some(e.to_string());
                position.closed_at    = Some(Utc::now());
                position.touch();

                error!(position_id = %position.id, error = %e, "❌ ENTRY FAILED — position is ERROR");
                Err(e.into())
            }
        }
    }

    pub fn on_entry_filled(
        &self,
        position: &mut TradePosition,
        fill_price: f64,
    ) -> Result<(), EngineError> {
        expect_status(position, TradeStatus::EntrySubmitted, "on_entry_filled")?;

        position.entry_fill_price = Some(fill_price);
        position.entry_filled_at  = Some(Utc::now());
        position.trade_status     = TradeStatus::EntryFilled;
        position.touch();

        info!(
            position_id = %position.id,
            fill        = fill_price,
            quantity    = position.current_quantity,
            slippage    = fill_price - position.entry_price,
            "✅ ENTRY FILLED"
        );
        Ok(())
    }

    /// Resting SELL stop at `stop_price` for the open quantity.
    ///
    /// A failure here is not fatal: the monitor enforces the stop by price.
    pub async fn place_protective_stop(
        &self,
        position: &mut TradePosition,
    ) -> Result<OrderConfirmation, EngineError> {
        let action = OrderAction::Stop {
            side:       OrderSide::Sell,
            quantity:   position.current_quantity,
            stop_price: position.stop_price,
        };
        let conf = self.router.dispatch(action).await?;

        position.orders.stop = conf.handles.clone();
        position.touch();
        info!(
            position_id = %position.id,
            stop        = position.stop_price,
            orders      = %join_ids(&conf.handles),
            "🛡️ Protective stop placed"
        );
        Ok(conf)
    }

    // ─── Tick ─────────────────────────────────────────────────────────────────

    /// Checks the position against `price` and runs at most one exit.
    ///
    /// Priority: target 1 (FULL), then target 2 (HALF after target 1), then
    /// the current stop.
    pub async fn evaluate_tick(&self, position: &mut TradePosition, price: f64) -> TickOutcome {
        if position.position_status == PositionStatus::Closed {
            let violation = EngineError::Consistency {
                position_id: position.id,
                status:      position.trade_status,
                action:      "evaluate_tick",
            };
            warn!(error = %violation, "⚠️ Consistency violation — ignored");
            return TickOutcome::Ignored(violation);
        }
        if !position.is_monitorable() {
            return TickOutcome::Skipped;
        }

        let exit = if position.position_status == PositionStatus::Full
            && price >= position.target1_price
        {
            Exit::Target1
        } else if position.position_status == PositionStatus::Half
            && position.trade_status == TradeStatus::Target1Hit
            && price >= position.target2_price
        {
            Exit::Target2
        } else if price <= position.stop_price {
            Exit::Stop
        } else {
            debug!(
                position_id = %position.id,
                price,
                unrealized  = position.unrealized_pnl(price, self.tick_value),
                "Holding"
            );
            return TickOutcome::Hold;
        };

        let result = match exit {
            Exit::Target1 => self.handle_target1(position, price).await,
            Exit::Target2 => self.handle_target2(position, price).await,
            Exit::Stop    => self.handle_stop(position, price).await,
        };

        match result {
            Ok(conf) => TickOutcome::Exited { exit, degraded: conf.failures },
            Err(error) => {
                warn!(
                    position_id = %position.id,
                    exit        = exit.as_str(),
                    price,
                    error       = %error,
                    "🔁 Exit failed — will retry next tick"
                );
                TickOutcome::Failed { exit, error }
            }
        }
    }

    // ─── Exits ────────────────────────────────────────────────────────────────

    /// SELL half, book the P&L, move the stop to breakeven.
    pub async fn handle_target1(
        &self,
        position: &mut TradePosition,
        price: f64,
    ) -> Result<OrderConfirmation, EngineError> {
        let half = position.half_quantity().min(position.current_quantity);
        let conf = self.sell(half).await?;
        let fill = conf.fill_price().unwrap_or(price);
        let breakeven = position.entry_fill_price.unwrap_or(position.entry_price);
        let now = Utc::now();

        position.current_quantity  -= half;
        position.realized_pnl      += self.pnl(position, fill, half);
        position.target1_fill_price = Some(fill);
        position.target1_fill_time  = Some(now);
        position.orders.target1     = conf.handles.clone();
        position.position_status    = PositionStatus::Half;
        position.trade_status       = TradeStatus::Target1Hit;
        position.stop_price         = breakeven;
        position.last_error         = degraded_note(&conf);

        info!(
            position_id = %position.id,
            sold        = half,
            fill,
            remaining   = position.current_quantity,
            realized    = position.realized_pnl,
            "🎯 TARGET 1 HIT"
        );

        self.cancel_stops(position).await;

        if position.current_quantity == 0 {
            // single-contract trade: target 1 took everything
            position.position_status = PositionStatus::Closed;
            position.closed_at       = Some(now);
        } else if let Err(e) = self.place_protective_stop(position).await {
            warn!(
                position_id = %position.id,
                error       = %e,
                "⚠️ Breakeven stop not placed — monitor enforces it by price"
            );
        } else {
            info!(position_id = %position.id, stop = breakeven, "⚖️ Stop moved to breakeven");
        }

        position.touch();
        Ok(conf)
    }

    /// SELL the remainder at target 2.
    pub async fn handle_target2(
        &self,
        position: &mut TradePosition,
        price: f64,
    ) -> Result<OrderConfirmation, EngineError> {
        let qty  = position.current_quantity;
        let conf = self.sell(qty).await?;
        let fill = conf.fill_price().unwrap_or(price);

        position.realized_pnl      += self.pnl(position, fill, qty);
        position.target2_fill_price = Some(fill);
        position.target2_fill_time  = Some(Utc::now());
        position.orders.target2     = conf.handles.clone();
        position.trade_status       = TradeStatus::Target2Hit;
        self.close(position, &conf).await;

        info!(
            position_id = %position.id,
            sold        = qty,
            fill,
            realized    = position.realized_pnl,
            "🏁 TARGET 2 HIT — position closed"
        );
        Ok(conf)
    }

    /// SELL everything still on at the stop.
    pub async fn handle_stop(
        &self,
        position: &mut TradePosition,
        price: f64,
    ) -> Result<OrderConfirmation, EngineError> {
        let qty  = position.current_quantity;
        let conf = self.sell(qty).await?;
        let fill = conf.fill_price().unwrap_or(price);

        position.realized_pnl    += self.pnl(position, fill, qty);
        position.stop_fill_price  = Some(fill);
        position.stop_fill_time   = Some(Utc::now());
        position.orders.stop_exit = conf.handles.clone();
        position.trade_status     = TradeStatus::StoppedOut;
        self.close(position, &conf).await;

        info!(
            position_id = %position.id,
            sold        = qty,
            fill,
            stop        = position.stop_price,
            realized    = position.realized_pnl,
            "🛑 STOPPED OUT — position closed"
        );
        Ok(conf)
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    async fn sell(&self, quantity: u32) -> Result<OrderConfirmation, EngineError> {
        let action = OrderAction::Market { side: OrderSide::Sell, quantity };
        Ok(self.router.dispatch(action).await?)
    }

    fn pnl(&self, position: &TradePosition, fill: f64, quantity: u32) -> f64 {
        let entry = position.entry_fill_price.unwrap_or(position.entry_price);
        (fill - entry) * quantity as f64 * self.tick_value
    }

    async fn close(&self, position: &mut TradePosition, conf: &OrderConfirmation) {
        position.current_quantity = 0;
        position.position_status  = PositionStatus::Closed;
        position.closed_at        = Some(Utc::now());
        position.last_error       = degraded_note(conf);
        self.cancel_stops(position).await;
        position.touch();
    }

    async fn cancel_stops(&self, position: &mut TradePosition) {
        if position.orders.stop.is_empty() {
            return;
        }
        let stops = std::mem::take(&mut position.orders.stop);
        let cancelled = self.router.cancel(&stops).await;
        if cancelled < stops.len() {
            warn!(
                position_id = %position.id,
                orders      = %join_ids(&stops),
                cancelled,
                "⚠️ Not every resting stop confirmed cancelled"
            );
        }
    }
}

fn expect_status(
    position: &TradePosition,
    expected: TradeStatus,
    action: &'static str,
) -> Result<(), EngineError> {
    if position.trade_status == expected {
        Ok(())
    } else {
        Err(EngineError::Consistency {
            position_id: position.id,
            status:      position.trade_status,
            action,
        })
    }
}

fn degraded_note(conf: &OrderConfirmation) -> Option<String> {
    if conf.is_partial() {
        Some(
            conf.failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    } else {
        None
    }
}
