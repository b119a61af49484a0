//! # venues::paper
//!
//! **Paper Venue**: simulated execution against a synthetic mark price.
//!
//! - Market orders fill immediately at the mark ± slippage (against us).
//! - The mark follows the live quote when one is routed in (see
//!   [`OrderVenue::observe_price`]), otherwise the random walk.
//! - Commission is charged per contract on every fill.
//! - The simulator tracks its own net long and average price, so every SELL
//!   realizes P&L into the paper account.
//! - Stop orders rest in a pending book until cancelled.  The price monitor is
//!   what actually closes positions, so resting paper stops never trigger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::PaperConfig;
use crate::models::{OrderHandle, OrderSide, OrderType, VenueKind};
use crate::venues::{OrderVenue, VenueError};

/// Share of the starting balance usable as margin.
const MARGIN_FRACTION: f64 = 0.8;

/// First paper order id.
const FIRST_ORDER_ID: u64 = 1000;

// ─── Account ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PaperAccount {
    pub starting_balance:   f64,
    pub current_balance:    f64,
    pub available_margin:   f64,
    /// Gross realized P&L, before commissions.
    pub realized_pnl:       f64,
    pub commission_paid:    f64,
    pub total_trades:       u32,
    pub winning_trades:     u32,
    pub losing_trades:      u32,
    pub largest_win:        f64,
    pub largest_loss:       f64,
    pub consecutive_wins:   u32,
    pub consecutive_losses: u32,
    pub peak_balance:       f64,
    pub max_drawdown:       f64,
}

impl PaperAccount {
    fn new(starting_balance: f64) -> Self {
        Self {
            starting_balance,
            current_balance:    starting_balance,
            available_margin:   starting_balance * MARGIN_FRACTION,
            realized_pnl:       0.0,
            commission_paid:    0.0,
            total_trades:       0,
            winning_trades:     0,
            losing_trades:      0,
            largest_win:        0.0,
            largest_loss:       0.0,
            consecutive_wins:   0,
            consecutive_losses: 0,
            peak_balance:       starting_balance,
            max_drawdown:       0.0,
        }
    }

    fn charge_commission(&mut self, commission: f64) {
        self.commission_paid += commission;
        self.current_balance -= commission;
    }

    /// Books one closing fill.  `trade_pnl` is net of the closing commission.
    fn record_trade(&mut self, gross: f64, trade_pnl: f64) {
        self.realized_pnl    += gross;
        self.current_balance += gross;
        self.total_trades    += 1;

        if trade_pnl > 0.0 {
            self.winning_trades    += 1;
            self.consecutive_wins  += 1;
            self.consecutive_losses = 0;
            self.largest_win        = self.largest_win.max(trade_pnl);
        } else {
            self.losing_trades     += 1;
            self.consecutive_losses += 1;
            self.consecutive_wins   = 0;
            self.largest_loss       = self.largest_loss.min(trade_pnl);
        }

        if self.current_balance > self.peak_balance {
            self.peak_balance = self.current_balance;
        }
        self.max_drawdown = self.max_drawdown.max(self.peak_balance - self.current_balance);
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        }
    }
}

// ─── Internal State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RestingStop {
    side:       OrderSide,
    quantity:   u32,
    stop_price: f64,
    placed_at:  DateTime<Utc>,
}

#[derive(Debug)]
struct PaperInner {
    account:       PaperAccount,
    mark_price:    f64,
    next_order_id: u64,
    net_quantity:  u32,
    avg_price:     f64,
    resting_stops: HashMap<String, RestingStop>,
}

impl PaperInner {
    fn next_id(&mut self) -> String {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id.to_string()
    }
}

// ─── PaperVenue ───────────────────────────────────────────────────────────────

pub struct PaperVenue {
    inner:  Mutex<PaperInner>,
    config: PaperConfig,
}

impl PaperVenue {
    pub fn new(config: PaperConfig) -> Self {
        Self {
            inner: Mutex::new(PaperInner {
                account:       PaperAccount::new(config.starting_balance),
                mark_price:    config.initial_price,
                next_order_id: FIRST_ORDER_ID,
                net_quantity:  0,
                avg_price:     0.0,
                resting_stops: HashMap::new(),
            }),
            config,
        }
    }


    pub async fn account(&self) -> PaperAccount {
        self.inner.lock().await.account.clone()
    }

    pub async fn net_quantity(&self) -> u32 {
        self.inner.lock().await.net_quantity
    }

    pub async fn resting_stop_count(&self) -> usize {
        self.inner.lock().await.resting_stops.len()
    }

    fn slippage(&self) -> f64 {
        if self.config.realistic_slippage {
            self.config.slippage_ticks as f64 * self.config.tick_size
        } else {
            0.0
        }
    }

    fn fill_price(&self, side: OrderSide, mark: f64) -> f64 {
        match side {
            OrderSide::Buy  => mark + self.slippage(),
            OrderSide::Sell => mark - self.slippage(),
        }
    }

    /// Random-walk the mark price until `shutdown` flips to `true`.
    pub fn spawn_price_simulation(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let floor   = self.config.initial_price * 0.95;
        let ceiling = self.config.initial_price * 1.05;
        let step    = self.config.tick_size * 8.0;

        tokio::spawn(async move {
            info!(floor, ceiling, "🎲 [PAPER] Price simulation started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
                }
                let change = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(-step..=step) + 0.05
                };
                let mut inner = self.inner.lock().await;
                inner.mark_price = (inner.mark_price + change).clamp(floor, ceiling);
            }
            info!("🎲 [PAPER] Price simulation stopped");
        })
    }
}

#[async_trait]
impl OrderVenue for PaperVenue {
    fn kind(&self) -> VenueKind {
        VenueKind::Paper
    }

    async fn place_market_order(
        &self,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderHandle, VenueError> {
        if quantity == 0 {
            return Err(VenueError::InvalidQuantity(quantity));
        }

        let mut inner = self.inner.lock().await;
        let fill_price = self.fill_price(side, inner.mark_price);
        let commission = quantity as f64 * self.config.commission_per_contract;
        let margin     = quantity as f64 * self.config.margin_requirement;

        match side {
            OrderSide::Buy => {
                if margin > inner.account.available_margin {
                    warn!(
                        required  = margin,
                        available = inner.account.available_margin,
                        "❌ [PAPER] Insufficient margin"
                    );
                    return Err(VenueError::InsufficientMargin {
                        required:  margin,
                        available: inner.account.available_margin,
                    });
                }
                let held = inner.net_quantity as f64;
                inner.avg_price = (inner.avg_price * held + fill_price * quantity as f64)
                    / (held + quantity as f64);
                inner.net_quantity += quantity;
                inner.account.available_margin -= margin;
                inner.account.charge_commission(commission);
            }
            OrderSide::Sell => {
                if quantity > inner.net_quantity {
                    return Err(VenueError::Rejected(format!(
                        "sell {quantity} exceeds open paper position {}",
                        inner.net_quantity
                    )));
                }
                let gross = (fill_price - inner.avg_price) * quantity as f64 * self.config.tick_value;
                inner.net_quantity -= quantity;
                if inner.net_quantity == 0 {
                    inner.avg_price = 0.0;
                }
                inner.account.available_margin += margin;
                inner.account.charge_commission(commission);
                inner.account.record_trade(gross, gross - commission);
            }
        }

        let order_id = inner.next_id();
        info!(
            order_id   = %order_id,
            side       = %side,
            quantity,
            fill_price,
            commission,
            balance    = inner.account.current_balance,
            "📝 [PAPER] Market order filled"
        );

        Ok(OrderHandle {
            venue:        VenueKind::Paper,
            order_id,
            side,
            quantity,
            order_type:   OrderType::Market,
            stop_price:   None,
            fill_price:   Some(fill_price),
            submitted_at: Utc::now(),
        })
    }

    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        stop_price: f64,
    ) -> Result<OrderHandle, VenueError> {
        if quantity == 0 {
            return Err(VenueError::InvalidQuantity(quantity));
        }

        let mut inner = self.inner.lock().await;
        let order_id  = inner.next_id();
        let placed_at = Utc::now();
        inner.resting_stops.insert(
            order_id.clone(),
            RestingStop { side, quantity, stop_price, placed_at },
        );

        info!(order_id = %order_id, side = %side, quantity, stop_price, "📝 [PAPER] Stop order resting");

        Ok(OrderHandle {
            venue:        VenueKind::Paper,
            order_id,
            side,
            quantity,
            order_type:   OrderType::Stop,
            stop_price:   Some(stop_price),
            fill_price:   None,
            submitted_at: placed_at,
        })
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.resting_stops.remove(&handle.order_id) {
            Some(stop) => {
                debug!(
                    order_id   = %handle.order_id,
                    side       = %stop.side,
                    quantity   = stop.quantity,
                    stop_price = stop.stop_price,
                    resting_since = %stop.placed_at,
                    "📝 [PAPER] Order cancelled"
                );
                true
            }
            None => {
                warn!(order_id = %handle.order_id, "Paper order not found for cancellation");
                false
            }
        }
    }

    async fn current_price(&self) -> Option<f64> {
        Some(self.inner.lock().await.mark_price)
    }

    /// Marks the simulator to the live market so paper fills track it.
    async fn observe_price(&self, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.inner.lock().await.mark_price = price;
        }
    }

    async fn account_balance(&self) -> Result<f64, VenueError> {
        Ok(self.inner.lock().await.account.current_balance)
    }

    /// The paper market never closes.
    async fn is_market_open(&self) -> bool {
        true
    }
}
