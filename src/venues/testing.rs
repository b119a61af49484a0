//! Scripted [`OrderVenue`] for engine tests: settable price, injectable
//! failures, panics and latency, and a log of every order it accepted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{OrderHandle, OrderSide, OrderType, VenueKind};
use crate::venues::{OrderVenue, VenueError};

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub side:       OrderSide,
    pub order_type: OrderType,
    pub quantity:   u32,
    pub stop_price: Option<f64>,
}

#[derive(Default)]
struct Script {
    price:      Option<f64>,
    /// Errors handed out to the next order calls, front first.
    failures:   VecDeque<VenueError>,
    fail_all:   Option<VenueError>,
    panic_next: bool,
    delay:      Option<Duration>,
    placed:     Vec<PlacedOrder>,
    cancelled:  Vec<String>,
    observed:   Vec<f64>,
    balance:    f64,
    market_open: bool,
}

pub struct ScriptedVenue {
    kind:   VenueKind,
    script: Mutex<Script>,
    next:   AtomicU64,
}

impl ScriptedVenue {
    pub fn new(kind: VenueKind, price: f64) -> Self {
        Self {
            kind,
            script: Mutex::new(Script {
                price:       Some(price),
                balance:     50_000.0,
                market_open: true,
                ..Script::default()
            }),
            next: AtomicU64::new(1),
        }
    }

    pub async fn set_price(&self, price: f64) {
        self.script.lock().await.price = Some(price);
    }

    pub async fn clear_price(&self) {
        self.script.lock().await.price = None;
    }

    /// The next order call fails with `err`.
    pub async fn fail_next(&self, err: VenueError) {
        self.script.lock().await.failures.push_back(err);
    }

    /// Every order call fails with `err` until [`Self::recover`].
    pub async fn fail_always(&self, err: VenueError) {
        self.script.lock().await.fail_all = Some(err);
    }

    pub async fn recover(&self) {
        let mut s = self.script.lock().await;
        s.fail_all = None;
        s.failures.clear();
    }

    /// The next order call panics instead of answering.
    pub async fn panic_next(&self) {
        self.script.lock().await.panic_next = true;
    }

    /// Order calls sleep this long before answering.
    pub async fn set_delay(&self, delay: Duration) {
        self.script.lock().await.delay = Some(delay);
    }

    pub async fn set_balance(&self, balance: f64) {
        self.script.lock().await.balance = balance;
    }

    pub async fn set_market_open(&self, open: bool) {
        self.script.lock().await.market_open = open;
    }

    pub async fn placed(&self) -> Vec<PlacedOrder> {
        self.script.lock().await.placed.clone()
    }

    pub async fn market_orders(&self, side: OrderSide) -> Vec<u32> {
        self.script
            .lock()
            .await
            .placed
            .iter()
            .filter(|o| o.order_type == OrderType::Market && o.side == side)
            .map(|o| o.quantity)
            .collect()
    }

    pub async fn cancelled(&self) -> Vec<String> {
        self.script.lock().await.cancelled.clone()
    }

    /// Quotes routed in from another venue.  The scripted price is unchanged.
    pub async fn observed(&self) -> Vec<f64> {
        self.script.lock().await.observed.clone()
    }

    async fn place(
        &self,
        side: OrderSide,
        order_type: OrderType,
        quantity: u32,
        stop_price: Option<f64>,
    ) -> Result<OrderHandle, VenueError> {
        let delay = self.script.lock().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.script.lock().await;
        if std::mem::take(&mut s.panic_next) {
            drop(s);
            panic!("scripted {} venue panicked on {side} {quantity}", self.kind);
        }
        if let Some(err) = s.failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = s.fail_all.clone() {
            return Err(err);
        }

        s.placed.push(PlacedOrder { side, order_type, quantity, stop_price });
        let fill_price = match order_type {
            OrderType::Market => s.price,
            OrderType::Stop   => None,
        };

        Ok(OrderHandle {
            venue: self.kind,
            order_id: self.next.fetch_add(1, Ordering::Relaxed).to_string(),
            side,
            quantity,
            order_type,
            stop_price,
            fill_price,
            submitted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl OrderVenue for ScriptedVenue {
    fn kind(&self) -> VenueKind {
        self.kind
    }

    async fn place_market_order(&self, side: OrderSide, quantity: u32) -> Result<OrderHandle, VenueError> {
        self.place(side, OrderType::Market, quantity, None).await
    }

    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        stop_price: f64,
    ) -> Result<OrderHandle, VenueError> {
        self.place(side, OrderType::Stop, quantity, Some(stop_price)).await
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> bool {
        self.script.lock().await.cancelled.push(handle.order_id.clone());
        true
    }

    async fn current_price(&self) -> Option<f64> {
        self.script.lock().await.price
    }

    async fn account_balance(&self) -> Result<f64, VenueError> {
        Ok(self.script.lock().await.balance)
    }

    async fn is_market_open(&self) -> bool {
        self.script.lock().await.market_open
    }

    async fn observe_price(&self, price: f64) {
        self.script.lock().await.observed.push(price);
    }
}
