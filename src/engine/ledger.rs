//! # engine::ledger
//!
//! **Position Ledger**: in-memory registry of active positions.
//!
//! ```text
//!  intake ──insert──▶ ┌──────────────┐ ◀──snapshot── ops API
//!                     │ PositionLedger│
//!  monitor ─update───▶│  RwLock<Map>  │
//!  monitor ─remove───▶└──────────────┘ ──▶ DailyStats (closed P&L)
//! ```
//!
//! Ingestion only inserts.  Once a position is in, the monitor is the only
//! writer.  Locks are held for a map operation, never across a venue call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::TradePosition;

// ─── PositionLedger ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct PositionLedger {
    positions: Arc<RwLock<HashMap<Uuid, TradePosition>>>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, position: TradePosition) {
        self.positions.write().await.insert(position.id, position);
    }

    /// Read-only copy, oldest first.
    pub async fn snapshot(&self) -> Vec<TradePosition> {
        let mut all: Vec<_> = self.positions.read().await.values().cloned().collect();
        all.sort_by_key(|p| p.created_at);
        all
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.snapshot().await.into_iter().map(|p| p.id).collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<TradePosition> {
        self.positions.read().await.get(&id).cloned()
    }

    /// Writes `position` back.  Returns `false` if it was removed meanwhile.
    pub async fn update(&self, position: TradePosition) -> bool {
        let mut map = self.positions.write().await;
        match map.get_mut(&position.id) {
            Some(slot) => {
                *slot = position;
                true
            }
            None => false,
        }
    }

    /// Deregisters `id`.  Only the first call for a given id returns `Some`.
    pub async fn remove(&self, id: Uuid) -> Option<TradePosition> {
        self.positions.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.positions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.positions.read().await.is_empty()
    }

    /// Contracts still on across every active position.
    pub async fn open_quantity(&self) -> u32 {
        self.positions
            .read()
            .await
            .values()
            .map(|p| p.current_quantity)
            .sum()
    }

    /// Realized P&L already booked by positions that are still open
    /// (target 1 taken, remainder running).
    pub async fn open_realized_pnl(&self) -> f64 {
        self.positions
            .read()
            .await
            .values()
            .map(|p| p.realized_pnl)
            .sum()
    }
}

// ─── DailyStats ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct DailyInner {
    day:         NaiveDate,
    trade_count: u32,
    closed_pnl:  f64,
}

impl DailyInner {
    fn fresh() -> Self {
        Self { day: Utc::now().date_naive(), trade_count: 0, closed_pnl: 0.0 }
    }

    /// Zeroes the counters when the UTC date has moved on.
    fn roll(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.day {
            *self = Self { day: today, trade_count: 0, closed_pnl: 0.0 };
        }
    }
}

/// Per-UTC-day entry count and closed-position P&L.
#[derive(Clone)]
pub struct DailyStats {
    inner: Arc<RwLock<DailyInner>>,
}

impl Default for DailyStats {
    fn default() -> Self {
        Self { inner: Arc::new(RwLock::new(DailyInner::fresh())) }
    }
}

impl DailyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_entry(&self) -> u32 {
        let mut inner = self.inner.write().await;
        inner.roll();
        inner.trade_count += 1;
        inner.trade_count
    }

    /// Seeds today's counters, e.g. from stored snapshots after a restart.
    pub async fn restore(&self, trade_count: u32, closed_pnl: f64) {
        let mut inner = self.inner.write().await;
        inner.roll();
        inner.trade_count = trade_count;
        inner.closed_pnl  = closed_pnl;
    }

    pub async fn record_closed(&self, realized_pnl: f64) {
        let mut inner = self.inner.write().await;
        inner.roll();
        inner.closed_pnl += realized_pnl;
    }

    pub async fn trade_count(&self) -> u32 {
        let mut inner = self.inner.write().await;
        inner.roll();
        inner.trade_count
    }

    pub async fn closed_pnl(&self) -> f64 {
        let mut inner = self.inner.write().await;
        inner.roll();
        inner.closed_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Alert;

    fn make_position(qty: u32) -> TradePosition {
        let alert = Alert {
            alert_id:  1,
            source_id: "test".into(),
            price:     6326.0,
            stop:      6316.0,
            target1:   6333.0,
            target2:   6338.0,
            size:      "A".into(),
            timestamp: Utc::now(),
        };
        TradePosition::from_alert(&alert, qty)
    }

    #[tokio::test]
    async fn test_insert_update_remove_once() {
        let ledger = PositionLedger::new();
        let mut pos = make_position(3);
        let id = pos.id;
        ledger.insert(pos.clone()).await;
        assert_eq!(ledger.len().await, 1);
        assert_eq!(ledger.open_quantity().await, 3);

        pos.current_quantity = 2;
        pos.realized_pnl = 8.75;
        assert!(ledger.update(pos.clone()).await);
        assert_eq!(ledger.open_quantity().await, 2);
        assert_eq!(ledger.open_realized_pnl().await, 8.75);

        assert!(ledger.remove(id).await.is_some());
        assert!(ledger.remove(id).await.is_none());
        assert!(ledger.is_empty().await);

        // a removed position is not resurrected by a late write-back
        assert!(!ledger.update(pos).await);
        assert!(ledger.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let ledger = PositionLedger::new();
        let pos = make_position(2);
        ledger.insert(pos.clone()).await;

        let mut snap = ledger.snapshot().await;
        snap[0].current_quantity = 0;
        assert_eq!(ledger.get(pos.id).await.unwrap().current_quantity, 2);
        assert_eq!(ledger.ids().await, vec![pos.id]);
    }

    #[tokio::test]
    async fn test_daily_stats_accumulate() {
        let stats = DailyStats::new();
        assert_eq!(stats.record_entry().await, 1);
        assert_eq!(stats.record_entry().await, 2);
        stats.record_closed(-12.5).await;
        stats.record_closed(20.0).await;

        assert_eq!(stats.trade_count().await, 2);
        assert_eq!(stats.closed_pnl().await, 7.5);
    }
}
