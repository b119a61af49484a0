//! # engine::executor
//!
//! **Trade Executor**: the facade everything outside the engine talks to.
//!
//! ```text
//!  Alert ─▶ auto-trading? ─▶ RiskGate.check ─▶ create (PENDING)
//!                                 │                  │
//!                              Blocked          submit_entry ─▶ ERROR ─▶ false
//!                                 ▼                  │
//!                               false        on_entry_filled ─▶ ledger.insert
//!                                                    │
//!                                          protective stop ─▶ monitor running
//! ```
//!
//! The executor owns the ledger.  It only ever *inserts*; from then on the
//! price monitor is the sole writer of a position's statuses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{EngineConfig, TradingConfig};
use crate::engine::ledger::{DailyStats, PositionLedger};
use crate::engine::lifecycle::PositionStateMachine;
use crate::engine::monitor::{MonitorHandle, PriceMonitor};
use crate::engine::router::{OrderConfirmation, OrderRouter};
use crate::events::{EventBus, PositionEvent};
use crate::models::{Alert, TradePosition};
use crate::risk::{Exposure, RiskDecision, RiskGate};
use crate::store::SnapshotStore;

pub struct TradeExecutor {
    machine: Arc<PositionStateMachine>,
    router:  Arc<OrderRouter>,
    risk:    Arc<dyn RiskGate>,
    ledger:  PositionLedger,
    daily:   DailyStats,
    store:   Arc<dyn SnapshotStore>,
    events:  EventBus,

    monitor:        Arc<PriceMonitor>,
    monitor_handle: Mutex<Option<MonitorHandle>>,

    config:        EngineConfig,
    auto_trading:  AtomicBool,
    shutting_down: AtomicBool,
}

impl TradeExecutor {
    pub fn new(
        router: Arc<OrderRouter>,
        risk: Arc<dyn RiskGate>,
        store: Arc<dyn SnapshotStore>,
        events: EventBus,
        trading: &TradingConfig,
        config: EngineConfig,
    ) -> Self {
        let machine = Arc::new(PositionStateMachine::new(
            Arc::clone(&router),
            trading.size_mapping.clone(),
            trading.tick_value,
        ));
        let ledger = PositionLedger::new();
        let daily  = DailyStats::new();
        let monitor = Arc::new(PriceMonitor::new(
            Arc::clone(&machine),
            ledger.clone(),
            daily.clone(),
            Arc::clone(&store),
            events.clone(),
            config.monitor_interval,
        ));

        Self {
            machine,
            router,
            risk,
            ledger,
            daily,
            store,
            events,
            monitor,
            monitor_handle: Mutex::new(None),
            config,
            auto_trading:   AtomicBool::new(trading.auto_trading),
            shutting_down:  AtomicBool::new(false),
        }
    }

    // ─── ExecuteAlert ─────────────────────────────────────────────────────────

    /// Runs one alert through the gate and, if approved, into the market.
    ///
    /// `true` once the entry is filled and the position is being monitored.
    pub async fn execute_alert(&self, alert: &Alert) -> bool {
        if self.shutting_down.load(Ordering::Acquire) {
            warn!(alert_id = alert.alert_id, "🛑 Shutting down — alert dropped");
            return false;
        }
        if !self.auto_trading.load(Ordering::Acquire) {
            info!(alert_id = alert.alert_id, "⏸️ Auto-trading disabled — alert ignored");
            return false;
        }

        // ── Risk gate ─────────────────────────────────────────────────────────
        let requested = self.machine.resolve_quantity(alert);
        let exposure  = self.exposure(requested).await;
        if let RiskDecision::Blocked(reason) = self.risk.check(alert, &exposure).await {
            self.events.publish(&PositionEvent::RiskBlocked { alert_id: alert.alert_id, reason });
            return false;
        }

        // ── Entry ─────────────────────────────────────────────────────────────
        let mut position = self.machine.create_from_alert(alert);
        self.persist(&position).await;

        let entry = match self.machine.submit_entry(&mut position).await {
            Ok(conf) => conf,
            Err(e) => {
                self.persist(&position).await;
                self.risk.record_failure().await;
                self.events.publish(&PositionEvent::EntryFailed {
                    position: Box::new(position),
                    reason:   e.to_string(),
                });
                return false;
            }
        };

        self.risk.record_success().await;
        let trades_today = self.daily.record_entry().await;
        self.persist(&position).await;
        self.events.publish(&PositionEvent::EntrySubmitted { position: Box::new(position.clone()) });
        self.publish_degraded(&position, "ENTRY", &entry);

        // ── Fill ──────────────────────────────────────────────────────────────
        let fill = match entry.fill_price() {
            Some(price) => price,
            None => self.router.current_price().await.unwrap_or(alert.price),
        };
        if let Err(e) = self.machine.on_entry_filled(&mut position, fill) {
            error!(position_id = %position.id, error = %e, "❌ Entry fill rejected");
            return false;
        }

        match self.machine.place_protective_stop(&mut position).await {
            Ok(conf) => self.publish_degraded(&position, "STOP", &conf),
            Err(e) => warn!(
                position_id = %position.id,
                error       = %e,
                "⚠️ Protective stop not placed — monitor enforces it by price"
            ),
        }

        self.persist(&position).await;
        self.ledger.insert(position.clone()).await;
        info!(
            position_id  = %position.id,
            alert_id     = alert.alert_id,
            quantity     = position.full_quantity,
            fill,
            trades_today,
            "📒 Position registered"
        );
        self.events.publish(&PositionEvent::EntryFilled { position: Box::new(position) });

        self.ensure_monitor().await;
        true
    }

    // ─── Queries ──────────────────────────────────────────────────────────────

    pub async fn active_positions(&self) -> Vec<TradePosition> {
        self.ledger.snapshot().await
    }

    /// Closed-today P&L plus what open positions have already booked.
    pub async fn daily_pnl(&self) -> f64 {
        self.daily.closed_pnl().await + self.ledger.open_realized_pnl().await
    }

    pub async fn daily_trade_count(&self) -> u32 {
        self.daily.trade_count().await
    }

    pub fn router(&self) -> &Arc<OrderRouter> {
        &self.router
    }

    pub fn monitor(&self) -> &Arc<PriceMonitor> {
        &self.monitor
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn auto_trading(&self) -> bool {
        self.auto_trading.load(Ordering::Acquire)
    }

    pub fn set_auto_trading(&self, enabled: bool) {
        self.auto_trading.store(enabled, Ordering::Release);
        info!(enabled, "🔁 Auto-trading toggled");
    }

    pub async fn is_monitoring(&self) -> bool {
        self.monitor_handle
            .lock()
            .await
            .as_ref()
            .map(MonitorHandle::is_running)
            .unwrap_or(false)
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────────

    /// Reloads positions that were still being monitored when the process
    /// last stopped, and today's trade count and closed P&L.  Returns how
    /// many positions came back.
    pub async fn initialize(&self) -> anyhow::Result<usize> {
        let day_start = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let today = self.store.touched_since(day_start).await?;
        let (trades, closed_pnl) = daily_totals(&today, day_start);
        if trades > 0 || closed_pnl != 0.0 {
            self.daily.restore(trades, closed_pnl).await;
            info!(trades, closed_pnl, "📅 Daily counters restored");
        }

        let recovered = self.store.recoverable().await?;
        let count = recovered.len();
        for position in recovered {
            info!(
                position_id = %position.id,
                status      = position.trade_status.as_str(),
                quantity    = position.current_quantity,
                "♻️ Position recovered"
            );
            self.ledger.insert(position).await;
        }
        if count > 0 {
            self.ensure_monitor().await;
        }
        Ok(count)
    }

    /// Stops the monitor and waits up to `shutdown_grace` for it.  Open
    /// positions stay open.
    pub async fn shutdown(&self) -> bool {
        self.shutting_down.store(true, Ordering::Release);
        let handle = self.monitor_handle.lock().await.take();

        let stopped = match handle {
            Some(handle) => handle.stop(self.config.shutdown_grace).await,
            None => true,
        };
        info!(
            open_positions = self.ledger.len().await,
            stopped,
            "🛑 Trade executor shut down"
        );
        stopped
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    async fn ensure_monitor(&self) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        let mut slot = self.monitor_handle.lock().await;
        if slot.as_ref().map(MonitorHandle::is_running).unwrap_or(false) {
            return;
        }
        *slot = Some(Arc::clone(&self.monitor).spawn());
    }

    async fn exposure(&self, requested_quantity: u32) -> Exposure {
        Exposure {
            open_quantity:     self.ledger.open_quantity().await,
            requested_quantity,
            daily_trade_count: self.daily.trade_count().await,
            daily_pnl:         self.daily_pnl().await,
            account_balance:   self.router.account_balance().await,
            market_open:       self.router.is_market_open().await,
        }
    }

    async fn persist(&self, position: &TradePosition) {
        if let Err(e) = self.store.record(position).await {
            warn!(position_id = %position.id, error = %e, "⚠️ Snapshot not recorded");
        }
    }

    fn publish_degraded(&self, position: &TradePosition, action: &str, conf: &OrderConfirmation) {
        if conf.is_partial() {
            self.events.publish(&PositionEvent::VenueDegraded {
                position_id: position.id,
                action:      action.to_string(),
                failures:    conf.failures.iter().map(ToString::to_string).collect(),
            });
        }
    }
}

/// Entries submitted and P&L of positions closed since `day_start`.  Open
/// positions contribute their partial P&L through the ledger instead.
fn daily_totals(positions: &[TradePosition], day_start: DateTime<Utc>) -> (u32, f64) {
    let since = |t: Option<DateTime<Utc>>| t.is_some_and(|t| t >= day_start);

    let trades = positions.iter().filter(|p| since(p.entry_submitted_at)).count() as u32;
    let closed_pnl = positions
        .iter()
        .filter(|p| p.is_terminal() && since(p.closed_at))
        .map(|p| p.realized_pnl)
        .sum();
    (trades, closed_pnl)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::config::SizeMapping;
    use crate::models::{OrderSide, OrderType, PositionStatus, TradeStatus, VenueKind};
    use crate::risk::{RiskConfig, RiskManager};
    use crate::store::InMemorySnapshotStore;
    use crate::venues::testing::ScriptedVenue;
    use crate::venues::VenueError;

    struct Rig {
        paper:    Arc<ScriptedVenue>,
        live:     Arc<ScriptedVenue>,
        risk:     Arc<RiskManager>,
        store:    Arc<InMemorySnapshotStore>,
        executor: TradeExecutor,
    }

    fn rig_with(risk: RiskConfig, live_enabled: bool, timeout: Duration) -> Rig {
        let paper = Arc::new(ScriptedVenue::new(VenueKind::Paper, 6326.0));
        let live  = Arc::new(ScriptedVenue::new(VenueKind::Live, 6326.5));
        let router = Arc::new(
            OrderRouter::new(timeout)
                .with_venue(paper.clone(), true)
                .with_venue(live.clone(), live_enabled),
        );
        let risk  = Arc::new(RiskManager::new(risk));
        let store = Arc::new(InMemorySnapshotStore::new());
        let trading = TradingConfig {
            size_mapping: SizeMapping::new([("A", 3), ("B", 2), ("C", 1)]),
            tick_value:   1.25,
            auto_trading: true,
            ..TradingConfig::default()
        };
        let engine = EngineConfig {
            // ticks are driven by hand
            monitor_interval: Duration::from_secs(3600),
            shutdown_grace:   Duration::from_secs(1),
            ..EngineConfig::default()
        };
        let executor = TradeExecutor::new(
            router,
            risk.clone(),
            store.clone(),
            EventBus::new(),
            &trading,
            engine,
        );
        Rig { paper, live, risk, store, executor }
    }

    fn rig() -> Rig {
        rig_with(RiskConfig::default(), false, Duration::from_secs(1))
    }

    fn alert(id: u64, size: &str) -> Alert {
        Alert {
            alert_id:  id,
            source_id: "test".into(),
            price:     6326.0,
            stop:      6316.0,
            target1:   6333.0,
            target2:   6338.0,
            size:      size.into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_accepted_alert_is_filled_and_monitored() {
        let rig = rig();
        let mut rx = rig.executor.events().subscribe();

        assert!(rig.executor.execute_alert(&alert(1, "A")).await);

        let active = rig.executor.active_positions().await;
        assert_eq!(active.len(), 1);
        let pos = &active[0];
        assert_eq!(pos.trade_status, TradeStatus::EntryFilled);
        assert_eq!(pos.entry_fill_price, Some(6326.0));
        assert_eq!(pos.full_quantity, 3);
        assert_eq!(pos.orders.stop.len(), 1);
        assert_eq!(rig.executor.daily_trade_count().await, 1);
        assert!(rig.executor.is_monitoring().await);

        let statuses: Vec<_> = rig.store.history(pos.id).await.iter().map(|p| p.trade_status).collect();
        assert_eq!(
            statuses,
            vec![TradeStatus::Pending, TradeStatus::EntrySubmitted, TradeStatus::EntryFilled]
        );

        let stop = rig.paper.placed().await.into_iter().find(|o| o.order_type == OrderType::Stop).unwrap();
        assert_eq!((stop.side, stop.quantity, stop.stop_price), (OrderSide::Sell, 3, Some(6316.0)));

        assert!(rx.recv().await.unwrap().contains("\"ENTRY_SUBMITTED\""));
        assert!(rx.recv().await.unwrap().contains("\"ENTRY_FILLED\""));
        rig.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_scenario_d_daily_trade_limit() {
        let risk = RiskConfig { max_trades_per_day: 1, max_position_size: 10, ..RiskConfig::default() };
        let rig = rig_with(risk, false, Duration::from_secs(1));
        assert!(rig.executor.execute_alert(&alert(1, "A")).await);
        let before = rig.executor.active_positions().await;
        let mut rx = rig.executor.events().subscribe();

        assert!(!rig.executor.execute_alert(&alert(2, "A")).await);

        assert_eq!(rig.executor.active_positions().await, before);
        assert_eq!(rig.executor.daily_trade_count().await, 1);
        assert_eq!(rig.paper.market_orders(OrderSide::Buy).await, vec![3]);
        let event = rx.recv().await.unwrap();
        assert!(event.contains("RISK_BLOCKED") && event.contains("Daily trade limit reached: 1/1"), "{event}");
        rig.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_scenario_c_live_timeout_on_entry() {
        let rig = rig_with(RiskConfig::default(), true, Duration::from_millis(50));
        rig.live.set_delay(Duration::from_millis(500)).await;
        let mut rx = rig.executor.events().subscribe();

        assert!(rig.executor.execute_alert(&alert(1, "A")).await);

        let pos = rig.executor.active_positions().await.remove(0);
        assert_eq!(pos.orders.entry.len(), 1);
        assert_eq!(pos.orders.entry[0].venue, VenueKind::Paper);
        assert_eq!(pos.entry_fill_price, Some(6326.0));

        let history = rig.store.history(pos.id).await;
        let submitted = history.iter().find(|p| p.trade_status == TradeStatus::EntrySubmitted).unwrap();
        assert_eq!(submitted.orders.entry.len(), 1);

        let mut degraded = false;
        while let Ok(event) = rx.try_recv() {
            degraded |= event.contains("VENUE_DEGRADED") && event.contains("LIVE");
        }
        assert!(degraded);
        rig.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_auto_trading_off_ignores_alert() {
        let rig = rig();
        rig.executor.set_auto_trading(false);

        assert!(!rig.executor.execute_alert(&alert(1, "A")).await);
        assert!(rig.paper.placed().await.is_empty());
        assert!(rig.executor.active_positions().await.is_empty());
    }

    #[tokio::test]
    async fn test_entry_failure_is_error_and_counted() {
        let rig = rig();
        rig.paper.fail_next(VenueError::MarketClosed).await;

        assert!(!rig.executor.execute_alert(&alert(1, "A")).await);
        assert!(rig.executor.active_positions().await.is_empty());
        assert_eq!(rig.executor.daily_trade_count().await, 0);
        assert_eq!(rig.risk.status().await.consecutive_failures, 1);
        assert!(!rig.executor.is_monitoring().await);
    }

    #[tokio::test]
    async fn test_low_balance_blocks_entry() {
        let rig = rig();
        let mut rx = rig.executor.events().subscribe();
        rig.paper.set_balance(400.0).await;

        assert!(!rig.executor.execute_alert(&alert(1, "A")).await);
        assert!(rig.paper.placed().await.is_empty());
        let blocked = rx.recv().await.unwrap();
        assert!(blocked.contains("RISK_BLOCKED"), "{blocked}");
        assert!(blocked.contains("Insufficient account balance: $400.00"), "{blocked}");
    }

    #[tokio::test]
    async fn test_repeated_entry_failures_trip_kill_switch() {
        let rig = rig();
        rig.paper.fail_always(VenueError::Unreachable("bridge down".into())).await;

        for id in 1..=3 {
            assert!(!rig.executor.execute_alert(&alert(id, "C")).await);
        }
        assert_eq!(rig.risk.status().await.consecutive_failures, 3);

        // venue back, but the next check trips the switch
        rig.paper.recover().await;
        assert!(!rig.executor.execute_alert(&alert(4, "C")).await);
        assert!(rig.risk.status().await.is_killed);
        assert!(rig.paper.placed().await.is_empty());

        rig.risk.rearm().await;
        assert!(rig.executor.execute_alert(&alert(5, "C")).await);
        assert_eq!(rig.executor.daily_trade_count().await, 1);
        rig.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_lifecycle_through_executor() {
        let rig = rig();
        assert!(rig.executor.execute_alert(&alert(1, "A")).await);

        rig.paper.set_price(6333.0).await;
        rig.executor.monitor().run_tick().await;
        assert!((rig.executor.daily_pnl().await - 8.75).abs() < 1e-9);

        let pos = rig.executor.active_positions().await.remove(0);
        assert_eq!(pos.position_status, PositionStatus::Half);

        rig.paper.set_price(6338.0).await;
        rig.executor.monitor().run_tick().await;
        assert!(rig.executor.active_positions().await.is_empty());
        assert!((rig.executor.daily_pnl().await - 38.75).abs() < 1e-9);
        rig.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_headroom_counts_open_positions() {
        let rig = rig();
        assert!(rig.executor.execute_alert(&alert(1, "A")).await);
        // 3 open + 3 requested > 5
        assert!(!rig.executor.execute_alert(&alert(2, "A")).await);
        // 3 open + 2 requested fits
        assert!(rig.executor.execute_alert(&alert(3, "B")).await);
        assert_eq!(rig.executor.active_positions().await.len(), 2);
        rig.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_monitor_and_keeps_positions() {
        let rig = rig();
        assert!(rig.executor.execute_alert(&alert(1, "A")).await);
        assert!(rig.executor.is_monitoring().await);

        assert!(rig.executor.shutdown().await);
        assert!(!rig.executor.is_monitoring().await);
        assert_eq!(rig.executor.active_positions().await.len(), 1);
        assert!(!rig.executor.execute_alert(&alert(2, "B")).await);
    }

    #[tokio::test]
    async fn test_initialize_recovers_monitored_positions() {
        let rig = rig();
        let mut running = TradePosition::from_alert(&alert(1, "A"), 3);
        running.trade_status     = TradeStatus::Target1Hit;
        running.position_status  = PositionStatus::Half;
        running.current_quantity = 2;
        running.entry_fill_price = Some(6326.0);
        let mut pending = TradePosition::from_alert(&alert(2, "A"), 3);
        pending.trade_status = TradeStatus::EntrySubmitted;
        rig.store.record(&running).await.unwrap();
        rig.store.record(&pending).await.unwrap();

        assert_eq!(rig.executor.initialize().await.unwrap(), 1);
        let active = rig.executor.active_positions().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
        assert!(rig.executor.is_monitoring().await);
        rig.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_initialize_restores_daily_counters() {
        let rig = rig_with(
            RiskConfig { max_trades_per_day: 2, ..RiskConfig::default() },
            false,
            Duration::from_secs(1),
        );
        let now = Utc::now();

        let mut stopped = TradePosition::from_alert(&alert(1, "A"), 3);
        stopped.trade_status       = TradeStatus::StoppedOut;
        stopped.position_status    = PositionStatus::Closed;
        stopped.current_quantity   = 0;
        stopped.entry_submitted_at = Some(now);
        stopped.closed_at          = Some(now);
        stopped.realized_pnl       = -60.0;

        let mut open = TradePosition::from_alert(&alert(2, "A"), 3);
        open.trade_status       = TradeStatus::Target1Hit;
        open.position_status    = PositionStatus::Half;
        open.current_quantity   = 2;
        open.entry_fill_price   = Some(6326.0);
        open.entry_submitted_at = Some(now);
        open.realized_pnl       = 8.75;

        // entry rejected everywhere: not a trade
        let mut failed = TradePosition::from_alert(&alert(3, "A"), 3);
        failed.trade_status = TradeStatus::Error;
        failed.closed_at    = Some(now);

        for pos in [&stopped, &open, &failed] {
            rig.store.record(pos).await.unwrap();
        }

        assert_eq!(rig.executor.initialize().await.unwrap(), 1);
        assert_eq!(rig.executor.daily_trade_count().await, 2);
        assert!((rig.executor.daily_pnl().await - (-60.0 + 8.75)).abs() < 1e-9);

        // the cap still holds across the restart
        assert!(!rig.executor.execute_alert(&alert(4, "A")).await);
        assert!(rig.paper.placed().await.is_empty());
        rig.executor.shutdown().await;
    }
}
