//! # engine::monitor
//!
//! **Price Monitor**: the one loop that moves filled positions forward.
//!
//! ```text
//!  every interval:
//!    price = router.current_price()          (live preferred, else paper)
//!    for id in ledger (oldest first):        sequential, never parallel
//!      clone out ─▶ evaluate_tick ─▶ write back | remove if terminal
//!                        │
//!                        └─▶ snapshot + event on every exit
//! ```
//!
//! The ledger lock is never held while a venue call is in flight.  Shutdown
//! is observed between ticks only, so an exit that has started always
//! finishes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::engine::ledger::{DailyStats, PositionLedger};
use crate::engine::lifecycle::{Exit, PositionStateMachine, TickOutcome};
use crate::events::{EventBus, PositionEvent};
use crate::models::TradePosition;
use crate::store::SnapshotStore;

// ─── TickReport ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// `None` when no venue had a quote; nothing was evaluated.
    pub price:       Option<f64>,
    pub evaluated:   usize,
    pub transitions: usize,
    pub closed:      usize,
}

// ─── PriceMonitor ─────────────────────────────────────────────────────────────

pub struct PriceMonitor {
    machine:  Arc<PositionStateMachine>,
    ledger:   PositionLedger,
    daily:    DailyStats,
    store:    Arc<dyn SnapshotStore>,
    events:   EventBus,
    interval: Duration,
}

impl PriceMonitor {
    pub fn new(
        machine: Arc<PositionStateMachine>,
        ledger: PositionLedger,
        daily: DailyStats,
        store: Arc<dyn SnapshotStore>,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        Self { machine, ledger, daily, store, events, interval }
    }

    /// One pass over every active position at the current price.
    pub async fn run_tick(&self) -> TickReport {
        let Some(price) = self.machine.router().current_price().await else {
            debug!("No price from any venue — tick skipped");
            return TickReport::default();
        };

        let mut report = TickReport { price: Some(price), ..TickReport::default() };

        for id in self.ledger.ids().await {
            let Some(mut position) = self.ledger.get(id).await else {
                continue;
            };
            report.evaluated += 1;

            let evaluated = AssertUnwindSafe(self.machine.evaluate_tick(&mut position, price))
                .catch_unwind()
                .await;

            let outcome = match evaluated {
                Ok(outcome) => outcome,
                Err(panic) => {
                    error!(
                        position_id = %id,
                        price,
                        panic = %panic_message(&*panic),
                        "💥 Position evaluation panicked — skipped this tick"
                    );
                    continue;
                }
            };

            if outcome.is_transition() {
                report.transitions += 1;
            }
            match outcome {
                TickOutcome::Exited { exit, degraded } => {
                    self.persist(&position).await;
                    self.publish_exit(exit, &position);
                    if !degraded.is_empty() {
                        self.events.publish(&PositionEvent::VenueDegraded {
                            position_id: position.id,
                            action:      exit.as_str().to_string(),
                            failures:    degraded.iter().map(ToString::to_string).collect(),
                        });
                    }
                    if self.settle(position).await {
                        report.closed += 1;
                    }
                }
                TickOutcome::Ignored(_) => {
                    // CLOSED but still registered: take it out now
                    if self.settle(position).await {
                        report.closed += 1;
                    }
                }
                TickOutcome::Failed { .. } | TickOutcome::Hold | TickOutcome::Skipped => {}
            }
        }

        if report.transitions > 0 {
            info!(
                price,
                evaluated   = report.evaluated,
                transitions = report.transitions,
                closed      = report.closed,
                "📈 Tick processed"
            );
        }
        report
    }

    /// Writes the position back, or removes it once it is terminal.  Returns
    /// `true` when this call removed it.
    async fn settle(&self, position: TradePosition) -> bool {
        if !position.is_terminal() {
            self.ledger.update(position).await;
            return false;
        }
        match self.ledger.remove(position.id).await {
            Some(_) => {
                self.daily.record_closed(position.realized_pnl).await;
                info!(
                    position_id = %position.id,
                    status      = position.trade_status.as_str(),
                    realized    = position.realized_pnl,
                    "📕 Position deregistered"
                );
                true
            }
            None => false,
        }
    }

    async fn persist(&self, position: &TradePosition) {
        if let Err(e) = self.store.record(position).await {
            warn!(position_id = %position.id, error = %e, "⚠️ Snapshot not recorded");
        }
    }

    fn publish_exit(&self, exit: Exit, position: &TradePosition) {
        let position = Box::new(position.clone());
        let event = match exit {
            Exit::Target1 => PositionEvent::Target1Hit { position },
            Exit::Target2 => PositionEvent::Target2Hit { position },
            Exit::Stop    => PositionEvent::StoppedOut { position },
        };
        self.events.publish(&event);
    }

    // ─── Task ─────────────────────────────────────────────────────────────────

    /// Runs [`Self::run_tick`] every interval until the handle is stopped.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = self.interval.as_millis() as u64, "👁️ Price monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if *shutdown_rx.borrow() {
                    break;
                }
                self.run_tick().await;
            }

            info!("👁️ Price monitor stopped");
        });

        MonitorHandle { shutdown: shutdown_tx, task }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── MonitorHandle ────────────────────────────────────────────────────────────

pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task:     JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the loop and waits up to `grace` for it to exit.  Returns
    /// `true` if it did.
    pub async fn stop(self, grace: Duration) -> bool {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Price monitor task ended abnormally");
                true
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "⏳ Price monitor did not stop in time");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::SizeMapping;
    use crate::engine::router::OrderRouter;
    use crate::models::{Alert, OrderSide, PositionStatus, TradeStatus, VenueKind};
    use crate::store::InMemorySnapshotStore;
    use crate::venues::testing::ScriptedVenue;
    use crate::venues::VenueError;

    struct Rig {
        paper:   Arc<ScriptedVenue>,
        machine: Arc<PositionStateMachine>,
        ledger:  PositionLedger,
        daily:   DailyStats,
        store:   Arc<InMemorySnapshotStore>,
        events:  EventBus,
        monitor: Arc<PriceMonitor>,
    }

    fn rig() -> Rig {
        let paper = Arc::new(ScriptedVenue::new(VenueKind::Paper, 6326.0));
        let router = OrderRouter::new(Duration::from_millis(200)).with_venue(paper.clone(), true);
        let machine = Arc::new(PositionStateMachine::new(
            Arc::new(router),
            SizeMapping::new([("A", 3)]),
            1.25,
        ));
        let ledger = PositionLedger::new();
        let daily  = DailyStats::new();
        let store  = Arc::new(InMemorySnapshotStore::new());
        let events = EventBus::new();
        let monitor = Arc::new(PriceMonitor::new(
            machine.clone(),
            ledger.clone(),
            daily.clone(),
            store.clone(),
            events.clone(),
            Duration::from_millis(10),
        ));
        Rig { paper, machine, ledger, daily, store, events, monitor }
    }

    fn alert(id: u64) -> Alert {
        Alert {
            alert_id:  id,
            source_id: "test".into(),
            price:     6326.0,
            stop:      6316.0,
            target1:   6333.0,
            target2:   6338.0,
            size:      "A".into(),
            timestamp: Utc::now(),
        }
    }

    async fn register(rig: &Rig, id: u64) -> uuid::Uuid {
        let mut pos = rig.machine.create_from_alert(&alert(id));
        rig.machine.submit_entry(&mut pos).await.unwrap();
        rig.machine.on_entry_filled(&mut pos, 6326.0).unwrap();
        let pid = pos.id;
        rig.ledger.insert(pos).await;
        pid
    }

    #[tokio::test]
    async fn test_scenario_a_through_ticks() {
        let rig = rig();
        let id = register(&rig, 1).await;
        let mut rx = rig.events.subscribe();

        let mut reports = Vec::new();
        for price in [6320.0, 6333.0, 6330.0, 6338.0] {
            rig.paper.set_price(price).await;
            reports.push(rig.monitor.run_tick().await);
        }

        let transitions: Vec<_> = reports.iter().map(|r| r.transitions).collect();
        assert_eq!(transitions, vec![0, 1, 0, 1]);
        assert_eq!(reports[3].closed, 1);
        assert!(rig.ledger.is_empty().await);
        assert_eq!(rig.paper.market_orders(OrderSide::Sell).await, vec![1, 2]);
        assert!((rig.daily.closed_pnl().await - 38.75).abs() < 1e-9);

        let statuses: Vec<_> = rig.store.history(id).await.iter().map(|p| p.trade_status).collect();
        assert_eq!(statuses, vec![TradeStatus::Target1Hit, TradeStatus::Target2Hit]);

        assert!(rx.recv().await.unwrap().contains("\"TARGET1_HIT\""));
        assert!(rx.recv().await.unwrap().contains("\"TARGET2_HIT\""));
    }

    #[tokio::test]
    async fn test_intermediate_state_is_written_back() {
        let rig = rig();
        let id = register(&rig, 1).await;

        rig.paper.set_price(6333.0).await;
        rig.monitor.run_tick().await;

        let pos = rig.ledger.get(id).await.unwrap();
        assert_eq!(pos.trade_status, TradeStatus::Target1Hit);
        assert_eq!(pos.current_quantity, 2);
        assert_eq!(pos.stop_price, 6326.0);
        assert_eq!(rig.ledger.open_realized_pnl().await, 8.75);
    }

    #[tokio::test]
    async fn test_no_price_skips_tick() {
        let rig = rig();
        register(&rig, 1).await;
        rig.paper.clear_price().await;

        let report = rig.monitor.run_tick().await;
        assert_eq!(report, TickReport::default());
        assert_eq!(rig.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_failure_on_one_position_does_not_stop_the_others() {
        let rig = rig();
        register(&rig, 1).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        register(&rig, 2).await;

        rig.paper.set_price(6310.0).await;
        // first exit refused, second goes through
        rig.paper.fail_next(VenueError::Unreachable("blip".into())).await;
        let report = rig.monitor.run_tick().await;

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.transitions, 1);
        assert_eq!(report.closed, 1);
        assert_eq!(rig.ledger.len().await, 1);

        // retried next tick
        let report = rig.monitor.run_tick().await;
        assert_eq!(report.closed, 1);
        assert!(rig.ledger.is_empty().await);
        assert_eq!(rig.paper.market_orders(OrderSide::Sell).await, vec![3, 3]);
    }

    #[tokio::test]
    async fn test_panic_in_one_position_is_isolated() {
        let rig = rig();
        let first = register(&rig, 1).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = register(&rig, 2).await;

        rig.paper.set_price(6333.0).await;
        // the first T1 sell blows up inside the venue
        rig.paper.panic_next().await;
        let report = rig.monitor.run_tick().await;

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.transitions, 1);
        let untouched = rig.ledger.get(first).await.unwrap();
        assert_eq!(untouched.position_status, PositionStatus::Full);
        assert_eq!(untouched.current_quantity, 3);
        assert_eq!(rig.ledger.get(second).await.unwrap().trade_status, TradeStatus::Target1Hit);

        // still registered, so the next tick takes its exit
        let report = rig.monitor.run_tick().await;
        assert_eq!(report.transitions, 1);
        assert_eq!(rig.ledger.get(first).await.unwrap().trade_status, TradeStatus::Target1Hit);
        assert_eq!(rig.paper.market_orders(OrderSide::Sell).await, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_closed_position_leaves_exactly_once() {
        let rig = rig();
        let id = register(&rig, 1).await;

        rig.paper.set_price(6310.0).await;
        assert_eq!(rig.monitor.run_tick().await.closed, 1);
        assert_eq!(rig.monitor.run_tick().await.closed, 0);
        assert!(rig.ledger.get(id).await.is_none());
        assert!((rig.daily.closed_pnl().await - (-60.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_spawned_loop_runs_and_stops() {
        let rig = rig();
        register(&rig, 1).await;
        rig.paper.set_price(6310.0).await;

        let handle = rig.monitor.clone().spawn();
        for _ in 0..100 {
            if rig.ledger.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(rig.ledger.is_empty().await);
        assert!(handle.is_running());
        assert!(handle.stop(Duration::from_secs(1)).await);
    }
}
