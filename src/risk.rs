//! # risk: Pre-Trade Risk Gate
//!
//! The last gate before an entry order leaves the building.
//!
//! ## Checks (in order)
//! 1. **Kill Switch**:       manual or auto
//! 2. **Max Trades/Day**:    daily trade count below the cap
//! 3. **Position Headroom**: open + requested contracts within the limit
//! 4. **Balance Floor**:     account balance known and above the floor
//! 5. **Market Hours**:      preferred venue reports the market open
//! 6. **Daily Loss Limit**:  today's P&L not below −limit
//! 7. **Auto-Kill**:         N consecutive failed entries trips the switch

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::env_parse;
use crate::models::Alert;

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RiskConfig {
    /// 0 = unlimited
    pub max_trades_per_day:       u32,
    /// Open contracts allowed across all positions, including the new one.
    pub max_position_size:        u32,
    pub min_account_balance:      f64,
    /// Dollars; 0 = off
    pub daily_loss_limit:         f64,
    /// 0 = never auto-kill
    pub max_consecutive_failures: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_trades_per_day:       10,
            max_position_size:        5,
            min_account_balance:      1000.0,
            daily_loss_limit:         500.0,
            max_consecutive_failures: 3,
        }
    }
}

impl RiskConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_trades_per_day:       env_parse("RISK_MAX_TRADES_PER_DAY", d.max_trades_per_day),
            max_position_size:        env_parse("RISK_MAX_POSITION_SIZE", d.max_position_size),
            min_account_balance:      env_parse("RISK_MIN_ACCOUNT_BALANCE", d.min_account_balance),
            daily_loss_limit:         env_parse("RISK_DAILY_LOSS_LIMIT", d.daily_loss_limit),
            max_consecutive_failures: env_parse("RISK_MAX_CONSECUTIVE_FAILS", d.max_consecutive_failures),
        }
    }
}

// ─── Exposure / Decision ──────────────────────────────────────────────────────

/// Everything the gate needs to know about the book at decision time.
#[derive(Debug, Clone, Serialize)]
pub struct Exposure {
    pub open_quantity:      u32,
    pub requested_quantity: u32,
    pub daily_trade_count:  u32,
    pub daily_pnl:          f64,
    /// `None` when no venue could report a balance.
    pub account_balance:    Option<f64>,
    pub market_open:        bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Blocked(String),
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved)
    }
}

// ─── RiskGate ─────────────────────────────────────────────────────────────────

#[async_trait]
pub trait RiskGate: Send + Sync {
    async fn check(&self, alert: &Alert, exposure: &Exposure) -> RiskDecision;

    /// An approved entry reached at least one venue.
    async fn record_success(&self) {}

    /// An approved entry failed on every venue.
    async fn record_failure(&self) {}
}

// ─── Internal State ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RiskInner {
    is_killed:            bool,
    kill_reason:          Option<String>,
    consecutive_failures: u32,
    last_failure_at:      Option<DateTime<Utc>>,
    last_decision_at:     Option<DateTime<Utc>>,
    blocked_count:        u32,
}

// ─── Status (for ops API) ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub is_killed:            bool,
    pub kill_reason:          Option<String>,
    pub consecutive_failures: u32,
    pub last_failure_at:      Option<DateTime<Utc>>,
    pub last_decision_at:     Option<DateTime<Utc>>,
    pub blocked_count:        u32,
    pub config:               RiskConfig,
}

// ─── Risk Manager ─────────────────────────────────────────────────────────────

pub struct RiskManager {
    inner:  RwLock<RiskInner>,
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { inner: RwLock::new(RiskInner::default()), config }
    }

    fn evaluate(&self, inner: &mut RiskInner, exposure: &Exposure) -> RiskDecision {
        let cfg = &self.config;

        // [1] Kill switch
        if inner.is_killed {
            return RiskDecision::Blocked(format!(
                "Kill switch active: {}",
                inner.kill_reason.as_deref().unwrap_or("manual activation")
            ));
        }

        // [2] Max trades per day
        if cfg.max_trades_per_day > 0 && exposure.daily_trade_count >= cfg.max_trades_per_day {
            return RiskDecision::Blocked(format!(
                "Daily trade limit reached: {}/{}",
                exposure.daily_trade_count, cfg.max_trades_per_day
            ));
        }

        // [3] Position headroom
        let total = exposure.open_quantity + exposure.requested_quantity;
        if total > cfg.max_position_size {
            return RiskDecision::Blocked(format!(
                "Position size limit exceeded: {total}/{}",
                cfg.max_position_size
            ));
        }

        // [4] Balance floor
        match exposure.account_balance {
            None => return RiskDecision::Blocked("Account balance unavailable".into()),
            Some(balance) if balance < cfg.min_account_balance => {
                return RiskDecision::Blocked(format!(
                    "Insufficient account balance: ${balance:.2} < ${:.2}",
                    cfg.min_account_balance
                ));
            }
            Some(_) => {}
        }

        // [5] Market hours
        if !exposure.market_open {
            return RiskDecision::Blocked("Market is closed".into());
        }

        // [6] Daily loss limit
        if cfg.daily_loss_limit > 0.0 && exposure.daily_pnl <= -cfg.daily_loss_limit {
            return RiskDecision::Blocked(format!(
                "Daily loss limit hit: ${:.2} (limit ${:.2})",
                exposure.daily_pnl, cfg.daily_loss_limit
            ));
        }

        // [7] Consecutive failure auto-kill
        if cfg.max_consecutive_failures > 0
            && inner.consecutive_failures >= cfg.max_consecutive_failures
        {
            let reason = format!(
                "Auto-kill: {} consecutive entry failures",
                inner.consecutive_failures
            );
            inner.is_killed   = true;
            inner.kill_reason = Some(reason.clone());
            warn!("⛔ Risk auto-kill activated: {reason}");
            return RiskDecision::Blocked(reason);
        }

        RiskDecision::Approved
    }

    // ─── Manual Controls ─────────────────────────────────────────────────────

    pub async fn kill(&self, reason: &str) {
        let mut inner = self.inner.write().await;
        inner.is_killed   = true;
        inner.kill_reason = Some(reason.to_string());
        warn!(reason, "⛔ KILL SWITCH ACTIVATED");
    }

    pub async fn rearm(&self) {
        let mut inner = self.inner.write().await;
        inner.is_killed            = false;
        inner.kill_reason          = None;
        inner.consecutive_failures = 0;
        inner.last_failure_at      = None;
        info!("✅ KILL SWITCH DEACTIVATED — system re-armed");
    }

    pub async fn status(&self) -> RiskStatus {
        let inner = self.inner.read().await;
        RiskStatus {
            is_killed:            inner.is_killed,
            kill_reason:          inner.kill_reason.clone(),
            consecutive_failures: inner.consecutive_failures,
            last_failure_at:      inner.last_failure_at,
            last_decision_at:     inner.last_decision_at,
            blocked_count:        inner.blocked_count,
            config:               self.config.clone(),
        }
    }
}

#[async_trait]
impl RiskGate for RiskManager {
    async fn check(&self, alert: &Alert, exposure: &Exposure) -> RiskDecision {
        let mut inner = self.inner.write().await;
        inner.last_decision_at = Some(Utc::now());

        let decision = self.evaluate(&mut inner, exposure);
        match &decision {
            RiskDecision::Approved => info!(
                alert_id    = alert.alert_id,
                trades      = exposure.daily_trade_count,
                open_qty    = exposure.open_quantity,
                requested   = exposure.requested_quantity,
                "✅ Risk approved"
            ),
            RiskDecision::Blocked(reason) => {
                inner.blocked_count += 1;
                warn!(alert_id = alert.alert_id, reason = %reason, "🛡️ Risk blocked");
            }
        }
        decision
    }

    async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        let prev = inner.consecutive_failures;
        inner.consecutive_failures = 0;
        if prev > 0 {
            info!("Risk: consecutive_failures reset (was {prev})");
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Utc::now());
        warn!(
            consecutive = inner.consecutive_failures,
            max         = self.config.max_consecutive_failures,
            "⚠️ Risk: entry failure recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_alert() -> Alert {
        Alert {
            alert_id:  1,
            source_id: "test".into(),
            price:     6326.0,
            stop:      6316.0,
            target1:   6333.0,
            target2:   6338.0,
            size:      "A".into(),
            timestamp: Utc::now(),
        }
    }

    fn clean_exposure() -> Exposure {
        Exposure {
            open_quantity:      0,
            requested_quantity: 1,
            daily_trade_count:  0,
            daily_pnl:          0.0,
            account_balance:    Some(50_000.0),
            market_open:        true,
        }
    }

    fn blocked(decision: RiskDecision) -> String {
        match decision {
            RiskDecision::Blocked(reason) => reason,
            RiskDecision::Approved => panic!("expected block"),
        }
    }

    #[tokio::test]
    async fn test_clean_book_approved() {
        let risk = RiskManager::new(RiskConfig::default());
        assert!(risk.check(&make_alert(), &clean_exposure()).await.is_approved());
    }

    #[tokio::test]
    async fn test_daily_trade_limit() {
        let risk = RiskManager::new(RiskConfig::default());
        let exposure = Exposure { daily_trade_count: 10, ..clean_exposure() };
        let reason = blocked(risk.check(&make_alert(), &exposure).await);
        assert!(reason.contains("Daily trade limit"), "{reason}");
        assert_eq!(risk.status().await.blocked_count, 1);
    }

    #[tokio::test]
    async fn test_position_headroom() {
        let risk = RiskManager::new(RiskConfig::default());
        let at_limit = Exposure { open_quantity: 2, requested_quantity: 3, ..clean_exposure() };
        assert!(risk.check(&make_alert(), &at_limit).await.is_approved());

        let over = Exposure { open_quantity: 3, requested_quantity: 3, ..clean_exposure() };
        assert!(blocked(risk.check(&make_alert(), &over).await).contains("6/5"));
    }

    #[tokio::test]
    async fn test_balance_floor_and_unknown_balance() {
        let risk = RiskManager::new(RiskConfig::default());
        let poor = Exposure { account_balance: Some(999.0), ..clean_exposure() };
        assert!(blocked(risk.check(&make_alert(), &poor).await).contains("Insufficient"));

        let unknown = Exposure { account_balance: None, ..clean_exposure() };
        assert!(blocked(risk.check(&make_alert(), &unknown).await).contains("unavailable"));
    }

    #[tokio::test]
    async fn test_market_closed() {
        let risk = RiskManager::new(RiskConfig::default());
        let closed = Exposure { market_open: false, ..clean_exposure() };
        assert_eq!(blocked(risk.check(&make_alert(), &closed).await), "Market is closed");
    }

    #[tokio::test]
    async fn test_daily_loss_limit() {
        let risk = RiskManager::new(RiskConfig::default());
        let losing = Exposure { daily_pnl: -500.0, ..clean_exposure() };
        assert!(blocked(risk.check(&make_alert(), &losing).await).contains("loss limit"));

        let off = RiskManager::new(RiskConfig { daily_loss_limit: 0.0, ..RiskConfig::default() });
        assert!(off.check(&make_alert(), &losing).await.is_approved());
    }

    #[tokio::test]
    async fn test_auto_kill_after_consecutive_failures() {
        let risk = RiskManager::new(RiskConfig::default());
        for _ in 0..3 {
            risk.record_failure().await;
        }
        let reason = blocked(risk.check(&make_alert(), &clean_exposure()).await);
        assert!(reason.starts_with("Auto-kill"), "{reason}");
        assert!(risk.status().await.is_killed);

        risk.rearm().await;
        assert!(risk.check(&make_alert(), &clean_exposure()).await.is_approved());
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let risk = RiskManager::new(RiskConfig::default());
        risk.record_failure().await;
        risk.record_failure().await;
        risk.record_success().await;
        risk.record_failure().await;
        assert!(risk.check(&make_alert(), &clean_exposure()).await.is_approved());
    }

    #[tokio::test]
    async fn test_manual_kill() {
        let risk = RiskManager::new(RiskConfig::default());
        risk.kill("desk closed").await;
        assert_eq!(
            blocked(risk.check(&make_alert(), &clean_exposure()).await),
            "Kill switch active: desk closed"
        );
    }
}
