//! # config: Environment-driven configuration
//!
//! Every component receives its own config struct through its constructor;
//! nothing reads the environment after startup.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use thiserror::Error;

use crate::risk::RiskConfig;

// ─── Helpers ──────────────────────────────────────────────────────────────────

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off"))
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ─── Size Mapping ─────────────────────────────────────────────────────────────

/// Contract count used when a size letter is unknown.
pub const MIN_CONTRACTS: u32 = 1;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown size letter '{0}'")]
pub struct ValidationError(pub String);

/// Size letter → contract count (`A:1,B:2,C:3` by default).
#[derive(Debug, Clone, PartialEq)]
pub struct SizeMapping(HashMap<String, u32>);

impl SizeMapping {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into().trim().to_ascii_uppercase(), v))
                .collect(),
        )
    }

    /// Parses `"A:1,B:2,C:3"`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut map = HashMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (letter, qty) = pair
                .split_once(':')
                .with_context(|| format!("size mapping entry '{pair}' must look like A:1"))?;
            let qty: u32 = qty
                .trim()
                .parse()
                .with_context(|| format!("size mapping quantity in '{pair}' is not a number"))?;
            if qty == 0 {
                bail!("size mapping entry '{pair}' has zero contracts");
            }
            map.insert(letter.trim().to_ascii_uppercase(), qty);
        }
        if map.is_empty() {
            bail!("size mapping is empty");
        }
        Ok(Self(map))
    }

    pub fn resolve(&self, letter: &str) -> Result<u32, ValidationError> {
        self.0
            .get(&letter.trim().to_ascii_uppercase())
            .copied()
            .ok_or_else(|| ValidationError(letter.to_string()))
    }
}

impl Default for SizeMapping {
    fn default() -> Self {
        Self::new([("A", 1), ("B", 2), ("C", 3)])
    }
}

// ─── Trading ──────────────────────────────────────────────────────────────────

/// Contract spec and trading-mode switches.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    pub symbol:             String,
    pub tick_size:          f64,
    /// Dollar value applied per point of P&L per contract.
    pub tick_value:         f64,
    pub margin_requirement: f64,
    pub size_mapping:       SizeMapping,
    /// Master switch, `execute_alert` refuses everything when off.
    pub auto_trading:       bool,
    pub paper_enabled:      bool,
    pub live_enabled:       bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol:             "MES".to_string(),
            tick_size:          0.25,
            tick_value:         1.25,
            margin_requirement: 500.0,
            size_mapping:       SizeMapping::default(),
            auto_trading:       false,
            paper_enabled:      true,
            live_enabled:       false,
        }
    }
}

impl TradingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let size_mapping = match std::env::var("SIZE_MAPPING") {
            Ok(raw) => SizeMapping::parse(&raw).context("SIZE_MAPPING is invalid")?,
            Err(_) => d.size_mapping,
        };

        Ok(Self {
            symbol:             env_string("TRADING_SYMBOL", &d.symbol),
            tick_size:          env_parse("TICK_SIZE", d.tick_size),
            tick_value:         env_parse("TICK_VALUE", d.tick_value),
            margin_requirement: env_parse("MARGIN_REQUIREMENT", d.margin_requirement),
            size_mapping,
            auto_trading:       env_bool("AUTO_TRADING_ENABLED", d.auto_trading),
            paper_enabled:      env_bool("PAPER_TRADING_ENABLED", d.paper_enabled),
            live_enabled:       env_bool("LIVE_TRADING_ENABLED", d.live_enabled),
        })
    }
}

// ─── Paper Venue ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub starting_balance:        f64,
    pub realistic_slippage:      bool,
    pub slippage_ticks:          u32,
    pub commission_per_contract: f64,
    pub tick_size:               f64,
    pub tick_value:              f64,
    pub margin_requirement:      f64,
    pub initial_price:           f64,
    /// Drive the mark price with a random walk.  Defaults on unless a live
    /// bridge supplies quotes.
    pub simulate_prices:         bool,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance:        50_000.0,
            realistic_slippage:      true,
            slippage_ticks:          1,
            commission_per_contract: 2.50,
            tick_size:               0.25,
            tick_value:              1.25,
            margin_requirement:      500.0,
            initial_price:           6300.0,
            simulate_prices:         true,
        }
    }
}

impl PaperConfig {
    /// `live_feed`: a real broker bridge is enabled and will quote the market.
    pub fn from_env(trading: &TradingConfig, live_feed: bool) -> Self {
        let d = Self::default();
        Self {
            starting_balance:        env_parse("PAPER_STARTING_BALANCE", d.starting_balance),
            realistic_slippage:      env_bool("PAPER_REALISTIC_SLIPPAGE", d.realistic_slippage),
            slippage_ticks:          env_parse("PAPER_SLIPPAGE_TICKS", d.slippage_ticks),
            commission_per_contract: env_parse("PAPER_COMMISSION", d.commission_per_contract),
            tick_size:               trading.tick_size,
            tick_value:              trading.tick_value,
            margin_requirement:      trading.margin_requirement,
            initial_price:           env_parse("PAPER_INITIAL_PRICE", d.initial_price),
            simulate_prices:         env_bool("PAPER_SIMULATE_PRICES", !live_feed),
        }
    }
}

// ─── Live Venue ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Broker bridge base URL, or `"mock"` to simulate acceptance.
    pub base_url:        String,
    pub account_id:      String,
    pub symbol:          String,
    pub request_timeout: Duration,
}

impl LiveConfig {
    pub fn is_mock(&self) -> bool {
        self.base_url == "mock"
    }

    pub fn from_env(trading: &TradingConfig) -> Self {
        Self {
            base_url:        env_string("LIVE_BRIDGE_URL", "mock"),
            account_id:      env_string("LIVE_ACCOUNT_ID", ""),
            symbol:          trading.symbol.clone(),
            request_timeout: Duration::from_secs(env_parse("LIVE_REQUEST_TIMEOUT_SECS", 5)),
        }
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub monitor_interval:     Duration,
    /// Per-venue bound on one router dispatch.
    pub venue_timeout:        Duration,
    /// How long `shutdown` waits for the monitor task.
    pub shutdown_grace:       Duration,
    pub alert_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monitor_interval:     Duration::from_millis(1000),
            venue_timeout:        Duration::from_secs(10),
            shutdown_grace:       Duration::from_secs(5),
            alert_queue_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            monitor_interval:     Duration::from_millis(env_parse("MONITOR_INTERVAL_MS", 1000)),
            venue_timeout:        Duration::from_secs(env_parse("VENUE_TIMEOUT_SECS", 10)),
            shutdown_grace:       Duration::from_secs(env_parse("SHUTDOWN_GRACE_SECS", 5)),
            alert_queue_capacity: env_parse::<usize>("ALERT_QUEUE_CAPACITY", 64).max(1),
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub trading:   TradingConfig,
    pub paper:     PaperConfig,
    pub live:      LiveConfig,
    pub engine:    EngineConfig,
    pub risk:      RiskConfig,
    /// Ops API key; `None` = dev mode, every request allowed.
    pub api_key:   Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = env_string("BIND_ADDR", "0.0.0.0:3000")
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let trading = TradingConfig::from_env()?;
        if !trading.paper_enabled && !trading.live_enabled {
            tracing::warn!("⚠️ Both paper and live venues disabled — every order will fail");
        }

        let live      = LiveConfig::from_env(&trading);
        let live_feed = trading.live_enabled && !live.is_mock();
        let paper     = PaperConfig::from_env(&trading, live_feed);
        check_price_feed(&trading, &paper, &live)?;

        Ok(Self {
            bind_addr,
            paper,
            live,
            engine: EngineConfig::from_env(),
            risk:   RiskConfig::from_env(),
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.trim().is_empty()),
            trading,
        })
    }
}

/// The paper venue fills at its mark, so something has to move it: the
/// random walk or quotes routed in from a real live bridge.
pub fn check_price_feed(
    trading: &TradingConfig,
    paper: &PaperConfig,
    live: &LiveConfig,
) -> anyhow::Result<()> {
    let live_feed = trading.live_enabled && !live.is_mock();
    if trading.paper_enabled && !paper.simulate_prices && !live_feed {
        bail!(
            "paper venue has no price feed: set PAPER_SIMULATE_PRICES=true \
             or enable LIVE_TRADING_ENABLED with a real LIVE_BRIDGE_URL"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size_mapping() {
        let m = SizeMapping::default();
        assert_eq!(m.resolve("A"), Ok(1));
        assert_eq!(m.resolve("b"), Ok(2));
        assert_eq!(m.resolve(" C "), Ok(3));
    }

    #[test]
    fn test_unknown_letter_is_validation_error() {
        let m = SizeMapping::default();
        assert_eq!(m.resolve("Z"), Err(ValidationError("Z".into())));
    }

    #[test]
    fn test_parse_size_mapping() {
        let m = SizeMapping::parse("A:3, B:4 ,c:6").unwrap();
        assert_eq!(m.resolve("A"), Ok(3));
        assert_eq!(m.resolve("B"), Ok(4));
        assert_eq!(m.resolve("C"), Ok(6));
    }

    #[test]
    fn test_parse_size_mapping_rejects_garbage() {
        assert!(SizeMapping::parse("A=1").is_err());
        assert!(SizeMapping::parse("A:x").is_err());
        assert!(SizeMapping::parse("A:0").is_err());
        assert!(SizeMapping::parse("").is_err());
    }

    fn live(base_url: &str) -> LiveConfig {
        LiveConfig {
            base_url:        base_url.into(),
            account_id:      String::new(),
            symbol:          "MES".into(),
            request_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_frozen_paper_feed_is_rejected() {
        let paper_only = TradingConfig::default();
        let frozen = PaperConfig { simulate_prices: false, ..PaperConfig::default() };

        assert!(check_price_feed(&paper_only, &frozen, &live("mock")).is_err());
        assert!(check_price_feed(&paper_only, &PaperConfig::default(), &live("mock")).is_ok());

        // a mock bridge quotes nothing
        let with_live = TradingConfig { live_enabled: true, ..TradingConfig::default() };
        assert!(check_price_feed(&with_live, &frozen, &live("mock")).is_err());
        assert!(check_price_feed(&with_live, &frozen, &live("http://bridge:8080")).is_ok());

        let live_only = TradingConfig { paper_enabled: false, ..TradingConfig::default() };
        assert!(check_price_feed(&live_only, &frozen, &live("mock")).is_ok());
    }
}
