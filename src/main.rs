//! # TradeStream: Position & Order Lifecycle Engine
//!
//! ```text
//!  ┌─────────────┐  POST /api/alerts   ┌──────────────┐  mpsc  ┌──────────────────┐
//!  │ Signal      │ ──────────────────▶ │ Ops API      │ ─────▶ │ TradeExecutor    │
//!  │ parser      │                     │ (axum)       │        │ ├─ RiskManager 🛡️│
//!  └─────────────┘                     └──────────────┘        │ ├─ OrderRouter   │──▶ PAPER
//!                                            ▲                 │ ├─ PriceMonitor  │──▶ LIVE
//!  ┌─────────────┐  ws://host/ws/monitor     │                 │ └─ EventBus ─────┼─┐
//!  │ Dashboard   │ ◀─────────────────────────┴─────────────────┴──────────────────┘ │
//!  └─────────────┘ ◀────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable               | Default        | Description                     |
//! |------------------------|----------------|---------------------------------|
//! | `BIND_ADDR`            | `0.0.0.0:3000` | Ops API address                 |
//! | `AUTO_TRADING_ENABLED` | `false`        | Master switch                   |
//! | `LIVE_BRIDGE_URL`      | `mock`         | Broker bridge for the live venue|
//! | `RUST_LOG`             | `tradestream=debug` | Tracing filter             |
//!
//! The full list lives in `config.rs` and `risk.rs`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tradestream::{
    config::AppConfig,
    engine::{intake, OrderRouter, TradeExecutor},
    events::EventBus,
    risk::RiskManager,
    routes::build_router,
    state::AppState,
    store::{InMemorySnapshotStore, SnapshotStore},
    venues::{LiveVenue, PaperVenue},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("tradestream=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║          TRADESTREAM — Position Lifecycle Engine      ║
  ║   Paper · Live · T1/T2 · Breakeven · Risk Gate        ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = AppConfig::from_env()?;
    info!(
        symbol       = %config.trading.symbol,
        paper        = config.trading.paper_enabled,
        live         = config.trading.live_enabled,
        auto_trading = config.trading.auto_trading,
        paper_sim    = config.paper.simulate_prices,
        "⚙️ Configuration loaded"
    );

    // ── 4. Venues + router ────────────────────────────────────────────────────
    let http_client = reqwest::Client::builder()
        .timeout(config.live.request_timeout)
        .build()?;
    let paper = Arc::new(PaperVenue::new(config.paper.clone()));
    let live  = Arc::new(LiveVenue::new(config.live.clone(), http_client));

    let router = Arc::new(
        OrderRouter::new(config.engine.venue_timeout)
            .with_venue(paper.clone(), config.trading.paper_enabled)
            .with_venue(live, config.trading.live_enabled),
    );

    // ── 5. Engine ─────────────────────────────────────────────────────────────
    let risk   = Arc::new(RiskManager::new(config.risk.clone()));
    let events = EventBus::new();
    let store  = build_store().await?;

    let executor = Arc::new(TradeExecutor::new(
        router,
        risk.clone(),
        store,
        events.clone(),
        &config.trading,
        config.engine.clone(),
    ));
    let recovered = executor.initialize().await?;
    if recovered > 0 {
        info!(recovered, "♻️ Resuming monitored positions");
    }

    let (alerts, alert_rx) = intake::channel(config.engine.alert_queue_capacity);
    intake::spawn_intake(executor.clone(), alert_rx);

    let (sim_stop, sim_rx) = watch::channel(false);
    if config.paper.simulate_prices {
        paper.clone().spawn_price_simulation(config.engine.monitor_interval, sim_rx);
    }

    // ── 6. Ops API ────────────────────────────────────────────────────────────
    let state = Arc::new(AppState {
        executor:   executor.clone(),
        alerts,
        risk,
        events,
        paper:      config.trading.paper_enabled.then_some(paper),
        api_key:    config.api_key.clone(),
        started_at: chrono::Utc::now(),
    });
    if state.api_key.is_none() {
        warn!("🔓 API_KEY not set — ops API is open (dev mode)");
    }
    let app = build_router(state);

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    info!(addr = ?config.bind_addr, "🚀 TradeStream server starting");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 8. Shutdown ───────────────────────────────────────────────────────────
    let _ = sim_stop.send(true);
    executor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler failed; shutting down");
    }
    info!("🛑 Shutdown signal received");
}

#[cfg(feature = "postgres")]
async fn build_store() -> anyhow::Result<Arc<dyn SnapshotStore>> {
    use anyhow::Context;
    use tradestream::db::{init_pool, PgSnapshotStore};

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = init_pool(&url).await.context("snapshot store unavailable")?;
            Ok(Arc::new(PgSnapshotStore::new(pool)))
        }
        Err(_) => {
            warn!("DATABASE_URL not set — snapshots kept in memory only");
            Ok(Arc::new(InMemorySnapshotStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_store() -> anyhow::Result<Arc<dyn SnapshotStore>> {
    info!("💾 Snapshots kept in memory (build with --features postgres to persist)");
    Ok(Arc::new(InMemorySnapshotStore::new()))
}
