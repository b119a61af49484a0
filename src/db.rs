//! # db: PostgreSQL snapshot store
//!
//! Enabled with `--features postgres`.  One row per snapshot; the full
//! position goes into a JSONB column so the schema never chases the struct.
//!
//! ## Setup
//! 1. Create the database
//! 2. Set `DATABASE_URL` in `.env`
//! 3. Start the binary, the table is created on first connect

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgPool, Row,
};
use tracing::info;

use crate::models::TradePosition;
use crate::store::SnapshotStore;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS position_snapshots (
    seq           BIGSERIAL PRIMARY KEY,
    position_id   UUID        NOT NULL,
    alert_id      BIGINT      NOT NULL,
    trade_status  TEXT        NOT NULL,
    current_qty   INTEGER     NOT NULL,
    realized_pnl  DOUBLE PRECISION NOT NULL,
    snapshot      JSONB       NOT NULL,
    recorded_at   TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_position_snapshots_pos
    ON position_snapshots (position_id, seq DESC)
"#;

// ─── Pool Init ────────────────────────────────────────────────────────────────

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    for statement in [CREATE_TABLE, CREATE_INDEX] {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .context("Failed to create position_snapshots")?;
    }

    info!("✅ PostgreSQL connected and schema ready");
    Ok(pool)
}

// ─── PgSnapshotStore ──────────────────────────────────────────────────────────

pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn record(&self, position: &TradePosition) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO position_snapshots
              (position_id, alert_id, trade_status, current_qty, realized_pnl, snapshot)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(position.id)
        .bind(position.alert_id as i64)
        .bind(position.trade_status.as_str())
        .bind(position.current_quantity as i32)
        .bind(position.realized_pnl)
        .bind(Json(position))
        .execute(&self.pool)
        .await
        .context("insert position snapshot failed")?;

        Ok(())
    }

    async fn recoverable(&self) -> anyhow::Result<Vec<TradePosition>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (position_id) snapshot
            FROM position_snapshots
            ORDER BY position_id, seq DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("load latest snapshots failed")?;

        Ok(decode_snapshots(rows)?
            .into_iter()
            .filter(TradePosition::is_monitorable)
            .collect())
    }

    async fn touched_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<TradePosition>> {
        // rows after `since` include each position's newest row
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (position_id) snapshot
            FROM position_snapshots
            WHERE recorded_at >= $1
            ORDER BY position_id, seq DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("load today's snapshots failed")?;

        decode_snapshots(rows)
    }
}

fn decode_snapshots(rows: Vec<PgRow>) -> anyhow::Result<Vec<TradePosition>> {
    rows.into_iter()
        .map(|row| {
            let Json(position): Json<TradePosition> =
                row.try_get("snapshot").context("snapshot column unreadable")?;
            Ok(position)
        })
        .collect()
}
