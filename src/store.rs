//! # store: Position snapshots
//!
//! A full [`TradePosition`] snapshot is recorded at every transition.  The
//! format is owned by the store; the engine only needs `record` and, at
//! startup, `recoverable` (positions that were still being monitored) and
//! `touched_since` (today's positions, to rebuild the daily counters).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::TradePosition;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn record(&self, position: &TradePosition) -> anyhow::Result<()>;

    /// Latest snapshot of every position the monitor should resume.
    async fn recoverable(&self) -> anyhow::Result<Vec<TradePosition>>;

    /// Latest snapshot of every position recorded at or after `since`.
    async fn touched_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<TradePosition>>;
}

// ─── InMemorySnapshotStore ────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemorySnapshotStore {
    history: RwLock<Vec<TradePosition>>,
    latest:  RwLock<HashMap<Uuid, TradePosition>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot of `id`, oldest first.
    pub async fn history(&self, id: Uuid) -> Vec<TradePosition> {
        self.history
            .read()
            .await
            .iter()
            .filter(|p| p.id == id)
            .cloned()
            .collect()
    }

    pub async fn latest(&self, id: Uuid) -> Option<TradePosition> {
        self.latest.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn record(&self, position: &TradePosition) -> anyhow::Result<()> {
        self.history.write().await.push(position.clone());
        self.latest.write().await.insert(position.id, position.clone());
        Ok(())
    }

    async fn recoverable(&self) -> anyhow::Result<Vec<TradePosition>> {
        Ok(self
            .latest
            .read()
            .await
            .values()
            .filter(|p| p.is_monitorable())
            .cloned()
            .collect())
    }

    async fn touched_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<TradePosition>> {
        Ok(self
            .latest
            .read()
            .await
            .values()
            .filter(|p| p.updated_at >= since)
            .cloned()
            .collect())
    }
}
