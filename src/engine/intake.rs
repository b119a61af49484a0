//! # engine::intake
//!
//! Bounded queue between alert ingestion and [`TradeExecutor::execute_alert`].
//!
//! Producers (the HTTP handler, any in-process parser) get an
//! [`AlertSender`]; one consumer task drains the queue and executes alerts
//! one at a time.  A full queue is refused immediately.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::executor::TradeExecutor;
use crate::models::Alert;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntakeError {
    #[error("alert queue is full")]
    QueueFull,

    #[error("alert intake has stopped")]
    Closed,
}

#[derive(Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<Alert>,
}

impl AlertSender {
    /// Enqueues without waiting.
    pub fn submit(&self, alert: Alert) -> Result<(), IntakeError> {
        self.tx.try_send(alert).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_)   => IntakeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IntakeError::Closed,
        })
    }

    /// Free slots left in the queue.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

pub fn channel(capacity: usize) -> (AlertSender, mpsc::Receiver<Alert>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (AlertSender { tx }, rx)
}

/// Drains `rx` into the executor until every sender is gone.
pub fn spawn_intake(executor: Arc<TradeExecutor>, mut rx: mpsc::Receiver<Alert>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("📥 Alert intake started");
        while let Some(alert) = rx.recv().await {
            debug!(alert_id = alert.alert_id, size = %alert.size, "Alert dequeued");
            let accepted = executor.execute_alert(&alert).await;
            info!(alert_id = alert.alert_id, accepted, "📥 Alert processed");
        }
        info!("📥 Alert intake stopped");
    })
}
