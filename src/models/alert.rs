//! # models::alert
//!
//! Defines [`Alert`]: the validated trade signal handed over by the parsing
//! layer.  The execution core never parses raw messages; it only ever sees
//! this struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated long-entry signal.
///
/// Upstream guarantees `target2 > target1 > price > stop`; the intake route
/// still calls [`Alert::is_well_formed`] before queueing so a malformed POST is
/// answered with a 400 instead of reaching the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Identifier assigned by the signal store.
    pub alert_id: u64,

    /// Where the signal came from (channel / author / feed name).
    #[serde(default)]
    pub source_id: String,

    /// Intended entry price.
    pub price: f64,

    /// Initial protective stop.
    pub stop: f64,

    /// First profit target, half the position exits here.
    pub target1: f64,

    /// Final profit target, the remainder exits here.
    pub target2: f64,

    /// Size letter, resolved to a contract count by the size mapping.
    pub size: String,

    /// When the signal was produced.
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Returns `true` when the price ladder is ordered
    /// `stop < price < target1 < target2`.
    pub fn is_well_formed(&self) -> bool {
        let finite = [self.price, self.stop, self.target1, self.target2]
            .iter()
            .all(|p| p.is_finite());

        finite && self.target2 > self.target1 && self.target1 > self.price && self.price > self.stop
    }

    /// Distance from entry to stop, in price points.
    #[inline]
    pub fn risk_points(&self) -> f64 {
        self.price - self.stop
    }
}
