//! # TradeStream: position & order lifecycle engine
//!
//! Takes validated alerts, gates them through pre-trade risk, enters on a
//! paper and/or live venue, then walks each position through a half exit
//! at target 1, a breakeven stop, and a final exit at target 2 or the stop.
//!
//! Layering, leaves first:
//!
//! ```text
//!  models ─▶ venues ─▶ engine::router ─▶ engine::lifecycle ─▶ engine::monitor
//!                                             │                    │
//!  risk ───────────────────────────────▶ engine::executor ◀────────┘
//!                                             ▲
//!  routes ─▶ engine::intake (bounded queue) ──┘
//! ```

pub mod auth;
pub mod config;
#[cfg(feature = "postgres")]
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod risk;
pub mod routes;
pub mod state;
pub mod store;
pub mod venues;
