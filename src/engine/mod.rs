//! Position & order lifecycle engine.
//!
//! Leaves first: [`router`] fans orders out to venues, [`lifecycle`] holds
//! the per-position state machine, [`ledger`] the active registry,
//! [`monitor`] the price loop, [`executor`] the facade and [`intake`] the
//! bounded alert queue in front of it.

pub mod executor;
pub mod intake;
pub mod ledger;
pub mod lifecycle;
pub mod monitor;
pub mod router;

pub use executor::TradeExecutor;
pub use intake::{AlertSender, IntakeError};
pub use lifecycle::{PositionStateMachine, TickOutcome};
pub use monitor::{PriceMonitor, TickReport};
pub use router::{OrderAction, OrderConfirmation, OrderRouter, RouteError};
