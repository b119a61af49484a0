//! Domain models shared across the entire TradeStream core.
//!
//! Nothing in here depends on `engine` or `venues`.

pub mod alert;
pub mod order;
pub mod position;

pub use alert::Alert;
pub use order::{OrderHandle, OrderSide, OrderType, VenueKind};
pub use position::{PositionStatus, TradePosition, TradeStatus};
