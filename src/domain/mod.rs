//! Domain layer: orders, items, lifecycle states and history.
//!
//! This module contains the order aggregate and its state machine. It
//! knows nothing about sessions or storage; the ledger persists what the
//! aggregate decides and the service layer checks who may ask.

pub mod history;
pub mod ids;
pub mod order;
pub mod order_item;
pub mod state;
mod validate;

pub use history::OrderStateChange;
pub use ids::{ItemId, ItemSlug, OrderId, OrderSlug};
pub use order::{NewOrder, Order};
pub use order_item::{ItemChanges, NewOrderItem, OrderItem};
pub use state::{OrderState, ParseOrderStateError, Transition};
