//! Order ledger: durable storage for orders, items and history.
//!
//! Every mutating operation is one atomic unit: the implementation locks
//! the order, re-reads its current state, lets the [`Order`] aggregate
//! validate and apply the change, and persists the new state together
//! with any history entry. A rejected operation writes nothing.
//!
//! Two implementations are provided:
//! - [`InMemoryLedger`]: per-order `RwLock`, for tests and ephemeral runs.
//! - [`PostgresLedger`]: `sqlx` transactions with `SELECT ... FOR UPDATE`.

pub mod memory;
pub mod postgres;
mod rows;

use chrono::{DateTime, Utc};

use crate::domain::{
    ItemChanges, ItemSlug, NewOrder, NewOrderItem, Order, OrderId, OrderItem, OrderSlug,
    OrderStateChange, Transition,
};
use crate::error::OrderResult;

pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;

/// Storage abstraction for orders and everything they own.
///
/// Uniqueness invariants enforced by every implementation:
/// - order slugs are unique;
/// - item slugs are unique within an order;
/// - `(order, participant, description)` is unique.
///
/// Deleting an order (outside this trait) cascades to its items and
/// history.
pub trait OrderLedger: Send + Sync {
    /// Validates `input` and stores a new order in state `preparing`
    /// with a fresh random slug.
    fn create_order(&self, input: NewOrder) -> impl Future<Output = OrderResult<Order>> + Send;

    /// Loads an order with its items and history by slug.
    fn order_by_slug(&self, slug: OrderSlug) -> impl Future<Output = OrderResult<Order>> + Send;

    /// Loads an order with its items and history by internal id.
    fn order_by_id(&self, id: OrderId) -> impl Future<Output = OrderResult<Order>> + Send;

    /// Returns all orders, most recent history activity first, ties broken
    /// by id (newest first).
    fn list_orders(&self) -> impl Future<Output = OrderResult<Vec<Order>>> + Send;

    /// Applies a state transition and appends its history entry.
    ///
    /// `reason` is required for [`Transition::Cancel`] and ignored
    /// otherwise.
    fn transition(
        &self,
        slug: OrderSlug,
        transition: Transition,
        reason: Option<String>,
    ) -> impl Future<Output = OrderResult<Order>> + Send;

    /// Returns the slugs of preparing orders whose preparation time expired
    /// at `now`, without loading their items or history.
    fn expired_preparations(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = OrderResult<Vec<OrderSlug>>> + Send;

    /// Moves the order to `ordering` if it is still preparing and its
    /// preparation time expired at `now`.
    fn begin_ordering_if_expired(
        &self,
        slug: OrderSlug,
        now: DateTime<Utc>,
    ) -> impl Future<Output = OrderResult<Option<OrderStateChange>>> + Send;

    /// Adds an item to a preparing order.
    fn add_item(
        &self,
        slug: OrderSlug,
        input: NewOrderItem,
    ) -> impl Future<Output = OrderResult<OrderItem>> + Send;

    /// Changes an item of a preparing order.
    fn update_item(
        &self,
        slug: OrderSlug,
        item: ItemSlug,
        changes: ItemChanges,
    ) -> impl Future<Output = OrderResult<OrderItem>> + Send;

    /// Deletes an item of a preparing order.
    fn delete_item(
        &self,
        slug: OrderSlug,
        item: ItemSlug,
    ) -> impl Future<Output = OrderResult<()>> + Send;
}

/// Sorts orders by latest activity, newest first, then by id descending.
pub(crate) fn sort_by_recent_activity(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.last_activity()
            .cmp(&a.last_activity())
            .then_with(|| b.id().cmp(&a.id()))
    });
}
