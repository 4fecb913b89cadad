//! In-memory ledger with per-order fine-grained locking.
//!
//! [`InMemoryLedger`] stores all orders in a `HashMap` where each entry
//! is individually protected by a [`tokio::sync::RwLock`]. Mutations hold
//! the order's write lock for the whole read-validate-write cycle, so two
//! concurrent requests can never both move the same order out of a state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{OrderLedger, sort_by_recent_activity};
use crate::domain::history::timestamp_now;
use crate::domain::{
    ItemChanges, ItemId, ItemSlug, NewOrder, NewOrderItem, Order, OrderId, OrderItem, OrderSlug,
    OrderStateChange, Transition,
};
use crate::error::{OrderError, OrderResult};

/// Volatile [`OrderLedger`] backed by process memory.
///
/// # Concurrency
///
/// - Reads of the same order run concurrently.
/// - Mutations of different orders run concurrently.
/// - Mutations of the same order are serialized.
#[derive(Debug)]
pub struct InMemoryLedger {
    orders: RwLock<HashMap<OrderSlug, Arc<RwLock<Order>>>>,
    next_order_id: AtomicI64,
    next_item_id: AtomicI64,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            next_order_id: AtomicI64::new(1),
            next_item_id: AtomicI64::new(1),
        }
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns `true` if no order is stored.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    async fn entry(&self, slug: OrderSlug) -> OrderResult<Arc<RwLock<Order>>> {
        let map = self.orders.read().await;
        map.get(&slug)
            .cloned()
            .ok_or_else(|| OrderError::OrderNotFound(slug.to_string()))
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderLedger for InMemoryLedger {
    async fn create_order(&self, input: NewOrder) -> OrderResult<Order> {
        let input = input.validated()?;
        let id = OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let slug = OrderSlug::new();
        let order = Order::create(id, slug, input, timestamp_now());

        let mut map = self.orders.write().await;
        if map.contains_key(&slug) {
            return Err(OrderError::SlugCollision(slug.to_string()));
        }
        map.insert(slug, Arc::new(RwLock::new(order.clone())));
        Ok(order)
    }

    async fn order_by_slug(&self, slug: OrderSlug) -> OrderResult<Order> {
        let entry = self.entry(slug).await?;
        let order = entry.read().await;
        Ok(order.clone())
    }

    async fn order_by_id(&self, id: OrderId) -> OrderResult<Order> {
        let map = self.orders.read().await;
        for entry in map.values() {
            let order = entry.read().await;
            if order.id() == id {
                return Ok(order.clone());
            }
        }
        Err(OrderError::OrderNotFound(id.to_string()))
    }

    async fn list_orders(&self) -> OrderResult<Vec<Order>> {
        let map = self.orders.read().await;
        let mut orders = Vec::with_capacity(map.len());
        for entry in map.values() {
            orders.push(entry.read().await.clone());
        }
        sort_by_recent_activity(&mut orders);
        Ok(orders)
    }

    async fn transition(
        &self,
        slug: OrderSlug,
        transition: Transition,
        reason: Option<String>,
    ) -> OrderResult<Order> {
        let entry = self.entry(slug).await?;
        let mut order = entry.write().await;
        order.transition(transition, reason.as_deref())?;
        Ok(order.clone())
    }

    async fn expired_preparations(&self, now: DateTime<Utc>) -> OrderResult<Vec<OrderSlug>> {
        let map = self.orders.read().await;
        let mut expired = Vec::new();
        for (slug, entry) in map.iter() {
            let order = entry.read().await;
            if order.is_preparing() && order.is_preparation_time_expired(now) {
                expired.push(*slug);
            }
        }
        Ok(expired)
    }

    async fn begin_ordering_if_expired(
        &self,
        slug: OrderSlug,
        now: DateTime<Utc>,
    ) -> OrderResult<Option<OrderStateChange>> {
        let entry = self.entry(slug).await?;
        let mut order = entry.write().await;
        order.begin_ordering_if_expired(now)
    }

    async fn add_item(&self, slug: OrderSlug, input: NewOrderItem) -> OrderResult<OrderItem> {
        let entry = self.entry(slug).await?;
        let mut order = entry.write().await;
        let id = ItemId(self.next_item_id.fetch_add(1, Ordering::Relaxed));
        order.add_item(id, ItemSlug::new(), input)
    }

    async fn update_item(
        &self,
        slug: OrderSlug,
        item: ItemSlug,
        changes: ItemChanges,
    ) -> OrderResult<OrderItem> {
        let entry = self.entry(slug).await?;
        let mut order = entry.write().await;
        order.update_item(item, changes)
    }

    async fn delete_item(&self, slug: OrderSlug, item: ItemSlug) -> OrderResult<()> {
        let entry = self.entry(slug).await?;
        let mut order = entry.write().await;
        order.remove_item(item).map(|_| ())
    }
}
