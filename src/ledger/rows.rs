//! Database rows for orders, items and state changes.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    ItemId, ItemSlug, NewOrder, Order, OrderId, OrderItem, OrderSlug, OrderState,
    OrderStateChange,
};
use crate::error::{OrderError, OrderResult};

/// Column list matching [`OrderRow`].
pub(super) const ORDER_COLUMNS: &str = "id, slug, coordinator, restaurant_name, restaurant_url, \
     state, created_at, preparation_expires_after_ms";

/// A row of the `orders` table.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct OrderRow {
    pub id: i64,
    pub slug: Uuid,
    pub coordinator: String,
    pub restaurant_name: String,
    pub restaurant_url: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub preparation_expires_after_ms: Option<i64>,
}

impl OrderRow {
    pub(super) fn into_order(
        self,
        items: Vec<OrderItem>,
        history: Vec<OrderStateChange>,
    ) -> OrderResult<Order> {
        let state: OrderState = self.state.parse()?;
        let input = NewOrder {
            coordinator: self.coordinator,
            restaurant_name: self.restaurant_name,
            restaurant_url: self.restaurant_url,
            preparation_expires_after: self.preparation_expires_after_ms.map(Duration::milliseconds),
        };
        Ok(Order::create(
            OrderId(self.id),
            OrderSlug::from_uuid(self.slug),
            input,
            self.created_at,
        )
        .restored(state, items, history))
    }
}

/// A row of the `order_items` table.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct ItemRow {
    pub id: i64,
    pub order_id: i64,
    pub slug: Uuid,
    pub participant: String,
    pub description: String,
    pub price: Decimal,
    pub amount: i32,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = OrderError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let amount = u32::try_from(row.amount)
            .map_err(|_| OrderError::Ledger(format!("invalid amount {} in item {}", row.amount, row.id)))?;
        Ok(Self {
            id: ItemId(row.id),
            order_id: OrderId(row.order_id),
            slug: ItemSlug::from_uuid(row.slug),
            participant: row.participant,
            description: row.description,
            price: row.price,
            amount,
        })
    }
}

/// A row of the `order_state_changes` table.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct StateChangeRow {
    pub order_id: i64,
    pub created_at: DateTime<Utc>,
    pub old_state: String,
    pub new_state: String,
    pub reason: Option<String>,
}

impl TryFrom<StateChangeRow> for OrderStateChange {
    type Error = OrderError;

    fn try_from(row: StateChangeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            order_id: OrderId(row.order_id),
            created_at: row.created_at,
            old_state: row.old_state.parse()?,
            new_state: row.new_state.parse()?,
            reason: row.reason,
        })
    }
}

/// Converts a duration into the stored millisecond count.
pub(super) fn expiry_millis(expires_after: Option<Duration>) -> Option<i64> {
    expires_after.map(|duration| duration.num_milliseconds())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn order_row_restores_state_and_expiry() {
        let row = OrderRow {
            id: 7,
            slug: Uuid::new_v4(),
            coordinator: "Bernd".to_string(),
            restaurant_name: "Hallo Pizza".to_string(),
            restaurant_url: None,
            state: "ordered".to_string(),
            created_at: Utc::now(),
            preparation_expires_after_ms: Some(600_000),
        };
        let Ok(order) = row.into_order(Vec::new(), Vec::new()) else {
            panic!("row should convert");
        };
        assert_eq!(order.id(), OrderId(7));
        assert!(order.is_ordered());
        assert_eq!(order.preparation_expires_after(), Some(Duration::minutes(10)));
    }

    #[test]
    fn unknown_state_is_a_ledger_error() {
        let row = StateChangeRow {
            order_id: 1,
            created_at: Utc::now(),
            old_state: "preparing".to_string(),
            new_state: "eaten".to_string(),
            reason: None,
        };
        assert!(matches!(
            OrderStateChange::try_from(row),
            Err(OrderError::Ledger(_))
        ));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let row = ItemRow {
            id: 1,
            order_id: 1,
            slug: Uuid::new_v4(),
            participant: "Kevin".to_string(),
            description: "Salami".to_string(),
            price: Decimal::new(720, 2),
            amount: -1,
        };
        assert!(OrderItem::try_from(row).is_err());
    }
}
