//! PostgreSQL implementation of the order ledger.
//!
//! Each mutation runs in its own transaction and starts by locking the
//! order row with `SELECT ... FOR UPDATE`, so concurrent requests against
//! the same order are serialized by the database. Uniqueness invariants
//! are backed by unique indexes (see `migrations/`).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};

use super::rows::{ItemRow, ORDER_COLUMNS, OrderRow, StateChangeRow, expiry_millis};
use super::OrderLedger;
use crate::config::OrdersConfig;
use crate::domain::history::timestamp_now;
use crate::domain::{
    ItemChanges, ItemSlug, NewOrder, NewOrderItem, Order, OrderId, OrderItem, OrderSlug,
    OrderState, OrderStateChange, Transition,
};
use crate::error::{OrderError, OrderResult};

const ORDER_SLUG_KEY: &str = "orders_slug_key";
const ITEM_LINE_KEY: &str = "order_items_line_key";

/// How an order row is looked up.
#[derive(Debug, Clone, Copy)]
enum OrderKey {
    Slug(OrderSlug),
    Id(OrderId),
}

impl OrderKey {
    fn not_found(self) -> OrderError {
        match self {
            Self::Slug(slug) => OrderError::OrderNotFound(slug.to_string()),
            Self::Id(id) => OrderError::OrderNotFound(id.to_string()),
        }
    }
}

/// PostgreSQL-backed ledger using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a ledger on top of an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool using the database settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Ledger`] if the database is unreachable.
    pub async fn connect(config: &OrdersConfig) -> OrderResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to order ledger database"
        );
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Ledger`] if a migration fails.
    pub async fn migrate(&self) -> OrderResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OrderError::Ledger(e.to_string()))
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Loads one order with its items and history, optionally locking its row
/// until the surrounding transaction ends.
async fn fetch_order(conn: &mut PgConnection, key: OrderKey, lock: bool) -> OrderResult<Order> {
    let column = match key {
        OrderKey::Slug(_) => "slug",
        OrderKey::Id(_) => "id",
    };
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let query = sqlx::query_as::<_, OrderRow>(&sql);
    let row = match key {
        OrderKey::Slug(slug) => query.bind(*slug.as_uuid()),
        OrderKey::Id(id) => query.bind(id.0),
    }
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| key.not_found())?;

    let mut orders = assemble(conn, vec![row]).await?;
    orders.pop().ok_or_else(|| key.not_found())
}

/// Attaches items and history to order rows, preserving row order.
async fn assemble(conn: &mut PgConnection, rows: Vec<OrderRow>) -> OrderResult<Vec<Order>> {
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();

    let item_rows = sqlx::query_as::<_, ItemRow>(
        "SELECT id, order_id, slug, participant, description, price, amount \
         FROM order_items WHERE order_id = ANY($1) ORDER BY id ASC",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let history_rows = sqlx::query_as::<_, StateChangeRow>(
        "SELECT order_id, created_at, old_state, new_state, reason \
         FROM order_state_changes WHERE order_id = ANY($1) ORDER BY created_at ASC, id ASC",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    for row in item_rows {
        items.entry(row.order_id).or_default().push(row.try_into()?);
    }
    let mut history: HashMap<i64, Vec<OrderStateChange>> = HashMap::new();
    for row in history_rows {
        history.entry(row.order_id).or_default().push(row.try_into()?);
    }

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            row.into_order(
                items.remove(&id).unwrap_or_default(),
                history.remove(&id).unwrap_or_default(),
            )
        })
        .collect()
}

/// Writes the order's new state and the matching history entry.
async fn persist_transition(
    conn: &mut PgConnection,
    order: &Order,
    change: &OrderStateChange,
) -> OrderResult<()> {
    sqlx::query("UPDATE orders SET state = $1 WHERE id = $2")
        .bind(order.state().as_str())
        .bind(order.id().0)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO order_state_changes (order_id, created_at, old_state, new_state, reason) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(change.order_id.0)
    .bind(change.created_at)
    .bind(change.old_state.as_str())
    .bind(change.new_state.as_str())
    .bind(change.reason.as_deref())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Returns the violated constraint name if `err` is a unique violation.
fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

/// Amounts were bounded by validation; a failure here is a bug.
fn amount_column(amount: u32) -> OrderResult<i32> {
    i32::try_from(amount)
        .map_err(|_| OrderError::Ledger(format!("amount {amount} exceeds the amount column")))
}

impl OrderLedger for PostgresLedger {
    async fn create_order(&self, input: NewOrder) -> OrderResult<Order> {
        let input = input.validated()?;
        let slug = OrderSlug::new();
        let created_at = timestamp_now();

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO orders (slug, coordinator, restaurant_name, restaurant_url, state, \
             created_at, preparation_expires_after_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(*slug.as_uuid())
        .bind(&input.coordinator)
        .bind(&input.restaurant_name)
        .bind(input.restaurant_url.as_deref())
        .bind(OrderState::Preparing.as_str())
        .bind(created_at)
        .bind(expiry_millis(input.preparation_expires_after))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(ORDER_SLUG_KEY) => OrderError::SlugCollision(slug.to_string()),
            _ => OrderError::from(e),
        })?;

        tracing::debug!(%slug, id, "order row inserted");
        Ok(Order::create(OrderId(id), slug, input, created_at))
    }

    async fn order_by_slug(&self, slug: OrderSlug) -> OrderResult<Order> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, OrderKey::Slug(slug), false).await
    }

    async fn order_by_id(&self, id: OrderId) -> OrderResult<Order> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, OrderKey::Id(id), false).await
    }

    async fn list_orders(&self) -> OrderResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o \
             ORDER BY COALESCE((SELECT MAX(h.created_at) FROM order_state_changes h \
             WHERE h.order_id = o.id), o.created_at) DESC, o.id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .fetch_all(&mut *conn)
            .await?;
        assemble(&mut conn, rows).await
    }

    async fn transition(
        &self,
        slug: OrderSlug,
        transition: Transition,
        reason: Option<String>,
    ) -> OrderResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = fetch_order(&mut tx, OrderKey::Slug(slug), true).await?;
        let change = order.transition(transition, reason.as_deref())?;
        persist_transition(&mut tx, &order, &change).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn expired_preparations(&self, now: DateTime<Utc>) -> OrderResult<Vec<OrderSlug>> {
        let slugs = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT slug FROM orders \
             WHERE state = $1 AND preparation_expires_after_ms IS NOT NULL \
             AND created_at + preparation_expires_after_ms * INTERVAL '1 millisecond' < $2 \
             ORDER BY id ASC",
        )
        .bind(OrderState::Preparing.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(slugs.into_iter().map(OrderSlug::from_uuid).collect())
    }

    async fn begin_ordering_if_expired(
        &self,
        slug: OrderSlug,
        now: DateTime<Utc>,
    ) -> OrderResult<Option<OrderStateChange>> {
        let mut tx = self.pool.begin().await?;
        let mut order = fetch_order(&mut tx, OrderKey::Slug(slug), true).await?;
        let Some(change) = order.begin_ordering_if_expired(now)? else {
            return Ok(None);
        };
        persist_transition(&mut tx, &order, &change).await?;
        tx.commit().await?;
        Ok(Some(change))
    }

    async fn add_item(&self, slug: OrderSlug, input: NewOrderItem) -> OrderResult<OrderItem> {
        let mut tx = self.pool.begin().await?;
        let order = fetch_order(&mut tx, OrderKey::Slug(slug), true).await?;
        let input = order.check_new_item(input)?;
        let item_slug = ItemSlug::new();

        let row = sqlx::query_as::<_, ItemRow>(
            "INSERT INTO order_items (order_id, slug, participant, description, price, amount) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, order_id, slug, participant, description, price, amount",
        )
        .bind(order.id().0)
        .bind(*item_slug.as_uuid())
        .bind(&input.participant)
        .bind(&input.description)
        .bind(input.price)
        .bind(amount_column(input.amount)?)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(ITEM_LINE_KEY) => OrderError::DuplicateItem {
                participant: input.participant.clone(),
                description: input.description.clone(),
            },
            Some(_) => OrderError::SlugCollision(item_slug.to_string()),
            None => OrderError::from(e),
        })?;

        tx.commit().await?;
        row.try_into()
    }

    async fn update_item(
        &self,
        slug: OrderSlug,
        item: ItemSlug,
        changes: ItemChanges,
    ) -> OrderResult<OrderItem> {
        let mut tx = self.pool.begin().await?;
        let mut order = fetch_order(&mut tx, OrderKey::Slug(slug), true).await?;
        let updated = order.update_item(item, changes)?;

        sqlx::query(
            "UPDATE order_items SET description = $1, price = $2, amount = $3 WHERE id = $4",
        )
        .bind(&updated.description)
        .bind(updated.price)
        .bind(amount_column(updated.amount)?)
        .bind(updated.id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(ITEM_LINE_KEY) => OrderError::DuplicateItem {
                participant: updated.participant.clone(),
                description: updated.description.clone(),
            },
            _ => OrderError::from(e),
        })?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_item(&self, slug: OrderSlug, item: ItemSlug) -> OrderResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut order = fetch_order(&mut tx, OrderKey::Slug(slug), true).await?;
        let removed = order.remove_item(item)?;

        sqlx::query("DELETE FROM order_items WHERE id = $1")
            .bind(removed.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::*;

    async fn create(ledger: &PostgresLedger, input: NewOrder) -> Order {
        let Ok(order) = ledger.create_order(input).await else {
            panic!("order creation failed");
        };
        order
    }

    async fn raw_item(pool: &PgPool, order: OrderId, slug: uuid::Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO order_items (order_id, slug, participant, description, price, amount) \
             VALUES ($1, $2, 'Kevin', 'Pizza Salami', 7.20, 1)",
        )
        .bind(order.0)
        .bind(slug)
        .execute(pool)
        .await
        .map(|_| ())
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL server at DATABASE_URL"]
    async fn constraint_names_match_schema(pool: PgPool) {
        let ledger = PostgresLedger::new(pool.clone());
        let order = create(&ledger, NewOrder::new("Bernd", "Hallo Pizza")).await;

        assert!(raw_item(&pool, order.id(), uuid::Uuid::new_v4()).await.is_ok());
        let Err(err) = raw_item(&pool, order.id(), uuid::Uuid::new_v4()).await else {
            panic!("second identical line should violate the line key");
        };
        assert_eq!(unique_violation(&err).as_deref(), Some(ITEM_LINE_KEY));

        let Err(err) = sqlx::query(
            "INSERT INTO orders (slug, coordinator, restaurant_name) VALUES ($1, 'Kevin', 'Sushi')",
        )
        .bind(*order.slug().as_uuid())
        .execute(&pool)
        .await
        else {
            panic!("reused slug should violate the slug key");
        };
        assert_eq!(unique_violation(&err).as_deref(), Some(ORDER_SLUG_KEY));
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL server at DATABASE_URL"]
    async fn returned_order_matches_reloaded(pool: PgPool) {
        let ledger = PostgresLedger::new(pool);
        let input = NewOrder::new("Bernd", "Hallo Pizza")
            .with_restaurant_url("https://hallo-pizza.example")
            .with_preparation_expiry(Duration::minutes(10));
        let created = create(&ledger, input).await;

        let Ok(reloaded) = ledger.order_by_slug(created.slug()).await else {
            panic!("order should exist");
        };
        assert_eq!(reloaded, created);

        let item = NewOrderItem::new("Kevin", "Pizza Salami", Decimal::new(72, 1)).with_amount(2);
        assert!(ledger.add_item(created.slug(), item).await.is_ok());
        let Ok(ordering) = ledger
            .transition(created.slug(), Transition::BeginOrdering, None)
            .await
        else {
            panic!("transition should succeed");
        };

        let Ok(reloaded) = ledger.order_by_id(created.id()).await else {
            panic!("order should exist");
        };
        assert_eq!(reloaded, ordering);
        assert_eq!(reloaded.total_price(), Decimal::new(1440, 2));
        assert_eq!(reloaded.history().len(), 1);
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL server at DATABASE_URL"]
    async fn rejected_item_changes_write_nothing(pool: PgPool) {
        let ledger = PostgresLedger::new(pool);
        let slug = create(&ledger, NewOrder::new("Bernd", "Hallo Pizza")).await.slug();
        let salami = NewOrderItem::new("Kevin", "Pizza Salami", Decimal::new(720, 2));

        assert!(ledger.add_item(slug, salami.clone()).await.is_ok());
        assert!(matches!(
            ledger.add_item(slug, salami).await,
            Err(OrderError::DuplicateItem { .. })
        ));
        assert!(ledger
            .transition(slug, Transition::BeginOrdering, None)
            .await
            .is_ok());
        let late = NewOrderItem::new("Kevin", "Pizza Funghi", Decimal::new(750, 2));
        assert!(matches!(
            ledger.add_item(slug, late).await,
            Err(OrderError::ItemsLocked { .. })
        ));

        let Ok(order) = ledger.order_by_slug(slug).await else {
            panic!("order should exist");
        };
        assert_eq!(order.items().len(), 1);
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL server at DATABASE_URL"]
    async fn list_orders_newest_activity_first(pool: PgPool) {
        let ledger = PostgresLedger::new(pool);
        let first = create(&ledger, NewOrder::new("Bernd", "Hallo Pizza")).await;
        let second = create(&ledger, NewOrder::new("Kevin", "Sushi Bar")).await;
        let third = create(&ledger, NewOrder::new("Lisa", "Curry House")).await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(ledger
            .transition(first.slug(), Transition::BeginOrdering, None)
            .await
            .is_ok());

        let Ok(orders) = ledger.list_orders().await else {
            panic!("listing should succeed");
        };
        let slugs: Vec<_> = orders.iter().map(Order::slug).collect();
        assert_eq!(slugs, vec![first.slug(), third.slug(), second.slug()]);
    }

    #[sqlx::test]
    #[ignore = "needs a PostgreSQL server at DATABASE_URL"]
    async fn expired_preparations_query(pool: PgPool) {
        let ledger = PostgresLedger::new(pool);
        let expiring = create(
            &ledger,
            NewOrder::new("Bernd", "Hallo Pizza").with_preparation_expiry(Duration::minutes(5)),
        )
        .await;
        let open = create(&ledger, NewOrder::new("Kevin", "Sushi Bar")).await;

        let Ok(slugs) = ledger.expired_preparations(Utc::now()).await else {
            panic!("query should succeed");
        };
        assert!(slugs.is_empty());

        let later = Utc::now() + Duration::minutes(6);
        let Ok(slugs) = ledger.expired_preparations(later).await else {
            panic!("query should succeed");
        };
        assert_eq!(slugs, vec![expiring.slug()]);
        assert!(!slugs.contains(&open.slug()));

        let Ok(Some(_)) = ledger.begin_ordering_if_expired(expiring.slug(), later).await else {
            panic!("expired order should move to ordering");
        };
        let Ok(slugs) = ledger.expired_preparations(later).await else {
            panic!("query should succeed");
        };
        assert!(slugs.is_empty());
    }
}
