//! Order service: checks session permissions and drives the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    ItemChanges, ItemSlug, NewOrder, NewOrderItem, Order, OrderItem, OrderSlug, Transition,
};
use crate::error::{OrderError, OrderResult};
use crate::ledger::OrderLedger;
use crate::session::{SessionStore, SessionSummary, SessionToken, UserSession};

/// Collaborator layer between callers and the order ledger.
///
/// Every mutation method follows the pattern: load session → resolve
/// order → check permission → call the ledger → update and save the
/// session → log. The ledger re-validates state on its own, so a
/// permission check passing never bypasses the lifecycle rules.
#[derive(Debug)]
pub struct OrderService<L, S> {
    ledger: Arc<L>,
    sessions: Arc<S>,
}

impl<L, S> Clone for OrderService<L, S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<L: OrderLedger, S: SessionStore> OrderService<L, S> {
    /// Creates a new `OrderService`.
    #[must_use]
    pub fn new(ledger: Arc<L>, sessions: Arc<S>) -> Self {
        Self { ledger, sessions }
    }

    /// Returns a reference to the inner ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Returns a reference to the inner session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<S> {
        &self.sessions
    }

    /// Announces a new order and makes the session its coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::AlreadyCoordinating`] if the session still
    /// coordinates an active order, a validation error for bad input, or
    /// a ledger error.
    pub async fn create_order(&self, token: SessionToken, input: NewOrder) -> OrderResult<Order> {
        let mut session = self.sessions.load(token).await?;
        let current_still_active = self.coordinated_order_active(&session).await?;
        session.ensure_can_coordinate(None, current_still_active)?;

        let order = self.ledger.create_order(input).await?;
        session.register_as_coordinator(order.id(), current_still_active)?;
        session.set_username(order.coordinator());
        self.sessions.save(token, &session).await?;

        tracing::info!(
            slug = %order.slug(),
            coordinator = order.coordinator(),
            restaurant = order.restaurant_name(),
            "order announced"
        );
        Ok(order)
    }

    /// Moves an order to the state named by `target` (`ordering`,
    /// `ordered` or `delivered`). Releases the session's coordination once
    /// the order is delivered.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotCoordinator`] if the session does not
    /// coordinate the order, [`OrderError::UnknownTargetState`] for any
    /// other token, and [`OrderError::InvalidTransition`] if the order is
    /// not in the required state.
    pub async fn transition_order(
        &self,
        token: SessionToken,
        slug: OrderSlug,
        target: &str,
    ) -> OrderResult<Order> {
        let mut session = self.sessions.load(token).await?;
        let order = self.ledger.order_by_slug(slug).await?;
        require_coordinator(&session, &order)?;

        let transition = Transition::from_target(target)?;
        let order = self.ledger.transition(slug, transition, None).await?;
        if order.is_delivered() {
            session.release_coordination();
            self.sessions.save(token, &session).await?;
        }

        tracing::info!(%slug, state = %order.state(), "order state changed");
        Ok(order)
    }

    /// Cancels an order and releases the session's coordination.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotCoordinator`],
    /// [`OrderError::MissingCancelReason`] or
    /// [`OrderError::InvalidTransition`].
    pub async fn cancel_order(
        &self,
        token: SessionToken,
        slug: OrderSlug,
        reason: Option<&str>,
    ) -> OrderResult<Order> {
        let mut session = self.sessions.load(token).await?;
        let order = self.ledger.order_by_slug(slug).await?;
        require_coordinator(&session, &order)?;

        let order = self
            .ledger
            .transition(slug, Transition::Cancel, reason.map(str::to_string))
            .await?;
        session.release_coordination();
        self.sessions.save(token, &session).await?;

        tracing::info!(%slug, reason, "order canceled");
        Ok(order)
    }

    /// Adds an item and grants the session the right to edit it.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::ItemsLocked`] unless the order is preparing,
    /// [`OrderError::DuplicateItem`] if the participant already ordered
    /// the same thing, or a validation error.
    pub async fn add_item(
        &self,
        token: SessionToken,
        slug: OrderSlug,
        input: NewOrderItem,
    ) -> OrderResult<OrderItem> {
        let mut session = self.sessions.load(token).await?;
        let item = self.ledger.add_item(slug, input).await?;
        session.grant_item_edit(item.order_id, item.id);
        session.set_username(item.participant.clone());
        self.sessions.save(token, &session).await?;

        tracing::info!(
            %slug,
            item = %item.slug,
            participant = %item.participant,
            total = %item.total_price(),
            "order item added"
        );
        Ok(item)
    }

    /// Changes an item the session created.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NoItemGrant`] if the session did not create
    /// the item, plus everything [`Order::update_item`] can return.
    pub async fn update_item(
        &self,
        token: SessionToken,
        slug: OrderSlug,
        item: ItemSlug,
        changes: ItemChanges,
    ) -> OrderResult<OrderItem> {
        self.require_item_grant(token, slug, item).await?;
        let updated = self.ledger.update_item(slug, item, changes).await?;
        tracing::info!(%slug, %item, "order item updated");
        Ok(updated)
    }

    /// Deletes an item the session created.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NoItemGrant`] if the session did not create
    /// the item, plus everything [`Order::remove_item`] can return.
    pub async fn delete_item(
        &self,
        token: SessionToken,
        slug: OrderSlug,
        item: ItemSlug,
    ) -> OrderResult<()> {
        self.require_item_grant(token, slug, item).await?;
        self.ledger.delete_item(slug, item).await?;
        tracing::info!(%slug, %item, "order item deleted");
        Ok(())
    }

    /// Loads a single order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::OrderNotFound`] for an unknown slug.
    pub async fn order(&self, slug: OrderSlug) -> OrderResult<Order> {
        self.ledger.order_by_slug(slug).await
    }

    /// Lists all orders, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if the orders cannot be read.
    pub async fn list_orders(&self) -> OrderResult<Vec<Order>> {
        self.ledger.list_orders().await
    }

    /// Returns what the presentation layer needs to know about a session.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if the session cannot be read.
    pub async fn session_summary(&self, token: SessionToken) -> OrderResult<SessionSummary> {
        Ok(self.sessions.load(token).await?.summary())
    }

    /// Moves every preparing order whose preparation time expired at
    /// `now` to `ordering`. Returns the slugs of the orders that moved.
    ///
    /// # Errors
    ///
    /// Returns a ledger error; orders that vanished meanwhile are skipped.
    pub async fn close_expired_preparations(
        &self,
        now: DateTime<Utc>,
    ) -> OrderResult<Vec<OrderSlug>> {
        let candidates = self.ledger.expired_preparations(now).await?;

        let mut closed = Vec::with_capacity(candidates.len());
        for slug in candidates {
            match self.ledger.begin_ordering_if_expired(slug, now).await {
                Ok(Some(_)) => {
                    tracing::info!(%slug, "preparation time expired, order locked");
                    closed.push(slug);
                }
                Ok(None) => {}
                Err(OrderError::OrderNotFound(_)) => {
                    tracing::debug!(%slug, "expired order disappeared before it was locked");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(closed)
    }

    async fn coordinated_order_active(&self, session: &UserSession) -> OrderResult<bool> {
        let Some(order_id) = session.coordinated_order() else {
            return Ok(false);
        };
        match self.ledger.order_by_id(order_id).await {
            Ok(order) => Ok(!order.state().is_terminal()),
            Err(OrderError::OrderNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn require_item_grant(
        &self,
        token: SessionToken,
        slug: OrderSlug,
        item: ItemSlug,
    ) -> OrderResult<()> {
        let session = self.sessions.load(token).await?;
        let order = self.ledger.order_by_slug(slug).await?;
        let item_id = order.item(item)?.id;
        if session.can_edit_item(order.id(), item_id) {
            Ok(())
        } else {
            tracing::warn!(%slug, %item, "item edit rejected: no grant for session");
            Err(OrderError::NoItemGrant { order: slug, item })
        }
    }
}

fn require_coordinator(session: &UserSession, order: &Order) -> OrderResult<()> {
    if session.is_coordinator_of(order.id()) {
        Ok(())
    } else {
        tracing::warn!(slug = %order.slug(), "order change rejected: session is not coordinator");
        Err(OrderError::NotCoordinator(order.slug()))
    }
}
