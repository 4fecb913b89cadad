//! The order aggregate: lifecycle state machine, items and history.
//!
//! Every mutation validates first and only then changes state, so a
//! rejected call leaves the order exactly as it was. Every successful
//! transition appends exactly one [`OrderStateChange`].

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use validator::ValidateUrl;

use super::history::timestamp_now;
use super::order_item::{ItemChanges, NewOrderItem, OrderItem};
use super::validate::require_text;
use super::{ItemId, ItemSlug, OrderId, OrderSlug, OrderState, OrderStateChange, Transition};
use crate::error::{OrderError, OrderResult};

/// Maximum length of a coordinator name.
pub const MAX_COORDINATOR_LEN: usize = 100;
/// Maximum length of a restaurant name.
pub const MAX_RESTAURANT_LEN: usize = 250;
/// Maximum length of a cancellation reason.
pub const MAX_REASON_LEN: usize = 1000;

const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];

/// Input for announcing a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// Name of the person coordinating the order.
    pub coordinator: String,
    /// Restaurant the food is ordered from.
    pub restaurant_name: String,
    /// Optional link to the restaurant's menu.
    pub restaurant_url: Option<String>,
    /// How long items may be added before the order moves to `ordering`.
    pub preparation_expires_after: Option<Duration>,
}

impl NewOrder {
    /// Creates an input without URL or preparation expiry.
    #[must_use]
    pub fn new(coordinator: impl Into<String>, restaurant_name: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.into(),
            restaurant_name: restaurant_name.into(),
            restaurant_url: None,
            preparation_expires_after: None,
        }
    }

    /// Sets the restaurant URL.
    #[must_use]
    pub fn with_restaurant_url(mut self, url: impl Into<String>) -> Self {
        self.restaurant_url = Some(url.into());
        self
    }

    /// Sets the preparation expiry.
    #[must_use]
    pub fn with_preparation_expiry(mut self, expires_after: Duration) -> Self {
        self.preparation_expires_after = Some(expires_after);
        self
    }

    /// Validates all fields. An empty URL is treated as absent and the
    /// preparation expiry is truncated to whole milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidField`], [`OrderError::InvalidUrl`] or
    /// [`OrderError::NonPositiveExpiry`].
    pub fn validated(mut self) -> OrderResult<Self> {
        require_text("coordinator", &self.coordinator, MAX_COORDINATOR_LEN)?;
        require_text("restaurant_name", &self.restaurant_name, MAX_RESTAURANT_LEN)?;

        self.restaurant_url = self
            .restaurant_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if let Some(url) = &self.restaurant_url
            && !is_web_url(url)
        {
            return Err(OrderError::InvalidUrl(url.clone()));
        }

        if let Some(expires_after) = self.preparation_expires_after {
            let millis = expires_after.num_milliseconds();
            if millis < 1 {
                return Err(OrderError::NonPositiveExpiry(expires_after));
            }
            self.preparation_expires_after = Some(Duration::milliseconds(millis));
        }
        Ok(self)
    }
}

fn is_web_url(url: &str) -> bool {
    let scheme_ok = url
        .split_once("://")
        .is_some_and(|(scheme, _)| URL_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()));
    scheme_ok && url.validate_url()
}

/// A group order and everything it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    slug: OrderSlug,
    coordinator: String,
    restaurant_name: String,
    restaurant_url: Option<String>,
    state: OrderState,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    preparation_expires_after: Option<Duration>,
    items: Vec<OrderItem>,
    history: Vec<OrderStateChange>,
}

impl Order {
    /// Builds a freshly announced order in state `preparing`.
    ///
    /// The input is expected to have passed [`NewOrder::validated`].
    pub(crate) fn create(
        id: OrderId,
        slug: OrderSlug,
        input: NewOrder,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            slug,
            coordinator: input.coordinator,
            restaurant_name: input.restaurant_name,
            restaurant_url: input.restaurant_url,
            state: OrderState::Preparing,
            created_at,
            preparation_expires_after: input.preparation_expires_after,
            items: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Rehydrates stored state onto an order built by [`Order::create`].
    pub(crate) fn restored(
        mut self,
        state: OrderState,
        items: Vec<OrderItem>,
        history: Vec<OrderStateChange>,
    ) -> Self {
        self.state = state;
        self.items = items;
        self.history = history;
        self
    }

    /// Internal primary key.
    #[must_use]
    pub const fn id(&self) -> OrderId {
        self.id
    }

    /// Public identifier.
    #[must_use]
    pub const fn slug(&self) -> OrderSlug {
        self.slug
    }

    /// Coordinator name.
    #[must_use]
    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    /// Restaurant name.
    #[must_use]
    pub fn restaurant_name(&self) -> &str {
        &self.restaurant_name
    }

    /// Restaurant URL, if one was given.
    #[must_use]
    pub fn restaurant_url(&self) -> Option<&str> {
        self.restaurant_url.as_deref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> OrderState {
        self.state
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Preparation expiry duration, if set.
    #[must_use]
    pub const fn preparation_expires_after(&self) -> Option<Duration> {
        self.preparation_expires_after
    }

    /// Line items, in creation order.
    #[must_use]
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// State transitions, oldest first.
    #[must_use]
    pub fn history(&self) -> &[OrderStateChange] {
        &self.history
    }

    /// Returns `true` while items may be added, changed or removed.
    #[must_use]
    pub fn is_preparing(&self) -> bool {
        self.state == OrderState::Preparing
    }

    /// Returns `true` while the coordinator is placing the order.
    #[must_use]
    pub fn is_ordering(&self) -> bool {
        self.state == OrderState::Ordering
    }

    /// Returns `true` once the order was sent to the restaurant.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.state == OrderState::Ordered
    }

    /// Returns `true` once the food arrived.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.state == OrderState::Delivered
    }

    /// Returns `true` if the order was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.state == OrderState::Canceled
    }

    /// Sum of all item totals; zero without items.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.items.iter().map(OrderItem::total_price).sum()
    }

    /// Timestamp of the latest transition, or the creation time if there
    /// was none yet.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.history
            .iter()
            .map(|change| change.created_at)
            .max()
            .unwrap_or(self.created_at)
    }

    /// Locks the item list: `preparing` → `ordering`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] unless the order is preparing.
    pub fn begin_ordering(&mut self) -> OrderResult<OrderStateChange> {
        self.transition(Transition::BeginOrdering, None)
    }

    /// `ordering` → `ordered`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] unless the order is ordering.
    pub fn mark_ordered(&mut self) -> OrderResult<OrderStateChange> {
        self.transition(Transition::MarkOrdered, None)
    }

    /// `ordered` → `delivered`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] unless the order is ordered.
    pub fn mark_delivered(&mut self) -> OrderResult<OrderStateChange> {
        self.transition(Transition::MarkDelivered, None)
    }

    /// Cancels an active order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::MissingCancelReason`] if `reason` is absent or
    /// blank, regardless of state, and [`OrderError::InvalidTransition`] if
    /// the order is already delivered or canceled.
    pub fn cancel(&mut self, reason: Option<&str>) -> OrderResult<OrderStateChange> {
        self.transition(Transition::Cancel, reason)
    }

    /// Applies `transition`, recording one history entry on success.
    ///
    /// `reason` is only used (and required) for [`Transition::Cancel`].
    ///
    /// # Errors
    ///
    /// See [`Order::cancel`] and [`Order::begin_ordering`].
    pub fn transition(
        &mut self,
        transition: Transition,
        reason: Option<&str>,
    ) -> OrderResult<OrderStateChange> {
        let reason = match transition {
            Transition::Cancel => Some(cancel_reason(reason)?),
            Transition::BeginOrdering | Transition::MarkOrdered | Transition::MarkDelivered => None,
        };
        let new_state = self
            .state
            .next(transition)
            .ok_or(OrderError::InvalidTransition {
                state: self.state,
                action: transition.action(),
            })?;

        let change = OrderStateChange {
            order_id: self.id,
            created_at: timestamp_now(),
            old_state: self.state,
            new_state,
            reason,
        };
        self.state = new_state;
        self.history.push(change.clone());
        Ok(change)
    }

    /// Returns `true` if an expiry is set and `now` lies past
    /// `created_at + expiry`.
    #[must_use]
    pub fn is_preparation_time_expired(&self, now: DateTime<Utc>) -> bool {
        self.preparation_expires_after
            .and_then(|expires_after| self.created_at.checked_add_signed(expires_after))
            .is_some_and(|deadline| now > deadline)
    }

    /// Moves a preparing order whose preparation time has expired to
    /// `ordering`. Returns the history entry if it did.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Order::begin_ordering`].
    pub fn begin_ordering_if_expired(
        &mut self,
        now: DateTime<Utc>,
    ) -> OrderResult<Option<OrderStateChange>> {
        if self.is_preparing() && self.is_preparation_time_expired(now) {
            self.begin_ordering().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Looks up an item by slug.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::ItemNotFound`] if the order has no such item.
    pub fn item(&self, slug: ItemSlug) -> OrderResult<&OrderItem> {
        self.items
            .iter()
            .find(|item| item.slug == slug)
            .ok_or(OrderError::ItemNotFound {
                order: self.slug,
                item: slug,
            })
    }

    /// Fails unless items may currently be changed.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::ItemsLocked`] when the order is not preparing.
    pub fn ensure_items_editable(&self) -> OrderResult<()> {
        if self.is_preparing() {
            Ok(())
        } else {
            Err(OrderError::ItemsLocked { state: self.state })
        }
    }

    fn ensure_unique_line(
        &self,
        participant: &str,
        description: &str,
        except: Option<ItemId>,
    ) -> OrderResult<()> {
        let taken = self
            .items
            .iter()
            .filter(|item| Some(item.id) != except)
            .any(|item| item.is_same_line(participant, description));
        if taken {
            return Err(OrderError::DuplicateItem {
                participant: participant.to_string(),
                description: description.to_string(),
            });
        }
        Ok(())
    }

    /// Runs every check [`Order::add_item`] performs without mutating.
    /// Returns the normalized input.
    ///
    /// # Errors
    ///
    /// Validation errors, [`OrderError::ItemsLocked`] or
    /// [`OrderError::DuplicateItem`].
    pub fn check_new_item(&self, input: NewOrderItem) -> OrderResult<NewOrderItem> {
        let input = input.validated()?;
        self.ensure_items_editable()?;
        self.ensure_unique_line(&input.participant, &input.description, None)?;
        Ok(input)
    }

    /// Adds an item with the ledger-assigned `id` and `slug`.
    ///
    /// # Errors
    ///
    /// See [`Order::check_new_item`]; additionally
    /// [`OrderError::SlugCollision`] if `slug` is already used in this order.
    pub fn add_item(
        &mut self,
        id: ItemId,
        slug: ItemSlug,
        input: NewOrderItem,
    ) -> OrderResult<OrderItem> {
        let input = self.check_new_item(input)?;
        if self.items.iter().any(|item| item.slug == slug) {
            return Err(OrderError::SlugCollision(slug.to_string()));
        }
        let item = OrderItem {
            id,
            order_id: self.id,
            slug,
            participant: input.participant,
            description: input.description,
            price: input.price,
            amount: input.amount,
        };
        self.items.push(item.clone());
        Ok(item)
    }

    /// Runs every check [`Order::update_item`] performs without mutating.
    /// Returns the item's id and the normalized changes.
    ///
    /// # Errors
    ///
    /// Validation errors, [`OrderError::ItemsLocked`],
    /// [`OrderError::ItemNotFound`] or [`OrderError::DuplicateItem`].
    pub fn check_item_changes(
        &self,
        slug: ItemSlug,
        changes: ItemChanges,
    ) -> OrderResult<(ItemId, ItemChanges)> {
        let changes = changes.validated()?;
        self.ensure_items_editable()?;
        let item = self.item(slug)?;
        self.ensure_unique_line(&item.participant, &changes.description, Some(item.id))?;
        Ok((item.id, changes))
    }

    /// Replaces an item's description, price and amount.
    ///
    /// # Errors
    ///
    /// See [`Order::check_item_changes`].
    pub fn update_item(&mut self, slug: ItemSlug, changes: ItemChanges) -> OrderResult<OrderItem> {
        let (id, changes) = self.check_item_changes(slug, changes)?;
        let order = self.slug;
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(OrderError::ItemNotFound { order, item: slug })?;
        item.apply(changes);
        Ok(item.clone())
    }

    /// Removes an item.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::ItemsLocked`] when the order is not preparing
    /// and [`OrderError::ItemNotFound`] for an unknown slug.
    pub fn remove_item(&mut self, slug: ItemSlug) -> OrderResult<OrderItem> {
        self.ensure_items_editable()?;
        let position = self
            .items
            .iter()
            .position(|item| item.slug == slug)
            .ok_or(OrderError::ItemNotFound {
                order: self.slug,
                item: slug,
            })?;
        Ok(self.items.remove(position))
    }
}

fn cancel_reason(reason: Option<&str>) -> OrderResult<String> {
    let reason = reason
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .ok_or(OrderError::MissingCancelReason)?;
    require_text("reason", reason, MAX_REASON_LEN)?;
    Ok(reason.to_string())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn order() -> Order {
        let Ok(input) = NewOrder::new("Bernd", "Hallo Pizza").validated() else {
            panic!("valid order input");
        };
        Order::create(OrderId(1), OrderSlug::new(), input, Utc::now())
    }

    fn order_in(state: OrderState) -> Order {
        let mut order = order();
        let path: &[Transition] = match state {
            OrderState::Preparing => &[],
            OrderState::Ordering => &[Transition::BeginOrdering],
            OrderState::Ordered => &[Transition::BeginOrdering, Transition::MarkOrdered],
            OrderState::Delivered => &[
                Transition::BeginOrdering,
                Transition::MarkOrdered,
                Transition::MarkDelivered,
            ],
            OrderState::Canceled => &[Transition::Cancel],
        };
        for transition in path {
            if order.transition(*transition, Some("test")).is_err() {
                panic!("{transition:?} should succeed");
            }
        }
        order
    }

    fn add(
        order: &mut Order,
        id: i64,
        participant: &str,
        description: &str,
        cents: i64,
    ) -> OrderResult<OrderItem> {
        order.add_item(
            ItemId(id),
            ItemSlug::new(),
            NewOrderItem::new(participant, description, Decimal::new(cents, 2)),
        )
    }

    #[test]
    fn new_order_is_only_preparing() {
        let order = order();
        assert!(order.is_preparing());
        assert!(!order.is_ordering());
        assert!(!order.is_ordered());
        assert!(!order.is_delivered());
        assert!(!order.is_canceled());
        assert!(order.history().is_empty());
    }

    #[test]
    fn full_lifecycle_records_three_entries() {
        let mut order = order();
        assert!(order.begin_ordering().is_ok());
        assert!(order.mark_ordered().is_ok());
        assert!(order.mark_delivered().is_ok());
        assert!(order.is_delivered());

        let pairs: Vec<_> = order
            .history()
            .iter()
            .map(|change| (change.old_state, change.new_state, change.reason.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (OrderState::Preparing, OrderState::Ordering, None),
                (OrderState::Ordering, OrderState::Ordered, None),
                (OrderState::Ordered, OrderState::Delivered, None),
            ]
        );
        assert!(
            order
                .history()
                .iter()
                .all(|change| change.created_at.timestamp_subsec_nanos() % 1_000 == 0)
        );
    }

    #[test]
    fn invalid_transition_leaves_order_untouched() {
        let mut order = order();
        let before = order.clone();
        assert!(matches!(
            order.mark_delivered(),
            Err(OrderError::InvalidTransition {
                state: OrderState::Preparing,
                ..
            })
        ));
        assert_eq!(order, before);
    }

    #[test]
    fn cancel_without_reason_fails_in_every_state() {
        for state in OrderState::ALL {
            let mut order = order_in(state);
            let history_len = order.history().len();
            for reason in [None, Some(""), Some("   ")] {
                assert!(
                    matches!(order.cancel(reason), Err(OrderError::MissingCancelReason)),
                    "{state}"
                );
            }
            assert_eq!(order.state(), state);
            assert_eq!(order.history().len(), history_len);
        }
    }

    #[test]
    fn cancel_succeeds_once_from_active_states() {
        for state in [
            OrderState::Preparing,
            OrderState::Ordering,
            OrderState::Ordered,
        ] {
            let mut order = order_in(state);
            let Ok(change) = order.cancel(Some("restaurant closed")) else {
                panic!("cancel from {state} should succeed");
            };
            assert_eq!(change.old_state, state);
            assert_eq!(change.new_state, OrderState::Canceled);
            assert_eq!(change.reason.as_deref(), Some("restaurant closed"));
            assert!(order.is_canceled());

            let history_len = order.history().len();
            assert!(matches!(
                order.cancel(Some("again")),
                Err(OrderError::InvalidTransition {
                    state: OrderState::Canceled,
                    ..
                })
            ));
            assert!(order.is_canceled());
            assert_eq!(order.history().len(), history_len);
        }
    }

    #[test]
    fn delivered_order_cannot_be_canceled() {
        let mut order = order_in(OrderState::Delivered);
        assert!(matches!(
            order.cancel(Some("too late")),
            Err(OrderError::InvalidTransition {
                state: OrderState::Delivered,
                action: "cancel",
            })
        ));
        assert!(order.is_delivered());
        assert_eq!(order.history().len(), 3);
    }

    #[test]
    fn overlong_reason_is_rejected() {
        let mut order = order();
        let reason = "x".repeat(MAX_REASON_LEN + 1);
        assert!(matches!(
            order.cancel(Some(&reason)),
            Err(OrderError::InvalidField { field: "reason", .. })
        ));
        assert!(order.is_preparing());
    }

    #[test]
    fn total_price_is_zero_without_items() {
        assert_eq!(order().total_price(), Decimal::ZERO);
    }

    #[test]
    fn total_price_sums_item_totals() {
        let mut order = order();
        assert!(add(&mut order, 1, "Kevin", "Salami", 721).is_ok());
        assert!(add(&mut order, 2, "Kevin", "Funghi", 722).is_ok());
        assert!(add(&mut order, 3, "Lisa", "Salami", 723).is_ok());
        let doubled = order.add_item(
            ItemId(4),
            ItemSlug::new(),
            NewOrderItem::new("Lisa", "Tonno", Decimal::new(724, 2)).with_amount(2),
        );
        assert!(doubled.is_ok());
        assert_eq!(order.total_price(), Decimal::new(3614, 2));
    }

    #[test]
    fn items_are_locked_outside_preparation() {
        for state in [
            OrderState::Ordering,
            OrderState::Ordered,
            OrderState::Delivered,
            OrderState::Canceled,
        ] {
            let mut order = order();
            let Ok(item) = add(&mut order, 1, "Kevin", "Salami", 720) else {
                panic!("add while preparing should succeed");
            };
            let before = order.items().to_vec();
            let mut order = order.restored(state, before.clone(), Vec::new());

            assert!(matches!(
                add(&mut order, 2, "Lisa", "Funghi", 750),
                Err(OrderError::ItemsLocked { .. })
            ));
            let changes = ItemChanges {
                description: "Hawaii".to_string(),
                price: Decimal::new(800, 2),
                amount: 1,
            };
            assert!(matches!(
                order.update_item(item.slug, changes),
                Err(OrderError::ItemsLocked { .. })
            ));
            assert!(matches!(
                order.remove_item(item.slug),
                Err(OrderError::ItemsLocked { .. })
            ));
            assert_eq!(order.items(), before.as_slice());
        }
    }

    #[test]
    fn duplicate_line_is_rejected() {
        let mut order = order();
        assert!(add(&mut order, 1, "Kevin", "Salami", 720).is_ok());
        assert!(matches!(
            add(&mut order, 2, "Kevin", "Salami", 720),
            Err(OrderError::DuplicateItem { .. })
        ));
        assert_eq!(order.items().len(), 1);
        assert!(add(&mut order, 3, "Lisa", "Salami", 720).is_ok());
    }

    #[test]
    fn update_cannot_collide_with_sibling() {
        let mut order = order();
        assert!(add(&mut order, 1, "Kevin", "Salami", 720).is_ok());
        let Ok(funghi) = add(&mut order, 2, "Kevin", "Funghi", 720) else {
            panic!("second item should be added");
        };
        let collide = ItemChanges {
            description: "Salami".to_string(),
            price: Decimal::new(720, 2),
            amount: 1,
        };
        assert!(matches!(
            order.update_item(funghi.slug, collide),
            Err(OrderError::DuplicateItem { .. })
        ));

        let keep_name = ItemChanges {
            description: "Funghi".to_string(),
            price: Decimal::new(990, 2),
            amount: 2,
        };
        let Ok(updated) = order.update_item(funghi.slug, keep_name) else {
            panic!("updating own line should succeed");
        };
        assert_eq!(updated.total_price(), Decimal::new(1980, 2));
    }

    #[test]
    fn remove_item_while_preparing() {
        let mut order = order();
        let Ok(item) = add(&mut order, 1, "Kevin", "Salami", 720) else {
            panic!("add should succeed");
        };
        assert!(order.remove_item(item.slug).is_ok());
        assert!(order.items().is_empty());
        assert!(matches!(
            order.remove_item(item.slug),
            Err(OrderError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn url_must_be_well_formed() {
        let ok = NewOrder::new("Bernd", "Hallo Pizza")
            .with_restaurant_url("https://hallo-pizza.de/menu");
        assert!(ok.validated().is_ok());

        for bad in ["hallo pizza", "hallo-pizza.de", "mailto:pizza@example.com"] {
            let input = NewOrder::new("Bernd", "Hallo Pizza").with_restaurant_url(bad);
            assert!(
                matches!(input.validated(), Err(OrderError::InvalidUrl(_))),
                "{bad}"
            );
        }

        let Ok(blank) = NewOrder::new("Bernd", "Hallo Pizza")
            .with_restaurant_url("  ")
            .validated()
        else {
            panic!("blank url counts as absent");
        };
        assert_eq!(blank.restaurant_url, None);
    }

    #[test]
    fn expiry_must_be_positive() {
        for expiry in [
            Duration::zero(),
            Duration::minutes(-10),
            Duration::microseconds(500),
            Duration::microseconds(999),
        ] {
            let input = NewOrder::new("Bernd", "Hallo Pizza").with_preparation_expiry(expiry);
            assert!(matches!(
                input.validated(),
                Err(OrderError::NonPositiveExpiry(_))
            ));
        }
    }

    #[test]
    fn expiry_is_kept_in_whole_milliseconds() {
        let input = NewOrder::new("Bernd", "Hallo Pizza")
            .with_preparation_expiry(Duration::microseconds(1_500));
        let Ok(input) = input.validated() else {
            panic!("1.5ms is a valid expiry");
        };
        assert_eq!(input.preparation_expires_after, Some(Duration::milliseconds(1)));
    }

    #[test]
    fn preparation_expiry_switches_to_ordering() {
        let Ok(input) = NewOrder::new("Bernd", "Hallo Pizza")
            .with_preparation_expiry(Duration::minutes(10))
            .validated()
        else {
            panic!("valid input");
        };
        let created_at = Utc::now();
        let mut order = Order::create(OrderId(1), OrderSlug::new(), input, created_at);

        let early = created_at + Duration::minutes(5);
        assert!(!order.is_preparation_time_expired(early));
        assert!(matches!(order.begin_ordering_if_expired(early), Ok(None)));
        assert!(order.is_preparing());

        let late = created_at + Duration::minutes(15);
        assert!(order.is_preparation_time_expired(late));
        assert!(matches!(order.begin_ordering_if_expired(late), Ok(Some(_))));
        assert!(order.is_ordering());

        // Already ordering: nothing more to do.
        assert!(matches!(order.begin_ordering_if_expired(late), Ok(None)));
        assert_eq!(order.history().len(), 1);
    }

    #[test]
    fn no_expiry_never_expires() {
        let order = order();
        let far_future = Utc::now() + Duration::days(365);
        assert!(!order.is_preparation_time_expired(far_future));
    }
}
