//! Session authorization: who may coordinate or edit what.
//!
//! There are no user accounts. Each client holds an opaque
//! [`SessionToken`]; the [`UserSession`] stored under it remembers which
//! order the client coordinates and which items it created. The session
//! is an explicit value passed into every check, loaded from and saved to
//! a [`SessionStore`].

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, OrderId};
use crate::error::{OrderError, OrderResult};

pub use memory::InMemorySessionStore;
pub use postgres::PostgresSessionStore;

/// Opaque identifier of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(uuid::Uuid);

impl SessionToken {
    /// Generates a new random token.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wraps an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An item the session is allowed to edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemGrant {
    /// Order containing the item.
    pub order_id: OrderId,
    /// The item.
    pub item_id: ItemId,
}

/// Per-client authorization record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSession {
    username: Option<String>,
    coordinated_order: Option<OrderId>,
    item_grants: BTreeSet<ItemGrant>,
}

impl UserSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name the participant chose, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Remembers the participant's display name.
    pub fn set_username(&mut self, name: impl Into<String>) {
        self.username = Some(name.into());
    }

    /// Order this session coordinates, if any.
    #[must_use]
    pub const fn coordinated_order(&self) -> Option<OrderId> {
        self.coordinated_order
    }

    /// Returns `true` if the session coordinates any order.
    #[must_use]
    pub const fn is_coordinator(&self) -> bool {
        self.coordinated_order.is_some()
    }

    /// Fails if the session coordinates an order other than `order_id`
    /// that is still active. `current_still_active` reports whether the
    /// currently coordinated order (if any) has not reached a terminal
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::AlreadyCoordinating`].
    pub fn ensure_can_coordinate(
        &self,
        order_id: Option<OrderId>,
        current_still_active: bool,
    ) -> OrderResult<()> {
        match self.coordinated_order {
            Some(current) if Some(current) != order_id && current_still_active => {
                Err(OrderError::AlreadyCoordinating { order_id: current })
            }
            _ => Ok(()),
        }
    }

    /// Records that this session coordinates `order_id`.
    ///
    /// Re-registering the same order is a no-op. A previously coordinated
    /// order that already finished is silently replaced.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::AlreadyCoordinating`] if a different order is
    /// still active.
    pub fn register_as_coordinator(
        &mut self,
        order_id: OrderId,
        current_still_active: bool,
    ) -> OrderResult<()> {
        self.ensure_can_coordinate(Some(order_id), current_still_active)?;
        self.coordinated_order = Some(order_id);
        Ok(())
    }

    /// Returns `true` only if this session coordinates `order_id`.
    #[must_use]
    pub fn is_coordinator_of(&self, order_id: OrderId) -> bool {
        self.coordinated_order == Some(order_id)
    }

    /// Drops the coordinator role. Idempotent.
    pub fn release_coordination(&mut self) {
        self.coordinated_order = None;
    }

    /// Records that this session created, and may edit, the item.
    pub fn grant_item_edit(&mut self, order_id: OrderId, item_id: ItemId) {
        self.item_grants.insert(ItemGrant { order_id, item_id });
    }

    /// Returns `true` only if edit rights were granted for this exact pair.
    #[must_use]
    pub fn can_edit_item(&self, order_id: OrderId, item_id: ItemId) -> bool {
        self.item_grants.contains(&ItemGrant { order_id, item_id })
    }

    /// Snapshot for the presentation layer.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            name: self.username.clone(),
            is_coordinator: self.is_coordinator(),
            coordinated_order_id: self.coordinated_order,
        }
    }
}

/// What a page needs to know about the current visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Display name, if known.
    pub name: Option<String>,
    /// Whether the visitor coordinates an order.
    pub is_coordinator: bool,
    /// The coordinated order, if any.
    pub coordinated_order_id: Option<OrderId>,
}

/// Storage for [`UserSession`]s keyed by [`SessionToken`].
pub trait SessionStore: Send + Sync {
    /// Loads the session, or an empty one if the token is unknown.
    fn load(&self, token: SessionToken) -> impl Future<Output = OrderResult<UserSession>> + Send;

    /// Stores the session under `token`, replacing any previous value.
    fn save(
        &self,
        token: SessionToken,
        session: &UserSession,
    ) -> impl Future<Output = OrderResult<()>> + Send;

    /// Removes the session and all its grants.
    fn clear(&self, token: SessionToken) -> impl Future<Output = OrderResult<()>> + Send;
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_has_no_rights() {
        let session = UserSession::new();
        assert!(!session.is_coordinator());
        assert!(!session.is_coordinator_of(OrderId(1)));
        assert!(!session.can_edit_item(OrderId(1), ItemId(1)));
        assert_eq!(session.username(), None);
    }

    #[test]
    fn coordinator_of_exactly_one_order() {
        let mut session = UserSession::new();
        assert!(session.register_as_coordinator(OrderId(1), false).is_ok());
        assert!(session.is_coordinator_of(OrderId(1)));
        assert!(!session.is_coordinator_of(OrderId(2)));

        session.release_coordination();
        assert!(!session.is_coordinator_of(OrderId(1)));
        assert!(!session.is_coordinator_of(OrderId(2)));

        session.release_coordination();
        assert!(!session.is_coordinator());
    }

    #[test]
    fn cannot_drop_live_coordination() {
        let mut session = UserSession::new();
        assert!(session.register_as_coordinator(OrderId(1), false).is_ok());

        assert!(matches!(
            session.register_as_coordinator(OrderId(2), true),
            Err(OrderError::AlreadyCoordinating {
                order_id: OrderId(1)
            })
        ));
        assert!(session.is_coordinator_of(OrderId(1)));

        // Same order again is fine.
        assert!(session.register_as_coordinator(OrderId(1), true).is_ok());

        // A finished order may be replaced.
        assert!(session.register_as_coordinator(OrderId(2), false).is_ok());
        assert!(session.is_coordinator_of(OrderId(2)));
    }

    #[test]
    fn item_grants_are_exact() {
        let mut session = UserSession::new();
        session.grant_item_edit(OrderId(1), ItemId(10));
        assert!(session.can_edit_item(OrderId(1), ItemId(10)));
        assert!(!session.can_edit_item(OrderId(1), ItemId(11)));
        assert!(!session.can_edit_item(OrderId(2), ItemId(10)));

        let other = UserSession::new();
        assert!(!other.can_edit_item(OrderId(1), ItemId(10)));
    }

    #[test]
    fn survives_json_storage() {
        let mut session = UserSession::new();
        session.set_username("Kevin");
        session.grant_item_edit(OrderId(3), ItemId(4));
        assert!(session.register_as_coordinator(OrderId(3), false).is_ok());

        let Ok(json) = serde_json::to_value(&session) else {
            panic!("session should serialize");
        };
        let Ok(restored) = serde_json::from_value::<UserSession>(json) else {
            panic!("session should deserialize");
        };
        assert_eq!(restored, session);
    }

    #[test]
    fn summary_reflects_session() {
        let mut session = UserSession::new();
        session.set_username("Bernd");
        assert!(session.register_as_coordinator(OrderId(5), false).is_ok());
        assert_eq!(
            session.summary(),
            SessionSummary {
                name: Some("Bernd".to_string()),
                is_coordinator: true,
                coordinated_order_id: Some(OrderId(5)),
            }
        );
    }
}
