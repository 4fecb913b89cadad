//! Order lifecycle states and the transition table.
//!
//! ```text
//! preparing ──► ordering ──► ordered ──► delivered
//!     │            │            │
//!     └────────────┴────────────┴──────► canceled
//! ```
//!
//! `delivered` and `canceled` are terminal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// Error returned when a string is not one of the [`OrderState`] storage
/// tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order state {0:?}")]
pub struct ParseOrderStateError(pub String);

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Order is prepared, order items can be modified.
    Preparing,
    /// Order is locked and being sent to the delivery service by the coordinator.
    Ordering,
    /// Order has been sent to the delivery service.
    Ordered,
    /// Delivery has arrived.
    Delivered,
    /// Order has been canceled for some reason.
    Canceled,
}

impl OrderState {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Preparing,
        Self::Ordering,
        Self::Ordered,
        Self::Delivered,
        Self::Canceled,
    ];

    /// Returns the state's storage token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Ordering => "ordering",
            Self::Ordered => "ordered",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
        }
    }

    /// Returns `true` for states no transition leads out of.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }

    /// Looks up the state reached by applying `transition`, or `None` if
    /// the transition is not allowed from this state.
    #[must_use]
    pub const fn next(self, transition: Transition) -> Option<Self> {
        match (self, transition) {
            (Self::Preparing, Transition::BeginOrdering) => Some(Self::Ordering),
            (Self::Ordering, Transition::MarkOrdered) => Some(Self::Ordered),
            (Self::Ordered, Transition::MarkDelivered) => Some(Self::Delivered),
            (Self::Preparing | Self::Ordering | Self::Ordered, Transition::Cancel) => {
                Some(Self::Canceled)
            }
            (Self::Preparing, _)
            | (Self::Ordering, _)
            | (Self::Ordered, _)
            | (Self::Delivered, _)
            | (Self::Canceled, _) => None,
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the storage token written by [`OrderState::as_str`].
///
/// Target states requested by callers go through
/// [`Transition::from_target`] instead.
impl FromStr for OrderState {
    type Err = ParseOrderStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseOrderStateError(s.to_string()))
    }
}

/// A state change an order can undergo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// `preparing` → `ordering`.
    BeginOrdering,
    /// `ordering` → `ordered`.
    MarkOrdered,
    /// `ordered` → `delivered`.
    MarkDelivered,
    /// `preparing | ordering | ordered` → `canceled`. Requires a reason.
    Cancel,
}

impl Transition {
    /// Maps a requested target state token to its transition.
    ///
    /// Only `ordering`, `ordered` and `delivered` are accepted; cancellation
    /// has its own entry point because it needs a reason.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::UnknownTargetState`] for any other token.
    pub fn from_target(token: &str) -> Result<Self, OrderError> {
        match token {
            "ordering" => Ok(Self::BeginOrdering),
            "ordered" => Ok(Self::MarkOrdered),
            "delivered" => Ok(Self::MarkDelivered),
            other => Err(OrderError::UnknownTargetState(other.to_string())),
        }
    }

    /// Verb used in error messages.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::BeginOrdering => "begin ordering",
            Self::MarkOrdered => "mark as ordered",
            Self::MarkDelivered => "mark as delivered",
            Self::Cancel => "cancel",
        }
    }
}
