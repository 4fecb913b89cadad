//! Error types for order coordination.
//!
//! [`OrderError`] is the central error type of the crate. Each variant
//! names the precondition that failed so callers can render an accurate
//! message, and maps to an [`ErrorKind`] and a stable numeric code.

use crate::domain::{ItemSlug, OrderId, OrderSlug, OrderState, ParseOrderStateError};

/// Broad category of an [`OrderError`].
///
/// # Error Code Ranges
///
/// | Range     | Kind              |
/// |-----------|-------------------|
/// | 1000–1999 | Invalid transition |
/// | 2000–2999 | Validation        |
/// | 3000–3999 | State violation   |
/// | 4000–4999 | Conflict          |
/// | 5000–5999 | Authorization     |
/// | 6000–6999 | Not found         |
/// | 9000–9999 | Ledger            |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requested state change is not legal from the current state.
    InvalidTransition,
    /// Input rejected before any mutation.
    Validation,
    /// Item mutation attempted outside the preparation window.
    StateViolation,
    /// Uniqueness or coordination conflict.
    Conflict,
    /// Session lacks the required grant.
    Authorization,
    /// Slug does not resolve to a record.
    NotFound,
    /// Storage backend failure.
    Ledger,
}

/// Every failure an order operation can report.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// The transition is not allowed from the order's current state.
    #[error("cannot {action} an order that is {state}")]
    InvalidTransition {
        /// State the order was in when the transition was attempted.
        state: OrderState,
        /// Name of the attempted transition.
        action: &'static str,
    },

    /// The requested target state token is not one of
    /// `ordering`, `ordered` or `delivered`.
    #[error("unknown target state: {0:?}")]
    UnknownTargetState(String),

    /// Cancellation was requested without a reason.
    #[error("a reason is required to cancel an order")]
    MissingCancelReason,

    /// A free-text field is empty or too long.
    #[error("invalid {field}: {message}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The restaurant URL is not a valid absolute URL.
    #[error("invalid restaurant url: {0}")]
    InvalidUrl(String),

    /// The preparation expiry duration is zero or negative.
    #[error("preparation expiry must be positive but is {0}")]
    NonPositiveExpiry(chrono::Duration),

    /// Item amount is zero.
    #[error("item amount must be at least 1")]
    NonPositiveAmount,

    /// Item price is negative, too large or has more than two fraction digits.
    #[error("invalid price {0}: must be between 0.00 and 999.99 with at most two decimals")]
    InvalidPrice(rust_decimal::Decimal),

    /// Items can only be added, changed or removed while the order is preparing.
    #[error("order items can only be changed while the order is preparing, but it is {state}")]
    ItemsLocked {
        /// Current state of the owning order.
        state: OrderState,
    },

    /// The participant already has an item with this description in the order.
    #[error("{participant} already ordered {description:?}")]
    DuplicateItem {
        /// Participant name.
        participant: String,
        /// Item description.
        description: String,
    },

    /// A generated slug collided with an existing one.
    #[error("slug already taken: {0}")]
    SlugCollision(String),

    /// The session already coordinates another active order.
    #[error("session already coordinates active order {order_id}")]
    AlreadyCoordinating {
        /// Order the session currently coordinates.
        order_id: OrderId,
    },

    /// The session does not coordinate the order.
    #[error("session is not the coordinator of order {0}")]
    NotCoordinator(OrderSlug),

    /// The session did not create the item.
    #[error("session may not edit item {item} of order {order}")]
    NoItemGrant {
        /// Order slug.
        order: OrderSlug,
        /// Item slug.
        item: ItemSlug,
    },

    /// No order with the given slug or id exists.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// No item with the given slug exists in the order.
    #[error("item {item} not found in order {order}")]
    ItemNotFound {
        /// Order slug.
        order: OrderSlug,
        /// Item slug.
        item: ItemSlug,
    },

    /// Storage backend failure.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl OrderError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition { .. } | Self::UnknownTargetState(_) => {
                ErrorKind::InvalidTransition
            }
            Self::MissingCancelReason
            | Self::InvalidField { .. }
            | Self::InvalidUrl(_)
            | Self::NonPositiveExpiry(_)
            | Self::NonPositiveAmount
            | Self::InvalidPrice(_) => ErrorKind::Validation,
            Self::ItemsLocked { .. } => ErrorKind::StateViolation,
            Self::DuplicateItem { .. }
            | Self::SlugCollision(_)
            | Self::AlreadyCoordinating { .. } => ErrorKind::Conflict,
            Self::NotCoordinator(_) | Self::NoItemGrant { .. } => ErrorKind::Authorization,
            Self::OrderNotFound(_) | Self::ItemNotFound { .. } => ErrorKind::NotFound,
            Self::Ledger(_) => ErrorKind::Ledger,
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidTransition { .. } => 1001,
            Self::UnknownTargetState(_) => 1002,
            Self::MissingCancelReason => 2001,
            Self::InvalidField { .. } => 2002,
            Self::InvalidUrl(_) => 2003,
            Self::NonPositiveExpiry(_) => 2004,
            Self::NonPositiveAmount => 2005,
            Self::InvalidPrice(_) => 2006,
            Self::ItemsLocked { .. } => 3001,
            Self::DuplicateItem { .. } => 4001,
            Self::SlugCollision(_) => 4002,
            Self::AlreadyCoordinating { .. } => 4003,
            Self::NotCoordinator(_) => 5001,
            Self::NoItemGrant { .. } => 5002,
            Self::OrderNotFound(_) => 6001,
            Self::ItemNotFound { .. } => 6002,
            Self::Ledger(_) => 9001,
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Ledger(err.to_string())
    }
}

impl From<ParseOrderStateError> for OrderError {
    fn from(err: ParseOrderStateError) -> Self {
        Self::Ledger(err.to_string())
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Ledger(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type OrderResult<T> = Result<T, OrderError>;
