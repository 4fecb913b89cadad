//! Audit trail of order state transitions.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use super::{OrderId, OrderState};

/// Immutable record of one state transition.
///
/// Created exactly once per successful transition, inside the same
/// operation that changes the order's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStateChange {
    /// Order whose state changed.
    pub order_id: OrderId,
    /// When the transition happened.
    pub created_at: DateTime<Utc>,
    /// State before the transition.
    pub old_state: OrderState,
    /// State after the transition.
    pub new_state: OrderState,
    /// Why the order changed state. Only set for cancellations.
    pub reason: Option<String>,
}

/// Current time at the microsecond precision the ledger stores, so a
/// timestamp handed out never differs from the one read back later.
pub(crate) fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
