//! A participant's line item within an order.

use rust_decimal::Decimal;
use serde::Serialize;

use super::validate::{normalize_price, require_amount, require_text};
use super::{ItemId, ItemSlug, OrderId};
use crate::error::OrderResult;

/// Maximum length of a participant name.
pub const MAX_PARTICIPANT_LEN: usize = 100;
/// Maximum length of an item description.
pub const MAX_DESCRIPTION_LEN: usize = 250;

/// A line item added by a participant while the order is preparing.
///
/// Items are only ever mutated through [`super::Order`], which enforces
/// the preparation window and the per-participant uniqueness of
/// descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    /// Internal primary key.
    pub id: ItemId,
    /// Owning order.
    pub order_id: OrderId,
    /// Public identifier, unique within the order.
    pub slug: ItemSlug,
    /// Who ordered the item. Fixed at creation.
    pub participant: String,
    /// What was ordered.
    pub description: String,
    /// Unit price with two fraction digits.
    pub price: Decimal,
    /// Quantity, at least 1.
    pub amount: u32,
}

impl OrderItem {
    /// Unit price times amount.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.price * Decimal::from(self.amount)
    }

    /// Whether this item belongs to `participant` and is described as
    /// `description`.
    #[must_use]
    pub fn is_same_line(&self, participant: &str, description: &str) -> bool {
        self.participant == participant && self.description == description
    }

    pub(crate) fn apply(&mut self, changes: ItemChanges) {
        self.description = changes.description;
        self.price = changes.price;
        self.amount = changes.amount;
    }
}

/// Input for adding an item to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    /// Who orders the item.
    pub participant: String,
    /// What is ordered.
    pub description: String,
    /// Unit price.
    pub price: Decimal,
    /// Quantity.
    pub amount: u32,
}

impl NewOrderItem {
    /// Creates an input with an amount of 1.
    #[must_use]
    pub fn new(participant: impl Into<String>, description: impl Into<String>, price: Decimal) -> Self {
        Self {
            participant: participant.into(),
            description: description.into(),
            price,
            amount: 1,
        }
    }

    /// Sets the quantity.
    #[must_use]
    pub fn with_amount(mut self, amount: u32) -> Self {
        self.amount = amount;
        self
    }

    /// Validates all fields and fixes the price scale.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first offending field.
    pub fn validated(mut self) -> OrderResult<Self> {
        require_text("participant", &self.participant, MAX_PARTICIPANT_LEN)?;
        require_text("description", &self.description, MAX_DESCRIPTION_LEN)?;
        require_amount(self.amount)?;
        self.price = normalize_price(self.price)?;
        Ok(self)
    }
}

/// New field values for an existing item. The participant cannot change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChanges {
    /// New description.
    pub description: String,
    /// New unit price.
    pub price: Decimal,
    /// New quantity.
    pub amount: u32,
}

impl ItemChanges {
    /// Validates all fields and fixes the price scale.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first offending field.
    pub fn validated(mut self) -> OrderResult<Self> {
        require_text("description", &self.description, MAX_DESCRIPTION_LEN)?;
        require_amount(self.amount)?;
        self.price = normalize_price(self.price)?;
        Ok(self)
    }
}
