//! Domain types shared by the cart, checkout and reconciliation services.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{game, payment_card};
use crate::errors::ServiceError;

/// Reference to exactly one purchasable product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ProductRef {
    Game(Uuid),
    Card(Uuid),
}

impl ProductRef {
    /// Rebuilds the reference from the paired nullable columns used in storage.
    pub fn from_columns(game_id: Option<Uuid>, payment_card_id: Option<Uuid>) -> Option<Self> {
        match (game_id, payment_card_id) {
            (Some(id), None) => Some(Self::Game(id)),
            (None, Some(id)) => Some(Self::Card(id)),
            _ => None,
        }
    }

    /// Same as [`ProductRef::from_columns`] but for client input, where both or
    /// neither id is a validation failure.
    pub fn from_request(
        game_id: Option<Uuid>,
        payment_card_id: Option<Uuid>,
    ) -> Result<Self, ServiceError> {
        Self::from_columns(game_id, payment_card_id).ok_or_else(|| {
            ServiceError::ValidationError(
                "Provide exactly one of gameId or paymentCardId".to_string(),
            )
        })
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Game(id) | Self::Card(id) => *id,
        }
    }

    pub fn game_id(&self) -> Option<Uuid> {
        match self {
            Self::Game(id) => Some(*id),
            Self::Card(_) => None,
        }
    }

    pub fn payment_card_id(&self) -> Option<Uuid> {
        match self {
            Self::Card(id) => Some(*id),
            Self::Game(_) => None,
        }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Game(id) => write!(f, "game:{}", id),
            Self::Card(id) => write!(f, "card:{}", id),
        }
    }
}

/// Capability shared by every sellable catalog item.
pub trait Purchasable {
    fn id(&self) -> Uuid;
    fn title(&self) -> &str;
    fn price(&self) -> Decimal;
    fn discount_price(&self) -> Option<Decimal>;
    fn stock_quantity(&self) -> i32;
    fn in_stock(&self) -> bool;

    /// `discount_price` when set, otherwise `price`.
    fn effective_price(&self) -> Decimal {
        self.discount_price().unwrap_or_else(|| self.price())
    }
}

impl Purchasable for game::Model {
    fn id(&self) -> Uuid {
        self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn price(&self) -> Decimal {
        self.price
    }
    fn discount_price(&self) -> Option<Decimal> {
        self.discount_price
    }
    fn stock_quantity(&self) -> i32 {
        self.stock_quantity
    }
    fn in_stock(&self) -> bool {
        self.in_stock
    }
}

impl Purchasable for payment_card::Model {
    fn id(&self) -> Uuid {
        self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn price(&self) -> Decimal {
        self.price
    }
    fn discount_price(&self) -> Option<Decimal> {
        self.discount_price
    }
    fn stock_quantity(&self) -> i32 {
        self.stock_quantity
    }
    fn in_stock(&self) -> bool {
        self.in_stock
    }
}

/// Live catalog row behind a [`ProductRef`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProductSnapshot {
    Game(game::Model),
    Card(payment_card::Model),
}

impl ProductSnapshot {
    pub fn product_ref(&self) -> ProductRef {
        match self {
            Self::Game(g) => ProductRef::Game(g.id),
            Self::Card(c) => ProductRef::Card(c.id),
        }
    }

    fn inner(&self) -> &dyn Purchasable {
        match self {
            Self::Game(g) => g,
            Self::Card(c) => c,
        }
    }
}

impl Purchasable for ProductSnapshot {
    fn id(&self) -> Uuid {
        self.inner().id()
    }
    fn title(&self) -> &str {
        self.inner().title()
    }
    fn price(&self) -> Decimal {
        self.inner().price()
    }
    fn discount_price(&self) -> Option<Decimal> {
        self.inner().discount_price()
    }
    fn stock_quantity(&self) -> i32 {
        self.inner().stock_quantity()
    }
    fn in_stock(&self) -> bool {
        self.inner().in_stock()
    }
}

/// Order lifecycle. Stored as its SCREAMING_SNAKE_CASE name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    ToSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// PENDING -> PAID -> PROCESSING -> COMPLETED, with PENDING or PAID
    /// allowed to move to CANCELLED.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Cancelled)
                | (Paid, Processing)
                | (Paid, Cancelled)
                | (Processing, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    Fixed,
}
