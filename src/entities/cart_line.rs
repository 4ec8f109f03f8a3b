use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::ProductRef;

/// One (user, product) pairing. Exactly one of `game_id` / `payment_card_id`
/// is set; the schema enforces it with a CHECK constraint and the unique
/// indexes `(user_id, game_id)` and `(user_id, payment_card_id)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub game_id: Option<Uuid>,
    pub payment_card_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Typed product reference. `None` only for rows that violate the
    /// exactly-one-reference constraint.
    pub fn product_ref(&self) -> Option<ProductRef> {
        ProductRef::from_columns(self.game_id, self.payment_card_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::game::Entity",
        from = "Column::GameId",
        to = "super::game::Column::Id",
        on_delete = "Cascade"
    )]
    Game,
    #[sea_orm(
        belongs_to = "super::payment_card::Entity",
        from = "Column::PaymentCardId",
        to = "super::payment_card::Column::Id",
        on_delete = "Cascade"
    )]
    PaymentCard,
}

impl Related<super::game::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Game.def()
    }
}

impl Related<super::payment_card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentCard.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
