use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::cart_line::{self, Entity as CartLineEntity, Model as CartLineModel},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{ProductRef, ProductSnapshot, Purchasable},
    services::inventory::InventoryService,
};

pub const MIN_LINE_QUANTITY: i32 = 1;
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Increment applied on conflict, evaluated by the database against the
/// stored row so concurrent adds never lose an update.
const CLAMPED_INCREMENT: &str = "CASE WHEN cart_lines.quantity + excluded.quantity > 99 \
     THEN 99 ELSE cart_lines.quantity + excluded.quantity END";

/// Clamps a requested quantity into the storable `1..=99` range.
pub fn clamp_quantity(quantity: i64) -> i32 {
    quantity.clamp(i64::from(MIN_LINE_QUANTITY), i64::from(MAX_LINE_QUANTITY)) as i32
}

/// A cart line joined with the product as it is right now.
#[derive(Debug, Clone)]
pub struct CartItem {
    pub line: CartLineModel,
    pub product: ProductSnapshot,
}

impl CartItem {
    /// Live line subtotal. Not frozen; checkout re-prices.
    pub fn subtotal(&self) -> rust_decimal::Decimal {
        self.product.effective_price() * rust_decimal::Decimal::from(self.line.quantity)
    }
}

fn product_filter(product: ProductRef) -> sea_orm::sea_query::SimpleExpr {
    match product {
        ProductRef::Game(id) => cart_line::Column::GameId.eq(id),
        ProductRef::Card(id) => cart_line::Column::PaymentCardId.eq(id),
    }
}

/// Per-user cart ledger.
#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
    inventory: InventoryService,
    event_sender: Option<Arc<EventSender>>,
}

impl CartService {
    pub fn new(
        db_pool: Arc<DbPool>,
        inventory: InventoryService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            inventory,
            event_sender,
        }
    }

    async fn available_product(&self, product: ProductRef) -> Result<ProductSnapshot, ServiceError> {
        match self.inventory.find_product(product).await? {
            Some(snapshot) if snapshot.in_stock() => Ok(snapshot),
            _ => Err(ServiceError::ProductUnavailable(
                "Product not found or out of stock".to_string(),
            )),
        }
    }

    async fn find_line(
        &self,
        user_id: &str,
        product: ProductRef,
    ) -> Result<Option<CartLineModel>, ServiceError> {
        Ok(CartLineEntity::find()
            .filter(cart_line::Column::UserId.eq(user_id))
            .filter(product_filter(product))
            .one(&*self.db_pool)
            .await?)
    }

    /// Adds `delta` units of `product`, creating the line on first add.
    ///
    /// Insert-or-increment is one statement keyed by the
    /// `(user_id, product)` unique index; the stored quantity is capped at 99.
    #[instrument(skip(self), fields(user_id = %user_id, product = %product))]
    pub async fn upsert(
        &self,
        user_id: &str,
        product: ProductRef,
        delta: i64,
    ) -> Result<CartItem, ServiceError> {
        let snapshot = self.available_product(product).await?;
        let quantity = clamp_quantity(delta);
        let now = Utc::now();

        let line = cart_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            game_id: Set(product.game_id()),
            payment_card_id: Set(product.payment_card_id()),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let conflict_target = match product {
            ProductRef::Game(_) => [cart_line::Column::UserId, cart_line::Column::GameId],
            ProductRef::Card(_) => [cart_line::Column::UserId, cart_line::Column::PaymentCardId],
        };

        CartLineEntity::insert(line)
            .on_conflict(
                OnConflict::columns(conflict_target)
                    .value(cart_line::Column::Quantity, Expr::cust(CLAMPED_INCREMENT))
                    .update_column(cart_line::Column::UpdatedAt)
                    .to_owned(),
            )
            .exec_without_returning(&*self.db_pool)
            .await?;

        let line = self.find_line(user_id, product).await?.ok_or_else(|| {
            ServiceError::InternalError("cart line missing after upsert".to_string())
        })?;

        info!(quantity = line.quantity, "cart line upserted");
        Ok(CartItem {
            line,
            product: snapshot,
        })
    }

    /// Overwrites a line's quantity; `quantity <= 0` removes the line.
    /// Returns `None` when the line was removed.
    #[instrument(skip(self), fields(user_id = %user_id, product = %product))]
    pub async fn set_quantity(
        &self,
        user_id: &str,
        product: ProductRef,
        quantity: i64,
    ) -> Result<Option<CartItem>, ServiceError> {
        if quantity <= 0 {
            self.remove(user_id, product).await?;
            return Ok(None);
        }

        let res = CartLineEntity::update_many()
            .col_expr(cart_line::Column::Quantity, Expr::value(clamp_quantity(quantity)))
            .col_expr(cart_line::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart_line::Column::UserId.eq(user_id))
            .filter(product_filter(product))
            .exec(&*self.db_pool)
            .await?;

        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound("Cart item not found".to_string()));
        }

        let line = self
            .find_line(user_id, product)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;
        let snapshot = self
            .inventory
            .find_product(product)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        Ok(Some(CartItem {
            line,
            product: snapshot,
        }))
    }

    /// Deletes the line if present. Returns whether a row was removed.
    #[instrument(skip(self), fields(user_id = %user_id, product = %product))]
    pub async fn remove(&self, user_id: &str, product: ProductRef) -> Result<bool, ServiceError> {
        let res = CartLineEntity::delete_many()
            .filter(cart_line::Column::UserId.eq(user_id))
            .filter(product_filter(product))
            .exec(&*self.db_pool)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// All lines for `user_id` joined with live product data. Lines whose
    /// product no longer exists are skipped.
    pub async fn list(&self, user_id: &str) -> Result<Vec<CartItem>, ServiceError> {
        Self::list_with(&*self.db_pool, user_id).await
    }

    pub(crate) async fn list_with<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
    ) -> Result<Vec<CartItem>, ServiceError> {
        let lines = CartLineEntity::find()
            .filter(cart_line::Column::UserId.eq(user_id))
            .order_by_asc(cart_line::Column::CreatedAt)
            .all(conn)
            .await?;

        let products =
            InventoryService::find_products(conn, lines.iter().filter_map(|l| l.product_ref()))
                .await?;

        Ok(lines
            .into_iter()
            .filter_map(|line| {
                let product = products.get(&line.product_ref()?)?.clone();
                Some(CartItem { line, product })
            })
            .collect())
    }

    /// Removes every line the user has. Returns the number removed.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear_all(&self, user_id: &str) -> Result<u64, ServiceError> {
        let res = CartLineEntity::delete_many()
            .filter(cart_line::Column::UserId.eq(user_id))
            .exec(&*self.db_pool)
            .await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::CartCleared {
                    user_id: user_id.to_string(),
                    lines_removed: res.rows_affected,
                })
                .await;
        }

        Ok(res.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamp_quantity_bounds() {
        assert_eq!(clamp_quantity(0), 1);
        assert_eq!(clamp_quantity(-5), 1);
        assert_eq!(clamp_quantity(1), 1);
        assert_eq!(clamp_quantity(42), 42);
        assert_eq!(clamp_quantity(99), 99);
        assert_eq!(clamp_quantity(100), 99);
        assert_eq!(clamp_quantity(i64::MAX), 99);
    }

    proptest! {
        #[test]
        fn clamp_quantity_always_in_range(q in any::<i64>()) {
            let clamped = clamp_quantity(q);
            prop_assert!((MIN_LINE_QUANTITY..=MAX_LINE_QUANTITY).contains(&clamped));
        }
    }
}
