use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{game, payment_card},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{ProductRef, ProductSnapshot, Purchasable},
};

/// Columns the stock ledger touches on a catalog table.
trait StockTable: EntityTrait {
    fn id_col() -> Self::Column;
    fn stock_col() -> Self::Column;
    fn in_stock_col() -> Self::Column;
    fn updated_at_col() -> Self::Column;
}

impl StockTable for game::Entity {
    fn id_col() -> Self::Column {
        game::Column::Id
    }
    fn stock_col() -> Self::Column {
        game::Column::StockQuantity
    }
    fn in_stock_col() -> Self::Column {
        game::Column::InStock
    }
    fn updated_at_col() -> Self::Column {
        game::Column::UpdatedAt
    }
}

impl StockTable for payment_card::Entity {
    fn id_col() -> Self::Column {
        payment_card::Column::Id
    }
    fn stock_col() -> Self::Column {
        payment_card::Column::StockQuantity
    }
    fn in_stock_col() -> Self::Column {
        payment_card::Column::InStock
    }
    fn updated_at_col() -> Self::Column {
        payment_card::Column::UpdatedAt
    }
}

/// Result of one stock decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDecrement {
    pub product: ProductRef,
    pub requested: i32,
    /// Units on hand just before the decrement.
    pub available: i32,
    pub remaining: i32,
    /// Fewer units were left than requested; stock was floored at zero.
    pub oversold: bool,
}

/// Owns `stock_quantity` / `in_stock` on games and payment cards.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Loads the live catalog row behind `product`.
    pub async fn find_product(
        &self,
        product: ProductRef,
    ) -> Result<Option<ProductSnapshot>, ServiceError> {
        let db = &*self.db_pool;
        let snapshot = match product {
            ProductRef::Game(id) => game::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(ProductSnapshot::Game),
            ProductRef::Card(id) => payment_card::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(ProductSnapshot::Card),
        };
        Ok(snapshot)
    }

    /// Loads every referenced product in two queries. Missing products are
    /// simply absent from the map.
    pub async fn find_products<C: ConnectionTrait>(
        conn: &C,
        refs: impl IntoIterator<Item = ProductRef>,
    ) -> Result<HashMap<ProductRef, ProductSnapshot>, ServiceError> {
        let mut game_ids = HashSet::new();
        let mut card_ids = HashSet::new();
        for product in refs {
            match product {
                ProductRef::Game(id) => game_ids.insert(id),
                ProductRef::Card(id) => card_ids.insert(id),
            };
        }

        let mut found = HashMap::with_capacity(game_ids.len() + card_ids.len());
        if !game_ids.is_empty() {
            for g in game::Entity::find()
                .filter(game::Column::Id.is_in(game_ids))
                .all(conn)
                .await?
            {
                found.insert(ProductRef::Game(g.id), ProductSnapshot::Game(g));
            }
        }
        if !card_ids.is_empty() {
            for c in payment_card::Entity::find()
                .filter(payment_card::Column::Id.is_in(card_ids))
                .all(conn)
                .await?
            {
                found.insert(ProductRef::Card(c.id), ProductSnapshot::Card(c));
            }
        }
        Ok(found)
    }

    /// Atomically removes `quantity` units from stock.
    ///
    /// Stock never goes below zero: when fewer units remain than requested
    /// the row is floored at zero and the decrement reported as oversold.
    /// `in_stock` flips to false whenever stock reaches zero.
    #[instrument(skip(self), fields(product = %product))]
    pub async fn decrement(
        &self,
        product: ProductRef,
        quantity: i32,
    ) -> Result<StockDecrement, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Decrement quantity must be positive".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let outcome = match product {
            ProductRef::Game(id) => decrement_in::<game::Entity, _>(db, product, id, quantity).await?,
            ProductRef::Card(id) => {
                decrement_in::<payment_card::Entity, _>(db, product, id, quantity).await?
            }
        };

        if outcome.oversold {
            warn!(
                product = %product,
                requested = quantity,
                "stock exhausted before decrement; floored at zero"
            );
            counter!("storefront_inventory_oversold_total", 1);
        }

        if let Some(sender) = &self.event_sender {
            let event = if outcome.oversold {
                Event::InventoryOversold {
                    product,
                    requested: quantity,
                    available: outcome.available,
                }
            } else {
                Event::InventoryDecremented {
                    product,
                    quantity,
                    remaining: outcome.remaining,
                }
            };
            sender.send_or_log(event).await;
        }

        Ok(outcome)
    }
}

async fn decrement_in<E, C>(
    conn: &C,
    product: ProductRef,
    id: Uuid,
    quantity: i32,
) -> Result<StockDecrement, ServiceError>
where
    E: StockTable,
    E::Model: Purchasable,
    C: ConnectionTrait,
{
    // A concurrent restock between the two statements sends us round again.
    for _ in 0..3 {
        let now = Utc::now();

        let res = E::update_many()
            .col_expr(E::stock_col(), Expr::col(E::stock_col()).sub(quantity))
            .col_expr(
                E::in_stock_col(),
                Expr::case(
                    Expr::col(E::stock_col()).gt(quantity),
                    Expr::col(E::in_stock_col()),
                )
                .finally(false)
                .into(),
            )
            .col_expr(E::updated_at_col(), Expr::value(now))
            .filter(E::id_col().eq(id))
            .filter(E::stock_col().gte(quantity))
            .exec(conn)
            .await?;

        if res.rows_affected == 1 {
            let remaining = E::find()
                .filter(E::id_col().eq(id))
                .one(conn)
                .await?
                .map(|m| m.stock_quantity())
                .unwrap_or(0);
            return Ok(StockDecrement {
                product,
                requested: quantity,
                available: remaining + quantity,
                remaining,
                oversold: false,
            });
        }

        let Some(available) = E::find()
            .filter(E::id_col().eq(id))
            .one(conn)
            .await?
            .map(|m| m.stock_quantity())
        else {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product
            )));
        };
        if available >= quantity {
            continue;
        }

        // Pinned to the observed value so `available` is what was zeroed.
        let floored = E::update_many()
            .col_expr(E::stock_col(), Expr::value(0))
            .col_expr(E::in_stock_col(), Expr::value(false))
            .col_expr(E::updated_at_col(), Expr::value(now))
            .filter(E::id_col().eq(id))
            .filter(E::stock_col().eq(available))
            .exec(conn)
            .await?;

        if floored.rows_affected == 1 {
            return Ok(StockDecrement {
                product,
                requested: quantity,
                available,
                remaining: 0,
                oversold: true,
            });
        }
    }

    Err(ServiceError::Conflict(format!(
        "Stock for {} changed concurrently",
        product
    )))
}
