use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    },
    errors::ServiceError,
    models::{ProductSnapshot, Purchasable},
    services::inventory::InventoryService,
};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 50;

/// An order item with the product title it currently resolves to.
#[derive(Debug, Clone)]
pub struct OrderItemView {
    pub item: OrderItemModel,
    /// `None` once the product has been removed from the catalog.
    pub product_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderWithItems>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// Normalizes raw paging input: page starts at 1, limit is held in `1..=50`.
///
/// Pages whose row offset would not fit a signed 64-bit SQL offset are
/// rejected.
pub fn normalize_paging(
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<(u64, u64), ServiceError> {
    let page = page.filter(|p| *p >= 1).unwrap_or(1);
    let limit = limit
        .filter(|l| *l >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);

    match page.checked_mul(limit) {
        Some(end) if end <= i64::MAX as u64 => Ok((page, limit)),
        _ => Err(ServiceError::ValidationError(
            "Page is out of range".to_string(),
        )),
    }
}

/// Read side of a user's order history.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// The user's orders, newest first, with their items.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(
        &self,
        user_id: &str,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<OrderPage, ServiceError> {
        let db = &*self.db_pool;
        let (page, limit) = normalize_paging(page, limit)?;

        let paginator = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(user_id = %user_id, error = %e, "failed to count orders");
            ServiceError::from(e)
        })?;
        let orders = paginator.fetch_page(page - 1).await?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = if order_ids.is_empty() {
            Vec::new()
        } else {
            OrderItemEntity::find()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .all(db)
                .await?
        };

        let products =
            InventoryService::find_products(db, items.iter().filter_map(|i| i.product_ref()))
                .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderItemView>> = HashMap::new();
        for item in items {
            let product_title = item
                .product_ref()
                .and_then(|r| products.get(&r))
                .map(|p: &ProductSnapshot| p.title().to_string());
            by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderItemView {
                    item,
                    product_title,
                });
        }

        let orders = orders
            .into_iter()
            .map(|order| OrderWithItems {
                items: by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect();

        Ok(OrderPage {
            orders,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_clamps() {
        assert_eq!(normalize_paging(None, None).unwrap(), (1, 10));
        assert_eq!(normalize_paging(Some(0), Some(0)).unwrap(), (1, 10));
        assert_eq!(normalize_paging(Some(3), Some(500)).unwrap(), (3, 50));
        assert_eq!(normalize_paging(Some(2), Some(5)).unwrap(), (2, 5));
    }

    #[test]
    fn huge_pages_are_rejected() {
        assert!(matches!(
            normalize_paging(Some(u64::MAX), Some(50)),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            normalize_paging(Some(u64::MAX / 10), None),
            Err(ServiceError::ValidationError(_))
        ));
        let last = i64::MAX as u64 / 50;
        assert_eq!(normalize_paging(Some(last), Some(50)).unwrap(), (last, 50));
    }
}
