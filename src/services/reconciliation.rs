use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity},
        order_item::{self, Entity as OrderItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::OrderStatus,
    services::{cart::CartService, inventory::InventoryService},
    webhooks::{WebhookEvent, WebhookVerifier},
};

/// What an authenticated webhook delivery amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Event type this service does not act on.
    Ignored { event_type: String },
    /// No order carries this session id.
    UnknownSession { session_id: String },
    /// The order had already left PENDING; nothing was repeated.
    Duplicate { order_id: Uuid },
    Paid {
        order_id: Uuid,
        items_decremented: usize,
        items_failed: usize,
        cart_lines_cleared: Option<u64>,
    },
}

/// Applies payment confirmations to orders, stock and carts.
#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
    verifier: WebhookVerifier,
    inventory: InventoryService,
    cart: CartService,
    event_sender: Option<Arc<EventSender>>,
}

impl ReconciliationService {
    pub fn new(
        db_pool: Arc<DbPool>,
        verifier: WebhookVerifier,
        inventory: InventoryService,
        cart: CartService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            verifier,
            inventory,
            cart,
            event_sender,
        }
    }

    /// Verifies and applies one webhook delivery.
    ///
    /// The signature is checked against the raw bytes before anything is
    /// parsed. Redeliveries are safe: only the first delivery wins the
    /// PENDING to PAID transition and only the winner touches stock and cart.
    #[instrument(skip(self, raw_body, signature), fields(bytes = raw_body.len()))]
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        counter!("storefront_webhook_events_received_total", 1);

        if let Err(e) = self
            .verifier
            .verify(signature, raw_body, Utc::now().timestamp())
        {
            counter!("storefront_webhook_events_rejected_total", 1);
            warn!(error = %e, "rejected unauthenticated webhook");
            return Err(e);
        }

        let event: WebhookEvent = serde_json::from_slice(raw_body).map_err(|e| {
            warn!(error = %e, "authenticated webhook has an unreadable payload");
            ServiceError::ValidationError(format!("Invalid webhook payload: {}", e))
        })?;

        if !event.is_checkout_completed() {
            info!(event_id = %event.id, event_type = %event.event_type, "ignoring webhook event");
            return Ok(ReconcileOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        self.complete_checkout(&event).await
    }

    async fn acknowledge_duplicate(
        &self,
        order_id: Uuid,
        current: OrderStatus,
        session_id: &str,
    ) -> ReconcileOutcome {
        counter!("storefront_webhook_duplicates_ignored_total", 1);
        info!(
            order_id = %order_id,
            status = %current,
            terminal = current.is_terminal(),
            "order already past PENDING; skipping side effects"
        );
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::DuplicatePaymentConfirmation {
                    session_id: session_id.to_string(),
                })
                .await;
        }
        ReconcileOutcome::Duplicate { order_id }
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, session_id = %event.data.object.id))]
    async fn complete_checkout(&self, event: &WebhookEvent) -> Result<ReconcileOutcome, ServiceError> {
        let db = &*self.db_pool;
        let session_id = event.data.object.id.as_str();

        let Some(order) = OrderEntity::find()
            .filter(order::Column::ExternalSessionId.eq(session_id))
            .one(db)
            .await?
        else {
            warn!("no order for completed checkout session; acknowledging");
            return Ok(ReconcileOutcome::UnknownSession {
                session_id: session_id.to_string(),
            });
        };

        // Status only moves forward, so a row already past PENDING can be
        // acknowledged without touching it.
        if let Ok(current) = OrderStatus::from_str(&order.status) {
            if !current.can_transition_to(OrderStatus::Paid) {
                return Ok(self.acknowledge_duplicate(order.id, current, session_id).await);
            }
        }

        let transition = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .exec(db)
            .await
            .map_err(|e| {
                error!(order_id = %order.id, error = %e, "failed to mark order paid");
                ServiceError::from(e)
            })?;

        if transition.rows_affected == 0 {
            // Lost the race to a concurrent delivery of the same event.
            return Ok(self
                .acknowledge_duplicate(order.id, OrderStatus::Paid, session_id)
                .await);
        }

        counter!("storefront_orders_paid_total", 1);
        info!(order_id = %order.id, "order marked paid");

        let (items_decremented, items_failed) = self.decrement_stock(order.id).await;

        let user_id = match event.data.object.metadata.user_id.as_deref() {
            Some(uid) if !uid.is_empty() => {
                if uid != order.user_id {
                    warn!(order_id = %order.id, metadata_user = %uid, order_user = %order.user_id, "session metadata names a different user than the order");
                }
                uid
            }
            _ => order.user_id.as_str(),
        };

        let cart_lines_cleared = match self.cart.clear_all(user_id).await {
            Ok(n) => Some(n),
            Err(e) => {
                error!(order_id = %order.id, user_id = %user_id, error = %e, "failed to clear cart after payment");
                None
            }
        };

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderPaid {
                    order_id: order.id,
                    session_id: session_id.to_string(),
                })
                .await;
        }

        Ok(ReconcileOutcome::Paid {
            order_id: order.id,
            items_decremented,
            items_failed,
            cart_lines_cleared,
        })
    }

    /// Decrements stock per order item. Each item stands alone; a failure is
    /// logged and counted but never stops the rest.
    async fn decrement_stock(&self, order_id: Uuid) -> (usize, usize) {
        let items = match OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db_pool)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                counter!("storefront_inventory_decrement_failures_total", 1);
                error!(order_id = %order_id, error = %e, "failed to load order items for stock decrement");
                return (0, 0);
            }
        };

        let mut decremented = 0;
        let mut failed = 0;
        for item in items {
            let Some(product) = item.product_ref() else {
                failed += 1;
                counter!("storefront_inventory_decrement_failures_total", 1);
                error!(order_id = %order_id, item_id = %item.id, "order item has no product reference");
                continue;
            };

            match self.inventory.decrement(product, item.quantity).await {
                Ok(_) => decremented += 1,
                Err(e) => {
                    failed += 1;
                    counter!("storefront_inventory_decrement_failures_total", 1);
                    error!(
                        order_id = %order_id,
                        item_id = %item.id,
                        product = %product,
                        error = %e,
                        "stock decrement failed"
                    );
                }
            }
        }

        (decremented, failed)
    }
}
