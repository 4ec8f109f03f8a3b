use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    cache::InMemoryCache,
    config::AppConfig,
    db::DbPool,
    entities::{order, order_item},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{OrderStatus, ProductRef, Purchasable},
    services::{
        cart::{CartItem, CartService},
        payment_gateway::{CreateSessionRequest, GatewayLineItem, PaymentGateway},
    },
};

const IN_FLIGHT: &str = "__in_flight__";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Converts a unit price to minor currency units, half away from zero.
pub fn to_minor_units(price: Decimal) -> Result<i64, ServiceError> {
    price
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| ServiceError::InvalidTotal(format!("Price {} is out of range", price)))
}

/// One cart line frozen at checkout time.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product: ProductRef,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSnapshot {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
}

/// Freezes prices and quantities for the whole cart, or rejects it.
///
/// The cart is rejected as a whole: one unavailable line fails checkout.
pub fn snapshot_cart(items: &[CartItem]) -> Result<CheckoutSnapshot, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::EmptyCart);
    }

    let unavailable: Vec<&str> = items
        .iter()
        .filter(|item| !item.product.in_stock())
        .map(|item| item.product.title())
        .collect();
    if !unavailable.is_empty() {
        return Err(ServiceError::OutOfStock(unavailable.join(", ")));
    }

    let mut total = Decimal::ZERO;
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let unit_price = item.product.effective_price();
        if unit_price.is_sign_negative() {
            return Err(ServiceError::InvalidTotal(format!(
                "{} has a negative price",
                item.product.title()
            )));
        }
        let line_total = unit_price
            .checked_mul(Decimal::from(item.line.quantity))
            .ok_or_else(|| ServiceError::InvalidTotal("Line total overflow".to_string()))?;
        total = total
            .checked_add(line_total)
            .ok_or_else(|| ServiceError::InvalidTotal("Cart total overflow".to_string()))?;

        lines.push(PricedLine {
            product: item.product.product_ref(),
            name: item.product.title().to_string(),
            quantity: item.line.quantity,
            unit_price,
            unit_amount: to_minor_units(unit_price)?,
        });
    }

    if total <= Decimal::ZERO {
        return Err(ServiceError::InvalidTotal(format!(
            "Cart total must be positive, got {}",
            total
        )));
    }

    Ok(CheckoutSnapshot { lines, total })
}

/// What the client is redirected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub order_id: Uuid,
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub public_base_url: String,
    pub currency: String,
    pub gateway_timeout: Duration,
    pub idempotency_ttl: Duration,
}

impl From<&AppConfig> for CheckoutSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            public_base_url: cfg.public_base_url.trim_end_matches('/').to_string(),
            currency: cfg.payment_currency.to_lowercase(),
            gateway_timeout: cfg.payment_gateway_timeout(),
            idempotency_ttl: cfg.checkout_idempotency_ttl(),
        }
    }
}

/// Releases an idempotency reservation unless the checkout completed.
struct Reservation<'a> {
    cache: &'a InMemoryCache,
    key: String,
    armed: bool,
}

impl Reservation<'_> {
    fn complete(mut self, value: &str, ttl: Duration) {
        self.cache.set(&self.key, value, Some(ttl));
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.delete(&self.key);
        }
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    db_pool: Arc<DbPool>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    cache: InMemoryCache,
    settings: CheckoutSettings,
    event_sender: Option<Arc<EventSender>>,
}

impl CheckoutService {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        cache: InMemoryCache,
        settings: CheckoutSettings,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            cache,
            settings,
            event_sender,
        }
    }

    /// Starts a hosted payment for everything in the user's cart.
    ///
    /// With an idempotency key, a repeat of a completed call returns the
    /// same session and a repeat of an in-flight call is a conflict.
    #[instrument(skip(self, idempotency_key), fields(user_id = %user_id))]
    pub async fn initiate(
        &self,
        user_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<CheckoutSession, ServiceError> {
        let Some(key) = idempotency_key else {
            return self.create_session(user_id).await;
        };

        let key = key.trim();
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Idempotency-Key must be 1 to {} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }

        let cache_key = format!("idem:checkout:{}:{}", user_id, key);
        let ttl = self.settings.idempotency_ttl;

        if !self.cache.set_if_absent(&cache_key, IN_FLIGHT, Some(ttl)) {
            return match self.cache.get(&cache_key) {
                Some(stored) if stored != IN_FLIGHT => {
                    info!("replaying checkout for repeated idempotency key");
                    serde_json::from_str(&stored).map_err(|e| {
                        ServiceError::InternalError(format!("corrupt idempotency record: {}", e))
                    })
                }
                _ => Err(ServiceError::Conflict(
                    "A checkout with this Idempotency-Key is already in progress".to_string(),
                )),
            };
        }

        let reservation = Reservation {
            cache: &self.cache,
            key: cache_key,
            armed: true,
        };

        let session = self.create_session(user_id).await?;
        match serde_json::to_string(&session) {
            Ok(stored) => reservation.complete(&stored, ttl),
            Err(e) => warn!(error = %e, "could not store checkout for replay"),
        }
        Ok(session)
    }

    async fn create_session(&self, user_id: &str) -> Result<CheckoutSession, ServiceError> {
        let items = CartService::list_with(&*self.db_pool, user_id).await?;
        let snapshot = snapshot_cart(&items)?;

        let gateway = self.gateway.as_ref().ok_or_else(|| {
            error!("checkout attempted without a configured payment gateway");
            ServiceError::ServiceUnavailable("Payment processing is not configured".to_string())
        })?;

        let request = CreateSessionRequest {
            line_items: snapshot
                .lines
                .iter()
                .map(|line| GatewayLineItem {
                    name: line.name.clone(),
                    unit_amount: line.unit_amount,
                    quantity: line.quantity,
                })
                .collect(),
            currency: self.settings.currency.clone(),
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.settings.public_base_url
            ),
            cancel_url: format!("{}/cart", self.settings.public_base_url),
            metadata: BTreeMap::from([("userId".to_string(), user_id.to_string())]),
        };

        let session = tokio::time::timeout(self.settings.gateway_timeout, gateway.create_session(request))
            .await
            .map_err(|_| {
                error!(timeout = ?self.settings.gateway_timeout, "payment gateway timed out");
                ServiceError::ServiceUnavailable("Payment gateway timed out".to_string())
            })??;

        let order_id = self
            .persist_order(user_id, &session.id, &snapshot)
            .await
            .map_err(|e| {
                error!(
                    user_id = %user_id,
                    session_id = %session.id,
                    error = %e,
                    "payment session created but order could not be stored"
                );
                e
            })?;

        counter!("storefront_checkout_sessions_created_total", 1);
        info!(order_id = %order_id, session_id = %session.id, total = %snapshot.total, "checkout session created");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::CheckoutSessionCreated {
                    order_id,
                    user_id: user_id.to_string(),
                    session_id: session.id.clone(),
                })
                .await;
        }

        Ok(CheckoutSession {
            order_id,
            session_id: session.id,
            url: session.url,
        })
    }

    async fn persist_order(
        &self,
        user_id: &str,
        session_id: &str,
        snapshot: &CheckoutSnapshot,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id.to_string()),
            total: Set(snapshot.total),
            status: Set(OrderStatus::Pending.to_string()),
            external_session_id: Set(session_id.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let items = snapshot.lines.iter().map(|line| order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            game_id: Set(line.product.game_id()),
            payment_card_id: Set(line.product.payment_card_id()),
            quantity: Set(line.quantity),
            price_at_purchase: Set(line.unit_price),
        });
        order_item::Entity::insert_many(items)
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(order_id)
    }
}
