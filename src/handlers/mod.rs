pub mod cart;
pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod promo;

use crate::cache::InMemoryCache;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    cart::CartService,
    checkout::{CheckoutService, CheckoutSettings},
    inventory::InventoryService,
    orders::OrderService,
    payment_gateway::PaymentGateway,
    promotions::PromotionService,
    reconciliation::ReconciliationService,
};
use crate::webhooks::WebhookVerifier;
use crate::db::DbPool;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<InventoryService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub promotions: Arc<PromotionService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    /// Wires every service over one pool, cache and event channel.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        cache: InMemoryCache,
        payment_gateway: Option<Arc<dyn PaymentGateway>>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let inventory = InventoryService::new(db_pool.clone(), event_sender.clone());
        let cart = CartService::new(db_pool.clone(), inventory.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db_pool.clone(),
            payment_gateway,
            cache,
            CheckoutSettings::from(config),
            event_sender.clone(),
        );
        let reconciliation = ReconciliationService::new(
            db_pool.clone(),
            WebhookVerifier::new(
                config.payment_webhook_secret.clone(),
                config.payment_webhook_tolerance_secs,
            ),
            inventory.clone(),
            cart.clone(),
            event_sender,
        );
        let promotions = PromotionService::new(db_pool.clone());
        let orders = OrderService::new(db_pool);

        Self {
            inventory: Arc::new(inventory),
            cart: Arc::new(cart),
            checkout: Arc::new(checkout),
            reconciliation: Arc::new(reconciliation),
            promotions: Arc::new(promotions),
            orders: Arc::new(orders),
        }
    }
}
