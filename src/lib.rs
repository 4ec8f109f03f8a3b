//! Storefront Core Library
//!
//! Cart ledger, checkout orchestration and payment reconciliation for an
//! online game and gift-card storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod rate_limiter;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{extract::FromRef, http::HeaderValue, middleware, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::AuthService;
use crate::cache::InMemoryCache;
use crate::events::EventSender;
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::services::payment_gateway::PaymentGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: Arc<AuthService>,
    pub cache: InMemoryCache,
    pub rate_limiter: RateLimiter,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the shared state. The cache created here is the only one in the
    /// process; rate limiting and checkout idempotency share it.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        payment_gateway: Option<Arc<dyn PaymentGateway>>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let cache = InMemoryCache::new();
        let auth = Arc::new(AuthService::new(
            &config.jwt_secret,
            &config.auth_issuer,
            &config.auth_audience,
        ));
        let rate_limiter = RateLimiter::new(
            cache.clone(),
            RateLimitConfig {
                requests_per_window: config.rate_limit_requests_per_window,
                window_duration: std::time::Duration::from_secs(config.rate_limit_window_seconds),
                enable_headers: true,
            },
        );
        let services = handlers::AppServices::new(
            db.clone(),
            &config,
            cache.clone(),
            payment_gateway,
            event_sender,
        );

        Self {
            db,
            config,
            auth,
            cache,
            rate_limiter,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Versioned API routes. Everything except the payment webhook is rate
/// limited; gateway redeliveries must never be throttled.
pub fn api_v1_routes(state: AppState) -> Router<AppState> {
    let limited = Router::new()
        .merge(handlers::cart::cart_routes())
        .merge(handlers::checkout::checkout_routes())
        .merge(handlers::promo::promo_routes())
        .merge(handlers::orders::orders_routes())
        .route_layer(middleware::from_fn_with_state(
            state,
            rate_limiter::rate_limit_middleware,
        ));

    Router::new()
        .merge(limited)
        .merge(handlers::payment_webhooks::payment_webhook_routes())
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_production() {
        // Unreachable with a validated config; deny cross-origin requests.
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    }
}

/// Full application router: health, the v1 API and Swagger UI, wrapped in
/// the HTTP middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = state.config.request_timeout();

    Router::new()
        .merge(handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes(state.clone()))
        .merge(openapi::swagger_ui())
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}

pub mod prelude {
    pub use crate::errors::*;
    pub use crate::models::*;
    pub use crate::services::cart::CartService;
    pub use crate::services::checkout::CheckoutService;
    pub use crate::services::inventory::InventoryService;
    pub use crate::services::promotions::PromotionService;
    pub use crate::services::reconciliation::ReconciliationService;
    pub use crate::{build_router, AppState};
}
