#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::{json, Value};
use storefront_core::{
    config::AppConfig,
    db,
    entities::{game, payment_card, promo_code},
    errors::ServiceError,
    events::{self, EventSender},
    services::payment_gateway::{CreateSessionRequest, GatewaySession, PaymentGateway},
    webhooks::sign_payload,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret_for_integration";

/// In-process stand-in for the hosted payment gateway.
#[derive(Default)]
pub struct FakeGateway {
    calls: AtomicUsize,
    pub requests: Mutex<Vec<CreateSessionRequest>>,
    fail: bool,
    delay: Option<Duration>,
}

impl FakeGateway {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CreateSessionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ServiceError::ServiceUnavailable(
                "gateway down".to_string(),
            ));
        }
        self.requests.lock().unwrap().push(request);
        let id = format!("cs_test_{}_{}", n, Uuid::new_v4().simple());
        Ok(GatewaySession {
            url: format!("https://checkout.test/pay/{}", id),
            id,
        })
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        JWT_SECRET.to_string(),
        "test".to_string(),
    );
    // One connection, otherwise every pooled connection sees its own in-memory database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
    cfg.public_base_url = "https://shop.test".to_string();
    cfg.rate_limit_requests_per_window = 10_000;
    cfg.payment_gateway_timeout_secs = 2;
    cfg
}

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Option<Arc<FakeGateway>>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(test_config(), Some(Arc::new(FakeGateway::default()))).await
    }

    pub async fn with_gateway(gateway: Option<FakeGateway>) -> Self {
        Self::build(test_config(), gateway.map(Arc::new)).await
    }

    pub async fn build(cfg: AppConfig, gateway: Option<Arc<FakeGateway>>) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let dyn_gateway = gateway
            .clone()
            .map(|g| g as Arc<dyn PaymentGateway>);
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            dyn_gateway,
            Some(Arc::new(EventSender::new(event_tx))),
        );
        let router = storefront_core::build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    pub fn gateway(&self) -> &FakeGateway {
        self.gateway.as_deref().expect("test app has no gateway")
    }

    /// Signs a session token for `user_id` the way the session issuer would.
    pub fn token_for(&self, user_id: &str) -> String {
        let now = Utc::now().timestamp();
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &json!({
                "sub": user_id,
                "exp": now + 3600,
                "iat": now,
                "iss": "storefront-auth",
                "aud": "storefront-api",
            }),
            &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("encode access token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Posts a raw webhook body, signed with the configured secret unless
    /// `signature` overrides it.
    pub async fn post_webhook(
        &self,
        body: &str,
        signature: Option<&str>,
        sign: bool,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/payment")
            .header("content-type", "application/json");

        let header = match (signature, sign) {
            (Some(sig), _) => Some(sig.to_string()),
            (None, true) => Some(
                sign_payload(WEBHOOK_SECRET, Utc::now().timestamp(), body.as_bytes())
                    .expect("sign webhook"),
            ),
            (None, false) => None,
        };
        if let Some(header) = header {
            builder = builder.header("stripe-signature", header);
        }

        self.router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .expect("router error during webhook request")
    }

    pub async fn seed_game(&self, title: &str, price: Decimal, stock: i32) -> game::Model {
        self.seed_game_with(title, price, None, stock, stock > 0).await
    }

    pub async fn seed_game_with(
        &self,
        title: &str,
        price: Decimal,
        discount_price: Option<Decimal>,
        stock: i32,
        in_stock: bool,
    ) -> game::Model {
        let now = Utc::now();
        game::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            price: Set(price),
            discount_price: Set(discount_price),
            stock_quantity: Set(stock),
            in_stock: Set(in_stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed game")
    }

    pub async fn seed_card(&self, title: &str, price: Decimal, stock: i32) -> payment_card::Model {
        let now = Utc::now();
        payment_card::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            price: Set(price),
            discount_price: Set(None),
            stock_quantity: Set(stock),
            in_stock: Set(stock > 0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed payment card")
    }

    pub async fn seed_promo(&self, promo: promo_code::ActiveModel) -> promo_code::Model {
        promo.insert(&*self.state.db).await.expect("seed promo code")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// A promo code valid since yesterday with no limits.
pub fn promo(code: &str, discount_type: &str, value: Decimal) -> promo_code::ActiveModel {
    let now = Utc::now();
    promo_code::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        description: Set(Some(format!("{} promotion", code))),
        discount_type: Set(discount_type.to_string()),
        discount_value: Set(value),
        min_purchase: Set(None),
        max_discount: Set(None),
        usage_limit: Set(None),
        usage_count: Set(0),
        valid_from: Set(now - chrono::Duration::days(1)),
        valid_until: Set(None),
        active: Set(true),
        created_at: Set(now),
    }
}

/// A `checkout.session.completed` event body for `session_id`.
pub fn completed_event(session_id: &str, user_id: Option<&str>) -> String {
    let metadata = match user_id {
        Some(uid) => json!({ "userId": uid }),
        None => json!({}),
    };
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id, "metadata": metadata } }
    })
    .to_string()
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
