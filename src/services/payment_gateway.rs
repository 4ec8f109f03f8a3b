//! Client side of the hosted payment gateway.
//!
//! Checkout only needs one synchronous call, session creation. The
//! asynchronous half of the contract (signed webhooks) lives in
//! `crate::webhooks`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, instrument};

use crate::errors::ServiceError;

/// One priced line as the gateway sees it. Amounts are in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionRequest {
    pub line_items: Vec<GatewayLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewaySession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;
}

/// Stripe Checkout Sessions over plain HTTPS.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StripeGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    /// Flattens the request into Stripe's bracketed form encoding.
    pub fn form_fields(request: &CreateSessionRequest) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            fields.push((
                format!("{}[price_data][currency]", prefix),
                request.currency.clone(),
            ));
            fields.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_amount.to_string(),
            ));
            fields.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.name.clone(),
            ));
            fields.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        for (key, value) in &request.metadata {
            fields.push((format!("metadata[{}]", key), value.clone()));
        }

        fields
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&Self::form_fields(&request))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "payment gateway request failed");
                ServiceError::ServiceUnavailable(format!("payment gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "payment gateway rejected session creation");
            return Err(ServiceError::ServiceUnavailable(format!(
                "payment gateway returned {}",
                status
            )));
        }

        response.json::<GatewaySession>().await.map_err(|e| {
            error!(error = %e, "payment gateway returned an unreadable session");
            ServiceError::ServiceUnavailable(format!("invalid gateway response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CreateSessionRequest {
        CreateSessionRequest {
            line_items: vec![GatewayLineItem {
                name: "Starfall Tactics".into(),
                unit_amount: 1999,
                quantity: 2,
            }],
            currency: "usd".into(),
            success_url: "https://shop.test/checkout/success?session_id={CHECKOUT_SESSION_ID}"
                .into(),
            cancel_url: "https://shop.test/cart".into(),
            metadata: BTreeMap::from([("userId".to_string(), "user-7".to_string())]),
        }
    }

    #[test]
    fn form_fields_use_bracketed_keys() {
        let fields = StripeGateway::form_fields(&request());
        let get = |k: &str| {
            fields
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1999"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("metadata[userId]"), Some("user-7"));
    }

    #[tokio::test]
    async fn create_session_posts_form_and_parses_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("metadata%5BuserId%5D=user-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": "https://checkout.test/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway =
            StripeGateway::new(server.uri(), "sk_test_123", Duration::from_secs(5)).unwrap();
        let session = gateway.create_session(request()).await.unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url, "https://checkout.test/pay/cs_test_1");
    }

    #[tokio::test]
    async fn gateway_error_status_is_service_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_string("card_declined"))
            .mount(&server)
            .await;

        let gateway =
            StripeGateway::new(server.uri(), "sk_test_123", Duration::from_secs(5)).unwrap();
        assert_matches!(
            gateway.create_session(request()).await,
            Err(ServiceError::ServiceUnavailable(_))
        );
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(serde_json::json!({ "id": "cs", "url": "u" })),
            )
            .mount(&server)
            .await;

        let gateway =
            StripeGateway::new(server.uri(), "sk_test_123", Duration::from_millis(200)).unwrap();
        assert_matches!(
            gateway.create_session(request()).await,
            Err(ServiceError::ServiceUnavailable(_))
        );
    }
}
