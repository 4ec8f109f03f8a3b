use crate::handlers::common::success_response;
use crate::{errors::ServiceError, webhooks::SIGNATURE_HEADER, AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

/// Creates the router for the payment gateway webhook
pub fn payment_webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/payment", post(payment_webhook))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Receive a signed payment gateway event
///
/// No bearer auth: the signature over the raw body is the credential.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payment",
    request_body(content = String, content_type = "application/json"),
    params(
        ("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")
    ),
    responses(
        (status = 200, description = "Event authenticated and accepted", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature, or unreadable payload", body = crate::errors::ErrorResponse),
        (status = 500, description = "Processing failed; safe to redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .services
        .reconciliation
        .handle(&body, signature)
        .await?;
    debug!(?outcome, "payment webhook processed");

    Ok(success_response(WebhookAck { received: true }))
}
