use crate::handlers::common::success_response;
use crate::{auth::AuthUser, errors::ServiceError, AppState};
use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout", post(create_checkout_session))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    /// Hosted payment page to redirect the shopper to
    pub url: String,
}

/// Start a hosted payment for the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Repeat-safe key; a repeat replays the first session")
    ),
    responses(
        (status = 200, description = "Payment session created", body = CheckoutResponse),
        (status = 400, description = "Empty cart, out-of-stock item or invalid total", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 409, description = "Same Idempotency-Key already in flight", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let idempotency_key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(value.to_str().map_err(|_| {
            ServiceError::ValidationError("Idempotency-Key must be visible ASCII".to_string())
        })?),
        None => None,
    };

    let session = state
        .services
        .checkout
        .initiate(&user.user_id, idempotency_key)
        .await?;

    Ok(success_response(CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}
