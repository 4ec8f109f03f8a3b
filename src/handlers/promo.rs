use crate::handlers::common::{success_response, validate_input};
use crate::{
    auth::AuthUser, errors::ServiceError, models::DiscountType,
    services::promotions::PromoQuote, AppState,
};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Creates the router for promo code endpoints
pub fn promo_routes() -> Router<AppState> {
    Router::new().route("/promo/validate", post(validate_promo_code))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoRequest {
    #[validate(length(min = 1, message = "Promo code is required"))]
    pub code: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub cart_total: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoResponse {
    pub valid: bool,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub discount_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub discount_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub original_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub final_total: Decimal,
}

impl From<PromoQuote> for ValidatePromoResponse {
    fn from(quote: PromoQuote) -> Self {
        Self {
            valid: true,
            code: quote.code,
            description: quote.description,
            discount_type: quote.discount_type,
            discount_value: quote.discount_value,
            discount_amount: quote.discount_amount,
            original_total: quote.original_total,
            final_total: quote.final_total,
        }
    }
}

/// Price a promo code against a cart total without redeeming it
#[utoipa::path(
    post,
    path = "/api/v1/promo/validate",
    request_body = ValidatePromoRequest,
    responses(
        (status = 200, description = "Code is valid; discount computed", body = ValidatePromoResponse),
        (status = 400, description = "Inactive, not yet valid, expired, exhausted or minimum not met", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown code", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Promotions"
)]
pub async fn validate_promo_code(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<ValidatePromoRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let quote = state
        .services
        .promotions
        .validate(&payload.code, payload.cart_total)
        .await?;

    Ok(success_response(ValidatePromoResponse::from(quote)))
}
