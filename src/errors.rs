use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "code": "OUT_OF_STOCK",
    "message": "Some items in your cart are out of stock",
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Extra structured context (e.g. the unmet minimum purchase)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Out of stock: {0}")]
    OutOfStock(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid cart total: {0}")]
    InvalidTotal(String),

    #[error("Webhook authenticity check failed: {0}")]
    Authenticity(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("This promo code is no longer active")]
    InactiveCode,

    #[error("This promo code is not yet valid")]
    NotYetValid,

    #[error("This promo code has expired")]
    Expired,

    #[error("This promo code has reached its usage limit")]
    UsageLimitReached,

    #[error("Minimum purchase of {0:.2} required for this promo code")]
    MinPurchaseNotMet(Decimal),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError(_)
            | Self::EmptyCart
            | Self::InvalidTotal(_)
            | Self::OutOfStock(_)
            | Self::Authenticity(_)
            | Self::InactiveCode
            | Self::NotYetValid
            | Self::Expired
            | Self::UsageLimitReached
            | Self::MinPurchaseNotMet(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ProductUnavailable(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => "INTERNAL_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ProductUnavailable(_) => "PRODUCT_UNAVAILABLE",
            Self::OutOfStock(_) => "OUT_OF_STOCK",
            Self::EmptyCart => "EMPTY_CART",
            Self::InvalidTotal(_) => "INVALID_TOTAL",
            Self::Authenticity(_) => "WEBHOOK_AUTHENTICITY",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::InactiveCode => "PROMO_INACTIVE",
            Self::NotYetValid => "PROMO_NOT_YET_VALID",
            Self::Expired => "PROMO_EXPIRED",
            Self::UsageLimitReached => "PROMO_USAGE_LIMIT_REACHED",
            Self::MinPurchaseNotMet(_) => "PROMO_MIN_PURCHASE_NOT_MET",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimitExceeded { .. } => "RATE_LIMITED",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable(_) => "Payment service is unavailable".to_string(),
            Self::Authenticity(_) => "Webhook signature verification failed".to_string(),
            Self::OutOfStock(_) => "Some items in your cart are out of stock".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::MinPurchaseNotMet(min) => Some(serde_json::json!({ "minPurchase": min })),
            _ => None,
        }
    }

    /// Whether the error is unexpected and must be logged before being reduced
    /// to the generic fallback.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::InternalError(_))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = current_request_id();

        if self.is_internal() {
            tracing::error!(request_id = ?request_id, error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimitExceeded { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("promo code".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.code, "NOT_FOUND");
    }

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::OutOfStock("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ProductUnavailable("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Authenticity("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::ServiceUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::RateLimitExceeded { retry_after_secs: 3 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("connection reset by peer".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(sea_orm::DbErr::Custom("secret dsn".into()))
                .response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::ServiceUnavailable("no api key".into()).response_message(),
            "Payment service is unavailable"
        );
        assert_eq!(
            ServiceError::ValidationError("Promo code is required".into()).response_message(),
            "Validation error: Promo code is required"
        );
    }

    #[tokio::test]
    async fn min_purchase_error_carries_threshold() {
        let response = ServiceError::MinPurchaseNotMet(dec!(50)).into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.message, "Minimum purchase of 50.00 required for this promo code");
        assert!(payload.details.is_some());
    }

    #[tokio::test]
    async fn rate_limit_sets_retry_after() {
        let response = ServiceError::RateLimitExceeded { retry_after_secs: 7 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }
}
