use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Core API",
        version = "0.1.0",
        description = r#"
# Storefront transaction core

Cart, checkout and payment reconciliation for a game and gift-card storefront.

## Authentication

Sessions are issued elsewhere. Send the issued token as a bearer token:

```
Authorization: Bearer <session-jwt>
```

`GET /cart` also accepts anonymous callers and returns an empty cart.
The payment webhook is authenticated by its `Stripe-Signature` header only.

## Idempotent checkout

`POST /checkout` accepts an `Idempotency-Key` header. Repeating a completed
request replays the original session; repeating one still in flight returns 409.

## Rate Limiting

Cart, checkout, promo and order routes are rate-limited per caller:
- `X-RateLimit-Limit`: Maximum requests per window
- `X-RateLimit-Remaining`: Remaining requests in current window
- `X-RateLimit-Reset`: Seconds until the window resets
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Cart", description = "Per-user cart lines"),
        (name = "Checkout", description = "Hosted payment session creation"),
        (name = "Payments", description = "Payment gateway webhooks"),
        (name = "Promotions", description = "Promo code validation"),
        (name = "Orders", description = "Order history"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_to_cart,
        crate::handlers::cart::update_cart_item,
        crate::handlers::cart::remove_cart_item,
        crate::handlers::checkout::create_checkout_session,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::promo::validate_promo_code,
        crate::handlers::orders::list_orders,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::handlers::cart::CartResponse,
            crate::handlers::cart::CartItemResponse,
            crate::handlers::cart::CartLineResponse,
            crate::handlers::cart::ProductSummary,
            crate::handlers::cart::AddToCartRequest,
            crate::handlers::cart::UpdateCartRequest,
            crate::handlers::common::SuccessResponse,
            crate::handlers::common::PaginationMeta,
            crate::handlers::checkout::CheckoutResponse,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::handlers::promo::ValidatePromoRequest,
            crate::handlers::promo::ValidatePromoResponse,
            crate::handlers::orders::OrderListResponse,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderItemResponse,
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentStatus,
            crate::models::OrderStatus,
            crate::models::DiscountType,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}
