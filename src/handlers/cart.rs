use crate::handlers::common::{success_response, SuccessResponse};
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    errors::ServiceError,
    models::{ProductRef, ProductSnapshot, Purchasable},
    services::cart::CartItem,
    AppState,
};
use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Creates the router for cart endpoints
pub fn cart_routes() -> Router<AppState> {
    Router::new().route(
        "/cart",
        get(get_cart)
            .post(add_to_cart)
            .patch(update_cart_item)
            .delete(remove_cart_item),
    )
}

/// Live product data joined onto a cart line
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: Uuid,
    /// `game` or `paymentCard`
    pub kind: String,
    pub title: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    #[schema(value_type = Option<f64>)]
    pub discount_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub effective_price: Decimal,
    pub stock_quantity: i32,
    pub in_stock: bool,
}

impl From<&ProductSnapshot> for ProductSummary {
    fn from(product: &ProductSnapshot) -> Self {
        let kind = match product {
            ProductSnapshot::Game(_) => "game",
            ProductSnapshot::Card(_) => "paymentCard",
        };
        Self {
            id: product.id(),
            kind: kind.to_string(),
            title: product.title().to_string(),
            price: product.price(),
            discount_price: product.discount_price(),
            effective_price: product.effective_price(),
            stock_quantity: product.stock_quantity(),
            in_stock: product.in_stock(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineResponse {
    pub id: Uuid,
    pub game_id: Option<Uuid>,
    pub payment_card_id: Option<Uuid>,
    pub quantity: i32,
    pub product: ProductSummary,
    /// Live subtotal; prices are frozen only at checkout
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub subtotal: Decimal,
}

impl From<&CartItem> for CartLineResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.line.id,
            game_id: item.line.game_id,
            payment_card_id: item.line.payment_card_id,
            quantity: item.line.quantity,
            product: ProductSummary::from(&item.product),
            subtotal: item.subtotal(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartLineResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItemResponse {
    pub item: CartLineResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub game_id: Option<Uuid>,
    pub payment_card_id: Option<Uuid>,
    /// Defaults to 1; clamped to 1..=99
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartRequest {
    pub game_id: Option<Uuid>,
    pub payment_card_id: Option<Uuid>,
    /// Zero or less removes the line
    pub quantity: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RemoveFromCartQuery {
    pub game_id: Option<Uuid>,
    pub payment_card_id: Option<Uuid>,
}

/// List the caller's cart with live product data
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart lines; empty for anonymous callers", body = CartResponse)
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let items = match user {
        Some(user) => state.services.cart.list(&user.user_id).await?,
        None => Vec::new(),
    };

    Ok(success_response(CartResponse {
        items: items.iter().map(CartLineResponse::from).collect(),
    }))
}

/// Add a product to the cart or increase its quantity
#[utoipa::path(
    post,
    path = "/api/v1/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Line created or incremented", body = CartItemResponse),
        (status = 400, description = "Invalid product reference", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product missing or out of stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = ProductRef::from_request(payload.game_id, payload.payment_card_id)?;
    let item = state
        .services
        .cart
        .upsert(&user.user_id, product, payload.quantity.unwrap_or(1))
        .await?;

    Ok(success_response(CartItemResponse {
        item: CartLineResponse::from(&item),
    }))
}

/// Overwrite a line's quantity; zero or less removes it
#[utoipa::path(
    patch,
    path = "/api/v1/cart",
    request_body = UpdateCartRequest,
    responses(
        (status = 200, description = "Updated line, or success flag when removed", body = CartItemResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such cart line", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = ProductRef::from_request(payload.game_id, payload.payment_card_id)?;
    let updated = state
        .services
        .cart
        .set_quantity(&user.user_id, product, payload.quantity)
        .await?;

    Ok(match updated {
        Some(item) => success_response(CartItemResponse {
            item: CartLineResponse::from(&item),
        }),
        None => success_response(SuccessResponse::ok()),
    })
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    params(RemoveFromCartQuery),
    responses(
        (status = 200, description = "Removed (or already absent)", body = SuccessResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RemoveFromCartQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = ProductRef::from_request(query.game_id, query.payment_card_id)?;
    state.services.cart.remove(&user.user_id, product).await?;
    Ok(success_response(SuccessResponse::ok()))
}
