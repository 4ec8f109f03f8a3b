use crate::handlers::common::{success_response, PaginationMeta, PaginationParams};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    models::OrderStatus,
    services::orders::{OrderItemView, OrderWithItems},
    AppState,
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for order history endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new().route("/orders", get(list_orders))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub game_id: Option<Uuid>,
    pub payment_card_id: Option<Uuid>,
    pub product_title: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price_at_purchase: Decimal,
}

impl From<OrderItemView> for OrderItemResponse {
    fn from(view: OrderItemView) -> Self {
        Self {
            id: view.item.id,
            game_id: view.item.game_id,
            payment_card_id: view.item.payment_card_id,
            product_title: view.product_title,
            quantity: view.item.quantity,
            price_at_purchase: view.item.price_at_purchase,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total: Decimal,
    /// Unrecognized stored values are passed through as-is
    pub status: String,
    pub external_session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

impl From<OrderWithItems> for OrderResponse {
    fn from(entry: OrderWithItems) -> Self {
        let status = OrderStatus::from_str(&entry.order.status)
            .map(|s| s.to_string())
            .unwrap_or(entry.order.status);
        Self {
            id: entry.order.id,
            total: entry.order.total,
            status,
            external_session_id: entry.order.external_session_id,
            created_at: entry.order.created_at,
            updated_at: entry.order.updated_at,
            items: entry.items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub pagination: PaginationMeta,
}

/// The caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "One page of order history", body = OrderListResponse),
        (status = 400, description = "Page out of range", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .orders
        .list_for_user(&user.user_id, params.page, params.limit)
        .await?;

    Ok(success_response(OrderListResponse {
        pagination: PaginationMeta {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages,
        },
        orders: page.orders.into_iter().map(OrderResponse::from).collect(),
    }))
}
