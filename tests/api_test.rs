mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use common::{completed_event, json_body, promo, test_config, FakeGateway, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None, None, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None, &[]).await;
    assert!(response.headers().contains_key("x-request-id"));

    let response = app
        .request(
            Method::GET,
            "/api/v1/cart",
            None,
            None,
            &[("x-request-id", "req-from-client")],
        )
        .await;
    assert_eq!(response.headers()["x-request-id"], "req-from-client");
}

#[tokio::test]
async fn anonymous_cart_is_empty_but_writes_need_a_session() {
    let app = TestApp::new().await;
    let game = app.seed_game("Open Skies", dec!(10.00), 5).await;

    let response = app.request(Method::GET, "/api/v1/cart", None, None, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "items": [] }));

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "gameId": game.id })),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "gameId": game.id })),
            Some("not-a-jwt"),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cart_crud_over_http() {
    let app = TestApp::new().await;
    let game = app
        .seed_game_with("Harbor Lights", dec!(20.00), Some(dec!(15.00)), 5, true)
        .await;
    let token = app.token_for("shopper");

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "gameId": game.id, "quantity": 2 })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["item"]["quantity"], 2);
    assert_eq!(body["item"]["product"]["kind"], "game");
    assert_eq!(body["item"]["subtotal"], 30.0);

    let response = app
        .request(
            Method::PATCH,
            "/api/v1/cart",
            Some(json!({ "gameId": game.id, "quantity": 4 })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(json_body(response).await["item"]["quantity"], 4);

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token), &[])
        .await;
    let body = json_body(response).await;
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["items"][0]["product"]["effectivePrice"], 15.0);

    let response = app
        .request(
            Method::PATCH,
            "/api/v1/cart",
            Some(json!({ "gameId": game.id, "quantity": 0 })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(json_body(response).await, json!({ "success": true }));

    let uri = format!("/api/v1/cart?gameId={}", game.id);
    let response = app
        .request(Method::DELETE, &uri, None, Some(&token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cart_rejects_ambiguous_product_references() {
    let app = TestApp::new().await;
    let game = app.seed_game("Twin Peaks", dec!(10.00), 5).await;
    let card = app.seed_card("Gift Card 5", dec!(5.00), 5).await;
    let token = app.token_for("shopper");

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "gameId": game.id, "paymentCardId": card.id })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::POST, "/api/v1/cart", Some(json!({})), Some(&token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_over_http_then_paid_and_listed() {
    let app = TestApp::new().await;
    let card = app.seed_card("Gift Card 100", dec!(100.00), 3).await;
    let token = app.token_for("shopper");

    app.request(
        Method::POST,
        "/api/v1/cart",
        Some(json!({ "paymentCardId": card.id })),
        Some(&token),
        &[],
    )
    .await;

    let response = app
        .request(Method::POST, "/api/v1/checkout", None, None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            None,
            Some(&token),
            &[("idempotency-key", "http-key-1")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let first = json_body(response).await;
    let session_id = first["sessionId"].as_str().unwrap().to_string();
    assert!(first["url"].as_str().unwrap().contains(&session_id));

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            None,
            Some(&token),
            &[("idempotency-key", "http-key-1")],
        )
        .await;
    assert_eq!(json_body(response).await, first);
    assert_eq!(app.gateway().calls(), 1);

    let webhook = app
        .post_webhook(&completed_event(&session_id, Some("shopper")), None, true)
        .await;
    assert_eq!(webhook.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/orders?page=1&limit=5", None, Some(&token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["orders"][0]["status"], "PAID");
    assert_eq!(body["orders"][0]["total"], 100.0);
    assert_eq!(body["orders"][0]["items"][0]["productTitle"], "Gift Card 100");
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["limit"], 5);

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders?page=18446744073709551615&limit=50",
            None,
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token), &[])
        .await;
    assert_eq!(json_body(response).await, json!({ "items": [] }));
}

#[tokio::test]
async fn empty_cart_checkout_is_a_bad_request() {
    let app = TestApp::new().await;
    let token = app.token_for("shopper");

    let response = app
        .request(Method::POST, "/api/v1/checkout", None, Some(&token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "EMPTY_CART");
}

#[tokio::test]
async fn promo_validation_over_http() {
    let app = TestApp::new().await;
    app.seed_promo(promo("SAVE10", "PERCENTAGE", dec!(10))).await;
    let token = app.token_for("shopper");

    let response = app
        .request(
            Method::POST,
            "/api/v1/promo/validate",
            Some(json!({ "code": "save10", "cartTotal": 100 })),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/promo/validate",
            Some(json!({ "code": "save10", "cartTotal": 100 })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["code"], "SAVE10");
    assert_eq!(body["discountType"], "PERCENTAGE");
    assert_eq!(body["discountAmount"], 10.0);
    assert_eq!(body["finalTotal"], 90.0);

    let response = app
        .request(
            Method::POST,
            "/api/v1/promo/validate",
            Some(json!({ "code": "MISSING", "cartTotal": 100 })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            "/api/v1/promo/validate",
            Some(json!({ "code": "save10", "cartTotal": 7.0e28 })),
            Some(&token),
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_routes_are_rate_limited_but_webhooks_are_not() {
    let mut cfg = test_config();
    cfg.rate_limit_requests_per_window = 2;
    let app = TestApp::build(cfg, Some(Arc::new(FakeGateway::default()))).await;
    let token = app.token_for("busy");

    for _ in 0..2 {
        let response = app
            .request(Method::GET, "/api/v1/cart", None, Some(&token), &[])
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }
    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token), &[])
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Another caller has its own budget.
    let other = app.token_for("calm");
    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&other), &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    for _ in 0..5 {
        let response = app
            .post_webhook(&completed_event("cs_unknown", None), None, true)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None, &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["paths"]["/api/v1/checkout"].is_object());
}
