mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{promo, TestApp};
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveValue::Set, EntityTrait};
use storefront_core::{entities::promo_code, errors::ServiceError, models::DiscountType};

#[rstest]
#[case::percentage("SAVE10", "PERCENTAGE", dec!(10), None, dec!(100), dec!(10), dec!(90))]
#[case::percentage_capped("HALFOFF", "PERCENTAGE", dec!(50), Some(dec!(20)), dec!(100), dec!(20), dec!(80))]
#[case::fixed_capped_at_total("THIRTY", "FIXED", dec!(30), None, dec!(20), dec!(20), dec!(0))]
#[case::fixed("FIVE", "FIXED", dec!(5), None, dec!(42.50), dec!(5), dec!(37.50))]
#[tokio::test]
async fn quotes_discounts(
    #[case] code: &str,
    #[case] discount_type: &str,
    #[case] value: Decimal,
    #[case] max_discount: Option<Decimal>,
    #[case] total: Decimal,
    #[case] expected_discount: Decimal,
    #[case] expected_final: Decimal,
) {
    let app = TestApp::new().await;
    let mut model = promo(code, discount_type, value);
    model.max_discount = Set(max_discount);
    app.seed_promo(model).await;

    let quote = app
        .state
        .services
        .promotions
        .validate(code, total)
        .await
        .unwrap();

    assert_eq!(quote.code, code);
    assert_eq!(quote.discount_amount, expected_discount);
    assert_eq!(quote.final_total, expected_final);
    assert_eq!(quote.original_total, total);
}

#[tokio::test]
async fn codes_are_matched_case_insensitively() {
    let app = TestApp::new().await;
    app.seed_promo(promo("WELCOME", "PERCENTAGE", dec!(25))).await;

    let quote = app
        .state
        .services
        .promotions
        .validate("  welcome ", dec!(40))
        .await
        .unwrap();
    assert_eq!(quote.code, "WELCOME");
    assert_eq!(quote.discount_type, DiscountType::Percentage);
    assert_eq!(quote.discount_amount, dec!(10));
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .promotions
        .validate("NOPE", dec!(10))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn rejects_blank_code_and_non_positive_total() {
    let app = TestApp::new().await;
    let promotions = &app.state.services.promotions;

    assert_matches!(
        promotions.validate("  ", dec!(10)).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        promotions.validate("SAVE10", dec!(0)).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn checks_apply_in_order() {
    let app = TestApp::new().await;
    let now = Utc::now();

    // Inactive wins over every other failing condition.
    let mut everything_wrong = promo("BROKEN", "FIXED", dec!(5));
    everything_wrong.active = Set(false);
    everything_wrong.valid_until = Set(Some(now - Duration::days(1)));
    everything_wrong.min_purchase = Set(Some(dec!(1000)));
    app.seed_promo(everything_wrong).await;

    let mut future = promo("SOON", "FIXED", dec!(5));
    future.valid_from = Set(now + Duration::days(2));
    future.usage_limit = Set(Some(1));
    future.usage_count = Set(1);
    app.seed_promo(future).await;

    let mut expired = promo("OLD", "FIXED", dec!(5));
    expired.valid_until = Set(Some(now - Duration::hours(1)));
    expired.usage_limit = Set(Some(1));
    expired.usage_count = Set(1);
    app.seed_promo(expired).await;

    let mut exhausted = promo("USEDUP", "FIXED", dec!(5));
    exhausted.usage_limit = Set(Some(3));
    exhausted.usage_count = Set(3);
    exhausted.min_purchase = Set(Some(dec!(1000)));
    app.seed_promo(exhausted).await;

    let mut minimum = promo("BIGSPEND", "FIXED", dec!(5));
    minimum.min_purchase = Set(Some(dec!(50)));
    app.seed_promo(minimum).await;

    let promotions = &app.state.services.promotions;
    assert_matches!(promotions.validate("BROKEN", dec!(10)).await, Err(ServiceError::InactiveCode));
    assert_matches!(promotions.validate("SOON", dec!(10)).await, Err(ServiceError::NotYetValid));
    assert_matches!(promotions.validate("OLD", dec!(10)).await, Err(ServiceError::Expired));
    assert_matches!(
        promotions.validate("USEDUP", dec!(10)).await,
        Err(ServiceError::UsageLimitReached)
    );
    assert_matches!(
        promotions.validate("BIGSPEND", dec!(49.99)).await,
        Err(ServiceError::MinPurchaseNotMet(min)) if min == dec!(50)
    );
    assert!(promotions.validate("BIGSPEND", dec!(50)).await.is_ok());
}

#[tokio::test]
async fn validation_never_redeems() {
    let app = TestApp::new().await;
    let mut limited = promo("ONCE", "FIXED", dec!(5));
    limited.usage_limit = Set(Some(1));
    let seeded = app.seed_promo(limited).await;

    for _ in 0..3 {
        app.state
            .services
            .promotions
            .validate("ONCE", dec!(20))
            .await
            .unwrap();
    }

    let stored = promo_code::Entity::find_by_id(seeded.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.usage_count, 0);
}
