use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, error, instrument};

use crate::{
    db::DbPool,
    entities::promo_code::{self, Entity as PromoCodeEntity, Model as PromoCodeModel},
    errors::ServiceError,
    models::DiscountType,
};

/// A promo code priced against a cart total. Nothing is redeemed.
#[derive(Debug, Clone, PartialEq)]
pub struct PromoQuote {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub discount_amount: Decimal,
    pub original_total: Decimal,
    pub final_total: Decimal,
}

/// Canonical form used for storage and lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Discount for `cart_total`, rounded to cents and never above the total.
///
/// Totals too large to price without overflowing are rejected.
pub fn compute_discount(
    discount_type: DiscountType,
    discount_value: Decimal,
    max_discount: Option<Decimal>,
    cart_total: Decimal,
) -> Result<Decimal, ServiceError> {
    let raw = match discount_type {
        DiscountType::Percentage => {
            let pct = cart_total
                .checked_mul(discount_value)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                .ok_or_else(|| ServiceError::ValidationError("Invalid cart total".to_string()))?;
            match max_discount {
                Some(cap) if pct > cap => cap,
                _ => pct,
            }
        }
        DiscountType::Fixed => discount_value.min(cart_total),
    };

    Ok(raw
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .max(Decimal::ZERO)
        .min(cart_total))
}

/// Runs the eligibility checks in their fixed order, then prices the code.
pub fn evaluate(
    promo: &PromoCodeModel,
    cart_total: Decimal,
    now: DateTime<Utc>,
) -> Result<PromoQuote, ServiceError> {
    if !promo.active {
        return Err(ServiceError::InactiveCode);
    }
    if now < promo.valid_from {
        return Err(ServiceError::NotYetValid);
    }
    if matches!(promo.valid_until, Some(until) if now > until) {
        return Err(ServiceError::Expired);
    }
    if matches!(promo.usage_limit, Some(limit) if promo.usage_count >= limit) {
        return Err(ServiceError::UsageLimitReached);
    }
    if let Some(min) = promo.min_purchase {
        if cart_total < min {
            return Err(ServiceError::MinPurchaseNotMet(min));
        }
    }

    let discount_type = DiscountType::from_str(&promo.discount_type).map_err(|_| {
        error!(code = %promo.code, discount_type = %promo.discount_type, "promo code has unknown discount type");
        ServiceError::InternalError(format!("unknown discount type {}", promo.discount_type))
    })?;

    let discount_amount =
        compute_discount(discount_type, promo.discount_value, promo.max_discount, cart_total)?;

    Ok(PromoQuote {
        code: promo.code.clone(),
        description: promo.description.clone(),
        discount_type,
        discount_value: promo.discount_value,
        discount_amount,
        original_total: cart_total,
        final_total: (cart_total - discount_amount).max(Decimal::ZERO),
    })
}

/// Read-only promo code checks.
#[derive(Clone)]
pub struct PromotionService {
    db_pool: Arc<DbPool>,
}

impl PromotionService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self), fields(code = %code))]
    pub async fn validate(&self, code: &str, cart_total: Decimal) -> Result<PromoQuote, ServiceError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Promo code is required".to_string(),
            ));
        }
        if cart_total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Invalid cart total".to_string(),
            ));
        }

        let promo = PromoCodeEntity::find()
            .filter(promo_code::Column::Code.eq(code.as_str()))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invalid promo code".to_string()))?;

        let quote = evaluate(&promo, cart_total, Utc::now())?;
        debug!(discount = %quote.discount_amount, "promo code priced");
        Ok(quote)
    }
}
