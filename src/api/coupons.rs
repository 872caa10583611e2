use axum::{extract::State, http::StatusCode, Json};

use super::extract::ValidatedJson;
use super::requests::{ApplyCouponRequest, CreateCouponRequest};
use super::AppState;
use crate::auth::{AdminUser, AuthUser};
use crate::domain::aggregates::{Coupon, DiscountType, NewCoupon};
use crate::domain::value_objects::{CouponCode, Money};
use crate::error::{AppError, AppResult};
use crate::services::CouponPreview;

fn money(field: &str, amount: rust_decimal::Decimal) -> AppResult<Money> {
    Money::new(amount).map_err(|e| AppError::Validation(format!("{field}: {e}")))
}

pub async fn create_coupon(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(body): ValidatedJson<CreateCouponRequest>,
) -> AppResult<(StatusCode, Json<Coupon>)> {
    let code = CouponCode::new(body.code).map_err(|e| AppError::Validation(e.to_string()))?;
    let discount_type: DiscountType = body.discount_type.parse().map_err(AppError::Validation)?;
    let coupon = state
        .coupons
        .create(NewCoupon {
            code,
            discount_type,
            discount_value: body.discount_value,
            min_cart_value: money("minCartValue", body.min_cart_value)?,
            max_discount: body.max_discount.map(|m| money("maxDiscount", m)).transpose()?,
            expires_at: body.expires_at,
            usage_limit: body.usage_limit,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn list_coupons(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<Coupon>>> {
    Ok(Json(state.coupons.list().await?))
}

/// Preview only; the coupon's usage count is untouched.
pub async fn apply_coupon(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidatedJson(body): ValidatedJson<ApplyCouponRequest>,
) -> AppResult<Json<CouponPreview>> {
    let cart_total = money("cartTotal", body.cart_total)?;
    Ok(Json(state.coupons.preview(&body.code, cart_total).await?))
}
