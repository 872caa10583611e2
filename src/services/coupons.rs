//! Coupon administration and the read-only cart preview.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::domain::aggregates::{Coupon, NewCoupon};
use crate::domain::value_objects::{CouponCode, Money};
use crate::error::{AppError, AppResult};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponPreview {
    pub code: CouponCode,
    pub discount_amount: Money,
    pub total: Money,
}

pub struct CouponService {
    store: Arc<dyn Store>,
}

impl CouponService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn create(&self, new: NewCoupon) -> AppResult<Coupon> {
        let coupon = Coupon::create(new)?;
        let mut tx = self.store.begin().await?;
        tx.insert_coupon(&coupon).await?;
        tx.commit().await?;
        tracing::info!(code = %coupon.code(), discount_type = coupon.discount_type().as_str(), "Coupon created");
        Ok(coupon)
    }

    pub async fn list(&self) -> AppResult<Vec<Coupon>> {
        Ok(self.store.list_coupons().await?)
    }

    /// What `code` would take off a cart worth `cart_total`. Consumes no use.
    pub async fn preview(&self, code: &str, cart_total: Money) -> AppResult<CouponPreview> {
        let code = CouponCode::new(code).map_err(|_| AppError::not_found("Coupon"))?;
        let coupon = self.store.coupon(&code).await?.ok_or_else(|| AppError::not_found("Coupon"))?;
        coupon.check(cart_total, Utc::now())?;
        let discount_amount = coupon.discount_for(cart_total);
        Ok(CouponPreview { code, discount_amount, total: cart_total.saturating_sub(discount_amount) })
    }
}
