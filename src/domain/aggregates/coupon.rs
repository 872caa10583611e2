//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    id: Uuid,
    code: CouponCode,
    discount_type: DiscountType,
    discount_value: Decimal,
    min_cart_value: Money,
    max_discount: Option<Money>,
    expires_at: DateTime<Utc>,
    usage_limit: Option<u32>,
    used_count: u32,
    active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType { Percentage, Flat }

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "percentage", Self::Flat => "flat" }
    }
}

impl FromStr for DiscountType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "percentage" => Ok(Self::Percentage), "flat" => Ok(Self::Flat), other => Err(format!("unknown discount type {other}")) }
    }
}

#[derive(Clone, Debug)]
pub struct NewCoupon {
    pub code: CouponCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_cart_value: Money,
    pub max_discount: Option<Money>,
    pub expires_at: DateTime<Utc>,
    pub usage_limit: Option<u32>,
}

/// Columns needed to rebuild a stored coupon.
#[derive(Clone, Debug)]
pub struct CouponRecord {
    pub id: Uuid,
    pub code: CouponCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_cart_value: Money,
    pub max_discount: Option<Money>,
    pub expires_at: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn create(new: NewCoupon) -> Result<Self, CouponError> {
        if new.discount_value <= Decimal::ZERO { return Err(CouponError::InvalidValue); }
        if new.discount_type == DiscountType::Percentage && new.discount_value > Decimal::ONE_HUNDRED {
            return Err(CouponError::InvalidValue);
        }
        if new.discount_type == DiscountType::Flat && new.max_discount.is_some() {
            return Err(CouponError::CapOnFlatDiscount);
        }
        Ok(Self {
            id: Uuid::now_v7(), code: new.code, discount_type: new.discount_type,
            discount_value: new.discount_value, min_cart_value: new.min_cart_value,
            max_discount: new.max_discount, expires_at: new.expires_at, usage_limit: new.usage_limit,
            used_count: 0, active: true, created_at: Utc::now(),
        })
    }

    pub fn restore(r: CouponRecord) -> Self {
        Self {
            id: r.id, code: r.code, discount_type: r.discount_type, discount_value: r.discount_value,
            min_cart_value: r.min_cart_value, max_discount: r.max_discount, expires_at: r.expires_at,
            usage_limit: r.usage_limit, used_count: r.used_count, active: r.active, created_at: r.created_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn code(&self) -> &CouponCode { &self.code }
    pub fn discount_type(&self) -> DiscountType { self.discount_type }
    pub fn discount_value(&self) -> Decimal { self.discount_value }
    pub fn min_cart_value(&self) -> Money { self.min_cart_value }
    pub fn max_discount(&self) -> Option<Money> { self.max_discount }
    pub fn expires_at(&self) -> DateTime<Utc> { self.expires_at }
    pub fn usage_limit(&self) -> Option<u32> { self.usage_limit }
    pub fn used_count(&self) -> u32 { self.used_count }
    pub fn is_active(&self) -> bool { self.active }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn deactivate(&mut self) { self.active = false; }

    /// Checks whether the coupon may be used on a cart worth `items_price`.
    pub fn check(&self, items_price: Money, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.active { return Err(CouponError::Inactive); }
        if self.expires_at <= now { return Err(CouponError::Expired); }
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) {
            return Err(CouponError::UsageLimitReached);
        }
        if items_price < self.min_cart_value {
            return Err(CouponError::BelowMinimum { minimum: self.min_cart_value });
        }
        Ok(())
    }

    pub fn discount_for(&self, items_price: Money) -> Money {
        match self.discount_type {
            DiscountType::Percentage => {
                let discount = items_price.percent(self.discount_value);
                match self.max_discount {
                    Some(cap) => discount.min(cap),
                    None => discount,
                }
            }
            DiscountType::Flat => Money::new(self.discount_value).unwrap_or_default(),
        }
    }

    /// Checks, computes the discount and consumes one use.
    pub fn redeem(&mut self, items_price: Money, now: DateTime<Utc>) -> Result<Money, CouponError> {
        self.check(items_price, now)?;
        self.used_count += 1;
        Ok(self.discount_for(items_price))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponError {
    #[error("Invalid or inactive coupon")]
    Inactive,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Cart total must be at least {minimum} to use this coupon")]
    BelowMinimum { minimum: Money },
    #[error("Discount value must be positive and percentages at most 100")]
    InvalidValue,
    #[error("A maximum discount only applies to percentage coupons")]
    CapOnFlatDiscount,
}
