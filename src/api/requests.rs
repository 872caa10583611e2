//! Request bodies and query strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Attributes, ProductImage, ShippingAddress};
use crate::services::NewAddress;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(min = 5, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[validate(length(max = 200))]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 3, max = 12))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

impl From<AddressRequest> for NewAddress {
    fn from(r: AddressRequest) -> Self {
        NewAddress {
            full_name: r.full_name,
            phone: r.phone,
            line1: r.line1,
            line2: r.line2,
            city: r.city,
            state: r.state,
            postal_code: r.postal_code,
            country: r.country,
            is_default: r.is_default,
        }
    }
}

impl From<AddressRequest> for ShippingAddress {
    fn from(r: AddressRequest) -> Self {
        ShippingAddress {
            full_name: r.full_name,
            phone: r.phone,
            line1: r.line1,
            line2: r.line2,
            city: r.city,
            state: r.state,
            postal_code: r.postal_code,
            country: r.country,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartRequest {
    #[validate(range(max = 100, message = "Quantity must be at most 100"))]
    pub quantity: u32,
}

/// Checkout body. Ships to `shippingAddress`, else the saved `addressId`, else the default address.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub shipping_address: Option<AddressRequest>,
    pub address_id: Option<Uuid>,
    #[validate(length(max = 32))]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

/// Missing fields deserialize empty and are rejected by the payment service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub remote_order_id: String,
    #[serde(default)]
    pub remote_payment_id: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub order_status: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VariantRequest {
    #[serde(default)]
    pub attributes: Attributes,
    pub price: Decimal,
    #[validate(range(max = 1000000, message = "Stock must be at most 1000000"))]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[validate(length(min = 1, max = 50))]
    pub sku: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[validate(length(min = 1, message = "A product needs at least one variant"))]
    pub variants: Vec<VariantRequest>,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub is_best_seller: bool,
    #[serde(default)]
    pub is_just_landed: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_cart_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
    #[validate(range(min = 1, max = 1000000))]
    pub usage_limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 32, message = "Coupon code is required"))]
    pub code: String,
    pub cart_total: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AbandonedCartParams {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}
