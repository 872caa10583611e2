//! HTTP-facing error type.
//!
//! Every handler returns [`AppResult`]. Business-rule failures carry a message
//! meant for the shopper; storage, gateway and internal failures are logged
//! and answered with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{AddressError, CartError, CouponError, OrderError, ProductError};
use crate::gateway::GatewayError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for {name}: only {available} left")]
    InsufficientStock { name: String, available: u32 },

    #[error("{0}")]
    InvalidCoupon(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("{0}")]
    BusinessRule(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl AppError {
    pub fn not_found(what: &str) -> Self { Self::NotFound(format!("{what} not found")) }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::EmptyCart => "EMPTY_CART",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::InvalidCoupon(_) => "INVALID_COUPON",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::AlreadyPaid => "ALREADY_PAID",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::BusinessRule(_) => "BUSINESS_RULE",
            Self::Conflict(_) => "CONFLICT",
            Self::Store(_) => "DATABASE_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::EmptyCart
            | Self::InsufficientStock { .. }
            | Self::InvalidCoupon(_)
            | Self::InvalidTransition(_)
            | Self::AlreadyPaid
            | Self::InvalidSignature
            | Self::BusinessRule(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(_) | Self::Internal(_) => {
                tracing::error!(error_code = self.code(), error = %self, "Request failed");
                "Something went wrong, please try again".to_string()
            }
            Self::Gateway(_) => {
                tracing::error!(error_code = self.code(), error = %self, "Payment gateway call failed");
                "Payment provider is unavailable, please try again".to_string()
            }
            _ => {
                tracing::debug!(error_code = self.code(), message = %self, "Request rejected");
                self.to_string()
            }
        };
        (status, Json(ErrorResponse { error: self.code(), message })).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::OutOfRange(value) => AppError::Validation(format!("Value {value} is too large")),
            other if other.is_contention() => {
                tracing::warn!(error = %other, "Transaction aborted by a concurrent update");
                AppError::Conflict("The request conflicted with a concurrent update, please retry".into())
            }
            other => AppError::Store(other),
        }
    }
}

impl From<ProductError> for AppError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::VariantNotFound => AppError::not_found("Variant"),
            ProductError::InsufficientStock { available, .. } => {
                AppError::InsufficientStock { name: "variant".into(), available }
            }
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound => AppError::not_found("Cart item"),
            CartError::InvalidQuantity => AppError::Validation(err.to_string()),
        }
    }
}

impl From<CouponError> for AppError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::InvalidValue | CouponError::CapOnFlatDiscount => AppError::Validation(err.to_string()),
            other => AppError::InvalidCoupon(other.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => AppError::EmptyCart,
            OrderError::InvalidTransition { .. } => AppError::InvalidTransition(err.to_string()),
            OrderError::AlreadyPaid => AppError::AlreadyPaid,
            other => AppError::BusinessRule(other.to_string()),
        }
    }
}

impl From<AddressError> for AppError {
    fn from(_: AddressError) -> Self { AppError::not_found("Address") }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self { AppError::Validation(err.to_string()) }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self { AppError::Internal(err.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    #[test]
    fn test_business_rules_are_bad_requests() {
        let err: AppError = OrderError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Confirmed }.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(err.to_string(), "Cannot move order from shipped to confirmed");

        let err: AppError = CouponError::Expired.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_COUPON");
    }

    #[test]
    fn test_store_conflict_maps_to_409() {
        let err: AppError = StoreError::Conflict("slug taken".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_oversized_counts_are_rejected_not_truncated() {
        let err: AppError = StoreError::OutOfRange(u32::MAX).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!StoreError::OutOfRange(u32::MAX).is_contention());
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = AppError::Internal("connection refused on 10.0.0.3".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "INTERNAL_ERROR");
        assert!(!json["message"].as_str().unwrap().contains("10.0.0.3"));
    }
}
