use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use super::extract::JsonBody;
use super::requests::{CreateIntentRequest, VerifyPaymentRequest};
use super::AppState;
use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::services::{PaymentIntent, VerifyPayment};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub async fn create_intent(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(body): JsonBody<CreateIntentRequest>,
) -> AppResult<Json<PaymentIntent>> {
    Ok(Json(state.payments.create_intent(user.into(), body.order_id).await?))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(body): JsonBody<VerifyPaymentRequest>,
) -> AppResult<Json<Value>> {
    let outcome = state
        .payments
        .verify_client_payment(
            user.into(),
            VerifyPayment {
                order_id: body.order_id,
                remote_order_id: body.remote_order_id,
                remote_payment_id: body.remote_payment_id,
                signature: body.signature,
            },
        )
        .await?;
    Ok(Json(json!({ "success": true, "result": outcome })))
}

/// Gateway callback. The signature covers the exact bytes received, so the body is taken raw.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AppResult<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(json!({ "status": outcome })))
}
