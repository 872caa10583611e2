use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use super::extract::ValidatedJson;
use super::requests::{AbandonedCartParams, AddToCartRequest, UpdateCartRequest};
use super::AppState;
use crate::auth::{AdminUser, AuthUser};
use crate::domain::aggregates::{AbandonedCart, AbandonedStatus};
use crate::error::{AppError, AppResult};
use crate::services::CartView;

pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<CartView>> {
    Ok(Json(state.cart.view(user.id).await?))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<AddToCartRequest>,
) -> AppResult<Json<CartView>> {
    Ok(Json(state.cart.add(user.id, body.product_id, body.variant_id, body.quantity).await?))
}

pub async fn update_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path((product_id, variant_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(body): ValidatedJson<UpdateCartRequest>,
) -> AppResult<Json<CartView>> {
    Ok(Json(state.cart.update(user.id, product_id, variant_id, body.quantity).await?))
}

pub async fn remove_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path((product_id, variant_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<CartView>> {
    Ok(Json(state.cart.remove(user.id, product_id, variant_id).await?))
}

pub async fn list_abandoned_carts(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<AbandonedCartParams>,
) -> AppResult<Json<Vec<AbandonedCart>>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<AbandonedStatus>)
        .transpose()
        .map_err(AppError::Validation)?;
    Ok(Json(state.cart.abandoned_carts(status).await?))
}
