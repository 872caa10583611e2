use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::extract::{JsonBody, ValidatedJson};
use super::requests::{ListParams, PaginatedResponse, PlaceOrderRequest, UpdateStatusRequest};
use super::AppState;
use crate::auth::{AdminUser, AuthUser};
use crate::domain::aggregates::{Order, OrderStatus};
use crate::error::{AppError, AppResult};
use crate::services::{PlaceOrder, ShipTo};
use crate::store::Page;

pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<PlaceOrderRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let ship_to = match (body.shipping_address, body.address_id) {
        (Some(address), _) => {
            address.validate()?;
            ShipTo::Address(address.into())
        }
        (None, Some(id)) => ShipTo::Saved(id),
        (None, None) => ShipTo::Default,
    };
    let order = state
        .checkout
        .place_order_from_cart(user.into(), PlaceOrder { ship_to, coupon_code: body.coupon_code })
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn my_orders(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(state.orders.mine(user.into()).await?))
}

pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PaginatedResponse<Order>>> {
    let page = Page::new(params.page, params.per_page);
    let (data, total) = state.orders.list(page).await?;
    Ok(Json(PaginatedResponse { data, total, page: page.page }))
}

pub async fn get_order(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.get(user.into(), id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    JsonBody(body): JsonBody<UpdateStatusRequest>,
) -> AppResult<Json<Order>> {
    let next: OrderStatus = body.order_status.parse().map_err(AppError::Validation)?;
    Ok(Json(state.orders.update_status(admin.into(), id, next).await?))
}

pub async fn cancel_order(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.cancel(user.into(), id).await?))
}

pub async fn invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let pdf = state.orders.invoice(user.into(), id).await?;
    let disposition = format!("attachment; filename=\"invoice-{}.pdf\"", id.simple());
    Ok(([(header::CONTENT_TYPE, "application/pdf".to_string()), (header::CONTENT_DISPOSITION, disposition)], pdf))
}
