use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::extract::ValidatedJson;
use super::requests::{AddressRequest, LoginRequest, RegisterRequest};
use super::AppState;
use crate::auth::AuthUser;
use crate::domain::aggregates::Address;
use crate::error::AppResult;
use crate::services::{AuthResponse, UserProfile};

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.accounts.register(&body.name, &body.email, body.password).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(state.accounts.login(&body.email, body.password).await?))
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.accounts.profile(user.id).await?))
}

pub async fn list_addresses(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<Address>>> {
    Ok(Json(state.accounts.addresses(user.id).await?))
}

pub async fn add_address(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(body): ValidatedJson<AddressRequest>,
) -> AppResult<(StatusCode, Json<Vec<Address>>)> {
    let addresses = state.accounts.add_address(user.id, body.into()).await?;
    Ok((StatusCode::CREATED, Json(addresses)))
}

pub async fn set_default_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Address>>> {
    Ok(Json(state.accounts.set_default(user.id, id).await?))
}

pub async fn remove_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Address>>> {
    Ok(Json(state.accounts.remove_address(user.id, id).await?))
}
