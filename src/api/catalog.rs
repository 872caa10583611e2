use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::extract::ValidatedJson;
use super::requests::{CreateProductRequest, ListParams, PaginatedResponse, VariantRequest};
use super::AppState;
use crate::auth::AdminUser;
use crate::domain::aggregates::{NewProduct, Product, Variant};
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{AppError, AppResult};
use crate::store::Page;

fn variant_from(request: VariantRequest) -> AppResult<Variant> {
    request.validate()?;
    let price = Money::new(request.price).map_err(|e| AppError::Validation(format!("Variant price: {e}")))?;
    let sku = request
        .sku
        .map(Sku::new)
        .transpose()
        .map_err(|e| AppError::Validation(format!("Variant sku: {e}")))?;
    let mut variant = Variant::new(request.attributes, price, 0);
    variant.stock = Quantity::new(request.stock);
    variant.images = request.images;
    variant.sku = sku;
    Ok(variant)
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(body): ValidatedJson<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let variants = body.variants.into_iter().map(variant_from).collect::<AppResult<Vec<_>>>()?;
    let product = state
        .catalog
        .create(NewProduct {
            name: body.name,
            category: body.category,
            description: body.description,
            images: body.images,
            variants,
            discount_percent: body.discount_percent,
            is_best_seller: body.is_best_seller,
            is_just_landed: body.is_just_landed,
        })
        .await?;
    tracing::debug!(admin_id = %admin.id, product_id = %product.id(), "Product created by admin");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.get(id).await?))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PaginatedResponse<Product>>> {
    let page = Page::new(params.page, params.per_page);
    let (data, total) = state.catalog.list(params.category.as_deref(), page).await?;
    Ok(Json(PaginatedResponse { data, total, page: page.page }))
}
