//! HTTP surface.

mod accounts;
mod cart;
mod catalog;
mod coupons;
pub mod extract;
mod orders;
mod payments;
pub mod requests;

use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::events::EventPublisher;
use crate::gateway::PaymentGateway;
use crate::notify::Notifier;
use crate::services::{
    AccountService, CartService, CatalogService, CheckoutService, CouponService, OrderService, PaymentService,
};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub jwt: JwtKeys,
    pub accounts: Arc<AccountService>,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
        events: EventPublisher,
    ) -> Self {
        let jwt = JwtKeys::new(config.jwt_secret.expose(), config.jwt_ttl_hours);
        Self {
            accounts: Arc::new(AccountService::new(store.clone(), jwt.clone(), config.admin_emails.clone())),
            catalog: Arc::new(CatalogService::new(store.clone())),
            cart: Arc::new(CartService::new(store.clone())),
            checkout: Arc::new(CheckoutService::new(store.clone(), events.clone())),
            coupons: Arc::new(CouponService::new(store.clone())),
            orders: Arc::new(OrderService::new(
                store.clone(),
                notifier.clone(),
                events.clone(),
                config.status_policy,
                config.store_name.clone(),
                config.gateway.currency.clone(),
            )),
            payments: Arc::new(PaymentService::new(store.clone(), gateway, notifier, events, &config.gateway)),
            store,
            jwt,
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self { state.jwt.clone() }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/register", post(accounts::register))
        .route("/api/v1/auth/login", post(accounts::login))
        .route("/api/v1/users/me", get(accounts::me))
        .route("/api/v1/users/me/addresses", get(accounts::list_addresses).post(accounts::add_address))
        .route("/api/v1/users/me/addresses/:id", delete(accounts::remove_address))
        .route("/api/v1/users/me/addresses/:id/default", put(accounts::set_default_address))
        .route("/api/v1/products", get(catalog::list_products).post(catalog::create_product))
        .route("/api/v1/products/:id", get(catalog::get_product))
        .route("/api/v1/cart", get(cart::get_cart).post(cart::add_to_cart))
        .route("/api/v1/cart/:product_id/:variant_id", put(cart::update_line).delete(cart::remove_line))
        .route("/api/v1/admin/abandoned-carts", get(cart::list_abandoned_carts))
        .route("/api/v1/coupons", get(coupons::list_coupons).post(coupons::create_coupon))
        .route("/api/v1/coupons/apply", post(coupons::apply_coupon))
        .route("/api/v1/orders", get(orders::list_orders))
        .route("/api/v1/orders/from-cart", post(orders::place_order))
        .route("/api/v1/orders/mine", get(orders::my_orders))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/status", put(orders::update_status))
        .route("/api/v1/orders/:id/cancel", put(orders::cancel_order))
        .route("/api/v1/orders/:id/invoice", get(orders::invoice))
        .route("/api/v1/payments/gateway/create", post(payments::create_intent))
        .route("/api/v1/payments/gateway/verify", post(payments::verify_payment))
        .route("/api/v1/payments/webhook", post(payments::webhook))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    if state.store.health_check().await {
        (StatusCode::OK, Json(json!({ "status": "healthy", "service": "storefront" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unhealthy", "service": "storefront" })))
    }
}
