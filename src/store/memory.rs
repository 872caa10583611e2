//! In-process store.
//!
//! A transaction holds the store lock from `begin` until it is committed or
//! dropped and works on a private copy of the data, which gives the same
//! all-or-nothing and serialised behaviour the Postgres store gets from row
//! locks. Used by the test suite and local demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Page, Store, StoreError, StoreResult, StoreTx};
use crate::domain::aggregates::{
    AbandonedCart, AbandonedStatus, Address, Cart, Coupon, Order, Product, User, Variant,
};
use crate::domain::value_objects::{CouponCode, Email};

#[derive(Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    coupons: HashMap<CouponCode, Coupon>,
    orders: HashMap<Uuid, Order>,
    abandoned: HashMap<Uuid, AbandonedCart>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

/// Orders are stored without their undrained events.
fn stored(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.take_events();
    copy
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self, category: Option<&str>, page: Page) -> StoreResult<(Vec<Product>, i64)> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values()
            .filter(|p| category.map_or(true, |c| p.category() == c))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        let total = products.len() as i64;
        Ok((products.into_iter().skip(page.offset()).take(page.limit()).collect(), total))
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.values().find(|u| u.email() == email).cloned())
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.values().filter(|o| o.user_id() == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(orders)
    }

    async fn list_orders(&self, page: Page) -> StoreResult<(Vec<Order>, i64)> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        let total = orders.len() as i64;
        Ok((orders.into_iter().skip(page.offset()).take(page.limit()).collect(), total))
    }

    async fn coupon(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.get(code).cloned())
    }

    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        let state = self.state.lock().await;
        let mut coupons: Vec<Coupon> = state.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| a.code().as_str().cmp(b.code().as_str()));
        Ok(coupons)
    }

    async fn abandoned_carts(&self, status: Option<AbandonedStatus>) -> StoreResult<Vec<AbandonedCart>> {
        let state = self.state.lock().await;
        let mut carts: Vec<AbandonedCart> = state.abandoned.values()
            .filter(|c| status.map_or(true, |s| c.status() == s))
            .cloned()
            .collect();
        carts.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(carts)
    }

    async fn health_check(&self) -> bool { true }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.working.users.values().any(|u| u.email() == user.email()) {
            return Err(StoreError::Conflict(format!("email {} already registered", user.email())));
        }
        self.working.users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn save_cart(&mut self, user_id: Uuid, cart: &Cart) -> StoreResult<()> {
        let user = self.working.users.get_mut(&user_id)
            .ok_or_else(|| StoreError::Conflict(format!("user {user_id} does not exist")))?;
        *user.cart_mut() = cart.clone();
        Ok(())
    }

    async fn save_addresses(&mut self, user_id: Uuid, addresses: &[Address]) -> StoreResult<()> {
        let user = self.working.users.get_mut(&user_id)
            .ok_or_else(|| StoreError::Conflict(format!("user {user_id} does not exist")))?;
        user.replace_addresses(addresses.to_vec());
        Ok(())
    }

    async fn product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn product_unlocked(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        self.product(id).await
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        if self.working.products.values().any(|p| p.slug() == product.slug()) {
            return Err(StoreError::Conflict(format!("slug {} already exists", product.slug())));
        }
        self.working.products.insert(product.id(), product.clone());
        Ok(())
    }

    async fn save_variant_stock(&mut self, product_id: Uuid, variant: &Variant) -> StoreResult<()> {
        let product = self.working.products.get_mut(&product_id)
            .ok_or_else(|| StoreError::Conflict(format!("product {product_id} does not exist")))?;
        product.set_stock(variant.id, variant.stock).map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn coupon(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        Ok(self.working.coupons.get(code).cloned())
    }

    async fn insert_coupon(&mut self, coupon: &Coupon) -> StoreResult<()> {
        if self.working.coupons.contains_key(coupon.code()) {
            return Err(StoreError::Conflict(format!("coupon {} already exists", coupon.code())));
        }
        self.working.coupons.insert(coupon.code().clone(), coupon.clone());
        Ok(())
    }

    async fn save_coupon(&mut self, coupon: &Coupon) -> StoreResult<()> {
        self.working.coupons.insert(coupon.code().clone(), coupon.clone());
        Ok(())
    }

    async fn order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn order_by_remote_id(&mut self, remote_order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.values()
            .find(|o| o.gateway().remote_order_id.as_deref() == Some(remote_order_id))
            .cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        self.working.orders.insert(order.id(), stored(order));
        Ok(())
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        self.working.orders.insert(order.id(), stored(order));
        Ok(())
    }

    async fn pending_abandoned_cart(&mut self, user_id: Uuid) -> StoreResult<Option<AbandonedCart>> {
        Ok(self.working.abandoned.values()
            .find(|c| c.user_id() == user_id && c.status() == AbandonedStatus::Pending)
            .cloned())
    }

    async fn pending_abandoned_carts(&mut self) -> StoreResult<Vec<AbandonedCart>> {
        Ok(self.working.abandoned.values().filter(|c| c.status() == AbandonedStatus::Pending).cloned().collect())
    }

    async fn save_abandoned_cart(&mut self, cart: &AbandonedCart) -> StoreResult<()> {
        self.working.abandoned.insert(cart.id(), cart.clone());
        Ok(())
    }

    async fn delete_abandoned_cart(&mut self, id: Uuid) -> StoreResult<()> {
        self.working.abandoned.remove(&id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
