//! Storage seam.
//!
//! Every multi-step write runs inside a [`StoreTx`]: loads made through a
//! transaction lock the rows they return until commit, so two checkouts
//! touching the same variant are serialised. Dropping a transaction without
//! calling [`StoreTx::commit`] discards every write made through it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::{
    AbandonedCart, AbandonedStatus, Address, Cart, Coupon, Order, Product, User, Variant,
};
use crate::domain::value_objects::{CouponCode, Email};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Value {0} is out of range for storage")]
    OutOfRange(u32),
}

impl StoreError {
    /// Deadlock (`40P01`) or serialization failure (`40001`): the transaction was rolled back and can be retried.
    pub fn is_contention(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => matches!(db.code().as_deref(), Some("40P01" | "40001")),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 1-indexed page request.
#[derive(Debug, Clone, Copy)]
pub struct Page { pub page: u32, pub per_page: u32 }

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), per_page: per_page.unwrap_or(20).clamp(1, 100) }
    }
    pub fn offset(&self) -> usize { ((self.page - 1) * self.per_page) as usize }
    pub fn limit(&self) -> usize { self.per_page as usize }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

/// Read access plus the entry point for transactional writes.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn list_products(&self, category: Option<&str>, page: Page) -> StoreResult<(Vec<Product>, i64)>;
    async fn user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>>;
    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self, page: Page) -> StoreResult<(Vec<Order>, i64)>;
    async fn coupon(&self, code: &CouponCode) -> StoreResult<Option<Coupon>>;
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>>;
    async fn abandoned_carts(&self, status: Option<AbandonedStatus>) -> StoreResult<Vec<AbandonedCart>>;
    async fn health_check(&self) -> bool;
}

/// A unit of work. Loads lock what they return; nothing is visible to others until commit.
#[async_trait]
pub trait StoreTx: Send {
    async fn user(&mut self, id: Uuid) -> StoreResult<Option<User>>;
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    async fn save_cart(&mut self, user_id: Uuid, cart: &Cart) -> StoreResult<()>;
    async fn save_addresses(&mut self, user_id: Uuid, addresses: &[Address]) -> StoreResult<()>;

    async fn product(&mut self, id: Uuid) -> StoreResult<Option<Product>>;
    /// Reads a product inside the transaction without locking it.
    async fn product_unlocked(&mut self, id: Uuid) -> StoreResult<Option<Product>>;
    /// Fails with [`StoreError::Conflict`] when the slug is taken.
    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;
    async fn save_variant_stock(&mut self, product_id: Uuid, variant: &Variant) -> StoreResult<()>;

    async fn coupon(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>>;
    /// Fails with [`StoreError::Conflict`] when the code is taken.
    async fn insert_coupon(&mut self, coupon: &Coupon) -> StoreResult<()>;
    async fn save_coupon(&mut self, coupon: &Coupon) -> StoreResult<()>;

    async fn order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn order_by_remote_id(&mut self, remote_order_id: &str) -> StoreResult<Option<Order>>;
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn save_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn pending_abandoned_cart(&mut self, user_id: Uuid) -> StoreResult<Option<AbandonedCart>>;
    /// Every pending record, for the sweep.
    async fn pending_abandoned_carts(&mut self) -> StoreResult<Vec<AbandonedCart>>;
    async fn save_abandoned_cart(&mut self, cart: &AbandonedCart) -> StoreResult<()>;
    async fn delete_abandoned_cart(&mut self, id: Uuid) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
