//! PostgreSQL store.
//!
//! Transactional loads use `SELECT ... FOR UPDATE`, so the check-then-decrement
//! on variant stock during checkout holds the variant rows until commit and a
//! concurrent checkout or cancellation on the same rows waits for it.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Page, Store, StoreError, StoreResult, StoreTx};
use crate::domain::aggregates::{
    AbandonedCart, AbandonedCartRecord, AbandonedLine, AbandonedStatus, Address, AppliedDiscount, Attributes, Cart,
    CartLine, Coupon, CouponRecord, GatewayDetails, Order, OrderItem, OrderRecord, PaymentResult, Product,
    ProductImage, ProductRecord, ShippingAddress, User, UserRecord, Variant,
};
use crate::domain::value_objects::{CouponCode, Email, Money, Quantity, Sku};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.context("Failed to run migrations")?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Rows
// -----------------------------------------------------------------------------

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    email_verified: bool,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AddressRow {
    id: Uuid,
    full_name: String,
    phone: String,
    line1: String,
    line2: Option<String>,
    city: String,
    state: String,
    postal_code: String,
    country: String,
    is_default: bool,
}

#[derive(FromRow)]
struct CartLineRow { product_id: Uuid, variant_id: Uuid, quantity: i32 }

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    category: String,
    description: String,
    discount_percent: Decimal,
    rating: Decimal,
    review_count: i32,
    is_best_seller: bool,
    is_just_landed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct VariantRow {
    id: Uuid,
    attributes: Json<Attributes>,
    price: Decimal,
    stock: i32,
    images: Vec<String>,
    sku: Option<String>,
}

#[derive(FromRow)]
struct ImageRow { url: String, storage_id: String }

#[derive(FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_value: Decimal,
    min_cart_value: Decimal,
    max_discount: Option<Decimal>,
    expires_at: DateTime<Utc>,
    usage_limit: Option<i32>,
    used_count: i32,
    active: bool,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    shipping_address: Json<ShippingAddress>,
    payment_method: String,
    payment_status: String,
    order_status: String,
    items_price: Decimal,
    coupon_code: Option<String>,
    discount_amount: Option<Decimal>,
    total_price: Decimal,
    remote_order_id: Option<String>,
    remote_amount: Option<i64>,
    remote_payment_id: Option<String>,
    signature: Option<String>,
    payment_result: Option<Json<PaymentResult>>,
    paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderItemRow {
    product_id: Uuid,
    variant_id: Uuid,
    name: String,
    variant_label: String,
    unit_price: Decimal,
    quantity: i32,
    image: Option<String>,
}

#[derive(FromRow)]
struct AbandonedRow {
    id: Uuid,
    user_id: Uuid,
    user_name: String,
    user_email: String,
    items: Json<Vec<AbandonedLine>>,
    status: String,
    abandoned_at: Option<DateTime<Utc>>,
    converted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, email_verified, created_at";
const PRODUCT_COLUMNS: &str = "id, name, slug, category, description, discount_percent, rating, review_count, \
    is_best_seller, is_just_landed, created_at, updated_at";
const COUPON_COLUMNS: &str = "id, code, discount_type, discount_value, min_cart_value, max_discount, expires_at, \
    usage_limit, used_count, active, created_at";
const ORDER_COLUMNS: &str = "id, user_id, shipping_address, payment_method, payment_status, order_status, \
    items_price, coupon_code, discount_amount, total_price, remote_order_id, remote_amount, remote_payment_id, \
    signature, payment_result, paid_at, delivered_at, cancelled_at, created_at, updated_at";
const ABANDONED_COLUMNS: &str = "id, user_id, user_name, user_email, items, status, abandoned_at, converted_at, \
    created_at, updated_at";

fn lock_clause(lock: bool) -> &'static str { if lock { " FOR UPDATE" } else { "" } }

fn corrupt(what: impl std::fmt::Display) -> StoreError { StoreError::Corrupt(what.to_string()) }

fn money(amount: Decimal) -> StoreResult<Money> { Money::new(amount).map_err(corrupt) }

fn count(value: i32) -> StoreResult<u32> { u32::try_from(value).map_err(corrupt) }

fn int(value: u32) -> StoreResult<i32> { i32::try_from(value).map_err(|_| StoreError::OutOfRange(value)) }

/// Unique-key violations become [`StoreError::Conflict`].
fn conflict_on_unique(err: sqlx::Error, what: impl Into<String>) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what.into()),
        _ => StoreError::Database(err),
    }
}

// -----------------------------------------------------------------------------
// Loaders shared by pooled reads and transactions
// -----------------------------------------------------------------------------

async fn hydrate_user(conn: &mut PgConnection, row: UserRow) -> StoreResult<User> {
    let addresses = sqlx::query_as::<_, AddressRow>(
        "SELECT id, full_name, phone, line1, line2, city, state, postal_code, country, is_default \
         FROM user_addresses WHERE user_id = $1 ORDER BY position",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let lines = sqlx::query_as::<_, CartLineRow>(
        "SELECT product_id, variant_id, quantity FROM cart_lines WHERE user_id = $1 ORDER BY position",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let cart = Cart::from_lines(lines.into_iter()
        .map(|l| Ok(CartLine { product_id: l.product_id, variant_id: l.variant_id, quantity: count(l.quantity)? }))
        .collect::<StoreResult<Vec<_>>>()?);

    Ok(User::restore(UserRecord {
        id: row.id,
        name: row.name,
        email: Email::parse(row.email).map_err(corrupt)?,
        password_hash: row.password_hash,
        role: row.role.parse().map_err(corrupt)?,
        email_verified: row.email_verified,
        addresses: addresses.into_iter().map(|a| Address {
            id: a.id, full_name: a.full_name, phone: a.phone, line1: a.line1, line2: a.line2, city: a.city,
            state: a.state, postal_code: a.postal_code, country: a.country, is_default: a.is_default,
        }).collect(),
        cart,
        created_at: row.created_at,
    }))
}

async fn load_user(conn: &mut PgConnection, id: Uuid, lock: bool) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1{}", lock_clause(lock));
    match sqlx::query_as::<_, UserRow>(&sql).bind(id).fetch_optional(&mut *conn).await? {
        Some(row) => hydrate_user(conn, row).await.map(Some),
        None => Ok(None),
    }
}

async fn hydrate_product(conn: &mut PgConnection, row: ProductRow, lock: bool) -> StoreResult<Product> {
    let sql = format!(
        "SELECT id, attributes, price, stock, images, sku FROM product_variants \
         WHERE product_id = $1 ORDER BY position{}",
        lock_clause(lock)
    );
    let variants = sqlx::query_as::<_, VariantRow>(&sql).bind(row.id).fetch_all(&mut *conn).await?;

    let images = sqlx::query_as::<_, ImageRow>(
        "SELECT url, storage_id FROM product_images WHERE product_id = $1 ORDER BY position",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let variants = variants.into_iter().map(|v| Ok(Variant {
        id: v.id,
        attributes: v.attributes.0,
        price: money(v.price)?,
        stock: Quantity::new(count(v.stock)?),
        images: v.images,
        sku: v.sku.map(Sku::new).transpose().map_err(corrupt)?,
    })).collect::<StoreResult<Vec<_>>>()?;

    Ok(Product::restore(ProductRecord {
        id: row.id,
        name: row.name,
        slug: row.slug,
        category: row.category,
        description: row.description,
        images: images.into_iter().map(|i| ProductImage { url: i.url, storage_id: i.storage_id }).collect(),
        variants,
        discount_percent: row.discount_percent,
        rating: row.rating,
        review_count: count(row.review_count)?,
        is_best_seller: row.is_best_seller,
        is_just_landed: row.is_just_landed,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

async fn load_product(conn: &mut PgConnection, id: Uuid, lock: bool) -> StoreResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1{}", lock_clause(lock));
    match sqlx::query_as::<_, ProductRow>(&sql).bind(id).fetch_optional(&mut *conn).await? {
        Some(row) => hydrate_product(conn, row, lock).await.map(Some),
        None => Ok(None),
    }
}

fn coupon_from_row(row: CouponRow) -> StoreResult<Coupon> {
    Ok(Coupon::restore(CouponRecord {
        id: row.id,
        code: CouponCode::new(row.code).map_err(corrupt)?,
        discount_type: row.discount_type.parse().map_err(corrupt)?,
        discount_value: row.discount_value,
        min_cart_value: money(row.min_cart_value)?,
        max_discount: row.max_discount.map(money).transpose()?,
        expires_at: row.expires_at,
        usage_limit: row.usage_limit.map(count).transpose()?,
        used_count: count(row.used_count)?,
        active: row.active,
        created_at: row.created_at,
    }))
}

async fn hydrate_order(conn: &mut PgConnection, row: OrderRow) -> StoreResult<Order> {
    let items = sqlx::query_as::<_, OrderItemRow>(
        "SELECT product_id, variant_id, name, variant_label, unit_price, quantity, image \
         FROM order_items WHERE order_id = $1 ORDER BY position",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let order_items = items.into_iter().map(|i| Ok(OrderItem {
        product_id: i.product_id,
        variant_id: i.variant_id,
        name: i.name,
        variant_label: i.variant_label,
        unit_price: money(i.unit_price)?,
        quantity: count(i.quantity)?,
        image: i.image,
    })).collect::<StoreResult<Vec<_>>>()?;

    let discount = match (row.coupon_code, row.discount_amount) {
        (Some(code), Some(amount)) => Some(AppliedDiscount {
            coupon_code: CouponCode::new(code).map_err(corrupt)?,
            amount: money(amount)?,
        }),
        _ => None,
    };

    Ok(Order::restore(OrderRecord {
        id: row.id,
        user_id: row.user_id,
        order_items,
        shipping_address: row.shipping_address.0,
        payment_method: row.payment_method.parse().map_err(corrupt)?,
        payment_status: row.payment_status.parse().map_err(corrupt)?,
        order_status: row.order_status.parse().map_err(corrupt)?,
        items_price: money(row.items_price)?,
        discount,
        total_price: money(row.total_price)?,
        gateway: GatewayDetails {
            remote_order_id: row.remote_order_id,
            remote_amount: row.remote_amount,
            remote_payment_id: row.remote_payment_id,
            signature: row.signature,
        },
        payment_result: row.payment_result.map(|j| j.0),
        paid_at: row.paid_at,
        delivered_at: row.delivered_at,
        cancelled_at: row.cancelled_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

async fn hydrate_orders(conn: &mut PgConnection, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        orders.push(hydrate_order(conn, row).await?);
    }
    Ok(orders)
}

fn abandoned_from_row(row: AbandonedRow) -> StoreResult<AbandonedCart> {
    Ok(AbandonedCart::restore(AbandonedCartRecord {
        id: row.id,
        user_id: row.user_id,
        user_name: row.user_name,
        user_email: Email::parse(row.user_email).map_err(corrupt)?,
        items: row.items.0,
        status: row.status.parse().map_err(corrupt)?,
        abandoned_at: row.abandoned_at,
        converted_at: row.converted_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

// -----------------------------------------------------------------------------
// Pooled reads
// -----------------------------------------------------------------------------

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        load_product(&mut conn, id, false).await
    }

    async fn list_products(&self, category: Option<&str>, page: Page) -> StoreResult<(Vec<Product>, i64)> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE ($1::TEXT IS NULL OR category = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(category)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&mut *conn)
            .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE ($1::TEXT IS NULL OR category = $1)")
            .bind(category)
            .fetch_one(&mut *conn)
            .await?;
        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            products.push(hydrate_product(&mut conn, row, false).await?);
        }
        Ok((products, total.0))
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        load_user(&mut conn, id, false).await
    }

    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        match sqlx::query_as::<_, UserRow>(&sql).bind(email.as_str()).fetch_optional(&mut *conn).await? {
            Some(row) => hydrate_user(&mut conn, row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        match sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&mut *conn).await? {
            Some(row) => hydrate_order(&mut conn, row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, OrderRow>(&sql).bind(user_id).fetch_all(&mut *conn).await?;
        hydrate_orders(&mut conn, rows).await
    }

    async fn list_orders(&self, page: Page) -> StoreResult<(Vec<Order>, i64)> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&mut *conn)
            .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders").fetch_one(&mut *conn).await?;
        Ok((hydrate_orders(&mut conn, rows).await?, total.0))
    }

    async fn coupon(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1");
        sqlx::query_as::<_, CouponRow>(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(coupon_from_row)
            .transpose()
    }

    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY code");
        sqlx::query_as::<_, CouponRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(coupon_from_row)
            .collect()
    }

    async fn abandoned_carts(&self, status: Option<AbandonedStatus>) -> StoreResult<Vec<AbandonedCart>> {
        let sql = format!(
            "SELECT {ABANDONED_COLUMNS} FROM abandoned_carts WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY updated_at DESC"
        );
        sqlx::query_as::<_, AbandonedRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(abandoned_from_row)
            .collect()
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

// -----------------------------------------------------------------------------
// Transactions
// -----------------------------------------------------------------------------

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        load_user(&mut self.tx, id, true).await
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, email_verified, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id())
        .bind(user.name())
        .bind(user.email().as_str())
        .bind(user.password_hash())
        .bind(user.role().as_str())
        .bind(user.email_verified())
        .bind(user.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_on_unique(e, format!("email {} already registered", user.email())))?;

        self.save_addresses(user.id(), user.addresses()).await?;
        self.save_cart(user.id(), user.cart()).await
    }

    async fn save_cart(&mut self, user_id: Uuid, cart: &Cart) -> StoreResult<()> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        for (position, line) in cart.lines().iter().enumerate() {
            sqlx::query(
                "INSERT INTO cart_lines (user_id, product_id, variant_id, position, quantity) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user_id)
            .bind(line.product_id)
            .bind(line.variant_id)
            .bind(position as i32)
            .bind(int(line.quantity)?)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn save_addresses(&mut self, user_id: Uuid, addresses: &[Address]) -> StoreResult<()> {
        sqlx::query("DELETE FROM user_addresses WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        for (position, a) in addresses.iter().enumerate() {
            sqlx::query(
                "INSERT INTO user_addresses (user_id, id, position, full_name, phone, line1, line2, city, state, \
                 postal_code, country, is_default) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(user_id)
            .bind(a.id)
            .bind(position as i32)
            .bind(&a.full_name)
            .bind(&a.phone)
            .bind(&a.line1)
            .bind(&a.line2)
            .bind(&a.city)
            .bind(&a.state)
            .bind(&a.postal_code)
            .bind(&a.country)
            .bind(a.is_default)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        load_product(&mut self.tx, id, true).await
    }

    async fn product_unlocked(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        load_product(&mut self.tx, id, false).await
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO products (id, name, slug, category, description, discount_percent, rating, review_count, \
             is_best_seller, is_just_landed, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(product.id())
        .bind(product.name())
        .bind(product.slug().as_str())
        .bind(product.category())
        .bind(product.description())
        .bind(product.discount_percent())
        .bind(product.rating())
        .bind(int(product.review_count())?)
        .bind(product.is_best_seller())
        .bind(product.is_just_landed())
        .bind(product.created_at())
        .bind(product.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_on_unique(e, format!("slug {} already exists", product.slug())))?;

        for (position, image) in product.images().iter().enumerate() {
            sqlx::query("INSERT INTO product_images (product_id, position, url, storage_id) VALUES ($1, $2, $3, $4)")
                .bind(product.id())
                .bind(position as i32)
                .bind(&image.url)
                .bind(&image.storage_id)
                .execute(&mut *self.tx)
                .await?;
        }

        for (position, v) in product.variants().iter().enumerate() {
            sqlx::query(
                "INSERT INTO product_variants (product_id, id, position, attributes, price, stock, images, sku) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(product.id())
            .bind(v.id)
            .bind(position as i32)
            .bind(Json(&v.attributes))
            .bind(v.price.amount())
            .bind(int(v.stock.value())?)
            .bind(&v.images)
            .bind(v.sku.as_ref().map(|s| s.as_str()))
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn save_variant_stock(&mut self, product_id: Uuid, variant: &Variant) -> StoreResult<()> {
        let result = sqlx::query("UPDATE product_variants SET stock = $3 WHERE product_id = $1 AND id = $2")
            .bind(product_id)
            .bind(variant.id)
            .bind(int(variant.stock.value())?)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("variant {} no longer exists", variant.id)));
        }
        sqlx::query("UPDATE products SET updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn coupon(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE");
        sqlx::query_as::<_, CouponRow>(&sql)
            .bind(code.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(coupon_from_row)
            .transpose()
    }

    async fn insert_coupon(&mut self, coupon: &Coupon) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO coupons (id, code, discount_type, discount_value, min_cart_value, max_discount, expires_at, \
             usage_limit, used_count, active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(coupon.id())
        .bind(coupon.code().as_str())
        .bind(coupon.discount_type().as_str())
        .bind(coupon.discount_value())
        .bind(coupon.min_cart_value().amount())
        .bind(coupon.max_discount().map(|m| m.amount()))
        .bind(coupon.expires_at())
        .bind(coupon.usage_limit().map(int).transpose()?)
        .bind(int(coupon.used_count())?)
        .bind(coupon.is_active())
        .bind(coupon.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_on_unique(e, format!("coupon {} already exists", coupon.code())))?;
        Ok(())
    }

    async fn save_coupon(&mut self, coupon: &Coupon) -> StoreResult<()> {
        sqlx::query("UPDATE coupons SET used_count = $2, active = $3 WHERE id = $1")
            .bind(coupon.id())
            .bind(int(coupon.used_count())?)
            .bind(coupon.is_active())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        match sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&mut *self.tx).await? {
            Some(row) => hydrate_order(&mut self.tx, row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn order_by_remote_id(&mut self, remote_order_id: &str) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE remote_order_id = $1 FOR UPDATE");
        match sqlx::query_as::<_, OrderRow>(&sql).bind(remote_order_id).fetch_optional(&mut *self.tx).await? {
            Some(row) => hydrate_order(&mut self.tx, row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        let discount = order.discount();
        sqlx::query(
            "INSERT INTO orders (id, user_id, shipping_address, payment_method, payment_status, order_status, \
             items_price, coupon_code, discount_amount, total_price, remote_order_id, remote_amount, \
             remote_payment_id, signature, payment_result, paid_at, delivered_at, cancelled_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
        )
        .bind(order.id())
        .bind(order.user_id())
        .bind(Json(order.shipping_address()))
        .bind(order.payment_method().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.status().as_str())
        .bind(order.items_price().amount())
        .bind(discount.map(|d| d.coupon_code.as_str()))
        .bind(discount.map(|d| d.amount.amount()))
        .bind(order.total_price().amount())
        .bind(&order.gateway().remote_order_id)
        .bind(order.gateway().remote_amount)
        .bind(&order.gateway().remote_payment_id)
        .bind(&order.gateway().signature)
        .bind(order.payment_result().map(Json))
        .bind(order.paid_at())
        .bind(order.delivered_at())
        .bind(order.cancelled_at())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, variant_id, name, variant_label, \
                 unit_price, quantity, image) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(order.id())
            .bind(position as i32)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.name)
            .bind(&item.variant_label)
            .bind(item.unit_price.amount())
            .bind(int(item.quantity)?)
            .bind(&item.image)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "UPDATE orders SET payment_status = $2, order_status = $3, remote_order_id = $4, remote_amount = $5, \
             remote_payment_id = $6, signature = $7, payment_result = $8, paid_at = $9, delivered_at = $10, \
             cancelled_at = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(order.id())
        .bind(order.payment_status().as_str())
        .bind(order.status().as_str())
        .bind(&order.gateway().remote_order_id)
        .bind(order.gateway().remote_amount)
        .bind(&order.gateway().remote_payment_id)
        .bind(&order.gateway().signature)
        .bind(order.payment_result().map(Json))
        .bind(order.paid_at())
        .bind(order.delivered_at())
        .bind(order.cancelled_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_on_unique(e, "remote order id already attached to another order"))?;
        Ok(())
    }

    async fn pending_abandoned_cart(&mut self, user_id: Uuid) -> StoreResult<Option<AbandonedCart>> {
        let sql = format!(
            "SELECT {ABANDONED_COLUMNS} FROM abandoned_carts WHERE user_id = $1 AND status = 'pending' FOR UPDATE"
        );
        sqlx::query_as::<_, AbandonedRow>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(abandoned_from_row)
            .transpose()
    }

    async fn pending_abandoned_carts(&mut self) -> StoreResult<Vec<AbandonedCart>> {
        let sql = format!(
            "SELECT {ABANDONED_COLUMNS} FROM abandoned_carts WHERE status = 'pending' FOR UPDATE SKIP LOCKED"
        );
        sqlx::query_as::<_, AbandonedRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(abandoned_from_row)
            .collect()
    }

    async fn save_abandoned_cart(&mut self, cart: &AbandonedCart) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO abandoned_carts (id, user_id, user_name, user_email, items, status, abandoned_at, \
             converted_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET items = EXCLUDED.items, status = EXCLUDED.status, \
             abandoned_at = EXCLUDED.abandoned_at, converted_at = EXCLUDED.converted_at, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.id())
        .bind(cart.user_id())
        .bind(cart.user_name())
        .bind(cart.user_email().as_str())
        .bind(Json(cart.items()))
        .bind(cart.status().as_str())
        .bind(cart.abandoned_at())
        .bind(cart.converted_at())
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_abandoned_cart(&mut self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM abandoned_carts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
