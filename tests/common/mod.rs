#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use storefront::config::{AbandonedCartConfig, Config, GatewayConfig, MailConfig, Secret};
use storefront::domain::aggregates::{
    Attributes, Coupon, DiscountType, NewCoupon, NewProduct, Product, TransitionPolicy, User, Variant,
};
use storefront::domain::value_objects::{AttributeValue, CouponCode, Email as EmailAddress, Money};
use storefront::events::EventPublisher;
use storefront::gateway::{self, CreateRemoteOrder, GatewayError, PaymentGateway, RemoteOrder};
use storefront::notify::{Email, MailError, Mailer, Notifier};
pub use storefront::store::{MemoryStore, Store, StoreTx};

pub const KEY_SECRET: &str = "test-key-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

pub fn config() -> Config {
    Config {
        port: 0,
        database_url: Secret::new("postgres://unused"),
        database_max_connections: 1,
        jwt_secret: Secret::new("test-jwt-secret"),
        jwt_ttl_hours: 1,
        gateway: GatewayConfig {
            base_url: "http://gateway.invalid".into(),
            key_id: "rzp_test_key".into(),
            key_secret: Secret::new(KEY_SECRET),
            webhook_secret: Secret::new(WEBHOOK_SECRET),
            currency: "INR".into(),
        },
        mail: MailConfig { api: None, from: "orders@shop.test".into() },
        nats_url: None,
        status_policy: TransitionPolicy::Strict,
        abandoned_cart: AbandonedCartConfig::default(),
        store_name: "Test Shop".into(),
        admin_emails: vec!["admin@shop.test".into()],
    }
}

/// Gateway double that hands out sequential remote order ids.
#[derive(Default)]
pub struct FakeGateway {
    created: AtomicUsize,
    pub fail: bool,
}

impl FakeGateway {
    pub fn failing() -> Self { Self { fail: true, ..Self::default() } }

    pub fn created(&self) -> usize { self.created.load(Ordering::SeqCst) }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str { "rzp_test_key" }

    async fn create_order(&self, request: CreateRemoteOrder) -> Result<RemoteOrder, GatewayError> {
        if self.fail {
            return Err(GatewayError::Status { status: 503, body: "unavailable".into() });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteOrder { id: format!("order_test_{n}"), amount: request.amount, currency: request.currency })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self { Self { fail: true, ..Self::default() } }

    pub fn sent(&self) -> Vec<Email> { self.sent.lock().unwrap().clone() }

    /// Waits for the spawned dispatch tasks to deliver `count` emails.
    pub async fn wait_for(&self, count: usize) -> Vec<Email> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        if self.fail {
            return Err(MailError::Status(500));
        }
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub notifier: Notifier,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self { Self::with(FakeGateway::default(), RecordingMailer::default()) }

    pub fn with(gateway: FakeGateway, mailer: RecordingMailer) -> Self {
        let mailer = Arc::new(mailer);
        Self {
            store: Arc::new(MemoryStore::new()),
            gateway: Arc::new(gateway),
            notifier: Notifier::new(mailer.clone()),
            mailer,
            config: config(),
        }
    }

    pub fn store(&self) -> Arc<dyn Store> { self.store.clone() }

    pub fn events(&self) -> EventPublisher { EventPublisher::disabled() }
}

pub async fn seed_user(store: &dyn Store, name: &str, email: &str) -> User {
    let user = User::register(name, EmailAddress::parse(email).unwrap(), "not-a-real-hash".into());
    let mut tx = store.begin().await.unwrap();
    tx.insert_user(&user).await.unwrap();
    tx.commit().await.unwrap();
    user
}

pub async fn seed_admin(store: &dyn Store) -> User {
    let mut user = User::register("Admin", EmailAddress::parse("admin@shop.test").unwrap(), "x".into());
    user.promote_to_admin();
    let mut tx = store.begin().await.unwrap();
    tx.insert_user(&user).await.unwrap();
    tx.commit().await.unwrap();
    user
}

pub fn variant(size: &str, price: u32, stock: u32) -> Variant {
    let mut attributes = Attributes::new();
    attributes.insert("size".into(), AttributeValue::Named(size.into()));
    Variant::new(attributes, Money::from_units(price), stock)
}

pub async fn seed_product(store: &dyn Store, name: &str, variants: Vec<Variant>, discount: u32) -> Product {
    let product = Product::create(NewProduct {
        name: name.into(),
        category: "apparel".into(),
        description: String::new(),
        images: vec![],
        variants,
        discount_percent: Decimal::from(discount),
        is_best_seller: false,
        is_just_landed: false,
    })
    .unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.insert_product(&product).await.unwrap();
    tx.commit().await.unwrap();
    product
}

pub async fn seed_percentage_coupon(store: &dyn Store, code: &str, pct: u32, cap: Option<u32>) -> Coupon {
    let coupon = Coupon::create(NewCoupon {
        code: CouponCode::new(code).unwrap(),
        discount_type: DiscountType::Percentage,
        discount_value: Decimal::from(pct),
        min_cart_value: Money::zero(),
        max_discount: cap.map(Money::from_units),
        expires_at: Utc::now() + chrono::Duration::days(30),
        usage_limit: None,
    })
    .unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.insert_coupon(&coupon).await.unwrap();
    tx.commit().await.unwrap();
    coupon
}

pub async fn stock_of(store: &dyn Store, product: &Product, index: usize) -> u32 {
    let product = store.product(product.id()).await.unwrap().unwrap();
    product.variants()[index].stock.value()
}

/// Webhook body for a captured payment and its valid signature.
pub fn captured_webhook(remote_order_id: &str, payment_id: &str, amount: i64) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": payment_id,
            "order_id": remote_order_id,
            "status": "captured",
            "amount": amount,
            "email": "buyer@example.com",
            "method": "upi",
        }}}
    });
    let bytes = serde_json::to_vec(&body).unwrap();
    let signature = gateway::sign(WEBHOOK_SECRET.as_bytes(), &bytes);
    (bytes, signature)
}
