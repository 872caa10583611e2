mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::*;
use storefront::domain::aggregates::{AbandonedStatus, Order, OrderStatus, PaymentStatus, ShippingAddress};
use storefront::error::AppError;
use storefront::gateway::{self, CreateRemoteOrder, GatewayError, PaymentGateway, RemoteOrder};
use storefront::notify::Template;
use storefront::services::{
    CartService, Caller, CheckoutService, ClientPayment, PaymentService, PlaceOrder, ShipTo, VerifyPayment,
    WebhookOutcome,
};

struct Fixture {
    h: Harness,
    payments: PaymentService,
    buyer: Caller,
    order: Order,
}

async fn fixture_with(h: Harness) -> Fixture {
    let user = seed_user(h.store.as_ref(), "Asha", "asha@example.com").await;
    let product = seed_product(h.store.as_ref(), "Linen Shirt", vec![variant("M", 1000, 5)], 0).await;
    CartService::new(h.store()).add(user.id(), product.id(), product.variants()[0].id, 2).await.unwrap();
    let buyer = Caller { user_id: user.id(), is_admin: false };
    let order = CheckoutService::new(h.store(), h.events())
        .place_order_from_cart(
            buyer,
            PlaceOrder { ship_to: ShipTo::Address(ShippingAddress::default()), coupon_code: None },
        )
        .await
        .unwrap();
    let payments = PaymentService::new(h.store(), h.gateway.clone(), h.notifier.clone(), h.events(), &h.config.gateway);
    Fixture { h, payments, buyer, order }
}

async fn fixture() -> Fixture { fixture_with(Harness::new()).await }

#[tokio::test]
async fn test_create_intent_is_idempotent() {
    let f = fixture().await;
    let first = f.payments.create_intent(f.buyer, f.order.id()).await.unwrap();
    let second = f.payments.create_intent(f.buyer, f.order.id()).await.unwrap();

    assert_eq!(first.remote_order_id, second.remote_order_id);
    assert_eq!(first.amount, 200_000);
    assert_eq!(first.key, "rzp_test_key");
    assert_eq!(f.h.gateway.created(), 1);
}

#[tokio::test]
async fn test_create_intent_checks_ownership_and_gateway_errors() {
    let f = fixture_with(Harness::with(FakeGateway::failing(), RecordingMailer::default())).await;
    let stranger = Caller { user_id: uuid::Uuid::now_v7(), is_admin: false };
    assert!(matches!(f.payments.create_intent(stranger, f.order.id()).await, Err(AppError::Forbidden(_))));
    assert!(matches!(f.payments.create_intent(f.buyer, f.order.id()).await, Err(AppError::Gateway(_))));

    let stored = f.h.store.order(f.order.id()).await.unwrap().unwrap();
    assert!(stored.gateway().remote_order_id.is_none());
}

/// Gateway double that cancels the order while the remote order is being created.
struct CancelsMidCall {
    store: Arc<dyn Store>,
}

#[async_trait]
impl PaymentGateway for CancelsMidCall {
    fn key_id(&self) -> &str { "rzp_test_key" }

    async fn create_order(&self, request: CreateRemoteOrder) -> Result<RemoteOrder, GatewayError> {
        let order_id: uuid::Uuid = request.notes["orderId"].as_str().unwrap().parse().unwrap();
        let mut tx = self.store.begin().await.unwrap();
        let mut order = tx.order(order_id).await.unwrap().unwrap();
        order.cancel().unwrap();
        tx.save_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        Ok(RemoteOrder { id: "order_late".into(), amount: request.amount, currency: request.currency })
    }
}

#[tokio::test]
async fn test_order_is_not_locked_during_gateway_call() {
    let f = fixture().await;
    let gateway = Arc::new(CancelsMidCall { store: f.h.store() });
    let payments = PaymentService::new(f.h.store(), gateway, f.h.notifier.clone(), f.h.events(), &f.h.config.gateway);

    let result = tokio::time::timeout(Duration::from_secs(5), payments.create_intent(f.buyer, f.order.id()))
        .await
        .expect("gateway call blocked on the order lock");
    assert!(matches!(result, Err(AppError::BusinessRule(_))));

    let stored = f.h.store.order(f.order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Cancelled);
    assert!(stored.gateway().remote_order_id.is_none());
}

#[tokio::test]
async fn test_client_verification_never_marks_paid() {
    let f = fixture().await;
    let intent = f.payments.create_intent(f.buyer, f.order.id()).await.unwrap();

    let tampered = VerifyPayment {
        order_id: f.order.id(),
        remote_order_id: intent.remote_order_id.clone(),
        remote_payment_id: "pay_1".into(),
        signature: "deadbeef".into(),
    };
    assert!(matches!(f.payments.verify_client_payment(f.buyer, tampered).await, Err(AppError::InvalidSignature)));

    let payload = gateway::client_payment_payload(&intent.remote_order_id, "pay_1");
    let valid = VerifyPayment {
        order_id: f.order.id(),
        remote_order_id: intent.remote_order_id.clone(),
        remote_payment_id: "pay_1".into(),
        signature: gateway::sign(KEY_SECRET.as_bytes(), payload.as_bytes()),
    };
    assert_eq!(f.payments.verify_client_payment(f.buyer, valid).await.unwrap(), ClientPayment::Verified);

    let stored = f.h.store.order(f.order.id()).await.unwrap().unwrap();
    assert_eq!(stored.payment_status(), PaymentStatus::Created);
    assert_eq!(stored.gateway().remote_payment_id.as_deref(), Some("pay_1"));

    let missing = VerifyPayment {
        order_id: f.order.id(),
        remote_order_id: String::new(),
        remote_payment_id: "pay_1".into(),
        signature: "x".into(),
    };
    assert!(matches!(f.payments.verify_client_payment(f.buyer, missing).await, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_webhook_capture_confirms_and_converts_abandoned_cart() {
    let f = fixture().await;
    let intent = f.payments.create_intent(f.buyer, f.order.id()).await.unwrap();
    let (body, signature) = captured_webhook(&intent.remote_order_id, "pay_42", intent.amount);

    let outcome = f.payments.handle_webhook(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Captured);

    let stored = f.h.store.order(f.order.id()).await.unwrap().unwrap();
    assert!(stored.is_paid());
    assert_eq!(stored.status(), OrderStatus::Confirmed);
    assert!(stored.paid_at().is_some());
    assert_eq!(stored.payment_result().unwrap().payment_id, "pay_42");

    let converted = f.h.store.abandoned_carts(Some(AbandonedStatus::Converted)).await.unwrap();
    assert_eq!(converted.len(), 1);
    assert_eq!(converted[0].user_id(), f.buyer.user_id);

    let sent = f.h.mailer.wait_for(1).await;
    assert_eq!(sent[0].template, Template::OrderConfirmation);
    assert_eq!(sent[0].to, "asha@example.com");
}

#[tokio::test]
async fn test_webhook_replay_is_a_no_op() {
    let f = fixture().await;
    let intent = f.payments.create_intent(f.buyer, f.order.id()).await.unwrap();
    let (body, signature) = captured_webhook(&intent.remote_order_id, "pay_42", intent.amount);
    f.payments.handle_webhook(&body, Some(&signature)).await.unwrap();
    let first = f.h.store.order(f.order.id()).await.unwrap().unwrap();

    let (replay, replay_signature) = captured_webhook(&intent.remote_order_id, "pay_other", intent.amount);
    let outcome = f.payments.handle_webhook(&replay, Some(&replay_signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::AlreadyPaid);

    let second = f.h.store.order(f.order.id()).await.unwrap().unwrap();
    assert_eq!(second.paid_at(), first.paid_at());
    assert_eq!(second.payment_result(), first.payment_result());
    assert_eq!(second.payment_status(), PaymentStatus::Paid);
}

#[tokio::test]
async fn test_tampered_webhook_never_changes_payment() {
    let f = fixture().await;
    let intent = f.payments.create_intent(f.buyer, f.order.id()).await.unwrap();
    let (mut body, signature) = captured_webhook(&intent.remote_order_id, "pay_42", intent.amount);
    body.push(b' ');

    assert!(matches!(f.payments.handle_webhook(&body, Some(&signature)).await, Err(AppError::InvalidSignature)));
    assert!(matches!(f.payments.handle_webhook(&body, None).await, Err(AppError::InvalidSignature)));

    let stored = f.h.store.order(f.order.id()).await.unwrap().unwrap();
    assert!(!stored.is_paid());
    assert_eq!(stored.status(), OrderStatus::Pending);
}

#[tokio::test]
async fn test_other_webhook_events_are_ignored() {
    let f = fixture().await;
    let body = br#"{"event":"payment.failed","payload":{}}"#;
    let signature = gateway::sign(WEBHOOK_SECRET.as_bytes(), body);
    assert_eq!(f.payments.handle_webhook(body, Some(&signature)).await.unwrap(), WebhookOutcome::Ignored);
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_not_found() {
    let f = fixture().await;
    let (body, signature) = captured_webhook("order_unknown", "pay_1", 100);
    assert!(matches!(f.payments.handle_webhook(&body, Some(&signature)).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_mail_failure_does_not_undo_capture() {
    let f = fixture_with(Harness::with(FakeGateway::default(), RecordingMailer::failing())).await;
    let intent = f.payments.create_intent(f.buyer, f.order.id()).await.unwrap();
    let (body, signature) = captured_webhook(&intent.remote_order_id, "pay_42", intent.amount);

    assert_eq!(f.payments.handle_webhook(&body, Some(&signature)).await.unwrap(), WebhookOutcome::Captured);
    f.h.mailer.wait_for(1).await;
    assert!(f.h.store.order(f.order.id()).await.unwrap().unwrap().is_paid());
}
