mod common;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use storefront::config::{GatewayConfig, Secret};
use storefront::domain::aggregates::{Order, OrderItem, ShippingAddress};
use storefront::domain::value_objects::Money;
use storefront::gateway::{CreateRemoteOrder, GatewayError, PaymentGateway, RazorpayGateway};
use storefront::notify::{Email, HttpMailer, MailError, Mailer};

fn gateway_config(base_url: String) -> GatewayConfig {
    GatewayConfig { base_url, ..config().gateway }
}

fn remote_order_request() -> CreateRemoteOrder {
    CreateRemoteOrder {
        amount: 180_000,
        currency: "INR".into(),
        receipt: "receipt_1".into(),
        notes: json!({ "orderId": "local" }),
    }
}

#[tokio::test]
async fn test_gateway_creates_remote_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({ "amount": 180_000, "currency": "INR", "receipt": "receipt_1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_remote_1",
            "entity": "order",
            "amount": 180_000,
            "currency": "INR",
            "status": "created",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = RazorpayGateway::new(&gateway_config(format!("{}/", server.uri()))).unwrap();
    let remote = gateway.create_order(remote_order_request()).await.unwrap();
    assert_eq!(remote.id, "order_remote_1");
    assert_eq!(remote.amount, 180_000);
    assert_eq!(gateway.key_id(), "rzp_test_key");
}

#[tokio::test]
async fn test_gateway_surfaces_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let gateway = RazorpayGateway::new(&gateway_config(server.uri())).unwrap();
    match gateway.create_order(remote_order_request()).await {
        Err(GatewayError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

fn order() -> Order {
    let item = OrderItem {
        product_id: Uuid::now_v7(),
        variant_id: Uuid::now_v7(),
        name: "Linen Shirt".into(),
        variant_label: "size: M".into(),
        image: None,
        unit_price: Money::from_units(1000),
        quantity: 2,
    };
    Order::place(Uuid::now_v7(), vec![item], ShippingAddress::default(), None).unwrap()
}

#[tokio::test]
async fn test_http_mailer_posts_templated_mail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer mail-key"))
        .and(body_partial_json(json!({
            "from": "orders@shop.test",
            "to": "asha@example.com",
            "template": "order-confirmation",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(format!("{}/send", server.uri()), Secret::new("mail-key"), "orders@shop.test").unwrap();
    let email = Email::order_confirmation("asha@example.com", "Asha", &order());
    mailer.send(&email).await.unwrap();
}

#[tokio::test]
async fn test_http_mailer_reports_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(server.uri(), Secret::new("mail-key"), "orders@shop.test").unwrap();
    let email = Email::order_cancelled("asha@example.com", "Asha", &order());
    assert!(matches!(mailer.send(&email).await, Err(MailError::Status(422))));
}
