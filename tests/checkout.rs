mod common;

use std::sync::Arc;

use common::*;
use storefront::domain::aggregates::{OrderStatus, PaymentStatus, ShippingAddress};
use storefront::domain::value_objects::{CouponCode, Money};
use storefront::error::AppError;
use storefront::services::{CartService, Caller, CheckoutService, PlaceOrder, ShipTo};

fn ship_to() -> ShipTo {
    ShipTo::Address(ShippingAddress {
        full_name: "Asha Rao".into(),
        phone: "9999999999".into(),
        line1: "12 Park Street".into(),
        line2: None,
        city: "Pune".into(),
        state: "MH".into(),
        postal_code: "411001".into(),
        country: "IN".into(),
    })
}

fn caller(user_id: uuid::Uuid) -> Caller { Caller { user_id, is_admin: false } }

#[tokio::test]
async fn test_checkout_with_percentage_coupon() {
    let h = Harness::new();
    let user = seed_user(h.store.as_ref(), "Asha", "asha@example.com").await;
    let product = seed_product(h.store.as_ref(), "Linen Shirt", vec![variant("M", 1000, 5)], 0).await;
    seed_percentage_coupon(h.store.as_ref(), "SAVE10", 10, None).await;
    let variant_id = product.variants()[0].id;

    let cart = CartService::new(h.store());
    cart.add(user.id(), product.id(), variant_id, 2).await.unwrap();

    let checkout = CheckoutService::new(h.store(), h.events());
    let order = checkout
        .place_order_from_cart(caller(user.id()), PlaceOrder { ship_to: ship_to(), coupon_code: Some("save10".into()) })
        .await
        .unwrap();

    assert_eq!(order.items_price(), Money::from_units(2000));
    assert_eq!(order.discount().unwrap().amount, Money::from_units(200));
    assert_eq!(order.total_price(), Money::from_units(1800));
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.payment_status(), PaymentStatus::Created);
    assert_eq!(order.items()[0].variant_label, "size: M");

    assert_eq!(stock_of(h.store.as_ref(), &product, 0).await, 3);
    let coupon = h.store.coupon(&CouponCode::new("SAVE10").unwrap()).await.unwrap().unwrap();
    assert_eq!(coupon.used_count(), 1);
    let user = h.store.user(user.id()).await.unwrap().unwrap();
    assert!(user.cart().is_empty());
    assert!(h.store.order(order.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_discounted_unit_price_is_rounded() {
    let h = Harness::new();
    let user = seed_user(h.store.as_ref(), "Asha", "asha@example.com").await;
    let product = seed_product(h.store.as_ref(), "Scarf", vec![variant("OS", 999, 10)], 15).await;

    CartService::new(h.store()).add(user.id(), product.id(), product.variants()[0].id, 1).await.unwrap();
    let order = CheckoutService::new(h.store(), h.events())
        .place_order_from_cart(caller(user.id()), PlaceOrder { ship_to: ship_to(), coupon_code: None })
        .await
        .unwrap();

    // 999 - 15% = 849.15
    assert_eq!(order.items()[0].unit_price, Money::from_units(849));
    assert_eq!(order.total_price(), Money::from_units(849));
}

#[tokio::test]
async fn test_insufficient_stock_leaves_everything_untouched() {
    let h = Harness::new();
    let user = seed_user(h.store.as_ref(), "Asha", "asha@example.com").await;
    let plenty = seed_product(h.store.as_ref(), "Socks", vec![variant("M", 200, 10)], 0).await;
    let scarce = seed_product(h.store.as_ref(), "Jacket", vec![variant("L", 5000, 2)], 0).await;
    seed_percentage_coupon(h.store.as_ref(), "SAVE10", 10, None).await;

    let cart = CartService::new(h.store());
    cart.add(user.id(), plenty.id(), plenty.variants()[0].id, 4).await.unwrap();
    cart.add(user.id(), scarce.id(), scarce.variants()[0].id, 2).await.unwrap();

    // Someone else buys the last jacket before checkout.
    let other = seed_user(h.store.as_ref(), "Ravi", "ravi@example.com").await;
    cart.add(other.id(), scarce.id(), scarce.variants()[0].id, 1).await.unwrap();
    CheckoutService::new(h.store(), h.events())
        .place_order_from_cart(caller(other.id()), PlaceOrder { ship_to: ship_to(), coupon_code: None })
        .await
        .unwrap();

    let err = CheckoutService::new(h.store(), h.events())
        .place_order_from_cart(caller(user.id()), PlaceOrder { ship_to: ship_to(), coupon_code: Some("SAVE10".into()) })
        .await
        .unwrap_err();
    match err {
        AppError::InsufficientStock { name, available } => {
            assert_eq!(available, 1);
            assert!(name.starts_with("Jacket"));
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(stock_of(h.store.as_ref(), &plenty, 0).await, 10);
    assert_eq!(stock_of(h.store.as_ref(), &scarce, 0).await, 1);
    let coupon = h.store.coupon(&CouponCode::new("SAVE10").unwrap()).await.unwrap().unwrap();
    assert_eq!(coupon.used_count(), 0);
    let user = h.store.user(user.id()).await.unwrap().unwrap();
    assert_eq!(user.cart().item_count(), 2);
    assert!(h.store.orders_for_user(user.id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_cart_and_unknown_coupon_are_rejected() {
    let h = Harness::new();
    let user = seed_user(h.store.as_ref(), "Asha", "asha@example.com").await;
    let checkout = CheckoutService::new(h.store(), h.events());

    let err = checkout
        .place_order_from_cart(caller(user.id()), PlaceOrder { ship_to: ship_to(), coupon_code: None })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));

    let product = seed_product(h.store.as_ref(), "Socks", vec![variant("M", 200, 10)], 0).await;
    CartService::new(h.store()).add(user.id(), product.id(), product.variants()[0].id, 1).await.unwrap();
    let err = checkout
        .place_order_from_cart(caller(user.id()), PlaceOrder { ship_to: ship_to(), coupon_code: Some("NOPE".into()) })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(stock_of(h.store.as_ref(), &product, 0).await, 10);
}

#[tokio::test]
async fn test_default_address_is_required_without_explicit_one() {
    let h = Harness::new();
    let user = seed_user(h.store.as_ref(), "Asha", "asha@example.com").await;
    let product = seed_product(h.store.as_ref(), "Socks", vec![variant("M", 200, 10)], 0).await;
    CartService::new(h.store()).add(user.id(), product.id(), product.variants()[0].id, 1).await.unwrap();

    let err = CheckoutService::new(h.store(), h.events())
        .place_order_from_cart(caller(user.id()), PlaceOrder { ship_to: ShipTo::Default, coupon_code: None })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_concurrent_checkouts_cannot_oversell() {
    let h = Harness::new();
    let product = seed_product(h.store.as_ref(), "Last One", vec![variant("M", 700, 1)], 0).await;
    let variant_id = product.variants()[0].id;
    let cart = CartService::new(h.store());

    let mut buyers = Vec::new();
    for i in 0..4 {
        let user = seed_user(h.store.as_ref(), "Buyer", &format!("buyer{i}@example.com")).await;
        cart.add(user.id(), product.id(), variant_id, 1).await.unwrap();
        buyers.push(user.id());
    }

    let checkout = Arc::new(CheckoutService::new(h.store(), h.events()));
    let handles: Vec<_> = buyers
        .into_iter()
        .map(|user_id| {
            let checkout = Arc::clone(&checkout);
            tokio::spawn(async move {
                checkout
                    .place_order_from_cart(caller(user_id), PlaceOrder { ship_to: ship_to(), coupon_code: None })
                    .await
            })
        })
        .collect();

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(AppError::InsufficientStock { available, .. }) => assert_eq!(available, 0),
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(placed, 1);
    assert_eq!(stock_of(h.store.as_ref(), &product, 0).await, 0);
}
