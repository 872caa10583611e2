//! Cart to order conversion.
//!
//! The whole conversion is one transaction. Product rows are locked up front
//! in id order, so checkouts with the same products in a different cart order
//! queue behind each other instead of deadlocking. Stock checks and decrements
//! then run line by line in cart order, the coupon is redeemed, the order is
//! inserted and the cart emptied. Any rejection drops the transaction, so
//! stock, coupon usage and the cart stay untouched.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::{locked_products, locked_user, Caller};
use crate::domain::aggregates::{AppliedDiscount, Order, OrderItem, ProductError, ShippingAddress, User};
use crate::domain::value_objects::{CouponCode, Money};
use crate::error::{AppError, AppResult};
use crate::events::EventPublisher;
use crate::store::Store;

/// Where the order ships to.
#[derive(Debug, Clone)]
pub enum ShipTo {
    Address(ShippingAddress),
    /// An entry of the user's address book.
    Saved(Uuid),
    /// The user's default address.
    Default,
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub ship_to: ShipTo,
    pub coupon_code: Option<String>,
}

pub struct CheckoutService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

fn shipping_for(user: &User, ship_to: ShipTo) -> AppResult<ShippingAddress> {
    match ship_to {
        ShipTo::Address(address) => Ok(address),
        ShipTo::Saved(id) => user.address(id).map(|a| a.to_shipping()).ok_or_else(|| AppError::not_found("Address")),
        ShipTo::Default => user
            .default_address()
            .map(|a| a.to_shipping())
            .ok_or_else(|| AppError::Validation("A shipping address is required".into())),
    }
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self { Self { store, events } }

    pub async fn place_order_from_cart(&self, caller: Caller, request: PlaceOrder) -> AppResult<Order> {
        let mut tx = self.store.begin().await?;
        let mut user = locked_user(tx.as_mut(), caller.user_id).await?;
        if user.cart().is_empty() {
            return Err(AppError::EmptyCart);
        }
        let shipping_address = shipping_for(&user, request.ship_to)?;

        // One copy per product so repeated lines see earlier decrements.
        let mut products = locked_products(tx.as_mut(), user.cart().lines().iter().map(|l| l.product_id)).await?;
        let mut items = Vec::with_capacity(user.cart().item_count());
        for line in user.cart().lines() {
            let product = products.get_mut(&line.product_id).ok_or_else(|| AppError::not_found("Product"))?;
            let variant = product.variant(line.variant_id).cloned().ok_or_else(|| AppError::not_found("Variant"))?;
            let label = variant.label();

            product.remove_stock(variant.id, line.quantity).map_err(|e| match e {
                ProductError::InsufficientStock { available, .. } => AppError::InsufficientStock {
                    name: if label.is_empty() { product.name().to_string() } else { format!("{} ({label})", product.name()) },
                    available,
                },
                other => other.into(),
            })?;
            let remaining = product.variant(variant.id).ok_or_else(|| AppError::not_found("Variant"))?;
            tx.save_variant_stock(product.id(), remaining).await?;

            items.push(OrderItem {
                product_id: product.id(),
                variant_id: variant.id,
                name: product.name().to_string(),
                variant_label: label,
                unit_price: product.discounted_price(&variant),
                quantity: line.quantity,
                image: product.display_image(&variant),
            });
        }

        let items_price = items.iter().fold(Money::zero(), |acc, i| acc.add(i.line_total()));
        let discount = match request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => {
                let code = CouponCode::new(raw).map_err(|_| AppError::not_found("Coupon"))?;
                let mut coupon = tx.coupon(&code).await?.ok_or_else(|| AppError::not_found("Coupon"))?;
                let amount = coupon.redeem(items_price, Utc::now())?;
                tx.save_coupon(&coupon).await?;
                Some(AppliedDiscount { coupon_code: code, amount })
            }
            None => None,
        };

        let mut order = Order::place(user.id(), items, shipping_address, discount)?;
        tx.insert_order(&order).await?;
        user.cart_mut().clear();
        tx.save_cart(user.id(), user.cart()).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id(),
            user_id = %user.id(),
            items = order.items().len(),
            items_price = %order.items_price(),
            total = %order.total_price(),
            coupon = order.discount().map(|d| d.coupon_code.as_str()),
            "Order placed from cart"
        );
        self.events.publish(&order.take_events()).await;
        Ok(order)
    }
}
