//! Order Aggregate
//!
//! An order owns an immutable snapshot of what was bought. After creation the
//! only mutable parts are the payment fields and the fulfilment status, which
//! moves through this table:
//!
//! | from               | to                          |
//! |--------------------|-----------------------------|
//! | `pending`          | `confirmed`, `cancelled`    |
//! | `confirmed`        | `processing`, `cancelled`   |
//! | `processing`       | `shipped`                   |
//! | `shipped`          | `out_for_delivery`          |
//! | `out_for_delivery` | `delivered`                 |
//!
//! `delivered` and `cancelled` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    user_id: Uuid,
    order_items: Vec<OrderItem>,
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    items_price: Money,
    discount: Option<AppliedDiscount>,
    total_price: Money,
    gateway: GatewayDetails,
    payment_result: Option<PaymentResult>,
    paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

/// One purchased line, frozen at checkout time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub name: String,
    pub variant_label: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub image: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscount { pub coupon_code: CouponCode, pub amount: Money }

/// Correlation fields issued by the payment gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDetails {
    pub remote_order_id: Option<String>,
    pub remote_amount: Option<i64>,
    pub remote_payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub signature: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub payment_id: String,
    pub status: String,
    pub email: Option<String>,
    pub method: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, OutForDelivery, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Created, Paid, Failed }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Manual, #[default] Gateway }

/// How strictly status changes follow the transition table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Only transitions listed in the table are accepted.
    #[default]
    Strict,
    /// Additionally lets a `pending` order jump to any status.
    PendingEscape,
}

impl FromStr for TransitionPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "strict" => Ok(Self::Strict), "pending-escape" => Ok(Self::PendingEscape), other => Err(format!("unknown status policy {other}")) }
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::Pending, Self::Confirmed, Self::Processing, Self::Shipped,
        Self::OutForDelivery, Self::Delivered, Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn next_allowed(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Shipped],
            Self::Shipped => &[Self::OutForDelivery],
            Self::OutForDelivery => &[Self::Delivered],
            Self::Delivered | Self::Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool { self.next_allowed().is_empty() }

    pub fn can_transition_to(&self, next: OrderStatus, policy: TransitionPolicy) -> bool {
        if policy == TransitionPolicy::PendingEscape && *self == Self::Pending { return true; }
        self.next_allowed().contains(&next)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| format!("unknown order status {s}"))
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Created => "created", Self::Paid => "paid", Self::Failed => "failed" }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending), "created" => Ok(Self::Created),
            "paid" => Ok(Self::Paid), "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status {other}")),
        }
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Manual => "manual", Self::Gateway => "gateway" }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "manual" => Ok(Self::Manual), "gateway" => Ok(Self::Gateway), other => Err(format!("unknown payment method {other}")) }
    }
}

/// Columns needed to rebuild a stored order.
#[derive(Clone, Debug)]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub items_price: Money,
    pub discount: Option<AppliedDiscount>,
    pub total_price: Money,
    pub gateway: GatewayDetails,
    pub payment_result: Option<PaymentResult>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a gateway-paid order awaiting payment.
    pub fn place(
        user_id: Uuid,
        order_items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
        discount: Option<AppliedDiscount>,
    ) -> Result<Self, OrderError> {
        if order_items.is_empty() { return Err(OrderError::NoItems); }
        let items_price = order_items.iter().fold(Money::zero(), |acc, i| acc.add(i.line_total()));
        let total_price = match &discount {
            Some(d) => items_price.saturating_sub(d.amount),
            None => items_price,
        };
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), user_id, order_items, shipping_address,
            payment_method: PaymentMethod::Gateway, payment_status: PaymentStatus::Created,
            order_status: OrderStatus::Pending, items_price, discount, total_price,
            gateway: GatewayDetails::default(), payment_result: None, paid_at: None,
            delivered_at: None, cancelled_at: None, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Created { order_id: order.id, user_id, total: total_price });
        Ok(order)
    }

    pub fn restore(r: OrderRecord) -> Self {
        Self {
            id: r.id, user_id: r.user_id, order_items: r.order_items, shipping_address: r.shipping_address,
            payment_method: r.payment_method, payment_status: r.payment_status, order_status: r.order_status,
            items_price: r.items_price, discount: r.discount, total_price: r.total_price, gateway: r.gateway,
            payment_result: r.payment_result, paid_at: r.paid_at, delivered_at: r.delivered_at,
            cancelled_at: r.cancelled_at, created_at: r.created_at, updated_at: r.updated_at, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[OrderItem] { &self.order_items }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status(&self) -> OrderStatus { self.order_status }
    pub fn items_price(&self) -> Money { self.items_price }
    pub fn discount(&self) -> Option<&AppliedDiscount> { self.discount.as_ref() }
    pub fn total_price(&self) -> Money { self.total_price }
    pub fn gateway(&self) -> &GatewayDetails { &self.gateway }
    pub fn payment_result(&self) -> Option<&PaymentResult> { self.payment_result.as_ref() }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> { self.cancelled_at }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_paid(&self) -> bool { self.payment_status == PaymentStatus::Paid }
    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    /// Moves the order along the status table. Cancellation goes through [`Order::cancel`].
    pub fn transition_to(&mut self, next: OrderStatus, policy: TransitionPolicy) -> Result<OrderStatus, OrderError> {
        let from = self.order_status;
        if next == OrderStatus::Cancelled { return Err(OrderError::CancelThroughCancellation); }
        if !from.can_transition_to(next, policy) {
            return Err(OrderError::InvalidTransition { from, to: next });
        }
        self.order_status = next;
        if next == OrderStatus::Delivered { self.delivered_at = Some(Utc::now()); }
        self.touch();
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id, user_id: self.user_id, from, to: next });
        Ok(from)
    }

    /// Flips the order to `cancelled`; the caller restores stock for [`Order::items`].
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        match self.order_status {
            OrderStatus::Delivered => return Err(OrderError::AlreadyDelivered),
            OrderStatus::Cancelled => return Err(OrderError::AlreadyCancelled),
            _ => {}
        }
        self.order_status = OrderStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
        self.touch();
        self.raise_event(OrderEvent::Cancelled { order_id: self.id, user_id: self.user_id });
        Ok(())
    }

    /// Checks the order can still be paid through the gateway.
    pub fn ensure_payable(&self) -> Result<(), OrderError> {
        if self.payment_method != PaymentMethod::Gateway { return Err(OrderError::NotGatewayPayment); }
        if self.is_paid() { return Err(OrderError::AlreadyPaid); }
        if self.order_status == OrderStatus::Cancelled { return Err(OrderError::AlreadyCancelled); }
        Ok(())
    }

    /// Remote order already issued for this order, if payment is still open.
    pub fn open_remote_order(&self) -> Option<(&str, i64)> {
        if !matches!(self.payment_status, PaymentStatus::Pending | PaymentStatus::Created) { return None; }
        match (&self.gateway.remote_order_id, self.gateway.remote_amount) {
            (Some(id), Some(amount)) => Some((id.as_str(), amount)),
            _ => None,
        }
    }

    pub fn attach_remote_order(&mut self, remote_order_id: String, amount: i64) {
        self.gateway.remote_order_id = Some(remote_order_id);
        self.gateway.remote_amount = Some(amount);
        self.payment_status = PaymentStatus::Created;
        self.touch();
    }

    /// Stores what the client reported; does not mark the order paid.
    pub fn record_client_payment(&mut self, remote_payment_id: String, signature: String) {
        self.gateway.remote_payment_id = Some(remote_payment_id);
        self.gateway.signature = Some(signature);
        self.touch();
    }

    /// Records a captured payment. Returns `false` when the order was already paid.
    pub fn mark_paid(&mut self, result: PaymentResult) -> bool {
        if self.is_paid() { return false; }
        let now = Utc::now();
        self.payment_status = PaymentStatus::Paid;
        self.paid_at = Some(now);
        if self.gateway.remote_payment_id.is_none() {
            self.gateway.remote_payment_id = Some(result.payment_id.clone());
        }
        let remote_payment_id = result.payment_id.clone();
        self.payment_result = Some(result);
        if self.order_status == OrderStatus::Pending {
            self.order_status = OrderStatus::Confirmed;
        }
        self.updated_at = now;
        self.raise_event(OrderEvent::Paid { order_id: self.id, user_id: self.user_id, remote_payment_id });
        true
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Orders are cancelled through the cancel action")]
    CancelThroughCancellation,
    #[error("Delivered orders cannot be cancelled")]
    AlreadyDelivered,
    #[error("Order is already cancelled")]
    AlreadyCancelled,
    #[error("Order is not paid through the payment gateway")]
    NotGatewayPayment,
    #[error("Order is already paid")]
    AlreadyPaid,
}
