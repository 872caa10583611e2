//! Payment intent, client verification and webhook reconciliation.
//!
//! The client-side verification is advisory: it checks the checkout widget's
//! signature and records the payment id, but only a signed `payment.captured`
//! webhook moves an order to `paid`.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::{locked_order, recipient, Caller};
use crate::config::{GatewayConfig, Secret};
use crate::domain::aggregates::{OrderStatus, PaymentResult};
use crate::error::{AppError, AppResult};
use crate::events::EventPublisher;
use crate::gateway::{self, CreateRemoteOrder, PaymentGateway, WebhookEvent, PAYMENT_CAPTURED};
use crate::notify::{Email, Notifier};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub order_id: Uuid,
    /// Public gateway key for the checkout widget.
    pub key: String,
    pub remote_order_id: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct VerifyPayment {
    pub order_id: Uuid,
    pub remote_order_id: String,
    pub remote_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientPayment {
    /// Signature matched; the webhook will confirm the capture.
    Verified,
    AlreadyPaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Captured,
    AlreadyPaid,
    Ignored,
}

pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    events: EventPublisher,
    currency: String,
    key_secret: Secret,
    webhook_secret: Secret,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
        events: EventPublisher,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            events,
            currency: config.currency.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    fn intent(&self, order_id: Uuid, remote_order_id: &str, amount: i64) -> PaymentIntent {
        PaymentIntent {
            order_id,
            key: self.gateway.key_id().to_string(),
            remote_order_id: remote_order_id.to_string(),
            amount,
            currency: self.currency.clone(),
        }
    }

    /// Opens a remote gateway order for `order_id`, or returns the one already open.
    ///
    /// The gateway is called without holding the order lock. The remote order is
    /// attached only if the order still has none; a concurrent caller that
    /// attached first wins and both callers get its id.
    pub async fn create_intent(&self, caller: Caller, order_id: Uuid) -> AppResult<PaymentIntent> {
        let order = self.store.order(order_id).await?.ok_or_else(|| AppError::not_found("Order"))?;
        if !order.is_owned_by(caller.user_id) {
            return Err(AppError::Forbidden("Not your order".into()));
        }
        order.ensure_payable()?;
        if let Some((remote_order_id, amount)) = order.open_remote_order() {
            tracing::debug!(order_id = %order.id(), remote_order_id, "Reusing open payment intent");
            return Ok(self.intent(order.id(), remote_order_id, amount));
        }

        let amount = order.total_price().to_minor_units();
        if amount <= 0 {
            return Err(AppError::BusinessRule("Order total must be greater than zero".into()));
        }
        let remote = self
            .gateway
            .create_order(CreateRemoteOrder {
                amount,
                currency: self.currency.clone(),
                receipt: format!("order_{}", order.id().simple()),
                notes: json!({ "orderId": order.id(), "userId": order.user_id() }),
            })
            .await?;

        let mut tx = self.store.begin().await?;
        let mut order = locked_order(tx.as_mut(), order_id).await?;
        order.ensure_payable()?;
        if let Some((winner, amount)) = order.open_remote_order() {
            tracing::warn!(order_id = %order.id(), remote_order_id = %remote.id, kept = winner, "Discarding duplicate payment intent");
            return Ok(self.intent(order.id(), winner, amount));
        }
        order.attach_remote_order(remote.id.clone(), remote.amount);
        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id(), remote_order_id = %remote.id, amount = remote.amount, "Payment intent created");
        Ok(PaymentIntent { currency: remote.currency, ..self.intent(order.id(), &remote.id, remote.amount) })
    }

    /// Checks the checkout widget's signature. Never marks the order paid.
    pub async fn verify_client_payment(&self, caller: Caller, request: VerifyPayment) -> AppResult<ClientPayment> {
        if request.remote_order_id.trim().is_empty()
            || request.remote_payment_id.trim().is_empty()
            || request.signature.trim().is_empty()
        {
            return Err(AppError::Validation("remoteOrderId, remotePaymentId and signature are required".into()));
        }

        let mut tx = self.store.begin().await?;
        let mut order = locked_order(tx.as_mut(), request.order_id).await?;
        if !order.is_owned_by(caller.user_id) {
            return Err(AppError::Forbidden("Not your order".into()));
        }
        if order.gateway().remote_order_id.as_deref() != Some(request.remote_order_id.as_str()) {
            return Err(AppError::BusinessRule("Payment does not belong to this order".into()));
        }
        if order.is_paid() {
            return Ok(ClientPayment::AlreadyPaid);
        }

        let payload = gateway::client_payment_payload(&request.remote_order_id, &request.remote_payment_id);
        if !gateway::verify_signature(self.key_secret.expose().as_bytes(), payload.as_bytes(), &request.signature) {
            tracing::warn!(order_id = %order.id(), remote_order_id = %request.remote_order_id, "Client payment signature mismatch");
            return Err(AppError::InvalidSignature);
        }

        order.record_client_payment(request.remote_payment_id, request.signature);
        tx.save_order(&order).await?;
        tx.commit().await?;
        tracing::info!(order_id = %order.id(), "Client payment verified, awaiting capture webhook");
        Ok(ClientPayment::Verified)
    }

    /// Reconciles a gateway webhook. `body` must be the raw request bytes.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> AppResult<WebhookOutcome> {
        let signature = signature.ok_or(AppError::InvalidSignature)?;
        if !gateway::verify_signature(self.webhook_secret.expose().as_bytes(), body, signature) {
            tracing::warn!("Rejected webhook with invalid signature");
            return Err(AppError::InvalidSignature);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {e}")))?;
        if event.event != PAYMENT_CAPTURED {
            tracing::debug!(event = %event.event, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        }
        let payment = event
            .payment()
            .ok_or_else(|| AppError::Validation("Webhook carries no payment entity".into()))?;
        let remote_order_id = payment
            .order_id
            .as_deref()
            .ok_or_else(|| AppError::Validation("Captured payment has no order id".into()))?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .order_by_remote_id(remote_order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order"))?;
        if order.is_paid() {
            tracing::debug!(order_id = %order.id(), remote_order_id, "Webhook replay for paid order");
            return Ok(WebhookOutcome::AlreadyPaid);
        }
        if payment.amount.is_some() && payment.amount != order.gateway().remote_amount {
            tracing::warn!(
                order_id = %order.id(),
                captured = ?payment.amount,
                expected = ?order.gateway().remote_amount,
                "Captured amount differs from the payment intent"
            );
        }

        let previous = order.status();
        order.mark_paid(PaymentResult {
            payment_id: payment.id.clone(),
            status: payment.status.clone(),
            email: payment.email.clone(),
            method: payment.method.clone(),
        });
        tx.save_order(&order).await?;

        let converted = match tx.pending_abandoned_cart(order.user_id()).await? {
            Some(mut cart) => {
                let changed = cart.mark_converted(Utc::now());
                if changed {
                    tx.save_abandoned_cart(&cart).await?;
                }
                changed
            }
            None => false,
        };
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id(),
            remote_order_id,
            payment_id = %payment.id,
            from = %previous,
            to = %order.status(),
            abandoned_cart_converted = converted,
            "Payment captured"
        );
        if previous != OrderStatus::Pending {
            tracing::warn!(order_id = %order.id(), status = %previous, "Capture recorded for an order past pending, status left unchanged");
        }

        self.events.publish(&order.take_events()).await;
        if let Some((to, name)) = recipient(self.store.as_ref(), order.user_id()).await {
            self.notifier.dispatch(Email::order_confirmation(&to, &name, &order));
        }
        Ok(WebhookOutcome::Captured)
    }
}
