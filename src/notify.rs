//! Transactional email.
//!
//! Notifications are best-effort: [`Notifier::dispatch`] hands the email to a
//! spawned task and returns immediately. A failed send is logged at `warn` and
//! never reaches the caller, so it cannot block or undo a committed change.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{MailConfig, Secret};
use crate::domain::aggregates::{AbandonedCart, Order, OrderStatus};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail provider returned status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Template {
    OrderConfirmation,
    OrderStatusUpdate,
    OrderCancelled,
    AbandonedCartReminder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub template: Template,
    pub variables: serde_json::Value,
}

fn short_id(order: &Order) -> String {
    order.id().simple().to_string()[..8].to_uppercase()
}

fn order_variables(name: &str, order: &Order) -> serde_json::Value {
    json!({
        "name": name,
        "orderId": order.id(),
        "orderNumber": short_id(order),
        "status": order.status(),
        "items": order.items().iter().map(|i| json!({
            "name": i.name,
            "variant": i.variant_label,
            "quantity": i.quantity,
            "unitPrice": i.unit_price,
            "lineTotal": i.line_total(),
        })).collect::<Vec<_>>(),
        "itemsPrice": order.items_price(),
        "discount": order.discount().map(|d| d.amount),
        "totalPrice": order.total_price(),
    })
}

impl Email {
    pub fn order_confirmation(to: &str, name: &str, order: &Order) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Order #{} confirmed", short_id(order)),
            template: Template::OrderConfirmation,
            variables: order_variables(name, order),
        }
    }

    pub fn order_status_update(to: &str, name: &str, order: &Order, from: OrderStatus) -> Self {
        let mut variables = order_variables(name, order);
        variables["previousStatus"] = json!(from);
        variables["deliveredAt"] = json!(order.delivered_at());
        Self {
            to: to.to_string(),
            subject: format!("Order #{} is now {}", short_id(order), order.status().as_str().replace('_', " ")),
            template: Template::OrderStatusUpdate,
            variables,
        }
    }

    pub fn order_cancelled(to: &str, name: &str, order: &Order) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Order #{} cancelled", short_id(order)),
            template: Template::OrderCancelled,
            variables: order_variables(name, order),
        }
    }

    pub fn abandoned_cart_reminder(cart: &AbandonedCart) -> Self {
        Self {
            to: cart.user_email().to_string(),
            subject: "You left something in your cart".to_string(),
            template: Template::AbandonedCartReminder,
            variables: json!({
                "name": cart.user_name(),
                "items": cart.items(),
                "total": cart.total(),
            }),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Posts templated mail to a provider's HTTP API.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Secret,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    #[serde(flatten)]
    email: &'a Email,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, api_key: Secret, from: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url: url.into(), api_key, from: from.into() })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose())
            .json(&SendRequest { from: &self.from, email })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MailError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes mail to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, template = ?email.template, subject = %email.subject, "Mail (not sent)");
        Ok(())
    }
}

/// Picks the HTTP mailer when a provider is configured.
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    Ok(match &config.api {
        Some((url, key)) => Arc::new(HttpMailer::new(url.clone(), key.clone(), config.from.clone())?),
        None => Arc::new(LogMailer),
    })
}

#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self { Self { mailer } }

    pub fn dispatch(&self, email: Email) -> JoinHandle<()> {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => tracing::debug!(to = %email.to, template = ?email.template, "Mail sent"),
                Err(e) => tracing::warn!(to = %email.to, template = ?email.template, error = %e, "Mail delivery failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::item;
    use crate::domain::aggregates::ShippingAddress;
    use uuid::Uuid;

    struct Unreachable;

    #[async_trait]
    impl Mailer for Unreachable {
        async fn send(&self, _: &Email) -> Result<(), MailError> { Err(MailError::Status(503)) }
    }

    fn order() -> Order {
        Order::place(Uuid::now_v7(), vec![item(2, 1000)], ShippingAddress::default(), None).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let notifier = Notifier::new(Arc::new(Unreachable));
        let email = Email::order_confirmation("asha@example.com", "Asha", &order());
        notifier.dispatch(email).await.expect("dispatch task must not panic");
    }

    #[test]
    fn test_templates_serialize_kebab_case() {
        assert_eq!(serde_json::to_value(Template::AbandonedCartReminder).unwrap(), "abandoned-cart-reminder");
        let email = Email::order_status_update("asha@example.com", "Asha", &order(), OrderStatus::Pending);
        let body = serde_json::to_value(SendRequest { from: "orders@shop.test", email: &email }).unwrap();
        assert_eq!(body["from"], "orders@shop.test");
        assert_eq!(body["template"], "order-status-update");
        assert_eq!(body["variables"]["previousStatus"], "pending");
        assert_eq!(body["variables"]["totalPrice"], "2000");
    }
}
