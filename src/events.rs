//! Order event publication over NATS.

use crate::domain::events::OrderEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// A publisher that drops every event.
    pub fn disabled() -> Self { Self::default() }

    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(%url, "Connected to NATS");
                Self::new(Some(client))
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "NATS unavailable, order events will not be published");
                Self::disabled()
            }
        }
    }

    /// Publishes each event on `orders.<kind>`. Failures are logged and dropped.
    pub async fn publish(&self, events: &[OrderEvent]) {
        let Some(nats) = &self.nats else { return };
        for event in events {
            let payload = match serde_json::to_vec(event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(order_id = %event.order_id(), error = %e, "Failed to encode order event");
                    continue;
                }
            };
            if let Err(e) = nats.publish(event.subject().to_string(), payload.into()).await {
                tracing::warn!(order_id = %event.order_id(), subject = event.subject(), error = %e, "Failed to publish order event");
            }
        }
    }
}
