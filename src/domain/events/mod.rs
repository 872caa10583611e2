//! Domain events
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, user_id: Uuid, total: Money },
    Paid { order_id: Uuid, user_id: Uuid, remote_payment_id: String },
    StatusChanged { order_id: Uuid, user_id: Uuid, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: Uuid, user_id: Uuid },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::Paid { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::Cancelled { order_id, .. } => *order_id,
        }
    }

    /// Event bus subject, e.g. `orders.status_changed`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::Paid { .. } => "orders.paid",
            Self::StatusChanged { .. } => "orders.status_changed",
            Self::Cancelled { .. } => "orders.cancelled",
        }
    }
}
