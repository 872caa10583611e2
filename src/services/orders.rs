//! Order lifecycle: reads, admin status transitions, cancellation, invoices.

use std::sync::Arc;

use uuid::Uuid;

use super::{locked_order, locked_products, recipient, Caller};
use crate::domain::aggregates::{Order, OrderStatus, TransitionPolicy};
use crate::error::{AppError, AppResult};
use crate::events::EventPublisher;
use crate::invoice::{self, BillTo, InvoiceError};
use crate::notify::{Email, Notifier};
use crate::store::{Page, Store};

pub struct OrderService {
    store: Arc<dyn Store>,
    notifier: Notifier,
    events: EventPublisher,
    policy: TransitionPolicy,
    store_name: String,
    currency: String,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Notifier,
        events: EventPublisher,
        policy: TransitionPolicy,
        store_name: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self { store, notifier, events, policy, store_name: store_name.into(), currency: currency.into() }
    }

    pub async fn get(&self, caller: Caller, id: Uuid) -> AppResult<Order> {
        let order = self.store.order(id).await?.ok_or_else(|| AppError::not_found("Order"))?;
        if !caller.can_access(&order) {
            return Err(AppError::Forbidden("Not your order".into()));
        }
        Ok(order)
    }

    pub async fn mine(&self, caller: Caller) -> AppResult<Vec<Order>> {
        Ok(self.store.orders_for_user(caller.user_id).await?)
    }

    pub async fn list(&self, page: Page) -> AppResult<(Vec<Order>, i64)> {
        Ok(self.store.list_orders(page).await?)
    }

    /// Admin status change. A `cancelled` target runs the full cancellation.
    pub async fn update_status(&self, caller: Caller, id: Uuid, next: OrderStatus) -> AppResult<Order> {
        if !caller.is_admin {
            return Err(AppError::Forbidden("Admin access required".into()));
        }
        if next == OrderStatus::Cancelled {
            return self.cancel(caller, id).await;
        }

        let mut tx = self.store.begin().await?;
        let mut order = locked_order(tx.as_mut(), id).await?;
        let from = order.transition_to(next, self.policy)?;
        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id(), %from, to = %next, "Order status changed");
        self.events.publish(&order.take_events()).await;
        if let Some((to, name)) = recipient(self.store.as_ref(), order.user_id()).await {
            self.notifier.dispatch(Email::order_status_update(&to, &name, &order, from));
        }
        Ok(order)
    }

    /// Cancels the order and puts every line's quantity back on its variant, in one transaction.
    pub async fn cancel(&self, caller: Caller, id: Uuid) -> AppResult<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = locked_order(tx.as_mut(), id).await?;
        if !caller.can_access(&order) {
            return Err(AppError::Forbidden("Not your order".into()));
        }
        let from = order.status();
        order.cancel()?;

        let mut products = locked_products(tx.as_mut(), order.items().iter().map(|i| i.product_id)).await?;
        for item in order.items() {
            let Some(product) = products.get_mut(&item.product_id) else {
                tracing::warn!(order_id = %order.id(), product_id = %item.product_id, "Product gone, stock not restored");
                continue;
            };
            if product.restore_stock(item.variant_id, item.quantity).is_err() {
                tracing::warn!(order_id = %order.id(), variant_id = %item.variant_id, "Variant gone, stock not restored");
                continue;
            }
            if let Some(variant) = product.variant(item.variant_id) {
                tx.save_variant_stock(product.id(), variant).await?;
            }
        }

        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id(), %from, by_admin = caller.is_admin, "Order cancelled, stock restored");
        self.events.publish(&order.take_events()).await;
        if let Some((to, name)) = recipient(self.store.as_ref(), order.user_id()).await {
            self.notifier.dispatch(Email::order_cancelled(&to, &name, &order));
        }
        Ok(order)
    }

    pub async fn invoice(&self, caller: Caller, id: Uuid) -> AppResult<Vec<u8>> {
        let order = self.get(caller, id).await?;
        let owner = self.store.user(order.user_id()).await?.ok_or_else(|| AppError::not_found("User"))?;
        let email = owner.email().to_string();
        let bill_to = BillTo { name: owner.name(), email: &email };
        invoice::render(&order, &bill_to, &self.store_name, &self.currency).map_err(|e| match e {
            InvoiceError::Unpaid => AppError::BusinessRule(e.to_string()),
        })
    }
}
