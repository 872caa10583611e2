//! Application services.
//!
//! Each service owns the collaborators it needs and runs every multi-step
//! write inside one [`StoreTx`](crate::store::StoreTx). Side effects that may
//! fail independently (mail, event bus) run only after the commit.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod sweep;

pub use accounts::{AccountService, AuthResponse, NewAddress, UserProfile};
pub use cart::{CartService, CartView, CartViewLine};
pub use catalog::CatalogService;
pub use checkout::{CheckoutService, PlaceOrder, ShipTo};
pub use coupons::{CouponPreview, CouponService};
pub use orders::OrderService;
pub use payments::{ClientPayment, PaymentIntent, PaymentService, VerifyPayment, WebhookOutcome};
pub use sweep::{AbandonedCartSweeper, SweepReport};

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::domain::aggregates::{Order, Product, User};
use crate::error::{AppError, AppResult};
use crate::store::{Store, StoreTx};

/// The caller as far as services care: who, and whether they administer the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Caller {
    pub fn can_access(&self, order: &Order) -> bool { self.is_admin || order.is_owned_by(self.user_id) }
}

impl From<crate::auth::AuthUser> for Caller {
    fn from(user: crate::auth::AuthUser) -> Self { Self { user_id: user.id, is_admin: user.is_admin() } }
}

pub(crate) async fn locked_order(tx: &mut dyn StoreTx, id: Uuid) -> AppResult<Order> {
    tx.order(id).await?.ok_or_else(|| AppError::not_found("Order"))
}

/// Locks the distinct products in ascending id order, whatever order the caller lists them in.
/// Missing products are left out of the map.
pub(crate) async fn locked_products(
    tx: &mut dyn StoreTx,
    ids: impl IntoIterator<Item = Uuid>,
) -> AppResult<HashMap<Uuid, Product>> {
    let ids: BTreeSet<Uuid> = ids.into_iter().collect();
    let mut products = HashMap::with_capacity(ids.len());
    for id in ids {
        if let Some(product) = tx.product(id).await? {
            products.insert(id, product);
        }
    }
    Ok(products)
}

pub(crate) async fn locked_user(tx: &mut dyn StoreTx, id: Uuid) -> AppResult<User> {
    tx.user(id).await?.ok_or_else(|| AppError::not_found("User"))
}

/// Owner's name and email for a notification; `None` (logged) when the account is gone.
pub(crate) async fn recipient(store: &dyn Store, user_id: Uuid) -> Option<(String, String)> {
    match store.user(user_id).await {
        Ok(Some(user)) => Some((user.email().to_string(), user.name().to_string())),
        Ok(None) => {
            tracing::warn!(%user_id, "Skipping notification, user no longer exists");
            None
        }
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "Skipping notification, user lookup failed");
            None
        }
    }
}
