//! Live cart and its abandoned-cart shadow.
//!
//! Every cart write recomputes the user's pending [`AbandonedCart`] in the
//! same transaction, so the recovery snapshot never drifts from the cart.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::locked_user;
use crate::domain::aggregates::{AbandonedCart, AbandonedLine, AbandonedStatus, Cart, Product, User};
use crate::domain::value_objects::Money;
use crate::error::{AppError, AppResult};
use crate::store::{Store, StoreTx};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartViewLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub name: String,
    pub variant_label: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
    pub in_stock: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartViewLine>,
    pub items_price: Money,
}

pub struct CartService {
    store: Arc<dyn Store>,
}

fn price_lines(cart: &Cart, products: &HashMap<Uuid, Product>) -> CartView {
    let lines: Vec<CartViewLine> = cart
        .lines()
        .iter()
        .filter_map(|line| {
            let product = products.get(&line.product_id)?;
            let variant = product.variant(line.variant_id)?;
            let unit_price = product.discounted_price(variant);
            Some(CartViewLine {
                product_id: line.product_id,
                variant_id: line.variant_id,
                name: product.name().to_string(),
                variant_label: variant.label(),
                image: product.display_image(variant),
                unit_price,
                quantity: line.quantity,
                line_total: unit_price.multiply(line.quantity),
                in_stock: variant.stock.value() >= line.quantity,
            })
        })
        .collect();
    let items_price = lines.iter().fold(Money::zero(), |acc, l| acc.add(l.line_total));
    CartView { lines, items_price }
}

/// Upserts the pending abandoned-cart record from the live cart, or deletes it once the cart is empty.
/// Prices are read without row locks.
async fn recompute_abandoned(tx: &mut dyn StoreTx, user: &User) -> AppResult<()> {
    let existing = tx.pending_abandoned_cart(user.id()).await?;
    if user.cart().is_empty() {
        if let Some(record) = existing {
            tx.delete_abandoned_cart(record.id()).await?;
        }
        return Ok(());
    }

    let mut items = Vec::with_capacity(user.cart().item_count());
    for line in user.cart().lines() {
        let Some(product) = tx.product_unlocked(line.product_id).await? else { continue };
        let Some(variant) = product.variant(line.variant_id) else { continue };
        items.push(AbandonedLine {
            product_id: line.product_id,
            variant_id: line.variant_id,
            name: product.name().to_string(),
            quantity: line.quantity,
            price: product.discounted_price(variant),
        });
    }

    let record = match existing {
        Some(mut record) => {
            record.refresh(items);
            record
        }
        None => AbandonedCart::open(user.id(), user.name(), user.email().clone(), items),
    };
    tx.save_abandoned_cart(&record).await?;
    Ok(())
}

async fn available_stock(tx: &mut dyn StoreTx, product_id: Uuid, variant_id: Uuid) -> AppResult<(String, u32)> {
    let product = tx.product(product_id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    let variant = product.variant(variant_id).ok_or_else(|| AppError::not_found("Variant"))?;
    Ok((product.name().to_string(), variant.stock.value()))
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn view(&self, user_id: Uuid) -> AppResult<CartView> {
        let user = self.store.user(user_id).await?.ok_or_else(|| AppError::not_found("User"))?;
        let mut products = HashMap::new();
        for line in user.cart().lines() {
            if products.contains_key(&line.product_id) {
                continue;
            }
            if let Some(product) = self.store.product(line.product_id).await? {
                products.insert(line.product_id, product);
            }
        }
        Ok(price_lines(user.cart(), &products))
    }

    /// Adds `quantity` of a variant, merging with an existing line.
    pub async fn add(&self, user_id: Uuid, product_id: Uuid, variant_id: Uuid, quantity: u32) -> AppResult<CartView> {
        if quantity == 0 {
            return Err(AppError::Validation("Quantity must be at least 1".into()));
        }
        let mut tx = self.store.begin().await?;
        let mut user = locked_user(tx.as_mut(), user_id).await?;
        let (name, available) = available_stock(tx.as_mut(), product_id, variant_id).await?;
        let in_cart = user.cart().line(product_id, variant_id).map_or(0, |l| l.quantity);
        if in_cart.saturating_add(quantity) > available {
            return Err(AppError::InsufficientStock { name, available });
        }

        user.cart_mut().add_item(product_id, variant_id, quantity)?;
        tx.save_cart(user.id(), user.cart()).await?;
        recompute_abandoned(tx.as_mut(), &user).await?;
        tx.commit().await?;

        tracing::debug!(%user_id, %product_id, %variant_id, quantity, "Cart line added");
        self.view(user_id).await
    }

    /// Sets a line's quantity; zero removes it.
    pub async fn update(&self, user_id: Uuid, product_id: Uuid, variant_id: Uuid, quantity: u32) -> AppResult<CartView> {
        let mut tx = self.store.begin().await?;
        let mut user = locked_user(tx.as_mut(), user_id).await?;
        if quantity > 0 {
            let (name, available) = available_stock(tx.as_mut(), product_id, variant_id).await?;
            if quantity > available {
                return Err(AppError::InsufficientStock { name, available });
            }
        }

        user.cart_mut().update_quantity(product_id, variant_id, quantity)?;
        tx.save_cart(user.id(), user.cart()).await?;
        recompute_abandoned(tx.as_mut(), &user).await?;
        tx.commit().await?;

        tracing::debug!(%user_id, %product_id, %variant_id, quantity, "Cart line updated");
        self.view(user_id).await
    }

    pub async fn remove(&self, user_id: Uuid, product_id: Uuid, variant_id: Uuid) -> AppResult<CartView> {
        let mut tx = self.store.begin().await?;
        let mut user = locked_user(tx.as_mut(), user_id).await?;
        user.cart_mut().remove_item(product_id, variant_id)?;
        tx.save_cart(user.id(), user.cart()).await?;
        recompute_abandoned(tx.as_mut(), &user).await?;
        tx.commit().await?;

        tracing::debug!(%user_id, %product_id, %variant_id, "Cart line removed");
        self.view(user_id).await
    }

    pub async fn abandoned_carts(&self, status: Option<AbandonedStatus>) -> AppResult<Vec<AbandonedCart>> {
        Ok(self.store.abandoned_carts(status).await?)
    }
}
