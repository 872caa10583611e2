//! Cart Aggregate
//!
//! The cart is owned by its user and only ever holds references into the
//! catalog; prices are resolved when the cart is priced or checked out.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: u32,
}

impl Cart {
    pub fn new() -> Self { Self::default() }
    pub fn from_lines(lines: Vec<CartLine>) -> Self { Self { lines } }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn item_count(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn line(&self, product_id: Uuid, variant_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id && l.variant_id == variant_id)
    }

    /// Adds a line, merging into an existing line for the same variant.
    pub fn add_item(&mut self, product_id: Uuid, variant_id: Uuid, quantity: u32) -> Result<&CartLine, CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        let idx = match self.lines.iter().position(|l| l.product_id == product_id && l.variant_id == variant_id) {
            Some(idx) => {
                self.lines[idx].quantity = self.lines[idx].quantity.saturating_add(quantity);
                idx
            }
            None => {
                self.lines.push(CartLine { product_id, variant_id, quantity });
                self.lines.len() - 1
            }
        };
        Ok(&self.lines[idx])
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, product_id: Uuid, variant_id: Uuid, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return self.remove_item(product_id, variant_id); }
        let line = self.lines.iter_mut()
            .find(|l| l.product_id == product_id && l.variant_id == variant_id)
            .ok_or(CartError::ItemNotFound)?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid, variant_id: Uuid) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| !(l.product_id == product_id && l.variant_id == variant_id));
        if self.lines.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn clear(&mut self) { self.lines.clear(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found in cart"),
            Self::InvalidQuantity => write!(f, "Quantity must be at least 1"),
        }
    }
}
