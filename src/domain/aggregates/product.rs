//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::value_objects::{AttributeValue, Money, Quantity, Sku, Slug};

/// Variant attributes keyed by name. Ordered so labels render the same everywhere.
pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: Uuid,
    name: String,
    slug: Slug,
    category: String,
    description: String,
    images: Vec<ProductImage>,
    variants: Vec<Variant>,
    discount_percent: Decimal,
    rating: Decimal,
    review_count: u32,
    is_best_seller: bool,
    is_just_landed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: Uuid,
    pub attributes: Attributes,
    pub price: Money,
    pub stock: Quantity,
    pub images: Vec<String>,
    pub sku: Option<Sku>,
}

impl Variant {
    pub fn new(attributes: Attributes, price: Money, stock: u32) -> Self {
        Self { id: Uuid::now_v7(), attributes, price, stock: Quantity::new(stock), images: vec![], sku: None }
    }

    /// Human readable label, e.g. `color: Red / size: XL`.
    pub fn label(&self) -> String {
        self.attributes.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>().join(" / ")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage { pub url: String, pub storage_id: String }

/// Fields a product is created from.
#[derive(Clone, Debug)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub description: String,
    pub images: Vec<ProductImage>,
    pub variants: Vec<Variant>,
    pub discount_percent: Decimal,
    pub is_best_seller: bool,
    pub is_just_landed: bool,
}

/// Columns needed to rebuild a stored product.
#[derive(Clone, Debug)]
pub struct ProductRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub description: String,
    pub images: Vec<ProductImage>,
    pub variants: Vec<Variant>,
    pub discount_percent: Decimal,
    pub rating: Decimal,
    pub review_count: u32,
    pub is_best_seller: bool,
    pub is_just_landed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(new: NewProduct) -> Result<Self, ProductError> {
        let name = new.name.trim().to_string();
        if name.is_empty() { return Err(ProductError::MissingName); }
        if new.variants.is_empty() { return Err(ProductError::NoVariants); }
        if new.discount_percent < Decimal::ZERO || new.discount_percent > Decimal::ONE_HUNDRED {
            return Err(ProductError::InvalidDiscount);
        }
        let slug = Slug::from_name(&name);
        if slug.as_str().is_empty() { return Err(ProductError::MissingName); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), name, slug, category: new.category, description: new.description,
            images: new.images, variants: new.variants, discount_percent: new.discount_percent,
            rating: Decimal::ZERO, review_count: 0, is_best_seller: new.is_best_seller,
            is_just_landed: new.is_just_landed, created_at: now, updated_at: now,
        })
    }

    pub fn restore(r: ProductRecord) -> Self {
        Self {
            id: r.id, name: r.name, slug: Slug::from_stored(r.slug), category: r.category,
            description: r.description, images: r.images, variants: r.variants,
            discount_percent: r.discount_percent, rating: r.rating, review_count: r.review_count,
            is_best_seller: r.is_best_seller, is_just_landed: r.is_just_landed,
            created_at: r.created_at, updated_at: r.updated_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn slug(&self) -> &Slug { &self.slug }
    pub fn category(&self) -> &str { &self.category }
    pub fn description(&self) -> &str { &self.description }
    pub fn images(&self) -> &[ProductImage] { &self.images }
    pub fn variants(&self) -> &[Variant] { &self.variants }
    pub fn discount_percent(&self) -> Decimal { self.discount_percent }
    pub fn rating(&self) -> Decimal { self.rating }
    pub fn review_count(&self) -> u32 { self.review_count }
    pub fn is_best_seller(&self) -> bool { self.is_best_seller }
    pub fn is_just_landed(&self) -> bool { self.is_just_landed }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Unit price after the product-level discount, rounded to whole units.
    pub fn discounted_price(&self, variant: &Variant) -> Money {
        let off = variant.price.percent(self.discount_percent);
        variant.price.saturating_sub(off).round_units()
    }

    /// First image to show for a variant: its own, else the product's.
    pub fn display_image(&self, variant: &Variant) -> Option<String> {
        variant.images.first().cloned().or_else(|| self.images.first().map(|i| i.url.clone()))
    }

    pub fn remove_stock(&mut self, variant_id: Uuid, qty: u32) -> Result<Quantity, ProductError> {
        let variant = self.variants.iter_mut().find(|v| v.id == variant_id).ok_or(ProductError::VariantNotFound)?;
        variant.stock = variant.stock.subtract(qty).ok_or(ProductError::InsufficientStock {
            available: variant.stock.value(),
            requested: qty,
        })?;
        let stock = variant.stock;
        self.touch();
        Ok(stock)
    }

    pub fn restore_stock(&mut self, variant_id: Uuid, qty: u32) -> Result<Quantity, ProductError> {
        let variant = self.variants.iter_mut().find(|v| v.id == variant_id).ok_or(ProductError::VariantNotFound)?;
        variant.stock = variant.stock.add(qty);
        let stock = variant.stock;
        self.touch();
        Ok(stock)
    }

    /// Overwrites a variant's stock with a stored value.
    pub(crate) fn set_stock(&mut self, variant_id: Uuid, stock: Quantity) -> Result<(), ProductError> {
        let variant = self.variants.iter_mut().find(|v| v.id == variant_id).ok_or(ProductError::VariantNotFound)?;
        variant.stock = stock;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("Product name is required")]
    MissingName,
    #[error("A product needs at least one variant")]
    NoVariants,
    #[error("Discount must be between 0 and 100 percent")]
    InvalidDiscount,
    #[error("Variant not found")]
    VariantNotFound,
    #[error("Insufficient stock: only {available} left")]
    InsufficientStock { available: u32, requested: u32 },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn shirt(price: u32, stock: u32, discount: u32) -> Product {
        let mut attributes = Attributes::new();
        attributes.insert("size".into(), AttributeValue::Named("XL".into()));
        attributes.insert("color".into(), AttributeValue::Named("Red".into()));
        Product::create(NewProduct {
            name: "Linen Shirt".into(), category: "shirts".into(), description: String::new(),
            images: vec![ProductImage { url: "https://cdn.test/shirt.jpg".into(), storage_id: "shirt".into() }],
            variants: vec![Variant::new(attributes, Money::from_units(price), stock)],
            discount_percent: Decimal::from(discount), is_best_seller: false, is_just_landed: true,
        }).unwrap()
    }

    #[test]
    fn test_product_create() {
        let p = shirt(1000, 5, 0);
        assert_eq!(p.name(), "Linen Shirt");
        assert_eq!(p.slug().as_str(), "linen-shirt");
    }

    #[test]
    fn test_requires_variant() {
        let err = Product::create(NewProduct {
            name: "Empty".into(), category: "x".into(), description: String::new(), images: vec![],
            variants: vec![], discount_percent: Decimal::ZERO, is_best_seller: false, is_just_landed: false,
        }).unwrap_err();
        assert_eq!(err, ProductError::NoVariants);
    }

    #[test]
    fn test_label_is_sorted_by_attribute_name() {
        let p = shirt(1000, 5, 0);
        assert_eq!(p.variants()[0].label(), "color: Red / size: XL");
    }

    #[test]
    fn test_discounted_price_rounds() {
        let p = shirt(999, 5, 15);
        // 999 * 0.85 = 849.15
        assert_eq!(p.discounted_price(&p.variants()[0]), Money::from_units(849));
        let p = shirt(1000, 5, 0);
        assert_eq!(p.discounted_price(&p.variants()[0]), Money::from_units(1000));
    }

    #[test]
    fn test_stock() {
        let mut p = shirt(1000, 5, 0);
        let id = p.variants()[0].id;
        assert_eq!(p.remove_stock(id, 2).unwrap().value(), 3);
        assert_eq!(p.remove_stock(id, 4), Err(ProductError::InsufficientStock { available: 3, requested: 4 }));
        assert_eq!(p.restore_stock(id, 2).unwrap().value(), 5);
        assert_eq!(p.remove_stock(Uuid::now_v7(), 1), Err(ProductError::VariantNotFound));
    }
}
