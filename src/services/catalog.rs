use std::sync::Arc;

use uuid::Uuid;

use crate::domain::aggregates::{NewProduct, Product};
use crate::error::{AppError, AppResult};
use crate::store::{Page, Store};

pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Creates a product. A taken slug surfaces as a conflict.
    pub async fn create(&self, new: NewProduct) -> AppResult<Product> {
        let product = Product::create(new)?;
        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;
        tracing::info!(product_id = %product.id(), slug = %product.slug(), variants = product.variants().len(), "Product created");
        Ok(product)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Product> {
        self.store.product(id).await?.ok_or_else(|| AppError::not_found("Product"))
    }

    pub async fn list(&self, category: Option<&str>, page: Page) -> AppResult<(Vec<Product>, i64)> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        Ok(self.store.list_products(category, page).await?)
    }
}
