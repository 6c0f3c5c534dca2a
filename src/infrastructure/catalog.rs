use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::schema::{product_skus, products};

use super::models::{ProductRow, ProductSkuRow};

/// A purchasable product (and SKU, if any) as checkout snapshots it.
#[derive(Debug, Clone)]
pub struct Sellable {
    pub product: ProductRow,
    pub sku: Option<ProductSkuRow>,
}

impl Sellable {
    pub fn unit_price(&self) -> &bigdecimal::BigDecimal {
        self.sku
            .as_ref()
            .and_then(|sku| sku.price.as_ref())
            .unwrap_or(&self.product.price)
    }

    /// Product-level promotion price, which only applies to the product's own
    /// price and never to a SKU that overrides it.
    pub fn promotion_price(&self) -> Option<&bigdecimal::BigDecimal> {
        match &self.sku {
            Some(sku) if sku.price.is_some() => None,
            _ => self.product.promotion_price.as_ref(),
        }
    }
}

/// Load an active, non-deleted product and optional SKU belonging to it.
pub fn find_sellable(
    conn: &mut PgConnection,
    product_id: Uuid,
    sku_id: Option<Uuid>,
) -> Result<Sellable, DomainError> {
    let product = products::table
        .filter(products::id.eq(product_id))
        .filter(products::deleted_at.is_null())
        .filter(products::is_active.eq(true))
        .select(ProductRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::NotFound(format!("Product {}", product_id)))?;

    let sku = match sku_id {
        Some(sku_id) => Some(
            product_skus::table
                .filter(product_skus::id.eq(sku_id))
                .filter(product_skus::product_id.eq(product_id))
                .filter(product_skus::deleted_at.is_null())
                .filter(product_skus::is_active.eq(true))
                .select(ProductSkuRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| DomainError::NotFound(format!("SKU {}", sku_id)))?,
        ),
        None => None,
    };
    Ok(Sellable { product, sku })
}
