use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::FulfillmentType;
use crate::domain::ports::InventoryRepository;
use crate::domain::secret::SecretImport;
use crate::domain::stock::{StockLevel, StockTarget};

use super::{catalog, secret_pool, stock_ledger};

#[derive(Clone)]
pub struct DieselInventoryRepository {
    pool: DbPool,
}

impl DieselInventoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl InventoryRepository for DieselInventoryRepository {
    fn import_secrets(
        &self,
        product_id: Uuid,
        sku_id: Option<Uuid>,
        secrets: &[String],
    ) -> Result<SecretImport, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let sellable = catalog::find_sellable(conn, product_id, sku_id)?;
            if sellable.product.fulfillment_type.parse::<FulfillmentType>()? != FulfillmentType::Auto {
                return Err(DomainError::InvalidInput(format!(
                    "product {} is delivered manually and takes no secrets",
                    product_id
                )));
            }
            let imported = secret_pool::import(conn, product_id, sku_id, secrets)?;
            Ok(SecretImport {
                imported,
                available: secret_pool::count_available(conn, product_id, sku_id)?,
            })
        })
    }

    fn stock_level(&self, product_id: Uuid, sku_id: Option<Uuid>) -> Result<StockLevel, DomainError> {
        let mut conn = self.pool.get()?;

        let sellable = catalog::find_sellable(&mut conn, product_id, sku_id)?;
        let fulfillment_type = sellable.product.fulfillment_type.parse::<FulfillmentType>()?;
        let available = match fulfillment_type {
            FulfillmentType::Manual => {
                stock_ledger::available(&mut conn, StockTarget::new(product_id, sku_id))?.map(i64::from)
            }
            FulfillmentType::Auto => Some(secret_pool::count_available(&mut conn, product_id, sku_id)?),
        };
        Ok(StockLevel {
            product_id,
            sku_id,
            fulfillment_type,
            available,
        })
    }
}
