use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::ports::InventoryRepository;
use crate::domain::secret::SecretImport;
use crate::domain::stock::StockLevel;

/// Largest secret batch accepted in one import.
pub const MAX_IMPORT_BATCH: usize = 5_000;

#[derive(Clone)]
pub struct InventoryService<R> {
    repo: R,
}

impl<R: InventoryRepository> InventoryService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn import_secrets(
        &self,
        product_id: Uuid,
        sku_id: Option<Uuid>,
        secrets: Vec<String>,
    ) -> Result<SecretImport, DomainError> {
        if secrets.is_empty() || secrets.len() > MAX_IMPORT_BATCH {
            return Err(DomainError::InvalidInput(format!(
                "a secret batch holds between 1 and {} entries",
                MAX_IMPORT_BATCH
            )));
        }
        self.repo.import_secrets(product_id, sku_id, &secrets)
    }

    pub fn stock_level(&self, product_id: Uuid, sku_id: Option<Uuid>) -> Result<StockLevel, DomainError> {
        self.repo.stock_level(product_id, sku_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::order::FulfillmentType;

    #[derive(Default)]
    struct InMemoryInventory {
        secrets: Mutex<Vec<String>>,
    }

    impl InventoryRepository for InMemoryInventory {
        fn import_secrets(
            &self,
            _product_id: Uuid,
            _sku_id: Option<Uuid>,
            secrets: &[String],
        ) -> Result<SecretImport, DomainError> {
            let mut pool = self.secrets.lock().unwrap();
            pool.extend_from_slice(secrets);
            Ok(SecretImport {
                imported: secrets.len(),
                available: pool.len() as i64,
            })
        }

        fn stock_level(&self, product_id: Uuid, sku_id: Option<Uuid>) -> Result<StockLevel, DomainError> {
            Ok(StockLevel {
                product_id,
                sku_id,
                fulfillment_type: FulfillmentType::Auto,
                available: Some(self.secrets.lock().unwrap().len() as i64),
            })
        }
    }

    #[test]
    fn rejects_empty_and_oversized_batches() {
        let service = InventoryService::new(InMemoryInventory::default());
        let product = Uuid::new_v4();

        assert!(matches!(
            service.import_secrets(product, None, Vec::new()),
            Err(DomainError::InvalidInput(_))
        ));
        let oversized = vec!["K".to_string(); MAX_IMPORT_BATCH + 1];
        assert!(matches!(
            service.import_secrets(product, None, oversized),
            Err(DomainError::InvalidInput(_))
        ));

        let imported = service
            .import_secrets(product, None, vec!["K-1".into(), "K-2".into()])
            .unwrap();
        assert_eq!(imported, SecretImport { imported: 2, available: 2 });
        assert_eq!(service.stock_level(product, None).unwrap().available, Some(2));
    }
}
