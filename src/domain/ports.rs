use uuid::Uuid;

use super::errors::DomainError;
use super::payment::{
    CreatePaymentRequest, CreatedPayment, NormalizedEvent, PaymentStatus, ProviderType,
    RawCallback,
};
use super::secret::SecretImport;
use super::stock::StockLevel;

/// Normalised contract every payment provider integration implements.
///
/// Signing, signature verification and provider HTTP calls stay behind this
/// trait; the reconciliation processor only ever sees `NormalizedEvent`s.
pub trait PaymentGateway: Send + Sync + 'static {
    fn provider(&self) -> ProviderType;

    fn create_payment(&self, request: &CreatePaymentRequest)
        -> Result<CreatedPayment, DomainError>;

    /// Authenticate and parse a provider callback.
    fn verify_callback(&self, raw: &RawCallback) -> Result<NormalizedEvent, DomainError>;

    fn to_payment_status(&self, provider_status: &str) -> PaymentStatus;

    /// Response body the provider expects once a callback was accepted.
    fn callback_ack(&self) -> &'static str {
        "success"
    }
}

/// Operator-side view of what can be sold.
pub trait InventoryRepository: Send + Sync + 'static {
    /// Load secrets for an auto-delivered product or SKU.
    fn import_secrets(
        &self,
        product_id: Uuid,
        sku_id: Option<Uuid>,
        secrets: &[String],
    ) -> Result<SecretImport, DomainError>;

    fn stock_level(&self, product_id: Uuid, sku_id: Option<Uuid>) -> Result<StockLevel, DomainError>;
}
