//! Concrete payment gateway adapters and the registry the reconciliation
//! processor selects them from.

pub mod crypto;
pub mod epay;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::DomainError;
use crate::domain::payment::ProviderType;
use crate::domain::ports::PaymentGateway;

pub use crypto::CryptoGateway;
pub use epay::EpayGateway;

/// Adapters keyed by the provider tag stored on each payment.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<ProviderType, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, provider: ProviderType) -> Result<Arc<dyn PaymentGateway>, DomainError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or_else(|| DomainError::InvalidInput(format!("payment provider '{}' is not configured", provider)))
    }

    pub fn providers(&self) -> Vec<ProviderType> {
        let mut providers: Vec<_> = self.gateways.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
