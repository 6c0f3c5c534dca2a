pub mod catalog;
pub mod commission_ledger;
pub mod coupon_repo;
pub mod gateways;
pub mod inventory_repo;
pub mod models;
pub mod order_repo;
pub mod outbox;
pub mod payment_repo;
pub mod secret_pool;
pub mod stock_ledger;
pub mod wallet_ledger;

#[cfg(test)]
pub(crate) mod test_support;

use crate::domain::errors::DomainError;

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}
