use bigdecimal::BigDecimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Insufficient stock for {0}")]
    InsufficientStock(String),
    #[error("Insufficient wallet balance")]
    InsufficientBalance,
    #[error("Coupon unavailable: {0}")]
    CouponUnavailable(String),
    #[error("Order {0} is not payable")]
    NotPayable(String),
    #[error("Unknown payment: {0}")]
    UnknownPayment(String),
    #[error("Payment amount mismatch: expected {expected}, received {received}")]
    AmountMismatch {
        expected: String,
        received: String,
    },
    #[error("Gateway error: {0}")]
    Gateway(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn amount_mismatch(
        expected: &BigDecimal,
        expected_currency: &str,
        received: &BigDecimal,
        received_currency: &str,
    ) -> Self {
        DomainError::AmountMismatch {
            expected: format!("{} {}", expected, expected_currency),
            received: format!("{} {}", received, received_currency),
        }
    }
}
