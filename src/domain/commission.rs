use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;
use super::order::round_money;

pub const ORDER_COMMISSION: &str = "order";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommissionStatus {
    PendingConfirm,
    Available,
    Withdrawn,
    Rejected,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::PendingConfirm => "pending_confirm",
            CommissionStatus::Available => "available",
            CommissionStatus::Withdrawn => "withdrawn",
            CommissionStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_confirm" => Ok(CommissionStatus::PendingConfirm),
            "available" => Ok(CommissionStatus::Available),
            "withdrawn" => Ok(CommissionStatus::Withdrawn),
            "rejected" => Ok(CommissionStatus::Rejected),
            other => Err(DomainError::Internal(format!(
                "unknown commission status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawChannel {
    Wallet,
    External,
}

impl WithdrawChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawChannel::Wallet => "wallet",
            WithdrawChannel::External => "external",
        }
    }
}

impl FromStr for WithdrawChannel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet" => Ok(WithdrawChannel::Wallet),
            "external" => Ok(WithdrawChannel::External),
            other => Err(DomainError::InvalidInput(format!(
                "unknown withdraw channel '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawStatus {
    Pending,
    Paid,
    Rejected,
}

impl WithdrawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawStatus::Pending => "pending",
            WithdrawStatus::Paid => "paid",
            WithdrawStatus::Rejected => "rejected",
        }
    }
}

/// Commission owed on `base` at `rate` percent, rounded to cents.
pub fn commission_amount(base: &BigDecimal, rate_percent: &BigDecimal) -> BigDecimal {
    if base <= &BigDecimal::zero() || rate_percent <= &BigDecimal::zero() {
        return BigDecimal::zero();
    }
    round_money(&(base * rate_percent / BigDecimal::from(100)))
}

#[derive(Debug, Clone)]
pub struct CommissionView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub profile_id: Uuid,
    pub amount: BigDecimal,
    pub status: CommissionStatus,
    pub confirm_at: DateTime<Utc>,
    pub available_at: Option<DateTime<Utc>>,
    pub withdraw_request_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequestView {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub amount: BigDecimal,
    pub channel: String,
    pub status: String,
    pub commission_count: usize,
    pub created_at: DateTime<Utc>,
}
