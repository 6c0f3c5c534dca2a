use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Success,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success | PaymentStatus::Failed | PaymentStatus::Expired
        )
    }

    /// Statuses a payment may be moved out of.
    pub fn open_statuses() -> [&'static str; 2] {
        [PaymentStatus::Initiated.as_str(), PaymentStatus::Pending.as_str()]
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(PaymentStatus::Initiated),
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(DomainError::Internal(format!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// Payment provider families. Selects the gateway adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Official redirect/QR gateways.
    Official,
    /// Aggregator gateways speaking the epay protocol.
    Epay,
    Paypal,
    Stripe,
    /// Crypto-settlement gateways.
    Crypto,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Official => "official",
            ProviderType::Epay => "epay",
            ProviderType::Paypal => "paypal",
            ProviderType::Stripe => "stripe",
            ProviderType::Crypto => "crypto",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "official" => Ok(ProviderType::Official),
            "epay" => Ok(ProviderType::Epay),
            "paypal" => Ok(ProviderType::Paypal),
            "stripe" => Ok(ProviderType::Stripe),
            "crypto" => Ok(ProviderType::Crypto),
            other => Err(DomainError::InvalidInput(format!(
                "unknown payment provider '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    Redirect,
    Qr,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::Redirect => "redirect",
            InteractionMode::Qr => "qr",
        }
    }
}

/// What a payment settles: a storefront order or a wallet recharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTarget {
    Order(Uuid),
    Recharge(Uuid),
}

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub payment_no: String,
    pub subject: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub channel: String,
    pub notify_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPayment {
    pub interaction_mode: InteractionMode,
    /// Redirect URL or QR payload, depending on `interaction_mode`.
    pub pay_url: String,
    pub provider_ref: Option<String>,
}

/// Callback exactly as received, before any provider-specific parsing.
#[derive(Debug, Clone, Default)]
pub struct RawCallback {
    pub headers: HashMap<String, String>,
    pub query: String,
    pub body: Vec<u8>,
}

/// Provider-independent view of a payment outcome signal.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// Our `payment_no`, echoed back by the provider.
    pub payment_no: Option<String>,
    pub provider_ref: Option<String>,
    pub status: PaymentStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub raw: serde_json::Value,
}

/// What reconciling one provider signal did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This call moved the payment to `status`.
    Applied {
        payment_no: String,
        status: PaymentStatus,
    },
    /// Payment was already terminal or another caller won the race.
    AlreadyProcessed { payment_no: String },
    /// Provider reports the payment still in flight.
    StillPending { payment_no: String },
}

#[derive(Debug, Clone)]
pub struct PaymentView {
    pub id: Uuid,
    pub payment_no: String,
    pub provider_type: String,
    pub channel_type: String,
    pub interaction_mode: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub pay_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_failed_expired_are_terminal() {
        assert!(!PaymentStatus::Initiated.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
    }

    #[test]
    fn provider_type_parses_wire_names() {
        assert_eq!("epay".parse::<ProviderType>().unwrap(), ProviderType::Epay);
        assert_eq!("crypto".parse::<ProviderType>().unwrap(), ProviderType::Crypto);
        assert!(matches!(
            "bitpay".parse::<ProviderType>(),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn payment_status_round_trips() {
        for status in [
            PaymentStatus::Initiated,
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
    }
}
