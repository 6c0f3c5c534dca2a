//! Crypto-settlement gateways: a hosted invoice page out, an HMAC-SHA256
//! signed JSON notification back.

use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::domain::errors::DomainError;
use crate::domain::payment::{
    CreatePaymentRequest, CreatedPayment, InteractionMode, NormalizedEvent, PaymentStatus,
    ProviderType, RawCallback,
};
use crate::domain::ports::PaymentGateway;

pub const SIGNATURE_HEADER: &str = "x-signature";

pub struct CryptoGateway {
    gateway_url: String,
    secret: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct Notification {
    order_id: String,
    #[serde(default)]
    invoice_id: Option<String>,
    status: String,
    amount: String,
    currency: String,
}

impl CryptoGateway {
    pub fn new(gateway_url: String, secret: String, currency: String) -> Self {
        Self {
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            secret,
            currency,
        }
    }

    fn mac(&self) -> Result<Hmac<Sha256>, DomainError> {
        Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|_| DomainError::Internal("crypto gateway HMAC key error".into()))
    }

    pub fn signature(&self, body: &[u8]) -> Result<String, DomainError> {
        let mut mac = self.mac()?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl PaymentGateway for CryptoGateway {
    fn provider(&self) -> ProviderType {
        ProviderType::Crypto
    }

    fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreatedPayment, DomainError> {
        Ok(CreatedPayment {
            interaction_mode: InteractionMode::Qr,
            pay_url: format!(
                "{}/invoice/{}?amount={}&currency={}",
                self.gateway_url,
                request.payment_no,
                request.amount.with_scale(2),
                request.currency
            ),
            provider_ref: None,
        })
    }

    fn verify_callback(&self, raw: &RawCallback) -> Result<NormalizedEvent, DomainError> {
        let signature = raw
            .headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| DomainError::InvalidInput("crypto callback is unsigned".into()))?;
        let sig_bytes = hex::decode(signature)
            .map_err(|_| DomainError::InvalidInput("invalid signature hex".into()))?;
        let mut mac = self.mac()?;
        mac.update(&raw.body);
        mac.verify_slice(&sig_bytes)
            .map_err(|_| DomainError::InvalidInput("crypto callback signature mismatch".into()))?;

        let notification: Notification = serde_json::from_slice(&raw.body)
            .map_err(|e| DomainError::InvalidInput(format!("malformed crypto callback: {}", e)))?;
        let amount: BigDecimal = notification
            .amount
            .parse()
            .map_err(|_| DomainError::InvalidInput("crypto callback amount is not a number".into()))?;
        let raw_json = serde_json::from_slice(&raw.body)
            .map_err(|e| DomainError::InvalidInput(e.to_string()))?;

        Ok(NormalizedEvent {
            payment_no: Some(notification.order_id),
            provider_ref: notification.invoice_id,
            status: self.to_payment_status(&notification.status),
            amount,
            currency: notification.currency,
            raw: raw_json,
        })
    }

    fn to_payment_status(&self, provider_status: &str) -> PaymentStatus {
        match provider_status {
            "paid" | "confirmed" | "completed" => PaymentStatus::Success,
            "expired" => PaymentStatus::Expired,
            "invalid" | "failed" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }

    fn callback_ack(&self) -> &'static str {
        "ok"
    }
}
