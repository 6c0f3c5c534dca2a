//! Aggregator gateways speaking the epay protocol: a signed redirect URL out,
//! a signed urlencoded callback back.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use hmac::digest::{CtOutput, Output};
use sha2::{Digest, Sha256};

use crate::domain::errors::DomainError;
use crate::domain::payment::{
    CreatePaymentRequest, CreatedPayment, InteractionMode, NormalizedEvent, PaymentStatus,
    ProviderType, RawCallback,
};
use crate::domain::ports::PaymentGateway;

const SIGN_TYPE: &str = "SHA256";

pub struct EpayGateway {
    gateway_url: String,
    merchant_id: String,
    secret: String,
    currency: String,
}

impl EpayGateway {
    pub fn new(gateway_url: String, merchant_id: String, secret: String, currency: String) -> Self {
        Self {
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            merchant_id,
            secret,
            currency,
        }
    }

    /// Hex SHA-256 over the non-empty params sorted by key, `sign` and
    /// `sign_type` excluded, with the merchant secret appended.
    fn sign(&self, params: &BTreeMap<String, String>) -> String {
        hex::encode(self.signature_digest(params))
    }

    fn signature_digest(&self, params: &BTreeMap<String, String>) -> Output<Sha256> {
        let joined = params
            .iter()
            .filter(|(k, v)| !v.is_empty() && k.as_str() != "sign" && k.as_str() != "sign_type")
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.secret.as_bytes());
        hasher.finalize()
    }

    /// Constant-time check of a hex signature in either case.
    fn signature_matches(&self, params: &BTreeMap<String, String>, received: &str) -> bool {
        match hex::decode(received) {
            Ok(bytes) if bytes.len() == <Sha256 as Digest>::output_size() => {
                CtOutput::<Sha256>::new(Output::<Sha256>::clone_from_slice(&bytes))
                    == CtOutput::new(self.signature_digest(params))
            }
            _ => false,
        }
    }

    fn parse_params(raw: &RawCallback) -> Result<BTreeMap<String, String>, DomainError> {
        // Providers notify by GET or by form POST.
        let source = if raw.query.is_empty() {
            std::str::from_utf8(&raw.body)
                .map_err(|_| DomainError::InvalidInput("callback body is not utf-8".into()))?
        } else {
            raw.query.as_str()
        };
        serde_urlencoded::from_str(source)
            .map_err(|e| DomainError::InvalidInput(format!("malformed epay callback: {}", e)))
    }
}

impl PaymentGateway for EpayGateway {
    fn provider(&self) -> ProviderType {
        ProviderType::Epay
    }

    fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreatedPayment, DomainError> {
        if request.currency != self.currency {
            return Err(DomainError::Gateway(format!(
                "epay settles in {}, not {}",
                self.currency, request.currency
            )));
        }
        let mut params = BTreeMap::new();
        params.insert("pid".to_string(), self.merchant_id.clone());
        params.insert("type".to_string(), request.channel.clone());
        params.insert("out_trade_no".to_string(), request.payment_no.clone());
        params.insert("notify_url".to_string(), request.notify_url.clone());
        params.insert("name".to_string(), request.subject.clone());
        params.insert("money".to_string(), request.amount.with_scale(2).to_string());
        let sign = self.sign(&params);
        params.insert("sign".to_string(), sign);
        params.insert("sign_type".to_string(), SIGN_TYPE.to_string());

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| DomainError::Gateway(format!("cannot encode epay request: {}", e)))?;
        Ok(CreatedPayment {
            interaction_mode: InteractionMode::Redirect,
            pay_url: format!("{}/submit.php?{}", self.gateway_url, query),
            provider_ref: None,
        })
    }

    fn verify_callback(&self, raw: &RawCallback) -> Result<NormalizedEvent, DomainError> {
        let params = Self::parse_params(raw)?;
        let received = params
            .get("sign")
            .ok_or_else(|| DomainError::InvalidInput("epay callback is unsigned".into()))?;
        if !self.signature_matches(&params, received) {
            return Err(DomainError::InvalidInput("epay callback signature mismatch".into()));
        }
        if params.get("pid") != Some(&self.merchant_id) {
            return Err(DomainError::InvalidInput("epay callback for another merchant".into()));
        }

        let amount: BigDecimal = params
            .get("money")
            .ok_or_else(|| DomainError::InvalidInput("epay callback without money".into()))?
            .parse()
            .map_err(|_| DomainError::InvalidInput("epay callback money is not a number".into()))?;
        let status = params
            .get("trade_status")
            .map(|s| self.to_payment_status(s))
            .unwrap_or(PaymentStatus::Pending);
        let raw_json = serde_json::to_value(&params)
            .map_err(|e| DomainError::Internal(e.to_string()))?;

        Ok(NormalizedEvent {
            payment_no: params.get("out_trade_no").cloned(),
            provider_ref: params.get("trade_no").cloned(),
            status,
            amount,
            currency: self.currency.clone(),
            raw: raw_json,
        })
    }

    fn to_payment_status(&self, provider_status: &str) -> PaymentStatus {
        match provider_status {
            "TRADE_SUCCESS" | "TRADE_FINISHED" => PaymentStatus::Success,
            "TRADE_CLOSED" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> EpayGateway {
        EpayGateway::new(
            "https://epay.example/".into(),
            "1001".into(),
            "s3cret".into(),
            "CNY".into(),
        )
    }

    fn signed_callback(gateway: &EpayGateway, status: &str, money: &str) -> RawCallback {
        let mut params = BTreeMap::new();
        params.insert("pid".to_string(), "1001".to_string());
        params.insert("trade_no".to_string(), "T2024".to_string());
        params.insert("out_trade_no".to_string(), "P123".to_string());
        params.insert("type".to_string(), "alipay".to_string());
        params.insert("money".to_string(), money.to_string());
        params.insert("trade_status".to_string(), status.to_string());
        let sign = gateway.sign(&params);
        params.insert("sign".to_string(), sign);
        params.insert("sign_type".to_string(), SIGN_TYPE.to_string());
        RawCallback {
            query: serde_urlencoded::to_string(&params).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn create_payment_builds_signed_redirect() {
        let gw = gateway();
        let created = gw
            .create_payment(&CreatePaymentRequest {
                payment_no: "P123".into(),
                subject: "Gift card".into(),
                amount: "10".parse().unwrap(),
                currency: "CNY".into(),
                channel: "alipay".into(),
                notify_url: "https://shop.example/payments/callback/epay".into(),
            })
            .unwrap();
        assert_eq!(created.interaction_mode, InteractionMode::Redirect);
        assert!(created.pay_url.starts_with("https://epay.example/submit.php?"));
        assert!(created.pay_url.contains("out_trade_no=P123"));
        assert!(created.pay_url.contains("money=10.00"));
        assert!(created.pay_url.contains("sign="));
    }

    #[test]
    fn verifies_and_normalizes_a_success_callback() {
        let gw = gateway();
        let event = gw.verify_callback(&signed_callback(&gw, "TRADE_SUCCESS", "10.00")).unwrap();
        assert_eq!(event.payment_no.as_deref(), Some("P123"));
        assert_eq!(event.provider_ref.as_deref(), Some("T2024"));
        assert_eq!(event.status, PaymentStatus::Success);
        assert_eq!(event.amount, "10.00".parse::<BigDecimal>().unwrap());
        assert_eq!(event.currency, "CNY");
    }

    #[test]
    fn accepts_form_body_callbacks() {
        let gw = gateway();
        let query = signed_callback(&gw, "TRADE_SUCCESS", "10.00").query;
        let raw = RawCallback {
            body: query.into_bytes(),
            ..Default::default()
        };
        assert!(gw.verify_callback(&raw).is_ok());
    }

    #[test]
    fn tampered_amount_fails_signature_check() {
        let gw = gateway();
        let mut raw = signed_callback(&gw, "TRADE_SUCCESS", "10.00");
        raw.query = raw.query.replace("money=10.00", "money=0.01");
        assert!(matches!(gw.verify_callback(&raw), Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn signature_is_hex_in_either_case() {
        let gw = gateway();
        let raw = signed_callback(&gw, "TRADE_SUCCESS", "10.00");
        let mut params: BTreeMap<String, String> = serde_urlencoded::from_str(&raw.query).unwrap();
        let sign = params["sign"].clone();

        params.insert("sign".to_string(), sign.to_uppercase());
        let upper = RawCallback {
            query: serde_urlencoded::to_string(&params).unwrap(),
            ..Default::default()
        };
        assert!(gw.verify_callback(&upper).is_ok());

        for forged in [&sign[..62], "zz", ""] {
            params.insert("sign".to_string(), forged.to_string());
            let raw = RawCallback {
                query: serde_urlencoded::to_string(&params).unwrap(),
                ..Default::default()
            };
            assert!(
                matches!(gw.verify_callback(&raw), Err(DomainError::InvalidInput(_))),
                "accepted sign '{}'",
                forged
            );
        }
    }

    #[test]
    fn maps_provider_statuses() {
        let gw = gateway();
        assert_eq!(gw.to_payment_status("TRADE_FINISHED"), PaymentStatus::Success);
        assert_eq!(gw.to_payment_status("TRADE_CLOSED"), PaymentStatus::Failed);
        assert_eq!(gw.to_payment_status("WAIT_BUYER_PAY"), PaymentStatus::Pending);
    }
}
