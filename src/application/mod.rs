pub mod affiliate_service;
pub mod checkout;
pub mod guest_access;
pub mod inventory;
pub mod order_lifecycle;
pub mod reconciliation;
pub mod settlement;
pub mod wallet_service;

use bigdecimal::BigDecimal;
use chrono::Duration;

use crate::config::AppConfig;

/// Business settings shared by the services.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub currency: String,
    pub order_ttl: Duration,
    pub payment_ttl: Duration,
    pub commission_confirm_days: i64,
    pub min_withdraw_amount: BigDecimal,
    pub notify_base_url: String,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        EngineSettings {
            currency: config.currency.clone(),
            order_ttl: Duration::minutes(config.order_ttl_minutes),
            payment_ttl: Duration::minutes(config.payment_ttl_minutes),
            commission_confirm_days: config.commission_confirm_days,
            min_withdraw_amount: config.min_withdraw_amount.clone(),
            notify_base_url: config.notify_base_url.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            currency: "CNY".to_string(),
            order_ttl: Duration::minutes(15),
            payment_ttl: Duration::minutes(15),
            commission_confirm_days: 7,
            min_withdraw_amount: BigDecimal::from(10),
            notify_base_url: "http://localhost:8080".to_string(),
        }
    }
}
