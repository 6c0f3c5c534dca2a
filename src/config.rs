use std::env;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable '{0}'")]
    Missing(&'static str),
    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct EpayConfig {
    pub gateway_url: String,
    pub merchant_id: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct CryptoConfig {
    pub gateway_url: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub currency: String,
    /// How long a pending order holds its stock.
    pub order_ttl_minutes: i64,
    pub payment_ttl_minutes: i64,
    pub commission_confirm_days: i64,
    pub min_withdraw_amount: BigDecimal,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: i64,
    /// Public base URL providers post callbacks to.
    pub notify_base_url: String,
    pub epay: Option<EpayConfig>,
    pub crypto: Option<CryptoConfig>,
}

impl AppConfig {
    /// Read configuration from the process environment (after `.env`, if any,
    /// has been loaded by the caller).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(get("PORT"), "PORT", 8080)?;

        let notify_base_url = get("NOTIFY_BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        let epay = match (get("EPAY_GATEWAY_URL"), get("EPAY_MERCHANT_ID"), get("EPAY_SECRET")) {
            (Some(gateway_url), Some(merchant_id), Some(secret)) => Some(EpayConfig {
                gateway_url,
                merchant_id,
                secret,
            }),
            _ => None,
        };
        let crypto = match (get("CRYPTO_GATEWAY_URL"), get("CRYPTO_SECRET")) {
            (Some(gateway_url), Some(secret)) => Some(CryptoConfig { gateway_url, secret }),
            _ => None,
        };

        let config = AppConfig {
            database_url,
            host,
            port,
            currency: get("CURRENCY").unwrap_or_else(|| "CNY".to_string()),
            order_ttl_minutes: parse_or(get("ORDER_TTL_MINUTES"), "ORDER_TTL_MINUTES", 15)?,
            payment_ttl_minutes: parse_or(get("PAYMENT_TTL_MINUTES"), "PAYMENT_TTL_MINUTES", 15)?,
            commission_confirm_days: parse_or(
                get("COMMISSION_CONFIRM_DAYS"),
                "COMMISSION_CONFIRM_DAYS",
                7,
            )?,
            min_withdraw_amount: parse_or(
                get("MIN_WITHDRAW_AMOUNT"),
                "MIN_WITHDRAW_AMOUNT",
                BigDecimal::from(10),
            )?,
            sweep_interval_secs: parse_or(get("SWEEP_INTERVAL_SECS"), "SWEEP_INTERVAL_SECS", 60)?,
            sweep_batch_size: parse_or(get("SWEEP_BATCH_SIZE"), "SWEEP_BATCH_SIZE", 100)?,
            notify_base_url,
            epay,
            crypto,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("ORDER_TTL_MINUTES", self.order_ttl_minutes),
            ("PAYMENT_TTL_MINUTES", self.payment_ttl_minutes),
            ("SWEEP_BATCH_SIZE", self.sweep_batch_size),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: format!("must be positive, got {}", value),
                });
            }
        }
        if self.commission_confirm_days < 0 {
            return Err(ConfigError::Invalid {
                name: "COMMISSION_CONFIRM_DAYS",
                reason: "must not be negative".into(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_INTERVAL_SECS",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}
