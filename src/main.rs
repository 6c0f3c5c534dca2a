use std::io;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use fulfillment_engine::application::order_lifecycle::OrderLifecycle;
use fulfillment_engine::application::settlement::SettlementScheduler;
use fulfillment_engine::application::EngineSettings;
use fulfillment_engine::config::AppConfig;
use fulfillment_engine::infrastructure::gateways::crypto::CryptoGateway;
use fulfillment_engine::infrastructure::gateways::epay::EpayGateway;
use fulfillment_engine::infrastructure::gateways::GatewayRegistry;
use fulfillment_engine::{build_server, create_pool, run_migrations, Services};

fn gateways(config: &AppConfig) -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    if let Some(epay) = &config.epay {
        registry = registry.register(Arc::new(EpayGateway::new(
            epay.gateway_url.clone(),
            epay.merchant_id.clone(),
            epay.secret.clone(),
            config.currency.clone(),
        )));
    }
    if let Some(crypto) = &config.crypto {
        registry = registry.register(Arc::new(CryptoGateway::new(
            crypto.gateway_url.clone(),
            crypto.secret.clone(),
            config.currency.clone(),
        )));
    }
    registry
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let pool = create_pool(&config.database_url).map_err(io::Error::other)?;
    run_migrations(&pool).map_err(io::Error::other)?;

    let settings = EngineSettings::from(&config);
    let registry = gateways(&config);
    if registry.providers().is_empty() {
        log::warn!("No payment provider configured; online payments are disabled");
    } else {
        log::info!("Payment providers: {:?}", registry.providers());
    }

    SettlementScheduler::new(
        pool.clone(),
        OrderLifecycle::new(pool.clone(), settings.clone()),
        config.sweep_batch_size,
        Duration::from_secs(config.sweep_interval_secs),
    )
    .spawn();

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    build_server(Services::new(pool, registry, settings), &config.host, config.port)?.await
}
