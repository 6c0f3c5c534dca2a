pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use application::affiliate_service::AffiliateService;
use application::checkout::Checkout;
use application::inventory::InventoryService;
use application::order_lifecycle::OrderLifecycle;
use application::reconciliation::ReconciliationProcessor;
use application::wallet_service::WalletService;
use application::EngineSettings;
use domain::errors::DomainError;
use infrastructure::gateways::GatewayRegistry;
use infrastructure::inventory_repo::DieselInventoryRepository;

pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), DomainError> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| DomainError::Internal(format!("Failed to run database migrations: {}", e)))?;
    Ok(())
}

/// The application services the HTTP layer dispatches to.
#[derive(Clone)]
pub struct Services {
    pub checkout: Checkout,
    pub lifecycle: OrderLifecycle,
    pub reconciliation: ReconciliationProcessor,
    pub wallet: WalletService,
    pub affiliates: AffiliateService,
    pub inventory: InventoryService<DieselInventoryRepository>,
}

impl Services {
    pub fn new(pool: DbPool, gateways: GatewayRegistry, settings: EngineSettings) -> Self {
        Services {
            checkout: Checkout::new(pool.clone(), settings.clone()),
            lifecycle: OrderLifecycle::new(pool.clone(), settings.clone()),
            reconciliation: ReconciliationProcessor::new(pool.clone(), gateways, settings.clone()),
            wallet: WalletService::new(pool.clone()),
            affiliates: AffiliateService::new(pool.clone(), settings),
            inventory: InventoryService::new(DieselInventoryRepository::new(pool)),
        }
    }

    /// Register the services as app data and mount the routes.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.checkout.clone()))
            .app_data(web::Data::new(self.lifecycle.clone()))
            .app_data(web::Data::new(self.reconciliation.clone()))
            .app_data(web::Data::new(self.wallet.clone()))
            .app_data(web::Data::new(self.affiliates.clone()))
            .app_data(web::Data::new(self.inventory.clone()))
            .configure(handlers::routes);
    }
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    services: Services,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let openapi = handlers::ApiDoc::openapi();
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(|cfg| services.configure(cfg))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
