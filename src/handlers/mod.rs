pub mod affiliates;
pub mod orders;
pub mod payments;
pub mod products;
pub mod wallet;

use std::str::FromStr;

use actix_web::web;
use bigdecimal::BigDecimal;
use utoipa::OpenApi;

use crate::errors::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        orders::create_order,
        orders::get_order,
        orders::guest_access,
        orders::cancel_order,
        orders::start_payment,
        orders::confirm_order,
        orders::deliver_order,
        orders::refund_order,
        orders::submit_form,
        payments::payment_callback,
        payments::get_payment,
        wallet::get_wallet,
        wallet::list_transactions,
        wallet::start_recharge,
        affiliates::list_commissions,
        affiliates::request_withdrawal,
        affiliates::settle_withdrawal,
        affiliates::reject_withdrawal,
        products::import_secrets,
        products::get_stock,
    ),
    tags(
        (name = "orders", description = "Checkout and order lifecycle"),
        (name = "payments", description = "Provider callbacks and payment lookup"),
        (name = "wallet", description = "Balances, ledger and recharges"),
        (name = "affiliates", description = "Commissions and withdrawals"),
        (name = "products", description = "Secret pool and stock levels"),
    )
)]
pub struct ApiDoc;

/// Money arrives as decimal strings to avoid floating-point issues.
pub(crate) fn parse_amount(raw: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(raw.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid amount '{}': {}", raw, e)))
}

/// Mount every route. Services are expected as `web::Data` app data.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(orders::create_order))
            .route("/{order_no}", web::get().to(orders::get_order))
            .route("/{order_no}/guest-access", web::post().to(orders::guest_access))
            .route("/{order_no}/cancel", web::post().to(orders::cancel_order))
            .route("/{order_no}/payments", web::post().to(orders::start_payment))
            .route("/{order_no}/confirm", web::post().to(orders::confirm_order))
            .route("/{order_no}/deliver", web::post().to(orders::deliver_order))
            .route("/{order_no}/refund", web::post().to(orders::refund_order))
            .route(
                "/{order_no}/items/{item_id}/form",
                web::post().to(orders::submit_form),
            ),
    )
    .service(
        web::scope("/payments")
            // Some epay aggregators notify with a GET query string.
            .route("/callback/{provider}", web::post().to(payments::payment_callback))
            .route("/callback/{provider}", web::get().to(payments::payment_callback))
            .route("/{payment_no}", web::get().to(payments::get_payment)),
    )
    .service(
        web::scope("/wallet")
            .route("/{user_id}", web::get().to(wallet::get_wallet))
            .route("/{user_id}/transactions", web::get().to(wallet::list_transactions))
            .route("/{user_id}/recharge", web::post().to(wallet::start_recharge)),
    )
    .service(
        web::scope("/affiliates")
            .route("/{profile_id}/commissions", web::get().to(affiliates::list_commissions))
            .route("/{profile_id}/withdrawals", web::post().to(affiliates::request_withdrawal)),
    )
    .service(
        web::scope("/withdrawals")
            .route("/{id}/settle", web::post().to(affiliates::settle_withdrawal))
            .route("/{id}/reject", web::post().to(affiliates::reject_withdrawal)),
    )
    .service(
        web::scope("/products")
            .route("/{product_id}/secrets", web::post().to(products::import_secrets))
            .route("/{product_id}/stock", web::get().to(products::get_stock)),
    );
}
