use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::application::reconciliation::ReconciliationProcessor;
use crate::application::wallet_service::{WalletService, DEFAULT_PAGE_SIZE};
use crate::domain::payment::ProviderType;
use crate::domain::wallet::{WalletSummary, WalletTransactionView};
use crate::errors::AppError;

use super::parse_amount;
use super::payments::PaymentResponse;

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletTransactionResponse {
    pub id: Uuid,
    pub txn_type: String,
    /// Signed: credits positive, debits negative.
    pub amount: String,
    pub balance_before: String,
    pub balance_after: String,
    pub reference: String,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransactionView> for WalletTransactionResponse {
    fn from(t: WalletTransactionView) -> Self {
        WalletTransactionResponse {
            id: t.id,
            txn_type: t.txn_type,
            amount: t.amount.to_string(),
            balance_before: t.balance_before.to_string(),
            balance_after: t.balance_after.to_string(),
            reference: t.reference,
            order_id: t.order_id,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletResponse {
    pub user_id: Uuid,
    pub balance: String,
    pub transactions: Vec<WalletTransactionResponse>,
}

impl From<WalletSummary> for WalletResponse {
    fn from(s: WalletSummary) -> Self {
        WalletResponse {
            user_id: s.user_id,
            balance: s.balance.to_string(),
            transactions: s
                .transactions
                .into_iter()
                .map(WalletTransactionResponse::from)
                .collect(),
        }
    }
}

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionsParams {
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RechargeRequest {
    /// Decimal string, e.g. "50.00".
    pub amount: String,
    pub provider: String,
    pub channel: String,
}

/// GET /wallet/{user_id}
///
/// Balance plus the most recent movements.
#[utoipa::path(
    get,
    path = "/wallet/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User UUID"),
    ),
    responses(
        (status = 200, description = "Wallet summary; unknown users read as empty", body = WalletResponse),
    ),
    tag = "wallet"
)]
pub async fn get_wallet(
    wallet: web::Data<WalletService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();

    let summary = web::block(move || wallet.summary(user_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(WalletResponse::from(summary)))
}

/// GET /wallet/{user_id}/transactions
#[utoipa::path(
    get,
    path = "/wallet/{user_id}/transactions",
    params(
        ("user_id" = Uuid, Path, description = "User UUID"),
        TransactionsParams,
    ),
    responses(
        (status = 200, description = "One page of movements, newest first", body = Vec<WalletTransactionResponse>),
        (status = 400, description = "Bad paging parameters"),
    ),
    tag = "wallet"
)]
pub async fn list_transactions(
    wallet: web::Data<WalletService>,
    path: web::Path<Uuid>,
    params: web::Query<TransactionsParams>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let TransactionsParams { page, limit } = params.into_inner();

    let page_items = web::block(move || wallet.transactions(user_id, page, limit))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<WalletTransactionResponse> = page_items
        .into_iter()
        .map(WalletTransactionResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

/// POST /wallet/{user_id}/recharge
///
/// Opens a payment whose success credits the wallet.
#[utoipa::path(
    post,
    path = "/wallet/{user_id}/recharge",
    params(
        ("user_id" = Uuid, Path, description = "User UUID"),
    ),
    request_body = RechargeRequest,
    responses(
        (status = 201, description = "Recharge payment opened", body = PaymentResponse),
        (status = 400, description = "Bad amount or unconfigured provider"),
        (status = 502, description = "Provider call failed"),
    ),
    tag = "wallet"
)]
pub async fn start_recharge(
    processor: web::Data<ReconciliationProcessor>,
    path: web::Path<Uuid>,
    body: web::Json<RechargeRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let body = body.into_inner();
    let amount = parse_amount(&body.amount)?;
    let provider: ProviderType = body.provider.parse()?;

    let payment = web::block(move || {
        processor.start_recharge(user_id, amount, provider, &body.channel)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(PaymentResponse::from(payment)))
}
