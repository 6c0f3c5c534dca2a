use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::affiliate_service::AffiliateService;
use crate::domain::commission::{CommissionView, WithdrawChannel, WithdrawRequestView};
use crate::errors::AppError;

#[derive(Debug, Serialize, ToSchema)]
pub struct CommissionResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: String,
    pub status: String,
    pub confirm_at: DateTime<Utc>,
    pub available_at: Option<DateTime<Utc>>,
    pub withdraw_request_id: Option<Uuid>,
}

impl From<CommissionView> for CommissionResponse {
    fn from(c: CommissionView) -> Self {
        CommissionResponse {
            id: c.id,
            order_id: c.order_id,
            amount: c.amount.to_string(),
            status: c.status.as_str().to_string(),
            confirm_at: c.confirm_at,
            available_at: c.available_at,
            withdraw_request_id: c.withdraw_request_id,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawBody {
    /// "wallet" or "external".
    pub channel: String,
    /// Payout account, required for external withdrawals.
    pub account: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawResponse {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub amount: String,
    pub channel: String,
    pub status: String,
    pub commission_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<WithdrawRequestView> for WithdrawResponse {
    fn from(w: WithdrawRequestView) -> Self {
        WithdrawResponse {
            id: w.id,
            profile_id: w.profile_id,
            amount: w.amount.to_string(),
            channel: w.channel,
            status: w.status,
            commission_count: w.commission_count,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawDecisionResponse {
    pub id: Uuid,
    /// False when the request had already been decided.
    pub changed: bool,
}

/// GET /affiliates/{profile_id}/commissions
#[utoipa::path(
    get,
    path = "/affiliates/{profile_id}/commissions",
    params(
        ("profile_id" = Uuid, Path, description = "Affiliate profile UUID"),
    ),
    responses(
        (status = 200, description = "All commissions of the profile", body = Vec<CommissionResponse>),
        (status = 404, description = "Profile not found"),
    ),
    tag = "affiliates"
)]
pub async fn list_commissions(
    affiliates: web::Data<AffiliateService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let profile_id = path.into_inner();

    let commissions = web::block(move || affiliates.commissions(profile_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<CommissionResponse> =
        commissions.into_iter().map(CommissionResponse::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// POST /affiliates/{profile_id}/withdrawals
///
/// Binds every available commission of the profile into one request.
#[utoipa::path(
    post,
    path = "/affiliates/{profile_id}/withdrawals",
    params(
        ("profile_id" = Uuid, Path, description = "Affiliate profile UUID"),
    ),
    request_body = WithdrawBody,
    responses(
        (status = 201, description = "Withdrawal requested", body = WithdrawResponse),
        (status = 400, description = "Nothing to withdraw, below minimum or missing account"),
        (status = 404, description = "Profile not found"),
    ),
    tag = "affiliates"
)]
pub async fn request_withdrawal(
    affiliates: web::Data<AffiliateService>,
    path: web::Path<Uuid>,
    body: web::Json<WithdrawBody>,
) -> Result<HttpResponse, AppError> {
    let profile_id = path.into_inner();
    let body = body.into_inner();
    let channel: WithdrawChannel = body.channel.parse()?;

    let request = web::block(move || affiliates.request_withdrawal(profile_id, channel, body.account))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(WithdrawResponse::from(request)))
}

/// POST /withdrawals/{id}/settle
///
/// Marks a pending withdrawal paid. Wallet-channel payouts credit the
/// affiliate's wallet.
#[utoipa::path(
    post,
    path = "/withdrawals/{id}/settle",
    params(
        ("id" = Uuid, Path, description = "Withdrawal request UUID"),
    ),
    responses(
        (status = 200, description = "Settled, or already decided", body = WithdrawDecisionResponse),
        (status = 404, description = "Withdrawal not found"),
    ),
    tag = "affiliates"
)]
pub async fn settle_withdrawal(
    affiliates: web::Data<AffiliateService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let changed = web::block(move || affiliates.settle_withdrawal(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(WithdrawDecisionResponse { id, changed }))
}

/// POST /withdrawals/{id}/reject
///
/// Rejects a pending withdrawal. Its commissions are rejected with it.
#[utoipa::path(
    post,
    path = "/withdrawals/{id}/reject",
    params(
        ("id" = Uuid, Path, description = "Withdrawal request UUID"),
    ),
    responses(
        (status = 200, description = "Rejected, or already decided", body = WithdrawDecisionResponse),
        (status = 404, description = "Withdrawal not found"),
    ),
    tag = "affiliates"
)]
pub async fn reject_withdrawal(
    affiliates: web::Data<AffiliateService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let changed = web::block(move || affiliates.reject_withdrawal(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(WithdrawDecisionResponse { id, changed }))
}
