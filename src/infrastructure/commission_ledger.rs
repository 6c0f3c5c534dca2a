//! Affiliate commissions: accrual on payment, maturation, and binding into
//! withdrawal requests.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::{debug, info};
use uuid::Uuid;

use crate::domain::commission::{
    commission_amount, CommissionStatus, CommissionView, WithdrawChannel, WithdrawStatus,
    ORDER_COMMISSION,
};
use crate::domain::errors::DomainError;
use crate::schema::{affiliate_commissions, affiliate_profiles, affiliate_withdraw_requests};

use super::models::{
    AffiliateCommissionRow, AffiliateProfileRow, NewAffiliateCommissionRow,
    NewWithdrawRequestRow, OrderRow, WithdrawRequestRow,
};

impl AffiliateCommissionRow {
    pub fn view(&self) -> Result<CommissionView, DomainError> {
        Ok(CommissionView {
            id: self.id,
            order_id: self.order_id,
            profile_id: self.profile_id,
            amount: self.amount.clone(),
            status: self.status.parse()?,
            confirm_at: self.confirm_at,
            available_at: self.available_at,
            withdraw_request_id: self.withdraw_request_id,
        })
    }
}

pub fn find_active_profile_by_code(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<AffiliateProfileRow>, DomainError> {
    let row = affiliate_profiles::table
        .filter(affiliate_profiles::code.eq(code))
        .filter(affiliate_profiles::is_active.eq(true))
        .select(AffiliateProfileRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn find_profile(conn: &mut PgConnection, id: Uuid) -> Result<AffiliateProfileRow, DomainError> {
    affiliate_profiles::table
        .filter(affiliate_profiles::id.eq(id))
        .select(AffiliateProfileRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::NotFound(format!("Affiliate profile {}", id)))
}

/// Accrue the commission for a paid order. Returns `None` when the order has
/// no affiliate, refers itself, earns nothing, or was already credited.
pub fn accrue_for_order(
    conn: &mut PgConnection,
    order: &OrderRow,
    paid_at: DateTime<Utc>,
    confirm_days: i64,
) -> Result<Option<AffiliateCommissionRow>, DomainError> {
    let Some(profile_id) = order.affiliate_profile_id else {
        return Ok(None);
    };
    let profile = find_profile(conn, profile_id)?;
    if !profile.is_active {
        return Ok(None);
    }
    if order.user_id == Some(profile.user_id) {
        debug!("Skipping self-referral commission on order {}", order.order_no);
        return Ok(None);
    }
    let amount = commission_amount(&order.total_amount, &profile.commission_rate);
    if amount <= BigDecimal::zero() {
        return Ok(None);
    }

    let row = diesel::insert_into(affiliate_commissions::table)
        .values(&NewAffiliateCommissionRow {
            id: Uuid::new_v4(),
            order_id: order.id,
            profile_id,
            commission_type: ORDER_COMMISSION.to_string(),
            base_amount: order.total_amount.clone(),
            rate: profile.commission_rate.clone(),
            amount,
            status: CommissionStatus::PendingConfirm.as_str().to_string(),
            confirm_at: paid_at + Duration::days(confirm_days),
        })
        .on_conflict((
            affiliate_commissions::order_id,
            affiliate_commissions::profile_id,
            affiliate_commissions::commission_type,
        ))
        .do_nothing()
        .returning(AffiliateCommissionRow::as_returning())
        .get_result(conn)
        .optional()?;
    Ok(row)
}

/// Move every matured, unbound `pending_confirm` commission to `available`.
pub fn mark_pending_available(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<usize, DomainError> {
    let matured = diesel::update(
        affiliate_commissions::table
            .filter(affiliate_commissions::status.eq(CommissionStatus::PendingConfirm.as_str()))
            .filter(affiliate_commissions::confirm_at.le(now))
            .filter(affiliate_commissions::withdraw_request_id.is_null()),
    )
    .set((
        affiliate_commissions::status.eq(CommissionStatus::Available.as_str()),
        affiliate_commissions::available_at.eq(Some(now)),
        affiliate_commissions::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(matured)
}

/// Reject commissions of a refunded order that have not been withdrawn.
pub fn reject_for_order(conn: &mut PgConnection, order_id: Uuid) -> Result<usize, DomainError> {
    let rejected = diesel::update(
        affiliate_commissions::table
            .filter(affiliate_commissions::order_id.eq(order_id))
            .filter(affiliate_commissions::withdraw_request_id.is_null())
            .filter(affiliate_commissions::status.eq_any([
                CommissionStatus::PendingConfirm.as_str(),
                CommissionStatus::Available.as_str(),
            ])),
    )
    .set((
        affiliate_commissions::status.eq(CommissionStatus::Rejected.as_str()),
        affiliate_commissions::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;
    Ok(rejected)
}

pub fn commissions_for_profile(
    conn: &mut PgConnection,
    profile_id: Uuid,
) -> Result<Vec<AffiliateCommissionRow>, DomainError> {
    let rows = affiliate_commissions::table
        .filter(affiliate_commissions::profile_id.eq(profile_id))
        .order(affiliate_commissions::created_at.asc())
        .select(AffiliateCommissionRow::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Bind every available, unbound commission of `profile_id` into a new
/// withdrawal request. The rows are locked first so two concurrent requests
/// can never claim the same commission.
pub fn bind_withdrawal(
    conn: &mut PgConnection,
    profile_id: Uuid,
    channel: WithdrawChannel,
    account: Option<String>,
    min_amount: &BigDecimal,
) -> Result<(WithdrawRequestRow, usize), DomainError> {
    let available: Vec<AffiliateCommissionRow> = affiliate_commissions::table
        .filter(affiliate_commissions::profile_id.eq(profile_id))
        .filter(affiliate_commissions::status.eq(CommissionStatus::Available.as_str()))
        .filter(affiliate_commissions::withdraw_request_id.is_null())
        .order(affiliate_commissions::created_at.asc())
        .select(AffiliateCommissionRow::as_select())
        .for_update()
        .load(conn)?;

    let total: BigDecimal = available.iter().map(|c| &c.amount).sum();
    if available.is_empty() || &total < min_amount {
        return Err(DomainError::InvalidInput(format!(
            "withdrawable amount {} is below the minimum {}",
            total, min_amount
        )));
    }

    let request = diesel::insert_into(affiliate_withdraw_requests::table)
        .values(&NewWithdrawRequestRow {
            id: Uuid::new_v4(),
            profile_id,
            amount: total,
            channel: channel.as_str().to_string(),
            account,
            status: WithdrawStatus::Pending.as_str().to_string(),
        })
        .returning(WithdrawRequestRow::as_returning())
        .get_result(conn)?;

    let ids: Vec<Uuid> = available.iter().map(|c| c.id).collect();
    let bound = diesel::update(
        affiliate_commissions::table
            .filter(affiliate_commissions::id.eq_any(&ids))
            .filter(affiliate_commissions::withdraw_request_id.is_null()),
    )
    .set((
        affiliate_commissions::status.eq(CommissionStatus::Withdrawn.as_str()),
        affiliate_commissions::withdraw_request_id.eq(Some(request.id)),
        affiliate_commissions::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;
    if bound != ids.len() {
        return Err(DomainError::Internal(format!(
            "bound {} of {} locked commissions",
            bound,
            ids.len()
        )));
    }
    info!(
        "Withdrawal {} for profile {} binds {} commissions totalling {}",
        request.id, profile_id, bound, request.amount
    );
    Ok((request, bound))
}

pub fn lock_withdrawal(conn: &mut PgConnection, id: Uuid) -> Result<WithdrawRequestRow, DomainError> {
    affiliate_withdraw_requests::table
        .filter(affiliate_withdraw_requests::id.eq(id))
        .select(WithdrawRequestRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::NotFound(format!("Withdrawal {}", id)))
}

/// `pending -> status`; false when the request was already processed.
pub fn close_withdrawal(
    conn: &mut PgConnection,
    id: Uuid,
    status: WithdrawStatus,
    now: DateTime<Utc>,
) -> Result<bool, DomainError> {
    let updated = diesel::update(
        affiliate_withdraw_requests::table
            .filter(affiliate_withdraw_requests::id.eq(id))
            .filter(affiliate_withdraw_requests::status.eq(WithdrawStatus::Pending.as_str())),
    )
    .set((
        affiliate_withdraw_requests::status.eq(status.as_str()),
        affiliate_withdraw_requests::processed_at.eq(Some(now)),
    ))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Commissions bound to a rejected withdrawal are rejected with it.
pub fn reject_bound(conn: &mut PgConnection, withdraw_request_id: Uuid) -> Result<usize, DomainError> {
    let rejected = diesel::update(
        affiliate_commissions::table
            .filter(affiliate_commissions::withdraw_request_id.eq(withdraw_request_id))
            .filter(affiliate_commissions::status.eq(CommissionStatus::Withdrawn.as_str())),
    )
    .set((
        affiliate_commissions::status.eq(CommissionStatus::Rejected.as_str()),
        affiliate_commissions::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;
    Ok(rejected)
}

pub fn bound_count(conn: &mut PgConnection, withdraw_request_id: Uuid) -> Result<i64, DomainError> {
    let n = affiliate_commissions::table
        .filter(affiliate_commissions::withdraw_request_id.eq(withdraw_request_id))
        .count()
        .get_result(conn)?;
    Ok(n)
}
