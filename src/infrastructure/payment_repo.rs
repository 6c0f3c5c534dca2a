use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::payment::{CreatedPayment, PaymentStatus, PaymentView, ProviderType};
use crate::schema::{payments, wallet_recharges};

use super::models::{NewPaymentRow, NewWalletRechargeRow, PaymentRow, WalletRechargeRow};

impl PaymentRow {
    pub fn current_status(&self) -> Result<PaymentStatus, DomainError> {
        self.status.parse()
    }

    pub fn view(&self) -> Result<PaymentView, DomainError> {
        Ok(PaymentView {
            id: self.id,
            payment_no: self.payment_no.clone(),
            provider_type: self.provider_type.clone(),
            channel_type: self.channel_type.clone(),
            interaction_mode: self.interaction_mode.clone(),
            amount: self.amount.clone(),
            currency: self.currency.clone(),
            status: self.current_status()?,
            pay_url: self.pay_url.clone(),
            expires_at: self.expires_at,
        })
    }
}

pub fn insert(conn: &mut PgConnection, payment: &NewPaymentRow) -> Result<PaymentRow, DomainError> {
    let row = diesel::insert_into(payments::table)
        .values(payment)
        .returning(PaymentRow::as_returning())
        .get_result(conn)?;
    Ok(row)
}

/// Store what the gateway returned for a freshly created payment and move it
/// from `initiated` to `pending`.
pub fn attach_gateway_result(
    conn: &mut PgConnection,
    id: Uuid,
    created: &CreatedPayment,
) -> Result<Option<PaymentRow>, DomainError> {
    let row = diesel::update(
        payments::table
            .filter(payments::id.eq(id))
            .filter(payments::status.eq(PaymentStatus::Initiated.as_str())),
    )
    .set((
        payments::status.eq(PaymentStatus::Pending.as_str()),
        payments::interaction_mode.eq(created.interaction_mode.as_str()),
        payments::pay_url.eq(Some(created.pay_url.clone())),
        payments::provider_ref.eq(created.provider_ref.clone()),
        payments::updated_at.eq(Utc::now()),
    ))
    .returning(PaymentRow::as_returning())
    .get_result(conn)
    .optional()?;
    Ok(row)
}

pub fn find_by_no(conn: &mut PgConnection, payment_no: &str) -> Result<Option<PaymentRow>, DomainError> {
    let row = payments::table
        .filter(payments::payment_no.eq(payment_no))
        .select(PaymentRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn find_by_provider_ref(
    conn: &mut PgConnection,
    provider: ProviderType,
    provider_ref: &str,
) -> Result<Option<PaymentRow>, DomainError> {
    let row = payments::table
        .filter(payments::provider_type.eq(provider.as_str()))
        .filter(payments::provider_ref.eq(provider_ref))
        .select(PaymentRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

/// Compare-and-set the payment into `to`. `None` means another caller got
/// there first (or the payment was already terminal).
pub fn transition(
    conn: &mut PgConnection,
    id: Uuid,
    to: PaymentStatus,
    provider_ref: Option<&str>,
    raw: &Value,
    now: DateTime<Utc>,
) -> Result<Option<PaymentRow>, DomainError> {
    let paid_at = (to == PaymentStatus::Success).then_some(now);
    let row = diesel::update(
        payments::table
            .filter(payments::id.eq(id))
            .filter(payments::status.eq_any(PaymentStatus::open_statuses())),
    )
    .set((
        payments::status.eq(to.as_str()),
        payments::provider_payload.eq(Some(raw.clone())),
        payments::paid_at.eq(paid_at),
        payments::updated_at.eq(now),
    ))
    .returning(PaymentRow::as_returning())
    .get_result(conn)
    .optional()?;

    // Fill in the provider reference only where the gateway did not hand one out.
    if let (Some(row), Some(provider_ref)) = (&row, provider_ref) {
        if row.provider_ref.is_none() {
            diesel::update(payments::table.filter(payments::id.eq(row.id)))
                .set(payments::provider_ref.eq(Some(provider_ref)))
                .execute(conn)?;
        }
    }
    Ok(row)
}

pub fn has_success_for_order(conn: &mut PgConnection, order_id: Uuid) -> Result<bool, DomainError> {
    let found = payments::table
        .filter(payments::order_id.eq(order_id))
        .filter(payments::status.eq(PaymentStatus::Success.as_str()))
        .select(payments::id)
        .first::<Uuid>(conn)
        .optional()?;
    Ok(found.is_some())
}

/// Expire every still-open payment of `order_id`.
pub fn expire_open_for_order(
    conn: &mut PgConnection,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<usize, DomainError> {
    let expired = diesel::update(
        payments::table
            .filter(payments::order_id.eq(order_id))
            .filter(payments::status.eq_any(PaymentStatus::open_statuses())),
    )
    .set((
        payments::status.eq(PaymentStatus::Expired.as_str()),
        payments::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(expired)
}

/// Bulk-expire open payments whose window has passed.
pub fn expire_stale(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<usize, DomainError> {
    let expired = diesel::update(
        payments::table
            .filter(payments::status.eq_any(PaymentStatus::open_statuses()))
            .filter(payments::expires_at.lt(now)),
    )
    .set((
        payments::status.eq(PaymentStatus::Expired.as_str()),
        payments::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(expired)
}

pub fn payments_for_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<PaymentRow>, DomainError> {
    let rows = payments::table
        .filter(payments::order_id.eq(order_id))
        .order(payments::created_at.asc())
        .select(PaymentRow::as_select())
        .load(conn)?;
    Ok(rows)
}

// ── Wallet recharges ─────────────────────────────────────────────────────────

pub const RECHARGE_PENDING: &str = "pending";
pub const RECHARGE_PAID: &str = "paid";

pub fn insert_recharge(
    conn: &mut PgConnection,
    recharge: &NewWalletRechargeRow,
) -> Result<WalletRechargeRow, DomainError> {
    let row = diesel::insert_into(wallet_recharges::table)
        .values(recharge)
        .returning(WalletRechargeRow::as_returning())
        .get_result(conn)?;
    Ok(row)
}

pub fn lock_recharge(conn: &mut PgConnection, id: Uuid) -> Result<WalletRechargeRow, DomainError> {
    wallet_recharges::table
        .filter(wallet_recharges::id.eq(id))
        .select(WalletRechargeRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::NotFound(format!("Recharge {}", id)))
}

/// `pending -> paid`; false if the recharge was already settled.
pub fn mark_recharge_paid(
    conn: &mut PgConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, DomainError> {
    let updated = diesel::update(
        wallet_recharges::table
            .filter(wallet_recharges::id.eq(id))
            .filter(wallet_recharges::status.eq(RECHARGE_PENDING)),
    )
    .set((
        wallet_recharges::status.eq(RECHARGE_PAID),
        wallet_recharges::paid_at.eq(Some(now)),
    ))
    .execute(conn)?;
    Ok(updated > 0)
}
