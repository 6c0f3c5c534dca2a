use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::debug;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::round_money;
use crate::schema::coupons;

use super::models::CouponRow;

const UNLIMITED_USES: i32 = -1;

impl CouponRow {
    /// Discount this coupon grants on `base`, never more than `base`.
    pub fn discount_for(&self, base: &BigDecimal) -> BigDecimal {
        let raw = match self.discount_type.as_str() {
            "percent" => round_money(&(base * &self.discount_value / BigDecimal::from(100))),
            _ => self.discount_value.clone(),
        };
        if raw < BigDecimal::zero() {
            BigDecimal::zero()
        } else if &raw > base {
            base.clone()
        } else {
            raw
        }
    }

    fn usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |starts| starts <= now)
            && self.ends_at.map_or(true, |ends| ends > now)
    }
}

/// Take one use of coupon `code` for an order worth `base`.
///
/// The usage limit is enforced by a conditional increment so concurrent
/// checkouts cannot over-claim the last use.
pub fn claim(
    conn: &mut PgConnection,
    code: &str,
    base: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<CouponRow, DomainError> {
    let coupon = coupons::table
        .filter(coupons::code.eq(code))
        .select(CouponRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::CouponUnavailable(code.to_string()))?;

    if !coupon.usable_at(now) {
        return Err(DomainError::CouponUnavailable(format!("{} is not active", code)));
    }
    if base < &coupon.min_order_amount {
        return Err(DomainError::CouponUnavailable(format!(
            "{} requires a minimum order of {}",
            code, coupon.min_order_amount
        )));
    }

    let claimed = diesel::update(
        coupons::table.filter(coupons::id.eq(coupon.id)).filter(
            coupons::usage_limit
                .eq(UNLIMITED_USES)
                .or(coupons::used_count.lt(coupons::usage_limit)),
        ),
    )
    .set(coupons::used_count.eq(coupons::used_count + 1))
    .execute(conn)?;
    if claimed == 0 {
        return Err(DomainError::CouponUnavailable(format!("{} is used up", code)));
    }
    debug!("Claimed one use of coupon {}", code);
    Ok(coupon)
}

/// Give back a use taken by a canceled or expired order.
pub fn release(conn: &mut PgConnection, coupon_id: Uuid) -> Result<bool, DomainError> {
    let released = diesel::update(
        coupons::table
            .filter(coupons::id.eq(coupon_id))
            .filter(coupons::used_count.gt(0)),
    )
    .set(coupons::used_count.eq(coupons::used_count - 1))
    .execute(conn)?;
    Ok(released > 0)
}
