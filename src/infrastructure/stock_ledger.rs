//! Manual stock counters on products and SKUs.
//!
//! Every operation is one conditional UPDATE whose WHERE clause carries the
//! whole precondition, so concurrent checkouts can never oversell: the
//! database serialises the row update and the loser matches zero rows.

use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{debug, warn};

use crate::domain::errors::DomainError;
use crate::domain::stock::{StockOutcome, StockTarget, UNLIMITED_STOCK};
use crate::schema::{product_skus, products};

/// Move `qty` units from `total` to `locked`.
pub fn reserve(
    conn: &mut PgConnection,
    target: StockTarget,
    qty: i32,
) -> Result<StockOutcome, DomainError> {
    if qty <= 0 {
        return Err(DomainError::InvalidInput(format!("quantity must be positive, got {}", qty)));
    }
    let now = Utc::now();
    let affected = match target {
        StockTarget::Product(id) => diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::deleted_at.is_null())
                .filter(products::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(products::manual_stock_total.ge(qty)),
        )
        .set((
            products::manual_stock_total.eq(products::manual_stock_total - qty),
            products::manual_stock_locked.eq(products::manual_stock_locked + qty),
            products::updated_at.eq(now),
        ))
        .execute(conn)?,
        StockTarget::Sku(id) => diesel::update(
            product_skus::table
                .filter(product_skus::id.eq(id))
                .filter(product_skus::deleted_at.is_null())
                .filter(product_skus::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(product_skus::manual_stock_total.ge(qty)),
        )
        .set((
            product_skus::manual_stock_total.eq(product_skus::manual_stock_total - qty),
            product_skus::manual_stock_locked.eq(product_skus::manual_stock_locked + qty),
            product_skus::updated_at.eq(now),
        ))
        .execute(conn)?,
    };
    outcome(conn, target, affected)
}

/// Return `qty` locked units to `total`.
pub fn release(
    conn: &mut PgConnection,
    target: StockTarget,
    qty: i32,
) -> Result<StockOutcome, DomainError> {
    if qty <= 0 {
        return Err(DomainError::InvalidInput(format!("quantity must be positive, got {}", qty)));
    }
    let now = Utc::now();
    let affected = match target {
        StockTarget::Product(id) => diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::deleted_at.is_null())
                .filter(products::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(products::manual_stock_locked.ge(qty)),
        )
        .set((
            products::manual_stock_total.eq(products::manual_stock_total + qty),
            products::manual_stock_locked.eq(products::manual_stock_locked - qty),
            products::updated_at.eq(now),
        ))
        .execute(conn)?,
        StockTarget::Sku(id) => diesel::update(
            product_skus::table
                .filter(product_skus::id.eq(id))
                .filter(product_skus::deleted_at.is_null())
                .filter(product_skus::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(product_skus::manual_stock_locked.ge(qty)),
        )
        .set((
            product_skus::manual_stock_total.eq(product_skus::manual_stock_total + qty),
            product_skus::manual_stock_locked.eq(product_skus::manual_stock_locked - qty),
            product_skus::updated_at.eq(now),
        ))
        .execute(conn)?,
    };
    outcome(conn, target, affected)
}

/// Turn `qty` locked units into sold units.
///
/// Orders created before reservations existed hold no lock; for those the
/// shortfall is taken from `total` instead.
pub fn consume(
    conn: &mut PgConnection,
    target: StockTarget,
    qty: i32,
) -> Result<StockOutcome, DomainError> {
    if qty <= 0 {
        return Err(DomainError::InvalidInput(format!("quantity must be positive, got {}", qty)));
    }
    let now = Utc::now();
    let affected = match target {
        StockTarget::Product(id) => diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::deleted_at.is_null())
                .filter(products::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(products::manual_stock_locked.ge(qty)),
        )
        .set((
            products::manual_stock_locked.eq(products::manual_stock_locked - qty),
            products::manual_stock_sold.eq(products::manual_stock_sold + qty),
            products::updated_at.eq(now),
        ))
        .execute(conn)?,
        StockTarget::Sku(id) => diesel::update(
            product_skus::table
                .filter(product_skus::id.eq(id))
                .filter(product_skus::deleted_at.is_null())
                .filter(product_skus::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(product_skus::manual_stock_locked.ge(qty)),
        )
        .set((
            product_skus::manual_stock_locked.eq(product_skus::manual_stock_locked - qty),
            product_skus::manual_stock_sold.eq(product_skus::manual_stock_sold + qty),
            product_skus::updated_at.eq(now),
        ))
        .execute(conn)?,
    };
    if affected > 0 {
        return Ok(StockOutcome::Applied);
    }
    if is_unlimited(conn, target)? {
        return Ok(StockOutcome::Unlimited);
    }

    // Fallback: drain whatever is locked and take the rest from total.
    let affected = match target {
        StockTarget::Product(id) => diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::deleted_at.is_null())
                .filter(products::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(products::manual_stock_locked.lt(qty))
                .filter((products::manual_stock_total + products::manual_stock_locked).ge(qty)),
        )
        .set((
            products::manual_stock_total
                .eq(products::manual_stock_total + products::manual_stock_locked - qty),
            products::manual_stock_locked.eq(0),
            products::manual_stock_sold.eq(products::manual_stock_sold + qty),
            products::updated_at.eq(now),
        ))
        .execute(conn)?,
        StockTarget::Sku(id) => diesel::update(
            product_skus::table
                .filter(product_skus::id.eq(id))
                .filter(product_skus::deleted_at.is_null())
                .filter(product_skus::manual_stock_total.ne(UNLIMITED_STOCK))
                .filter(product_skus::manual_stock_locked.lt(qty))
                .filter(
                    (product_skus::manual_stock_total + product_skus::manual_stock_locked).ge(qty),
                ),
        )
        .set((
            product_skus::manual_stock_total
                .eq(product_skus::manual_stock_total + product_skus::manual_stock_locked - qty),
            product_skus::manual_stock_locked.eq(0),
            product_skus::manual_stock_sold.eq(product_skus::manual_stock_sold + qty),
            product_skus::updated_at.eq(now),
        ))
        .execute(conn)?,
    };
    if affected > 0 {
        warn!(
            "Consumed {} units of {} without a matching reservation; took shortfall from total",
            qty, target
        );
        Ok(StockOutcome::Applied)
    } else {
        Ok(StockOutcome::Insufficient)
    }
}

/// Units still reservable, `None` when unlimited. Errors if the target is gone.
pub fn available(conn: &mut PgConnection, target: StockTarget) -> Result<Option<i32>, DomainError> {
    let total = current_total(conn, target)?
        .ok_or_else(|| DomainError::NotFound(target.to_string()))?;
    Ok(if total == UNLIMITED_STOCK { None } else { Some(total) })
}

fn outcome(
    conn: &mut PgConnection,
    target: StockTarget,
    affected: usize,
) -> Result<StockOutcome, DomainError> {
    if affected > 0 {
        return Ok(StockOutcome::Applied);
    }
    if is_unlimited(conn, target)? {
        debug!("{} is unlimited, stock untouched", target);
        return Ok(StockOutcome::Unlimited);
    }
    Ok(StockOutcome::Insufficient)
}

fn is_unlimited(conn: &mut PgConnection, target: StockTarget) -> Result<bool, DomainError> {
    Ok(current_total(conn, target)? == Some(UNLIMITED_STOCK))
}

fn current_total(conn: &mut PgConnection, target: StockTarget) -> Result<Option<i32>, DomainError> {
    let total = match target {
        StockTarget::Product(id) => products::table
            .filter(products::id.eq(id))
            .filter(products::deleted_at.is_null())
            .select(products::manual_stock_total)
            .first::<i32>(conn)
            .optional()?,
        StockTarget::Sku(id) => product_skus::table
            .filter(product_skus::id.eq(id))
            .filter(product_skus::deleted_at.is_null())
            .select(product_skus::manual_stock_total)
            .first::<i32>(conn)
            .optional()?,
    };
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use diesel::prelude::*;

    use super::*;
    use crate::domain::stock::StockCounters;
    use crate::infrastructure::test_support::{seed_product, seed_sku, setup_db};

    fn counters(conn: &mut PgConnection, target: StockTarget) -> StockCounters {
        let (total, locked, sold) = match target {
            StockTarget::Product(id) => products::table
                .filter(products::id.eq(id))
                .select((
                    products::manual_stock_total,
                    products::manual_stock_locked,
                    products::manual_stock_sold,
                ))
                .first::<(i32, i32, i32)>(conn)
                .expect("product counters"),
            StockTarget::Sku(id) => product_skus::table
                .filter(product_skus::id.eq(id))
                .select((
                    product_skus::manual_stock_total,
                    product_skus::manual_stock_locked,
                    product_skus::manual_stock_sold,
                ))
                .first::<(i32, i32, i32)>(conn)
                .expect("sku counters"),
        };
        StockCounters::new(total, locked, sold)
    }

    #[tokio::test]
    async fn reserve_then_consume_follows_counter_model() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", 5, "10.00");
        let target = StockTarget::Product(product);

        assert_eq!(reserve(&mut conn, target, 2).unwrap(), StockOutcome::Applied);
        assert_eq!(counters(&mut conn, target), StockCounters::new(3, 2, 0));

        assert_eq!(consume(&mut conn, target, 2).unwrap(), StockOutcome::Applied);
        assert_eq!(counters(&mut conn, target), StockCounters::new(3, 0, 2));
    }

    #[tokio::test]
    async fn release_restores_total() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", 5, "10.00");
        let sku = seed_sku(&mut conn, product, "BLUE", 4);
        let target = StockTarget::Sku(sku);

        reserve(&mut conn, target, 3).unwrap();
        assert_eq!(release(&mut conn, target, 3).unwrap(), StockOutcome::Applied);
        assert_eq!(counters(&mut conn, target), StockCounters::new(4, 0, 0));
        assert_eq!(release(&mut conn, target, 1).unwrap(), StockOutcome::Insufficient);
    }

    #[tokio::test]
    async fn reserve_fails_when_remaining_is_short() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", 1, "10.00");
        let target = StockTarget::Product(product);

        assert_eq!(reserve(&mut conn, target, 2).unwrap(), StockOutcome::Insufficient);
        assert_eq!(counters(&mut conn, target), StockCounters::new(1, 0, 0));
    }

    #[tokio::test]
    async fn unlimited_stock_is_never_written() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", UNLIMITED_STOCK, "10.00");
        let target = StockTarget::Product(product);

        assert_eq!(reserve(&mut conn, target, 1000).unwrap(), StockOutcome::Unlimited);
        assert_eq!(consume(&mut conn, target, 1000).unwrap(), StockOutcome::Unlimited);
        assert_eq!(release(&mut conn, target, 1000).unwrap(), StockOutcome::Unlimited);
        assert_eq!(counters(&mut conn, target), StockCounters::new(UNLIMITED_STOCK, 0, 0));
        assert_eq!(available(&mut conn, target).unwrap(), None);
    }

    #[tokio::test]
    async fn consume_without_reservation_takes_from_total() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", 4, "10.00");
        let target = StockTarget::Product(product);
        reserve(&mut conn, target, 1).unwrap();

        assert_eq!(consume(&mut conn, target, 3).unwrap(), StockOutcome::Applied);
        assert_eq!(counters(&mut conn, target), StockCounters::new(0, 0, 3));
        assert_eq!(consume(&mut conn, target, 1).unwrap(), StockOutcome::Insufficient);
    }

    #[tokio::test]
    async fn soft_deleted_product_cannot_be_reserved() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", 5, "10.00");
        diesel::update(products::table.filter(products::id.eq(product)))
            .set(products::deleted_at.eq(Some(Utc::now())))
            .execute(&mut conn)
            .unwrap();

        let target = StockTarget::Product(product);
        assert_eq!(reserve(&mut conn, target, 1).unwrap(), StockOutcome::Insufficient);
        assert!(matches!(available(&mut conn, target), Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_reservations_of_the_last_unit_have_one_winner() {
        let (_container, pool) = setup_db().await;
        let product = {
            let mut conn = pool.get().expect("conn");
            seed_product(&mut conn, "manual", 1, "10.00")
        };
        let target = StockTarget::Product(product);

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mut conn = pool.get().expect("conn");
                    barrier.wait();
                    reserve(&mut conn, target, 1).expect("reserve")
                })
            })
            .collect();
        let outcomes: Vec<StockOutcome> =
            handles.into_iter().map(|h| h.join().expect("thread")).collect();

        let winners = outcomes.iter().filter(|o| **o == StockOutcome::Applied).count();
        assert_eq!(winners, 1);
        let mut conn = pool.get().expect("conn");
        assert_eq!(counters(&mut conn, target), StockCounters::new(0, 1, 0));
    }
}
