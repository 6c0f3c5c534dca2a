//! Pool of pre-loaded card secrets for auto-fulfilled products.

use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{debug, info};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::secret::{normalize_secret_batch, SecretStatus};
use crate::schema::card_secrets;

use super::models::{CardSecretRow, NewCardSecretRow};

/// Reserve `qty` available secrets for `order_id`.
///
/// Candidates are picked with `FOR UPDATE SKIP LOCKED` so two checkouts never
/// queue on the same rows, then flipped in one UPDATE guarded by
/// `status = 'available'`. Anything short of `qty` rows is an error and the
/// caller's transaction rolls back.
pub fn allocate(
    conn: &mut PgConnection,
    product_id: Uuid,
    sku_id: Option<Uuid>,
    qty: i32,
    order_id: Uuid,
) -> Result<Vec<Uuid>, DomainError> {
    if qty <= 0 {
        return Err(DomainError::InvalidInput(format!("quantity must be positive, got {}", qty)));
    }
    let candidates: Vec<Uuid> = card_secrets::table
        .filter(card_secrets::product_id.eq(product_id))
        .filter(card_secrets::sku_id.is_not_distinct_from(sku_id))
        .filter(card_secrets::status.eq(SecretStatus::Available.as_str()))
        .order(card_secrets::created_at.asc())
        .limit(i64::from(qty))
        .select(card_secrets::id)
        .for_update()
        .skip_locked()
        .load(conn)?;

    if candidates.len() < qty as usize {
        return Err(DomainError::InsufficientStock(format!(
            "product {} secrets ({} of {} available)",
            product_id,
            candidates.len(),
            qty
        )));
    }

    let affected = diesel::update(
        card_secrets::table
            .filter(card_secrets::id.eq_any(&candidates))
            .filter(card_secrets::status.eq(SecretStatus::Available.as_str())),
    )
    .set((
        card_secrets::status.eq(SecretStatus::Reserved.as_str()),
        card_secrets::order_id.eq(Some(order_id)),
        card_secrets::reserved_at.eq(Some(Utc::now())),
    ))
    .execute(conn)?;

    if affected != candidates.len() {
        return Err(DomainError::InsufficientStock(format!(
            "product {} secrets (lost {} to a concurrent checkout)",
            product_id,
            candidates.len() - affected
        )));
    }
    debug!("Reserved {} secrets of product {} for order {}", affected, product_id, order_id);
    Ok(candidates)
}

/// Put every secret still reserved by `order_id` back into the pool.
pub fn release(conn: &mut PgConnection, order_id: Uuid) -> Result<usize, DomainError> {
    let released = diesel::update(
        card_secrets::table
            .filter(card_secrets::order_id.eq(order_id))
            .filter(card_secrets::status.eq(SecretStatus::Reserved.as_str())),
    )
    .set((
        card_secrets::status.eq(SecretStatus::Available.as_str()),
        card_secrets::order_id.eq(None::<Uuid>),
        card_secrets::reserved_at.eq(None::<chrono::DateTime<Utc>>),
    ))
    .execute(conn)?;
    Ok(released)
}

/// Finalise `ids` as used by `order_id`. Rows owned by another order, or
/// already used, are left alone and not counted.
pub fn mark_used(conn: &mut PgConnection, ids: &[Uuid], order_id: Uuid) -> Result<usize, DomainError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let used = diesel::update(
        card_secrets::table
            .filter(card_secrets::id.eq_any(ids))
            .filter(
                card_secrets::order_id
                    .eq(order_id)
                    .or(card_secrets::order_id.is_null()),
            )
            .filter(card_secrets::status.eq_any([
                SecretStatus::Available.as_str(),
                SecretStatus::Reserved.as_str(),
            ])),
    )
    .set((
        card_secrets::status.eq(SecretStatus::Used.as_str()),
        card_secrets::order_id.eq(Some(order_id)),
        card_secrets::used_at.eq(Some(Utc::now())),
    ))
    .execute(conn)?;
    Ok(used)
}

/// Secrets currently reserved by `order_id`, oldest first.
pub fn reserved_for(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<CardSecretRow>, DomainError> {
    let rows = card_secrets::table
        .filter(card_secrets::order_id.eq(order_id))
        .filter(card_secrets::status.eq(SecretStatus::Reserved.as_str()))
        .order(card_secrets::reserved_at.asc())
        .select(CardSecretRow::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Load a batch of secrets. Blank lines and duplicates (within the batch or
/// against the pool) are skipped; returns how many rows were inserted.
pub fn import<I, S>(
    conn: &mut PgConnection,
    product_id: Uuid,
    sku_id: Option<Uuid>,
    raw: I,
) -> Result<usize, DomainError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let batch: Vec<NewCardSecretRow> = normalize_secret_batch(raw)
        .into_iter()
        .map(|secret| NewCardSecretRow {
            id: Uuid::new_v4(),
            product_id,
            sku_id,
            secret,
            status: SecretStatus::Available.as_str().to_string(),
        })
        .collect();
    if batch.is_empty() {
        return Ok(0);
    }
    let inserted = diesel::insert_into(card_secrets::table)
        .values(&batch)
        .on_conflict_do_nothing()
        .execute(conn)?;
    info!(
        "Imported {} of {} secrets for product {}",
        inserted,
        batch.len(),
        product_id
    );
    Ok(inserted)
}

pub fn count_available(
    conn: &mut PgConnection,
    product_id: Uuid,
    sku_id: Option<Uuid>,
) -> Result<i64, DomainError> {
    let n = card_secrets::table
        .filter(card_secrets::product_id.eq(product_id))
        .filter(card_secrets::sku_id.is_not_distinct_from(sku_id))
        .filter(card_secrets::status.eq(SecretStatus::Available.as_str()))
        .select(count_star())
        .first(conn)?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use diesel::Connection;

    use super::*;
    use crate::infrastructure::test_support::{seed_product, seed_sku, setup_db};

    #[tokio::test]
    async fn import_is_idempotent() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "auto", 0, "5.00");

        assert_eq!(import(&mut conn, product, None, ["A", "B", " B ", ""]).unwrap(), 2);
        assert_eq!(import(&mut conn, product, None, ["B", "C"]).unwrap(), 1);
        assert_eq!(count_available(&mut conn, product, None).unwrap(), 3);
    }

    #[tokio::test]
    async fn product_and_sku_pools_are_separate() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "auto", 0, "5.00");
        let sku = seed_sku(&mut conn, product, "EU", 0);

        import(&mut conn, product, None, ["P1"]).unwrap();
        import(&mut conn, product, Some(sku), ["S1", "S2"]).unwrap();

        assert_eq!(count_available(&mut conn, product, None).unwrap(), 1);
        assert_eq!(count_available(&mut conn, product, Some(sku)).unwrap(), 2);
    }

    #[tokio::test]
    async fn allocate_release_and_mark_used() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "auto", 0, "5.00");
        import(&mut conn, product, None, ["A", "B", "C"]).unwrap();
        let order_a = Uuid::new_v4();
        let order_b = Uuid::new_v4();

        let ids = allocate(&mut conn, product, None, 2, order_a).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(count_available(&mut conn, product, None).unwrap(), 1);

        // Another order cannot finalise secrets it does not own.
        assert_eq!(mark_used(&mut conn, &ids, order_b).unwrap(), 0);

        assert_eq!(release(&mut conn, order_a).unwrap(), 2);
        assert_eq!(count_available(&mut conn, product, None).unwrap(), 3);

        let ids = allocate(&mut conn, product, None, 3, order_b).unwrap();
        assert_eq!(mark_used(&mut conn, &ids, order_b).unwrap(), 3);
        assert_eq!(release(&mut conn, order_b).unwrap(), 0);
    }

    #[tokio::test]
    async fn allocate_more_than_available_fails_and_rolls_back() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "auto", 0, "5.00");
        import(&mut conn, product, None, ["A"]).unwrap();

        let result = conn.transaction::<_, DomainError, _>(|conn| {
            allocate(conn, product, None, 2, Uuid::new_v4())
        });
        assert!(matches!(result, Err(DomainError::InsufficientStock(_))));
        assert_eq!(count_available(&mut conn, product, None).unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_allocations_never_share_a_secret() {
        let (_container, pool) = setup_db().await;
        let product = {
            let mut conn = pool.get().expect("conn");
            let product = seed_product(&mut conn, "auto", 0, "5.00");
            let secrets: Vec<String> = (0..10).map(|i| format!("CODE-{}", i)).collect();
            import(&mut conn, product, None, &secrets).unwrap();
            product
        };

        let barrier = Arc::new(Barrier::new(6));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mut conn = pool.get().expect("conn");
                    barrier.wait();
                    conn.transaction::<_, DomainError, _>(|conn| {
                        allocate(conn, product, None, 2, Uuid::new_v4())
                    })
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut winners = 0;
        for handle in handles {
            if let Ok(ids) = handle.join().expect("thread") {
                winners += 1;
                for id in ids {
                    assert!(seen.insert(id), "secret {} handed out twice", id);
                }
            }
        }
        // SKIP LOCKED can starve a late checkout of a full batch, never double-issue.
        assert!(winners >= 1 && winners <= 5);
        assert_eq!(seen.len(), winners * 2);
    }
}
