use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::debug;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::wallet::{WalletPosting, WalletTransactionView, WalletTxnType};
use crate::schema::{wallet_accounts, wallet_transactions};

use super::models::{NewWalletTransactionRow, WalletAccountRow, WalletTransactionRow};

impl From<WalletTransactionRow> for WalletTransactionView {
    fn from(row: WalletTransactionRow) -> Self {
        WalletTransactionView {
            id: row.id,
            user_id: row.user_id,
            txn_type: row.txn_type,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            reference: row.reference,
            order_id: row.order_id,
            created_at: row.created_at,
        }
    }
}

/// A single balance movement to post.
#[derive(Debug, Clone)]
pub struct Posting<'a> {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub txn_type: WalletTxnType,
    pub reference: &'a str,
    pub order_id: Option<Uuid>,
    pub remark: Option<String>,
}

// creates the account row, on conflict does nothing
fn ensure_account(conn: &mut PgConnection, user_id: Uuid) -> Result<bool, DomainError> {
    let created = diesel::insert_into(wallet_accounts::table)
        .values((
            wallet_accounts::user_id.eq(user_id),
            wallet_accounts::balance.eq(BigDecimal::zero()),
        ))
        .on_conflict(wallet_accounts::user_id)
        .do_nothing()
        .execute(conn)?;
    Ok(created > 0)
}

/// Add `amount` to the balance. Posting the same reference twice returns
/// the original transaction with `applied = false`.
pub fn credit(conn: &mut PgConnection, posting: Posting<'_>) -> Result<WalletPosting, DomainError> {
    if posting.amount <= BigDecimal::zero() {
        return Err(DomainError::InvalidInput("credit amount must be positive".into()));
    }
    post(conn, posting, Direction::Credit)
}

/// Take `amount` from the balance. Refuses to overdraw.
pub fn debit(conn: &mut PgConnection, posting: Posting<'_>) -> Result<WalletPosting, DomainError> {
    if posting.amount <= BigDecimal::zero() {
        return Err(DomainError::InvalidInput("debit amount must be positive".into()));
    }
    post(conn, posting, Direction::Debit)
}

#[derive(Clone, Copy)]
enum Direction {
    Credit,
    Debit,
}

fn post(
    conn: &mut PgConnection,
    posting: Posting<'_>,
    direction: Direction,
) -> Result<WalletPosting, DomainError> {
    ensure_account(conn, posting.user_id)?;

    conn.transaction::<_, DomainError, _>(|conn| {
        // load account and lock for update
        let account = wallet_accounts::table
            .filter(wallet_accounts::user_id.eq(posting.user_id))
            .select(WalletAccountRow::as_select())
            .for_update()
            .first(conn)?;

        // idempotency check
        let existing = wallet_transactions::table
            .filter(wallet_transactions::reference.eq(posting.reference))
            .select(WalletTransactionRow::as_select())
            .first(conn)
            .optional()?;
        if let Some(existing) = existing {
            debug!("Wallet reference {} already posted", posting.reference);
            return Ok(WalletPosting {
                transaction: existing.into(),
                applied: false,
            });
        }

        let signed = match direction {
            Direction::Credit => posting.amount.clone(),
            Direction::Debit => -posting.amount.clone(),
        };
        let balance_after = &account.balance + &signed;
        if balance_after < BigDecimal::zero() {
            return Err(DomainError::InsufficientBalance);
        }

        let row = diesel::insert_into(wallet_transactions::table)
            .values(&NewWalletTransactionRow {
                id: Uuid::new_v4(),
                user_id: posting.user_id,
                txn_type: posting.txn_type.as_str().to_string(),
                amount: signed,
                balance_before: account.balance.clone(),
                balance_after: balance_after.clone(),
                reference: posting.reference.to_string(),
                order_id: posting.order_id,
                remark: posting.remark.clone(),
            })
            .returning(WalletTransactionRow::as_returning())
            .get_result(conn)?;

        diesel::update(wallet_accounts::table.filter(wallet_accounts::user_id.eq(posting.user_id)))
            .set((
                wallet_accounts::balance.eq(balance_after),
                wallet_accounts::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

        Ok(WalletPosting {
            transaction: row.into(),
            applied: true,
        })
    })
}

/// Current balance; zero for users who never had an account.
pub fn balance(conn: &mut PgConnection, user_id: Uuid) -> Result<BigDecimal, DomainError> {
    let balance = wallet_accounts::table
        .filter(wallet_accounts::user_id.eq(user_id))
        .select(wallet_accounts::balance)
        .first::<BigDecimal>(conn)
        .optional()?;
    Ok(balance.unwrap_or_else(BigDecimal::zero))
}

pub fn transactions(
    conn: &mut PgConnection,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<WalletTransactionView>, DomainError> {
    let rows = wallet_transactions::table
        .filter(wallet_transactions::user_id.eq(user_id))
        .order((wallet_transactions::created_at.desc(), wallet_transactions::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(WalletTransactionRow::as_select())
        .load(conn)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub fn find_by_reference(
    conn: &mut PgConnection,
    reference: &str,
) -> Result<Option<WalletTransactionView>, DomainError> {
    let row = wallet_transactions::table
        .filter(wallet_transactions::reference.eq(reference))
        .select(WalletTransactionRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row.map(Into::into))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::infrastructure::test_support::{dec, setup_db};

    fn posting<'a>(user_id: Uuid, amount: &str, txn_type: WalletTxnType, reference: &'a str) -> Posting<'a> {
        Posting {
            user_id,
            amount: dec(amount),
            txn_type,
            reference,
            order_id: None,
            remark: None,
        }
    }

    #[tokio::test]
    async fn credit_is_idempotent_per_reference() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let user = Uuid::new_v4();

        let first = credit(&mut conn, posting(user, "100.00", WalletTxnType::Recharge, "recharge:R1")).unwrap();
        assert!(first.applied);
        let replay = credit(&mut conn, posting(user, "100.00", WalletTxnType::Recharge, "recharge:R1")).unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.transaction.id, first.transaction.id);

        assert_eq!(balance(&mut conn, user).unwrap(), dec("100.00"));
        assert_eq!(transactions(&mut conn, user, 10, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn debit_refuses_to_overdraw() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let user = Uuid::new_v4();
        credit(&mut conn, posting(user, "10.00", WalletTxnType::Adjustment, "adj:1")).unwrap();

        let result = debit(&mut conn, posting(user, "10.01", WalletTxnType::OrderPayment, "order-pay:X"));
        assert!(matches!(result, Err(DomainError::InsufficientBalance)));

        let ok = debit(&mut conn, posting(user, "4.00", WalletTxnType::OrderPayment, "order-pay:Y")).unwrap();
        assert_eq!(ok.transaction.amount, dec("-4.00"));
        assert_eq!(ok.transaction.balance_before, dec("10.00"));
        assert_eq!(ok.transaction.balance_after, dec("6.00"));
        assert_eq!(balance(&mut conn, user).unwrap(), dec("6.00"));
    }

    #[tokio::test]
    async fn unknown_user_has_zero_balance() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        assert_eq!(balance(&mut conn, Uuid::new_v4()).unwrap(), BigDecimal::zero());
    }

    #[tokio::test]
    async fn concurrent_replays_post_once() {
        let (_container, pool) = setup_db().await;
        let user = Uuid::new_v4();
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mut conn = pool.get().expect("conn");
                    barrier.wait();
                    credit(
                        &mut conn,
                        posting(user, "25.00", WalletTxnType::LatePayment, "late-payment:P1"),
                    )
                    .expect("credit")
                    .applied
                })
            })
            .collect();
        let applied = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|applied| *applied)
            .count();

        assert_eq!(applied, 1);
        let mut conn = pool.get().expect("conn");
        assert_eq!(balance(&mut conn, user).unwrap(), dec("25.00"));
    }
}
