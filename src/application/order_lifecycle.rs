//! Order state machine. Every transition re-reads the order under a row lock,
//! checks legality, applies its stock, secret and ledger side effects and
//! writes an outbox event, all in one transaction.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::{Connection, PgConnection};
use log::{info, warn};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{aggregate_status, FulfillmentType, OrderStatus, OrderView};
use crate::domain::stock::{StockOutcome, StockTarget};
use crate::domain::wallet::{reference, WalletTxnType};
use crate::infrastructure::models::OrderRow;
use crate::infrastructure::order_repo::{self, OrderChanges};
use crate::infrastructure::outbox::{self, OrderEvent};
use crate::infrastructure::wallet_ledger::{self, Posting};
use crate::infrastructure::{
    commission_ledger, coupon_repo, payment_repo, secret_pool, stock_ledger,
};

use super::guest_access;
use super::EngineSettings;

#[derive(Clone)]
pub struct OrderLifecycle {
    pool: DbPool,
    settings: EngineSettings,
}

impl OrderLifecycle {
    pub fn new(pool: DbPool, settings: EngineSettings) -> Self {
        Self { pool, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn get(&self, order_no: &str) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;
        let order = order_repo::find_by_no(&mut conn, order_no)?
            .ok_or_else(|| DomainError::NotFound(format!("Order {}", order_no)))?;
        order_repo::load_view(&mut conn, order)
    }

    /// Look up a guest order. Any mismatch reads as "not found".
    pub fn verify_guest_access(
        &self,
        order_no: &str,
        email: &str,
        password: &str,
    ) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;
        let not_found = || DomainError::NotFound(format!("Order {}", order_no));
        let order = order_repo::find_by_no(&mut conn, order_no)?.ok_or_else(not_found)?;
        let (Some(guest_email), Some(hash)) = (&order.guest_email, &order.guest_password_hash) else {
            return Err(not_found());
        };
        if !guest_email.eq_ignore_ascii_case(email.trim())
            || !guest_access::verify_password(password, hash)
        {
            return Err(not_found());
        }
        order_repo::load_view(&mut conn, order)
    }

    /// Buyer-initiated cancel of an unpaid order.
    pub fn cancel(&self, order_no: &str) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let order = order_repo::lock_by_no(conn, order_no)?;
            if order.parent_id.is_some() {
                return Err(DomainError::InvalidInput(format!(
                    "{} is part of a split order; cancel the parent",
                    order_no
                )));
            }
            close_unpaid(conn, &order, OrderStatus::Canceled, Utc::now())
        })
    }

    /// Timeout of an unpaid order. A no-op unless the payment window has passed.
    pub fn expire(&self, order_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let order = order_repo::lock(conn, order_id)?;
            if order.parent_id.is_some() || order.expires_at.map_or(true, |at| at > now) {
                return Ok(false);
            }
            close_unpaid(conn, &order, OrderStatus::Expired, now)
        })
    }

    /// Operator delivery of a manual order (or one child of a split order).
    pub fn deliver_manual(
        &self,
        order_no: &str,
        payload: &str,
        delivered_by: Option<&str>,
    ) -> Result<bool, DomainError> {
        if payload.trim().is_empty() {
            return Err(DomainError::InvalidInput("delivery payload is empty".into()));
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let target = order_repo::find_by_no(conn, order_no)?
                .ok_or_else(|| DomainError::NotFound(format!("Order {}", order_no)))?;
            // Parent before child, the same order mark_paid locks them in.
            let parent = match target.parent_id {
                Some(parent_id) => Some(order_repo::lock(conn, parent_id)?),
                None => None,
            };
            let leaf = order_repo::lock(conn, target.id)?;
            if !order_repo::children(conn, leaf.id)?.is_empty() {
                return Err(DomainError::InvalidInput(format!(
                    "{} is a split order; deliver its child orders",
                    order_no
                )));
            }
            let status = leaf.current_status()?;
            if !matches!(status, OrderStatus::Paid | OrderStatus::Fulfilling) {
                return Ok(false);
            }

            order_repo::record_fulfillment(conn, leaf.id, FulfillmentType::Manual, payload, delivered_by)?;
            let delivered = order_repo::transition(
                conn,
                leaf.id,
                status,
                &OrderChanges::to_status(OrderStatus::Delivered, now),
            )?
            .ok_or_else(|| DomainError::Internal(format!("order {} moved under lock", order_no)))?;

            match parent {
                Some(parent) => {
                    let parent = settle_parent_status(conn, &parent, now)?;
                    if parent.current_status()? == OrderStatus::Delivered {
                        outbox::record(conn, OrderEvent::Delivered, &parent, None)?;
                    }
                }
                None => outbox::record(conn, OrderEvent::Delivered, &delivered, None)?,
            }
            info!("Order {} delivered manually", order_no);
            Ok(true)
        })
    }

    /// Attach buyer form data to a manual item. `order_no` may name the leaf
    /// order holding the item or its split parent.
    pub fn submit_manual_form(
        &self,
        order_no: &str,
        item_id: Uuid,
        form: Value,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let order = order_repo::find_by_no(conn, order_no)?
                .ok_or_else(|| DomainError::NotFound(format!("Order {}", order_no)))?;
            let status = order.current_status()?;
            if !matches!(
                status,
                OrderStatus::PendingPayment | OrderStatus::Paid | OrderStatus::Fulfilling
            ) {
                return Err(DomainError::InvalidInput(format!(
                    "order {} no longer accepts form data ({})",
                    order_no, status
                )));
            }
            let mut candidates = vec![order.id];
            candidates.extend(order_repo::children(conn, order.id)?.iter().map(|c| c.id));
            for order_id in candidates {
                if order_repo::set_manual_form(conn, order_id, item_id, &form)? {
                    return Ok(());
                }
            }
            Err(DomainError::NotFound(format!("Manual item {} on order {}", item_id, order_no)))
        })
    }

    /// Buyer confirms receipt: `delivered -> completed`, children included.
    pub fn confirm_receipt(&self, order_no: &str) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let order = order_repo::lock_by_no(conn, order_no)?;
            if order.parent_id.is_some() {
                return Err(DomainError::InvalidInput(format!(
                    "{} is part of a split order; confirm the parent",
                    order_no
                )));
            }
            if order.current_status()? != OrderStatus::Delivered {
                return Ok(false);
            }
            for child in order_repo::lock_children(conn, order.id)? {
                order_repo::transition(
                    conn,
                    child.id,
                    OrderStatus::Delivered,
                    &OrderChanges::to_status(OrderStatus::Completed, now),
                )?;
            }
            let completed = order_repo::transition(
                conn,
                order.id,
                OrderStatus::Delivered,
                &OrderChanges::to_status(OrderStatus::Completed, now),
            )?
            .ok_or_else(|| DomainError::Internal(format!("order {} moved under lock", order_no)))?;
            outbox::record(conn, OrderEvent::Completed, &completed, None)?;
            Ok(true)
        })
    }

    /// Refund a paid order into the owner's wallet. `amount` defaults to
    /// everything not yet refunded.
    pub fn refund(&self, order_no: &str, amount: Option<BigDecimal>) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let order = order_repo::lock_by_no(conn, order_no)?;
            if order.parent_id.is_some() {
                return Err(DomainError::InvalidInput(format!(
                    "{} is part of a split order; refund the parent",
                    order_no
                )));
            }
            let status = order.current_status()?;
            if !status.can_transition_to(OrderStatus::Refunded) {
                return Ok(false);
            }

            let refundable =
                &order.online_paid_amount + &order.wallet_paid_amount - &order.refunded_amount;
            let amount = amount.unwrap_or_else(|| refundable.clone());
            if amount < BigDecimal::zero() || amount > refundable {
                return Err(DomainError::InvalidInput(format!(
                    "refund amount {} outside 0..={}",
                    amount, refundable
                )));
            }

            if amount > BigDecimal::zero() {
                match order.user_id {
                    Some(user_id) => {
                        let reference = reference::order_refund(&order.order_no);
                        wallet_ledger::credit(
                            conn,
                            Posting {
                                user_id,
                                amount: amount.clone(),
                                txn_type: WalletTxnType::OrderRefund,
                                reference: &reference,
                                order_id: Some(order.id),
                                remark: None,
                            },
                        )?;
                    }
                    None => info!(
                        "Guest order {} refunded {}; settle with the buyer outside the wallet",
                        order.order_no, amount
                    ),
                }
            }

            for child in order_repo::lock_children(conn, order.id)? {
                let child_status = child.current_status()?;
                if child_status.can_transition_to(OrderStatus::Refunded) {
                    order_repo::transition(
                        conn,
                        child.id,
                        child_status,
                        &OrderChanges::to_status(OrderStatus::Refunded, now),
                    )?;
                }
            }

            let mut changes = OrderChanges::to_status(OrderStatus::Refunded, now);
            changes.refunded_amount = Some(&order.refunded_amount + &amount);
            let refunded = order_repo::transition(conn, order.id, status, &changes)?
                .ok_or_else(|| DomainError::Internal(format!("order {} moved under lock", order_no)))?;
            let rejected = commission_ledger::reject_for_order(conn, order.id)?;
            outbox::record(
                conn,
                OrderEvent::Refunded,
                &refunded,
                Some(json!({ "refund_amount": amount.to_string() })),
            )?;
            info!(
                "Order {} refunded {} ({} commissions rejected)",
                order_no, amount, rejected
            );
            Ok(true)
        })
    }
}

// ── Transaction-scoped steps ─────────────────────────────────────────────────

/// `pending_payment -> paid` for a locked top-level order, then fulfil it.
///
/// Returns `false` when the order is no longer payable; the caller decides
/// what happens to the money.
pub(crate) fn mark_paid(
    conn: &mut PgConnection,
    settings: &EngineSettings,
    order: &OrderRow,
    online_amount: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<bool, DomainError> {
    if order.current_status()? != OrderStatus::PendingPayment {
        return Ok(false);
    }
    let mut changes = OrderChanges::to_status(OrderStatus::Paid, now);
    changes.online_paid_amount = Some(&order.online_paid_amount + online_amount);
    let Some(paid) =
        order_repo::transition(conn, order.id, OrderStatus::PendingPayment, &changes)?
    else {
        return Ok(false);
    };

    let children = order_repo::lock_children(conn, paid.id)?;
    let paid = if children.is_empty() {
        fulfil_leaf(conn, &paid, now)?;
        order_repo::lock(conn, paid.id)?
    } else {
        for child in &children {
            let child = order_repo::transition(
                conn,
                child.id,
                OrderStatus::PendingPayment,
                &OrderChanges::to_status(OrderStatus::Paid, now),
            )?
            .ok_or_else(|| {
                DomainError::Internal(format!("child order {} is not pending", child.order_no))
            })?;
            fulfil_leaf(conn, &child, now)?;
        }
        settle_parent_status(conn, &paid, now)?
    };

    commission_ledger::accrue_for_order(conn, &paid, now, settings.commission_confirm_days)?;
    outbox::record(conn, OrderEvent::Paid, &paid, None)?;
    if paid.current_status()? == OrderStatus::Delivered {
        outbox::record(conn, OrderEvent::Delivered, &paid, None)?;
    }
    info!("Order {} paid, now {}", paid.order_no, paid.status);
    Ok(true)
}

/// Consume what a freshly paid leaf reserved and deliver what can be
/// delivered automatically. Returns the leaf's new status.
fn fulfil_leaf(conn: &mut PgConnection, leaf: &OrderRow, now: DateTime<Utc>) -> Result<OrderStatus, DomainError> {
    let items = order_repo::items(conn, leaf.id)?;
    let mut needs_operator = false;
    let mut delivered: Vec<String> = Vec::new();

    for item in &items {
        match item.fulfillment_type.parse::<FulfillmentType>()? {
            FulfillmentType::Auto => {
                let secrets: Vec<_> = secret_pool::reserved_for(conn, leaf.id)?
                    .into_iter()
                    .filter(|s| s.product_id == item.product_id && s.sku_id == item.sku_id)
                    .take(item.quantity as usize)
                    .collect();
                let ids: Vec<Uuid> = secrets.iter().map(|s| s.id).collect();
                let used = secret_pool::mark_used(conn, &ids, leaf.id)?;
                if used != item.quantity as usize {
                    return Err(DomainError::Internal(format!(
                        "order {} holds {} of {} reserved secrets",
                        leaf.order_no, used, item.quantity
                    )));
                }
                delivered.extend(secrets.into_iter().map(|s| s.secret));
            }
            FulfillmentType::Manual => {
                let target = StockTarget::new(item.product_id, item.sku_id);
                if stock_ledger::consume(conn, target, item.quantity)? == StockOutcome::Insufficient {
                    warn!(
                        "Order {} paid but {} could not consume {} units",
                        leaf.order_no, target, item.quantity
                    );
                }
                needs_operator = true;
            }
        }
    }

    let next = if needs_operator {
        OrderStatus::Fulfilling
    } else {
        order_repo::record_fulfillment(conn, leaf.id, FulfillmentType::Auto, &delivered.join("\n"), None)?;
        OrderStatus::Delivered
    };
    order_repo::transition(conn, leaf.id, OrderStatus::Paid, &OrderChanges::to_status(next, now))?;
    Ok(next)
}

/// Recompute a locked split parent's status from its children.
fn settle_parent_status(
    conn: &mut PgConnection,
    parent: &OrderRow,
    now: DateTime<Utc>,
) -> Result<OrderRow, DomainError> {
    let statuses = order_repo::children(conn, parent.id)?
        .iter()
        .map(OrderRow::current_status)
        .collect::<Result<Vec<_>, _>>()?;
    let current = order_repo::lock(conn, parent.id)?;
    let from = current.current_status()?;
    let target = aggregate_status(&statuses);
    if target == from || !from.can_transition_to(target) {
        return Ok(current);
    }
    Ok(
        order_repo::transition(conn, parent.id, from, &OrderChanges::to_status(target, now))?
            .unwrap_or(current),
    )
}

/// `pending_payment -> canceled | expired` for a locked top-level order.
/// Releases everything checkout took and unwinds any wallet part-payment.
fn close_unpaid(
    conn: &mut PgConnection,
    order: &OrderRow,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<bool, DomainError> {
    if order.current_status()? != OrderStatus::PendingPayment {
        return Ok(false);
    }
    if payment_repo::has_success_for_order(conn, order.id)? {
        warn!(
            "Order {} has a successful payment still being applied; not closing it",
            order.order_no
        );
        return Ok(false);
    }
    payment_repo::expire_open_for_order(conn, order.id, now)?;

    let children = order_repo::lock_children(conn, order.id)?;
    if children.is_empty() {
        release_leaf(conn, order)?;
    } else {
        for child in &children {
            release_leaf(conn, child)?;
            order_repo::transition(
                conn,
                child.id,
                OrderStatus::PendingPayment,
                &OrderChanges::to_status(to, now),
            )?;
        }
    }

    if let Some(coupon_id) = order.coupon_id {
        coupon_repo::release(conn, coupon_id)?;
    }

    let mut changes = OrderChanges::to_status(to, now);
    if order.wallet_paid_amount > BigDecimal::zero() {
        if let Some(user_id) = order.user_id {
            let reference = reference::order_unwind(&order.order_no);
            wallet_ledger::credit(
                conn,
                Posting {
                    user_id,
                    amount: order.wallet_paid_amount.clone(),
                    txn_type: WalletTxnType::OrderUnwind,
                    reference: &reference,
                    order_id: Some(order.id),
                    remark: None,
                },
            )?;
            changes.refunded_amount = Some(&order.refunded_amount + &order.wallet_paid_amount);
        }
    }

    let closed = order_repo::transition(conn, order.id, OrderStatus::PendingPayment, &changes)?
        .ok_or_else(|| DomainError::Internal(format!("order {} moved under lock", order.order_no)))?;
    let event = if to == OrderStatus::Expired {
        OrderEvent::Expired
    } else {
        OrderEvent::Canceled
    };
    outbox::record(conn, event, &closed, None)?;
    info!("Order {} {}", order.order_no, to);
    Ok(true)
}

fn release_leaf(conn: &mut PgConnection, leaf: &OrderRow) -> Result<(), DomainError> {
    for item in order_repo::items(conn, leaf.id)? {
        if item.fulfillment_type.parse::<FulfillmentType>()? == FulfillmentType::Manual {
            let target = StockTarget::new(item.product_id, item.sku_id);
            if stock_ledger::release(conn, target, item.quantity)? == StockOutcome::Insufficient {
                warn!(
                    "Order {} released {} units of {} that were not locked",
                    leaf.order_no, item.quantity, target
                );
            }
        }
    }
    secret_pool::release(conn, leaf.id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use diesel::prelude::*;

    use super::*;
    use crate::application::checkout::Checkout;
    use crate::domain::order::{CheckoutLine, CheckoutRequest, OrderOwner};
    use crate::domain::stock::StockCounters;
    use crate::infrastructure::test_support::{
        dec, outbox_events, product_counters, seed_affiliate, seed_coupon, seed_product, setup_db,
    };
    use crate::schema::{affiliate_commissions, coupons};

    fn place(pool: &DbPool, owner: OrderOwner, lines: &[(Uuid, i32)], use_wallet: bool) -> String {
        place_with(pool, EngineSettings::default(), owner, lines, use_wallet, None)
    }

    fn place_with(
        pool: &DbPool,
        settings: EngineSettings,
        owner: OrderOwner,
        lines: &[(Uuid, i32)],
        use_wallet: bool,
        coupon_code: Option<&str>,
    ) -> String {
        Checkout::new(pool.clone(), settings)
            .place(CheckoutRequest {
                owner,
                lines: lines
                    .iter()
                    .map(|&(product_id, quantity)| CheckoutLine {
                        product_id,
                        sku_id: None,
                        quantity,
                    })
                    .collect(),
                coupon_code: coupon_code.map(str::to_string),
                affiliate_code: None,
                use_wallet,
            })
            .expect("checkout")
            .order_no
    }

    fn pay(pool: &DbPool, order_no: &str, amount: &str) -> bool {
        let mut conn = pool.get().expect("conn");
        conn.transaction::<_, DomainError, _>(|conn| {
            let order = order_repo::lock_by_no(conn, order_no)?;
            mark_paid(conn, &EngineSettings::default(), &order, &dec(amount), Utc::now())
        })
        .expect("mark paid")
    }

    fn fund(pool: &DbPool, user_id: Uuid, amount: &str) {
        let mut conn = pool.get().expect("conn");
        wallet_ledger::credit(
            &mut conn,
            Posting {
                user_id,
                amount: dec(amount),
                txn_type: WalletTxnType::Adjustment,
                reference: &format!("seed:{}", Uuid::new_v4()),
                order_id: None,
                remark: None,
            },
        )
        .expect("fund wallet");
    }

    #[tokio::test]
    async fn manual_order_runs_from_payment_to_completion() {
        let (_container, pool) = setup_db().await;
        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", 5, "10.00");
        let order_no = place(&pool, OrderOwner::User(Uuid::new_v4()), &[(product, 2)], false);
        assert_eq!(product_counters(&mut conn, product), StockCounters::new(3, 2, 0));

        assert!(pay(&pool, &order_no, "20.00"));
        assert!(!pay(&pool, &order_no, "20.00"));
        assert_eq!(product_counters(&mut conn, product), StockCounters::new(3, 0, 2));
        let view = lifecycle.get(&order_no).unwrap();
        assert_eq!(view.status, OrderStatus::Fulfilling);
        assert_eq!(view.online_paid_amount, dec("20.00"));

        assert!(lifecycle.deliver_manual(&order_no, "Account: demo / pw", Some("ops")).unwrap());
        assert!(!lifecycle.deliver_manual(&order_no, "again", None).unwrap());
        let view = lifecycle.get(&order_no).unwrap();
        assert_eq!(view.status, OrderStatus::Delivered);
        assert_eq!(view.fulfillment.as_deref(), Some("Account: demo / pw"));

        assert!(lifecycle.confirm_receipt(&order_no).unwrap());
        assert_eq!(lifecycle.get(&order_no).unwrap().status, OrderStatus::Completed);

        let events = outbox_events(&mut conn, view.id);
        for expected in ["OrderCreated", "OrderPaid", "OrderDelivered", "OrderCompleted"] {
            assert!(events.iter().any(|e| e == expected), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn cancel_releases_stock_coupon_and_wallet() {
        let (_container, pool) = setup_db().await;
        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let user = Uuid::new_v4();
        let product = seed_product(&mut conn, "manual", 5, "10.00");
        seed_coupon(&mut conn, "ONE-OFF", "fixed", "1.00", 1, None);
        fund(&pool, user, "4.00");

        let order_no = place_with(
            &pool,
            EngineSettings::default(),
            OrderOwner::User(user),
            &[(product, 1)],
            true,
            Some("ONE-OFF"),
        );
        assert_eq!(wallet_ledger::balance(&mut conn, user).unwrap(), BigDecimal::zero());

        assert!(lifecycle.cancel(&order_no).unwrap());
        assert!(!lifecycle.cancel(&order_no).unwrap());

        let view = lifecycle.get(&order_no).unwrap();
        assert_eq!(view.status, OrderStatus::Canceled);
        assert_eq!(view.refunded_amount, dec("4.00"));
        assert_eq!(product_counters(&mut conn, product), StockCounters::new(5, 0, 0));
        assert_eq!(wallet_ledger::balance(&mut conn, user).unwrap(), dec("4.00"));
        let used: i32 = coupons::table
            .filter(coupons::code.eq("ONE-OFF"))
            .select(coupons::used_count)
            .first(&mut conn)
            .unwrap();
        assert_eq!(used, 0);

        // A canceled order can no longer be paid.
        assert!(!pay(&pool, &order_no, "5.00"));
    }

    #[tokio::test]
    async fn expire_waits_for_the_deadline() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "auto", 0, "5.00");
        secret_pool::import(&mut conn, product, None, ["K-1", "K-2"]).unwrap();

        let live = place(&pool, OrderOwner::User(Uuid::new_v4()), &[(product, 1)], false);
        let stale_settings = EngineSettings {
            order_ttl: Duration::minutes(-1),
            ..EngineSettings::default()
        };
        let stale = place_with(
            &pool,
            stale_settings,
            OrderOwner::User(Uuid::new_v4()),
            &[(product, 1)],
            false,
            None,
        );
        assert_eq!(secret_pool::count_available(&mut conn, product, None).unwrap(), 0);

        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let live = lifecycle.get(&live).unwrap();
        let stale = lifecycle.get(&stale).unwrap();
        assert!(!lifecycle.expire(live.id).unwrap());
        assert!(lifecycle.expire(stale.id).unwrap());
        assert!(!lifecycle.expire(stale.id).unwrap());

        assert_eq!(lifecycle.get(&stale.order_no).unwrap().status, OrderStatus::Expired);
        assert_eq!(secret_pool::count_available(&mut conn, product, None).unwrap(), 1);
        assert!(outbox_events(&mut conn, stale.id).iter().any(|e| e == "OrderExpired"));
    }

    #[tokio::test]
    async fn split_order_is_partially_delivered_until_every_child_is() {
        let (_container, pool) = setup_db().await;
        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let auto = seed_product(&mut conn, "auto", 0, "5.00");
        let manual = seed_product(&mut conn, "manual", 3, "7.00");
        secret_pool::import(&mut conn, auto, None, ["CODE-A", "CODE-B"]).unwrap();

        let order_no = place(&pool, OrderOwner::User(Uuid::new_v4()), &[(auto, 2), (manual, 1)], false);
        assert!(pay(&pool, &order_no, "17.00"));

        let view = lifecycle.get(&order_no).unwrap();
        assert_eq!(view.status, OrderStatus::PartiallyDelivered);
        assert_eq!(view.children.len(), 2);
        let auto_child = &view.children[0];
        let manual_child = &view.children[1];
        assert_eq!(auto_child.status, OrderStatus::Delivered);
        let mut codes: Vec<&str> = auto_child.fulfillment.as_deref().unwrap().lines().collect();
        codes.sort_unstable();
        assert_eq!(codes, vec!["CODE-A", "CODE-B"]);
        assert_eq!(manual_child.status, OrderStatus::Fulfilling);

        assert!(matches!(
            lifecycle.deliver_manual(&order_no, "x", None),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(lifecycle.deliver_manual(&manual_child.order_no, "done", None).unwrap());
        assert_eq!(lifecycle.get(&order_no).unwrap().status, OrderStatus::Delivered);

        assert!(lifecycle.confirm_receipt(&order_no).unwrap());
        let view = lifecycle.get(&order_no).unwrap();
        assert!(view.children.iter().all(|c| c.status == OrderStatus::Completed));
    }

    #[tokio::test]
    async fn refund_credits_wallet_and_rejects_commission() {
        let (_container, pool) = setup_db().await;
        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let buyer = Uuid::new_v4();
        let product = seed_product(&mut conn, "manual", -1, "10.00");
        let profile = seed_affiliate(&mut conn, Uuid::new_v4(), "REF1", "10");

        let order_no = Checkout::new(pool.clone(), EngineSettings::default())
            .place(CheckoutRequest {
                owner: OrderOwner::User(buyer),
                lines: vec![CheckoutLine {
                    product_id: product,
                    sku_id: None,
                    quantity: 1,
                }],
                coupon_code: None,
                affiliate_code: Some("REF1".into()),
                use_wallet: false,
            })
            .unwrap()
            .order_no;
        assert!(pay(&pool, &order_no, "10.00"));

        let commission: String = affiliate_commissions::table
            .filter(affiliate_commissions::profile_id.eq(profile))
            .select(affiliate_commissions::status)
            .first(&mut conn)
            .unwrap();
        assert_eq!(commission, "pending_confirm");

        assert!(matches!(
            lifecycle.refund(&order_no, Some(dec("10.01"))),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(lifecycle.refund(&order_no, None).unwrap());
        assert!(!lifecycle.refund(&order_no, None).unwrap());

        let view = lifecycle.get(&order_no).unwrap();
        assert_eq!(view.status, OrderStatus::Refunded);
        assert_eq!(view.refunded_amount, dec("10.00"));
        assert_eq!(wallet_ledger::balance(&mut conn, buyer).unwrap(), dec("10.00"));
        let commission: String = affiliate_commissions::table
            .filter(affiliate_commissions::profile_id.eq(profile))
            .select(affiliate_commissions::status)
            .first(&mut conn)
            .unwrap();
        assert_eq!(commission, "rejected");
    }

    #[tokio::test]
    async fn unpaid_order_cannot_be_delivered_or_refunded() {
        let (_container, pool) = setup_db().await;
        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", 2, "10.00");
        let order_no = place(&pool, OrderOwner::User(Uuid::new_v4()), &[(product, 1)], false);

        assert!(!lifecycle.deliver_manual(&order_no, "early", None).unwrap());
        assert!(!lifecycle.refund(&order_no, None).unwrap());
        assert!(!lifecycle.confirm_receipt(&order_no).unwrap());
        assert!(matches!(
            lifecycle.deliver_manual(&order_no, "  ", None),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(lifecycle.get("O-missing"), Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn guest_access_needs_matching_email_and_password() {
        let (_container, pool) = setup_db().await;
        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", -1, "1.00");
        let order_no = place(
            &pool,
            OrderOwner::Guest {
                email: "guest@example.com".into(),
                password: "s3cret!".into(),
            },
            &[(product, 1)],
            false,
        );

        assert!(lifecycle
            .verify_guest_access(&order_no, "GUEST@example.com", "s3cret!")
            .is_ok());
        assert!(matches!(
            lifecycle.verify_guest_access(&order_no, "guest@example.com", "wrong"),
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            lifecycle.verify_guest_access(&order_no, "other@example.com", "s3cret!"),
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn manual_form_attaches_to_item() {
        let (_container, pool) = setup_db().await;
        let lifecycle = OrderLifecycle::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", -1, "1.00");
        let order_no = place(&pool, OrderOwner::User(Uuid::new_v4()), &[(product, 1)], false);
        let item_id = lifecycle.get(&order_no).unwrap().items[0].id;

        lifecycle
            .submit_manual_form(&order_no, item_id, json!({ "account": "player-1" }))
            .unwrap();
        let stored = order_repo::items(&mut conn, lifecycle.get(&order_no).unwrap().id).unwrap();
        assert_eq!(stored[0].manual_form_data, Some(json!({ "account": "player-1" })));

        assert!(matches!(
            lifecycle.submit_manual_form(&order_no, Uuid::new_v4(), json!({})),
            Err(DomainError::NotFound(_))
        ));
    }
}
