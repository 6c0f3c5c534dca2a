//! Periodic sweep: expire overdue orders and stale payments, mature
//! affiliate commissions.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::infrastructure::{commission_ledger, order_repo, payment_repo};

use super::order_lifecycle::OrderLifecycle;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_orders: usize,
    pub expired_payments: usize,
    pub matured_commissions: usize,
}

#[derive(Clone)]
pub struct SettlementScheduler {
    pool: DbPool,
    lifecycle: OrderLifecycle,
    batch_size: i64,
    interval: StdDuration,
}

impl SettlementScheduler {
    pub fn new(pool: DbPool, lifecycle: OrderLifecycle, batch_size: i64, interval: StdDuration) -> Self {
        Self {
            pool,
            lifecycle,
            batch_size,
            interval,
        }
    }

    /// One sweep. Orders are expired one guarded transaction at a time so a
    /// single bad row never blocks the rest of the batch.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, DomainError> {
        let mut report = SweepReport::default();
        let overdue = {
            let mut conn = self.pool.get()?;
            order_repo::overdue_pending(&mut conn, now, self.batch_size)?
        };
        for order_id in overdue {
            match self.lifecycle.expire(order_id) {
                Ok(true) => report.expired_orders += 1,
                Ok(false) => {}
                Err(e) => warn!("Could not expire order {}: {}", order_id, e),
            }
        }

        let mut conn = self.pool.get()?;
        report.expired_payments = payment_repo::expire_stale(&mut conn, now)?;
        report.matured_commissions = commission_ledger::mark_pending_available(&mut conn, now)?;
        Ok(report)
    }

    /// Run the sweep on a fixed interval on the blocking pool.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let scheduler = self.clone();
                match tokio::task::spawn_blocking(move || scheduler.run_once(Utc::now())).await {
                    Ok(Ok(report)) if report != SweepReport::default() => info!(
                        "Sweep expired {} orders and {} payments, matured {} commissions",
                        report.expired_orders, report.expired_payments, report.matured_commissions
                    ),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Settlement sweep failed: {}", e),
                    Err(e) => error!("Settlement sweep panicked: {}", e),
                }
            }
        })
    }
}
