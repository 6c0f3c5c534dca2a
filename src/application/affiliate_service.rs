//! Affiliate payouts: binding available commissions into withdrawal requests
//! and settling or rejecting those requests.

use chrono::{DateTime, Utc};
use diesel::Connection;
use log::info;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::commission::{CommissionView, WithdrawChannel, WithdrawRequestView, WithdrawStatus};
use crate::domain::errors::DomainError;
use crate::domain::wallet::{reference, WalletTxnType};
use crate::infrastructure::commission_ledger;
use crate::infrastructure::models::WithdrawRequestRow;
use crate::infrastructure::wallet_ledger::{self, Posting};

use super::EngineSettings;

fn withdraw_view(row: WithdrawRequestRow, commission_count: usize) -> WithdrawRequestView {
    WithdrawRequestView {
        id: row.id,
        profile_id: row.profile_id,
        amount: row.amount,
        channel: row.channel,
        status: row.status,
        commission_count,
        created_at: row.created_at,
    }
}

#[derive(Clone)]
pub struct AffiliateService {
    pool: DbPool,
    settings: EngineSettings,
}

impl AffiliateService {
    pub fn new(pool: DbPool, settings: EngineSettings) -> Self {
        Self { pool, settings }
    }

    pub fn commissions(&self, profile_id: Uuid) -> Result<Vec<CommissionView>, DomainError> {
        let mut conn = self.pool.get()?;
        commission_ledger::find_profile(&mut conn, profile_id)?;
        commission_ledger::commissions_for_profile(&mut conn, profile_id)?
            .iter()
            .map(|row| row.view())
            .collect()
    }

    /// Bind every available commission of the profile into one request.
    pub fn request_withdrawal(
        &self,
        profile_id: Uuid,
        channel: WithdrawChannel,
        account: Option<String>,
    ) -> Result<WithdrawRequestView, DomainError> {
        if channel == WithdrawChannel::External
            && account.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            return Err(DomainError::InvalidInput(
                "external withdrawals need a payout account".into(),
            ));
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let profile = commission_ledger::find_profile(conn, profile_id)?;
            if !profile.is_active {
                return Err(DomainError::InvalidInput(format!(
                    "affiliate profile {} is disabled",
                    profile_id
                )));
            }
            let (request, bound) = commission_ledger::bind_withdrawal(
                conn,
                profile_id,
                channel,
                account,
                &self.settings.min_withdraw_amount,
            )?;
            Ok(withdraw_view(request, bound))
        })
    }

    /// Mark a pending request paid. Wallet-channel payouts credit the
    /// affiliate's own wallet.
    pub fn settle_withdrawal(&self, withdraw_request_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let request = commission_ledger::lock_withdrawal(conn, withdraw_request_id)?;
            if !commission_ledger::close_withdrawal(conn, request.id, WithdrawStatus::Paid, now)? {
                return Ok(false);
            }
            if request.channel.parse::<WithdrawChannel>()? == WithdrawChannel::Wallet {
                let profile = commission_ledger::find_profile(conn, request.profile_id)?;
                let reference = reference::commission_payout(request.id);
                wallet_ledger::credit(
                    conn,
                    Posting {
                        user_id: profile.user_id,
                        amount: request.amount.clone(),
                        txn_type: WalletTxnType::CommissionPayout,
                        reference: &reference,
                        order_id: None,
                        remark: None,
                    },
                )?;
            }
            info!(
                "Withdrawal {} paid: {} via {}",
                request.id, request.amount, request.channel
            );
            Ok(true)
        })
    }

    /// Reject a pending request. Its commissions are rejected with it and
    /// never return to the withdrawable pool.
    pub fn reject_withdrawal(&self, withdraw_request_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let request = commission_ledger::lock_withdrawal(conn, withdraw_request_id)?;
            if !commission_ledger::close_withdrawal(conn, request.id, WithdrawStatus::Rejected, now)? {
                return Ok(false);
            }
            let rejected = commission_ledger::reject_bound(conn, request.id)?;
            info!("Withdrawal {} rejected with {} commissions", request.id, rejected);
            Ok(true)
        })
    }

    pub fn mark_pending_commissions_available(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;
        commission_ledger::mark_pending_available(&mut conn, now)
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::{BigDecimal, Zero};
    use chrono::Duration;
    use diesel::prelude::*;

    use super::*;
    use crate::application::checkout::Checkout;
    use crate::application::order_lifecycle::mark_paid;
    use crate::domain::commission::CommissionStatus;
    use crate::domain::order::{CheckoutLine, CheckoutRequest, OrderOwner};
    use crate::infrastructure::models::NewWithdrawRequestRow;
    use crate::infrastructure::order_repo;
    use crate::infrastructure::test_support::{dec, seed_affiliate, seed_product, setup_db};
    use crate::schema::{affiliate_commissions, affiliate_withdraw_requests};

    /// Place and pay an order worth `price` referred by `code`.
    fn referred_sale(pool: &DbPool, buyer: Uuid, code: &str, price: &str) {
        let mut conn = pool.get().expect("conn");
        let product = seed_product(&mut conn, "manual", -1, price);
        let receipt = Checkout::new(pool.clone(), EngineSettings::default())
            .place(CheckoutRequest {
                owner: OrderOwner::User(buyer),
                lines: vec![CheckoutLine {
                    product_id: product,
                    sku_id: None,
                    quantity: 1,
                }],
                coupon_code: None,
                affiliate_code: Some(code.to_string()),
                use_wallet: false,
            })
            .expect("checkout");
        conn.transaction::<_, DomainError, _>(|conn| {
            let order = order_repo::lock(conn, receipt.order_id)?;
            mark_paid(conn, &EngineSettings::default(), &order, &order.total_amount.clone(), Utc::now())
        })
        .expect("mark paid");
    }

    fn statuses(service: &AffiliateService, profile: Uuid) -> Vec<CommissionStatus> {
        service
            .commissions(profile)
            .unwrap()
            .into_iter()
            .map(|c| c.status)
            .collect()
    }

    #[tokio::test]
    async fn commissions_mature_then_bind_into_one_withdrawal() {
        let (_container, pool) = setup_db().await;
        let service = AffiliateService::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let affiliate_user = Uuid::new_v4();
        let profile = seed_affiliate(&mut conn, affiliate_user, "FRIEND", "10");

        referred_sale(&pool, Uuid::new_v4(), "FRIEND", "60.00");
        referred_sale(&pool, Uuid::new_v4(), "FRIEND", "40.00");
        // Self-referral earns nothing.
        referred_sale(&pool, affiliate_user, "FRIEND", "100.00");

        let views = service.commissions(profile).unwrap();
        assert_eq!(views.len(), 2);
        let total: BigDecimal = views.iter().map(|c| &c.amount).sum();
        assert_eq!(total, dec("10.00"));

        // Nothing is withdrawable before the confirmation window passes.
        assert_eq!(service.mark_pending_commissions_available(Utc::now()).unwrap(), 0);
        assert!(matches!(
            service.request_withdrawal(profile, WithdrawChannel::Wallet, None),
            Err(DomainError::InvalidInput(_))
        ));

        let later = Utc::now() + Duration::days(8);
        assert_eq!(service.mark_pending_commissions_available(later).unwrap(), 2);
        assert_eq!(service.mark_pending_commissions_available(later).unwrap(), 0);

        let request = service
            .request_withdrawal(profile, WithdrawChannel::Wallet, None)
            .unwrap();
        assert_eq!(request.amount, dec("10.00"));
        assert_eq!(request.commission_count, 2);
        assert_eq!(commission_ledger::bound_count(&mut conn, request.id).unwrap(), 2);
        assert!(statuses(&service, profile)
            .iter()
            .all(|s| *s == CommissionStatus::Withdrawn));

        // Bound commissions cannot be claimed twice.
        assert!(matches!(
            service.request_withdrawal(profile, WithdrawChannel::Wallet, None),
            Err(DomainError::InvalidInput(_))
        ));

        assert!(service.settle_withdrawal(request.id).unwrap());
        assert!(!service.settle_withdrawal(request.id).unwrap());
        assert!(!service.reject_withdrawal(request.id).unwrap());
        assert_eq!(wallet_ledger::balance(&mut conn, affiliate_user).unwrap(), dec("10.00"));
    }

    #[tokio::test]
    async fn rejected_withdrawal_is_not_rebound() {
        let (_container, pool) = setup_db().await;
        let service = AffiliateService::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let affiliate_user = Uuid::new_v4();
        let profile = seed_affiliate(&mut conn, affiliate_user, "PAL", "20");
        referred_sale(&pool, Uuid::new_v4(), "PAL", "100.00");
        service
            .mark_pending_commissions_available(Utc::now() + Duration::days(30))
            .unwrap();

        assert!(matches!(
            service.request_withdrawal(profile, WithdrawChannel::External, None),
            Err(DomainError::InvalidInput(_))
        ));
        let request = service
            .request_withdrawal(profile, WithdrawChannel::External, Some("iban:XX00".into()))
            .unwrap();
        assert!(service.reject_withdrawal(request.id).unwrap());

        assert_eq!(statuses(&service, profile), vec![CommissionStatus::Rejected]);
        assert!(service
            .request_withdrawal(profile, WithdrawChannel::Wallet, None)
            .is_err());
        assert_eq!(wallet_ledger::balance(&mut conn, affiliate_user).unwrap(), BigDecimal::zero());
    }

    #[tokio::test]
    async fn bound_commissions_do_not_mature() {
        let (_container, pool) = setup_db().await;
        let service = AffiliateService::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let profile = seed_affiliate(&mut conn, Uuid::new_v4(), "HELD", "10");
        referred_sale(&pool, Uuid::new_v4(), "HELD", "50.00");
        referred_sale(&pool, Uuid::new_v4(), "HELD", "30.00");

        // One pending commission already tied to a withdrawal request.
        let request = diesel::insert_into(affiliate_withdraw_requests::table)
            .values(&NewWithdrawRequestRow {
                id: Uuid::new_v4(),
                profile_id: profile,
                amount: dec("5.00"),
                channel: WithdrawChannel::Wallet.as_str().to_string(),
                account: None,
                status: WithdrawStatus::Pending.as_str().to_string(),
            })
            .returning(affiliate_withdraw_requests::id)
            .get_result::<Uuid>(&mut conn)
            .unwrap();
        let held = service
            .commissions(profile)
            .unwrap()
            .into_iter()
            .find(|c| c.amount == dec("5.00"))
            .unwrap();
        diesel::update(affiliate_commissions::table.filter(affiliate_commissions::id.eq(held.id)))
            .set(affiliate_commissions::withdraw_request_id.eq(Some(request)))
            .execute(&mut conn)
            .unwrap();

        let later = Utc::now() + Duration::days(30);
        assert_eq!(service.mark_pending_commissions_available(later).unwrap(), 1);
        let views = service.commissions(profile).unwrap();
        let status_of = |amount: &str| {
            views
                .iter()
                .find(|c| c.amount == dec(amount))
                .map(|c| c.status)
                .unwrap()
        };
        assert_eq!(status_of("5.00"), CommissionStatus::PendingConfirm);
        assert_eq!(status_of("3.00"), CommissionStatus::Available);
    }

    #[tokio::test]
    async fn below_minimum_is_refused() {
        let (_container, pool) = setup_db().await;
        let service = AffiliateService::new(pool.clone(), EngineSettings::default());
        let mut conn = pool.get().expect("conn");
        let profile = seed_affiliate(&mut conn, Uuid::new_v4(), "TINY", "1");
        referred_sale(&pool, Uuid::new_v4(), "TINY", "50.00");
        service
            .mark_pending_commissions_available(Utc::now() + Duration::days(30))
            .unwrap();

        // 0.50 available against a 10.00 minimum.
        assert!(matches!(
            service.request_withdrawal(profile, WithdrawChannel::Wallet, None),
            Err(DomainError::InvalidInput(_))
        ));
        assert_eq!(statuses(&service, profile), vec![CommissionStatus::Available]);
        assert!(matches!(
            service.commissions(Uuid::new_v4()),
            Err(DomainError::NotFound(_))
        ));
    }
}
