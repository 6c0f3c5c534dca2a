//! Payment reconciliation: opening payments with a gateway and applying
//! provider callbacks exactly once.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::{Connection, PgConnection};
use log::{debug, info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{generate_reference_no, OrderStatus};
use crate::domain::payment::{
    CreatePaymentRequest, InteractionMode, NormalizedEvent, PaymentStatus, PaymentView,
    ProviderType, RawCallback, ReconcileOutcome,
};
use crate::domain::ports::PaymentGateway;
use crate::domain::wallet::{reference, WalletTxnType};
use crate::infrastructure::gateways::GatewayRegistry;
use crate::infrastructure::models::{NewPaymentRow, NewWalletRechargeRow, OrderRow, PaymentRow};
use crate::infrastructure::wallet_ledger::{self, Posting};
use crate::infrastructure::{order_repo, payment_repo};

use super::order_lifecycle::mark_paid;
use super::EngineSettings;

pub const PAYMENT_PREFIX: &str = "P";
pub const RECHARGE_PREFIX: &str = "R";

/// Outcome of a webhook plus the body the provider expects back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackReply {
    pub outcome: ReconcileOutcome,
    pub ack: &'static str,
}

#[derive(Clone)]
pub struct ReconciliationProcessor {
    pool: DbPool,
    gateways: GatewayRegistry,
    settings: EngineSettings,
}

impl ReconciliationProcessor {
    pub fn new(pool: DbPool, gateways: GatewayRegistry, settings: EngineSettings) -> Self {
        Self {
            pool,
            gateways,
            settings,
        }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    /// Authenticate a provider webhook and apply it.
    pub fn handle_callback(
        &self,
        provider: ProviderType,
        raw: &RawCallback,
    ) -> Result<CallbackReply, DomainError> {
        let gateway = self.gateways.get(provider)?;
        let event = gateway.verify_callback(raw).map_err(|e| {
            warn!("Rejected {} callback: {}", provider, e);
            e
        })?;
        let outcome = self.reconcile(provider, event)?;
        Ok(CallbackReply {
            outcome,
            ack: gateway.callback_ack(),
        })
    }

    /// Apply the result of actively polling the provider for `payment_no`.
    pub fn query_payment(
        &self,
        payment_no: &str,
        raw: &RawCallback,
    ) -> Result<ReconcileOutcome, DomainError> {
        let mut conn = self.pool.get()?;
        let provider = payment_repo::find_by_no(&mut conn, payment_no)?
            .ok_or_else(|| DomainError::UnknownPayment(payment_no.to_string()))?
            .provider_type
            .parse::<ProviderType>()?;
        let event = self.gateways.get(provider)?.verify_callback(raw)?;
        let answered_for_other = |no: &str| {
            warn!("Query for {} answered for payment {}", payment_no, no);
            DomainError::UnknownPayment(format!(
                "query for {} answered for another payment",
                payment_no
            ))
        };
        if let Some(no) = event.payment_no.as_deref().filter(|no| *no != payment_no) {
            return Err(answered_for_other(no));
        }
        let event = NormalizedEvent {
            payment_no: Some(payment_no.to_string()),
            ..event
        };
        // A provider reference wins the lookup, so it must lead back here too.
        let payment = find_payment(&mut conn, provider, &event)?;
        if payment.payment_no != payment_no {
            return Err(answered_for_other(&payment.payment_no));
        }
        self.settle(&mut conn, payment, event)
    }

    pub fn get_payment(&self, payment_no: &str) -> Result<PaymentView, DomainError> {
        let mut conn = self.pool.get()?;
        payment_repo::find_by_no(&mut conn, payment_no)?
            .ok_or_else(|| DomainError::NotFound(format!("Payment {}", payment_no)))?
            .view()
    }

    /// Open a new payment attempt for the unpaid remainder of an order.
    pub fn start_order_payment(
        &self,
        order_no: &str,
        provider: ProviderType,
        channel: &str,
    ) -> Result<PaymentView, DomainError> {
        let gateway = self.gateways.get(provider)?;
        let mut conn = self.pool.get()?;
        let payment = conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let order = order_repo::lock_by_no(conn, order_no)?;
            let due = amount_due(&order);
            let open = order.current_status()? == OrderStatus::PendingPayment
                && order.expires_at.map_or(true, |at| at > now);
            if order.parent_id.is_some() || !open || due <= BigDecimal::zero() {
                return Err(DomainError::NotPayable(order_no.to_string()));
            }

            let payment_window = now + self.settings.payment_ttl;
            let expires_at = order
                .expires_at
                .map_or(payment_window, |at| at.min(payment_window));
            payment_repo::insert(
                conn,
                &NewPaymentRow {
                    id: Uuid::new_v4(),
                    payment_no: generate_reference_no(PAYMENT_PREFIX, now),
                    order_id: Some(order.id),
                    recharge_id: None,
                    provider_type: provider.as_str().to_string(),
                    channel_type: channel.to_string(),
                    interaction_mode: InteractionMode::Redirect.as_str().to_string(),
                    amount: due,
                    currency: order.currency.clone(),
                    status: PaymentStatus::Initiated.as_str().to_string(),
                    expires_at,
                },
            )
        })?;
        let subject = format!("Order {}", order_no);
        self.open_with_gateway(&mut conn, gateway.as_ref(), payment, subject)
    }

    /// Open a payment that tops up `user_id`'s wallet once it succeeds.
    pub fn start_recharge(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        provider: ProviderType,
        channel: &str,
    ) -> Result<PaymentView, DomainError> {
        if amount <= BigDecimal::zero() {
            return Err(DomainError::InvalidInput("recharge amount must be positive".into()));
        }
        let gateway = self.gateways.get(provider)?;
        let mut conn = self.pool.get()?;
        let payment = conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            let recharge = payment_repo::insert_recharge(
                conn,
                &NewWalletRechargeRow {
                    id: Uuid::new_v4(),
                    recharge_no: generate_reference_no(RECHARGE_PREFIX, now),
                    user_id,
                    amount: amount.clone(),
                    currency: self.settings.currency.clone(),
                },
            )?;
            payment_repo::insert(
                conn,
                &NewPaymentRow {
                    id: Uuid::new_v4(),
                    payment_no: generate_reference_no(PAYMENT_PREFIX, now),
                    order_id: None,
                    recharge_id: Some(recharge.id),
                    provider_type: provider.as_str().to_string(),
                    channel_type: channel.to_string(),
                    interaction_mode: InteractionMode::Redirect.as_str().to_string(),
                    amount: amount.clone(),
                    currency: recharge.currency,
                    status: PaymentStatus::Initiated.as_str().to_string(),
                    expires_at: now + self.settings.payment_ttl,
                },
            )
        })?;
        self.open_with_gateway(&mut conn, gateway.as_ref(), payment, "Wallet recharge".to_string())
    }

    /// Call the gateway outside any transaction, then record what it said.
    fn open_with_gateway(
        &self,
        conn: &mut PgConnection,
        gateway: &dyn PaymentGateway,
        payment: PaymentRow,
        subject: String,
    ) -> Result<PaymentView, DomainError> {
        let request = CreatePaymentRequest {
            payment_no: payment.payment_no.clone(),
            subject,
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            channel: payment.channel_type.clone(),
            notify_url: format!(
                "{}/payments/callback/{}",
                self.settings.notify_base_url,
                gateway.provider()
            ),
        };
        match gateway.create_payment(&request) {
            Ok(created) => {
                let row = payment_repo::attach_gateway_result(conn, payment.id, &created)?
                    .ok_or_else(|| {
                        DomainError::NotPayable(format!(
                            "payment {} closed while the gateway was called",
                            payment.payment_no
                        ))
                    })?;
                info!(
                    "Payment {} opened with {} for {} {}",
                    row.payment_no, row.provider_type, row.amount, row.currency
                );
                row.view()
            }
            Err(e) => {
                warn!("Gateway refused payment {}: {}", payment.payment_no, e);
                payment_repo::transition(
                    conn,
                    payment.id,
                    PaymentStatus::Failed,
                    None,
                    &json!({ "error": e.to_string() }),
                    Utc::now(),
                )?;
                Err(match e {
                    DomainError::Gateway(_) => e,
                    other => DomainError::Gateway(other.to_string()),
                })
            }
        }
    }

    fn reconcile(
        &self,
        provider: ProviderType,
        event: NormalizedEvent,
    ) -> Result<ReconcileOutcome, DomainError> {
        let mut conn = self.pool.get()?;
        let payment = find_payment(&mut conn, provider, &event)?;
        self.settle(&mut conn, payment, event)
    }

    /// Apply `event` to a payment already resolved from it.
    fn settle(
        &self,
        conn: &mut PgConnection,
        payment: PaymentRow,
        event: NormalizedEvent,
    ) -> Result<ReconcileOutcome, DomainError> {
        let payment_no = payment.payment_no.clone();
        let current = payment.current_status()?;

        if current.is_terminal() {
            debug!("Payment {} already {}, ignoring {}", payment_no, current, event.status);
            return Ok(ReconcileOutcome::AlreadyProcessed { payment_no });
        }
        match event.status {
            PaymentStatus::Initiated | PaymentStatus::Pending => {
                return Ok(ReconcileOutcome::StillPending { payment_no });
            }
            PaymentStatus::Success
                if event.amount != payment.amount || event.currency != payment.currency =>
            {
                warn!(
                    "Payment {} reported {} {} but {} {} was requested",
                    payment_no, event.amount, event.currency, payment.amount, payment.currency
                );
                return Err(DomainError::amount_mismatch(
                    &payment.amount,
                    &payment.currency,
                    &event.amount,
                    &event.currency,
                ));
            }
            _ => {}
        }

        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            // Order row first, the same order cancel and expire lock in.
            let order = match payment.order_id {
                Some(order_id) => Some(order_repo::lock(conn, order_id)?),
                None => None,
            };
            let Some(updated) = payment_repo::transition(
                conn,
                payment.id,
                event.status,
                event.provider_ref.as_deref(),
                &event.raw,
                now,
            )?
            else {
                debug!("Payment {} was settled by a concurrent callback", payment_no);
                return Ok(ReconcileOutcome::AlreadyProcessed {
                    payment_no: payment_no.clone(),
                });
            };

            if event.status == PaymentStatus::Success {
                match (order, updated.recharge_id) {
                    (Some(order), _) => self.apply_order_payment(conn, &order, &updated, now)?,
                    (None, Some(recharge_id)) => apply_recharge(conn, recharge_id, now)?,
                    (None, None) => {
                        return Err(DomainError::Internal(format!(
                            "payment {} settles neither an order nor a recharge",
                            payment_no
                        )))
                    }
                }
            }
            info!("Payment {} -> {}", payment_no, event.status);
            Ok(ReconcileOutcome::Applied {
                payment_no: payment_no.clone(),
                status: event.status,
            })
        })
    }

    fn apply_order_payment(
        &self,
        conn: &mut PgConnection,
        order: &OrderRow,
        payment: &PaymentRow,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if payment.amount >= amount_due(order)
            && mark_paid(conn, &self.settings, order, &payment.amount, now)?
        {
            return Ok(());
        }
        credit_unapplied(conn, order, payment)
    }
}

fn amount_due(order: &OrderRow) -> BigDecimal {
    &order.total_amount - &order.wallet_paid_amount - &order.online_paid_amount
}

fn find_payment(
    conn: &mut PgConnection,
    provider: ProviderType,
    event: &NormalizedEvent,
) -> Result<PaymentRow, DomainError> {
    let by_ref = match &event.provider_ref {
        Some(provider_ref) => payment_repo::find_by_provider_ref(conn, provider, provider_ref)?,
        None => None,
    };
    let payment = match (by_ref, &event.payment_no) {
        (Some(payment), _) => Some(payment),
        (None, Some(payment_no)) => payment_repo::find_by_no(conn, payment_no)?,
        (None, None) => None,
    };
    payment
        .filter(|p| p.provider_type == provider.as_str())
        .ok_or_else(|| {
            let key = event
                .payment_no
                .clone()
                .or_else(|| event.provider_ref.clone())
                .unwrap_or_default();
            warn!("{} callback for unknown payment '{}'", provider, key);
            DomainError::UnknownPayment(key)
        })
}

/// Money that arrived for an order that can no longer take it.
fn credit_unapplied(conn: &mut PgConnection, order: &OrderRow, payment: &PaymentRow) -> Result<(), DomainError> {
    match order.user_id {
        Some(user_id) => {
            warn!(
                "Late payment {} for order {} ({}); crediting {} to the wallet of {}",
                payment.payment_no, order.order_no, order.status, payment.amount, user_id
            );
            let reference = reference::late_payment(&payment.payment_no);
            wallet_ledger::credit(
                conn,
                Posting {
                    user_id,
                    amount: payment.amount.clone(),
                    txn_type: WalletTxnType::LatePayment,
                    reference: &reference,
                    order_id: Some(order.id),
                    remark: Some(format!("late payment for order {}", order.order_no)),
                },
            )?;
        }
        None => warn!(
            "Late payment {} of {} {} for guest order {} ({}) needs a manual refund",
            payment.payment_no, payment.amount, payment.currency, order.order_no, order.status
        ),
    }
    Ok(())
}

fn apply_recharge(conn: &mut PgConnection, recharge_id: Uuid, now: DateTime<Utc>) -> Result<(), DomainError> {
    let recharge = payment_repo::lock_recharge(conn, recharge_id)?;
    if !payment_repo::mark_recharge_paid(conn, recharge.id, now)? {
        debug!("Recharge {} already credited", recharge.recharge_no);
        return Ok(());
    }
    let reference = reference::recharge(&recharge.recharge_no);
    wallet_ledger::credit(
        conn,
        Posting {
            user_id: recharge.user_id,
            amount: recharge.amount.clone(),
            txn_type: WalletTxnType::Recharge,
            reference: &reference,
            order_id: None,
            remark: None,
        },
    )?;
    info!("Recharge {} credited {} to {}", recharge.recharge_no, recharge.amount, recharge.user_id);
    Ok(())
}
