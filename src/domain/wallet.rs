use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Why a wallet balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletTxnType {
    Recharge,
    OrderPayment,
    OrderUnwind,
    OrderRefund,
    LatePayment,
    CommissionPayout,
    Adjustment,
}

impl WalletTxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTxnType::Recharge => "recharge",
            WalletTxnType::OrderPayment => "order_payment",
            WalletTxnType::OrderUnwind => "order_unwind",
            WalletTxnType::OrderRefund => "order_refund",
            WalletTxnType::LatePayment => "late_payment",
            WalletTxnType::CommissionPayout => "commission_payout",
            WalletTxnType::Adjustment => "adjustment",
        }
    }
}

/// Idempotency references. One wallet movement per reference, ever.
pub mod reference {
    pub fn order_payment(order_no: &str) -> String {
        format!("order-pay:{}", order_no)
    }

    pub fn order_unwind(order_no: &str) -> String {
        format!("order-unwind:{}", order_no)
    }

    pub fn order_refund(order_no: &str) -> String {
        format!("order-refund:{}", order_no)
    }

    pub fn recharge(recharge_no: &str) -> String {
        format!("recharge:{}", recharge_no)
    }

    pub fn late_payment(payment_no: &str) -> String {
        format!("late-payment:{}", payment_no)
    }

    pub fn commission_payout(withdraw_request_id: uuid::Uuid) -> String {
        format!("affiliate-withdraw:{}", withdraw_request_id)
    }
}

#[derive(Debug, Clone)]
pub struct WalletTransactionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub txn_type: String,
    /// Signed: credits positive, debits negative.
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub reference: String,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a credit or debit.
#[derive(Debug, Clone)]
pub struct WalletPosting {
    pub transaction: WalletTransactionView,
    /// False when the reference had already been posted.
    pub applied: bool,
}

#[derive(Debug, Clone)]
pub struct WalletSummary {
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub transactions: Vec<WalletTransactionView>,
}
