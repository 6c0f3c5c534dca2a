use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Wire-visible order states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Fulfilling,
    PartiallyDelivered,
    Delivered,
    Completed,
    Canceled,
    Expired,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Fulfilling,
        OrderStatus::PartiallyDelivered,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Canceled,
        OrderStatus::Expired,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Fulfilling => "fulfilling",
            OrderStatus::PartiallyDelivered => "partially_delivered",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// States reached only after money has been collected.
    pub fn is_post_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::Fulfilling
                | OrderStatus::PartiallyDelivered
                | OrderStatus::Delivered
                | OrderStatus::Completed
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (PendingPayment, Paid | Canceled | Expired) => true,
            (Paid, Fulfilling | PartiallyDelivered | Delivered) => true,
            (Fulfilling, PartiallyDelivered | Delivered) => true,
            (PartiallyDelivered, Delivered) => true,
            (Delivered, Completed) => true,
            (from, Refunded) => from.is_post_paid(),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::Internal(format!("unknown order status '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentType {
    /// Delivered by an operator after payment.
    Manual,
    /// Delivered from the secret pool at payment time.
    Auto,
}

impl FulfillmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentType::Manual => "manual",
            FulfillmentType::Auto => "auto",
        }
    }
}

impl FromStr for FulfillmentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(FulfillmentType::Manual),
            "auto" => Ok(FulfillmentType::Auto),
            other => Err(DomainError::Internal(format!(
                "unknown fulfillment type '{}'",
                other
            ))),
        }
    }
}

/// Who an order belongs to.
#[derive(Debug, Clone)]
pub enum OrderOwner {
    User(Uuid),
    Guest { email: String, password: String },
}

#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub owner: OrderOwner,
    pub lines: Vec<CheckoutLine>,
    pub coupon_code: Option<String>,
    pub affiliate_code: Option<String>,
    pub use_wallet: bool,
}

#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub order_no: String,
    pub status: OrderStatus,
    pub total_amount: BigDecimal,
    pub wallet_paid_amount: BigDecimal,
    pub amount_due: BigDecimal,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub title: String,
    pub unit_price: BigDecimal,
    pub quantity: i32,
    pub coupon_discount_amount: BigDecimal,
    pub promotion_discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub fulfillment_type: FulfillmentType,
}

#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: Uuid,
    pub order_no: String,
    pub parent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub currency: String,
    pub original_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub promotion_discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub wallet_paid_amount: BigDecimal,
    pub online_paid_amount: BigDecimal,
    pub refunded_amount: BigDecimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
    pub fulfillment: Option<String>,
    pub children: Vec<OrderView>,
}

impl OrderView {
    /// Guest orders have no owning user.
    pub fn is_guest(&self) -> bool {
        self.user_id.is_none()
    }

    /// Drop delivered goods from the order and all of its children.
    pub fn without_fulfillment(mut self) -> Self {
        self.fulfillment = None;
        self.children = self
            .children
            .into_iter()
            .map(OrderView::without_fulfillment)
            .collect();
        self
    }
}

/// Status of a split order derived from its children.
pub fn aggregate_status(children: &[OrderStatus]) -> OrderStatus {
    let delivered = children
        .iter()
        .filter(|s| matches!(s, OrderStatus::Delivered | OrderStatus::Completed))
        .count();
    if !children.is_empty() && delivered == children.len() {
        OrderStatus::Delivered
    } else if delivered > 0 {
        OrderStatus::PartiallyDelivered
    } else {
        OrderStatus::Fulfilling
    }
}

/// Round a money value to cents.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

/// Split `discount` across `line_amounts` proportionally.
///
/// Every share but the last is rounded down to cents; the last line absorbs
/// the remainder so the shares always sum to `discount` exactly. No share
/// exceeds its line amount.
pub fn allocate_discount(line_amounts: &[BigDecimal], discount: &BigDecimal) -> Vec<BigDecimal> {
    let mut shares = vec![BigDecimal::zero(); line_amounts.len()];
    if line_amounts.is_empty() || discount <= &BigDecimal::zero() {
        return shares;
    }
    let sum: BigDecimal = line_amounts.iter().sum();
    if sum <= BigDecimal::zero() {
        return shares;
    }
    let discount = if discount > &sum { sum.clone() } else { discount.clone() };

    let last = line_amounts.len() - 1;
    let mut allocated = BigDecimal::zero();
    for (i, amount) in line_amounts.iter().enumerate().take(last) {
        let share = (&discount * amount / &sum).with_scale_round(2, RoundingMode::Down);
        allocated += &share;
        shares[i] = share;
    }
    shares[last] = &discount - &allocated;

    // Rounding can push the remainder past the last line; hand the excess back.
    let mut overflow = &shares[last] - &line_amounts[last];
    if overflow > BigDecimal::zero() {
        shares[last] = line_amounts[last].clone();
        for i in 0..last {
            if overflow <= BigDecimal::zero() {
                break;
            }
            let room = &line_amounts[i] - &shares[i];
            let take = if room < overflow { room } else { overflow.clone() };
            shares[i] += &take;
            overflow -= take;
        }
    }
    shares
}

/// Human-facing order/payment number: prefix, UTC timestamp, random suffix.
pub fn generate_reference_no(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}{}",
        prefix,
        now.format("%Y%m%d%H%M%S"),
        suffix[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().expect("valid decimal")
    }

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn pending_payment_can_only_be_paid_canceled_or_expired() {
        let from = OrderStatus::PendingPayment;
        assert!(from.can_transition_to(OrderStatus::Paid));
        assert!(from.can_transition_to(OrderStatus::Canceled));
        assert!(from.can_transition_to(OrderStatus::Expired));
        assert!(!from.can_transition_to(OrderStatus::Delivered));
        assert!(!from.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn refund_is_reachable_from_every_post_paid_state() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.can_transition_to(OrderStatus::Refunded),
                status.is_post_paid(),
                "{}",
                status
            );
        }
    }

    #[test]
    fn terminal_states_do_not_move() {
        for terminal in [OrderStatus::Canceled, OrderStatus::Expired, OrderStatus::Refunded] {
            for next in OrderStatus::ALL {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn paid_cannot_go_back_to_pending() {
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::PendingPayment));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn split_order_status_follows_children() {
        use OrderStatus::*;
        assert_eq!(aggregate_status(&[Delivered, Delivered]), Delivered);
        assert_eq!(aggregate_status(&[Delivered, Fulfilling]), PartiallyDelivered);
        assert_eq!(aggregate_status(&[Fulfilling, Paid]), Fulfilling);
        assert_eq!(aggregate_status(&[Completed, Delivered]), Delivered);
    }

    #[test]
    fn allocate_discount_is_proportional_and_exact() {
        let lines = vec![dec("10.00"), dec("20.00"), dec("30.00")];
        let shares = allocate_discount(&lines, &dec("6.00"));
        assert_eq!(shares, vec![dec("1.00"), dec("2.00"), dec("3.00")]);
    }

    #[test]
    fn allocate_discount_gives_rounding_remainder_to_last_line() {
        let lines = vec![dec("10.00"), dec("10.00"), dec("10.00")];
        let shares = allocate_discount(&lines, &dec("10.00"));
        assert_eq!(shares[0], dec("3.33"));
        assert_eq!(shares[1], dec("3.33"));
        assert_eq!(shares[2], dec("3.34"));
        let total: BigDecimal = shares.iter().sum();
        assert_eq!(total, dec("10.00"));
    }

    #[test]
    fn allocate_discount_caps_at_line_sum() {
        let lines = vec![dec("1.00"), dec("2.00")];
        let shares = allocate_discount(&lines, &dec("50.00"));
        assert_eq!(shares, vec![dec("1.00"), dec("2.00")]);
    }

    #[test]
    fn allocate_discount_never_exceeds_a_line() {
        let lines = vec![dec("0.03"), dec("0.03"), dec("0.01")];
        let shares = allocate_discount(&lines, &dec("0.06"));
        for (share, line) in shares.iter().zip(&lines) {
            assert!(share <= line, "{} > {}", share, line);
        }
        let total: BigDecimal = shares.iter().sum();
        assert_eq!(total, dec("0.06"));
    }

    #[test]
    fn allocate_discount_handles_empty_and_zero() {
        assert!(allocate_discount(&[], &dec("1.00")).is_empty());
        let shares = allocate_discount(&[dec("5.00")], &BigDecimal::zero());
        assert_eq!(shares, vec![BigDecimal::zero()]);
    }

    #[test]
    fn round_money_rounds_half_up() {
        assert_eq!(round_money(&dec("1.005")), dec("1.01"));
        assert_eq!(round_money(&dec("1.004")), dec("1.00"));
    }

    #[test]
    fn reference_numbers_carry_prefix_and_are_unique() {
        let now = Utc::now();
        let a = generate_reference_no("O", now);
        let b = generate_reference_no("O", now);
        assert!(a.starts_with('O'));
        assert_eq!(a.len(), 1 + 14 + 8);
        assert_ne!(a, b);
    }
}
