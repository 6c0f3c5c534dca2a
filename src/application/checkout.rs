//! Turns a cart into a `pending_payment` order with stock reserved, the
//! coupon claimed and (optionally) part of the amount taken from the wallet.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::{Connection, PgConnection};
use log::{debug, info};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{
    allocate_discount, generate_reference_no, CheckoutLine, CheckoutReceipt, CheckoutRequest,
    FulfillmentType, OrderOwner, OrderStatus,
};
use crate::domain::stock::{StockOutcome, StockTarget};
use crate::domain::wallet::{reference, WalletTxnType};
use crate::infrastructure::catalog::{self, Sellable};
use crate::infrastructure::models::{NewOrderItemRow, NewOrderRow, OrderRow};
use crate::infrastructure::order_repo::{self, OrderChanges};
use crate::infrastructure::outbox::{self, OrderEvent};
use crate::infrastructure::wallet_ledger::{self, Posting};
use crate::infrastructure::{commission_ledger, coupon_repo, secret_pool, stock_ledger};

use super::order_lifecycle::mark_paid;
use super::{guest_access, EngineSettings};

pub const ORDER_PREFIX: &str = "O";

/// One priced cart line.
struct PricedLine {
    line: CheckoutLine,
    sellable: Sellable,
    fulfillment_type: FulfillmentType,
    original: BigDecimal,
    promotion: BigDecimal,
    coupon: BigDecimal,
}

impl PricedLine {
    fn after_promotion(&self) -> BigDecimal {
        &self.original - &self.promotion
    }

    fn total(&self) -> BigDecimal {
        &self.original - &self.promotion - &self.coupon
    }

    fn item(&self, order_id: Uuid) -> NewOrderItemRow {
        NewOrderItemRow {
            id: Uuid::new_v4(),
            order_id,
            product_id: self.line.product_id,
            sku_id: self.line.sku_id,
            title: self.sellable.product.title.clone(),
            sku_code: self.sellable.sku.as_ref().map(|sku| sku.sku_code.clone()),
            unit_price: self.sellable.unit_price().clone(),
            quantity: self.line.quantity,
            coupon_discount_amount: self.coupon.clone(),
            promotion_discount_amount: self.promotion.clone(),
            total_amount: self.total(),
            fulfillment_type: self.fulfillment_type.as_str().to_string(),
        }
    }
}

/// Who the order rows are written for.
struct Owner {
    user_id: Option<Uuid>,
    guest_email: Option<String>,
    guest_password_hash: Option<String>,
}

#[derive(Clone)]
pub struct Checkout {
    pool: DbPool,
    settings: EngineSettings,
}

impl Checkout {
    pub fn new(pool: DbPool, settings: EngineSettings) -> Self {
        Self { pool, settings }
    }

    pub fn place(&self, request: CheckoutRequest) -> Result<CheckoutReceipt, DomainError> {
        if request.lines.is_empty() {
            return Err(DomainError::InvalidInput("cart is empty".into()));
        }
        if let Some(line) = request.lines.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::InvalidInput(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }

        // Argon2 is slow; hash before any row is locked.
        let owner = match &request.owner {
            OrderOwner::User(user_id) => Owner {
                user_id: Some(*user_id),
                guest_email: None,
                guest_password_hash: None,
            },
            OrderOwner::Guest { email, password } => {
                guest_access::validate_guest(email, password)?;
                Owner {
                    user_id: None,
                    guest_email: Some(email.trim().to_lowercase()),
                    guest_password_hash: Some(guest_access::hash_password(password)?),
                }
            }
        };

        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let now = Utc::now();
            self.place_in(conn, &request, &owner, now)
        })
    }

    fn place_in(
        &self,
        conn: &mut PgConnection,
        request: &CheckoutRequest,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<CheckoutReceipt, DomainError> {
        let mut lines = price_lines(conn, &request.lines)?;

        let base: BigDecimal = lines.iter().map(PricedLine::after_promotion).sum();
        let coupon = match request.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let coupon = coupon_repo::claim(conn, code, &base, now)?;
                let discount = coupon.discount_for(&base);
                let bases: Vec<BigDecimal> = lines.iter().map(PricedLine::after_promotion).collect();
                for (line, share) in lines.iter_mut().zip(allocate_discount(&bases, &discount)) {
                    line.coupon = share;
                }
                Some(coupon)
            }
            _ => None,
        };

        let affiliate_profile_id = match request.affiliate_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let profile = commission_ledger::find_active_profile_by_code(conn, code)?;
                if profile.is_none() {
                    debug!("Ignoring unknown affiliate code {}", code);
                }
                profile.map(|p| p.id)
            }
            _ => None,
        };

        let original: BigDecimal = lines.iter().map(|l| &l.original).sum();
        let promotion: BigDecimal = lines.iter().map(|l| &l.promotion).sum();
        let discount: BigDecimal = lines.iter().map(|l| &l.coupon).sum();
        let total = &original - &promotion - &discount;
        let expires_at = now + self.settings.order_ttl;

        let order_no = generate_reference_no(ORDER_PREFIX, now);
        let order = order_repo::insert(
            conn,
            &NewOrderRow {
                id: Uuid::new_v4(),
                order_no: order_no.clone(),
                parent_id: None,
                user_id: owner.user_id,
                guest_email: owner.guest_email.clone(),
                guest_password_hash: owner.guest_password_hash.clone(),
                status: OrderStatus::PendingPayment.as_str().to_string(),
                currency: self.settings.currency.clone(),
                original_amount: original,
                discount_amount: discount,
                promotion_discount_amount: promotion,
                total_amount: total,
                coupon_id: coupon.as_ref().map(|c| c.id),
                affiliate_profile_id,
                expires_at: Some(expires_at),
            },
        )?;

        if lines.len() == 1 {
            order_repo::insert_items(conn, &[lines[0].item(order.id)])?;
            reserve_line(conn, &lines[0], order.id)?;
        } else {
            // One child per line; items and reservations hang off the children.
            for (i, line) in lines.iter().enumerate() {
                let child = order_repo::insert(
                    conn,
                    &NewOrderRow {
                        id: Uuid::new_v4(),
                        order_no: format!("{}-{}", order_no, i + 1),
                        parent_id: Some(order.id),
                        user_id: owner.user_id,
                        guest_email: owner.guest_email.clone(),
                        guest_password_hash: owner.guest_password_hash.clone(),
                        status: OrderStatus::PendingPayment.as_str().to_string(),
                        currency: self.settings.currency.clone(),
                        original_amount: line.original.clone(),
                        discount_amount: line.coupon.clone(),
                        promotion_discount_amount: line.promotion.clone(),
                        total_amount: line.total(),
                        coupon_id: None,
                        affiliate_profile_id: None,
                        expires_at: Some(expires_at),
                    },
                )?;
                order_repo::insert_items(conn, &[line.item(child.id)])?;
                reserve_line(conn, line, child.id)?;
            }
        }
        outbox::record(conn, OrderEvent::Created, &order, None)?;

        let order = match owner.user_id {
            Some(user_id) if request.use_wallet => pay_from_wallet(conn, &order, user_id, now)?,
            _ => order,
        };

        let due = &order.total_amount - &order.wallet_paid_amount;
        if due <= BigDecimal::zero() {
            mark_paid(conn, &self.settings, &order, &BigDecimal::zero(), now)?;
        }

        let order = order_repo::lock(conn, order.id)?;
        info!(
            "Order {} placed: {} lines, total {} {}",
            order.order_no,
            lines.len(),
            order.total_amount,
            order.currency
        );
        Ok(CheckoutReceipt {
            order_id: order.id,
            order_no: order.order_no.clone(),
            status: order.current_status()?,
            total_amount: order.total_amount.clone(),
            wallet_paid_amount: order.wallet_paid_amount.clone(),
            amount_due: &order.total_amount - &order.wallet_paid_amount - &order.online_paid_amount,
            expires_at: order.expires_at,
        })
    }
}

fn price_lines(conn: &mut PgConnection, lines: &[CheckoutLine]) -> Result<Vec<PricedLine>, DomainError> {
    lines
        .iter()
        .map(|line| {
            let sellable = catalog::find_sellable(conn, line.product_id, line.sku_id)?;
            let fulfillment_type = sellable.product.fulfillment_type.parse::<FulfillmentType>()?;
            let unit = sellable.unit_price().clone();
            let quantity = BigDecimal::from(line.quantity);
            let per_unit_promotion = match sellable.promotion_price() {
                Some(promo) if promo < &unit && promo >= &BigDecimal::zero() => &unit - promo,
                _ => BigDecimal::zero(),
            };
            Ok(PricedLine {
                line: line.clone(),
                fulfillment_type,
                original: &unit * &quantity,
                promotion: per_unit_promotion * &quantity,
                coupon: BigDecimal::zero(),
                sellable,
            })
        })
        .collect()
}

fn reserve_line(conn: &mut PgConnection, line: &PricedLine, order_id: Uuid) -> Result<(), DomainError> {
    let CheckoutLine { product_id, sku_id, quantity } = line.line;
    match line.fulfillment_type {
        FulfillmentType::Manual => {
            let target = StockTarget::new(product_id, sku_id);
            if stock_ledger::reserve(conn, target, quantity)? == StockOutcome::Insufficient {
                return Err(DomainError::InsufficientStock(target.to_string()));
            }
        }
        FulfillmentType::Auto => {
            secret_pool::allocate(conn, product_id, sku_id, quantity, order_id)?;
        }
    }
    Ok(())
}

/// Take as much of the order total as the wallet balance covers.
fn pay_from_wallet(
    conn: &mut PgConnection,
    order: &OrderRow,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<OrderRow, DomainError> {
    let balance = wallet_ledger::balance(conn, user_id)?;
    let amount = if balance < order.total_amount {
        balance
    } else {
        order.total_amount.clone()
    };
    if amount <= BigDecimal::zero() {
        return Ok(order.clone());
    }

    let reference = reference::order_payment(&order.order_no);
    wallet_ledger::debit(
        conn,
        Posting {
            user_id,
            amount: amount.clone(),
            txn_type: WalletTxnType::OrderPayment,
            reference: &reference,
            order_id: Some(order.id),
            remark: None,
        },
    )?;
    let changes = OrderChanges {
        wallet_paid_amount: Some(amount),
        updated_at: Some(now),
        ..Default::default()
    };
    order_repo::transition(conn, order.id, OrderStatus::PendingPayment, &changes)?
        .ok_or_else(|| DomainError::Internal(format!("order {} moved during checkout", order.order_no)))
}
