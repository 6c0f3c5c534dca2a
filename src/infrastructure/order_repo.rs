use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{FulfillmentType, OrderItemView, OrderStatus, OrderView};
use crate::schema::{fulfillments, order_items, orders};

use super::models::{
    FulfillmentRow, NewFulfillmentRow, NewOrderItemRow, NewOrderRow, OrderItemRow, OrderRow,
};

/// Columns written by a status transition. `None` leaves a column as is.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = orders)]
pub struct OrderChanges {
    pub status: Option<String>,
    pub wallet_paid_amount: Option<BigDecimal>,
    pub online_paid_amount: Option<BigDecimal>,
    pub refunded_amount: Option<BigDecimal>,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderChanges {
    pub fn to_status(status: OrderStatus, now: DateTime<Utc>) -> Self {
        let mut changes = OrderChanges {
            status: Some(status.as_str().to_string()),
            updated_at: Some(now),
            ..Default::default()
        };
        match status {
            OrderStatus::Paid => changes.paid_at = Some(now),
            OrderStatus::Canceled | OrderStatus::Expired => changes.canceled_at = Some(now),
            OrderStatus::Completed => changes.completed_at = Some(now),
            _ => {}
        }
        changes
    }
}

impl OrderRow {
    pub fn current_status(&self) -> Result<OrderStatus, DomainError> {
        self.status.parse()
    }
}

pub fn insert(conn: &mut PgConnection, order: &NewOrderRow) -> Result<OrderRow, DomainError> {
    let row = diesel::insert_into(orders::table)
        .values(order)
        .returning(OrderRow::as_returning())
        .get_result(conn)?;
    Ok(row)
}

pub fn insert_items(conn: &mut PgConnection, items: &[NewOrderItemRow]) -> Result<(), DomainError> {
    diesel::insert_into(order_items::table)
        .values(items)
        .execute(conn)?;
    Ok(())
}

pub fn find_by_no(conn: &mut PgConnection, order_no: &str) -> Result<Option<OrderRow>, DomainError> {
    let row = orders::table
        .filter(orders::order_no.eq(order_no))
        .filter(orders::deleted_at.is_null())
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrderRow>, DomainError> {
    let row = orders::table
        .filter(orders::id.eq(id))
        .filter(orders::deleted_at.is_null())
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

/// Re-read an order under `SELECT ... FOR UPDATE`.
pub fn lock(conn: &mut PgConnection, id: Uuid) -> Result<OrderRow, DomainError> {
    orders::table
        .filter(orders::id.eq(id))
        .filter(orders::deleted_at.is_null())
        .select(OrderRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::NotFound(format!("Order {}", id)))
}

pub fn lock_by_no(conn: &mut PgConnection, order_no: &str) -> Result<OrderRow, DomainError> {
    orders::table
        .filter(orders::order_no.eq(order_no))
        .filter(orders::deleted_at.is_null())
        .select(OrderRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::NotFound(format!("Order {}", order_no)))
}

/// Children of a split order, locked, in creation order.
pub fn lock_children(conn: &mut PgConnection, parent_id: Uuid) -> Result<Vec<OrderRow>, DomainError> {
    let rows = orders::table
        .filter(orders::parent_id.eq(parent_id))
        .filter(orders::deleted_at.is_null())
        .order((orders::created_at.asc(), orders::order_no.asc()))
        .select(OrderRow::as_select())
        .for_update()
        .load(conn)?;
    Ok(rows)
}

pub fn children(conn: &mut PgConnection, parent_id: Uuid) -> Result<Vec<OrderRow>, DomainError> {
    let rows = orders::table
        .filter(orders::parent_id.eq(parent_id))
        .filter(orders::deleted_at.is_null())
        .order((orders::created_at.asc(), orders::order_no.asc()))
        .select(OrderRow::as_select())
        .load(conn)?;
    Ok(rows)
}

pub fn items(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<OrderItemRow>, DomainError> {
    let rows = order_items::table
        .filter(order_items::order_id.eq(order_id))
        .order(order_items::created_at.asc())
        .select(OrderItemRow::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Apply `changes` only if the order is still in `from`. Returns the updated
/// row, or `None` when another transaction moved it first.
pub fn transition(
    conn: &mut PgConnection,
    id: Uuid,
    from: OrderStatus,
    changes: &OrderChanges,
) -> Result<Option<OrderRow>, DomainError> {
    let row = diesel::update(
        orders::table
            .filter(orders::id.eq(id))
            .filter(orders::deleted_at.is_null())
            .filter(orders::status.eq(from.as_str())),
    )
    .set(changes)
    .returning(OrderRow::as_returning())
    .get_result(conn)
    .optional()?;
    Ok(row)
}

/// Top-level pending orders whose payment window has closed.
pub fn overdue_pending(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Uuid>, DomainError> {
    let ids = orders::table
        .filter(orders::parent_id.is_null())
        .filter(orders::deleted_at.is_null())
        .filter(orders::status.eq(OrderStatus::PendingPayment.as_str()))
        .filter(orders::expires_at.lt(now))
        .order(orders::expires_at.asc())
        .limit(limit)
        .select(orders::id)
        .load(conn)?;
    Ok(ids)
}

/// Record what was delivered for a leaf order. A second delivery for the same
/// order is ignored.
pub fn record_fulfillment(
    conn: &mut PgConnection,
    order_id: Uuid,
    fulfillment_type: FulfillmentType,
    payload: &str,
    delivered_by: Option<&str>,
) -> Result<bool, DomainError> {
    let inserted = diesel::insert_into(fulfillments::table)
        .values(&NewFulfillmentRow {
            id: Uuid::new_v4(),
            order_id,
            fulfillment_type: fulfillment_type.as_str().to_string(),
            payload: payload.to_string(),
            delivered_by: delivered_by.map(str::to_string),
        })
        .on_conflict(fulfillments::order_id)
        .do_nothing()
        .execute(conn)?;
    Ok(inserted > 0)
}

pub fn fulfillment(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<FulfillmentRow>, DomainError> {
    let row = fulfillments::table
        .filter(fulfillments::order_id.eq(order_id))
        .select(FulfillmentRow::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

/// Attach buyer-supplied form data to a manual item of `order_id`.
pub fn set_manual_form(
    conn: &mut PgConnection,
    order_id: Uuid,
    item_id: Uuid,
    form: &Value,
) -> Result<bool, DomainError> {
    let updated = diesel::update(
        order_items::table
            .filter(order_items::id.eq(item_id))
            .filter(order_items::order_id.eq(order_id))
            .filter(order_items::fulfillment_type.eq(FulfillmentType::Manual.as_str())),
    )
    .set(order_items::manual_form_data.eq(Some(form.clone())))
    .execute(conn)?;
    Ok(updated > 0)
}

fn item_view(row: OrderItemRow) -> Result<OrderItemView, DomainError> {
    Ok(OrderItemView {
        id: row.id,
        product_id: row.product_id,
        sku_id: row.sku_id,
        title: row.title,
        unit_price: row.unit_price,
        quantity: row.quantity,
        coupon_discount_amount: row.coupon_discount_amount,
        promotion_discount_amount: row.promotion_discount_amount,
        total_amount: row.total_amount,
        fulfillment_type: row.fulfillment_type.parse()?,
    })
}

/// Assemble the full view of an order: items, delivery and children.
pub fn load_view(conn: &mut PgConnection, order: OrderRow) -> Result<OrderView, DomainError> {
    let items = items(conn, order.id)?
        .into_iter()
        .map(item_view)
        .collect::<Result<Vec<_>, _>>()?;
    let fulfillment = fulfillment(conn, order.id)?.map(|f| f.payload);
    let children = children(conn, order.id)?
        .into_iter()
        .map(|child| load_view(conn, child))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OrderView {
        id: order.id,
        order_no: order.order_no,
        parent_id: order.parent_id,
        user_id: order.user_id,
        status: order.status.parse()?,
        currency: order.currency,
        original_amount: order.original_amount,
        discount_amount: order.discount_amount,
        promotion_discount_amount: order.promotion_discount_amount,
        total_amount: order.total_amount,
        wallet_paid_amount: order.wallet_paid_amount,
        online_paid_amount: order.online_paid_amount,
        refunded_amount: order.refunded_amount,
        expires_at: order.expires_at,
        paid_at: order.paid_at,
        canceled_at: order.canceled_at,
        created_at: order.created_at,
        items,
        fulfillment,
        children,
    })
}
