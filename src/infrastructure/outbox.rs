use diesel::prelude::*;
use diesel::PgConnection;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::schema::commerce_order_outbox;

use super::models::{NewOutboxEventRow, OrderRow};

/// Debezium's EventRouter SMT derives the Kafka topic from `aggregate_type`.
pub const ORDER_AGGREGATE: &str = "Order";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    Created,
    Paid,
    Delivered,
    Completed,
    Canceled,
    Expired,
    Refunded,
}

impl OrderEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEvent::Created => "OrderCreated",
            OrderEvent::Paid => "OrderPaid",
            OrderEvent::Delivered => "OrderDelivered",
            OrderEvent::Completed => "OrderCompleted",
            OrderEvent::Canceled => "OrderCanceled",
            OrderEvent::Expired => "OrderExpired",
            OrderEvent::Refunded => "OrderRefunded",
        }
    }
}

/// Insert an outbox event for `order`. Must run inside the transaction that
/// changed the order so the event and the state change commit together.
pub fn record(
    conn: &mut PgConnection,
    event: OrderEvent,
    order: &OrderRow,
    extra: Option<Value>,
) -> Result<(), DomainError> {
    let mut payload = json!({
        "event": event.as_str(),
        "order_id": order.id,
        "order_no": order.order_no,
        "parent_id": order.parent_id,
        "user_id": order.user_id,
        "status": order.status,
        "currency": order.currency,
        "total_amount": order.total_amount.to_string(),
        "wallet_paid_amount": order.wallet_paid_amount.to_string(),
        "online_paid_amount": order.online_paid_amount.to_string(),
        "refunded_amount": order.refunded_amount.to_string(),
    });
    if let (Some(Value::Object(extra)), Value::Object(body)) = (extra, &mut payload) {
        body.extend(extra);
    }

    diesel::insert_into(commerce_order_outbox::table)
        .values(&NewOutboxEventRow {
            id: Uuid::new_v4(),
            aggregate_type: ORDER_AGGREGATE.to_string(),
            aggregate_id: order.id.to_string(),
            event_type: event.as_str().to_string(),
            payload,
        })
        .execute(conn)?;
    Ok(())
}
