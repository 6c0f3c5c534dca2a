use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::checkout::Checkout;
use crate::application::order_lifecycle::OrderLifecycle;
use crate::application::reconciliation::ReconciliationProcessor;
use crate::domain::errors::DomainError;
use crate::domain::order::{
    CheckoutLine, CheckoutReceipt, CheckoutRequest, OrderItemView, OrderOwner, OrderView,
};
use crate::domain::payment::ProviderType;
use crate::errors::AppError;

use super::payments::PaymentResponse;
use super::parse_amount;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutLineRequest {
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub quantity: i32,
}

/// Either `user_id` or both guest fields must be present.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutBody {
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub guest_password: Option<String>,
    pub lines: Vec<CheckoutLineRequest>,
    pub coupon_code: Option<String>,
    pub affiliate_code: Option<String>,
    #[serde(default)]
    pub use_wallet: bool,
}

impl TryFrom<CheckoutBody> for CheckoutRequest {
    type Error = DomainError;

    fn try_from(body: CheckoutBody) -> Result<Self, Self::Error> {
        let owner = match (body.user_id, body.guest_email, body.guest_password) {
            (Some(user_id), None, None) => OrderOwner::User(user_id),
            (None, Some(email), Some(password)) => OrderOwner::Guest { email, password },
            _ => {
                return Err(DomainError::InvalidInput(
                    "provide either user_id or guest_email with guest_password".into(),
                ))
            }
        };
        if body.use_wallet && matches!(owner, OrderOwner::Guest { .. }) {
            return Err(DomainError::InvalidInput("guests have no wallet".into()));
        }
        Ok(CheckoutRequest {
            owner,
            lines: body
                .lines
                .into_iter()
                .map(|l| CheckoutLine {
                    product_id: l.product_id,
                    sku_id: l.sku_id,
                    quantity: l.quantity,
                })
                .collect(),
            coupon_code: body.coupon_code,
            affiliate_code: body.affiliate_code,
            use_wallet: body.use_wallet,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub id: Uuid,
    pub order_no: String,
    pub status: String,
    pub total_amount: String,
    pub wallet_paid_amount: String,
    /// Remainder to be paid online; "0.00" when the wallet covered it.
    pub amount_due: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CheckoutReceipt> for CheckoutResponse {
    fn from(r: CheckoutReceipt) -> Self {
        CheckoutResponse {
            id: r.order_id,
            order_no: r.order_no,
            status: r.status.as_str().to_string(),
            total_amount: r.total_amount.to_string(),
            wallet_paid_amount: r.wallet_paid_amount.to_string(),
            amount_due: r.amount_due.to_string(),
            expires_at: r.expires_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub title: String,
    pub unit_price: String,
    pub quantity: i32,
    pub coupon_discount_amount: String,
    pub promotion_discount_amount: String,
    pub total_amount: String,
    pub fulfillment_type: String,
}

impl From<OrderItemView> for OrderItemResponse {
    fn from(i: OrderItemView) -> Self {
        OrderItemResponse {
            id: i.id,
            product_id: i.product_id,
            sku_id: i.sku_id,
            title: i.title,
            unit_price: i.unit_price.to_string(),
            quantity: i.quantity,
            coupon_discount_amount: i.coupon_discount_amount.to_string(),
            promotion_discount_amount: i.promotion_discount_amount.to_string(),
            total_amount: i.total_amount.to_string(),
            fulfillment_type: i.fulfillment_type.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_no: String,
    pub parent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: String,
    pub currency: String,
    pub original_amount: String,
    pub discount_amount: String,
    pub promotion_discount_amount: String,
    pub total_amount: String,
    pub wallet_paid_amount: String,
    pub online_paid_amount: String,
    pub refunded_amount: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
    /// Delivered secrets or manual delivery text.
    pub fulfillment: Option<String>,
    /// Child orders of a split order.
    #[schema(no_recursion)]
    pub children: Vec<OrderResponse>,
}

impl From<OrderView> for OrderResponse {
    fn from(o: OrderView) -> Self {
        OrderResponse {
            id: o.id,
            order_no: o.order_no,
            parent_id: o.parent_id,
            user_id: o.user_id,
            status: o.status.as_str().to_string(),
            currency: o.currency,
            original_amount: o.original_amount.to_string(),
            discount_amount: o.discount_amount.to_string(),
            promotion_discount_amount: o.promotion_discount_amount.to_string(),
            total_amount: o.total_amount.to_string(),
            wallet_paid_amount: o.wallet_paid_amount.to_string(),
            online_paid_amount: o.online_paid_amount.to_string(),
            refunded_amount: o.refunded_amount.to_string(),
            expires_at: o.expires_at,
            paid_at: o.paid_at,
            canceled_at: o.canceled_at,
            created_at: o.created_at,
            items: o.items.into_iter().map(OrderItemResponse::from).collect(),
            fulfillment: o.fulfillment,
            children: o.children.into_iter().map(OrderResponse::from).collect(),
        }
    }
}

/// Result of a state-changing call. `changed` is false when the order was
/// already past the requested transition.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionResponse {
    pub order_no: String,
    pub changed: bool,
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartPaymentRequest {
    /// One of official, epay, paypal, stripe, crypto.
    pub provider: String,
    /// Provider-specific channel, e.g. "alipay" or "usdt".
    pub channel: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GuestAccessRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeliverRequest {
    pub payload: String,
    pub delivered_by: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualFormRequest {
    /// Buyer answers, stored as given.
    #[schema(value_type = Object)]
    pub form: serde_json::Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Decimal string. Omit to refund everything still refundable.
    pub amount: Option<String>,
}

/// Run `action` then report the order's resulting status.
async fn transition<F>(
    lifecycle: web::Data<OrderLifecycle>,
    order_no: String,
    action: F,
) -> Result<HttpResponse, AppError>
where
    F: FnOnce(&OrderLifecycle, &str) -> Result<bool, DomainError> + Send + 'static,
{
    let response = web::block(move || {
        let changed = action(lifecycle.get_ref(), order_no.as_str())?;
        let order = lifecycle.get(&order_no)?;
        Ok::<_, DomainError>(TransitionResponse {
            order_no,
            changed,
            status: order.status.as_str().to_string(),
        })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(response))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Prices the cart, claims the coupon, reserves stock or secrets and writes
/// the order tree in one transaction. With `use_wallet` the balance is spent
/// first; an order the wallet fully covers comes back already paid.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CheckoutBody,
    responses(
        (status = 201, description = "Order placed", body = CheckoutResponse),
        (status = 400, description = "Invalid cart"),
        (status = 409, description = "Out of stock, coupon unavailable or wallet too low"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    checkout: web::Data<Checkout>,
    body: web::Json<CheckoutBody>,
) -> Result<HttpResponse, AppError> {
    let request = CheckoutRequest::try_from(body.into_inner())?;

    let receipt = web::block(move || checkout.place(request))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(CheckoutResponse::from(receipt)))
}

/// GET /orders/{order_no}
///
/// Returns the order with its items and, for split orders, its children.
/// Delivered goods of a guest order are only returned by guest-access.
#[utoipa::path(
    get,
    path = "/orders/{order_no}",
    params(
        ("order_no" = String, Path, description = "Order number"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let order_no = path.into_inner();

    let order = web::block(move || lifecycle.get(&order_no))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    let order = if order.is_guest() {
        order.without_fulfillment()
    } else {
        order
    };

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{order_no}/guest-access
///
/// Guest order lookup. A wrong email or password reads as not found.
#[utoipa::path(
    post,
    path = "/orders/{order_no}/guest-access",
    params(
        ("order_no" = String, Path, description = "Order number"),
    ),
    request_body = GuestAccessRequest,
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn guest_access(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<String>,
    body: web::Json<GuestAccessRequest>,
) -> Result<HttpResponse, AppError> {
    let order_no = path.into_inner();
    let body = body.into_inner();

    let order = web::block(move || {
        lifecycle.verify_guest_access(&order_no, &body.email, &body.password)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /orders/{order_no}/cancel
///
/// Cancels an unpaid order and returns everything it held.
#[utoipa::path(
    post,
    path = "/orders/{order_no}/cancel",
    params(
        ("order_no" = String, Path, description = "Order number"),
    ),
    responses(
        (status = 200, description = "Cancel applied or already past pending", body = TransitionResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    transition(lifecycle, path.into_inner(), |l, no| l.cancel(no)).await
}

/// POST /orders/{order_no}/payments
///
/// Opens a payment attempt for the amount still due.
#[utoipa::path(
    post,
    path = "/orders/{order_no}/payments",
    params(
        ("order_no" = String, Path, description = "Order number"),
    ),
    request_body = StartPaymentRequest,
    responses(
        (status = 201, description = "Payment opened", body = PaymentResponse),
        (status = 400, description = "Unknown or unconfigured provider"),
        (status = 409, description = "Order is not payable"),
        (status = 502, description = "Provider call failed"),
    ),
    tag = "orders"
)]
pub async fn start_payment(
    processor: web::Data<ReconciliationProcessor>,
    path: web::Path<String>,
    body: web::Json<StartPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let order_no = path.into_inner();
    let body = body.into_inner();
    let provider: ProviderType = body.provider.parse()?;

    let payment = web::block(move || {
        processor.start_order_payment(&order_no, provider, &body.channel)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(PaymentResponse::from(payment)))
}

/// POST /orders/{order_no}/confirm
///
/// Buyer confirms receipt of a delivered order.
#[utoipa::path(
    post,
    path = "/orders/{order_no}/confirm",
    params(
        ("order_no" = String, Path, description = "Order number"),
    ),
    responses(
        (status = 200, description = "Confirmation applied or not applicable", body = TransitionResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn confirm_order(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    transition(lifecycle, path.into_inner(), |l, no| l.confirm_receipt(no)).await
}

/// POST /orders/{order_no}/deliver
///
/// Operator delivery of a paid manual order.
#[utoipa::path(
    post,
    path = "/orders/{order_no}/deliver",
    params(
        ("order_no" = String, Path, description = "Leaf order number"),
    ),
    request_body = DeliverRequest,
    responses(
        (status = 200, description = "Delivery recorded or already delivered", body = TransitionResponse),
        (status = 400, description = "Empty payload or split parent"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn deliver_order(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<String>,
    body: web::Json<DeliverRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    transition(lifecycle, path.into_inner(), move |l, no| {
        l.deliver_manual(no, &body.payload, body.delivered_by.as_deref())
    })
    .await
}

/// POST /orders/{order_no}/refund
#[utoipa::path(
    post,
    path = "/orders/{order_no}/refund",
    params(
        ("order_no" = String, Path, description = "Top-level order number"),
    ),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund applied", body = TransitionResponse),
        (status = 400, description = "Amount out of range or order unpaid"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn refund_order(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<String>,
    body: web::Json<RefundRequest>,
) -> Result<HttpResponse, AppError> {
    let amount = body.into_inner().amount.as_deref().map(parse_amount).transpose()?;
    transition(lifecycle, path.into_inner(), move |l, no| l.refund(no, amount)).await
}

/// POST /orders/{order_no}/items/{item_id}/form
///
/// Stores the buyer's form answers on a manual item.
#[utoipa::path(
    post,
    path = "/orders/{order_no}/items/{item_id}/form",
    params(
        ("order_no" = String, Path, description = "Order number"),
        ("item_id" = Uuid, Path, description = "Order item UUID"),
    ),
    request_body = ManualFormRequest,
    responses(
        (status = 204, description = "Form stored"),
        (status = 400, description = "Order no longer accepts forms"),
        (status = 404, description = "Order or item not found"),
    ),
    tag = "orders"
)]
pub async fn submit_form(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<(String, Uuid)>,
    body: web::Json<ManualFormRequest>,
) -> Result<HttpResponse, AppError> {
    let (order_no, item_id) = path.into_inner();
    let form = body.into_inner().form;

    web::block(move || lifecycle.submit_manual_form(&order_no, item_id, form))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> CheckoutBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn user_checkout_body_maps_to_user_owner() {
        let user = Uuid::new_v4();
        let request = CheckoutRequest::try_from(body(serde_json::json!({
            "user_id": user,
            "lines": [{ "product_id": Uuid::new_v4(), "quantity": 2 }],
            "use_wallet": true
        })))
        .unwrap();
        assert!(matches!(request.owner, OrderOwner::User(id) if id == user));
        assert_eq!(request.lines[0].quantity, 2);
        assert!(request.lines[0].sku_id.is_none());
        assert!(request.use_wallet);
    }

    #[test]
    fn guest_needs_email_and_password() {
        let ok = CheckoutRequest::try_from(body(serde_json::json!({
            "guest_email": "a@b.example",
            "guest_password": "pw",
            "lines": []
        })));
        assert!(matches!(ok.unwrap().owner, OrderOwner::Guest { .. }));

        let missing = CheckoutRequest::try_from(body(serde_json::json!({
            "guest_email": "a@b.example",
            "lines": []
        })));
        assert!(matches!(missing, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn owner_must_be_unambiguous() {
        let both = CheckoutRequest::try_from(body(serde_json::json!({
            "user_id": Uuid::new_v4(),
            "guest_email": "a@b.example",
            "guest_password": "pw",
            "lines": []
        })));
        assert!(matches!(both, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn guests_cannot_spend_a_wallet() {
        let request = CheckoutRequest::try_from(body(serde_json::json!({
            "guest_email": "a@b.example",
            "guest_password": "pw",
            "lines": [],
            "use_wallet": true
        })));
        assert!(matches!(request, Err(DomainError::InvalidInput(_))));
    }
}
