use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::{
    affiliate_commissions, affiliate_profiles, affiliate_withdraw_requests, card_secrets,
    commerce_order_outbox, coupons, fulfillments, order_items, orders, payments, product_skus,
    products, wallet_accounts, wallet_recharges, wallet_transactions,
};

// ── Catalog ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub title: String,
    pub price: BigDecimal,
    pub promotion_price: Option<BigDecimal>,
    pub fulfillment_type: String,
    pub manual_stock_total: i32,
    pub manual_stock_locked: i32,
    pub manual_stock_sold: i32,
    pub is_active: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProductRow {
    pub id: Uuid,
    pub title: String,
    pub price: BigDecimal,
    pub promotion_price: Option<BigDecimal>,
    pub fulfillment_type: String,
    pub manual_stock_total: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = product_skus)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductSkuRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_code: String,
    pub price: Option<BigDecimal>,
    pub manual_stock_total: i32,
    pub manual_stock_locked: i32,
    pub manual_stock_sold: i32,
    pub is_active: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = product_skus)]
pub struct NewProductSkuRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_code: String,
    pub price: Option<BigDecimal>,
    pub manual_stock_total: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = card_secrets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CardSecretRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub secret: String,
    pub status: String,
    pub order_id: Option<Uuid>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = card_secrets)]
pub struct NewCardSecretRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub secret: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = coupons)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CouponRow {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub min_order_amount: BigDecimal,
    pub usage_limit: i32,
    pub used_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = coupons)]
pub struct NewCouponRow {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub min_order_amount: BigDecimal,
    pub usage_limit: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub order_no: String,
    pub parent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub guest_password_hash: Option<String>,
    pub status: String,
    pub currency: String,
    pub original_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub promotion_discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub wallet_paid_amount: BigDecimal,
    pub online_paid_amount: BigDecimal,
    pub refunded_amount: BigDecimal,
    pub coupon_id: Option<Uuid>,
    pub affiliate_profile_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub order_no: String,
    pub parent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub guest_password_hash: Option<String>,
    pub status: String,
    pub currency: String,
    pub original_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub promotion_discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub coupon_id: Option<Uuid>,
    pub affiliate_profile_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, Associations,
)]
#[diesel(table_name = order_items)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub title: String,
    pub sku_code: Option<String>,
    pub unit_price: BigDecimal,
    pub quantity: i32,
    pub coupon_discount_amount: BigDecimal,
    pub promotion_discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub fulfillment_type: String,
    pub manual_form_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = order_items)]
pub struct NewOrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub title: String,
    pub sku_code: Option<String>,
    pub unit_price: BigDecimal,
    pub quantity: i32,
    pub coupon_discount_amount: BigDecimal,
    pub promotion_discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub fulfillment_type: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = fulfillments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FulfillmentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub fulfillment_type: String,
    pub payload: String,
    pub delivered_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = fulfillments)]
pub struct NewFulfillmentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub fulfillment_type: String,
    pub payload: String,
    pub delivered_by: Option<String>,
}

// ── Payments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentRow {
    pub id: Uuid,
    pub payment_no: String,
    pub order_id: Option<Uuid>,
    pub recharge_id: Option<Uuid>,
    pub provider_type: String,
    pub channel_type: String,
    pub interaction_mode: String,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub currency: String,
    pub status: String,
    pub provider_ref: Option<String>,
    pub pay_url: Option<String>,
    pub provider_payload: Option<Value>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPaymentRow {
    pub id: Uuid,
    pub payment_no: String,
    pub order_id: Option<Uuid>,
    pub recharge_id: Option<Uuid>,
    pub provider_type: String,
    pub channel_type: String,
    pub interaction_mode: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = wallet_recharges)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletRechargeRow {
    pub id: Uuid,
    pub recharge_no: String,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wallet_recharges)]
pub struct NewWalletRechargeRow {
    pub id: Uuid,
    pub recharge_no: String,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
}

// ── Wallet ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = wallet_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletAccountRow {
    pub user_id: Uuid,
    pub balance: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = wallet_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletTransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub txn_type: String,
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub reference: String,
    pub order_id: Option<Uuid>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wallet_transactions)]
pub struct NewWalletTransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub txn_type: String,
    pub amount: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub reference: String,
    pub order_id: Option<Uuid>,
    pub remark: Option<String>,
}

// ── Affiliate ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = affiliate_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AffiliateProfileRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub commission_rate: BigDecimal,
    pub is_active: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = affiliate_profiles)]
pub struct NewAffiliateProfileRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub commission_rate: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = affiliate_commissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AffiliateCommissionRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub profile_id: Uuid,
    pub commission_type: String,
    pub base_amount: BigDecimal,
    pub rate: BigDecimal,
    pub amount: BigDecimal,
    pub status: String,
    pub confirm_at: DateTime<Utc>,
    pub available_at: Option<DateTime<Utc>>,
    pub withdraw_request_id: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = affiliate_commissions)]
pub struct NewAffiliateCommissionRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub profile_id: Uuid,
    pub commission_type: String,
    pub base_amount: BigDecimal,
    pub rate: BigDecimal,
    pub amount: BigDecimal,
    pub status: String,
    pub confirm_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = affiliate_withdraw_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WithdrawRequestRow {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub amount: BigDecimal,
    pub channel: String,
    pub account: Option<String>,
    pub status: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = affiliate_withdraw_requests)]
pub struct NewWithdrawRequestRow {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub amount: BigDecimal,
    pub channel: String,
    pub account: Option<String>,
    pub status: String,
}

// ── Outbox ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = commerce_order_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = commerce_order_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}
