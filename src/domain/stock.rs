use std::fmt;

use uuid::Uuid;

use super::order::FulfillmentType;

/// `manual_stock_total` value meaning "unlimited, no tracking".
pub const UNLIMITED_STOCK: i32 = -1;

/// Which counter row a stock operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockTarget {
    Product(Uuid),
    Sku(Uuid),
}

impl StockTarget {
    pub fn new(product_id: Uuid, sku_id: Option<Uuid>) -> Self {
        match sku_id {
            Some(sku_id) => StockTarget::Sku(sku_id),
            None => StockTarget::Product(product_id),
        }
    }
}

impl fmt::Display for StockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockTarget::Product(id) => write!(f, "product {}", id),
            StockTarget::Sku(id) => write!(f, "sku {}", id),
        }
    }
}

/// Result of a conditional stock update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOutcome {
    /// One row matched the guard and was updated.
    Applied,
    /// Target is unlimited; nothing was written.
    Unlimited,
    /// The guard rejected the update (or the target does not exist).
    Insufficient,
}

/// What is left to sell of a product or one of its SKUs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub fulfillment_type: FulfillmentType,
    /// Reservable units (manual) or available secrets (auto); `None` is unlimited.
    pub available: Option<i64>,
}

/// Manual stock counters as stored.
///
/// `total` is the remaining unlocked and unsold quantity: reserving moves
/// units from `total` to `locked`, consuming moves them from `locked` to
/// `sold`. The methods below mirror the guards of the SQL updates in the
/// stock ledger and return `None` where the guard would match zero rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockCounters {
    pub total: i32,
    pub locked: i32,
    pub sold: i32,
}

impl StockCounters {
    pub fn new(total: i32, locked: i32, sold: i32) -> Self {
        Self { total, locked, sold }
    }

    pub fn is_unlimited(&self) -> bool {
        self.total == UNLIMITED_STOCK
    }

    /// Units a checkout can still reserve, `None` when unlimited.
    pub fn available(&self) -> Option<i32> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.total)
        }
    }

    pub fn reserve(&self, qty: i32) -> Option<StockCounters> {
        if self.is_unlimited() {
            return Some(*self);
        }
        if qty <= 0 || self.total < qty {
            return None;
        }
        Some(StockCounters::new(self.total - qty, self.locked + qty, self.sold))
    }

    pub fn release(&self, qty: i32) -> Option<StockCounters> {
        if self.is_unlimited() {
            return Some(*self);
        }
        if qty <= 0 || self.locked < qty {
            return None;
        }
        Some(StockCounters::new(self.total + qty, self.locked - qty, self.sold))
    }

    /// Converts a reservation into a sale. When fewer than `qty` units are
    /// locked the shortfall is taken from `total` directly.
    pub fn consume(&self, qty: i32) -> Option<StockCounters> {
        if self.is_unlimited() {
            return Some(*self);
        }
        if qty <= 0 {
            return None;
        }
        if self.locked >= qty {
            return Some(StockCounters::new(self.total, self.locked - qty, self.sold + qty));
        }
        if self.total + self.locked >= qty {
            return Some(StockCounters::new(
                self.total + self.locked - qty,
                0,
                self.sold + qty,
            ));
        }
        None
    }
}
