use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::wallet::{WalletSummary, WalletTransactionView};
use crate::infrastructure::wallet_ledger;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct WalletService {
    pool: DbPool,
}

impl WalletService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Balance plus the most recent movements.
    pub fn summary(&self, user_id: Uuid) -> Result<WalletSummary, DomainError> {
        let mut conn = self.pool.get()?;
        Ok(WalletSummary {
            user_id,
            balance: wallet_ledger::balance(&mut conn, user_id)?,
            transactions: wallet_ledger::transactions(&mut conn, user_id, DEFAULT_PAGE_SIZE, 0)?,
        })
    }

    /// One page of movements, newest first. `page` starts at 1.
    pub fn transactions(
        &self,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Vec<WalletTransactionView>, DomainError> {
        if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(DomainError::InvalidInput(format!(
                "page must be >= 1 and limit within 1..={}",
                MAX_PAGE_SIZE
            )));
        }
        let mut conn = self.pool.get()?;
        wallet_ledger::transactions(&mut conn, user_id, limit, (page - 1) * limit)
    }
}
