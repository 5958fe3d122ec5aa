//! Storage ports. Every balance mutation goes through a [`UnitOfWork`].

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ApiAudit, ApiCredential, BalanceSnapshot, BankExchange, InboundCredit, LedgerEntry, Merchant,
    Order, OrderLookup, PlatformWallet, PricingBand, PricingOwner, ProcessorConfig, Product,
    Transaction, VirtualAccount, Wallet,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        balance: BigDecimal,
        required: BigDecimal,
    },

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record already finalized: {0}")]
    AlreadyFinalized(String),

    #[error("lock order violation: {0}")]
    LockOrder(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Duplicate(db.message().to_string())
            }
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Entry point to the ledger store: read-only lookups plus units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens an atomic scope. Dropping it without `commit` discards every change.
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>>;

    async fn ping(&self) -> RepositoryResult<()>;

    async fn merchant(&self, merchant_id: &str) -> RepositoryResult<Option<Merchant>>;
    async fn wallet(&self, account_id: &str) -> RepositoryResult<Option<Wallet>>;
    async fn platform_wallet(&self) -> RepositoryResult<PlatformWallet>;
    async fn product(&self, code: &str) -> RepositoryResult<Option<Product>>;
    async fn pricing_bands(
        &self,
        owner: &PricingOwner,
        product: &str,
    ) -> RepositoryResult<Vec<PricingBand>>;
    async fn processors(&self) -> RepositoryResult<Vec<ProcessorConfig>>;
    async fn credential(&self, api_key: &str) -> RepositoryResult<Option<ApiCredential>>;
    async fn virtual_account(&self, account_number: &str)
        -> RepositoryResult<Option<VirtualAccount>>;

    async fn find_order(
        &self,
        merchant_id: &str,
        lookup: &OrderLookup,
    ) -> RepositoryResult<Option<Order>>;
    async fn order(&self, order_id: Uuid) -> RepositoryResult<Option<Order>>;
    async fn transactions(&self, order_id: Uuid) -> RepositoryResult<Vec<Transaction>>;

    /// `Queued`/`Processing` orders whose primary transaction is still open and
    /// that have not changed since `idle_since`, oldest first.
    async fn orders_awaiting_outcome(
        &self,
        limit: i64,
        idle_since: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Order>>;

    /// Ledger entries for an account, oldest first.
    async fn ledger_entries(&self, account_id: &str) -> RepositoryResult<Vec<LedgerEntry>>;

    async fn record_audit(&self, audit: &ApiAudit) -> RepositoryResult<()>;

    /// Inserts an exchange that claims its `msg_id`. Returns `false` if the id was already claimed.
    async fn claim_bank_message(&self, exchange: &BankExchange) -> RepositoryResult<bool>;

    /// Inserts or updates an exchange by id.
    async fn save_bank_exchange(&self, exchange: &BankExchange) -> RepositoryResult<()>;
}

/// One atomic scope over the ledger.
///
/// At most one merchant wallet may be locked per unit, and the platform wallet
/// may only be adjusted once that wallet is held.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Locks the account and debits it. Fails with `InsufficientFunds` without changing anything.
    async fn reserve(
        &mut self,
        account_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot>;

    /// Locks the account and credits it.
    async fn release(
        &mut self,
        account_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot>;

    async fn adjust_platform(
        &mut self,
        fee_delta: &BigDecimal,
        tax_delta: &BigDecimal,
    ) -> RepositoryResult<()>;

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> RepositoryResult<()>;

    /// Fails with `Duplicate` when the merchant already used the client reference.
    async fn insert_order(&mut self, order: &Order) -> RepositoryResult<()>;
    async fn update_order(&mut self, order: &Order) -> RepositoryResult<()>;
    async fn lock_order(&mut self, order_id: Uuid) -> RepositoryResult<Order>;

    async fn insert_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()>;

    /// Locks the primary transaction of an order.
    async fn lock_primary_transaction(&mut self, order_id: Uuid) -> RepositoryResult<Transaction>;

    /// Writes a still-open transaction back. Fails with `AlreadyFinalized`
    /// when the stored copy is already terminal.
    async fn update_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()>;

    /// Returns `false` when the UTR was already credited.
    async fn insert_inbound_credit(&mut self, credit: &InboundCredit) -> RepositoryResult<bool>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}
