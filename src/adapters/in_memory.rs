//! In-process implementation of the ledger store.
//!
//! A unit of work holds the store mutex for its whole lifetime and edits a
//! staged copy of the state, so an uncommitted unit leaves nothing behind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    ApiAudit, ApiCredential, BalanceSnapshot, BankExchange, InboundCredit, LedgerEntry, Merchant,
    Order, OrderLookup, PlatformWallet, PricingBand, PricingOwner, ProcessorConfig, Product,
    RecordState, Transaction, TransactionKind, VirtualAccount, Wallet,
};
use crate::ports::{LedgerStore, RepositoryError, RepositoryResult, UnitOfWork};

#[derive(Default, Clone)]
struct MemoryState {
    merchants: HashMap<String, Merchant>,
    wallets: HashMap<String, Wallet>,
    platform: PlatformWallet,
    products: HashMap<String, Product>,
    pricing: HashMap<(PricingOwner, String), Vec<PricingBand>>,
    processors: HashMap<String, ProcessorConfig>,
    credentials: HashMap<String, ApiCredential>,
    virtual_accounts: HashMap<String, VirtualAccount>,
    orders: Vec<Order>,
    transactions: Vec<Transaction>,
    ledger: Vec<LedgerEntry>,
    inbound_credits: Vec<InboundCredit>,
    audits: Vec<ApiAudit>,
    bank_exchanges: Vec<BankExchange>,
}

impl MemoryState {
    fn primary_transaction(&self, order_id: Uuid) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|t| t.order_id == order_id && t.kind == TransactionKind::Primary)
    }
}

/// Thread-safe in-memory ledger store for tests and local runs.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_merchant(&self, merchant: Merchant) {
        self.state
            .lock()
            .await
            .merchants
            .insert(merchant.id.clone(), merchant);
    }

    pub async fn seed_wallet(&self, wallet: Wallet) {
        self.state
            .lock()
            .await
            .wallets
            .insert(wallet.account_id.clone(), wallet);
    }

    pub async fn seed_product(&self, product: Product) {
        self.state
            .lock()
            .await
            .products
            .insert(product.code.clone(), product);
    }

    pub async fn seed_pricing(&self, owner: PricingOwner, band: PricingBand) {
        self.state
            .lock()
            .await
            .pricing
            .entry((owner, band.product.clone()))
            .or_default()
            .push(band);
    }

    pub async fn seed_processor(&self, config: ProcessorConfig) {
        self.state
            .lock()
            .await
            .processors
            .insert(config.name.clone(), config);
    }

    pub async fn seed_credential(&self, credential: ApiCredential) {
        self.state
            .lock()
            .await
            .credentials
            .insert(credential.api_key.clone(), credential);
    }

    pub async fn seed_virtual_account(&self, account: VirtualAccount) {
        self.state
            .lock()
            .await
            .virtual_accounts
            .insert(account.account_number.clone(), account);
    }

    pub async fn audits(&self) -> Vec<ApiAudit> {
        self.state.lock().await.audits.clone()
    }

    pub async fn bank_exchanges(&self) -> Vec<BankExchange> {
        self.state.lock().await.bank_exchanges.clone()
    }

    pub async fn inbound_credits(&self) -> Vec<InboundCredit> {
        self.state.lock().await.inbound_credits.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnit {
            guard,
            staged,
            locked_account: None,
        }))
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }

    async fn merchant(&self, merchant_id: &str) -> RepositoryResult<Option<Merchant>> {
        Ok(self.state.lock().await.merchants.get(merchant_id).cloned())
    }

    async fn wallet(&self, account_id: &str) -> RepositoryResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(account_id).cloned())
    }

    async fn platform_wallet(&self) -> RepositoryResult<PlatformWallet> {
        Ok(self.state.lock().await.platform.clone())
    }

    async fn product(&self, code: &str) -> RepositoryResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(code).cloned())
    }

    async fn pricing_bands(
        &self,
        owner: &PricingOwner,
        product: &str,
    ) -> RepositoryResult<Vec<PricingBand>> {
        let state = self.state.lock().await;
        Ok(state
            .pricing
            .get(&(owner.clone(), product.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn processors(&self) -> RepositoryResult<Vec<ProcessorConfig>> {
        let state = self.state.lock().await;
        let mut configs: Vec<ProcessorConfig> = state.processors.values().cloned().collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn credential(&self, api_key: &str) -> RepositoryResult<Option<ApiCredential>> {
        Ok(self.state.lock().await.credentials.get(api_key).cloned())
    }

    async fn virtual_account(
        &self,
        account_number: &str,
    ) -> RepositoryResult<Option<VirtualAccount>> {
        Ok(self
            .state
            .lock()
            .await
            .virtual_accounts
            .get(account_number)
            .cloned())
    }

    async fn find_order(
        &self,
        merchant_id: &str,
        lookup: &OrderLookup,
    ) -> RepositoryResult<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.merchant_id == merchant_id)
            .find(|o| match lookup {
                OrderLookup::OrderRef(id) => &o.id == id,
                OrderLookup::ClientRef(client_ref) => &o.client_ref_id == client_ref,
            })
            .cloned())
    }

    async fn order(&self, order_id: Uuid) -> RepositoryResult<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn transactions(&self, order_id: Uuid) -> RepositoryResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn orders_awaiting_outcome(
        &self,
        limit: i64,
        idle_since: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.status.awaits_outcome() && o.updated_at <= idle_since)
            .filter(|o| {
                state
                    .primary_transaction(o.id)
                    .map(|t| t.state == RecordState::Committed)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders.truncate(limit.max(0) as usize);
        Ok(orders)
    }

    async fn ledger_entries(&self, account_id: &str) -> RepositoryResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn record_audit(&self, audit: &ApiAudit) -> RepositoryResult<()> {
        self.state.lock().await.audits.push(audit.clone());
        Ok(())
    }

    async fn claim_bank_message(&self, exchange: &BankExchange) -> RepositoryResult<bool> {
        let mut state = self.state.lock().await;
        if let Some(msg_id) = &exchange.msg_id {
            let taken = state
                .bank_exchanges
                .iter()
                .any(|e| e.claims_msg_id && e.msg_id.as_ref() == Some(msg_id));
            if taken {
                return Ok(false);
            }
        }
        state.bank_exchanges.push(exchange.clone());
        Ok(true)
    }

    async fn save_bank_exchange(&self, exchange: &BankExchange) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        match state.bank_exchanges.iter_mut().find(|e| e.id == exchange.id) {
            Some(existing) => *existing = exchange.clone(),
            None => state.bank_exchanges.push(exchange.clone()),
        }
        Ok(())
    }
}

/// Unit of work over a staged copy of the in-memory state.
pub struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    locked_account: Option<String>,
}

impl MemoryUnit {
    fn lock_account(&mut self, account_id: &str) -> RepositoryResult<()> {
        match &self.locked_account {
            Some(held) if held != account_id => Err(RepositoryError::LockOrder(format!(
                "wallet {} requested while {} is held",
                account_id, held
            ))),
            Some(_) => Ok(()),
            None => {
                self.locked_account = Some(account_id.to_string());
                Ok(())
            }
        }
    }

    fn wallet_mut(&mut self, account_id: &str) -> RepositoryResult<&mut Wallet> {
        self.staged
            .wallets
            .get_mut(account_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", account_id)))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn reserve(
        &mut self,
        account_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot> {
        self.lock_account(account_id)?;
        let wallet = self.wallet_mut(account_id)?;
        if &wallet.balance < amount {
            return Err(RepositoryError::InsufficientFunds {
                balance: wallet.balance.clone(),
                required: amount.clone(),
            });
        }
        let opening = wallet.balance.clone();
        wallet.balance = &opening - amount;
        Ok(BalanceSnapshot {
            opening,
            closing: wallet.balance.clone(),
        })
    }

    async fn release(
        &mut self,
        account_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot> {
        self.lock_account(account_id)?;
        let wallet = self.wallet_mut(account_id)?;
        let opening = wallet.balance.clone();
        wallet.balance = &opening + amount;
        Ok(BalanceSnapshot {
            opening,
            closing: wallet.balance.clone(),
        })
    }

    async fn adjust_platform(
        &mut self,
        fee_delta: &BigDecimal,
        tax_delta: &BigDecimal,
    ) -> RepositoryResult<()> {
        if self.locked_account.is_none() {
            return Err(RepositoryError::LockOrder(
                "platform wallet adjusted before a merchant wallet was locked".to_string(),
            ));
        }
        let platform = &mut self.staged.platform;
        platform.fee = &platform.fee + fee_delta;
        platform.tax = &platform.tax + tax_delta;
        Ok(())
    }

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> RepositoryResult<()> {
        self.staged.ledger.push(entry.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> RepositoryResult<()> {
        let duplicate = self.staged.orders.iter().any(|o| {
            o.id == order.id
                || (o.merchant_id == order.merchant_id && o.client_ref_id == order.client_ref_id)
        });
        if duplicate {
            return Err(RepositoryError::Duplicate(format!(
                "client reference {} for merchant {}",
                order.client_ref_id, order.merchant_id
            )));
        }
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> RepositoryResult<()> {
        let existing = self
            .staged
            .orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order.id)))?;
        *existing = order.clone();
        Ok(())
    }

    async fn lock_order(&mut self, order_id: Uuid) -> RepositoryResult<Order> {
        self.staged
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order_id)))
    }

    async fn insert_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()> {
        if txn.state == RecordState::Draft {
            return Err(RepositoryError::Corrupt(format!(
                "transaction {} is still a draft",
                txn.id
            )));
        }
        if self.staged.transactions.iter().any(|t| t.id == txn.id) {
            return Err(RepositoryError::Duplicate(format!("transaction {}", txn.id)));
        }
        self.staged.transactions.push(txn.clone());
        Ok(())
    }

    async fn lock_primary_transaction(&mut self, order_id: Uuid) -> RepositoryResult<Transaction> {
        self.staged
            .primary_transaction(order_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction for order {}", order_id)))
    }

    async fn update_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()> {
        let existing = self
            .staged
            .transactions
            .iter_mut()
            .find(|t| t.id == txn.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", txn.id)))?;
        if existing.state == RecordState::Terminal {
            return Err(RepositoryError::AlreadyFinalized(format!(
                "transaction {}",
                txn.id
            )));
        }
        *existing = txn.clone();
        Ok(())
    }

    async fn insert_inbound_credit(&mut self, credit: &InboundCredit) -> RepositoryResult<bool> {
        if self.staged.inbound_credits.iter().any(|c| c.utr == credit.utr) {
            return Ok(false);
        }
        self.staged.inbound_credits.push(credit.clone());
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let MemoryUnit {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
