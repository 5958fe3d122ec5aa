//! Postgres implementation of the ledger store.

use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::domain::{
    ApiAudit, ApiCredential, BalanceSnapshot, BankExchange, Beneficiary, InboundCredit,
    LedgerEntry, Merchant, Order, OrderLookup, PaymentLink, PlatformWallet, PricingBand,
    PricingOwner, Principal, ProcessorConfig, Product, RecordState, Transaction, VirtualAccount,
    Wallet,
};
use crate::ports::{LedgerStore, RepositoryError, RepositoryResult, UnitOfWork};

const ORDER_COLUMNS: &str = "id, merchant_id, client_ref_id, product, processor_id, amount, fee, \
    tax, transaction_amount, status, utr, beneficiary, payment_link, created_at, updated_at, \
    cancelled_at, cancellation_reason";

const TRANSACTION_COLUMNS: &str = "id, order_id, merchant_id, processor_id, product, amount, \
    status, kind, external_reference, processor_reference, remark, state, created_at, updated_at";

const LEDGER_COLUMNS: &str = "id, account_id, order_id, direction, status, amount, \
    opening_balance, closing_balance, linked_transaction_id, reference, created_at";

fn parse<T: FromStr<Err = String>>(value: &str) -> RepositoryResult<T> {
    value.parse::<T>().map_err(RepositoryError::Corrupt)
}

fn to_json<T: serde::Serialize>(value: &T) -> RepositoryResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| RepositoryError::Corrupt(e.to_string()))
}

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnit {
            tx,
            locked_account: None,
        }))
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn merchant(&self, merchant_id: &str) -> RepositoryResult<Option<Merchant>> {
        let row = sqlx::query_as::<_, MerchantRow>(
            "SELECT id, status, processor_id, callback_url FROM merchants WHERE id = $1",
        )
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MerchantRow::into_domain).transpose()
    }

    async fn wallet(&self, account_id: &str) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT account_id, balance, status FROM wallets WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(WalletRow::into_domain).transpose()
    }

    async fn platform_wallet(&self) -> RepositoryResult<PlatformWallet> {
        let (fee, tax): (BigDecimal, BigDecimal) =
            sqlx::query_as("SELECT fee, tax FROM platform_wallet WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(PlatformWallet { fee, tax })
    }

    async fn product(&self, code: &str) -> RepositoryResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT code, is_active, confirmation FROM products WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProductRow::into_domain).transpose()
    }

    async fn pricing_bands(
        &self,
        owner: &PricingOwner,
        product: &str,
    ) -> RepositoryResult<Vec<PricingBand>> {
        let rows = sqlx::query_as::<_, PricingRow>(
            r#"
            SELECT product, start_value, end_value, fee_type, fee, tax_type, tax
            FROM pricing_bands
            WHERE owner_kind = $1 AND owner_id = $2 AND product = $3
            ORDER BY start_value
            "#,
        )
        .bind(owner.kind())
        .bind(owner.id())
        .bind(product)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PricingRow::into_domain).collect()
    }

    async fn processors(&self) -> RepositoryResult<Vec<ProcessorConfig>> {
        let rows = sqlx::query_as::<_, ProcessorRow>(
            r#"
            SELECT name, kind, endpoint, client_id, secret_key, settings, is_active
            FROM processors
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProcessorRow::into_domain).collect()
    }

    async fn credential(&self, api_key: &str) -> RepositoryResult<Option<ApiCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT api_key, secret_hash, principal, merchant_id FROM api_credentials WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CredentialRow::into_domain).transpose()
    }

    async fn virtual_account(
        &self,
        account_number: &str,
    ) -> RepositoryResult<Option<VirtualAccount>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT account_number, merchant_id FROM virtual_accounts WHERE account_number = $1",
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(account_number, merchant_id)| VirtualAccount {
            account_number,
            merchant_id,
        }))
    }

    async fn find_order(
        &self,
        merchant_id: &str,
        lookup: &OrderLookup,
    ) -> RepositoryResult<Option<Order>> {
        let row = match lookup {
            OrderLookup::OrderRef(id) => {
                let sql = format!(
                    "SELECT {} FROM orders WHERE merchant_id = $1 AND id = $2",
                    ORDER_COLUMNS
                );
                sqlx::query_as::<_, OrderRow>(&sql)
                    .bind(merchant_id)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            OrderLookup::ClientRef(client_ref) => {
                let sql = format!(
                    "SELECT {} FROM orders WHERE merchant_id = $1 AND client_ref_id = $2",
                    ORDER_COLUMNS
                );
                sqlx::query_as::<_, OrderRow>(&sql)
                    .bind(merchant_id)
                    .bind(client_ref)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        row.map(OrderRow::into_domain).transpose()
    }

    async fn order(&self, order_id: Uuid) -> RepositoryResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderRow::into_domain).transpose()
    }

    async fn transactions(&self, order_id: Uuid) -> RepositoryResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE order_id = $1 ORDER BY created_at",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn orders_awaiting_outcome(
        &self,
        limit: i64,
        idle_since: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {} FROM orders
            WHERE status IN ('Queued', 'Processing')
              AND updated_at <= $2
              AND EXISTS (
                  SELECT 1 FROM transactions t
                  WHERE t.order_id = orders.id AND t.kind = 'primary' AND t.state = 'committed'
              )
            ORDER BY created_at ASC
            LIMIT $1
            "#,
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(limit)
            .bind(idle_since)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(OrderRow::into_domain).collect()
    }

    async fn ledger_entries(&self, account_id: &str) -> RepositoryResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE account_id = $1 ORDER BY seq ASC",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(LedgerRow::into_domain).collect()
    }

    async fn record_audit(&self, audit: &ApiAudit) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_audits (id, endpoint, merchant_id, request, response, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(audit.id)
        .bind(&audit.endpoint)
        .bind(&audit.merchant_id)
        .bind(&audit.request)
        .bind(&audit.response)
        .bind(audit.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_bank_message(&self, exchange: &BankExchange) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO bank_exchanges (id, msg_id, request, response, remark, claims_msg_id, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6)
            ON CONFLICT (msg_id) WHERE claims_msg_id DO NOTHING
            "#,
        )
        .bind(exchange.id)
        .bind(&exchange.msg_id)
        .bind(&exchange.request)
        .bind(&exchange.response)
        .bind(&exchange.remark)
        .bind(exchange.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_bank_exchange(&self, exchange: &BankExchange) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bank_exchanges (id, msg_id, request, response, remark, claims_msg_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET response = EXCLUDED.response, remark = EXCLUDED.remark
            "#,
        )
        .bind(exchange.id)
        .bind(&exchange.msg_id)
        .bind(&exchange.request)
        .bind(&exchange.response)
        .bind(&exchange.remark)
        .bind(exchange.claims_msg_id)
        .bind(exchange.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A database transaction. Rolls back on drop unless committed.
pub struct PostgresUnit {
    tx: SqlxTransaction<'static, Postgres>,
    locked_account: Option<String>,
}

impl PostgresUnit {
    fn claim_account(&mut self, account_id: &str) -> RepositoryResult<()> {
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

    async fn lock_balance(&mut self, account_id: &str) -> RepositoryResult<BigDecimal> {
        self.claim_account(account_id)?;
        let balance: Option<BigDecimal> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE account_id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        balance.ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", account_id)))
    }

    async fn write_balance(&mut self, account_id: &str, balance: &BigDecimal) -> RepositoryResult<()> {
        sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE account_id = $1")
            .bind(account_id)
            .bind(balance)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    async fn reserve(
        &mut self,
        account_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot> {
        let opening = self.lock_balance(account_id).await?;
        if &opening < amount {
            return Err(RepositoryError::InsufficientFunds {
                balance: opening,
                required: amount.clone(),
            });
        }
        let closing = &opening - amount;
        self.write_balance(account_id, &closing).await?;
        Ok(BalanceSnapshot { opening, closing })
    }

    async fn release(
        &mut self,
        account_id: &str,
        amount: &BigDecimal,
    ) -> RepositoryResult<BalanceSnapshot> {
        let opening = self.lock_balance(account_id).await?;
        let closing = &opening + amount;
        self.write_balance(account_id, &closing).await?;
        Ok(BalanceSnapshot { opening, closing })
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
        sqlx::query("UPDATE platform_wallet SET fee = fee + $1, tax = tax + $2 WHERE id = 1")
            .bind(fee_delta)
            .bind(tax_delta)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> RepositoryResult<()> {
        let sql = format!(
            "INSERT INTO ledger_entries ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            LEDGER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(entry.id)
            .bind(&entry.account_id)
            .bind(entry.order_id)
            .bind(entry.direction.as_str())
            .bind(entry.status.as_str())
            .bind(&entry.amount)
            .bind(&entry.opening_balance)
            .bind(&entry.closing_balance)
            .bind(entry.linked_transaction_id)
            .bind(&entry.reference)
            .bind(entry.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> RepositoryResult<()> {
        let sql = format!(
            "INSERT INTO orders ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            ORDER_COLUMNS
        );
        let beneficiary = to_json(&order.beneficiary)?;
        let payment_link = order.payment_link.as_ref().map(to_json).transpose()?;
        sqlx::query(&sql)
            .bind(order.id)
            .bind(&order.merchant_id)
            .bind(&order.client_ref_id)
            .bind(&order.product)
            .bind(&order.processor_id)
            .bind(&order.amount)
            .bind(&order.fee)
            .bind(&order.tax)
            .bind(&order.transaction_amount)
            .bind(order.status.as_str())
            .bind(&order.utr)
            .bind(beneficiary)
            .bind(payment_link)
            .bind(order.created_at)
            .bind(order.updated_at)
            .bind(order.cancelled_at)
            .bind(&order.cancellation_reason)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> RepositoryResult<()> {
        let payment_link = order.payment_link.as_ref().map(to_json).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, utr = $3, payment_link = $4, updated_at = $5,
                cancelled_at = $6, cancellation_reason = $7
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(&order.utr)
        .bind(payment_link)
        .bind(order.updated_at)
        .bind(order.cancelled_at)
        .bind(&order.cancellation_reason)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("order {}", order.id)));
        }
        Ok(())
    }

    async fn lock_order(&mut self, order_id: Uuid) -> RepositoryResult<Order> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.ok_or_else(|| RepositoryError::NotFound(format!("order {}", order_id)))?
            .into_domain()
    }

    async fn insert_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()> {
        if txn.state == RecordState::Draft {
            return Err(RepositoryError::Corrupt(format!(
                "transaction {} is still a draft",
                txn.id
            )));
        }
        let sql = format!(
            "INSERT INTO transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            TRANSACTION_COLUMNS
        );
        sqlx::query(&sql)
            .bind(txn.id)
            .bind(txn.order_id)
            .bind(&txn.merchant_id)
            .bind(&txn.processor_id)
            .bind(&txn.product)
            .bind(&txn.amount)
            .bind(txn.status.as_str())
            .bind(txn.kind.as_str())
            .bind(&txn.external_reference)
            .bind(&txn.processor_reference)
            .bind(&txn.remark)
            .bind(txn.state.as_str())
            .bind(txn.created_at)
            .bind(txn.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_primary_transaction(&mut self, order_id: Uuid) -> RepositoryResult<Transaction> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE order_id = $1 AND kind = 'primary' FOR UPDATE",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.ok_or_else(|| RepositoryError::NotFound(format!("transaction for order {}", order_id)))?
            .into_domain()
    }

    async fn update_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, external_reference = $3, processor_reference = $4,
                remark = $5, state = $6, updated_at = $7
            WHERE id = $1 AND state <> 'terminal'
            "#,
        )
        .bind(txn.id)
        .bind(txn.status.as_str())
        .bind(&txn.external_reference)
        .bind(&txn.processor_reference)
        .bind(&txn.remark)
        .bind(txn.state.as_str())
        .bind(txn.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::AlreadyFinalized(format!(
                "transaction {}",
                txn.id
            )));
        }
        Ok(())
    }

    async fn insert_inbound_credit(&mut self, credit: &InboundCredit) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO inbound_credits (
                id, utr, virtual_account, merchant_id, amount,
                remitter_name, remitter_account, remitter_ifsc, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (utr) DO NOTHING
            "#,
        )
        .bind(credit.id)
        .bind(&credit.utr)
        .bind(&credit.virtual_account)
        .bind(&credit.merchant_id)
        .bind(&credit.amount)
        .bind(&credit.remitter_name)
        .bind(&credit.remitter_account)
        .bind(&credit.remitter_ifsc)
        .bind(credit.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let unit = *self;
        unit.tx.commit().await?;
        Ok(())
    }
}

// Internal row types for SQLx. Not exposed outside the adapter.

#[derive(Debug, sqlx::FromRow)]
struct MerchantRow {
    id: String,
    status: String,
    processor_id: Option<String>,
    callback_url: Option<String>,
}

impl MerchantRow {
    fn into_domain(self) -> RepositoryResult<Merchant> {
        Ok(Merchant {
            id: self.id,
            status: parse(&self.status)?,
            processor_id: self.processor_id,
            callback_url: self.callback_url,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    account_id: String,
    balance: BigDecimal,
    status: String,
}

impl WalletRow {
    fn into_domain(self) -> RepositoryResult<Wallet> {
        Ok(Wallet {
            account_id: self.account_id,
            balance: self.balance,
            status: parse(&self.status)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    code: String,
    is_active: bool,
    confirmation: String,
}

impl ProductRow {
    fn into_domain(self) -> RepositoryResult<Product> {
        Ok(Product {
            code: self.code,
            is_active: self.is_active,
            confirmation: parse(&self.confirmation)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PricingRow {
    product: String,
    start_value: BigDecimal,
    end_value: BigDecimal,
    fee_type: String,
    fee: BigDecimal,
    tax_type: String,
    tax: BigDecimal,
}

impl PricingRow {
    fn into_domain(self) -> RepositoryResult<PricingBand> {
        Ok(PricingBand {
            product: self.product,
            start_value: self.start_value,
            end_value: self.end_value,
            fee_type: parse(&self.fee_type)?,
            fee: self.fee,
            tax_type: parse(&self.tax_type)?,
            tax: self.tax,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessorRow {
    name: String,
    kind: String,
    endpoint: String,
    client_id: String,
    secret_key: String,
    settings: serde_json::Value,
    is_active: bool,
}

impl ProcessorRow {
    fn into_domain(self) -> RepositoryResult<ProcessorConfig> {
        Ok(ProcessorConfig {
            name: self.name,
            kind: parse(&self.kind)?,
            endpoint: self.endpoint,
            client_id: self.client_id,
            secret_key: self.secret_key,
            settings: self.settings,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    api_key: String,
    secret_hash: String,
    principal: String,
    merchant_id: Option<String>,
}

impl CredentialRow {
    fn into_domain(self) -> RepositoryResult<ApiCredential> {
        let principal = match (self.principal.as_str(), self.merchant_id) {
            ("bank", _) => Principal::Bank,
            ("merchant", Some(merchant_id)) => Principal::Merchant(merchant_id),
            (other, _) => {
                return Err(RepositoryError::Corrupt(format!(
                    "credential {} has principal '{}'",
                    self.api_key, other
                )))
            }
        };
        Ok(ApiCredential {
            api_key: self.api_key,
            secret_hash: self.secret_hash,
            principal,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    merchant_id: String,
    client_ref_id: String,
    product: String,
    processor_id: String,
    amount: BigDecimal,
    fee: BigDecimal,
    tax: BigDecimal,
    transaction_amount: BigDecimal,
    status: String,
    utr: Option<String>,
    beneficiary: serde_json::Value,
    payment_link: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

impl OrderRow {
    fn into_domain(self) -> RepositoryResult<Order> {
        let beneficiary: Beneficiary = serde_json::from_value(self.beneficiary)
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let payment_link: Option<PaymentLink> = self
            .payment_link
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        Ok(Order {
            id: self.id,
            merchant_id: self.merchant_id,
            client_ref_id: self.client_ref_id,
            product: self.product,
            processor_id: self.processor_id,
            amount: self.amount,
            fee: self.fee,
            tax: self.tax,
            transaction_amount: self.transaction_amount,
            status: parse(&self.status)?,
            utr: self.utr,
            beneficiary,
            payment_link,
            created_at: self.created_at,
            updated_at: self.updated_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    order_id: Uuid,
    merchant_id: String,
    processor_id: String,
    product: String,
    amount: BigDecimal,
    status: String,
    kind: String,
    external_reference: Option<String>,
    processor_reference: Option<String>,
    remark: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            order_id: self.order_id,
            merchant_id: self.merchant_id,
            processor_id: self.processor_id,
            product: self.product,
            amount: self.amount,
            status: parse(&self.status)?,
            kind: parse(&self.kind)?,
            external_reference: self.external_reference,
            processor_reference: self.processor_reference,
            remark: self.remark,
            state: parse(&self.state)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    account_id: String,
    order_id: Option<Uuid>,
    direction: String,
    status: String,
    amount: BigDecimal,
    opening_balance: BigDecimal,
    closing_balance: BigDecimal,
    linked_transaction_id: Option<Uuid>,
    reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_domain(self) -> RepositoryResult<LedgerEntry> {
        Ok(LedgerEntry {
            id: self.id,
            account_id: self.account_id,
            order_id: self.order_id,
            direction: parse(&self.direction)?,
            status: parse(&self.status)?,
            amount: self.amount,
            opening_balance: self.opening_balance,
            closing_balance: self.closing_balance,
            linked_transaction_id: self.linked_transaction_id,
            reference: self.reference,
            created_at: self.created_at,
        })
    }
}
