//! Transaction and ledger domain entities.
//! Framework-agnostic representation of money movement records.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::OrderStatus;

/// Remark carried by the synthetic revenue transaction booked on success.
pub const FEE_TRANSACTION_REMARK: &str = "FEES AND CHARGES";

/// Persistence lifecycle of a record that accepts exactly one terminal mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    Draft,
    Committed,
    Terminal,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Draft => "draft",
            RecordState::Committed => "committed",
            RecordState::Terminal => "terminal",
        }
    }

    /// Next state in the lifecycle. `Terminal` has no successor.
    pub fn advance(self) -> Option<RecordState> {
        match self {
            RecordState::Draft => Some(RecordState::Committed),
            RecordState::Committed => Some(RecordState::Terminal),
            RecordState::Terminal => None,
        }
    }
}

impl FromStr for RecordState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RecordState::Draft),
            "committed" => Ok(RecordState::Committed),
            "terminal" => Ok(RecordState::Terminal),
            other => Err(format!("unknown record state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Primary,
    Fee,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Primary => "primary",
            TransactionKind::Fee => "fee",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(TransactionKind::Primary),
            "fee" => Ok(TransactionKind::Fee),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

/// Domain entity representing a transaction against a processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub merchant_id: String,
    pub processor_id: String,
    pub product: String,
    pub amount: BigDecimal,
    pub status: OrderStatus,
    pub kind: TransactionKind,
    /// Bank reference (UTR) once the processor reports one.
    pub external_reference: Option<String>,
    /// The processor's own identifier for the request (CRN/RRN/order id).
    pub processor_reference: Option<String>,
    pub remark: Option<String>,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn primary(
        order_id: Uuid,
        merchant_id: String,
        processor_id: String,
        product: String,
        amount: BigDecimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            merchant_id,
            processor_id,
            product,
            amount,
            status: OrderStatus::Processing,
            kind: TransactionKind::Primary,
            external_reference: None,
            processor_reference: None,
            remark: None,
            state: RecordState::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Revenue booking for a successful order. Created already terminal.
    pub fn fee_booking(primary: &Transaction, amount: BigDecimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id: primary.order_id,
            merchant_id: primary.merchant_id.clone(),
            processor_id: primary.processor_id.clone(),
            product: primary.product.clone(),
            amount,
            status: OrderStatus::Success,
            kind: TransactionKind::Fee,
            external_reference: primary.external_reference.clone(),
            processor_reference: None,
            remark: Some(FEE_TRANSACTION_REMARK.to_string()),
            state: RecordState::Terminal,
            created_at: now,
            updated_at: now,
        }
    }

    /// Draft to Committed, done once right before the first write.
    pub fn mark_committed(&mut self) -> Result<(), String> {
        match self.state {
            RecordState::Draft => {
                self.state = RecordState::Committed;
                Ok(())
            }
            other => Err(format!(
                "transaction {} is already {}",
                self.id,
                other.as_str()
            )),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state == RecordState::Terminal
    }

    /// Records the terminal outcome. Fails if one was already recorded.
    pub fn finalize(
        &mut self,
        status: OrderStatus,
        external_reference: Option<String>,
        remark: Option<String>,
    ) -> Result<(), String> {
        if self.state != RecordState::Committed {
            return Err(format!(
                "transaction {} is {} and cannot be finalized",
                self.id,
                self.state.as_str()
            ));
        }
        self.state = RecordState::Terminal;
        self.status = status;
        if external_reference.is_some() {
            self.external_reference = external_reference;
        }
        if remark.is_some() {
            self.remark = remark;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(Direction::Debit),
            "credit" => Ok(Direction::Credit),
            other => Err(format!("unknown ledger direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerStatus {
    Success,
    Reversed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Success => "success",
            LedgerStatus::Reversed => "reversed",
        }
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LedgerStatus::Success),
            "reversed" => Ok(LedgerStatus::Reversed),
            other => Err(format!("unknown ledger status '{}'", other)),
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance before and after a single wallet mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub opening: BigDecimal,
    pub closing: BigDecimal,
}

/// Append-only record of one wallet mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: String,
    pub order_id: Option<Uuid>,
    pub direction: Direction,
    pub status: LedgerStatus,
    pub amount: BigDecimal,
    pub opening_balance: BigDecimal,
    pub closing_balance: BigDecimal,
    pub linked_transaction_id: Option<Uuid>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        account_id: &str,
        direction: Direction,
        status: LedgerStatus,
        amount: BigDecimal,
        snapshot: BalanceSnapshot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            order_id: None,
            direction,
            status,
            amount,
            opening_balance: snapshot.opening,
            closing_balance: snapshot.closing,
            linked_transaction_id: None,
            reference: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_transaction(mut self, txn: &Transaction) -> Self {
        self.order_id = Some(txn.order_id);
        self.linked_transaction_id = Some(txn.id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Signed change this entry applied to the wallet.
    pub fn delta(&self) -> BigDecimal {
        match self.direction {
            Direction::Debit => -self.amount.clone(),
            Direction::Credit => self.amount.clone(),
        }
    }
}

/// Verifies that consecutive entries chain balance to balance.
pub fn ledger_chain_is_continuous(entries: &[LedgerEntry]) -> bool {
    entries.windows(2).all(|pair| pair[0].closing_balance == pair[1].opening_balance)
        && entries
            .iter()
            .all(|e| &e.opening_balance + e.delta() == e.closing_balance)
}

/// Credit received from the bank against a merchant's virtual account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundCredit {
    pub id: Uuid,
    pub utr: String,
    pub virtual_account: String,
    pub merchant_id: String,
    pub amount: BigDecimal,
    pub remitter_name: Option<String>,
    pub remitter_account: Option<String>,
    pub remitter_ifsc: Option<String>,
    pub created_at: DateTime<Utc>,
}
