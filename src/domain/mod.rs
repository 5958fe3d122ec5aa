//! Domain entities, independent of storage and transport.

pub mod merchant;
pub mod order;
pub mod transaction;

pub use merchant::{
    ActorContext, ApiAudit, ApiCredential, BankExchange, ChargeType, Confirmation, Merchant,
    MerchantStatus, PlatformWallet, PricingBand, PricingOwner, Principal, ProcessorConfig,
    ProcessorKind, Product, VirtualAccount, Wallet, WalletStatus,
};
pub use order::{Beneficiary, Order, OrderLookup, OrderStatus, PaymentLink};
pub use transaction::{
    ledger_chain_is_continuous, BalanceSnapshot, Direction, InboundCredit, LedgerEntry,
    LedgerStatus, RecordState, Transaction, TransactionKind, FEE_TRANSACTION_REMARK,
};
