//! Storage adapters implementing the ledger store port.

pub mod in_memory;
pub mod postgres_ledger_store;

pub use in_memory::InMemoryLedgerStore;
pub use postgres_ledger_store::PostgresLedgerStore;
