pub mod compensation;
pub mod notifier;
pub mod orders;
pub mod outcome;
pub mod pricing;
pub mod reconciliation;
pub mod settlement;

pub use compensation::{Compensation, CompensationEngine};
pub use notifier::CallbackNotifier;
pub use orders::{OrderReceipt, OrderRequest, OrderService};
pub use outcome::{Applied, OutcomeApplier};
pub use pricing::{PricingResolver, Quote};
pub use reconciliation::{Reconciler, ReconciliationReport};
pub use settlement::{BankReply, InboundEnvelope, SettlementGateway};
