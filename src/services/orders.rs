//! Order intake: validate, price, reserve, dispatch.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::outcome::{Applied, OutcomeApplier};
use super::pricing::{fits_money_scale, PricingResolver, Quote};
use crate::domain::{
    ActorContext, Beneficiary, Confirmation, Direction, LedgerEntry, LedgerStatus, MerchantStatus,
    Order, OrderLookup, OrderStatus, PaymentLink, Transaction, WalletStatus,
};
use crate::error::AppError;
use crate::ports::{LedgerStore, RepositoryError};
use crate::processors::{ProcessorAdapter, ProcessorRegistry};

/// A validated order request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub product: String,
    pub amount: BigDecimal,
    pub client_ref_id: String,
    pub beneficiary: Beneficiary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order: Order,
    pub payment_link: Option<PaymentLink>,
}

impl From<Order> for OrderReceipt {
    fn from(order: Order) -> Self {
        let payment_link = order.payment_link.clone();
        Self {
            order,
            payment_link,
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn LedgerStore>,
    pricing: PricingResolver,
    processors: Arc<ProcessorRegistry>,
    outcomes: Arc<OutcomeApplier>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        processors: Arc<ProcessorRegistry>,
        outcomes: Arc<OutcomeApplier>,
    ) -> Self {
        Self {
            pricing: PricingResolver::new(store.clone()),
            store,
            processors,
            outcomes,
        }
    }

    pub async fn create_order(
        &self,
        actor: &ActorContext,
        request: OrderRequest,
    ) -> Result<OrderReceipt, AppError> {
        if !fits_money_scale(&request.amount) {
            return Err(AppError::BadRequest(
                "amount must have at most 2 decimal places".to_string(),
            ));
        }
        let merchant = self
            .store
            .merchant(&actor.merchant_id)
            .await?
            .ok_or_else(|| AppError::Validation("Merchant not found".to_string()))?;
        if merchant.status != MerchantStatus::Approved {
            return Err(AppError::Validation(
                "Merchant account is not approved".to_string(),
            ));
        }
        let processor_id = merchant
            .processor_id
            .clone()
            .ok_or_else(|| AppError::Validation("Processor isn't configured".to_string()))?;
        let wallet = self
            .store
            .wallet(&actor.merchant_id)
            .await?
            .ok_or_else(|| AppError::Validation("Wallet not found".to_string()))?;
        if wallet.status != WalletStatus::Active {
            return Err(AppError::Validation("Wallet is not active".to_string()));
        }

        let product = self
            .store
            .product(&request.product)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                AppError::Validation(format!("{} is not an active product", request.product))
            })?;
        let adapter = self.processors.get(&processor_id).map_err(|e| {
            tracing::error!("Merchant {} is assigned an unusable processor: {}", actor.merchant_id, e);
            AppError::Validation("Processor isn't configured".to_string())
        })?;
        if !adapter.supports(product.confirmation) {
            return Err(AppError::Validation(format!(
                "Processor isn't configured for {}",
                product.code
            )));
        }

        let duplicate = self
            .store
            .find_order(
                &actor.merchant_id,
                &OrderLookup::ClientRef(request.client_ref_id.clone()),
            )
            .await?;
        if duplicate.is_some() {
            return Err(AppError::DuplicateRequest(request.client_ref_id));
        }

        let quote = self
            .pricing
            .resolve(&actor.merchant_id, &processor_id, &product.code, &request.amount)
            .await?;

        let (order, txn) = self.reserve(actor, request, processor_id, quote).await?;
        self.dispatch(order, txn, adapter, product.confirmation).await
    }

    /// Debits the wallet and writes the order, its transaction and the ledger entry as one unit.
    async fn reserve(
        &self,
        actor: &ActorContext,
        request: OrderRequest,
        processor_id: String,
        quote: Quote,
    ) -> Result<(Order, Transaction), AppError> {
        let order = Order::new(
            actor.merchant_id.clone(),
            request.client_ref_id,
            request.product,
            processor_id,
            request.amount,
            quote.fee,
            quote.tax,
            request.beneficiary,
        );
        let mut txn = Transaction::primary(
            order.id,
            order.merchant_id.clone(),
            order.processor_id.clone(),
            order.product.clone(),
            order.transaction_amount.clone(),
        );
        txn.mark_committed().map_err(AppError::Internal)?;

        let mut unit = self.store.begin().await?;
        let snapshot = unit
            .reserve(&order.merchant_id, &order.transaction_amount)
            .await
            .map_err(|e| match e {
                RepositoryError::InsufficientFunds { balance, required } => {
                    AppError::InsufficientFunds {
                        balance: balance.to_string(),
                        required: required.to_string(),
                    }
                }
                other => other.into(),
            })?;
        unit.insert_order(&order).await.map_err(|e| match e {
            RepositoryError::Duplicate(_) => {
                AppError::DuplicateRequest(order.client_ref_id.clone())
            }
            other => other.into(),
        })?;
        unit.insert_transaction(&txn).await?;
        let entry = LedgerEntry::new(
            &order.merchant_id,
            Direction::Debit,
            LedgerStatus::Success,
            order.transaction_amount.clone(),
            snapshot,
        )
        .for_transaction(&txn)
        .with_reference(order.client_ref_id.clone());
        unit.append_ledger(&entry).await?;
        unit.adjust_platform(&order.fee, &order.tax).await?;
        unit.commit().await?;

        tracing::info!(
            order_id = %order.id,
            merchant_id = %order.merchant_id,
            amount = %order.transaction_amount,
            "Order reserved"
        );
        Ok((order, txn))
    }

    async fn dispatch(
        &self,
        order: Order,
        txn: Transaction,
        adapter: Arc<dyn ProcessorAdapter>,
        confirmation: Confirmation,
    ) -> Result<OrderReceipt, AppError> {
        let order_id = order.id;
        let order = match self.outcomes.mark_processing(order_id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(order_id = %order_id, "Could not start dispatch: {}", e);
                self.compensate(order_id, "Order could not be dispatched").await;
                return Err(AppError::Internal(e.to_string()));
            }
        };

        let report = match adapter.dispatch(&order, &txn).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(
                    order_id = %order_id,
                    processor = %adapter.name(),
                    "Processor dispatch failed: {}",
                    e
                );
                self.compensate(order_id, &format!("Processor error: {}", e))
                    .await;
                return Err(AppError::Processor {
                    order_id,
                    reason: e.to_string(),
                });
            }
        };

        tracing::info!(
            order_id = %order_id,
            processor = %adapter.name(),
            outcome = report.outcome.label(),
            confirmation = confirmation.as_str(),
            "Processor accepted order"
        );

        // A failure here leaves the order open. Reconciliation re-queries it.
        let applied = self.outcomes.apply(order_id, &report).await.map_err(|e| {
            tracing::error!(order_id = %order_id, "Could not record processor outcome: {}", e);
            e
        })?;
        match applied {
            Applied::AlreadyFinal => self.current(order_id).await,
            other => Ok(other
                .order()
                .cloned()
                .map(OrderReceipt::from)
                .unwrap_or_else(|| OrderReceipt::from(order))),
        }
    }

    async fn compensate(&self, order_id: Uuid, reason: &str) {
        if let Err(e) = self
            .outcomes
            .compensation()
            .reverse(order_id, OrderStatus::Cancelled, reason)
            .await
        {
            tracing::error!(
                order_id = %order_id,
                "Compensation failed, leaving order for reconciliation: {}",
                e
            );
        }
    }

    async fn current(&self, order_id: Uuid) -> Result<OrderReceipt, AppError> {
        self.store
            .order(order_id)
            .await?
            .map(OrderReceipt::from)
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }

    pub async fn find(&self, actor: &ActorContext, lookup: &OrderLookup) -> Result<Order, AppError> {
        self.store
            .find_order(&actor.merchant_id, lookup)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }
}
