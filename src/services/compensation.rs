//! The single path that gives a reserved debit back.

use std::sync::Arc;

use uuid::Uuid;

use super::notifier::CallbackNotifier;
use crate::domain::{Direction, LedgerEntry, LedgerStatus, Order, OrderStatus};
use crate::error::AppError;
use crate::ports::{LedgerStore, RepositoryError};

#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    Applied(Order),
    /// The transaction already had its terminal outcome. Nothing changed.
    AlreadyFinal,
}

#[derive(Clone)]
pub struct CompensationEngine {
    store: Arc<dyn LedgerStore>,
    notifier: CallbackNotifier,
}

impl CompensationEngine {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: CallbackNotifier) -> Self {
        Self { store, notifier }
    }

    /// Credits the order's full debit back, undoes the platform fee and tax,
    /// and closes the order as `Cancelled` or `Reversed`.
    pub async fn reverse(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        reason: &str,
    ) -> Result<Compensation, AppError> {
        let txn_status = match status {
            OrderStatus::Cancelled => OrderStatus::Failed,
            OrderStatus::Reversed => OrderStatus::Reversed,
            other => {
                return Err(AppError::Internal(format!(
                    "compensation cannot close an order as {}",
                    other
                )))
            }
        };

        let mut unit = self.store.begin().await?;
        let mut txn = unit.lock_primary_transaction(order_id).await?;
        if txn.is_finalized() {
            tracing::info!(order_id = %order_id, "Compensation skipped, transaction already final");
            return Ok(Compensation::AlreadyFinal);
        }
        let mut order = unit.lock_order(order_id).await?;

        let snapshot = unit
            .release(&order.merchant_id, &order.transaction_amount)
            .await?;
        let entry = LedgerEntry::new(
            &order.merchant_id,
            Direction::Credit,
            LedgerStatus::Reversed,
            order.transaction_amount.clone(),
            snapshot,
        )
        .for_transaction(&txn)
        .with_reference(order.client_ref_id.clone());
        unit.append_ledger(&entry).await?;
        unit.adjust_platform(&-order.fee.clone(), &-order.tax.clone())
            .await?;

        txn.finalize(txn_status, None, Some(reason.to_string()))
            .map_err(AppError::Internal)?;
        match unit.update_transaction(&txn).await {
            Ok(()) => {}
            Err(RepositoryError::AlreadyFinalized(_)) => return Ok(Compensation::AlreadyFinal),
            Err(e) => return Err(e.into()),
        }
        order.cancel(status, reason).map_err(AppError::Internal)?;
        unit.update_order(&order).await?;
        unit.commit().await?;

        tracing::info!(
            order_id = %order_id,
            amount = %order.transaction_amount,
            "Order compensated as {}: {}",
            status,
            reason
        );
        self.notifier.announce(self.store.as_ref(), &order, &txn).await;
        Ok(Compensation::Applied(order))
    }
}
