//! Applies a processor report to an order. Dispatch responses, callbacks,
//! reconciliation and manual updates all end here.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::compensation::{Compensation, CompensationEngine};
use super::notifier::CallbackNotifier;
use crate::domain::{Order, OrderStatus, Transaction};
use crate::error::AppError;
use crate::ports::{LedgerStore, RepositoryError};
use crate::processors::{Outcome, ProcessorReport};

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Finalized(Order),
    Compensated(Order),
    StillPending(Order),
    /// A terminal outcome was already recorded. Nothing changed.
    AlreadyFinal,
}

impl Applied {
    pub fn order(&self) -> Option<&Order> {
        match self {
            Applied::Finalized(order) | Applied::Compensated(order) | Applied::StillPending(order) => {
                Some(order)
            }
            Applied::AlreadyFinal => None,
        }
    }
}

#[derive(Clone)]
pub struct OutcomeApplier {
    store: Arc<dyn LedgerStore>,
    compensation: CompensationEngine,
    notifier: CallbackNotifier,
}

impl OutcomeApplier {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        compensation: CompensationEngine,
        notifier: CallbackNotifier,
    ) -> Self {
        Self {
            store,
            compensation,
            notifier,
        }
    }

    pub fn compensation(&self) -> &CompensationEngine {
        &self.compensation
    }

    pub async fn apply(&self, order_id: Uuid, report: &ProcessorReport) -> Result<Applied, AppError> {
        match &report.outcome {
            Outcome::Success { utr } => self.finalize_success(order_id, utr.clone(), report).await,
            Outcome::Failed { reason } => self.compensate(order_id, OrderStatus::Cancelled, reason).await,
            Outcome::Reversed { reason } => self.compensate(order_id, OrderStatus::Reversed, reason).await,
            Outcome::Pending => self.mark_pending(order_id, report).await,
        }
    }

    async fn compensate(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        reason: &str,
    ) -> Result<Applied, AppError> {
        match self.compensation.reverse(order_id, status, reason).await? {
            Compensation::Applied(order) => Ok(Applied::Compensated(order)),
            Compensation::AlreadyFinal => Ok(Applied::AlreadyFinal),
        }
    }

    async fn finalize_success(
        &self,
        order_id: Uuid,
        utr: Option<String>,
        report: &ProcessorReport,
    ) -> Result<Applied, AppError> {
        let mut unit = self.store.begin().await?;
        let mut txn = unit.lock_primary_transaction(order_id).await?;
        if txn.is_finalized() {
            if txn.status == OrderStatus::Success {
                tracing::info!(order_id = %order_id, "Success ignored, transaction already final");
            } else {
                tracing::error!(
                    order_id = %order_id,
                    status = %txn.status,
                    utr = ?utr,
                    "Processor reports success for an order that was already refunded"
                );
            }
            return Ok(Applied::AlreadyFinal);
        }
        let mut order = unit.lock_order(order_id).await?;

        if report.processor_reference.is_some() {
            txn.processor_reference = report.processor_reference.clone();
        }
        txn.finalize(OrderStatus::Success, utr.clone(), report.remark.clone())
            .map_err(AppError::Internal)?;
        match unit.update_transaction(&txn).await {
            Ok(()) => {}
            Err(RepositoryError::AlreadyFinalized(_)) => return Ok(Applied::AlreadyFinal),
            Err(e) => return Err(e.into()),
        }

        order.transition(OrderStatus::Success).map_err(AppError::Internal)?;
        order.utr = utr;
        unit.update_order(&order).await?;

        let charges = &order.fee + &order.tax;
        if charges > BigDecimal::from(0) {
            unit.insert_transaction(&Transaction::fee_booking(&txn, charges))
                .await?;
        }
        unit.commit().await?;

        tracing::info!(
            order_id = %order_id,
            utr = ?order.utr,
            "Order completed"
        );
        self.notifier.announce(self.store.as_ref(), &order, &txn).await;
        Ok(Applied::Finalized(order))
    }

    async fn mark_pending(
        &self,
        order_id: Uuid,
        report: &ProcessorReport,
    ) -> Result<Applied, AppError> {
        let mut unit = self.store.begin().await?;
        let mut txn = unit.lock_primary_transaction(order_id).await?;
        if txn.is_finalized() {
            return Ok(Applied::AlreadyFinal);
        }
        let mut order = unit.lock_order(order_id).await?;

        txn.status = OrderStatus::Pending;
        if report.processor_reference.is_some() {
            txn.processor_reference = report.processor_reference.clone();
        }
        if report.remark.is_some() {
            txn.remark = report.remark.clone();
        }
        txn.updated_at = chrono::Utc::now();
        unit.update_transaction(&txn).await?;

        if order.status == OrderStatus::Queued {
            order.transition(OrderStatus::Processing)
                .map_err(AppError::Internal)?;
        }
        if let Some(link) = report.payment_link.as_ref().filter(|l| !l.is_empty()) {
            order.payment_link = Some(link.clone());
        }
        unit.update_order(&order).await?;
        unit.commit().await?;

        tracing::debug!(order_id = %order_id, "Order still pending at processor");
        Ok(Applied::StillPending(order))
    }

    /// Moves a freshly reserved order to `Processing` before it is sent out.
    pub async fn mark_processing(&self, order_id: Uuid) -> Result<Order, AppError> {
        let mut unit = self.store.begin().await?;
        let mut order = unit.lock_order(order_id).await?;
        order.transition(OrderStatus::Processing)
            .map_err(AppError::Internal)?;
        unit.update_order(&order).await?;
        unit.commit().await?;
        Ok(order)
    }
}
