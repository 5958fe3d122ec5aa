use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::time::{sleep, Duration};

use super::outcome::{Applied, OutcomeApplier};
use crate::domain::{Order, TransactionKind};
use crate::error::AppError;
use crate::ports::LedgerStore;
use crate::processors::ProcessorRegistry;

pub const DEFAULT_SCHEDULE: &str = "0 */10 * * * *";
pub const DEFAULT_BATCH_SIZE: i64 = 100;
/// Added to the processor timeout so an order is never re-queried while its
/// dispatch call can still be running.
pub const DISPATCH_GRACE_MARGIN: Duration = Duration::from_secs(30);
/// Grace used until the caller sets one from its processor timeout.
pub const DEFAULT_DISPATCH_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconciliationReport {
    pub examined: usize,
    pub finalized: usize,
    pub compensated: usize,
    pub pending: usize,
    pub errors: usize,
}

/// Re-queries processors for orders that never received a terminal outcome.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    processors: Arc<ProcessorRegistry>,
    outcomes: Arc<OutcomeApplier>,
    dispatch_grace: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        processors: Arc<ProcessorRegistry>,
        outcomes: Arc<OutcomeApplier>,
    ) -> Self {
        Self {
            store,
            processors,
            outcomes,
            dispatch_grace: DEFAULT_DISPATCH_GRACE,
        }
    }

    /// Orders untouched for less than `grace` are left to their in-flight dispatch.
    pub fn with_dispatch_grace(mut self, grace: Duration) -> Self {
        self.dispatch_grace = grace;
        self
    }

    /// One pass over the oldest open orders. A failure on one order is logged
    /// and counted; the rest of the batch still runs.
    pub async fn run_once(&self, batch_size: i64) -> Result<ReconciliationReport, AppError> {
        let grace = chrono::Duration::from_std(self.dispatch_grace)
            .map_err(|e| AppError::Configuration(format!("dispatch grace: {}", e)))?;
        let orders = self
            .store
            .orders_awaiting_outcome(batch_size, Utc::now() - grace)
            .await?;
        let mut report = ReconciliationReport::default();

        for order in orders {
            report.examined += 1;
            match self.requery(&order).await {
                Ok(Applied::Finalized(_)) => report.finalized += 1,
                Ok(Applied::Compensated(_)) => report.compensated += 1,
                Ok(Applied::StillPending(_)) | Ok(Applied::AlreadyFinal) => report.pending += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(
                        order_id = %order.id,
                        processor = %order.processor_id,
                        "Reconciliation failed for order: {}",
                        e
                    );
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                finalized = report.finalized,
                compensated = report.compensated,
                pending = report.pending,
                errors = report.errors,
                "Reconciliation pass complete"
            );
        }
        Ok(report)
    }

    async fn requery(&self, order: &Order) -> Result<Applied, AppError> {
        let txn = self
            .store
            .transactions(order.id)
            .await?
            .into_iter()
            .find(|t| t.kind == TransactionKind::Primary)
            .ok_or_else(|| AppError::Internal(format!("order {} has no primary transaction", order.id)))?;
        let adapter = self
            .processors
            .get(&order.processor_id)
            .map_err(|e| AppError::Configuration(e.to_string()))?;
        let report = adapter
            .query_status(order, &txn)
            .await
            .map_err(|e| AppError::Processor {
                order_id: order.id,
                reason: e.to_string(),
            })?;
        tracing::debug!(order_id = %order.id, outcome = report.outcome.label(), "Status re-queried");
        self.outcomes.apply(order.id, &report).await
    }

    /// Runs a pass at every tick of `schedule` until the task is dropped.
    pub async fn run_scheduler(self, schedule: Schedule, batch_size: i64) {
        tracing::info!("Reconciliation scheduler started");
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("Reconciliation schedule has no upcoming ticks, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            sleep(wait).await;

            if let Err(e) = self.run_once(batch_size).await {
                tracing::error!("Reconciliation pass error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_schedule_parses() {
        let schedule = Schedule::from_str(DEFAULT_SCHEDULE).unwrap();
        let mut ticks = schedule.upcoming(Utc);
        let first = ticks.next().unwrap();
        let second = ticks.next().unwrap();
        assert_eq!((second - first).num_minutes(), 10);
    }
}
