use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::success_body;
use crate::error::AppError;
use crate::processors::{Outcome, ProcessorReport};
use crate::services::reconciliation::DEFAULT_BATCH_SIZE;
use crate::services::Applied;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub utr: Option<String>,
    pub remark: Option<String>,
}

impl StatusUpdate {
    fn into_report(self) -> Result<ProcessorReport, AppError> {
        let remark = self.remark.filter(|r| !r.trim().is_empty());
        let outcome = match self.status.trim().to_uppercase().as_str() {
            "SUCCESS" => Outcome::Success {
                utr: self.utr.filter(|u| !u.trim().is_empty()),
            },
            "FAILED" => Outcome::Failed {
                reason: remark.clone().unwrap_or_else(|| "Marked failed by operator".to_string()),
            },
            "REVERSED" => Outcome::Reversed {
                reason: remark.clone().unwrap_or_else(|| "Marked reversed by operator".to_string()),
            },
            other => {
                return Err(AppError::BadRequest(format!(
                    "status must be SUCCESS, FAILED or REVERSED, got {}",
                    other
                )))
            }
        };
        Ok(ProcessorReport::new(outcome).with_remark(remark))
    }
}

/// Manual terminal update for an order the processor confirmed out of band.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> Response {
    let result = async {
        let report = update.into_report()?;
        if state.store.order(order_id).await?.is_none() {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        let applied = state.outcomes.apply(order_id, &report).await?;
        tracing::info!(order_id = %order_id, outcome = report.outcome.label(), "Manual status update");

        let data = match applied {
            Applied::AlreadyFinal => json!({ "orderRefId": order_id, "changed": false }),
            other => json!({
                "orderRefId": order_id,
                "changed": true,
                "status": other.order().map(|o| o.status.as_str()),
            }),
        };
        Ok::<_, AppError>(success_body("Order updated", data))
    }
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReconcileParams {
    pub limit: Option<i64>,
}

pub async fn reconcile(
    State(state): State<AppState>,
    Query(params): Query<ReconcileParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = params.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_BATCH_SIZE);
    let report = state.reconciler.run_once(limit).await?;
    Ok(Json(success_body(
        "Reconciliation pass complete",
        serde_json::to_value(&report).unwrap_or_default(),
    )))
}
