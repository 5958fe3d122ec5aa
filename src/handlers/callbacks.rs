use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use super::success_body;
use crate::error::AppError;
use crate::domain::{Order, TransactionKind};
use crate::processors::{ProcessorAdapter, ProcessorError, ProcessorReport};
use crate::services::Applied;
use crate::AppState;

/// Status notification pushed by a processor. The adapter owns parsing and
/// signature checks; the outcome goes through the same path as a dispatch reply.
pub async fn processor_callback(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let result = async {
        let Json(body) =
            payload.map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;
        let adapter = state.processors.get(&name).map_err(|e| match e {
            ProcessorError::Unknown(_) => AppError::NotFound(format!("Unknown processor {}", name)),
            other => AppError::Configuration(other.to_string()),
        })?;
        let callback = adapter.parse_callback(&body).map_err(|e| {
            tracing::warn!(processor = %name, "Rejected processor callback: {}", e);
            AppError::BadRequest("Invalid callback payload".to_string())
        })?;

        let order = state
            .store
            .order(callback.order_id)
            .await?
            .filter(|o| o.processor_id == name)
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        let report = if callback.signed {
            callback.report
        } else {
            confirm_with_processor(adapter.as_ref(), &state, &order).await?
        };

        let applied = state.outcomes.apply(order.id, &report).await?;
        let status = match &applied {
            Applied::AlreadyFinal => "ALREADY_FINAL",
            other => other.order().map(|o| o.status.as_str()).unwrap_or("UNKNOWN"),
        };
        tracing::info!(
            processor = %name,
            order_id = %order.id,
            outcome = report.outcome.label(),
            signed = callback.signed,
            "Processor callback applied"
        );
        Ok::<_, AppError>(success_body(
            "Callback processed",
            json!({ "orderRefId": order.id, "status": status }),
        ))
    }
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

/// An unsigned callback only says the order changed. The outcome applied is
/// whatever the processor's status endpoint reports now.
async fn confirm_with_processor(
    adapter: &dyn ProcessorAdapter,
    state: &AppState,
    order: &Order,
) -> Result<ProcessorReport, AppError> {
    let txn = state
        .store
        .transactions(order.id)
        .await?
        .into_iter()
        .find(|t| t.kind == TransactionKind::Primary)
        .ok_or_else(|| AppError::Internal(format!("order {} has no primary transaction", order.id)))?;
    adapter
        .query_status(order, &txn)
        .await
        .map_err(|e| AppError::Processor {
            order_id: order.id,
            reason: e.to_string(),
        })
}
