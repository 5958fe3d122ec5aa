pub mod admin;
pub mod bank;
pub mod callbacks;
pub mod orders;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::ApiAudit;
use crate::error::{AppError, CODE_SUCCESS};
use crate::utils::sanitize::sanitize_json;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub db: String,
    pub processors: Vec<String>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match state.store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!("Health check could not reach the database: {}", e);
            "disconnected"
        }
    };

    let health_response = HealthStatus {
        status: if db_status == "connected" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db_status.to_string(),
        processors: state.processors.names(),
    };

    let status_code = if db_status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}

/// `{code: 0x0200, status: SUCCESS, message, data}`.
pub fn success_body(message: &str, data: Value) -> Value {
    json!({
        "code": CODE_SUCCESS,
        "status": "SUCCESS",
        "message": message,
        "data": data,
    })
}

pub(crate) fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Renders the result and leaves a sanitized request/response pair in the audit trail.
pub(crate) async fn audited(
    state: &AppState,
    endpoint: &str,
    merchant_id: Option<String>,
    request: &Value,
    result: Result<Value, AppError>,
) -> Response {
    let (status, body) = match result {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            if e.status_code().is_server_error() {
                tracing::error!(endpoint, error = %e, "request failed");
            } else {
                tracing::debug!(endpoint, error = %e, "request rejected");
            }
            (e.status_code(), e.body())
        }
    };

    let audit = ApiAudit::new(
        endpoint,
        merchant_id,
        sanitize_json(request),
        sanitize_json(&body),
    );
    if let Err(e) = state.store.record_audit(&audit).await {
        tracing::warn!(endpoint, "Could not record API audit: {}", e);
    }

    (status, Json(body)).into_response()
}
