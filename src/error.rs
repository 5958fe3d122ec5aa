use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::ports::RepositoryError;

pub const CODE_SUCCESS: &str = "0x0200";
pub const CODE_MISSING_PARAMETER: &str = "0x0203";
pub const CODE_BAD_REQUEST: &str = "0x0400";
pub const CODE_UNAUTHORIZED: &str = "0x0401";
pub const CODE_VALIDATION: &str = "0x0404";
pub const CODE_SERVER_ERROR: &str = "0x0500";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing header: {0}")]
    MissingHeader(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No pricing match: {0}")]
    NoPricingMatch(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: String, required: String },

    #[error("Duplicate request: {0}")]
    DuplicateRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Processor error for order {order_id}: {reason}")]
    Processor { order_id: Uuid, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingHeader(_) | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::MissingParameter(_)
            | AppError::BadRequest(_)
            | AppError::Validation(_)
            | AppError::NoPricingMatch(_)
            | AppError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            AppError::DuplicateRequest(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Processor { .. } => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_) | AppError::Repository(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable response code tag.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingHeader(_) | AppError::Unauthorized(_) => CODE_UNAUTHORIZED,
            AppError::MissingParameter(_) | AppError::DuplicateRequest(_) => {
                CODE_MISSING_PARAMETER
            }
            AppError::BadRequest(_) => CODE_BAD_REQUEST,
            AppError::Validation(_)
            | AppError::NoPricingMatch(_)
            | AppError::InsufficientFunds { .. }
            | AppError::NotFound(_) => CODE_VALIDATION,
            AppError::Processor { .. }
            | AppError::Configuration(_)
            | AppError::Repository(_)
            | AppError::Internal(_) => CODE_SERVER_ERROR,
        }
    }

    pub fn status_tag(&self) -> &'static str {
        match self {
            AppError::MissingHeader(_) => "MISSING_HEADER",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::MissingParameter(_) => "MISSING_PARAMETER",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) | AppError::NoPricingMatch(_) => "VALIDATION_ERROR",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_BALANCE",
            AppError::DuplicateRequest(_) => "DUPLICATE_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Processor { .. } => "FAILURE",
            AppError::Configuration(_) | AppError::Repository(_) | AppError::Internal(_) => {
                "SERVER_ERROR"
            }
        }
    }

    /// Message safe to show a caller. Internal faults are never described.
    pub fn public_message(&self) -> String {
        match self {
            AppError::MissingHeader(h) => format!("Missing {} header", h),
            AppError::Unauthorized(_) => "Invalid API credentials".to_string(),
            AppError::MissingParameter(p) => format!("Missing parameter: {}", p),
            AppError::BadRequest(msg) | AppError::Validation(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
            AppError::NoPricingMatch(_) => "Pricing is not configured for this amount".to_string(),
            AppError::InsufficientFunds { .. } => "Insufficient wallet balance".to_string(),
            AppError::DuplicateRequest(_) => "Duplicate clientRefId".to_string(),
            AppError::Processor { .. } => "Order could not be processed".to_string(),
            AppError::Configuration(_) | AppError::Repository(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    pub fn body(&self) -> Value {
        let mut body = json!({
            "code": self.code(),
            "status": self.status_tag(),
            "message": self.public_message(),
        });
        if let AppError::Processor { order_id, .. } = self {
            body["data"] = json!({ "orderRefId": order_id, "status": "Cancelled" });
        }
        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}
