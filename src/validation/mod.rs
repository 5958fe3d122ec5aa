use bigdecimal::BigDecimal;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Beneficiary, OrderLookup};
use crate::error::AppError;
use crate::services::pricing::{fits_money_scale, MONEY_SCALE};
use crate::services::OrderRequest;

pub const CLIENT_REF_MAX_LEN: usize = 64;
pub const AMOUNT_INPUT_MAX_LEN: usize = 32;
pub const BANK_TRANSFER_MODES: &[&str] = &["IMPS", "NEFT", "RTGS"];
pub const UPI_MODE: &str = "UPI";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Missing(&'static str),
    Invalid { field: &'static str, message: String },
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing(field) | Self::Invalid { field, .. } => field,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "{} is required", field),
            Self::Invalid { field, message } => write!(f, "{}: {}", field, message),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Missing(field) => AppError::MissingParameter(field.to_string()),
            invalid => AppError::BadRequest(invalid.to_string()),
        }
    }
}

pub type ValidationResult<T = ()> = Result<T, ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads a field as a cleaned string. Numbers are accepted as their text form.
fn raw_field(body: &Value, field: &str) -> Option<String> {
    let text = match body.get(field)? {
        Value::String(s) => sanitize_string(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(text).filter(|t| !t.is_empty())
}

pub fn required(body: &Value, field: &'static str) -> ValidationResult<String> {
    raw_field(body, field).ok_or(ValidationError::Missing(field))
}

pub fn optional(body: &Value, field: &str) -> Option<String> {
    raw_field(body, field)
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn parse_amount(raw: &str) -> ValidationResult<BigDecimal> {
    validate_max_len("amount", raw, AMOUNT_INPUT_MAX_LEN)?;
    let amount = BigDecimal::from_str(raw)
        .map_err(|_| ValidationError::new("amount", "must be a decimal number"))?;
    validate_positive_amount(&amount)?;
    if !fits_money_scale(&amount) {
        return Err(ValidationError::new(
            "amount",
            "must have at most 2 decimal places",
        ));
    }
    Ok(amount.with_scale(MONEY_SCALE))
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Validates an order body. Bank-transfer modes and UPI carry different
/// beneficiary fields; the mode doubles as the product code.
pub fn parse_order_request(body: &Value) -> ValidationResult<OrderRequest> {
    let mode = required(body, "mode")?.to_uppercase();
    let customer_name = required(body, "customer_name")?;

    let beneficiary = if BANK_TRANSFER_MODES.contains(&mode.as_str()) {
        Beneficiary::BankTransfer {
            customer_name,
            account_no: required(body, "accountNo")?,
            ifsc: required(body, "ifsc")?.to_uppercase(),
            bank: required(body, "bank")?,
            purpose: required(body, "purpose")?,
            narration: optional(body, "narration"),
        }
    } else if mode == UPI_MODE {
        Beneficiary::Upi {
            customer_name,
            customer_email: required(body, "customer_email")?,
            customer_phone: required(body, "customer_phone")?,
            vpa: optional(body, "vpa"),
            purpose: required(body, "purpose")?,
        }
    } else {
        return Err(ValidationError::new(
            "mode",
            format!("must be one of: {}, {}", BANK_TRANSFER_MODES.join(", "), UPI_MODE),
        ));
    };

    let amount = parse_amount(&required(body, "amount")?)?;
    let client_ref_id = required(body, "clientRefId")?;
    validate_max_len("clientRefId", &client_ref_id, CLIENT_REF_MAX_LEN)?;

    Ok(OrderRequest {
        product: mode,
        amount,
        client_ref_id,
        beneficiary,
    })
}

/// `orderRefId` wins when both keys are present.
pub fn parse_order_lookup(body: &Value) -> ValidationResult<OrderLookup> {
    if let Some(order_ref) = optional(body, "orderRefId") {
        let id = Uuid::parse_str(&order_ref)
            .map_err(|_| ValidationError::new("orderRefId", "must be a UUID"))?;
        return Ok(OrderLookup::OrderRef(id));
    }
    optional(body, "clientRefId")
        .map(OrderLookup::ClientRef)
        .ok_or(ValidationError::Missing("orderRefId or clientRefId"))
}
