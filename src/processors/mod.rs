//! Uniform interface over the external payout and collection processors.

pub mod client;
pub mod collect;
pub mod payout;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Confirmation, Order, PaymentLink, Transaction};

pub use client::ProcessorClient;
pub use collect::CollectAdapter;
pub use payout::PayoutAdapter;
pub use registry::ProcessorRegistry;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("processor call timed out")]
    Timeout,
    #[error("processor returned HTTP {0}")]
    Status(u16),
    #[error("malformed processor response: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),
    #[error("unknown processor: {0}")]
    Unknown(String),
    #[error("unsupported request: {0}")]
    Unsupported(String),
    #[error("invalid processor configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProcessorError::Timeout
        } else if let Some(status) = err.status() {
            ProcessorError::Status(status.as_u16())
        } else if err.is_decode() {
            ProcessorError::Malformed(err.to_string())
        } else {
            ProcessorError::Transport(err.to_string())
        }
    }
}

/// Normalized result reported by a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { utr: Option<String> },
    Failed { reason: String },
    Reversed { reason: String },
    Pending,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Failed { .. } => "failed",
            Outcome::Reversed { .. } => "reversed",
            Outcome::Pending => "pending",
        }
    }
}

/// What a processor said about one order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorReport {
    pub outcome: Outcome,
    pub processor_reference: Option<String>,
    pub remark: Option<String>,
    pub payment_link: Option<PaymentLink>,
}

impl ProcessorReport {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            processor_reference: None,
            remark: None,
            payment_link: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.processor_reference = reference;
        self
    }

    pub fn with_remark(mut self, remark: Option<String>) -> Self {
        self.remark = remark;
        self
    }
}

/// A processor's own notification, resolved to the order it concerns.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackReport {
    pub order_id: Uuid,
    pub report: ProcessorReport,
    /// Whether the payload carried a signature the adapter checked. Unsigned
    /// callbacks are only a prompt to re-query the processor.
    pub signed: bool,
}

#[async_trait]
pub trait ProcessorAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this processor can carry products confirmed this way.
    fn supports(&self, confirmation: Confirmation) -> bool;

    async fn dispatch(
        &self,
        order: &Order,
        txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError>;

    async fn query_status(
        &self,
        order: &Order,
        txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError>;

    fn parse_callback(&self, payload: &Value) -> Result<CallbackReport, ProcessorError>;
}

/// Reads a string field, accepting numbers too.
pub(crate) fn field_str(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn order_id_field(body: &Value, key: &str) -> Result<Uuid, ProcessorError> {
    let raw = field_str(body, key)
        .ok_or_else(|| ProcessorError::Malformed(format!("missing {}", key)))?;
    Uuid::parse_str(&raw).map_err(|_| ProcessorError::Malformed(format!("{} is not an order id", key)))
}
