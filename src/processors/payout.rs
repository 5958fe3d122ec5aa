//! Synchronous bank payout processor.
//!
//! Credentials travel in the request body. The response `statusCode` carries
//! the outcome: 1 success, 0 failure, 4 reversal, anything else pending.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    field_str, order_id_field, CallbackReport, Outcome, ProcessorAdapter, ProcessorClient,
    ProcessorError, ProcessorReport,
};
use crate::domain::{Beneficiary, Confirmation, Order, ProcessorConfig, Transaction};

pub struct PayoutAdapter {
    name: String,
    client_id: String,
    secret_key: String,
    http: ProcessorClient,
}

impl PayoutAdapter {
    pub fn new(config: &ProcessorConfig, timeout: Duration) -> Result<Self, ProcessorError> {
        let http = ProcessorClient::new(config.endpoint.clone(), timeout)?;
        Ok(Self::with_client(config, http))
    }

    pub fn with_client(config: &ProcessorConfig, http: ProcessorClient) -> Self {
        Self {
            name: config.name.clone(),
            client_id: config.client_id.clone(),
            secret_key: config.secret_key.clone(),
            http,
        }
    }

    fn payout_body(&self, order: &Order) -> Value {
        let (account_no, ifsc, vpa, number) = match &order.beneficiary {
            Beneficiary::BankTransfer {
                account_no, ifsc, ..
            } => (account_no.as_str(), ifsc.as_str(), "", ""),
            Beneficiary::Upi {
                vpa, customer_phone, ..
            } => ("", "", vpa.as_deref().unwrap_or(""), customer_phone.as_str()),
        };
        json!({
            "clientId": self.client_id,
            "secretKey": self.secret_key,
            "number": number,
            "amount": order.amount.with_scale(2).to_string(),
            "transferMode": order.product,
            "accountNo": account_no,
            "ifscCode": ifsc,
            "beneficiaryName": order.beneficiary.customer_name(),
            "vpa": vpa,
            "clientOrderId": order.id.to_string(),
        })
    }
}

fn status_code(body: &Value) -> Option<i64> {
    match body.get("statusCode")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Maps a payout status document to a report.
pub fn read_status(body: &Value) -> ProcessorReport {
    let message = field_str(body, "message");
    let outcome = match status_code(body) {
        Some(1) => Outcome::Success {
            utr: field_str(body, "utr"),
        },
        Some(0) => Outcome::Failed {
            reason: message.clone().unwrap_or_else(|| "Failed".to_string()),
        },
        Some(4) => Outcome::Reversed {
            reason: message.clone().unwrap_or_else(|| "Reversed".to_string()),
        },
        _ => Outcome::Pending,
    };
    ProcessorReport::new(outcome)
        .with_reference(field_str(body, "orderId"))
        .with_remark(message)
}

#[async_trait]
impl ProcessorAdapter for PayoutAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, confirmation: Confirmation) -> bool {
        confirmation == Confirmation::Synchronous
    }

    async fn dispatch(
        &self,
        order: &Order,
        _txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError> {
        let response = self.http.post_json("/payout", &self.payout_body(order)).await?;
        if status_code(&response).is_none() {
            return Err(ProcessorError::Malformed(
                "payout response has no statusCode".to_string(),
            ));
        }
        Ok(read_status(&response))
    }

    async fn query_status(
        &self,
        order: &Order,
        _txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError> {
        let body = json!({
            "clientId": self.client_id,
            "secretKey": self.secret_key,
            "clientOrderId": order.id.to_string(),
        });
        let response = self.http.post_json("/status", &body).await?;
        Ok(read_status(&response))
    }

    fn parse_callback(&self, payload: &Value) -> Result<CallbackReport, ProcessorError> {
        let order_id = order_id_field(payload, "clientOrderId")?;
        if status_code(payload).is_none() {
            return Err(ProcessorError::Malformed("missing statusCode".to_string()));
        }
        Ok(CallbackReport {
            order_id,
            report: read_status(payload),
            signed: false,
        })
    }
}
