//! Asynchronous UPI collection processor.
//!
//! Every request is signed with SHA-512 over the `#`-joined field values
//! followed by the secret key. Outcomes arrive later by callback or through
//! the check-transaction endpoint keyed by order id and RRN.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};
use std::time::Duration;

use super::{
    field_str, order_id_field, CallbackReport, Outcome, ProcessorAdapter, ProcessorClient,
    ProcessorError, ProcessorReport,
};
use crate::domain::{Beneficiary, Confirmation, Order, PaymentLink, ProcessorConfig, Transaction};

const API_VERSION: &str = "2.0";
const DEFAULT_CHANNEL: &str = "EXT";

/// Lowercase hex SHA-512 of `v1#v2#...#secret`.
pub fn sign(values: &[&str], secret: &str) -> String {
    let mut joined = values.join("#");
    joined.push('#');
    joined.push_str(secret);
    hex::encode(Sha512::digest(joined.as_bytes()))
}

/// Builds a signed request body from fields in signing order.
fn signed_body(fields: &[(&str, String)], secret: &str) -> Value {
    let values: Vec<&str> = fields.iter().map(|(_, v)| v.as_str()).collect();
    let mut body = Map::new();
    for (key, value) in fields {
        body.insert((*key).to_string(), Value::String(value.clone()));
    }
    body.insert("hash".to_string(), Value::String(sign(&values, secret)));
    Value::Object(body)
}

pub struct CollectAdapter {
    name: String,
    merchant_id: String,
    secret_key: String,
    payee_vpa: String,
    channel: String,
    http: ProcessorClient,
}

impl CollectAdapter {
    pub fn new(config: &ProcessorConfig, timeout: Duration) -> Result<Self, ProcessorError> {
        let http = ProcessorClient::new(config.endpoint.clone(), timeout)?;
        Ok(Self::with_client(config, http))
    }

    pub fn with_client(config: &ProcessorConfig, http: ProcessorClient) -> Self {
        Self {
            name: config.name.clone(),
            merchant_id: config.client_id.clone(),
            secret_key: config.secret_key.clone(),
            payee_vpa: config.setting("payee_vpa").unwrap_or_default().to_string(),
            channel: config
                .setting("channel")
                .unwrap_or(DEFAULT_CHANNEL)
                .to_string(),
            http,
        }
    }

    fn txn_status(body: &Value) -> Option<String> {
        field_str(body, "txnStatus").map(|s| s.to_uppercase())
    }

    fn read_check(body: &Value) -> ProcessorReport {
        let message = field_str(body, "messageText");
        let rrn = field_str(body, "rrn");
        let outcome = match Self::txn_status(body).as_deref() {
            Some("SUCCESS") => Outcome::Success { utr: rrn.clone() },
            Some("FAILURE") | Some("FAILED") => Outcome::Failed {
                reason: message.clone().unwrap_or_else(|| "Collect request failed".to_string()),
            },
            _ => Outcome::Pending,
        };
        ProcessorReport::new(outcome)
            .with_reference(rrn)
            .with_remark(message)
    }
}

#[async_trait]
impl ProcessorAdapter for CollectAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, confirmation: Confirmation) -> bool {
        confirmation == Confirmation::Asynchronous
    }

    async fn dispatch(
        &self,
        order: &Order,
        txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError> {
        let (phone, vpa, purpose) = match &order.beneficiary {
            Beneficiary::Upi {
                customer_phone,
                vpa,
                purpose,
                ..
            } => (customer_phone.clone(), vpa.clone().unwrap_or_default(), purpose.clone()),
            Beneficiary::BankTransfer { .. } => {
                return Err(ProcessorError::Unsupported(format!(
                    "{} only collects over UPI",
                    self.name
                )))
            }
        };

        let fields = [
            ("amount", order.amount.with_scale(2).to_string()),
            ("feSessionId", txn.id.to_string()),
            ("hdnOrderID", order.id.to_string()),
            ("mid", self.merchant_id.clone()),
            ("payeeVirtualAdd", self.payee_vpa.clone()),
            ("payerMobNo", phone),
            ("payerVirtualAdd", vpa),
            ("remarks", purpose),
            ("ver", API_VERSION.to_string()),
        ];
        let response = self
            .http
            .post_json("/upiMerCollect", &signed_body(&fields, &self.secret_key))
            .await?;

        let message = field_str(&response, "messageText");
        let rrn = field_str(&response, "rrn");
        if Self::txn_status(&response).as_deref() == Some("FAILURE") {
            return Ok(ProcessorReport::new(Outcome::Failed {
                reason: message
                    .clone()
                    .unwrap_or_else(|| "Collect request rejected".to_string()),
            })
            .with_reference(rrn)
            .with_remark(message));
        }
        if rrn.is_none() {
            return Err(ProcessorError::Malformed(
                "collect response has no rrn".to_string(),
            ));
        }

        let link = PaymentLink {
            payment_url: field_str(&response, "paymentUrl"),
            success_url: field_str(&response, "successUrl"),
            failed_url: field_str(&response, "failedUrl"),
            close_url: field_str(&response, "closeUrl"),
        };
        let mut report = ProcessorReport::new(Outcome::Pending)
            .with_reference(rrn)
            .with_remark(message);
        report.payment_link = Some(link);
        Ok(report)
    }

    async fn query_status(
        &self,
        order: &Order,
        txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError> {
        let fields = [
            ("channel", self.channel.clone()),
            ("feSessionId", txn.id.to_string()),
            ("hdnOrderID", order.id.to_string()),
            ("merchantId", self.merchant_id.clone()),
            ("ver", API_VERSION.to_string()),
            (
                "rrn",
                txn.processor_reference.clone().unwrap_or_default(),
            ),
        ];
        let response = self
            .http
            .post_json("/upiMerCollectCheckTxn", &signed_body(&fields, &self.secret_key))
            .await?;
        Ok(Self::read_check(&response))
    }

    fn parse_callback(&self, payload: &Value) -> Result<CallbackReport, ProcessorError> {
        let order_id = order_id_field(payload, "hdnOrderID")?;
        let rrn = field_str(payload, "rrn").unwrap_or_default();
        let status = field_str(payload, "txnStatus")
            .ok_or_else(|| ProcessorError::Malformed("missing txnStatus".to_string()))?;
        let expected = sign(&[&order_id.to_string(), &rrn, &status], &self.secret_key);
        match field_str(payload, "hash") {
            Some(hash) if hash.eq_ignore_ascii_case(&expected) => {}
            _ => {
                return Err(ProcessorError::Malformed(
                    "callback signature mismatch".to_string(),
                ))
            }
        }
        Ok(CallbackReport {
            order_id,
            report: Self::read_check(payload),
            signed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessorKind;
    use bigdecimal::BigDecimal;
    use mockito::Matcher;
    use serde_json::json;
    use uuid::Uuid;

    fn config(endpoint: String) -> ProcessorConfig {
        ProcessorConfig {
            name: "upi-collect".into(),
            kind: ProcessorKind::Collect,
            endpoint,
            client_id: "MID01".into(),
            secret_key: "s3cret".into(),
            settings: json!({"payee_vpa": "switch@bank"}),
            is_active: true,
        }
    }

    fn upi_order() -> (Order, Transaction) {
        let order = Order::new(
            "m1".into(),
            "ref-9".into(),
            "UPI".into(),
            "upi-collect".into(),
            BigDecimal::from(250),
            BigDecimal::from(0),
            BigDecimal::from(0),
            Beneficiary::Upi {
                customer_name: "Ravi".into(),
                customer_email: "ravi@example.com".into(),
                customer_phone: "9876543210".into(),
                vpa: Some("ravi@upi".into()),
                purpose: "invoice".into(),
            },
        );
        let txn = Transaction::primary(
            order.id,
            "m1".into(),
            "upi-collect".into(),
            "UPI".into(),
            order.transaction_amount.clone(),
        );
        (order, txn)
    }

    #[test]
    fn test_signature_covers_values_in_order() {
        let a = sign(&["1.00", "abc"], "key");
        let b = sign(&["abc", "1.00"], "key");
        assert_ne!(a, b);
        assert_eq!(a.len(), 128);
        assert_eq!(a, hex::encode(Sha512::digest(b"1.00#abc#key")));
    }

    #[tokio::test]
    async fn test_dispatch_returns_pending_with_rrn_and_link() {
        let mut server = mockito::Server::new_async().await;
        let (order, txn) = upi_order();
        let expected_hash = sign(
            &[
                "250.00",
                &txn.id.to_string(),
                &order.id.to_string(),
                "MID01",
                "switch@bank",
                "9876543210",
                "ravi@upi",
                "invoice",
                "2.0",
            ],
            "s3cret",
        );
        let mock = server
            .mock("POST", "/upiMerCollect")
            .match_body(Matcher::PartialJson(json!({
                "hdnOrderID": order.id.to_string(),
                "hash": expected_hash,
            })))
            .with_status(200)
            .with_body(r#"{"rrn": "RRN77", "messageText": "Collect request sent", "paymentUrl": "https://pay.example/RRN77"}"#)
            .create_async()
            .await;

        let adapter = CollectAdapter::new(&config(server.url()), Duration::from_secs(5)).unwrap();
        let report = adapter.dispatch(&order, &txn).await.unwrap();

        mock.assert_async().await;
        assert_eq!(report.outcome, Outcome::Pending);
        assert_eq!(report.processor_reference.as_deref(), Some("RRN77"));
        assert_eq!(
            report.payment_link.unwrap().payment_url.as_deref(),
            Some("https://pay.example/RRN77")
        );
    }

    #[tokio::test]
    async fn test_query_status_reads_txn_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/upiMerCollectCheckTxn")
            .with_status(200)
            .with_body(r#"{"txnStatus": "SUCCESS", "rrn": "RRN77", "messageText": "Paid"}"#)
            .create_async()
            .await;
        let (order, mut txn) = upi_order();
        txn.processor_reference = Some("RRN77".into());

        let adapter = CollectAdapter::new(&config(server.url()), Duration::from_secs(5)).unwrap();
        let report = adapter.query_status(&order, &txn).await.unwrap();
        assert_eq!(
            report.outcome,
            Outcome::Success {
                utr: Some("RRN77".into())
            }
        );
    }

    #[test]
    fn test_callback_signature_is_verified() {
        let adapter = CollectAdapter::new(&config("http://localhost".into()), Duration::from_secs(1)).unwrap();
        let order_id = Uuid::new_v4();
        let hash = sign(&[&order_id.to_string(), "RRN1", "FAILURE"], "s3cret");
        let payload = json!({
            "hdnOrderID": order_id.to_string(),
            "rrn": "RRN1",
            "txnStatus": "FAILURE",
            "messageText": "Declined by payer",
            "hash": hash,
        });
        let report = adapter.parse_callback(&payload).unwrap();
        assert_eq!(report.order_id, order_id);
        assert!(report.signed);
        assert_eq!(
            report.report.outcome,
            Outcome::Failed {
                reason: "Declined by payer".into()
            }
        );

        let mut forged = payload.clone();
        forged["txnStatus"] = json!("SUCCESS");
        assert!(adapter.parse_callback(&forged).is_err());
    }
}
