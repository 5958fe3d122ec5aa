//! Bank inward-credit notifications: authenticate, deduplicate, credit.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::pricing::fits_money_scale;
use crate::domain::{BankExchange, Direction, InboundCredit, LedgerEntry, LedgerStatus};
use crate::envelope::BankCipher;
use crate::error::AppError;
use crate::middleware::auth::authenticate_bank;
use crate::ports::LedgerStore;

/// Reply codes carried in `inwardCreditUpdateResp.errorCode`.
pub mod codes {
    pub const SUCCESS: &str = "000";
    pub const NOT_APPLIED: &str = "004";
    pub const MALFORMED: &str = "400";
    pub const UNAUTHORIZED: &str = "401";
    pub const INTERNAL: &str = "500";
}

/// Outer body posted by the bank.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InboundEnvelope {
    #[serde(rename = "msgId")]
    pub msg_id: Option<String>,
    #[serde(rename = "reqData")]
    pub req_data: Option<String>,
}

/// Outer body returned to the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankReply {
    #[serde(rename = "respData")]
    pub resp_data: String,
    #[serde(rename = "msgId")]
    pub msg_id: Option<String>,
}

/// Decrypted reply, before sealing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub code: &'static str,
    pub message: String,
}

impl Verdict {
    fn accepted() -> Self {
        Self {
            accepted: true,
            code: codes::SUCCESS,
            message: "Success".to_string(),
        }
    }

    fn rejected(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            code,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "inwardCreditUpdateResp": {
                "status": if self.accepted { "S" } else { "F" },
                "errorCode": self.code,
                "errorMsg": self.message,
            }
        })
    }
}

/// Fields of `inwardCreditUpdateReq`.
#[derive(Debug, Clone, PartialEq)]
struct CreditNotice {
    utr: String,
    virtual_account: String,
    amount: BigDecimal,
    remitter_name: Option<String>,
    remitter_account: Option<String>,
    remitter_ifsc: Option<String>,
}

fn text(req: &Value, key: &str) -> Option<String> {
    match req.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl CreditNotice {
    fn parse(payload: &Value) -> Result<Self, String> {
        let req = payload
            .get("inwardCreditUpdateReq")
            .ok_or_else(|| "missing inwardCreditUpdateReq".to_string())?;
        let utr = text(req, "txnRefNo").ok_or_else(|| "missing txnRefNo".to_string())?;
        let virtual_account = text(req, "VANum").ok_or_else(|| "missing VANum".to_string())?;
        let amount = text(req, "txnAmt")
            .and_then(|raw| BigDecimal::from_str(&raw).ok())
            .filter(|amount| amount > &BigDecimal::from(0) && fits_money_scale(amount))
            .ok_or_else(|| "txnAmt must be a positive amount with at most 2 decimals".to_string())?;
        Ok(Self {
            utr,
            virtual_account,
            amount,
            remitter_name: text(req, "remitterName"),
            remitter_account: text(req, "remitterAccNo"),
            remitter_ifsc: text(req, "remitterBankIFSC"),
        })
    }
}

#[derive(Clone)]
pub struct SettlementGateway {
    store: Arc<dyn LedgerStore>,
    cipher: BankCipher,
}

impl SettlementGateway {
    pub fn new(store: Arc<dyn LedgerStore>, cipher: BankCipher) -> Self {
        Self { store, cipher }
    }

    /// Handles one notification. Every branch answers with a sealed reply and
    /// leaves the request/response pair on record.
    pub async fn handle(
        &self,
        bank_auth: Option<&str>,
        envelope: InboundEnvelope,
    ) -> Result<BankReply, AppError> {
        let request = serde_json::to_value(&envelope).unwrap_or(Value::Null);
        let msg_id = envelope.msg_id.clone().filter(|m| !m.trim().is_empty());

        if let Err(e) = authenticate_bank(self.store.as_ref(), bank_auth).await {
            let message = match e {
                AppError::MissingHeader(_) => "X-Bank-Auth headers are missing",
                AppError::Unauthorized(_) => "Invalid token",
                other => return Err(other),
            };
            let exchange = BankExchange::new(msg_id.clone(), request, false);
            return self
                .close(exchange, Verdict::rejected(codes::UNAUTHORIZED, message))
                .await;
        }

        let Some(id) = msg_id.clone() else {
            let exchange = BankExchange::new(None, request, false);
            return self
                .close(exchange, Verdict::rejected(codes::MALFORMED, "Missing msgId"))
                .await;
        };

        let exchange = BankExchange::new(Some(id.clone()), request.clone(), true);
        if !self.store.claim_bank_message(&exchange).await? {
            tracing::warn!(msg_id = %id, "Duplicate bank message");
            let duplicate = BankExchange::new(Some(id), request, false);
            return self
                .close(duplicate, Verdict::rejected(codes::UNAUTHORIZED, "Duplicate msgId"))
                .await;
        }

        let verdict = self.settle(&envelope).await;
        self.close(exchange, verdict).await
    }

    async fn settle(&self, envelope: &InboundEnvelope) -> Verdict {
        let Some(data) = envelope.req_data.clone() else {
            return Verdict::rejected(codes::MALFORMED, "Missing reqData");
        };
        let payload = match self.cipher.open_json_async(data).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Bank payload could not be opened: {}", e);
                return Verdict::rejected(codes::MALFORMED, "Invalid reqData");
            }
        };
        let notice = match CreditNotice::parse(&payload) {
            Ok(notice) => notice,
            Err(e) => return Verdict::rejected(codes::MALFORMED, e),
        };

        match self.credit(&notice).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(utr = %notice.utr, "Inward credit failed: {}", e);
                Verdict::rejected(codes::INTERNAL, "Internal error")
            }
        }
    }

    async fn credit(&self, notice: &CreditNotice) -> Result<Verdict, AppError> {
        let Some(account) = self.store.virtual_account(&notice.virtual_account).await? else {
            return Ok(Verdict::rejected(
                codes::NOT_APPLIED,
                "Virtual Account Not Found",
            ));
        };

        let credit = InboundCredit {
            id: Uuid::new_v4(),
            utr: notice.utr.clone(),
            virtual_account: account.account_number.clone(),
            merchant_id: account.merchant_id.clone(),
            amount: notice.amount.clone(),
            remitter_name: notice.remitter_name.clone(),
            remitter_account: notice.remitter_account.clone(),
            remitter_ifsc: notice.remitter_ifsc.clone(),
            created_at: Utc::now(),
        };

        let mut unit = self.store.begin().await?;
        if !unit.insert_inbound_credit(&credit).await? {
            tracing::warn!(utr = %credit.utr, "Duplicate UTR");
            return Ok(Verdict::rejected(codes::NOT_APPLIED, "Duplicate UTR"));
        }
        let snapshot = unit.release(&account.merchant_id, &credit.amount).await?;
        let entry = LedgerEntry::new(
            &account.merchant_id,
            Direction::Credit,
            LedgerStatus::Success,
            credit.amount.clone(),
            snapshot,
        )
        .with_reference(credit.utr.clone());
        unit.append_ledger(&entry).await?;
        unit.commit().await?;

        tracing::info!(
            utr = %credit.utr,
            merchant_id = %account.merchant_id,
            amount = %credit.amount,
            "Inward credit applied"
        );
        Ok(Verdict::accepted())
    }

    async fn close(
        &self,
        mut exchange: BankExchange,
        verdict: Verdict,
    ) -> Result<BankReply, AppError> {
        let resp_data = self
            .cipher
            .seal_json_async(verdict.to_json())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let reply = BankReply {
            resp_data,
            msg_id: exchange.msg_id.clone(),
        };
        exchange.response = Some(serde_json::to_value(&reply).unwrap_or(Value::Null));
        exchange.remark = Some(verdict.message.clone());
        if let Err(e) = self.store.save_bank_exchange(&exchange).await {
            tracing::error!("Could not record bank exchange {}: {}", exchange.id, e);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_notice_reads_bank_fields() {
        let payload = json!({
            "inwardCreditUpdateReq": {
                "txnRefNo": "U1",
                "VANum": "VA1",
                "txnAmt": "1500.50",
                "remitterName": "Acme Traders",
                "remitterAccNo": "998877",
                "remitterBankIFSC": "HDFC0001"
            }
        });
        let notice = CreditNotice::parse(&payload).unwrap();
        assert_eq!(notice.utr, "U1");
        assert_eq!(notice.virtual_account, "VA1");
        assert_eq!(notice.amount, BigDecimal::from_str("1500.50").unwrap());
        assert_eq!(notice.remitter_ifsc.as_deref(), Some("HDFC0001"));
    }

    #[test]
    fn test_credit_notice_rejects_bad_amounts() {
        for amt in [json!("-5"), json!("abc"), json!("0"), json!("10.005")] {
            let payload = json!({"inwardCreditUpdateReq": {"txnRefNo": "U1", "VANum": "VA1", "txnAmt": amt}});
            assert!(CreditNotice::parse(&payload).is_err());
        }
    }

    #[test]
    fn test_verdict_shape() {
        let body = Verdict::rejected(codes::NOT_APPLIED, "Duplicate UTR").to_json();
        assert_eq!(body["inwardCreditUpdateResp"]["status"], "F");
        assert_eq!(body["inwardCreditUpdateResp"]["errorCode"], "004");
        assert_eq!(Verdict::accepted().to_json()["inwardCreditUpdateResp"]["status"], "S");
    }
}
