#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use payswitch_core::adapters::InMemoryLedgerStore;
use payswitch_core::domain::{
    ActorContext, ApiCredential, Beneficiary, ChargeType, Confirmation, Merchant, MerchantStatus,
    Order, PaymentLink, PricingBand, PricingOwner, Principal, Product, Transaction,
    VirtualAccount, Wallet, WalletStatus,
};
use payswitch_core::envelope::BankCipher;
use payswitch_core::middleware::auth::hash_secret;
use payswitch_core::ports::LedgerStore;
use payswitch_core::processors::{
    CallbackReport, Outcome, ProcessorAdapter, ProcessorError, ProcessorRegistry, ProcessorReport,
};
use payswitch_core::services::{CallbackNotifier, OrderRequest};
use payswitch_core::AppState;

pub const PAYOUT: &str = "payout-sim";
pub const COLLECT: &str = "collect-sim";
pub const PAYOUT_MERCHANT: &str = "m1";
pub const COLLECT_MERCHANT: &str = "m2";
pub const PASSPHRASE: &str = "bank-shared-passphrase";
pub const ADMIN_KEY: &str = "admin-key";

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

/// What the scripted processor answers next.
pub enum Scripted {
    Reply(ProcessorReport),
    Timeout,
    Transport(String),
}

impl Scripted {
    pub fn success(utr: &str) -> Self {
        Scripted::Reply(
            ProcessorReport::new(Outcome::Success {
                utr: Some(utr.to_string()),
            })
            .with_reference(Some(format!("ref-{}", utr))),
        )
    }

    pub fn failed(reason: &str) -> Self {
        Scripted::Reply(ProcessorReport::new(Outcome::Failed {
            reason: reason.to_string(),
        }))
    }

    pub fn pending_with_link(url: &str) -> Self {
        let mut report = ProcessorReport::new(Outcome::Pending).with_reference(Some("rrn-1".into()));
        report.payment_link = Some(PaymentLink {
            payment_url: Some(url.to_string()),
            success_url: None,
            failed_url: None,
            close_url: None,
        });
        Scripted::Reply(report)
    }

    fn into_result(self) -> Result<ProcessorReport, ProcessorError> {
        match self {
            Scripted::Reply(report) => Ok(report),
            Scripted::Timeout => Err(ProcessorError::Timeout),
            Scripted::Transport(msg) => Err(ProcessorError::Transport(msg)),
        }
    }
}

/// Processor double with scripted answers. Dispatch answers are consumed in
/// order; status answers are keyed by client reference.
pub struct ScriptedProcessor {
    name: String,
    confirmation: Confirmation,
    dispatches: Mutex<VecDeque<Scripted>>,
    statuses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    pub dispatched: Mutex<Vec<Uuid>>,
}

impl ScriptedProcessor {
    pub fn new(name: &str, confirmation: Confirmation) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            confirmation,
            dispatches: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            gate: Mutex::new(None),
            dispatched: Mutex::new(Vec::new()),
        })
    }

    pub fn on_dispatch(&self, step: Scripted) {
        self.dispatches.lock().unwrap().push_back(step);
    }

    pub fn on_status(&self, client_ref_id: &str, step: Scripted) {
        self.statuses
            .lock()
            .unwrap()
            .entry(client_ref_id.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }

    /// Holds every dispatch call open until the returned handle is notified.
    pub fn hold_dispatch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Waits until `count` dispatch calls have started.
    pub async fn wait_for_dispatches(&self, count: usize) {
        while self.dispatch_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl ProcessorAdapter for ScriptedProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, confirmation: Confirmation) -> bool {
        confirmation == self.confirmation
    }

    async fn dispatch(
        &self,
        order: &Order,
        _txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError> {
        self.dispatched.lock().unwrap().push(order.id);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let step = self.dispatches.lock().unwrap().pop_front();
        step.unwrap_or(Scripted::Reply(ProcessorReport::new(Outcome::Pending)))
            .into_result()
    }

    async fn query_status(
        &self,
        order: &Order,
        _txn: &Transaction,
    ) -> Result<ProcessorReport, ProcessorError> {
        let step = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(&order.client_ref_id)
            .and_then(|steps| steps.pop_front());
        step.unwrap_or(Scripted::Reply(ProcessorReport::new(Outcome::Pending)))
            .into_result()
    }

    fn parse_callback(&self, payload: &Value) -> Result<CallbackReport, ProcessorError> {
        let order_id = payload
            .get("orderId")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ProcessorError::Malformed("orderId".into()))?;
        let outcome = match payload.get("status").and_then(Value::as_str) {
            Some("SUCCESS") => Outcome::Success {
                utr: payload.get("utr").and_then(Value::as_str).map(str::to_string),
            },
            Some("FAILED") => Outcome::Failed {
                reason: "declined".into(),
            },
            Some("PENDING") => Outcome::Pending,
            _ => return Err(ProcessorError::Malformed("status".into())),
        };
        // Mirrors the real adapters: collection callbacks are signed, payout ones are not.
        Ok(CallbackReport {
            order_id,
            report: ProcessorReport::new(outcome),
            signed: self.confirmation == Confirmation::Asynchronous,
        })
    }
}

pub struct Fixture {
    pub store: InMemoryLedgerStore,
    pub payout: Arc<ScriptedProcessor>,
    pub collect: Arc<ScriptedProcessor>,
    pub state: AppState,
    pub cipher: BankCipher,
}

fn band(product: &str) -> PricingBand {
    PricingBand {
        product: product.to_string(),
        start_value: dec("1"),
        end_value: dec("10000"),
        fee_type: ChargeType::Flat,
        fee: dec("10"),
        tax_type: ChargeType::Percentage,
        tax: dec("10"),
    }
}

async fn seed_merchant(store: &InMemoryLedgerStore, id: &str, processor: &str, key: &str) {
    store
        .seed_merchant(Merchant {
            id: id.to_string(),
            status: MerchantStatus::Approved,
            processor_id: Some(processor.to_string()),
            callback_url: None,
        })
        .await;
    store
        .seed_wallet(Wallet {
            account_id: id.to_string(),
            balance: dec("1000"),
            status: WalletStatus::Active,
        })
        .await;
    store
        .seed_credential(ApiCredential {
            api_key: key.to_string(),
            secret_hash: hash_secret(&format!("{}-secret", key)),
            principal: Principal::Merchant(id.to_string()),
        })
        .await;
}

impl Fixture {
    /// Two merchants with 1000 each: `m1` pays out through a synchronous
    /// processor, `m2` collects through an asynchronous one. Pricing is a
    /// flat 10 fee plus 10% tax on the fee for amounts 1..=10000.
    pub async fn new() -> Self {
        let store = InMemoryLedgerStore::new();

        seed_merchant(&store, PAYOUT_MERCHANT, PAYOUT, "mkey").await;
        seed_merchant(&store, COLLECT_MERCHANT, COLLECT, "ckey").await;

        for (code, confirmation) in [
            ("IMPS", Confirmation::Synchronous),
            ("NEFT", Confirmation::Synchronous),
            ("UPI", Confirmation::Asynchronous),
        ] {
            store
                .seed_product(Product {
                    code: code.to_string(),
                    is_active: true,
                    confirmation,
                })
                .await;
        }
        for (owner, product) in [
            (PricingOwner::Merchant(PAYOUT_MERCHANT.into()), "IMPS"),
            (PricingOwner::Merchant(PAYOUT_MERCHANT.into()), "NEFT"),
            (PricingOwner::Merchant(COLLECT_MERCHANT.into()), "UPI"),
            (PricingOwner::Processor(PAYOUT.into()), "IMPS"),
            (PricingOwner::Processor(PAYOUT.into()), "NEFT"),
            (PricingOwner::Processor(COLLECT.into()), "UPI"),
        ] {
            store.seed_pricing(owner, band(product)).await;
        }

        store
            .seed_credential(ApiCredential {
                api_key: "bkey".into(),
                secret_hash: hash_secret("bsecret"),
                principal: Principal::Bank,
            })
            .await;
        store
            .seed_virtual_account(VirtualAccount {
                account_number: "VA1".into(),
                merchant_id: PAYOUT_MERCHANT.into(),
            })
            .await;

        let payout = ScriptedProcessor::new(PAYOUT, Confirmation::Synchronous);
        let collect = ScriptedProcessor::new(COLLECT, Confirmation::Asynchronous);
        let registry = Arc::new(ProcessorRegistry::from_adapters(vec![
            payout.clone() as Arc<dyn ProcessorAdapter>,
            collect.clone() as Arc<dyn ProcessorAdapter>,
        ]));

        let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let state = AppState::new(
            shared,
            registry,
            BankCipher::new(PASSPHRASE),
            CallbackNotifier::new(Duration::from_secs(2), None),
            ADMIN_KEY,
        )
        .with_dispatch_grace(Duration::ZERO);

        Self {
            store,
            payout,
            collect,
            state,
            cipher: BankCipher::new(PASSPHRASE),
        }
    }

    pub async fn balance(&self, account_id: &str) -> BigDecimal {
        self.store.wallet(account_id).await.unwrap().unwrap().balance
    }

    pub fn payout_actor(&self) -> ActorContext {
        ActorContext::new(PAYOUT_MERCHANT.to_string())
    }

    pub fn collect_actor(&self) -> ActorContext {
        ActorContext::new(COLLECT_MERCHANT.to_string())
    }
}

pub fn imps_request(client_ref_id: &str, amount: &str) -> OrderRequest {
    OrderRequest {
        product: "IMPS".into(),
        amount: dec(amount),
        client_ref_id: client_ref_id.into(),
        beneficiary: Beneficiary::BankTransfer {
            customer_name: "Asha Rao".into(),
            account_no: "001122334455".into(),
            ifsc: "HDFC0000123".into(),
            bank: "HDFC".into(),
            purpose: "vendor payment".into(),
            narration: None,
        },
    }
}

pub fn upi_request(client_ref_id: &str, amount: &str) -> OrderRequest {
    OrderRequest {
        product: "UPI".into(),
        amount: dec(amount),
        client_ref_id: client_ref_id.into(),
        beneficiary: Beneficiary::Upi {
            customer_name: "Asha Rao".into(),
            customer_email: "asha@example.com".into(),
            customer_phone: "9876543210".into(),
            vpa: Some("asha@upi".into()),
            purpose: "collection".into(),
        },
    }
}

pub fn imps_body(client_ref_id: &str, amount: &str) -> Value {
    json!({
        "mode": "IMPS",
        "customer_name": "Asha Rao",
        "accountNo": "001122334455",
        "ifsc": "HDFC0000123",
        "bank": "HDFC",
        "amount": amount,
        "purpose": "vendor payment",
        "clientRefId": client_ref_id
    })
}

pub fn bank_auth() -> String {
    format!("Bearer {}", STANDARD.encode("bkey:bsecret"))
}

/// Sealed inward-credit request body.
pub fn inward_credit(cipher: &BankCipher, msg_id: &str, utr: &str, va: &str, amount: &str) -> Value {
    let req_data = cipher
        .seal_json(&json!({
            "inwardCreditUpdateReq": {
                "txnRefNo": utr,
                "VANum": va,
                "txnAmt": amount,
                "remitterName": "Acme Traders",
                "remitterAccNo": "998877665544",
                "remitterBankIFSC": "ICIC0000001"
            }
        }))
        .unwrap();
    json!({ "msgId": msg_id, "reqData": req_data })
}

/// Decrypts a bank reply to its `inwardCreditUpdateResp` object.
pub fn open_reply(cipher: &BankCipher, resp_data: &str) -> Value {
    cipher.open_json(resp_data).unwrap()["inwardCreditUpdateResp"].clone()
}
