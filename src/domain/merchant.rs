//! Merchant-side reference data: merchants, wallets, products, pricing and processors.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Explicit caller identity handed to every core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub merchant_id: String,
}

impl ActorContext {
    pub fn new(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MerchantStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl MerchantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MerchantStatus::Pending => "pending",
            MerchantStatus::Approved => "approved",
            MerchantStatus::Rejected => "rejected",
            MerchantStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for MerchantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MerchantStatus::Pending),
            "approved" => Ok(MerchantStatus::Approved),
            "rejected" => Ok(MerchantStatus::Rejected),
            "suspended" => Ok(MerchantStatus::Suspended),
            other => Err(format!("unknown merchant status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub status: MerchantStatus,
    pub processor_id: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletStatus {
    Active,
    Inactive,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "active",
            WalletStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for WalletStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(WalletStatus::Active),
            "inactive" => Ok(WalletStatus::Inactive),
            other => Err(format!("unknown wallet status '{}'", other)),
        }
    }
}

/// One wallet per merchant, keyed by the merchant id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub account_id: String,
    pub balance: BigDecimal,
    pub status: WalletStatus,
}

/// Singleton accumulator of fee and tax collected by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformWallet {
    pub fee: BigDecimal,
    pub tax: BigDecimal,
}

impl Default for PlatformWallet {
    fn default() -> Self {
        Self {
            fee: BigDecimal::from(0),
            tax: BigDecimal::from(0),
        }
    }
}

/// How a product learns its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    /// The dispatch response carries the outcome.
    Synchronous,
    /// The outcome arrives later by callback or requery.
    Asynchronous,
}

impl Confirmation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confirmation::Synchronous => "synchronous",
            Confirmation::Asynchronous => "asynchronous",
        }
    }
}

impl FromStr for Confirmation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synchronous" => Ok(Confirmation::Synchronous),
            "asynchronous" => Ok(Confirmation::Asynchronous),
            other => Err(format!("unknown confirmation mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub is_active: bool,
    pub confirmation: Confirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeType {
    Flat,
    Percentage,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Flat => "flat",
            ChargeType::Percentage => "percentage",
        }
    }
}

impl FromStr for ChargeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(ChargeType::Flat),
            "percentage" => Ok(ChargeType::Percentage),
            other => Err(format!("unknown charge type '{}'", other)),
        }
    }
}

/// Who a pricing row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PricingOwner {
    Merchant(String),
    Processor(String),
}

impl PricingOwner {
    pub fn kind(&self) -> &'static str {
        match self {
            PricingOwner::Merchant(_) => "merchant",
            PricingOwner::Processor(_) => "processor",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PricingOwner::Merchant(id) | PricingOwner::Processor(id) => id,
        }
    }
}

/// Fee and tax for one product within an inclusive amount band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingBand {
    pub product: String,
    pub start_value: BigDecimal,
    pub end_value: BigDecimal,
    pub fee_type: ChargeType,
    pub fee: BigDecimal,
    pub tax_type: ChargeType,
    pub tax: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorKind {
    Payout,
    Collect,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Payout => "payout",
            ProcessorKind::Collect => "collect",
        }
    }
}

impl FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payout" => Ok(ProcessorKind::Payout),
            "collect" => Ok(ProcessorKind::Collect),
            other => Err(format!("unknown processor kind '{}'", other)),
        }
    }
}

/// Connection details for one external processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub name: String,
    pub kind: ProcessorKind,
    pub endpoint: String,
    pub client_id: String,
    pub secret_key: String,
    /// Processor specific settings such as the payee VPA.
    pub settings: serde_json::Value,
    pub is_active: bool,
}

impl ProcessorConfig {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Merchant(String),
    Bank,
}

/// Stored API credential. The secret is kept only as a SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredential {
    pub api_key: String,
    pub secret_hash: String,
    pub principal: Principal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub account_number: String,
    pub merchant_id: String,
}

/// Write-once trace of an API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAudit {
    pub id: Uuid,
    pub endpoint: String,
    pub merchant_id: Option<String>,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ApiAudit {
    pub fn new(
        endpoint: &str,
        merchant_id: Option<String>,
        request: serde_json::Value,
        response: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint: endpoint.to_string(),
            merchant_id,
            request,
            response,
            created_at: Utc::now(),
        }
    }
}

/// One inbound/outbound pair exchanged with the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankExchange {
    pub id: Uuid,
    pub msg_id: Option<String>,
    pub request: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub remark: Option<String>,
    /// Whether this row owns its `msg_id` for duplicate detection.
    pub claims_msg_id: bool,
    pub created_at: DateTime<Utc>,
}

impl BankExchange {
    pub fn new(msg_id: Option<String>, request: serde_json::Value, claims_msg_id: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            msg_id,
            request,
            response: None,
            remark: None,
            claims_msg_id,
            created_at: Utc::now(),
        }
    }
}
