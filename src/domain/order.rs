//! Order domain entity and the status machine shared with transactions.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Longest cancellation reason kept on an order.
pub const CANCELLATION_REASON_MAX_LEN: usize = 100;

/// Status shared by orders and their transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Queued,
    Processing,
    Pending,
    Success,
    Failed,
    Cancelled,
    Reversed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Queued => "Queued",
            OrderStatus::Processing => "Processing",
            OrderStatus::Pending => "Pending",
            OrderStatus::Success => "Success",
            OrderStatus::Failed => "Failed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Reversed => "Reversed",
        }
    }

    /// `Success`, `Cancelled` and `Reversed` accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Success | OrderStatus::Cancelled | OrderStatus::Reversed
        )
    }

    /// Orders in these states are still waiting on a processor outcome.
    pub fn awaits_outcome(&self) -> bool {
        matches!(self, OrderStatus::Queued | OrderStatus::Processing)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Queued => matches!(
                next,
                Processing | Pending | Success | Failed | Cancelled | Reversed
            ),
            Processing => matches!(next, Pending | Success | Failed | Cancelled | Reversed),
            Pending => matches!(next, Processing | Success | Failed | Cancelled | Reversed),
            Failed => matches!(next, Cancelled),
            Success | Cancelled | Reversed => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(OrderStatus::Queued),
            "Processing" => Ok(OrderStatus::Processing),
            "Pending" => Ok(OrderStatus::Pending),
            "Success" => Ok(OrderStatus::Success),
            "Failed" => Ok(OrderStatus::Failed),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            "Reversed" => Ok(OrderStatus::Reversed),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// Who receives the money, by payment mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Beneficiary {
    BankTransfer {
        customer_name: String,
        account_no: String,
        ifsc: String,
        bank: String,
        purpose: String,
        narration: Option<String>,
    },
    Upi {
        customer_name: String,
        customer_email: String,
        customer_phone: String,
        vpa: Option<String>,
        purpose: String,
    },
}

impl Beneficiary {
    pub fn customer_name(&self) -> &str {
        match self {
            Beneficiary::BankTransfer { customer_name, .. } => customer_name,
            Beneficiary::Upi { customer_name, .. } => customer_name,
        }
    }

    pub fn account_no(&self) -> Option<&str> {
        match self {
            Beneficiary::BankTransfer { account_no, .. } => Some(account_no),
            Beneficiary::Upi { .. } => None,
        }
    }
}

/// Redirect payload returned for asynchronously confirmed collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    pub payment_url: Option<String>,
    pub success_url: Option<String>,
    pub failed_url: Option<String>,
    pub close_url: Option<String>,
}

impl PaymentLink {
    pub fn is_empty(&self) -> bool {
        self.payment_url.is_none()
            && self.success_url.is_none()
            && self.failed_url.is_none()
            && self.close_url.is_none()
    }
}

/// A merchant order. `client_ref_id` never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub merchant_id: String,
    pub client_ref_id: String,
    pub product: String,
    pub processor_id: String,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub tax: BigDecimal,
    pub transaction_amount: BigDecimal,
    pub status: OrderStatus,
    pub utr: Option<String>,
    pub beneficiary: Beneficiary,
    pub payment_link: Option<PaymentLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        merchant_id: String,
        client_ref_id: String,
        product: String,
        processor_id: String,
        amount: BigDecimal,
        fee: BigDecimal,
        tax: BigDecimal,
        beneficiary: Beneficiary,
    ) -> Self {
        let now = Utc::now();
        let transaction_amount = &amount + &fee + &tax;
        Self {
            id: Uuid::new_v4(),
            merchant_id,
            client_ref_id,
            product,
            processor_id,
            amount,
            fee,
            tax,
            transaction_amount,
            status: OrderStatus::Queued,
            utr: None,
            beneficiary,
            payment_link: None,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancellation_reason: None,
        }
    }

    /// Moves the order to `next`, rejecting moves the status machine forbids.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), String> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "order {} cannot move from {} to {}",
                self.id, self.status, next
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn cancel(&mut self, status: OrderStatus, reason: &str) -> Result<(), String> {
        self.transition(status)?;
        let now = Utc::now();
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.chars().take(CANCELLATION_REASON_MAX_LEN).collect());
        Ok(())
    }
}

/// How a merchant identifies an order in a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
    OrderRef(Uuid),
    ClientRef(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(
            "m1".into(),
            "ref-1".into(),
            "IMPS".into(),
            "payout-bank".into(),
            BigDecimal::from(500),
            BigDecimal::from(10),
            BigDecimal::from(1),
            Beneficiary::BankTransfer {
                customer_name: "Asha".into(),
                account_no: "001122".into(),
                ifsc: "UBIN0001".into(),
                bank: "UNION".into(),
                purpose: "salary".into(),
                narration: None,
            },
        )
    }

    #[test]
    fn test_transaction_amount_is_amount_plus_fee_plus_tax() {
        let order = order();
        assert_eq!(order.transaction_amount, BigDecimal::from(511));
        assert_eq!(order.status, OrderStatus::Queued);
    }

    #[test]
    fn test_success_is_immutable() {
        let mut order = order();
        order.transition(OrderStatus::Processing).unwrap();
        order.transition(OrderStatus::Success).unwrap();
        assert!(order.transition(OrderStatus::Reversed).is_err());
        assert!(order.cancel(OrderStatus::Cancelled, "late").is_err());
    }

    #[test]
    fn test_failed_only_moves_to_cancelled() {
        assert!(OrderStatus::Failed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Success));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_cancel_truncates_reason() {
        let mut order = order();
        let reason = "x".repeat(250);
        order.cancel(OrderStatus::Cancelled, &reason).unwrap();
        assert_eq!(order.cancellation_reason.unwrap().len(), CANCELLATION_REASON_MAX_LEN);
        assert!(order.cancelled_at.is_some());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OrderStatus::Queued,
            OrderStatus::Processing,
            OrderStatus::Pending,
            OrderStatus::Success,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
            OrderStatus::Reversed,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Processed".parse::<OrderStatus>().is_err());
    }
}
