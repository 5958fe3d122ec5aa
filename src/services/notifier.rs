use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Order, Transaction};
use crate::ports::LedgerStore;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Payswitch-Signature";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("callback request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("callback endpoint returned HTTP {0}")]
    Status(u16),
    #[error("invalid signing secret")]
    InvalidSecret,
}

/// Body POSTed to a merchant when a transaction reaches a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeNotice {
    pub crn: Option<String>,
    pub utr: Option<String>,
    pub status: String,
    #[serde(rename = "clientRefID")]
    pub client_ref_id: String,
}

impl OutcomeNotice {
    pub fn from_records(order: &Order, txn: &Transaction) -> Self {
        Self {
            crn: txn.processor_reference.clone(),
            utr: txn.external_reference.clone().or_else(|| order.utr.clone()),
            status: txn.status.as_str().to_uppercase(),
            client_ref_id: order.client_ref_id.clone(),
        }
    }
}

/// Hex HMAC-SHA256 of the body under the shared secret.
pub fn sign_body(secret: &str, body: &[u8]) -> Result<String, NotifyError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| NotifyError::InvalidSecret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Best-effort delivery of outcome notices to merchant callback URLs.
#[derive(Clone)]
pub struct CallbackNotifier {
    client: Client,
    signing_secret: Option<String>,
}

impl CallbackNotifier {
    pub fn new(timeout: Duration, signing_secret: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            signing_secret,
        }
    }

    pub async fn deliver(&self, url: &str, notice: &OutcomeNotice) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(notice).unwrap_or_default();
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.signing_secret {
            request = request.header(SIGNATURE_HEADER, sign_body(secret, &body)?);
        }
        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Looks up the merchant's callback URL and delivers in the background.
    /// Never fails: ledger state is already committed when this runs.
    pub async fn announce(&self, store: &dyn LedgerStore, order: &Order, txn: &Transaction) {
        let url = match store.merchant(&order.merchant_id).await {
            Ok(Some(merchant)) => match merchant.callback_url {
                Some(url) if !url.trim().is_empty() => url,
                _ => return,
            },
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Could not load merchant {} for callback: {}", order.merchant_id, e);
                return;
            }
        };

        let notice = OutcomeNotice::from_records(order, txn);
        let notifier = self.clone();
        let order_id = order.id;
        tokio::spawn(async move {
            match notifier.deliver(&url, &notice).await {
                Ok(()) => tracing::info!(order_id = %order_id, "Merchant callback delivered"),
                Err(e) => tracing::warn!(order_id = %order_id, "Merchant callback failed: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn notice() -> OutcomeNotice {
        OutcomeNotice {
            crn: Some("PX1".into()),
            utr: Some("UTR1".into()),
            status: "SUCCESS".into(),
            client_ref_id: "ref-1".into(),
        }
    }

    #[tokio::test]
    async fn test_deliver_posts_signed_notice() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::to_vec(&notice()).unwrap();
        let signature = sign_body("hook-secret", &body).unwrap();
        let mock = server
            .mock("POST", "/hook")
            .match_header(SIGNATURE_HEADER, signature.as_str())
            .match_body(Matcher::Json(json!({
                "crn": "PX1",
                "utr": "UTR1",
                "status": "SUCCESS",
                "clientRefID": "ref-1",
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = CallbackNotifier::new(Duration::from_secs(5), Some("hook-secret".into()));
        notifier
            .deliver(&format!("{}/hook", server.url()), &notice())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/hook")
            .with_status(502)
            .create_async()
            .await;
        let notifier = CallbackNotifier::new(Duration::from_secs(5), None);
        let err = notifier
            .deliver(&format!("{}/hook", server.url()), &notice())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Status(502)));
    }
}
