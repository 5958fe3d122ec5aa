use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::ProcessorError;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RESET_SECS: u64 = 30;

/// JSON-over-HTTP client for one processor, guarded by a circuit breaker.
#[derive(Clone)]
pub struct ProcessorClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl ProcessorClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ProcessorError> {
        Self::with_circuit_breaker(
            base_url,
            timeout,
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_RESET_SECS,
        )
    }

    pub fn with_circuit_breaker(
        base_url: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessorError::Config(format!("http client for {}: {}", base_url, e)))?;

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(ProcessorClient {
            client,
            base_url,
            circuit_breaker,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// POSTs a JSON body and returns the JSON response.
    /// Non-2xx, unparseable bodies and timeouts all surface as errors.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ProcessorError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let client = self.client.clone();
        let body = body.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.post(&url).json(&body).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ProcessorError::Status(status.as_u16()));
                }
                let text = response.text().await?;
                serde_json::from_str::<Value>(&text)
                    .map_err(|e| ProcessorError::Malformed(e.to_string()))
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(ProcessorError::CircuitOpen(format!(
                "circuit breaker for {} is open",
                self.base_url
            ))),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/payout")
            .with_status(503)
            .create_async()
            .await;

        let client = ProcessorClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = client.post_json("/payout", &json!({})).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Status(503)));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/payout")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = ProcessorClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = client.post_json("payout", &json!({})).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Malformed(_)));
    }

    #[test]
    fn test_new_client_starts_closed() {
        let client =
            ProcessorClient::new("http://localhost:9".to_string(), Duration::from_millis(250))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:9");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_failures() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/payout")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let client =
            ProcessorClient::with_circuit_breaker(server.url(), Duration::from_secs(5), 2, 60)
                .unwrap();
        for _ in 0..2 {
            let _ = client.post_json("/payout", &json!({})).await;
        }
        assert_eq!(client.circuit_state(), "open");
        let err = client.post_json("/payout", &json!({})).await.unwrap_err();
        assert!(matches!(err, ProcessorError::CircuitOpen(_)));
    }
}
