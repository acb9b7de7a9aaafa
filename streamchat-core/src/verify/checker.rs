//! Link checkers behind the verification cache

use super::Verification;
use crate::config::{StreamChatConfig, VerificationMode};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const CHECKER_USER_AGENT: &str = concat!("streamchat/", env!("CARGO_PKG_VERSION"));

/// Checker failures. The cache turns these into `valid: false` results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("Request timeout")]
    Timeout,
    #[error("Connection error - unable to reach the server")]
    Connect,
    #[error("Validation endpoint returned HTTP {0}")]
    Endpoint(u16),
    #[error("Validation error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for VerifyError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else {
            Self::Other(error.to_string())
        }
    }
}

/// Answers whether one URL is reachable
#[async_trait]
pub trait LinkVerifier: Send + Sync {
    async fn verify(&self, url: &str, timeout: Duration) -> Result<Verification, VerifyError>;
}

/// Build the verifier selected by `verification.mode`
pub fn verifier_from_config(config: &StreamChatConfig) -> Arc<dyn LinkVerifier> {
    match config.verification.mode {
        VerificationMode::Endpoint => Arc::new(EndpointVerifier::new(
            config.server.endpoint(&config.server.validate_path),
        )),
        VerificationMode::Direct => Arc::new(DirectVerifier::new()),
    }
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    url: &'a str,
    /// Milliseconds
    timeout: u64,
}

/// Delegates to the assistant service's validation endpoint
#[derive(Clone)]
pub struct EndpointVerifier {
    http_client: HttpClient,
    url: String,
}

impl EndpointVerifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LinkVerifier for EndpointVerifier {
    async fn verify(&self, url: &str, timeout: Duration) -> Result<Verification, VerifyError> {
        let body = ValidateRequest {
            url,
            timeout: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        let response = self.http_client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Endpoint(status.as_u16()));
        }

        response
            .json::<Verification>()
            .await
            .map_err(|e| VerifyError::Other(e.to_string()))
    }
}

/// Sends a `HEAD` request straight to the target, following redirects
#[derive(Clone)]
pub struct DirectVerifier {
    http_client: HttpClient,
}

impl DirectVerifier {
    pub fn new() -> Self {
        Self {
            http_client: HttpClient::new(),
        }
    }

    pub fn with_client(http_client: HttpClient) -> Self {
        Self { http_client }
    }
}

impl Default for DirectVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkVerifier for DirectVerifier {
    async fn verify(&self, url: &str, timeout: Duration) -> Result<Verification, VerifyError> {
        let response = self
            .http_client
            .head(url)
            .header(USER_AGENT, CHECKER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .timeout(timeout)
            .send()
            .await?;

        let mut verification = Verification::from_status(response.status().as_u16());
        verification.final_url = Some(response.url().to_string());
        verification.content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationMode;

    #[test]
    fn request_body_uses_milliseconds() {
        let body = serde_json::to_value(ValidateRequest {
            url: "https://example.com",
            timeout: 5_000,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"url": "https://example.com", "timeout": 5000})
        );
    }

    #[test]
    fn endpoint_mode_targets_validation_path() {
        let mut config = StreamChatConfig::default();
        config.server.base_url = "http://chat.internal:9000/".to_string();
        let verifier = EndpointVerifier::new(config.server.endpoint(&config.server.validate_path));
        assert_eq!(verifier.url(), "http://chat.internal:9000/api/validate-url");

        config.verification.mode = VerificationMode::Direct;
        // Only checks that construction does not touch the network
        let _ = verifier_from_config(&config);
    }
}
