//! Transport seam between the stream controller and the network
//!
//! A [`Transport`] opens one streaming response and hands back its body as an
//! ordered stream of byte chunks. Dropping the returned [`ByteStream`] releases
//! the connection, so every exit path of a consumer aborts the request.

use crate::config::ServerConfig;
use crate::stream::ChatRequest;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client as HttpClient;
use std::pin::Pin;
use std::time::Duration;

/// Body of an open streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Failures below the framing layer. Every variant is fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established or was reset
    #[error("Network error: {0}")]
    Network(String),
    /// The server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// Reading the body failed part way through
    #[error("Failed to read chunk: {0}")]
    Read(String),
    /// No data arrived in time
    #[error("Timeout during {operation} after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streaming response for `request`
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

/// [`Transport`] that POSTs the request as JSON to the streaming endpoint
#[derive(Clone)]
pub struct HttpTransport {
    http_client: HttpClient,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            url: url.into(),
        }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(server.endpoint(&server.stream_path))
    }

    pub fn with_client(mut self, http_client: HttpClient) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    message
                },
            });
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Read(e.to_string()))
        });

        Ok(Box::pin(body))
    }
}
