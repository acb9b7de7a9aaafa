//! Request/response client for the conversation API
//!
//! Everything besides the streaming endpoint: the session list, stored
//! history, session management and the non-streaming chat call.

use crate::config::ServerConfig;
use crate::config::constants::urls;
use crate::stream::ChatRequest;
use reqwest::{Client as HttpClient, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("Invalid endpoint URL: {0}")]
    Url(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// One entry of the session list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub message_count: u64,
}

/// One stored message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Answer of the non-streaming chat endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub response: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Clone)]
pub struct ConversationApi {
    http_client: HttpClient,
    base_url: String,
}

impl ConversationApi {
    pub fn new(server: &ServerConfig) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder()
            .timeout(server.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self::with_client(server, http_client))
    }

    pub fn with_client(server: &ServerConfig, http_client: HttpClient) -> Self {
        Self {
            http_client,
            base_url: server.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// All sessions, most recently updated first
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let url = self.url(urls::SESSIONS_PATH, &[])?;
        let response = self.http_client.get(url).send().await?;
        decode(response).await
    }

    /// Stored messages of `session_id`, oldest first
    pub async fn history(&self, session_id: &str) -> Result<Vec<HistoryMessage>, ApiError> {
        let url = self.url(urls::HISTORY_PATH, &[session_id])?;
        let response = self.http_client.get(url).send().await?;
        decode(response).await
    }

    pub async fn new_session(&self) -> Result<SessionSummary, ApiError> {
        let url = self.url(urls::NEW_SESSION_PATH, &[])?;
        let response = self.http_client.post(url).send().await?;
        let session: SessionSummary = decode(response).await?;
        debug!(session_id = %session.session_id, "created conversation");
        Ok(session)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let url = self.url(urls::SESSION_PATH, &[session_id])?;
        let response = self.http_client.delete(url).send().await?;
        check_status(response).await?;
        debug!(session_id, "deleted conversation");
        Ok(())
    }

    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), ApiError> {
        let url = self.url(urls::SESSION_PATH, &[session_id, "title"])?;
        let response = self
            .http_client
            .put(url)
            .query(&[("title", title)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Non-streaming chat call; returns the whole answer at once
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let url = self.url(urls::CHAT_PATH, &[])?;
        let response = self.http_client.post(url).json(request).send().await?;
        decode(response).await
    }

    /// `base_url` + `path` + percent-encoded `segments`
    fn url(&self, path: &str, segments: &[&str]) -> Result<Url, ApiError> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| ApiError::Url(format!("{raw}: {e}")))?;
        if !segments.is_empty() {
            url.path_segments_mut()
                .map_err(|_| ApiError::Url(raw.clone()))?
                .extend(segments);
        }
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|error| error.detail)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                body
            }
        });
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ConversationApi {
        let server = ServerConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..ServerConfig::default()
        };
        ConversationApi::new(&server).unwrap()
    }

    #[test]
    fn builds_endpoint_urls() {
        let api = api();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(
            api.url(urls::SESSIONS_PATH, &[]).unwrap().as_str(),
            "http://localhost:8000/api/sessions"
        );
        assert_eq!(
            api.url(urls::SESSION_PATH, &["abc-1", "title"])
                .unwrap()
                .as_str(),
            "http://localhost:8000/api/session/abc-1/title"
        );
    }

    #[test]
    fn session_ids_are_percent_encoded() {
        let url = api().url(urls::HISTORY_PATH, &["a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/history/a%2Fb%20c");
    }

    #[test]
    fn decodes_session_list_payload() {
        let body = r#"[
            {"session_id": "s1", "title": "Trip plan", "created_at": "2024-05-01T10:00:00",
             "updated_at": "2024-05-01T10:05:00", "message_count": 4},
            {"session_id": "s2", "title": "New Chat"}
        ]"#;
        let sessions: Vec<SessionSummary> = serde_json::from_str(body).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].message_count, 4);
        assert_eq!(sessions[1].created_at, None);
    }

    #[test]
    fn not_found_is_detectable() {
        let error = ApiError::Status {
            status: 404,
            detail: "Session not found".to_string(),
        };
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "HTTP 404: Session not found");
    }
}
