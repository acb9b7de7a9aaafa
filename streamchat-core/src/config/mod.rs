//! streamchat configuration module
//!
//! This module handles loading and managing configuration from `streamchat.toml`
//! files. Every section falls back to defaults so an empty file is valid.

pub mod constants;
pub mod loader;

pub use loader::{ConfigManager, StreamChatConfig};

use constants::{defaults, urls};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote assistant service settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL of the assistant service, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the streaming chat endpoint
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Path of the URL validation endpoint
    #[serde(default = "default_validate_path")]
    pub validate_path: String,

    /// Timeout for plain request/response calls in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    urls::DEFAULT_BASE_URL.to_string()
}
fn default_stream_path() -> String {
    urls::STREAM_PATH.to_string()
}
fn default_validate_path() -> String {
    urls::VALIDATE_URL_PATH.to_string()
}
fn default_request_timeout_ms() -> u64 {
    defaults::REQUEST_TIMEOUT_MS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            validate_path: default_validate_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Join `path` onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Streaming consumer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingSettings {
    /// Maximum time to wait for the first chunk of a response
    #[serde(default = "default_first_chunk_timeout_ms")]
    pub first_chunk_timeout_ms: u64,

    /// Maximum silence between two chunks once the response has started
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,

    /// Treat an unframed first chunk as raw answer text
    #[serde(default = "default_true")]
    pub raw_text_fallback: bool,
}

fn default_first_chunk_timeout_ms() -> u64 {
    defaults::FIRST_CHUNK_TIMEOUT_MS
}
fn default_chunk_timeout_ms() -> u64 {
    defaults::CHUNK_TIMEOUT_MS
}
fn default_true() -> bool {
    true
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            first_chunk_timeout_ms: default_first_chunk_timeout_ms(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            raw_text_fallback: default_true(),
        }
    }
}

/// How link reachability is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Ask the assistant service's validation endpoint
    #[default]
    Endpoint,
    /// Send a HEAD request straight from the client
    Direct,
}

/// Link verification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationConfig {
    /// Timeout handed to the checker, in milliseconds
    #[serde(default = "default_verify_timeout_ms")]
    pub timeout_ms: u64,

    /// Slack added on top of `timeout_ms` before the cache gives up
    #[serde(default = "default_verify_grace_ms")]
    pub grace_ms: u64,

    #[serde(default)]
    pub mode: VerificationMode,
}

fn default_verify_timeout_ms() -> u64 {
    defaults::VERIFY_TIMEOUT_MS
}
fn default_verify_grace_ms() -> u64 {
    defaults::VERIFY_GRACE_MS
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_verify_timeout_ms(),
            grace_ms: default_verify_grace_ms(),
            mode: VerificationMode::default(),
        }
    }
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    defaults::LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}
