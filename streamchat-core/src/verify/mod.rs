//! Link verification with memoization and in-flight suppression
//!
//! [`VerificationCache::check`] answers "is this URL reachable?" at most once
//! per URL. Concurrent callers for the same URL attach to one shared check, and
//! every caller receives the same [`Arc<Verification>`].

pub mod checker;
pub mod links;

pub use checker::{DirectVerifier, EndpointVerifier, LinkVerifier, VerifyError};
pub use links::{LinkReport, annotate_links, extract_urls, validate_urls_in_message};

use crate::config::StreamChatConfig;
use crate::config::constants::messages;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of checking one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    /// HTTP status of the final response, `0` when there was none
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Verification {
    /// Outcome for a reachable or unreachable response with a status
    pub fn from_status(status: u16) -> Self {
        let valid = (200..400).contains(&status);
        Self {
            valid,
            status,
            error: (!valid).then(|| format!("HTTP {status}")),
            final_url: None,
            content_type: None,
        }
    }

    /// Outcome for a check that produced no HTTP status
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            status: 0,
            error: Some(error.into()),
            final_url: None,
            content_type: None,
        }
    }

    pub fn invalid_format() -> Self {
        Self::failed(messages::VERIFY_INVALID_FORMAT)
    }

    pub fn timed_out() -> Self {
        Self::failed(messages::VERIFY_TIMEOUT)
    }
}

/// `true` for absolute `http`/`https` URLs with a host
pub fn is_valid_url(candidate: &str) -> bool {
    normalize_url(candidate).is_some()
}

/// Canonical form of a valid URL, used as the cache key.
///
/// Scheme and host are lowercased, default ports dropped and an empty path
/// becomes `/`.
pub fn normalize_url(candidate: &str) -> Option<String> {
    let url = Url::parse(candidate).ok()?;
    (matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .then(|| url.to_string())
}

/// Counters describing cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that attached to a check already in progress
    pub joins: u64,
    pub entries: usize,
    pub in_flight: usize,
}

type SharedCheck = Shared<BoxFuture<'static, Arc<Verification>>>;

struct InFlight {
    generation: u64,
    check: SharedCheck,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<Verification>>,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
    hits: u64,
    misses: u64,
    joins: u64,
}

struct CacheInner {
    verifier: Arc<dyn LinkVerifier>,
    timeout: Duration,
    grace: Duration,
    state: Mutex<CacheState>,
}

impl CacheInner {
    /// Record a finished check. Only the check that registered the current
    /// in-flight slot may remove it.
    fn settle(&self, url: &str, generation: u64, result: Arc<Verification>) {
        let mut state = self.state.lock();
        state.entries.insert(url.to_string(), result);
        if state
            .in_flight
            .get(url)
            .is_some_and(|slot| slot.generation == generation)
        {
            state.in_flight.remove(url);
        }
    }
}

/// Memoizing, deduplicating front of a [`LinkVerifier`]
#[derive(Clone)]
pub struct VerificationCache {
    inner: Arc<CacheInner>,
}

impl VerificationCache {
    pub fn new(verifier: Arc<dyn LinkVerifier>, timeout: Duration, grace: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                verifier,
                timeout,
                grace,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Cache over the verifier selected by `verification.mode`
    pub fn from_config(config: &StreamChatConfig) -> Self {
        Self::new(
            checker::verifier_from_config(config),
            config.verification.timeout(),
            config.verification.grace(),
        )
    }

    /// Verify `url`, reusing a cached or in-progress result.
    ///
    /// Never fails: timeouts, checker errors and malformed input all come back
    /// as `valid: false` values. Dropping the returned future does not stop the
    /// underlying check.
    pub async fn check(&self, url: &str) -> Arc<Verification> {
        let Some(key) = normalize_url(url) else {
            return Arc::new(Verification::invalid_format());
        };

        let check = {
            let mut state = self.inner.state.lock();
            if let Some(entry) = state.entries.get(&key) {
                let entry = Arc::clone(entry);
                state.hits += 1;
                return entry;
            }

            if let Some(slot) = state.in_flight.get(&key) {
                let check = slot.check.clone();
                state.joins += 1;
                check
            } else {
                state.misses += 1;
                state.next_generation += 1;
                let generation = state.next_generation;
                let check = self.spawn_check(key.clone(), generation);
                state.in_flight.insert(
                    key,
                    InFlight {
                        generation,
                        check: check.clone(),
                    },
                );
                check
            }
        };

        check.await
    }

    /// Forget every cached and in-flight entry. Checks already running still
    /// finish and store their result.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.in_flight.clear();
    }

    /// Cached result for `url`, without starting a check
    pub fn cached(&self, url: &str) -> Option<Arc<Verification>> {
        let key = normalize_url(url)?;
        self.inner.state.lock().entries.get(&key).cloned()
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        normalize_url(url)
            .is_some_and(|key| self.inner.state.lock().in_flight.contains_key(&key))
    }

    pub fn stats(&self) -> VerificationStats {
        let state = self.inner.state.lock();
        VerificationStats {
            hits: state.hits,
            misses: state.misses,
            joins: state.joins,
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
        }
    }

    fn spawn_check(&self, url: String, generation: u64) -> SharedCheck {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let deadline = inner.timeout + inner.grace;
            let result =
                match tokio::time::timeout(deadline, inner.verifier.verify(&url, inner.timeout))
                    .await
                {
                    Ok(Ok(verification)) => verification,
                    Ok(Err(VerifyError::Timeout)) => {
                        debug!(url = %url, "link checker timed out");
                        Verification::timed_out()
                    }
                    Ok(Err(error)) => {
                        warn!(url = %url, error = %error, "link verification failed");
                        Verification::failed(error.to_string())
                    }
                    Err(_) => {
                        debug!(url = %url, ?deadline, "link verification timed out");
                        Verification::timed_out()
                    }
                };
            let result = Arc::new(result);
            inner.settle(&url, generation, Arc::clone(&result));
            result
        });

        async move {
            task.await
                .unwrap_or_else(|error| Arc::new(Verification::failed(error.to_string())))
        }
        .boxed()
        .shared()
    }
}
