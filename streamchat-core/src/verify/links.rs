//! Finding links in assistant text and marking them as reachable or not

use super::{Verification, VerificationCache};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // The pattern is a literal and always compiles
    Regex::new(r"https?://\S+").unwrap_or_else(|_| unreachable!())
});

/// Characters that end a sentence rather than a URL
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '"', '\''];

pub const VALID_MARKER: &str = "✅";
pub const INVALID_MARKER: &str = "❌";

/// Verification result for one distinct URL of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub url: String,
    pub verification: Arc<Verification>,
}

fn trim_url(candidate: &str) -> &str {
    candidate.trim_end_matches(TRAILING_PUNCTUATION)
}

/// Every `http`/`https` URL in `text`, in order of appearance
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|found| trim_url(found.as_str()))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Verify each distinct URL of `text` concurrently through `cache`.
///
/// Reports come back in order of first appearance.
pub async fn validate_urls_in_message(cache: &VerificationCache, text: &str) -> Vec<LinkReport> {
    let mut seen = HashSet::new();
    let urls: Vec<String> = extract_urls(text)
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect();

    let checks = urls.iter().map(|url| cache.check(url));
    let results = join_all(checks).await;

    urls.into_iter()
        .zip(results)
        .map(|(url, verification)| LinkReport { url, verification })
        .collect()
}

/// Append a reachability marker after every reported URL in `text`
pub fn annotate_links(text: &str, reports: &[LinkReport]) -> String {
    if reports.is_empty() {
        return text.to_string();
    }

    let verdicts: HashMap<&str, bool> = reports
        .iter()
        .map(|report| (report.url.as_str(), report.verification.valid))
        .collect();

    let mut annotated = String::with_capacity(text.len() + reports.len() * 8);
    let mut cursor = 0;
    for found in URL_PATTERN.find_iter(text) {
        let url = trim_url(found.as_str());
        let Some(valid) = verdicts.get(url) else {
            continue;
        };
        let url_end = found.start() + url.len();
        annotated.push_str(&text[cursor..url_end]);
        annotated.push(' ');
        annotated.push_str(if *valid { VALID_MARKER } else { INVALID_MARKER });
        cursor = url_end;
    }
    annotated.push_str(&text[cursor..]);
    annotated
}
