//! Feed fetching with retry

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;

use crate::errors::{FetchError, NON_RETRYABLE_STATUS_CODES};
use gtfsrt_config::{AuthPlacement, FeedSpec};
use gtfsrt_resilience::RetryExecutor;

/// Result of a successful feed fetch. Constructed only on HTTP success and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub content: Bytes,
    pub status_code: u16,
    /// Response headers with lowercased names
    pub headers: HashMap<String, String>,
    pub fetch_start_time: DateTime<Utc>,
    pub duration_ms: f64,
    pub content_length: usize,
}

impl FetchOutcome {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Fetch a feed once with the spec's retry policy applied.
///
/// Retryable failures (5xx, transport, timeout) are re-attempted under the
/// feed's [`RetryPolicy`](gtfsrt_resilience::RetryPolicy); the last error
/// propagates after exhaustion. 400/401/403/404/410 end the loop immediately.
pub async fn fetch_feed(client: &reqwest::Client, spec: &FeedSpec) -> Result<FetchOutcome, FetchError> {
    let executor = RetryExecutor::new(spec.retry.clone());
    executor
        .execute(|| fetch_once(client, spec))
        .await
        .map_err(|e| e.into_inner())
}

/// Perform a single fetch attempt.
async fn fetch_once(client: &reqwest::Client, spec: &FeedSpec) -> Result<FetchOutcome, FetchError> {
    let fetch_start_time = Utc::now();
    let started = tokio::time::Instant::now();

    let mut request = client
        .get(spec.url.clone())
        .timeout(Duration::from_secs(spec.timeout_seconds as u64));

    // Credential placement. Query parameters are appended so anything already
    // present in the configured URL survives untouched.
    if let Some(auth) = &spec.auth {
        if let Some(credential) = &auth.resolved_value {
            match auth.placement {
                AuthPlacement::Header => {
                    let name =
                        HeaderName::from_bytes(auth.key.as_bytes()).map_err(|e| FetchError::Auth {
                            key: auth.key.clone(),
                            message: e.to_string(),
                        })?;
                    let value = HeaderValue::from_str(credential).map_err(|e| FetchError::Auth {
                        key: auth.key.clone(),
                        message: e.to_string(),
                    })?;
                    request = request.header(name, value);
                }
                AuthPlacement::Query => {
                    request = request.query(&[(auth.key.as_str(), credential.as_str())]);
                }
            }
        }
    }

    let response = request.send().await.map_err(FetchError::from_reqwest)?;
    let status = response.status();

    if NON_RETRYABLE_STATUS_CODES.contains(&status.as_u16()) {
        return Err(FetchError::NonRetryable {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
        });
    }

    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let content = response.bytes().await.map_err(FetchError::from_reqwest)?;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    debug!(
        feed_id = %spec.id,
        status = status.as_u16(),
        bytes = content.len(),
        duration_ms,
        "fetch completed"
    );

    Ok(FetchOutcome {
        content_length: content.len(),
        content,
        status_code: status.as_u16(),
        headers,
        fetch_start_time,
        duration_ms,
    })
}
