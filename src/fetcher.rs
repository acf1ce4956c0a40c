//! Retrying upstream fetcher
//!
//! Wraps one logical upstream GET with a bounded number of attempts. Each
//! attempt's outcome goes through [`classify`], a pure function that decides
//! between returning, retrying and aborting; the loop in
//! [`RetryingFetcher::fetch`] only carries out that decision.
//!
//! | Outcome                         | Decision                          |
//! |---------------------------------|-----------------------------------|
//! | 2xx with JSON body              | return value                      |
//! | 2xx with unparseable body       | abort (`InvalidResponse`)         |
//! | 429                             | mark tracker limited, abort       |
//! | other non-2xx                   | abort (`Http`), tracker untouched |
//! | timeout / connect / body error  | retry after backoff               |

use crate::{
    clock::Clock,
    constants::{MAX_FETCH_ATTEMPTS, REQUEST_TIMEOUT_SECS, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS},
    error::FetchError,
    metrics::MetricsCollector,
    rate_limit::RateLimitTracker,
    transport::{HttpTransport, TransportError, UpstreamRequest, UpstreamResponse},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest body excerpt carried in an HTTP error
const ERROR_BODY_LIMIT: usize = 200;

/// Attempt budget and timing for one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Timeout applied to each attempt
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_FETCH_ATTEMPTS,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-based): doubles each
    /// time, capped at `max_delay`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What to do after an unsuccessful attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Transient failure; another attempt may succeed
    Retry(FetchError),
    /// Permanent failure for this call
    Abort(FetchError),
    /// Upstream answered 429
    RateLimited,
}

/// Classifies the outcome of a single attempt
pub fn classify(
    outcome: Result<UpstreamResponse, TransportError>,
    timeout: Duration,
) -> Result<Value, RetryDecision> {
    let response = match outcome {
        Ok(response) => response,
        Err(TransportError::Timeout) => {
            return Err(RetryDecision::Retry(FetchError::Timeout(timeout)))
        }
        Err(err) => return Err(RetryDecision::Retry(FetchError::Network(err.to_string()))),
    };

    if response.status == 429 {
        return Err(RetryDecision::RateLimited);
    }

    if !response.is_success() {
        let body: String = response.body.chars().take(ERROR_BODY_LIMIT).collect();
        return Err(RetryDecision::Abort(FetchError::Http {
            status: response.status,
            body,
        }));
    }

    serde_json::from_str(&response.body).map_err(|e| {
        RetryDecision::Abort(FetchError::InvalidResponse(format!(
            "body is not valid JSON: {e}"
        )))
    })
}

/// Upstream fetcher with retries, backoff and rate-limit bookkeeping
pub struct RetryingFetcher {
    transport: Arc<dyn HttpTransport>,
    tracker: Arc<RateLimitTracker>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    /// Creates a fetcher for one upstream account
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tracker: Arc<RateLimitTracker>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            tracker,
            clock,
            metrics,
            policy,
        }
    }

    /// Rate-limit tracker of this upstream
    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    /// Metrics collected for this upstream
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Remaining backoff if the upstream is currently rate limited
    pub fn check_rate_limit(&self) -> Result<(), Duration> {
        self.tracker.check(self.clock.now())
    }

    /// Fetches `request`, retrying transient failures
    pub async fn fetch(&self, request: &UpstreamRequest) -> Result<Value, FetchError> {
        let started = Instant::now();
        let result = self.fetch_with_retries(request).await;

        match &result {
            Ok(_) => self.metrics.record_success(started.elapsed()).await,
            Err(e) => {
                self.metrics
                    .record_failure(started.elapsed(), &e.to_string())
                    .await
            }
        }

        result
    }

    async fn fetch_with_retries(&self, request: &UpstreamRequest) -> Result<Value, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let remaining = max_attempts - attempt;
            tracing::debug!(
                upstream = self.metrics.upstream(),
                transport = self.transport.transport_name(),
                endpoint = %request.endpoint,
                attempt,
                remaining,
                "Fetching upstream"
            );

            let outcome = match tokio::time::timeout(
                self.policy.timeout,
                self.transport.get(request, self.policy.timeout),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout),
            };

            if matches!(&outcome, Ok(response) if response.is_success()) {
                self.tracker.record_success();
            }

            match classify(outcome, self.policy.timeout) {
                Ok(value) => return Ok(value),
                Err(RetryDecision::RateLimited) => {
                    let backoff = self.tracker.record_rate_limit(self.clock.now());
                    return Err(FetchError::RateLimited {
                        retry_after_ms: backoff.as_millis() as u64,
                    });
                }
                Err(RetryDecision::Abort(e)) => {
                    tracing::warn!(
                        endpoint = %request.endpoint,
                        attempt,
                        error = %e,
                        "Upstream request failed, not retrying"
                    );
                    return Err(e);
                }
                Err(RetryDecision::Retry(e)) => {
                    if remaining == 0 {
                        tracing::warn!(
                            endpoint = %request.endpoint,
                            attempts = attempt,
                            error = %e,
                            "Upstream request failed, retries exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        endpoint = %request.endpoint,
                        attempt,
                        remaining,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Upstream request failed, retrying"
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
