//! Upstream health metrics
//!
//! Tracks latency percentiles, success rate and the latest failure for each
//! upstream the gateway talks to. One sample is recorded per fetch call
//! (retries included in its latency), not per attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples kept for percentile calculation
const MAX_SAMPLES: usize = 100;

/// Point-in-time metrics for one upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMetrics {
    pub upstream: String,
    /// 50th percentile latency of successful fetches in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful fetches in milliseconds
    pub latency_p99_ms: f64,
    /// Lifetime success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Success rate over the rolling sample window
    pub window_success_rate: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl UpstreamMetrics {
    /// Creates metrics with no data
    pub fn empty(upstream: &str) -> Self {
        Self {
            upstream: upstream.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            window_success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
            last_success_at: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct MetricsWindow {
    samples: VecDeque<LatencySample>,
    total_requests: u64,
    failed_requests: u64,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Collects fetch outcomes for one upstream
#[derive(Debug)]
pub struct MetricsCollector {
    upstream: String,
    window: RwLock<MetricsWindow>,
}

impl MetricsCollector {
    /// Creates a collector for `upstream`
    pub fn new(upstream: &str) -> Self {
        Self {
            upstream: upstream.to_string(),
            window: RwLock::new(MetricsWindow {
                samples: VecDeque::with_capacity(MAX_SAMPLES),
                ..Default::default()
            }),
        }
    }

    /// Name of the upstream being measured
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Records a successful fetch and its latency
    pub async fn record_success(&self, duration: Duration) {
        let mut window = self.window.write().await;
        window.last_success_at = Some(Utc::now());
        Self::push_sample(&mut window, duration, true);
    }

    /// Records a failed fetch, keeping `error` as the last error
    pub async fn record_failure(&self, duration: Duration, error: &str) {
        let mut window = self.window.write().await;
        window.failed_requests += 1;
        window.last_error = Some(error.to_string());
        Self::push_sample(&mut window, duration, false);
    }

    fn push_sample(window: &mut MetricsWindow, duration: Duration, success: bool) {
        window.total_requests += 1;
        if window.samples.len() >= MAX_SAMPLES {
            window.samples.pop_front();
        }
        window.samples.push_back(LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            success,
        });
    }

    /// Computes current metrics from the collected samples
    pub async fn snapshot(&self) -> UpstreamMetrics {
        let window = self.window.read().await;

        if window.samples.is_empty() {
            return UpstreamMetrics::empty(&self.upstream);
        }

        let mut latencies: Vec<f64> = window
            .samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let window_successes = window.samples.iter().filter(|s| s.success).count();

        UpstreamMetrics {
            upstream: self.upstream.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: (window.total_requests - window.failed_requests) as f64
                / window.total_requests as f64,
            window_success_rate: window_successes as f64 / window.samples.len() as f64,
            total_requests: window.total_requests,
            failed_requests: window.failed_requests,
            last_success_at: window.last_success_at,
            last_error: window.last_error.clone(),
        }
    }
}

/// Percentile from sorted values (nearest rank)
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
