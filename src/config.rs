//! Runtime configuration for the gateway
//!
//! Defaults come from [`crate::constants`]. [`GatewayConfig::from_env`] loads
//! a `.env` file if present and overrides the defaults from environment
//! variables.

use crate::{
    constants::{
        CACHE_SWEEP_INTERVAL_SECS, COINGECKO_API_URL, COIN_DETAILS_TTL_SECS,
        COIN_HISTORY_TTL_SECS, GLOBAL_STATS_TTL_SECS, NEWS_API_URL, NEWS_TTL_SECS,
        PRICES_TTL_SECS, RATE_LIMIT_BASE_BACKOFF_MS, RATE_LIMIT_MAX_BACKOFF_MS,
        STALE_TTL_MULTIPLIER,
    },
    error::GatewayError,
    fetcher::RetryPolicy,
};
use std::str::FromStr;
use std::time::Duration;

/// Fresh-tier TTL per resource class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlConfig {
    pub prices: Duration,
    pub global_stats: Duration,
    pub coin_details: Duration,
    pub coin_history: Duration,
    pub news: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            prices: Duration::from_secs(PRICES_TTL_SECS),
            global_stats: Duration::from_secs(GLOBAL_STATS_TTL_SECS),
            coin_details: Duration::from_secs(COIN_DETAILS_TTL_SECS),
            coin_history: Duration::from_secs(COIN_HISTORY_TTL_SECS),
            news: Duration::from_secs(NEWS_TTL_SECS),
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub coingecko_base_url: String,
    pub coingecko_api_key: Option<String>,
    pub news_base_url: String,
    /// Without a key, news is always served in degraded mode
    pub news_api_key: Option<String>,
    pub retry: RetryPolicy,
    pub ttl: TtlConfig,
    /// Stale-tier TTL = fresh TTL × this
    pub stale_multiplier: u32,
    pub rate_limit_base_ms: u64,
    pub rate_limit_max_ms: u64,
    /// Cache sweep period; `None` disables the sweeper
    pub sweep_interval: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            coingecko_base_url: COINGECKO_API_URL.to_string(),
            coingecko_api_key: None,
            news_base_url: NEWS_API_URL.to_string(),
            news_api_key: None,
            retry: RetryPolicy::default(),
            ttl: TtlConfig::default(),
            stale_multiplier: STALE_TTL_MULTIPLIER,
            rate_limit_base_ms: RATE_LIMIT_BASE_BACKOFF_MS,
            rate_limit_max_ms: RATE_LIMIT_MAX_BACKOFF_MS,
            sweep_interval: Some(Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS)),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let timeout_secs: u64 = parse_var(&lookup, "GATEWAY_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.retry.timeout.as_secs());
        let max_attempts: u32 =
            parse_var(&lookup, "GATEWAY_MAX_ATTEMPTS")?.unwrap_or(defaults.retry.max_attempts);
        if max_attempts == 0 {
            return Err(GatewayError::config("GATEWAY_MAX_ATTEMPTS must be at least 1"));
        }

        let sweep_interval = match parse_var::<u64, _>(&lookup, "GATEWAY_SWEEP_INTERVAL_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.sweep_interval,
        };

        Ok(Self {
            coingecko_base_url: non_empty("COINGECKO_BASE_URL")
                .unwrap_or(defaults.coingecko_base_url),
            coingecko_api_key: non_empty("COINGECKO_API_KEY"),
            news_base_url: non_empty("NEWS_BASE_URL").unwrap_or(defaults.news_base_url),
            news_api_key: non_empty("NEWS_API_KEY"),
            retry: RetryPolicy {
                max_attempts,
                timeout: Duration::from_secs(timeout_secs),
                ..defaults.retry
            },
            sweep_interval,
            ..defaults
        })
    }

    /// Stale-tier TTL for a given fresh TTL
    pub fn stale_ttl(&self, fresh: Duration) -> Duration {
        fresh.saturating_mul(self.stale_multiplier)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, GatewayError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::config(format!("Invalid {name}: {raw}"))),
        _ => Ok(None),
    }
}
