//! Result schemas returned by the gateway
//!
//! Every type here is what callers receive and what the cache stores. Raw
//! upstream shapes stay private to [`crate::resources`].

use crate::cache::CacheStats;
use crate::rate_limit::RateLimitSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Fetched from the upstream (possibly served from cache)
    Live,
    /// Hardcoded substitute served in degraded mode
    Fallback,
}

/// Price of one coin in the requested currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: f64,
    /// 24h change in percent
    pub change_24h: Option<f64>,
}

/// Prices for a set of coins, keyed by coin id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMap {
    pub currency: String,
    pub prices: BTreeMap<String, PriceQuote>,
}

impl PriceMap {
    /// Creates a map with no quotes
    pub fn empty(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            prices: BTreeMap::new(),
        }
    }

    /// Quote for `coin_id`, if the upstream returned one
    pub fn get(&self, coin_id: &str) -> Option<&PriceQuote> {
        self.prices.get(coin_id)
    }

    /// Number of quoted coins
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no coin was quoted
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Market-wide statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    #[serde(default)]
    pub active_cryptocurrencies: u64,
    #[serde(default)]
    pub markets: u64,
    /// Total market cap per currency
    #[serde(default)]
    pub total_market_cap: BTreeMap<String, f64>,
    /// Total 24h volume per currency
    #[serde(default)]
    pub total_volume: BTreeMap<String, f64>,
    /// Dominance per coin symbol, in percent
    #[serde(default)]
    pub market_cap_percentage: BTreeMap<String, f64>,
    #[serde(default)]
    pub market_cap_change_percentage_24h_usd: Option<f64>,
    /// Unix seconds
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Market section of a coin detail, values keyed by currency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinMarketData {
    pub current_price: BTreeMap<String, f64>,
    pub market_cap: BTreeMap<String, f64>,
    pub total_volume: BTreeMap<String, f64>,
    pub high_24h: BTreeMap<String, f64>,
    pub low_24h: BTreeMap<String, f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
}

/// Descriptive and market data for a single coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub symbol: String,
    pub name: String,
    /// English description
    pub description: Option<String>,
    /// Large image URL
    pub image: Option<String>,
    /// First homepage link
    pub homepage: Option<String>,
    pub market_cap_rank: Option<u32>,
    pub categories: Vec<String>,
    pub market_data: Option<CoinMarketData>,
    pub last_updated: Option<String>,
}

/// Sampling granularity of a history series
///
/// One rule is used everywhere: more than 30 days is daily, 2 to 30 days is
/// hourly, a single day is minutely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryInterval {
    Minutely,
    Hourly,
    Daily,
}

impl HistoryInterval {
    /// Granularity used for a `days`-long window
    pub fn for_days(days: u32) -> Self {
        if days > 30 {
            Self::Daily
        } else if days > 1 {
            Self::Hourly
        } else {
            Self::Minutely
        }
    }

    /// Value for the upstream `interval` parameter
    ///
    /// Only daily sampling is requested explicitly; finer granularity is what
    /// the upstream returns on its own for short ranges.
    pub fn upstream_param(&self) -> Option<&'static str> {
        match self {
            Self::Daily => Some("daily"),
            Self::Hourly | Self::Minutely => None,
        }
    }
}

/// One sample of a history series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Unix milliseconds
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Market chart history for one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySeries {
    pub coin_id: String,
    pub currency: String,
    pub days: u32,
    pub interval: HistoryInterval,
    pub prices: Vec<HistoryPoint>,
    pub market_caps: Vec<HistoryPoint>,
    pub total_volumes: Vec<HistoryPoint>,
}

/// News search parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsQuery {
    pub query: String,
    pub limit: usize,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            query: crate::constants::DEFAULT_NEWS_QUERY.to_string(),
            limit: 10,
        }
    }
}

impl NewsQuery {
    /// Default query returning at most `limit` articles
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// A news article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    /// Publishing outlet
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: DataSource,
}

/// A page of news articles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsFeed {
    pub articles: Vec<NewsArticle>,
    pub source: DataSource,
}

impl NewsFeed {
    /// Whether the feed came from the fallback dataset
    pub fn is_fallback(&self) -> bool {
        self.source == DataSource::Fallback
    }
}

/// Events pushed to price feed subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceFeedEvent {
    /// A fresh (or cached) price map is available
    PricesUpdated {
        id: Uuid,
        prices: PriceMap,
        timestamp: DateTime<Utc>,
    },

    /// The periodic fetch failed
    FetchFailed {
        id: Uuid,
        error_message: String,
        retry_after_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
}

impl PriceFeedEvent {
    /// Unique id of the event
    pub fn id(&self) -> Uuid {
        match self {
            PriceFeedEvent::PricesUpdated { id, .. } => *id,
            PriceFeedEvent::FetchFailed { id, .. } => *id,
        }
    }

    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            PriceFeedEvent::PricesUpdated { .. } => "PRICES_UPDATED",
            PriceFeedEvent::FetchFailed { .. } => "FETCH_FAILED",
        }
    }
}

impl std::fmt::Display for PriceFeedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceFeedEvent::PricesUpdated { prices, .. } => write!(
                f,
                "Prices updated: {} coins in {}",
                prices.len(),
                prices.currency
            ),
            PriceFeedEvent::FetchFailed { error_message, .. } => {
                write!(f, "Price fetch failed: {}", error_message)
            }
        }
    }
}

/// Administrative view of the cache and both upstream trackers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStats {
    pub cache: CacheStats,
    pub market_rate_limit: RateLimitSnapshot,
    pub news_rate_limit: RateLimitSnapshot,
}

/// Overall component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Upstreams reachable and not rate limited
    Healthy,
    /// Serving, but an upstream is in backoff or failing intermittently
    Degraded,
    /// Recent upstream fetches all failed
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub details: HashMap<String, serde_json::Value>,
    pub last_checked: DateTime<Utc>,
}
