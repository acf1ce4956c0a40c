//! Constants for the market data gateway
//!
//! Compile-time defaults live here. Values that operators commonly change
//! (base URLs, API keys, timeouts, attempt budget) can be overridden at runtime
//! through [`GatewayConfig`](crate::config::GatewayConfig).

/// Fresh-tier TTL for simple price lookups (in seconds)
pub const PRICES_TTL_SECS: u64 = 30;

/// Fresh-tier TTL for global market statistics (in seconds)
pub const GLOBAL_STATS_TTL_SECS: u64 = 300;

/// Fresh-tier TTL for coin details (in seconds)
pub const COIN_DETAILS_TTL_SECS: u64 = 1800;

/// Fresh-tier TTL for market chart history (in seconds)
pub const COIN_HISTORY_TTL_SECS: u64 = 300;

/// Fresh-tier TTL for live news (in seconds)
pub const NEWS_TTL_SECS: u64 = 600;

/// Stale-tier TTL is the fresh TTL multiplied by this factor
pub const STALE_TTL_MULTIPLIER: u32 = 5;

/// HTTP request timeout per attempt (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum number of attempts per upstream fetch (first try included)
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Initial delay between retry attempts (in milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between retry attempts (in milliseconds)
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Base backoff after an upstream 429 (in milliseconds)
pub const RATE_LIMIT_BASE_BACKOFF_MS: u64 = 1000;

/// Upper bound for the 429 backoff window (in milliseconds)
pub const RATE_LIMIT_MAX_BACKOFF_MS: u64 = 60_000;

/// How often the cache sweeper purges expired entries (in seconds)
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Upstream page-size limit for news queries
pub const MAX_NEWS_LIMIT: usize = 100;

/// Default news search query
pub const DEFAULT_NEWS_QUERY: &str = "cryptocurrency";

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko API endpoint for simple price queries
pub const COINGECKO_SIMPLE_PRICE_ENDPOINT: &str = "/simple/price";

/// CoinGecko API endpoint for global market statistics
pub const COINGECKO_GLOBAL_ENDPOINT: &str = "/global";

/// CoinGecko API endpoint prefix for per-coin resources
pub const COINGECKO_COINS_ENDPOINT: &str = "/coins";

/// Header carrying the CoinGecko demo API key
pub const COINGECKO_API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// News API base URL
pub const NEWS_API_URL: &str = "https://newsapi.org/v2";

/// News API search endpoint
pub const NEWS_EVERYTHING_ENDPOINT: &str = "/everything";

/// Header carrying the news API key
pub const NEWS_API_KEY_HEADER: &str = "X-Api-Key";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-data-gateway/0.1.0";

/// Buffered events per price feed subscriber before it starts lagging
pub const FEED_CHANNEL_CAPACITY: usize = 64;
