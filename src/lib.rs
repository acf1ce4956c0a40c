//! # Market Data Gateway
//!
//! Cached, rate-limit aware access to cryptocurrency market data (CoinGecko)
//! and crypto news, for dashboards that poll the same data repeatedly.
//!
//! Every read is served from a two-tier TTL cache when possible. Misses go
//! upstream through a retrying fetcher that tracks HTTP 429 responses per
//! upstream account and refuses new requests while in backoff. When an
//! upstream fails, recently expired data (the stale tier) is served instead.
//! News degrades to a fixed fallback dataset rather than failing.
//!
//! ## Usage
//!
//! ```no_run
//! use market_data_gateway::{GatewayConfig, MarketDataGateway, NewsQuery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = MarketDataGateway::new(GatewayConfig::from_env()?)?;
//! gateway.start_cache_sweeper();
//!
//! let prices = gateway.get_prices(["bitcoin", "ethereum"], "usd").await?;
//! if let Some(btc) = prices.get("bitcoin") {
//!     println!("BTC: ${:.2}", btc.price);
//! }
//!
//! let news = gateway.fetch_crypto_news(&NewsQuery::with_limit(5)).await;
//! for article in news.articles {
//!     println!("{}", article.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod fallback;
pub mod feed;
pub mod fetcher;
pub mod gateway;
pub mod inflight;
pub mod metrics;
pub mod rate_limit;
pub mod resources;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStats, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GatewayConfig, TtlConfig};
pub use error::{FetchError, GatewayError};
pub use feed::PriceFeed;
pub use fetcher::{RetryPolicy, RetryingFetcher};
pub use gateway::MarketDataGateway;
pub use metrics::UpstreamMetrics;
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{
    CoinDetail, ComponentHealth, DataSource, GatewayStats, GlobalStats, HealthStatus,
    HistoryInterval, HistorySeries, NewsArticle, NewsFeed, NewsQuery, PriceFeedEvent, PriceMap,
    PriceQuote,
};
