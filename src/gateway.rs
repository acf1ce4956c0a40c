//! Market data gateway
//!
//! [`MarketDataGateway`] is the façade every data getter goes through. Each
//! read follows the same path:
//!
//! ```text
//! fresh tier hit? ──yes──▶ return
//!      │ no
//! upstream in backoff? ──yes──▶ Err(RateLimited)
//!      │ no
//! join or start in-flight load ──▶ RetryingFetcher ──▶ upstream
//!      │ ok                              │ err
//! narrow, write fresh + stale      stale tier hit? ──yes──▶ return stale
//!      │                                 │ no
//!   return                          Err(upstream error)
//! ```
//!
//! News has one extra step: when no API key is configured, or the live path
//! fails for any reason, a fallback dataset is returned instead of an error.

use crate::{
    cache::{CacheStats, TtlCache},
    clock::{Clock, SystemClock},
    config::GatewayConfig,
    constants::MAX_NEWS_LIMIT,
    error::GatewayError,
    fallback::fallback_news,
    fetcher::RetryingFetcher,
    inflight::{InFlight, LoadResult},
    metrics::{MetricsCollector, UpstreamMetrics},
    rate_limit::{RateLimitSnapshot, RateLimitTracker},
    resources::{coingecko, news, CoinGeckoApi, NewsApi, Resource},
    transport::{HttpTransport, ReqwestTransport},
    types::{
        CoinDetail, ComponentHealth, DataSource, GatewayStats, GlobalStats, HealthStatus,
        HistoryInterval, HistorySeries, NewsFeed, NewsQuery, PriceMap,
    },
};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Upstream accounts, each with its own rate-limit budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upstream {
    Market,
    News,
}

impl Upstream {
    fn name(&self) -> &'static str {
        match self {
            Upstream::Market => "coingecko",
            Upstream::News => "news",
        }
    }
}

/// Cached, rate-limit aware access to market and news data
pub struct MarketDataGateway {
    config: GatewayConfig,
    cache: Arc<TtlCache>,
    market: Arc<RetryingFetcher>,
    news: Arc<RetryingFetcher>,
    coingecko: CoinGeckoApi,
    news_api: NewsApi,
    inflight: InFlight,
    clock: Arc<dyn Clock>,
}

impl MarketDataGateway {
    /// Creates a gateway talking to the configured upstreams over HTTP
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let transport = ReqwestTransport::new()
            .map_err(|e| GatewayError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_parts(
            config,
            Arc::new(transport),
            Arc::new(SystemClock),
        ))
    }

    /// Creates a gateway configured from the environment
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::new(GatewayConfig::from_env()?)
    }

    /// Creates a gateway with an explicit transport and clock
    pub fn with_parts(
        config: GatewayConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fetcher = |upstream: Upstream| {
            Arc::new(RetryingFetcher::new(
                transport.clone(),
                Arc::new(RateLimitTracker::new(
                    config.rate_limit_base_ms,
                    config.rate_limit_max_ms,
                )),
                clock.clone(),
                Arc::new(MetricsCollector::new(upstream.name())),
                config.retry.clone(),
            ))
        };
        let market = fetcher(Upstream::Market);
        let news = fetcher(Upstream::News);

        Self {
            cache: Arc::new(TtlCache::new(clock.clone())),
            coingecko: CoinGeckoApi::new(
                config.coingecko_base_url.clone(),
                config.coingecko_api_key.clone(),
            ),
            news_api: NewsApi::new(config.news_base_url.clone(), config.news_api_key.clone()),
            inflight: InFlight::new(),
            market,
            news,
            clock,
            config,
        }
    }

    /// Configuration the gateway was built with
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Starts the periodic purge of expired cache entries, if configured
    pub fn start_cache_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.sweep_interval?;
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Starting cache sweeper"
        );
        Some(self.cache.spawn_sweeper(interval))
    }

    fn fetcher(&self, upstream: Upstream) -> &Arc<RetryingFetcher> {
        match upstream {
            Upstream::Market => &self.market,
            Upstream::News => &self.news,
        }
    }

    /// Current prices for `coin_ids` quoted in `currency`
    pub async fn get_prices<I, S>(&self, coin_ids: I, currency: &str) -> Result<PriceMap, GatewayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = coingecko::normalize_coin_ids(coin_ids)?;
        let currency = coingecko::normalize_currency(currency)?;
        if ids.is_empty() {
            return Ok(PriceMap::empty(&currency));
        }

        let request = self.coingecko.simple_price(&ids, &currency);
        let resource = Resource::new(request, self.config.ttl.prices, move |raw| {
            coingecko::parse_prices(raw, &ids, &currency)
        });

        self.cached(Upstream::Market, resource).await
    }

    /// Market-wide statistics
    pub async fn get_global_market_data(&self) -> Result<GlobalStats, GatewayError> {
        let resource = Resource::new(
            self.coingecko.global(),
            self.config.ttl.global_stats,
            coingecko::parse_global,
        );

        self.cached(Upstream::Market, resource).await
    }

    /// Details for a single coin
    pub async fn get_coin_details(&self, coin_id: &str) -> Result<CoinDetail, GatewayError> {
        let id = coingecko::normalize_coin_id(coin_id)?;
        let resource = Resource::new(
            self.coingecko.coin_details(&id),
            self.config.ttl.coin_details,
            coingecko::parse_coin_details,
        );

        self.cached(Upstream::Market, resource).await
    }

    /// Price, market cap and volume history over the last `days` days
    pub async fn get_coin_history(
        &self,
        coin_id: &str,
        days: u32,
        currency: &str,
    ) -> Result<HistorySeries, GatewayError> {
        if days == 0 {
            return Err(GatewayError::invalid_request("days must be at least 1"));
        }
        let id = coingecko::normalize_coin_id(coin_id)?;
        let currency = coingecko::normalize_currency(currency)?;
        let interval = HistoryInterval::for_days(days);

        let request = self.coingecko.market_chart(&id, days, &currency, interval);
        let resource = Resource::new(request, self.config.ttl.coin_history, move |raw| {
            coingecko::parse_market_chart(raw, &id, &currency, days, interval)
        });

        self.cached(Upstream::Market, resource).await
    }

    /// Latest crypto news; never fails
    ///
    /// Without a configured news API key, or when the live request fails, the
    /// fallback dataset is returned (tagged [`DataSource::Fallback`]).
    pub async fn fetch_crypto_news(&self, query: &NewsQuery) -> NewsFeed {
        let limit = query.limit.min(MAX_NEWS_LIMIT);

        if !self.news_api.has_credentials() {
            tracing::debug!(limit, "No news API key configured, serving fallback news");
            return fallback_news(limit);
        }

        if limit == 0 {
            return NewsFeed {
                articles: Vec::new(),
                source: DataSource::Live,
            };
        }

        let query = NewsQuery {
            query: if query.query.trim().is_empty() {
                NewsQuery::default().query
            } else {
                query.query.trim().to_string()
            },
            limit,
        };
        let resource = Resource::new(
            self.news_api.everything(&query),
            self.config.ttl.news,
            move |raw| news::parse_news(raw, limit),
        );

        match self.cached::<NewsFeed>(Upstream::News, resource).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(error = %e, "Live news unavailable, serving fallback news");
                fallback_news(limit)
            }
        }
    }

    /// Drops every cached entry, both tiers
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Held cache keys (both tiers) and hit/miss counters
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Rate-limit state of the market data upstream
    pub fn rate_limit_state(&self) -> RateLimitSnapshot {
        self.market.tracker().snapshot(self.clock.now())
    }

    /// Cache contents plus both upstreams' rate-limit state
    pub async fn stats(&self) -> GatewayStats {
        let now = self.clock.now();
        GatewayStats {
            cache: self.cache.stats().await,
            market_rate_limit: self.market.tracker().snapshot(now),
            news_rate_limit: self.news.tracker().snapshot(now),
        }
    }

    /// Latency and success metrics for each upstream
    pub async fn upstream_metrics(&self) -> Vec<UpstreamMetrics> {
        vec![
            self.market.metrics().snapshot().await,
            self.news.metrics().snapshot().await,
        ]
    }

    /// Health of the gateway, derived from upstream metrics and backoff state
    pub async fn health_check(&self) -> ComponentHealth {
        let stats = self.stats().await;
        let market = self.market.metrics().snapshot().await;
        let news = self.news.metrics().snapshot().await;

        let status = if market.total_requests > 0 && market.window_success_rate == 0.0 {
            HealthStatus::Unhealthy
        } else if stats.market_rate_limit.is_limited
            || stats.news_rate_limit.is_limited
            || market.window_success_rate < 1.0
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let message = match status {
            HealthStatus::Healthy => "Upstreams reachable".to_string(),
            HealthStatus::Degraded => match (
                stats.market_rate_limit.remaining_ms,
                stats.news_rate_limit.remaining_ms,
            ) {
                (Some(market_ms), Some(news_ms)) => format!(
                    "Market data upstream in backoff for {market_ms}ms, news upstream for {news_ms}ms"
                ),
                (Some(ms), None) => format!("Market data upstream in backoff for {ms}ms"),
                (None, Some(ms)) => format!("News upstream in backoff for {ms}ms"),
                (None, None) => "Upstreams failing intermittently".to_string(),
            },
            HealthStatus::Unhealthy => "Recent market data fetches all failed".to_string(),
        };

        let mut details = HashMap::new();
        details.insert(
            "cached_keys".to_string(),
            serde_json::json!(stats.cache.keys.len()),
        );
        details.insert("cache".to_string(), serde_json::json!(stats.cache));
        details.insert(
            "market_rate_limit".to_string(),
            serde_json::json!(stats.market_rate_limit),
        );
        details.insert(
            "news_rate_limit".to_string(),
            serde_json::json!(stats.news_rate_limit),
        );
        details.insert("market_metrics".to_string(), serde_json::json!(market));
        details.insert("news_metrics".to_string(), serde_json::json!(news));
        details.insert(
            "news_mode".to_string(),
            serde_json::json!(if self.news_api.has_credentials() {
                "live"
            } else {
                "fallback"
            }),
        );

        ComponentHealth {
            name: "market_data_gateway".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: chrono::Utc::now(),
        }
    }

    /// Cache → rate-limit check → coalesced load
    async fn cached<T: DeserializeOwned>(
        &self,
        upstream: Upstream,
        resource: Resource,
    ) -> Result<T, GatewayError> {
        let identity = format!("{}:{}", upstream.name(), resource.key());

        if let Some(value) = self.cache.get(&fresh_key(&identity)).await {
            match serde_json::from_value(value) {
                Ok(typed) => return Ok(typed),
                Err(e) => tracing::warn!(
                    key = %identity,
                    error = %e,
                    "Discarding undecodable cache entry"
                ),
            }
        }

        let fetcher = self.fetcher(upstream).clone();
        if let Err(remaining) = fetcher.check_rate_limit() {
            tracing::debug!(
                key = %identity,
                retry_after_ms = remaining.as_millis() as u64,
                "Upstream in backoff, refusing request"
            );
            return Err(GatewayError::rate_limited(remaining));
        }

        let cache = self.cache.clone();
        let stale_ttl = self.config.stale_ttl(resource.ttl);
        let load_identity = identity.clone();
        let value = self
            .inflight
            .run(&identity, move || {
                load(fetcher, cache, resource, load_identity, stale_ttl).boxed()
            })
            .await?;

        serde_json::from_value(value).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

fn fresh_key(identity: &str) -> String {
    format!("fresh:{identity}")
}

fn stale_key(identity: &str) -> String {
    format!("stale:{identity}")
}

/// Fetches, narrows and caches one resource, falling back to the stale tier
async fn load(
    fetcher: Arc<RetryingFetcher>,
    cache: Arc<TtlCache>,
    resource: Resource,
    identity: String,
    stale_ttl: Duration,
) -> LoadResult {
    let outcome = match fetcher.fetch(&resource.request).await {
        Ok(raw) => (resource.narrow)(raw),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(value) => {
            cache
                .set(&fresh_key(&identity), value.clone(), resource.ttl)
                .await;
            cache.set(&stale_key(&identity), value.clone(), stale_ttl).await;
            Ok(value)
        }
        Err(e) => match cache.get(&stale_key(&identity)).await {
            Some(stale) => {
                tracing::warn!(
                    key = %identity,
                    error = %e,
                    "Upstream fetch failed, serving stale data"
                );
                Ok(stale)
            }
            None => {
                tracing::error!(
                    key = %identity,
                    error = %e,
                    "Upstream fetch failed and no stale data available"
                );
                Err(e.into())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::mock::MockTransport;
    use crate::transport::{TransportError, UpstreamResponse};
    use serde_json::json;

    struct Harness {
        gateway: MarketDataGateway,
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(config: GatewayConfig) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new());
        let gateway = MarketDataGateway::with_parts(config, transport.clone(), clock.clone());
        Harness {
            gateway,
            transport,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(GatewayConfig::default())
    }

    fn bitcoin_price(price: f64) -> serde_json::Value {
        json!({"bitcoin": {"usd": price, "usd_24h_change": 1.5}})
    }

    #[tokio::test]
    async fn test_prices_cached_within_fresh_ttl() {
        let h = harness();
        h.transport.push_json(200, bitcoin_price(64000.0));
        h.transport.push_json(200, bitcoin_price(65000.0));

        let first = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        h.clock.advance(Duration::from_secs(29));
        let second = h.gateway.get_prices(["bitcoin"], "USD").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.get("bitcoin").unwrap().price, 64000.0);
        assert_eq!(h.transport.call_count(), 1);

        let request = &h.transport.requests()[0];
        assert_eq!(request.endpoint, "/simple/price");
        assert_eq!(request.params.get("ids").map(String::as_str), Some("bitcoin"));
        assert_eq!(
            request.params.get("vs_currencies").map(String::as_str),
            Some("usd")
        );

        h.clock.advance(Duration::from_secs(2));
        let third = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(third.get("bitcoin").unwrap().price, 65000.0);
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_coin_set_skips_upstream() {
        let h = harness();
        let prices = h
            .gateway
            .get_prices(Vec::<String>::new(), "usd")
            .await
            .unwrap();

        assert!(prices.is_empty());
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_fails_fast_until_backoff_elapses() {
        let h = harness();
        h.transport.push_status(429, "Too Many Requests");

        let err = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap_err();
        assert_eq!(err, GatewayError::RateLimited { retry_after_ms: 2000 });
        assert_eq!(h.transport.call_count(), 1);

        h.clock.advance(Duration::from_millis(1500));
        let err = h.gateway.get_global_market_data().await.unwrap_err();
        assert_eq!(err, GatewayError::RateLimited { retry_after_ms: 500 });
        assert_eq!(h.transport.call_count(), 1);

        h.clock.advance(Duration::from_millis(500));
        h.transport.push_json(200, bitcoin_price(64000.0));
        let prices = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(h.transport.call_count(), 2);
        assert_eq!(h.gateway.rate_limit_state().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_fresh_hit_ignores_backoff() {
        let h = harness();
        h.transport.push_json(200, bitcoin_price(64000.0));
        h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();

        h.gateway.market.tracker().record_rate_limit(h.clock.now());

        let cached = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(cached.get("bitcoin").unwrap().price, 64000.0);
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_permanent_failure() {
        let h = harness();
        h.transport.push_json(200, bitcoin_price(64000.0));
        let fresh = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();

        h.clock.advance(Duration::from_secs(60));
        h.transport
            .always(Err(TransportError::Connect("connection reset".into())));

        let stale = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();

        assert_eq!(stale, fresh);
        assert_eq!(h.transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_rate_limit_during_fetch_serves_stale() {
        let h = harness();
        h.transport.push_json(200, bitcoin_price(64000.0));
        let fresh = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();

        h.clock.advance(Duration::from_secs(31));
        h.transport.push_status(429, "");

        let stale = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(stale, fresh);
        assert!(h.gateway.rate_limit_state().is_limited);
    }

    #[tokio::test]
    async fn test_no_stale_surfaces_network_error() {
        let h = harness();
        h.transport.always(Err(TransportError::Timeout));

        let err = h.gateway.get_global_market_data().await.unwrap_err();

        assert!(matches!(err, GatewayError::UpstreamNetwork(_)));
        assert_eq!(h.transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stale_tier_expires_after_five_fresh_ttls() {
        let h = harness();
        h.transport.push_json(200, bitcoin_price(64000.0));
        h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();

        h.clock.advance(Duration::from_secs(151));
        h.transport.always(Err(TransportError::Timeout));

        let err = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamNetwork(_)));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let h = harness();
        h.transport
            .push_error(TransportError::Connect("refused".into()));
        h.transport.push_error(TransportError::Timeout);
        h.transport.push_json(
            200,
            json!({"data": {"active_cryptocurrencies": 100, "markets": 10}}),
        );

        let stats = h.gateway.get_global_market_data().await.unwrap();

        assert_eq!(stats.active_cryptocurrencies, 100);
        assert_eq!(h.transport.call_count(), 3);
        assert_eq!(h.gateway.rate_limit_state().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_not_found_is_business_error() {
        let h = harness();
        h.transport.push_status(404, r#"{"error":"coin not found"}"#);

        let err = h.gateway.get_coin_details("no-such-coin").await.unwrap_err();

        assert!(matches!(err, GatewayError::UpstreamBusiness { status: 404, .. }));
        assert_eq!(h.transport.call_count(), 1);
        let state = h.gateway.rate_limit_state();
        assert!(!state.is_limited);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_not_cached() {
        let h = harness();
        h.transport.push_json(200, json!({"unexpected": true}));

        let err = h.gateway.get_global_market_data().await.unwrap_err();

        assert!(matches!(err, GatewayError::InvalidResponse(_)));
        assert!(h.gateway.cache_stats().await.keys.is_empty());
    }

    #[tokio::test]
    async fn test_history_interval_and_validation() {
        let h = harness();
        h.transport.push_json(
            200,
            json!({"prices": [[1717000000000u64, 64000.0]], "market_caps": [], "total_volumes": []}),
        );

        let series = h
            .gateway
            .get_coin_history("bitcoin", 90, "usd")
            .await
            .unwrap();

        assert_eq!(series.interval, HistoryInterval::Daily);
        assert_eq!(series.prices.len(), 1);
        let request = &h.transport.requests()[0];
        assert_eq!(request.endpoint, "/coins/bitcoin/market_chart");
        assert_eq!(request.params.get("interval").map(String::as_str), Some("daily"));
        assert_eq!(request.params.get("days").map(String::as_str), Some("90"));

        let err = h.gateway.get_coin_history("bitcoin", 0, "usd").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_news_without_key_uses_fallback() {
        let h = harness();

        let feed = h.gateway.fetch_crypto_news(&NewsQuery::with_limit(5)).await;

        assert_eq!(feed.articles.len(), 5);
        assert!(feed.is_fallback());
        assert!(feed
            .articles
            .iter()
            .all(|a| a.source == DataSource::Fallback));
        assert_eq!(h.transport.call_count(), 0);
        assert!(h.gateway.cache_stats().await.keys.is_empty());
    }

    #[tokio::test]
    async fn test_news_with_key_live_then_degraded() {
        let h = harness_with(GatewayConfig {
            news_api_key: Some("key".into()),
            ..GatewayConfig::default()
        });
        h.transport.push_json(
            200,
            json!({
                "status": "ok",
                "totalResults": 1,
                "articles": [{"title": "Bitcoin rallies", "url": "https://example.com/a"}]
            }),
        );

        let live = h
            .gateway
            .fetch_crypto_news(&NewsQuery {
                query: "bitcoin".into(),
                limit: 3,
            })
            .await;
        assert_eq!(live.source, DataSource::Live);
        assert_eq!(live.articles.len(), 1);
        let request = &h.transport.requests()[0];
        assert!(request
            .headers
            .contains(&("X-Api-Key".to_string(), "key".to_string())));

        h.transport.push_status(500, "internal error");
        let degraded = h
            .gateway
            .fetch_crypto_news(&NewsQuery {
                query: "ethereum".into(),
                limit: 3,
            })
            .await;
        assert!(degraded.is_fallback());
        assert_eq!(degraded.articles.len(), 3);
    }

    #[tokio::test]
    async fn test_news_rate_limit_is_separate_from_market() {
        let h = harness_with(GatewayConfig {
            news_api_key: Some("key".into()),
            ..GatewayConfig::default()
        });
        h.transport.push_status(429, "");

        let feed = h.gateway.fetch_crypto_news(&NewsQuery::default()).await;
        assert!(feed.is_fallback());

        assert!(h.gateway.stats().await.news_rate_limit.is_limited);
        assert!(!h.gateway.rate_limit_state().is_limited);
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let h = harness();
        h.transport.set_delay(Duration::from_millis(20));
        h.transport
            .always(Ok(UpstreamResponse::new(200, bitcoin_price(64000.0).to_string())));

        let (a, b, c) = tokio::join!(
            h.gateway.get_prices(["bitcoin"], "usd"),
            h.gateway.get_prices(["bitcoin"], "usd"),
            h.gateway.get_prices(["BITCOIN"], "usd"),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let h = harness();
        h.transport
            .always(Ok(UpstreamResponse::new(200, bitcoin_price(64000.0).to_string())));
        h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(h.gateway.cache_stats().await.keys.len(), 2);

        h.gateway.clear_cache().await;
        assert!(h.gateway.cache_stats().await.keys.is_empty());

        h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_health_reflects_backoff() {
        let h = harness();
        assert_eq!(h.gateway.health_check().await.status, HealthStatus::Healthy);

        h.transport.push_json(200, bitcoin_price(64000.0));
        h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        h.transport.push_status(429, "");
        h.gateway.get_global_market_data().await.unwrap_err();

        let health = h.gateway.health_check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.details.contains_key("market_rate_limit"));
    }

    #[tokio::test]
    async fn test_cancelled_caller_still_populates_cache() {
        let h = harness();
        h.transport.set_delay(Duration::from_millis(30));
        h.transport.push_json(200, bitcoin_price(64000.0));

        let cancelled = tokio::time::timeout(
            Duration::from_millis(5),
            h.gateway.get_prices(["bitcoin"], "usd"),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.gateway.inflight.is_empty());
        assert_eq!(h.gateway.cache_stats().await.keys.len(), 2);

        let cached = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(cached.get("bitcoin").unwrap().price, 64000.0);
        assert_eq!(h.transport.call_count(), 1);

        h.clock.advance(Duration::from_secs(600));
        h.transport.push_json(200, bitcoin_price(65000.0));
        let refreshed = h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(refreshed.get("bitcoin").unwrap().price, 65000.0);
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_news_limit_is_capped() {
        let h = harness_with(GatewayConfig {
            news_api_key: Some("key".into()),
            ..GatewayConfig::default()
        });
        h.transport.push_json(200, json!({"status": "ok", "articles": []}));

        let feed = h.gateway.fetch_crypto_news(&NewsQuery::with_limit(500)).await;

        assert_eq!(feed.source, DataSource::Live);
        let request = &h.transport.requests()[0];
        assert_eq!(request.params.get("pageSize").map(String::as_str), Some("100"));
    }

    #[tokio::test]
    async fn test_news_zero_limit_skips_upstream() {
        let h = harness_with(GatewayConfig {
            news_api_key: Some("key".into()),
            ..GatewayConfig::default()
        });

        let feed = h.gateway.fetch_crypto_news(&NewsQuery::with_limit(0)).await;

        assert!(feed.articles.is_empty());
        assert_eq!(feed.source, DataSource::Live);
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_sweeper_purges_expired_entries() {
        let h = harness_with(GatewayConfig {
            sweep_interval: Some(Duration::from_millis(10)),
            ..GatewayConfig::default()
        });
        h.transport.push_json(200, bitcoin_price(64000.0));
        h.gateway.get_prices(["bitcoin"], "usd").await.unwrap();
        assert_eq!(h.gateway.cache_stats().await.keys.len(), 2);

        let sweeper = h.gateway.start_cache_sweeper().unwrap();
        h.clock.advance(Duration::from_secs(151));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(h.gateway.cache_stats().await.keys.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_sweeper_disabled_without_interval() {
        let h = harness_with(GatewayConfig {
            sweep_interval: None,
            ..GatewayConfig::default()
        });
        assert!(h.gateway.start_cache_sweeper().is_none());
    }

    #[tokio::test]
    async fn test_health_unhealthy_when_all_fetches_fail() {
        let h = harness();
        h.transport.always(Err(TransportError::Connect("refused".into())));

        h.gateway.get_prices(["bitcoin"], "usd").await.unwrap_err();
        h.gateway.get_global_market_data().await.unwrap_err();

        let health = h.gateway.health_check().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(
            health.message.as_deref(),
            Some("Recent market data fetches all failed")
        );
    }

    #[tokio::test]
    async fn test_health_reports_news_backoff() {
        let h = harness_with(GatewayConfig {
            news_api_key: Some("key".into()),
            ..GatewayConfig::default()
        });
        h.transport.push_status(429, "");
        h.gateway.fetch_crypto_news(&NewsQuery::default()).await;

        let health = h.gateway.health_check().await;

        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(
            health.message.as_deref(),
            Some("News upstream in backoff for 2000ms")
        );
    }
}
