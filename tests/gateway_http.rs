//! End-to-end tests against a mock HTTP upstream

use market_data_gateway::{
    DataSource, GatewayConfig, GatewayError, MarketDataGateway, NewsQuery,
};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        coingecko_base_url: server.uri(),
        coingecko_api_key: Some("demo-key".into()),
        news_base_url: server.uri(),
        sweep_interval: None,
        ..GatewayConfig::default()
    }
}

#[tokio::test]
async fn prices_are_fetched_once_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "bitcoin"))
        .and(query_param("vs_currencies", "usd"))
        .and(header("x-cg-demo-api-key", "demo-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bitcoin": {"usd": 64000.5, "usd_24h_change": -1.25}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MarketDataGateway::new(config_for(&server)).unwrap();

    let first = gateway.get_prices(["bitcoin"], "usd").await.unwrap();
    let second = gateway.get_prices(["bitcoin"], "usd").await.unwrap();

    assert_eq!(first, second);
    let btc = first.get("bitcoin").unwrap();
    assert_eq!(btc.price, 64000.5);
    assert_eq!(btc.change_24h, Some(-1.25));

    let stats = gateway.cache_stats().await;
    assert_eq!(stats.hit_count, 1);
}

#[tokio::test]
async fn unknown_coin_is_a_business_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/not-a-coin"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "coin not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MarketDataGateway::new(config_for(&server)).unwrap();
    let err = gateway.get_coin_details("not-a-coin").await.unwrap_err();

    match err {
        GatewayError::UpstreamBusiness { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("coin not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_blocks_further_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/global"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MarketDataGateway::new(config_for(&server)).unwrap();

    let first = gateway.get_global_market_data().await.unwrap_err();
    assert_eq!(first.retry_after_ms(), Some(2000));

    let second = gateway.get_global_market_data().await.unwrap_err();
    assert!(matches!(second, GatewayError::RateLimited { retry_after_ms } if retry_after_ms <= 2000));
    assert!(gateway.rate_limit_state().is_limited);
}

#[tokio::test]
async fn live_news_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/everything"))
        .and(query_param("q", "bitcoin"))
        .and(header("X-Api-Key", "news-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {
                    "source": {"id": null, "name": "CoinDesk"},
                    "title": "Bitcoin rallies",
                    "url": "https://example.com/a",
                    "publishedAt": "2024-05-30T12:00:00Z"
                },
                {"title": "Ether steady", "url": "https://example.com/b"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = MarketDataGateway::new(GatewayConfig {
        news_api_key: Some("news-key".into()),
        ..config_for(&server)
    })
    .unwrap();

    let feed = gateway
        .fetch_crypto_news(&NewsQuery {
            query: "bitcoin".into(),
            limit: 5,
        })
        .await;

    assert_eq!(feed.source, DataSource::Live);
    assert_eq!(feed.articles.len(), 2);
    assert_eq!(feed.articles[0].publisher.as_deref(), Some("CoinDesk"));
}

#[tokio::test]
async fn news_without_key_never_calls_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = MarketDataGateway::new(config_for(&server)).unwrap();
    let feed = gateway.fetch_crypto_news(&NewsQuery::with_limit(5)).await;

    assert_eq!(feed.articles.len(), 5);
    assert_eq!(feed.source, DataSource::Fallback);
}
