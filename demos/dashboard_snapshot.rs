use market_data_gateway::{GatewayConfig, MarketDataGateway, NewsQuery, PriceFeed};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("market_data_gateway=info")),
        )
        .init();

    // 1. Build the gateway from COINGECKO_* / NEWS_* / GATEWAY_* variables (.env supported)
    let gateway = Arc::new(MarketDataGateway::new(GatewayConfig::from_env()?)?);
    let _sweeper = gateway.start_cache_sweeper();

    println!("Market data dashboard snapshot");
    println!("-------------------------------------------");

    // 2. Prices: the first call goes upstream, the second is served from cache
    let coins = ["bitcoin", "ethereum", "solana"];
    let start = Instant::now();
    match gateway.get_prices(coins, "usd").await {
        Ok(prices) => {
            for (id, quote) in &prices.prices {
                let change = quote
                    .change_24h
                    .map(|c| format!("{c:+.2}%"))
                    .unwrap_or_else(|| "n/a".to_string());
                println!("   {:<10} ${:>12.2}  {}", id, quote.price, change);
            }
            println!("   Upstream latency: {:?}", start.elapsed());
        }
        Err(e) => eprintln!("   Error: could not fetch prices: {}", e),
    }

    let start = Instant::now();
    if gateway.get_prices(coins, "usd").await.is_ok() {
        println!("   Cached latency:   {:?}", start.elapsed());
    }
    println!();

    // 3. Market-wide statistics
    match gateway.get_global_market_data().await {
        Ok(global) => {
            println!("Global market");
            println!("   Active cryptocurrencies: {}", global.active_cryptocurrencies);
            if let Some(cap) = global.total_market_cap.get("usd") {
                println!("   Total market cap: ${:.0}", cap);
            }
            if let Some(btc) = global.market_cap_percentage.get("btc") {
                println!("   BTC dominance: {:.2}%", btc);
            }
        }
        Err(e) => eprintln!("   Error: could not fetch global stats: {}", e),
    }
    println!();

    // 4. News (falls back to a fixed dataset without NEWS_API_KEY)
    let news = gateway.fetch_crypto_news(&NewsQuery::with_limit(5)).await;
    println!("News ({:?})", news.source);
    for article in &news.articles {
        println!("   - {}", article.title);
    }
    println!();

    // 5. A few pushes from the price feed
    let feed = PriceFeed::spawn(
        gateway.clone(),
        coins.iter().map(|c| c.to_string()).collect(),
        "usd",
        Duration::from_secs(10),
    );
    let mut events = feed.subscribe();
    for _ in 0..2 {
        match events.recv().await {
            Ok(event) => println!("Feed: {}", event),
            Err(e) => {
                eprintln!("Feed closed: {}", e);
                break;
            }
        }
    }
    feed.shutdown();

    println!();
    println!("{}", serde_json::to_string_pretty(&gateway.health_check().await)?);

    Ok(())
}
