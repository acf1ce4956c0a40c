//! Degraded-mode data
//!
//! Served when live news is unavailable (no API key, or the upstream failed).
//! The dataset is fixed so that dashboards render the same placeholder
//! content every time, and it never touches the cache.

use crate::types::{DataSource, NewsArticle, NewsFeed};
use chrono::DateTime;

/// Publication time of the newest fallback article (Unix seconds)
const FALLBACK_NEWEST_AT: i64 = 1_717_063_200;

struct FallbackArticle {
    title: &'static str,
    description: &'static str,
    url: &'static str,
    publisher: &'static str,
}

const FALLBACK_ARTICLES: &[FallbackArticle] = &[
    FallbackArticle {
        title: "Bitcoin holds steady as markets await macro data",
        description: "The largest cryptocurrency traded in a narrow range as investors weighed upcoming inflation figures.",
        url: "https://example.com/news/bitcoin-holds-steady",
        publisher: "Market Wire",
    },
    FallbackArticle {
        title: "Ethereum developers finalize next network upgrade",
        description: "Core developers agreed on the scope of the upcoming hard fork focused on validator efficiency.",
        url: "https://example.com/news/ethereum-upgrade",
        publisher: "Chain Digest",
    },
    FallbackArticle {
        title: "Stablecoin supply reaches new high",
        description: "Combined stablecoin market capitalization climbed as on-chain settlement volumes grew.",
        url: "https://example.com/news/stablecoin-supply",
        publisher: "Ledger Times",
    },
    FallbackArticle {
        title: "Solana network activity climbs on decentralized exchange volume",
        description: "Daily transactions on Solana rose alongside trading activity on decentralized exchanges.",
        url: "https://example.com/news/solana-activity",
        publisher: "Block Report",
    },
    FallbackArticle {
        title: "Regulators publish draft framework for digital asset custody",
        description: "The proposal outlines capital and segregation requirements for firms holding client crypto assets.",
        url: "https://example.com/news/custody-framework",
        publisher: "Policy Brief",
    },
    FallbackArticle {
        title: "Bitcoin mining difficulty adjusts after hashrate rebound",
        description: "Network difficulty rose following a recovery in total hashrate across major mining pools.",
        url: "https://example.com/news/mining-difficulty",
        publisher: "Hash Monitor",
    },
    FallbackArticle {
        title: "Layer 2 networks see record fee savings",
        description: "Rollup activity pushed average transaction costs lower for Ethereum users.",
        url: "https://example.com/news/layer2-fees",
        publisher: "Chain Digest",
    },
    FallbackArticle {
        title: "Institutional inflows into crypto funds continue for third week",
        description: "Digital asset investment products recorded net inflows led by Bitcoin-focused funds.",
        url: "https://example.com/news/fund-inflows",
        publisher: "Market Wire",
    },
    FallbackArticle {
        title: "DeFi lending protocols report rising collateral levels",
        description: "Total value locked in lending markets increased as borrowers added collateral.",
        url: "https://example.com/news/defi-collateral",
        publisher: "Yield Watch",
    },
    FallbackArticle {
        title: "Crypto market volatility falls to multi-month low",
        description: "Implied volatility for major assets declined as prices consolidated.",
        url: "https://example.com/news/volatility-low",
        publisher: "Ledger Times",
    },
];

/// Number of articles available in degraded mode
pub fn fallback_news_len() -> usize {
    FALLBACK_ARTICLES.len()
}

/// Up to `limit` fallback articles, newest first, tagged as fallback data
pub fn fallback_news(limit: usize) -> NewsFeed {
    let articles = FALLBACK_ARTICLES
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, article)| NewsArticle {
            title: article.title.to_string(),
            description: Some(article.description.to_string()),
            url: article.url.to_string(),
            image_url: None,
            publisher: Some(article.publisher.to_string()),
            published_at: DateTime::from_timestamp(FALLBACK_NEWEST_AT - i as i64 * 3600, 0),
            source: DataSource::Fallback,
        })
        .collect();

    NewsFeed {
        articles,
        source: DataSource::Fallback,
    }
}
