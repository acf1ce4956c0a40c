//! News API search endpoint

use super::decode;
use crate::{
    constants::{NEWS_API_KEY_HEADER, NEWS_EVERYTHING_ENDPOINT},
    error::FetchError,
    transport::UpstreamRequest,
    types::{DataSource, NewsArticle, NewsFeed, NewsQuery},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<ArticleResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleResponse {
    #[serde(default)]
    source: Option<ArticleSource>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    url_to_image: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: Option<String>,
}

/// Request builder for the news API
#[derive(Debug, Clone)]
pub struct NewsApi {
    base_url: String,
    api_key: Option<String>,
}

impl NewsApi {
    /// Creates a builder for `base_url`; live news needs `api_key`
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Whether live news can be requested at all
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// `GET /everything?q=..&pageSize=..&sortBy=publishedAt&language=en`
    pub fn everything(&self, query: &NewsQuery) -> UpstreamRequest {
        UpstreamRequest::new(self.base_url.clone(), NEWS_EVERYTHING_ENDPOINT)
            .param("q", query.query.clone())
            .param("pageSize", query.limit.to_string())
            .param("sortBy", "publishedAt")
            .param("language", "en")
            .header_opt(NEWS_API_KEY_HEADER, self.api_key.as_deref())
    }
}

/// Narrows a search response to at most `limit` live articles
///
/// Articles without a title or URL are dropped.
pub fn parse_news(raw: Value, limit: usize) -> Result<NewsFeed, FetchError> {
    let response: EverythingResponse = decode(raw, "news response")?;

    if response.status != "ok" {
        return Err(FetchError::InvalidResponse(format!(
            "news API returned status {}: {}",
            response.status,
            response.message.unwrap_or_default()
        )));
    }

    let articles = response
        .articles
        .into_iter()
        .filter_map(|article| {
            Some(NewsArticle {
                title: article.title.filter(|t| !t.is_empty())?,
                url: article.url.filter(|u| !u.is_empty())?,
                description: article.description,
                image_url: article.url_to_image,
                publisher: article.source.and_then(|s| s.name),
                published_at: article.published_at,
                source: DataSource::Live,
            })
        })
        .take(limit)
        .collect();

    Ok(NewsFeed {
        articles,
        source: DataSource::Live,
    })
}
