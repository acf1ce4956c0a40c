//! CoinGecko market data endpoints

use super::decode;
use crate::{
    constants::{
        COINGECKO_API_KEY_HEADER, COINGECKO_COINS_ENDPOINT, COINGECKO_GLOBAL_ENDPOINT,
        COINGECKO_SIMPLE_PRICE_ENDPOINT,
    },
    error::{FetchError, GatewayError},
    transport::UpstreamRequest,
    types::{
        CoinDetail, CoinMarketData, GlobalStats, HistoryInterval, HistoryPoint, HistorySeries,
        PriceMap, PriceQuote,
    },
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// CoinGecko API response for simple price queries: coin id → field → value
type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalStats,
}

#[derive(Debug, Deserialize)]
struct CoinDetailResponse {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    description: HashMap<String, Option<String>>,
    #[serde(default)]
    image: Option<ImageLinks>,
    #[serde(default)]
    links: Option<Links>,
    #[serde(default)]
    market_cap_rank: Option<u32>,
    #[serde(default)]
    categories: Vec<Option<String>>,
    #[serde(default)]
    market_data: Option<MarketDataResponse>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    #[serde(default)]
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    homepage: Vec<Option<String>>,
}

type CurrencyValues = HashMap<String, Option<f64>>;

#[derive(Debug, Deserialize)]
struct MarketDataResponse {
    #[serde(default)]
    current_price: CurrencyValues,
    #[serde(default)]
    market_cap: CurrencyValues,
    #[serde(default)]
    total_volume: CurrencyValues,
    #[serde(default)]
    high_24h: CurrencyValues,
    #[serde(default)]
    low_24h: CurrencyValues,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    circulating_supply: Option<f64>,
    #[serde(default)]
    total_supply: Option<f64>,
    #[serde(default)]
    max_supply: Option<f64>,
}

/// `[timestamp_ms, value]` pairs; value may be null
type ChartSeries = Vec<(f64, Option<f64>)>;

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: ChartSeries,
    #[serde(default)]
    market_caps: ChartSeries,
    #[serde(default)]
    total_volumes: ChartSeries,
}

/// Request builder for the CoinGecko API
#[derive(Debug, Clone)]
pub struct CoinGeckoApi {
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoApi {
    /// Creates a builder for `base_url`, sending `api_key` when set
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }

    fn request(&self, endpoint: impl Into<String>) -> UpstreamRequest {
        UpstreamRequest::new(self.base_url.clone(), endpoint)
            .header_opt(COINGECKO_API_KEY_HEADER, self.api_key.as_deref())
    }

    /// `GET /simple/price?ids=..&vs_currencies=..&include_24hr_change=true`
    pub fn simple_price(&self, coin_ids: &[String], currency: &str) -> UpstreamRequest {
        self.request(COINGECKO_SIMPLE_PRICE_ENDPOINT)
            .param("ids", coin_ids.join(","))
            .param("vs_currencies", currency)
            .param("include_24hr_change", "true")
    }

    /// `GET /global`
    pub fn global(&self) -> UpstreamRequest {
        self.request(COINGECKO_GLOBAL_ENDPOINT)
    }

    /// `GET /coins/{id}` without tickers, localization, community or developer data
    pub fn coin_details(&self, coin_id: &str) -> UpstreamRequest {
        self.request(format!("{COINGECKO_COINS_ENDPOINT}/{coin_id}"))
            .param("localization", "false")
            .param("tickers", "false")
            .param("market_data", "true")
            .param("community_data", "false")
            .param("developer_data", "false")
    }

    /// `GET /coins/{id}/market_chart?vs_currency=..&days=..[&interval=daily]`
    pub fn market_chart(
        &self,
        coin_id: &str,
        days: u32,
        currency: &str,
        interval: HistoryInterval,
    ) -> UpstreamRequest {
        let request = self
            .request(format!("{COINGECKO_COINS_ENDPOINT}/{coin_id}/market_chart"))
            .param("vs_currency", currency)
            .param("days", days.to_string());

        match interval.upstream_param() {
            Some(value) => request.param("interval", value),
            None => request,
        }
    }
}

/// Validates and normalizes a coin id: trimmed, lowercase, `[a-z0-9-]`
pub fn normalize_coin_id(coin_id: &str) -> Result<String, GatewayError> {
    let id = coin_id.trim().to_lowercase();
    if id.is_empty() {
        return Err(GatewayError::invalid_request("coin id must not be empty"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(GatewayError::invalid_request(format!(
            "invalid coin id: {coin_id}"
        )));
    }
    Ok(id)
}

/// Normalizes a set of coin ids into a sorted, deduplicated list
pub fn normalize_coin_ids<I, S>(coin_ids: I) -> Result<Vec<String>, GatewayError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let ids: BTreeSet<String> = coin_ids
        .into_iter()
        .filter(|id| !id.as_ref().trim().is_empty())
        .map(|id| normalize_coin_id(id.as_ref()))
        .collect::<Result<_, _>>()?;
    Ok(ids.into_iter().collect())
}

/// Validates and normalizes a quote currency (`usd`, `eur`, `btc`, ...)
pub fn normalize_currency(currency: &str) -> Result<String, GatewayError> {
    let currency = currency.trim().to_lowercase();
    if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GatewayError::invalid_request(format!(
            "invalid currency: {currency:?}"
        )));
    }
    Ok(currency)
}

/// Narrows a simple price response to the requested coins
///
/// Coins the upstream does not know are omitted, as the upstream does.
pub fn parse_prices(
    raw: Value,
    coin_ids: &[String],
    currency: &str,
) -> Result<PriceMap, FetchError> {
    let response: SimplePriceResponse = decode(raw, "CoinGecko simple price response")?;
    let change_key = format!("{currency}_24h_change");

    let prices = coin_ids
        .iter()
        .filter_map(|id| {
            let fields = response.get(id)?;
            let price = fields.get(currency).copied().flatten()?;
            let change_24h = fields.get(&change_key).copied().flatten();
            Some((id.clone(), PriceQuote { price, change_24h }))
        })
        .collect();

    Ok(PriceMap {
        currency: currency.to_string(),
        prices,
    })
}

/// Narrows a `/global` response
pub fn parse_global(raw: Value) -> Result<GlobalStats, FetchError> {
    let response: GlobalResponse = decode(raw, "CoinGecko global response")?;
    Ok(response.data)
}

fn present_values(values: CurrencyValues) -> BTreeMap<String, f64> {
    values
        .into_iter()
        .filter_map(|(currency, value)| value.map(|v| (currency, v)))
        .collect()
}

/// Narrows a `/coins/{id}` response
pub fn parse_coin_details(raw: Value) -> Result<CoinDetail, FetchError> {
    let response: CoinDetailResponse = decode(raw, "CoinGecko coin detail response")?;

    let description = response
        .description
        .get("en")
        .cloned()
        .flatten()
        .filter(|text| !text.is_empty());

    let homepage = response
        .links
        .and_then(|links| links.homepage.into_iter().flatten().find(|l| !l.is_empty()));

    let market_data = response.market_data.map(|m| CoinMarketData {
        current_price: present_values(m.current_price),
        market_cap: present_values(m.market_cap),
        total_volume: present_values(m.total_volume),
        high_24h: present_values(m.high_24h),
        low_24h: present_values(m.low_24h),
        price_change_percentage_24h: m.price_change_percentage_24h,
        circulating_supply: m.circulating_supply,
        total_supply: m.total_supply,
        max_supply: m.max_supply,
    });

    Ok(CoinDetail {
        id: response.id,
        symbol: response.symbol,
        name: response.name,
        description,
        image: response.image.and_then(|i| i.large),
        homepage,
        market_cap_rank: response.market_cap_rank,
        categories: response.categories.into_iter().flatten().collect(),
        market_data,
        last_updated: response.last_updated,
    })
}

fn chart_points(series: ChartSeries) -> Vec<HistoryPoint> {
    series
        .into_iter()
        .filter_map(|(timestamp, value)| {
            value.map(|value| HistoryPoint {
                timestamp_ms: timestamp as i64,
                value,
            })
        })
        .collect()
}

/// Narrows a `/coins/{id}/market_chart` response
pub fn parse_market_chart(
    raw: Value,
    coin_id: &str,
    currency: &str,
    days: u32,
    interval: HistoryInterval,
) -> Result<HistorySeries, FetchError> {
    let response: MarketChartResponse = decode(raw, "CoinGecko market chart response")?;

    Ok(HistorySeries {
        coin_id: coin_id.to_string(),
        currency: currency.to_string(),
        days,
        interval,
        prices: chart_points(response.prices),
        market_caps: chart_points(response.market_caps),
        total_volumes: chart_points(response.total_volumes),
    })
}
