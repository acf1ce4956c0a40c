//! Upstream resource definitions
//!
//! Each upstream module knows how to build requests for its endpoints and how
//! to narrow the raw JSON it returns into the typed schemas of
//! [`crate::types`]. Narrowing happens once, at the fetch boundary, and the
//! cache stores the narrowed value.

pub mod coingecko;
pub mod news;

pub use coingecko::CoinGeckoApi;
pub use news::NewsApi;

use crate::{error::FetchError, transport::UpstreamRequest};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Converts a raw upstream payload into the cached representation
pub type Narrow = Arc<dyn Fn(Value) -> Result<Value, FetchError> + Send + Sync>;

/// A request together with its cache policy and narrowing step
#[derive(Clone)]
pub struct Resource {
    pub request: UpstreamRequest,
    /// Fresh-tier TTL
    pub ttl: Duration,
    pub narrow: Narrow,
}

impl Resource {
    /// Creates a resource whose narrowed value `T` is what gets cached
    pub fn new<T, F>(request: UpstreamRequest, ttl: Duration, narrow: F) -> Self
    where
        T: Serialize,
        F: Fn(Value) -> Result<T, FetchError> + Send + Sync + 'static,
    {
        let narrow: Narrow = Arc::new(move |raw| {
            let typed = narrow(raw)?;
            serde_json::to_value(typed).map_err(|e| FetchError::InvalidResponse(e.to_string()))
        });

        Self {
            request,
            ttl,
            narrow,
        }
    }

    /// Cache identity of the underlying request
    pub fn key(&self) -> String {
        self.request.cache_key()
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("request", &self.request)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Deserializes `raw` into `T`, naming `what` in the error
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    raw: Value,
    what: &str,
) -> Result<T, FetchError> {
    serde_json::from_value(raw)
        .map_err(|e| FetchError::InvalidResponse(format!("Failed to parse {what}: {e}")))
}
