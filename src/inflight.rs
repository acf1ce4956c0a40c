//! Coalescing of concurrent upstream loads
//!
//! When several callers miss the cache for the same key at once, only the
//! first one starts a load; the others await the same shared future. Each
//! load runs on its own task, so it completes (and writes the cache) even if
//! every waiter is dropped. The task removes its registry entry when it
//! finishes, so the next miss starts a new load.

use crate::error::GatewayError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a coalesced load
pub type LoadResult = Result<Value, GatewayError>;

type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

type Registry = Arc<Mutex<HashMap<String, (u64, SharedLoad)>>>;

/// Registry of loads currently in progress, keyed by cache identity
#[derive(Default)]
pub struct InFlight {
    loads: Registry,
    next_id: AtomicU64,
}

impl InFlight {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the load for `key`, starting it with `start` if none is running
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run<F>(&self, key: &str, start: F) -> LoadResult
    where
        F: FnOnce() -> BoxFuture<'static, LoadResult>,
    {
        let load = {
            let mut loads = self.loads.lock();
            match loads.get(key) {
                Some((_, load)) => {
                    tracing::debug!(key, "Joining in-flight upstream load");
                    load.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let load = Self::spawn_load(self.loads.clone(), key.to_string(), id, start());
                    loads.insert(key.to_string(), (id, load.clone()));
                    load
                }
            }
        };

        load.await
    }

    /// Runs `load` on its own task and returns a shareable handle to its result
    fn spawn_load(
        registry: Registry,
        key: String,
        id: u64,
        load: BoxFuture<'static, LoadResult>,
    ) -> SharedLoad {
        let handle = tokio::spawn(async move {
            let result = load.await;

            let mut loads = registry.lock();
            if loads.get(&key).is_some_and(|(current, _)| *current == id) {
                loads.remove(&key);
            }

            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(GatewayError::UpstreamNetwork(format!(
                    "upstream load task failed: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }

    /// Number of loads currently registered
    pub fn len(&self) -> usize {
        self.loads.lock().len()
    }

    /// Whether no load is in progress
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
