//! Periodic price push channel
//!
//! A [`PriceFeed`] polls [`MarketDataGateway::get_prices`] on a fixed interval
//! and broadcasts the outcome to every subscriber. Polls go through the
//! gateway, so they are served from cache within the fresh TTL and respect
//! the upstream backoff.

use crate::{constants::FEED_CHANNEL_CAPACITY, gateway::MarketDataGateway, types::PriceFeedEvent};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Background price poller with broadcast fan-out
pub struct PriceFeed {
    tx: broadcast::Sender<PriceFeedEvent>,
    handle: JoinHandle<()>,
}

impl PriceFeed {
    /// Starts polling prices for `coin_ids` in `currency` every `interval`
    ///
    /// The first poll happens immediately. Must be called from within a
    /// tokio runtime.
    pub fn spawn(
        gateway: Arc<MarketDataGateway>,
        coin_ids: Vec<String>,
        currency: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let (tx, _) = broadcast::channel(FEED_CHANNEL_CAPACITY);
        let currency = currency.into();
        let sender = tx.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(
                coins = coin_ids.len(),
                currency = %currency,
                interval_ms = interval.as_millis() as u64,
                "Starting price feed"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let event = match gateway.get_prices(&coin_ids, &currency).await {
                    Ok(prices) => PriceFeedEvent::PricesUpdated {
                        id: Uuid::new_v4(),
                        prices,
                        timestamp: Utc::now(),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Price feed poll failed");
                        PriceFeedEvent::FetchFailed {
                            id: Uuid::new_v4(),
                            error_message: e.to_string(),
                            retry_after_ms: e.retry_after_ms(),
                            timestamp: Utc::now(),
                        }
                    }
                };

                // No receivers is fine; the feed keeps polling for late subscribers.
                if sender.send(event).is_err() {
                    tracing::trace!("Price feed has no subscribers");
                }
            }
        });

        Self { tx, handle }
    }

    /// Receives every event broadcast after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PriceFeedEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Whether the polling task is still alive
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops polling; subscribers see the channel close
    pub fn shutdown(self) {
        self.handle.abort();
        tracing::info!("Price feed stopped");
    }
}
