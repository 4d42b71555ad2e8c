//! Timer-refreshed gas price cache
//!
//! A background task replaces the snapshot every `ttl` whether or not anyone
//! reads it. A failed refresh keeps the previous snapshot. Readers only touch
//! the network when no snapshot has ever been obtained.

use alloy::primitives::U256;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::RwLock,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use crate::{
    errors::BotResult,
    gas::station::GasPriceSource,
    network::{retry_with_backoff, RetryConfig},
    types::GasPriceInfo,
    utils::pow10_u256,
};

/// Gas station tiers are quoted in gwei.
const GWEI_DECIMALS: u32 = 9;

pub struct GasPriceCache {
    source: Arc<dyn GasPriceSource>,
    latest: Arc<RwLock<Option<GasPriceInfo>>>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl GasPriceCache {
    /// Start the refresh timer; the first tick fires one `ttl` from now.
    pub fn new(source: Arc<dyn GasPriceSource>, ttl: Duration) -> Self {
        let latest = Arc::new(RwLock::new(None));
        let refresher = tokio::spawn(refresh_loop(source.clone(), latest.clone(), ttl));

        Self {
            source,
            latest,
            refresher: Mutex::new(Some(refresher)),
        }
    }

    /// Last known snapshot, fetched on the spot only if none exists yet.
    pub async fn get_gas_info(&self) -> BotResult<GasPriceInfo> {
        if let Some(info) = self.latest.read().await.as_ref() {
            return Ok(info.clone());
        }

        let mut latest = self.latest.write().await;
        // Another caller or the timer may have filled it while we waited.
        if let Some(info) = latest.as_ref() {
            return Ok(info.clone());
        }

        debug!("no cached gas price yet, fetching");
        let source = &self.source;
        let info = retry_with_backoff(
            || async move { source.fetch().await.map_err(anyhow::Error::from) },
            &RetryConfig::default(),
            "gas price fetch",
        )
        .await?;
        *latest = Some(info.clone());
        Ok(info)
    }

    /// Fastest tier converted from gwei to wei.
    pub async fn get_fastest_price_in_wei(&self) -> BotResult<U256> {
        let info = self.get_gas_info().await?;
        Ok(U256::from(info.fastest) * pow10_u256(GWEI_DECIMALS))
    }

    /// Stop the refresh timer. Safe to call more than once.
    pub fn close(&self) {
        if let Some(handle) = self.refresher.lock().take() {
            handle.abort();
            info!("gas price refresh stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.refresher.lock().is_none()
    }
}

impl Drop for GasPriceCache {
    fn drop(&mut self) {
        if let Some(handle) = self.refresher.get_mut().take() {
            handle.abort();
        }
    }
}

async fn refresh_loop(
    source: Arc<dyn GasPriceSource>,
    latest: Arc<RwLock<Option<GasPriceInfo>>>,
    ttl: Duration,
) {
    let mut ticker = interval_at(Instant::now() + ttl, ttl);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match source.fetch().await {
            Ok(info) => {
                debug!(fastest = info.fastest, "gas price refreshed");
                *latest.write().await = Some(info);
            }
            Err(e) => {
                warn!(error = %e, "gas price refresh failed, keeping last value");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BotError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Returns `fastest = call number`, failing while `failing` is set.
    struct CountingSource {
        calls: AtomicU64,
        failing: std::sync::atomic::AtomicBool,
    }

    impl CountingSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                failing: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl GasPriceSource for CountingSource {
        async fn fetch(&self) -> BotResult<GasPriceInfo> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.load(Ordering::SeqCst) {
                return Err(BotError::Network {
                    message: "gas station down".into(),
                    source: None,
                    retry_count: 0,
                });
            }
            Ok(GasPriceInfo::with_fastest(n))
        }
    }

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn lazy_fetch_before_first_tick() {
        let source = CountingSource::new();
        let cache = GasPriceCache::new(source.clone(), TTL);

        let wei = cache.get_fastest_price_in_wei().await.unwrap();
        assert_eq!(wei, U256::from(1_000_000_000u64));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Served from cache afterwards.
        cache.get_gas_info().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_replaces_snapshot() {
        let source = CountingSource::new();
        let cache = GasPriceCache::new(source.clone(), TTL);
        assert_eq!(cache.get_gas_info().await.unwrap().fastest, 1);

        tokio::time::sleep(TTL + Duration::from_millis(1)).await;
        assert_eq!(cache.get_gas_info().await.unwrap().fastest, 2);

        tokio::time::sleep(TTL).await;
        assert_eq!(cache.get_gas_info().await.unwrap().fastest, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_value() {
        let source = CountingSource::new();
        let cache = GasPriceCache::new(source.clone(), TTL);
        assert_eq!(cache.get_gas_info().await.unwrap().fastest, 1);

        source.failing.store(true, Ordering::SeqCst);
        tokio::time::sleep(TTL * 3 + Duration::from_millis(1)).await;
        assert!(source.calls.load(Ordering::SeqCst) >= 4);
        assert_eq!(cache.get_gas_info().await.unwrap().fastest, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_refreshing_and_is_idempotent() {
        let source = CountingSource::new();
        let cache = GasPriceCache::new(source.clone(), TTL);
        cache.close();
        cache.close();
        assert!(cache.is_closed());

        tokio::time::sleep(TTL * 5).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
