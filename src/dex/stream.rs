//! Block-aware pool price stream
//!
//! Any token transfer into or out of the pool can move its reserves, so both
//! transfer filters feed one handler. Reserves settle once per block, so only
//! the first event of a strictly higher block triggers a recomputation.

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, trace, warn};
use crate::{
    dex::{
        pricing::{check_token_decimals, derive_prices},
        reader::{PoolReader, TransferDirection, TransferEvent},
    },
    errors::BotResult,
    network::{retry_with_backoff, RetryConfig},
    types::{DexPrices, MarketEvent},
};

pub struct DexPriceStream<R: PoolReader> {
    inner: Arc<DexInner<R>>,
}

struct DexInner<R: PoolReader> {
    reader: R,
    token_decimals: u32,
    latest_block: AtomicU64,
    closed: AtomicBool,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: PoolReader> DexPriceStream<R> {
    /// Fails with a configuration error if `token_decimals` exceeds [`MAX_SCALE`](crate::types::MAX_SCALE).
    pub fn new(reader: R, token_decimals: u32) -> BotResult<Self> {
        let token_decimals = check_token_decimals(token_decimals)?;
        Ok(Self {
            inner: Arc::new(DexInner {
                reader,
                token_decimals,
                latest_block: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                task: Mutex::new(None),
            }),
        })
    }

    /// Current prices from live reserves.
    pub async fn get_exchange_prices(&self) -> BotResult<DexPrices> {
        self.inner.prices_at(None).await
    }

    /// Subscribe to pool transfers; each accepted block yields one price update on `tx`.
    pub fn listen(&self, tx: mpsc::Sender<MarketEvent>) {
        if self.inner.closed.load(Ordering::SeqCst) {
            warn!("pool price stream already closed, not listening");
            return;
        }
        let mut task = self.inner.task.lock();
        if task.is_some() {
            warn!("pool price stream already has a listener");
            return;
        }
        let inner = self.inner.clone();
        *task = Some(tokio::spawn(inner.run(tx)));
    }

    /// Unsubscribe from transfer events. Safe to call more than once.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(pool = %self.inner.reader.pool_address(), "closing pool price stream");
        self.inner.shutdown.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Highest block whose transfers triggered a recomputation.
    pub fn latest_block(&self) -> u64 {
        self.inner.latest_block.load(Ordering::SeqCst)
    }

    pub async fn join(&self) {
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "pool price stream task ended abnormally");
            }
        }
    }
}

impl<R: PoolReader> DexInner<R> {
    async fn prices_at(&self, block_number: Option<u64>) -> BotResult<DexPrices> {
        let reader = &self.reader;
        let retry = RetryConfig { initial_delay_ms: 200, ..Default::default() };

        let token_reserve = retry_with_backoff(
            || async move { reader.token_reserve().await.map_err(anyhow::Error::from) },
            &retry,
            "token reserve",
        )
        .await?;
        let native_reserve = retry_with_backoff(
            || async move { reader.native_reserve().await.map_err(anyhow::Error::from) },
            &retry,
            "native reserve",
        )
        .await?;

        derive_prices(token_reserve, native_reserve, self.token_decimals, block_number)
    }

    /// Claim `block` for recomputation; false if it is not newer than the last one.
    fn accept_block(&self, block: u64) -> bool {
        let previous = self.latest_block.fetch_max(block, Ordering::SeqCst);
        block > previous
    }

    async fn run(self: Arc<Self>, tx: mpsc::Sender<MarketEvent>) {
        let (from_pool, to_pool) = match self.subscribe_both().await {
            Ok(streams) => streams,
            Err(e) => {
                error!(error = %e, "could not subscribe to pool transfers");
                return;
            }
        };
        let mut transfers = futures_util::stream::select(from_pool, to_pool);

        loop {
            let event = tokio::select! {
                _ = self.shutdown.notified() => break,
                event = transfers.next() => match event {
                    Some(event) => event,
                    None => {
                        warn!("transfer subscription ended");
                        break;
                    }
                },
            };

            if !self.handle_transfer(event, &tx).await {
                break;
            }
        }
        debug!("pool price stream stopped");
    }

    async fn subscribe_both(
        &self,
    ) -> BotResult<(crate::dex::TransferStream, crate::dex::TransferStream)> {
        let reader = &self.reader;
        let retry = RetryConfig { max_attempts: 5, initial_delay_ms: 500, ..Default::default() };
        let from_pool = retry_with_backoff(
            || async move {
                reader.subscribe_transfers(TransferDirection::FromPool).await.map_err(anyhow::Error::from)
            },
            &retry,
            "subscribe transfers from pool",
        )
        .await?;
        let to_pool = retry_with_backoff(
            || async move {
                reader.subscribe_transfers(TransferDirection::ToPool).await.map_err(anyhow::Error::from)
            },
            &retry,
            "subscribe transfers to pool",
        )
        .await?;
        Ok((from_pool, to_pool))
    }

    /// Returns `false` once the receiving side has gone away.
    async fn handle_transfer(&self, event: TransferEvent, tx: &mpsc::Sender<MarketEvent>) -> bool {
        if !self.accept_block(event.block_number) {
            trace!(block = event.block_number, "pool already priced for this block");
            return true;
        }

        let prices = match self.prices_at(Some(event.block_number)).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(block = event.block_number, error = %e, "failed to recompute pool price");
                return true;
            }
        };

        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        info!(
            block = event.block_number,
            native_price = %prices.native_in_token_units,
            token_price_wei = %prices.token_in_native_units.raw(),
            "DEX price updated"
        );
        tx.send(MarketEvent::Dex(prices)).await.is_ok()
    }
}
