//! In-memory venues shared by the integration tests

#![allow(dead_code)]

use alloy::primitives::{address, Address, U256};
use async_trait::async_trait;
use dual_feed_arb::{
    cex::{DepthConnection, DepthVenue, WireEvent},
    dex::{PoolReader, TransferDirection, TransferEvent, TransferStream},
    gas::GasPriceSource,
    BotError, BotResult, GasPriceInfo, OrderBookSnapshot,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;

pub const POOL: Address = address!("92b8274aba7ab667bee7eb776ec1de32438d90bf");

/// Poll `condition` every 10ms for up to 10s of (possibly paused) tokio time.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub fn depth_frame(seq: u64, bid: Option<&str>, ask: Option<&str>) -> WireEvent {
    let level = |p: Option<&str>| match p {
        Some(p) => format!("[[\"{}\",\"1.00000000\"]]", p),
        None => "[]".to_string(),
    };
    WireEvent::Text(format!(
        r#"{{"e":"depthUpdate","E":{},"s":"ETHUSDT","U":{},"u":{},"b":{},"a":{}}}"#,
        seq * 1000,
        seq,
        seq,
        level(bid),
        level(ask)
    ))
}

pub fn book(last_update_id: u64, bid: &str, ask: &str) -> OrderBookSnapshot {
    OrderBookSnapshot {
        last_update_id,
        bids: vec![[bid.to_string(), "1.0".to_string()]],
        asks: vec![[ask.to_string(), "1.0".to_string()]],
    }
}

#[derive(Default)]
struct VenueShared {
    feeds: Mutex<Vec<mpsc::UnboundedSender<WireEvent>>>,
    close_codes: Mutex<Vec<u16>>,
    book: Mutex<Option<OrderBookSnapshot>>,
    failing: AtomicBool,
    stalled: AtomicBool,
}

/// Every `connect` opens a fresh in-memory session the test can feed.
#[derive(Clone, Default)]
pub struct FakeVenue {
    shared: Arc<VenueShared>,
}

impl FakeVenue {
    pub fn with_book(book: OrderBookSnapshot) -> Self {
        let venue = Self::default();
        *venue.shared.book.lock() = Some(book);
        venue
    }

    pub fn connections(&self) -> usize {
        self.shared.feeds.lock().len()
    }

    /// Push an event into the most recent session.
    pub fn send(&self, event: WireEvent) {
        if let Some(feed) = self.shared.feeds.lock().last() {
            let _ = feed.send(event);
        }
    }

    pub fn close_codes(&self) -> Vec<u16> {
        self.shared.close_codes.lock().clone()
    }

    /// Make every `connect` fail with a network error.
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every `connect` hang without completing the handshake.
    pub fn set_stalled(&self, stalled: bool) {
        self.shared.stalled.store(stalled, Ordering::SeqCst);
    }
}

pub struct FakeConnection {
    events: mpsc::UnboundedReceiver<WireEvent>,
    shared: Arc<VenueShared>,
}

#[async_trait]
impl DepthConnection for FakeConnection {
    async fn recv(&mut self) -> WireEvent {
        self.events.recv().await.unwrap_or(WireEvent::Closed(None))
    }

    async fn close(&mut self, code: u16) {
        self.shared.close_codes.lock().push(code);
    }
}

#[async_trait]
impl DepthVenue for FakeVenue {
    type Connection = FakeConnection;

    fn stream_name(&self) -> String {
        "ethusdt@depth@1000ms".to_string()
    }

    async fn connect(&self) -> BotResult<FakeConnection> {
        if self.shared.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.shared.failing.load(Ordering::SeqCst) {
            return Err(BotError::Network {
                message: "connection refused".to_string(),
                source: None,
                retry_count: 0,
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.feeds.lock().push(tx);
        Ok(FakeConnection { events: rx, shared: self.shared.clone() })
    }

    async fn order_book(&self) -> BotResult<OrderBookSnapshot> {
        self.shared
            .book
            .lock()
            .clone()
            .ok_or_else(|| BotError::Configuration("no order book configured".to_string()))
    }
}

struct PoolShared {
    token_reserve: Mutex<U256>,
    native_reserve: Mutex<U256>,
    reserve_reads: AtomicUsize,
    from_pool: Mutex<Option<mpsc::UnboundedSender<TransferEvent>>>,
    to_pool: Mutex<Option<mpsc::UnboundedSender<TransferEvent>>>,
}

#[derive(Clone)]
pub struct FakePool {
    shared: Arc<PoolShared>,
}

impl FakePool {
    pub fn new(token_reserve: u128, native_reserve: u128) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                token_reserve: Mutex::new(U256::from(token_reserve)),
                native_reserve: Mutex::new(U256::from(native_reserve)),
                reserve_reads: AtomicUsize::new(0),
                from_pool: Mutex::new(None),
                to_pool: Mutex::new(None),
            }),
        }
    }

    /// A pool pricing the native asset at `price` whole tokens (6 decimals).
    pub fn priced_at(price: u128) -> Self {
        Self::new(price * 1_000 * 1_000_000, 1_000 * 10u128.pow(18))
    }

    pub fn set_reserves(&self, token_reserve: u128, native_reserve: u128) {
        *self.shared.token_reserve.lock() = U256::from(token_reserve);
        *self.shared.native_reserve.lock() = U256::from(native_reserve);
    }

    /// Number of token reserve reads, one per price computation.
    pub fn reserve_reads(&self) -> usize {
        self.shared.reserve_reads.load(Ordering::SeqCst)
    }

    pub fn subscribed(&self) -> bool {
        self.shared.from_pool.lock().is_some() && self.shared.to_pool.lock().is_some()
    }

    pub fn transfer(&self, direction: TransferDirection, block_number: u64) {
        let trader = address!("00000000000000000000000000000000000000bb");
        let (from, to, feed) = match direction {
            TransferDirection::FromPool => (POOL, trader, &self.shared.from_pool),
            TransferDirection::ToPool => (trader, POOL, &self.shared.to_pool),
        };
        if let Some(feed) = feed.lock().as_ref() {
            let _ = feed.send(TransferEvent { block_number, from, to, value: U256::from(1u64) });
        }
    }
}

#[async_trait]
impl PoolReader for FakePool {
    fn pool_address(&self) -> Address {
        POOL
    }

    async fn token_reserve(&self) -> BotResult<U256> {
        self.shared.reserve_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.shared.token_reserve.lock())
    }

    async fn native_reserve(&self) -> BotResult<U256> {
        Ok(*self.shared.native_reserve.lock())
    }

    async fn subscribe_transfers(&self, direction: TransferDirection) -> BotResult<TransferStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        match direction {
            TransferDirection::FromPool => *self.shared.from_pool.lock() = Some(tx),
            TransferDirection::ToPool => *self.shared.to_pool.lock() = Some(tx),
        }
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(stream.boxed())
    }
}

/// Fee source returning a fixed `fastest` tier, optionally failing.
pub struct FakeGas {
    fastest: u64,
    calls: AtomicU64,
    failing: AtomicBool,
}

impl FakeGas {
    pub fn new(fastest: u64) -> Arc<Self> {
        Arc::new(Self { fastest, calls: AtomicU64::new(0), failing: AtomicBool::new(false) })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl GasPriceSource for FakeGas {
    async fn fetch(&self) -> BotResult<GasPriceInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BotError::Network {
                message: "gas station unreachable".to_string(),
                source: None,
                retry_count: 0,
            });
        }
        Ok(GasPriceInfo::with_fastest(self.fastest))
    }
}
